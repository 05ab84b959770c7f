use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{MetronomeError, Result};

/// Top-level configuration structure for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tempo: TempoConfig,
    pub meter: MeterConfig,
    pub tap: TapConfig,
    pub sound_enabled: bool,
    pub flash_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tempo: TempoConfig::default(),
            meter: MeterConfig::default(),
            tap: TapConfig::default(),
            sound_enabled: true,
            flash_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Bounds used by the first releases: a 2..=6 meter and no tempo clamp.
    pub fn legacy() -> Self {
        Self {
            tempo: TempoConfig {
                min_bpm: 1,
                max_bpm: u32::MAX,
                ..TempoConfig::default()
            },
            meter: MeterConfig {
                min: 2,
                max: 6,
                ..MeterConfig::default()
            },
            ..Self::default()
        }
    }

    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Checks that every bound pair is consistent and every default sits
    /// inside its bounds.
    pub fn validate(&self) -> Result<()> {
        let tempo = &self.tempo;
        if tempo.min_bpm == 0 || tempo.min_bpm > tempo.max_bpm {
            return Err(MetronomeError::msg(format!(
                "tempo bounds {}..={} are invalid",
                tempo.min_bpm, tempo.max_bpm
            )));
        }
        if !tempo.contains(i64::from(tempo.default_bpm)) {
            return Err(MetronomeError::InvalidTempo {
                bpm: i64::from(tempo.default_bpm),
                min: tempo.min_bpm,
                max: tempo.max_bpm,
            });
        }

        let meter = &self.meter;
        if meter.min == 0 || meter.min > meter.max {
            return Err(MetronomeError::msg(format!(
                "meter bounds {}..={} are invalid",
                meter.min, meter.max
            )));
        }
        if !meter.contains(meter.default as i64) {
            return Err(MetronomeError::InvalidMeter {
                requested: meter.default as i64,
                min: meter.min,
                max: meter.max,
            });
        }

        if self.tap.min_taps < 2 {
            return Err(MetronomeError::msg(
                "tap tempo needs at least two taps to form an interval",
            ));
        }
        if self.tap.max_taps < self.tap.min_taps {
            return Err(MetronomeError::msg(format!(
                "tap window of {} cannot hold the {} taps an estimate needs",
                self.tap.max_taps, self.tap.min_taps
            )));
        }

        Ok(())
    }
}

/// Tempo bounds and the increments used by the nudge buttons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub default_bpm: u32,
    pub min_bpm: u32,
    pub max_bpm: u32,
    pub small_step: i32,
    pub large_step: i32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            default_bpm: 60,
            min_bpm: 35,
            max_bpm: 240,
            small_step: 1,
            large_step: 5,
        }
    }
}

impl TempoConfig {
    pub fn contains(&self, bpm: i64) -> bool {
        (i64::from(self.min_bpm)..=i64::from(self.max_bpm)).contains(&bpm)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub default: usize,
    pub min: usize,
    pub max: usize,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            default: 4,
            min: 1,
            max: 12,
        }
    }
}

impl MeterConfig {
    pub fn contains(&self, meter: i64) -> bool {
        meter >= self.min as i64 && meter <= self.max as i64
    }
}

/// Tap tempo tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    /// A gap longer than this starts a new run of taps.
    pub stale_after_ms: u64,
    /// Taps required before a tempo is derived.
    pub min_taps: usize,
    /// Most recent taps kept in one run.
    pub max_taps: usize,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: 2_000,
            min_taps: 3,
            max_taps: 32,
        }
    }
}
