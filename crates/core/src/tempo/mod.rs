use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{config::TempoConfig, MetronomeError, Result};

const MILLIS_PER_MINUTE: u64 = 60_000;

/// Milliseconds between beats at `bpm`, truncated toward zero.
///
/// The quotient is taken on exact integers, so `bpm -> ms -> bpm` stays
/// within one beat per minute for every tempo the engine accepts. Returns
/// `None` for a zero tempo.
pub fn interval_millis(bpm: u32) -> Option<u64> {
    MILLIS_PER_MINUTE.checked_div(u64::from(bpm))
}

/// Tempo nearest to a beat spacing of `interval_ms`, rounded half away from zero.
pub fn bpm_from_interval(interval_ms: f64) -> Option<u32> {
    if !interval_ms.is_finite() || interval_ms <= 0.0 {
        return None;
    }
    let bpm = (MILLIS_PER_MINUTE as f64 / interval_ms).round();
    if bpm < 1.0 || bpm > f64::from(u32::MAX) {
        return None;
    }
    Some(bpm as u32)
}

/// Current tempo together with the interval derived from it.
///
/// The interval is recomputed on every accepted change, so the two can never
/// disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoState {
    bpm: u32,
    interval_ms: u64,
    min_bpm: u32,
    max_bpm: u32,
}

impl TempoState {
    pub fn new(config: &TempoConfig) -> Result<Self> {
        let mut state = Self {
            bpm: 0,
            interval_ms: 0,
            min_bpm: config.min_bpm.max(1),
            max_bpm: config.max_bpm,
        };
        state.set_bpm(i64::from(config.default_bpm))?;
        Ok(state)
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Timer period for the current tempo. Never shorter than a millisecond,
    /// which only matters for unclamped tempos above 60 000 bpm.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// Accepts `bpm` if it lies within bounds. A rejected request leaves the
    /// current tempo untouched.
    pub fn set_bpm(&mut self, bpm: i64) -> Result<u32> {
        let invalid = || MetronomeError::InvalidTempo {
            bpm,
            min: self.min_bpm,
            max: self.max_bpm,
        };

        if bpm < i64::from(self.min_bpm) || bpm > i64::from(self.max_bpm) {
            return Err(invalid());
        }
        let bpm = u32::try_from(bpm).map_err(|_| invalid())?;
        let interval_ms = interval_millis(bpm).ok_or_else(invalid)?;

        self.bpm = bpm;
        self.interval_ms = interval_ms;
        Ok(bpm)
    }

    /// Shifts the tempo by a signed amount, subject to the same bounds.
    pub fn nudge(&mut self, delta: i64) -> Result<u32> {
        self.set_bpm(i64::from(self.bpm).saturating_add(delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> TempoState {
        TempoState::new(&TempoConfig::default()).unwrap()
    }

    #[test]
    fn interval_truncates_toward_zero() {
        assert_eq!(interval_millis(60), Some(1_000));
        assert_eq!(interval_millis(120), Some(500));
        assert_eq!(interval_millis(35), Some(1_714));
        assert_eq!(interval_millis(36), Some(1_666));
        assert_eq!(interval_millis(240), Some(250));
        assert_eq!(interval_millis(0), None);
    }

    #[test]
    fn round_trip_is_stable_within_one_bpm() {
        for bpm in 35..=240u32 {
            let ms = interval_millis(bpm).unwrap();
            let back = bpm_from_interval(ms as f64).unwrap();
            assert!(back.abs_diff(bpm) <= 1, "{bpm} bpm came back as {back}");
        }
    }

    #[test]
    fn starts_at_default_tempo() {
        let tempo = state();
        assert_eq!(tempo.bpm(), 60);
        assert_eq!(tempo.interval_ms(), 1_000);
        assert_eq!(tempo.interval(), Duration::from_secs(1));
    }

    #[test]
    fn out_of_range_requests_leave_tempo_unchanged() {
        let mut tempo = state();
        tempo.set_bpm(100).unwrap();

        assert!(matches!(
            tempo.set_bpm(500),
            Err(MetronomeError::InvalidTempo { bpm: 500, .. })
        ));
        assert!(tempo.set_bpm(0).is_err());
        assert!(tempo.set_bpm(-20).is_err());
        assert!(tempo.set_bpm(34).is_err());

        assert_eq!(tempo.bpm(), 100);
        assert_eq!(tempo.interval_ms(), 600);
    }

    #[test]
    fn nudge_respects_bounds() {
        let mut tempo = state();
        assert_eq!(tempo.nudge(5).unwrap(), 65);
        assert_eq!(tempo.nudge(-1).unwrap(), 64);

        tempo.set_bpm(238).unwrap();
        assert!(tempo.nudge(5).is_err());
        assert_eq!(tempo.bpm(), 238);
    }

    #[test]
    fn unclamped_tempo_still_rejects_zero() {
        let config = TempoConfig {
            min_bpm: 0,
            max_bpm: u32::MAX,
            ..TempoConfig::default()
        };
        let mut tempo = TempoState::new(&config).unwrap();

        assert!(tempo.set_bpm(0).is_err());
        assert_eq!(tempo.set_bpm(500).unwrap(), 500);
        assert_eq!(tempo.interval_ms(), 120);

        tempo.set_bpm(100_000).unwrap();
        assert_eq!(tempo.interval_ms(), 0);
        assert_eq!(tempo.interval(), Duration::from_millis(1));
    }

    #[test]
    fn rejects_degenerate_intervals() {
        assert_eq!(bpm_from_interval(500.0), Some(120));
        assert_eq!(bpm_from_interval(0.0), None);
        assert_eq!(bpm_from_interval(-5.0), None);
        assert_eq!(bpm_from_interval(f64::NAN), None);
    }
}
