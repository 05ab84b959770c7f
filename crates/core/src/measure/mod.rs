use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{config::MeterConfig, MetronomeError, Result};

/// How a single beat of the measure sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BeatState {
    #[default]
    Accent,
    Normal,
    Silent,
}

impl BeatState {
    /// Next state in the Accent -> Normal -> Silent cycle used by the beat
    /// buttons.
    pub fn cycled(self) -> Self {
        match self {
            Self::Accent => Self::Normal,
            Self::Normal => Self::Silent,
            Self::Silent => Self::Accent,
        }
    }
}

impl fmt::Display for BeatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Accent => "A",
            Self::Normal => "N",
            Self::Silent => "S",
        };
        f.write_str(symbol)
    }
}

impl FromStr for BeatState {
    type Err = MetronomeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" | "accent" => Ok(Self::Accent),
            "n" | "normal" => Ok(Self::Normal),
            "s" | "silent" | "-" => Ok(Self::Silent),
            other => Err(MetronomeError::msg(format!("unknown beat state `{other}`"))),
        }
    }
}

/// Parses a comma or whitespace separated pattern such as `"A,N,S,N"`.
pub fn parse_pattern(pattern: &str) -> Result<Vec<BeatState>> {
    pattern
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(str::parse)
        .collect()
}

/// Beat slots of one measure plus the position of the next beat to fire.
///
/// `beats.len()` is the meter and `position` is always below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureTracker {
    beats: Vec<BeatState>,
    position: usize,
    min_meter: usize,
    max_meter: usize,
}

impl MeasureTracker {
    pub fn new(config: &MeterConfig) -> Result<Self> {
        let min_meter = config.min.max(1);
        if !(min_meter..=config.max).contains(&config.default) {
            return Err(MetronomeError::InvalidMeter {
                requested: config.default as i64,
                min: min_meter,
                max: config.max,
            });
        }
        Ok(Self {
            beats: vec![BeatState::Accent; config.default],
            position: 0,
            min_meter,
            max_meter: config.max,
        })
    }

    pub fn meter(&self) -> usize {
        self.beats.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn beats(&self) -> &[BeatState] {
        &self.beats
    }

    /// Grows or shrinks the measure by `delta` beats. New beats are accented
    /// and shrinking drops beats from the end. Out of range requests change
    /// nothing.
    pub fn set_meter(&mut self, delta: i64) -> Result<usize> {
        let requested = (self.meter() as i64).saturating_add(delta);
        if requested < self.min_meter as i64 || requested > self.max_meter as i64 {
            return Err(MetronomeError::InvalidMeter {
                requested,
                min: self.min_meter,
                max: self.max_meter,
            });
        }

        self.beats.resize(requested as usize, BeatState::Accent);
        self.position %= self.meter();
        Ok(self.meter())
    }

    /// Replaces every slot; the pattern length becomes the new meter.
    pub fn set_pattern(&mut self, pattern: Vec<BeatState>) -> Result<()> {
        if !(self.min_meter..=self.max_meter).contains(&pattern.len()) {
            return Err(MetronomeError::InvalidMeter {
                requested: pattern.len() as i64,
                min: self.min_meter,
                max: self.max_meter,
            });
        }
        self.beats = pattern;
        self.position %= self.meter();
        Ok(())
    }

    pub fn classify(&self, position: usize) -> Result<BeatState> {
        self.beats
            .get(position)
            .copied()
            .ok_or(MetronomeError::BeatOutOfRange {
                position,
                meter: self.meter(),
            })
    }

    pub fn set_beat(&mut self, position: usize, state: BeatState) -> Result<()> {
        let meter = self.meter();
        let slot = self
            .beats
            .get_mut(position)
            .ok_or(MetronomeError::BeatOutOfRange { position, meter })?;
        *slot = state;
        Ok(())
    }

    pub fn cycle_beat(&mut self, position: usize) -> Result<BeatState> {
        let next = self.classify(position)?.cycled();
        self.set_beat(position, next)?;
        Ok(next)
    }

    /// Position following `position` in the current measure.
    pub fn advance(&self, position: usize) -> usize {
        (position + 1) % self.meter()
    }

    /// Moves to the next beat and returns the new position.
    pub fn step(&mut self) -> usize {
        self.position = self.advance(self.position);
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> MeasureTracker {
        MeasureTracker::new(&MeterConfig::default()).unwrap()
    }

    #[test]
    fn starts_with_accented_four() {
        let measure = tracker();
        assert_eq!(measure.meter(), 4);
        assert_eq!(measure.position(), 0);
        assert!(measure.beats().iter().all(|beat| *beat == BeatState::Accent));
    }

    #[test]
    fn growing_appends_accents_and_shrinking_truncates() {
        let mut measure = tracker();
        measure.set_beat(1, BeatState::Normal).unwrap();
        measure.set_beat(3, BeatState::Silent).unwrap();

        assert_eq!(measure.set_meter(2).unwrap(), 6);
        assert_eq!(&measure.beats()[4..], &[BeatState::Accent, BeatState::Accent]);

        assert_eq!(measure.set_meter(-3).unwrap(), 3);
        assert_eq!(
            measure.beats(),
            &[BeatState::Accent, BeatState::Normal, BeatState::Accent]
        );
    }

    #[test]
    fn net_zero_delta_restores_the_measure() {
        let mut measure = tracker();
        measure.set_beat(1, BeatState::Normal).unwrap();
        measure.set_beat(2, BeatState::Silent).unwrap();
        let before = measure.beats().to_vec();

        measure.set_meter(3).unwrap();
        measure.set_meter(-3).unwrap();
        assert_eq!(measure.beats(), before.as_slice());

        measure.set_meter(-2).unwrap();
        measure.set_meter(2).unwrap();
        assert_eq!(measure.meter(), 4);
        assert_eq!(&measure.beats()[..2], &before[..2]);
    }

    #[test]
    fn rejects_meter_outside_bounds() {
        let mut measure = tracker();
        measure.set_meter(-3).unwrap();
        assert_eq!(measure.meter(), 1);

        let err = measure.set_meter(-1).unwrap_err();
        assert!(matches!(err, MetronomeError::InvalidMeter { requested: 0, .. }));
        assert_eq!(measure.meter(), 1);
        assert_eq!(measure.beats().len(), 1);

        assert!(measure.set_meter(12).is_err());
        assert_eq!(measure.meter(), 1);
    }

    #[test]
    fn legacy_bounds_apply() {
        let mut measure = MeasureTracker::new(&MeterConfig {
            default: 4,
            min: 2,
            max: 6,
        })
        .unwrap();

        assert!(measure.set_meter(-3).is_err());
        assert!(measure.set_meter(3).is_err());
        assert_eq!(measure.set_meter(2).unwrap(), 6);
        assert_eq!(measure.set_meter(-4).unwrap(), 2);
    }

    #[test]
    fn position_cycles_through_the_measure() {
        for meter in 1..=12usize {
            let mut measure = tracker();
            measure.set_meter(meter as i64 - 4).unwrap();
            measure.step();
            let start = measure.position();
            for _ in 0..meter {
                measure.step();
            }
            assert_eq!(measure.position(), start);
        }
    }

    #[test]
    fn shrinking_keeps_position_in_range() {
        let mut measure = tracker();
        measure.step();
        measure.step();
        measure.step();
        assert_eq!(measure.position(), 3);

        measure.set_meter(-1).unwrap();
        assert_eq!(measure.position(), 0);
        assert!(measure.classify(measure.position()).is_ok());
    }

    #[test]
    fn classify_out_of_range_fails() {
        let measure = tracker();
        assert!(matches!(
            measure.classify(4),
            Err(MetronomeError::BeatOutOfRange { position: 4, meter: 4 })
        ));
    }

    #[test]
    fn cycling_walks_all_three_states() {
        let mut measure = tracker();
        assert_eq!(measure.cycle_beat(0).unwrap(), BeatState::Normal);
        assert_eq!(measure.cycle_beat(0).unwrap(), BeatState::Silent);
        assert_eq!(measure.cycle_beat(0).unwrap(), BeatState::Accent);
        assert!(measure.cycle_beat(9).is_err());
    }

    #[test]
    fn parses_patterns() {
        let pattern = parse_pattern("A, n,silent N").unwrap();
        assert_eq!(
            pattern,
            vec![BeatState::Accent, BeatState::Normal, BeatState::Silent, BeatState::Normal]
        );
        assert!(parse_pattern("A,X").is_err());

        let mut measure = tracker();
        measure.set_pattern(pattern).unwrap();
        assert_eq!(measure.meter(), 4);
        assert!(measure.set_pattern(Vec::new()).is_err());
        assert!(measure.set_pattern(vec![BeatState::Normal; 13]).is_err());
    }
}
