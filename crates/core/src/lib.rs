//! Core library for the metronome.
//!
//! The engine turns a tempo and a meter into a repeating beat schedule,
//! classifies every beat as accented, normal or silent, and derives tempo
//! from tapped intervals. Audio, visuals and the count display sit behind
//! the [`BeatSink`] trait so any front end can drive the engine.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod measure;
pub mod tap;
pub mod tempo;

pub use clock::{TempoClock, Tick};
pub use config::{EngineConfig, MeterConfig, TapConfig, TempoConfig};
pub use dispatch::{BeatDispatcher, BeatEvent, BeatPlan, BeatSink, NullSink};
pub use engine::{Metronome, MetronomeSnapshot};
pub use error::{MetronomeError, Result};
pub use measure::{parse_pattern, BeatState, MeasureTracker};
pub use tap::{TapOutcome, TapTempo};
pub use tempo::{bpm_from_interval, interval_millis, TempoState};
