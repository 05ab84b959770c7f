use serde::{Deserialize, Serialize};

use crate::{measure::MeasureTracker, BeatState, Result};

/// Outside world the engine drives on every beat: audio, visual pulse and
/// the count display.
///
/// Implementations should return quickly. Failures are logged and otherwise
/// ignored, so a broken audio device leaves the metronome flashing in silence.
pub trait BeatSink: Send {
    fn play_accent(&mut self) -> Result<()> {
        Ok(())
    }

    fn play_normal(&mut self) -> Result<()> {
        Ok(())
    }

    fn flash(&mut self) -> Result<()> {
        Ok(())
    }

    /// Receives the 1-indexed position of the beat that just fired.
    fn publish_count(&mut self, _count: usize) {}
}

/// Sink that does nothing, used when no front end is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl BeatSink for NullSink {}

/// Record of what a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatEvent {
    /// Zero-based slot that fired.
    pub position: usize,
    pub state: BeatState,
    pub sounded: bool,
    pub flashed: bool,
    /// 1-indexed value published for display.
    pub count: usize,
}

/// Collaborator calls decided for one beat, in the order they must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatPlan {
    pub position: usize,
    pub state: BeatState,
    /// Sound to play, if sound is on and the beat is not silent.
    pub sound: Option<BeatState>,
    pub flash: bool,
    pub count: usize,
}

impl BeatPlan {
    /// Runs the planned calls: sound, then flash, then the count.
    pub fn perform(&self, sink: &mut dyn BeatSink) -> BeatEvent {
        let position = self.position;

        let played = match self.sound {
            Some(BeatState::Accent) => Some(sink.play_accent()),
            Some(BeatState::Normal) => Some(sink.play_normal()),
            Some(BeatState::Silent) | None => None,
        };
        let sounded = match played {
            Some(Ok(())) => true,
            Some(Err(err)) => {
                tracing::warn!(%err, position, "skipping beat sound");
                false
            }
            None => false,
        };

        let flashed = self.flash
            && match sink.flash() {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(%err, position, "skipping beat flash");
                    false
                }
            };

        sink.publish_count(self.count);

        BeatEvent {
            position,
            state: self.state,
            sounded,
            flashed,
            count: self.count,
        }
    }
}

/// Turns a clock tick into collaborator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatDispatcher {
    pub sound_enabled: bool,
    pub flash_enabled: bool,
}

impl BeatDispatcher {
    pub fn new(sound_enabled: bool, flash_enabled: bool) -> Self {
        Self {
            sound_enabled,
            flash_enabled,
        }
    }

    /// Classifies the current beat, decides which calls it needs and
    /// advances the measure. No collaborator is touched, so this is cheap
    /// enough to run under the engine lock.
    pub fn plan(&self, measure: &mut MeasureTracker) -> Result<BeatPlan> {
        let position = measure.position();
        let state = measure.classify(position)?;

        let sound = match state {
            BeatState::Silent => None,
            audible if self.sound_enabled => Some(audible),
            _ => None,
        };

        measure.step();
        Ok(BeatPlan {
            position,
            state,
            sound,
            flash: self.flash_enabled,
            count: position + 1,
        })
    }

    /// Plans and performs one tick on the calling thread.
    pub fn dispatch(
        &self,
        measure: &mut MeasureTracker,
        sink: &mut dyn BeatSink,
    ) -> Result<BeatEvent> {
        Ok(self.plan(measure)?.perform(sink))
    }
}
