use serde::{Deserialize, Serialize};

use crate::{config::TapConfig, tempo::bpm_from_interval, MetronomeError, Result};

/// Result of feeding one tap into the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapOutcome {
    /// Not enough taps in the current run to estimate a tempo.
    Collecting { taps: usize },
    /// Tempo derived from the average spacing of the current run.
    Estimated { bpm: u32 },
    /// A tempo was derived but the engine refused it; the previous tempo
    /// keeps running.
    OutOfRange { bpm: u32 },
    /// The run averages to a zero interval; no tempo can be derived.
    Degenerate,
}

/// Derives a tempo from manually tapped timestamps.
///
/// Taps within one run are kept in chronological order. A gap longer than the
/// staleness threshold, or a timestamp earlier than the previous tap, starts a
/// new run with the triggering tap. A long run keeps only its most recent
/// `max_taps` taps, so the estimate follows a drifting tempo.
#[derive(Debug, Clone)]
pub struct TapTempo {
    taps: Vec<u64>,
    stale_after_ms: u64,
    min_taps: usize,
    max_taps: usize,
}

impl TapTempo {
    pub fn new(config: &TapConfig) -> Self {
        Self {
            taps: Vec::new(),
            stale_after_ms: config.stale_after_ms,
            min_taps: config.min_taps.max(2),
            max_taps: config.max_taps.max(config.min_taps).max(2),
        }
    }

    pub fn taps(&self) -> &[u64] {
        &self.taps
    }

    pub fn record(&mut self, now_ms: u64) -> TapOutcome {
        if let Some(&last) = self.taps.last() {
            if now_ms < last || now_ms - last > self.stale_after_ms {
                tracing::debug!(gap_ms = now_ms.saturating_sub(last), "starting new tap run");
                self.taps.clear();
            }
        }
        self.taps.push(now_ms);
        if self.taps.len() > self.max_taps {
            let overflow = self.taps.len() - self.max_taps;
            self.taps.drain(0..overflow);
        }

        if self.taps.len() < self.min_taps {
            return TapOutcome::Collecting {
                taps: self.taps.len(),
            };
        }

        match self.estimate() {
            Ok(bpm) => TapOutcome::Estimated { bpm },
            Err(_) => TapOutcome::Degenerate,
        }
    }

    /// Tempo implied by the retained taps, regardless of how many there are.
    pub fn estimate(&self) -> Result<u32> {
        self.average_interval()
            .and_then(bpm_from_interval)
            .ok_or(MetronomeError::DegenerateTapInterval)
    }

    /// Mean spacing of consecutive taps across the whole run.
    pub fn average_interval(&self) -> Option<f64> {
        if self.taps.len() < 2 {
            return None;
        }
        let total: u64 = self
            .taps
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .sum();
        Some(total as f64 / (self.taps.len() - 1) as f64)
    }
}
