use std::{
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use serde::{Deserialize, Serialize};

use crate::{
    clock::{TempoClock, Tick},
    dispatch::{BeatDispatcher, BeatPlan, BeatSink},
    measure::{BeatState, MeasureTracker},
    tap::{TapOutcome, TapTempo},
    tempo::TempoState,
    EngineConfig, MetronomeError, Result,
};

/// Point-in-time view of the engine for display layers to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetronomeSnapshot {
    pub bpm: u32,
    pub interval_ms: u64,
    pub meter: usize,
    pub beats: Vec<BeatState>,
    /// Zero-based slot of the next beat.
    pub position: usize,
    /// 1-indexed slot of the last beat fired, 0 before the first one.
    pub count: usize,
    /// Beats fired since the engine was built.
    pub beats_fired: u64,
    pub sound_enabled: bool,
    pub flash_enabled: bool,
    pub running: bool,
    pub tap_count: usize,
}

/// Work for the output thread, handled strictly in arrival order.
enum Output {
    Beat(BeatPlan),
    /// Acknowledged once everything queued before it has reached the sink.
    Flush(Sender<()>),
}

struct EngineState {
    tempo: TempoState,
    measure: MeasureTracker,
    taps: TapTempo,
    dispatcher: BeatDispatcher,
    output: Option<Sender<Output>>,
    /// Ticks from any other clock generation are stale.
    generation: u64,
    running: bool,
    count: usize,
    beats_fired: u64,
}

impl EngineState {
    /// Decides the beat and queues its collaborator calls. The sink itself
    /// runs on the output thread, never under the engine lock.
    fn fire(&mut self) -> Result<BeatPlan> {
        let plan = self.dispatcher.plan(&mut self.measure)?;
        self.count = plan.count;
        self.beats_fired += 1;
        self.send(Output::Beat(plan))?;
        Ok(plan)
    }

    fn send(&self, output: Output) -> Result<()> {
        self.output
            .as_ref()
            .and_then(|tx| tx.send(output).ok())
            .ok_or_else(|| MetronomeError::msg("beat output has shut down"))
    }

    fn snapshot(&self) -> MetronomeSnapshot {
        MetronomeSnapshot {
            bpm: self.tempo.bpm(),
            interval_ms: self.tempo.interval_ms(),
            meter: self.measure.meter(),
            beats: self.measure.beats().to_vec(),
            position: self.measure.position(),
            count: self.count,
            beats_fired: self.beats_fired,
            sound_enabled: self.dispatcher.sound_enabled,
            flash_enabled: self.dispatcher.flash_enabled,
            running: self.running,
            tap_count: self.taps.taps().len(),
        }
    }
}

/// The metronome engine.
///
/// Three threads cooperate: the clock posts ticks, the dispatch thread turns
/// each tick into a [`BeatPlan`] under the engine lock, and the output thread
/// runs the [`BeatSink`] calls. A slow sink only backs up the output queue;
/// beats keep their schedule and commands never wait on it. All methods take
/// `&self`; wrap the engine in an `Arc` to drive it from several threads.
pub struct Metronome {
    state: Arc<Mutex<EngineState>>,
    clock: TempoClock,
    dispatch_worker: Option<JoinHandle<()>>,
    output_worker: Option<JoinHandle<()>>,
    epoch: Instant,
    small_step: i64,
    large_step: i64,
}

impl Metronome {
    /// Builds a stopped engine. Call [`start`](Self::start) to begin ticking.
    pub fn new(config: &EngineConfig, sink: impl BeatSink + 'static) -> Result<Self> {
        config.validate()?;

        let (output_tx, output_rx) = mpsc::channel();
        let output_worker = thread::Builder::new()
            .name("metronome-output".into())
            .spawn(move || run_output(Box::new(sink), output_rx))?;

        let tempo = TempoState::new(&config.tempo)?;
        let state = EngineState {
            measure: MeasureTracker::new(&config.meter)?,
            taps: TapTempo::new(&config.tap),
            dispatcher: BeatDispatcher::new(config.sound_enabled, config.flash_enabled),
            output: Some(output_tx),
            generation: 0,
            running: false,
            count: 0,
            beats_fired: 0,
            tempo,
        };

        let (tick_tx, tick_rx) = mpsc::channel();
        let clock = TempoClock::spawn(state.tempo.interval(), tick_tx)?;
        let state = Arc::new(Mutex::new(state));

        let dispatch_worker = {
            let state = state.clone();
            thread::Builder::new()
                .name("metronome-dispatch".into())
                .spawn(move || run_dispatch(&state, tick_rx))?
        };

        tracing::info!(
            bpm = config.tempo.default_bpm,
            meter = config.meter.default,
            "metronome ready"
        );

        Ok(Self {
            state,
            clock,
            dispatch_worker: Some(dispatch_worker),
            output_worker: Some(output_worker),
            epoch: Instant::now(),
            small_step: i64::from(config.tempo.small_step),
            large_step: i64::from(config.tempo.large_step),
        })
    }

    pub fn start(&self) -> Result<()> {
        let mut state = self.lock()?;
        if !state.running {
            self.launch(&mut state)?;
        }
        Ok(())
    }

    /// Stops ticking. The measure position is kept for the next start.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.running {
            self.halt(&mut state)?;
        }
        Ok(())
    }

    /// Starts a stopped engine or stops a running one. Returns whether it is
    /// running afterwards.
    pub fn toggle(&self) -> Result<bool> {
        let mut state = self.lock()?;
        if state.running {
            self.halt(&mut state)?;
        } else {
            self.launch(&mut state)?;
        }
        Ok(state.running)
    }

    pub fn is_running(&self) -> Result<bool> {
        Ok(self.lock()?.running)
    }

    /// Sets the tempo and restarts the schedule at the new interval.
    /// Out-of-range tempos are refused and the current one keeps running.
    pub fn set_bpm(&self, bpm: i64) -> Result<u32> {
        let mut state = self.lock()?;
        let requested = state.tempo.set_bpm(bpm);
        self.retune(&mut state, requested)
    }

    pub fn nudge_bpm(&self, delta: i64) -> Result<u32> {
        let mut state = self.lock()?;
        let requested = state.tempo.nudge(delta);
        self.retune(&mut state, requested)
    }

    /// Nudges by the configured small (`large == false`) or large step.
    pub fn step_bpm(&self, up: bool, large: bool) -> Result<u32> {
        let step = if large { self.large_step } else { self.small_step };
        self.nudge_bpm(if up { step } else { -step })
    }

    /// Grows or shrinks the measure by `delta` beats.
    pub fn change_meter(&self, delta: i64) -> Result<usize> {
        let mut state = self.lock()?;
        match state.measure.set_meter(delta) {
            Ok(meter) => {
                tracing::info!(meter, "meter changed");
                Ok(meter)
            }
            Err(err) => {
                tracing::warn!(%err, delta, "meter change refused");
                Err(err)
            }
        }
    }

    pub fn set_pattern(&self, pattern: Vec<BeatState>) -> Result<()> {
        let mut state = self.lock()?;
        state.measure.set_pattern(pattern)?;
        tracing::info!(meter = state.measure.meter(), "beat pattern replaced");
        Ok(())
    }

    pub fn set_beat(&self, position: usize, beat: BeatState) -> Result<()> {
        self.lock()?.measure.set_beat(position, beat)
    }

    pub fn cycle_beat(&self, position: usize) -> Result<BeatState> {
        self.lock()?.measure.cycle_beat(position)
    }

    pub fn set_sound_enabled(&self, enabled: bool) -> Result<()> {
        self.lock()?.dispatcher.sound_enabled = enabled;
        Ok(())
    }

    pub fn set_flash_enabled(&self, enabled: bool) -> Result<()> {
        self.lock()?.dispatcher.flash_enabled = enabled;
        Ok(())
    }

    /// Records a tap at `now_ms` and, once enough taps are in, retunes the
    /// clock to the tapped tempo.
    pub fn record_tap(&self, now_ms: u64) -> Result<TapOutcome> {
        let mut state = self.lock()?;
        let outcome = state.taps.record(now_ms);

        match outcome {
            TapOutcome::Estimated { bpm } => {
                let requested = state.tempo.set_bpm(i64::from(bpm));
                if self.retune(&mut state, requested).is_err() {
                    return Ok(TapOutcome::OutOfRange { bpm });
                }
            }
            TapOutcome::Degenerate => tracing::warn!(
                taps = state.taps.taps().len(),
                "taps averaged to a zero interval; tempo unchanged"
            ),
            TapOutcome::Collecting { taps } => tracing::debug!(taps, "tap recorded"),
            TapOutcome::OutOfRange { .. } => {}
        }
        Ok(outcome)
    }

    /// Records a tap at the current time.
    pub fn tap(&self) -> Result<TapOutcome> {
        let now_ms = u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.record_tap(now_ms)
    }

    /// Fires one beat immediately, outside the clock schedule. Its sink calls
    /// are queued behind any beats already waiting for the output thread.
    pub fn tick_now(&self) -> Result<BeatPlan> {
        self.lock()?.fire()
    }

    /// Blocks until every beat fired so far has reached the sink.
    pub fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = mpsc::channel();
        self.lock()?.send(Output::Flush(done_tx))?;
        done_rx
            .recv()
            .map_err(|_| MetronomeError::msg("beat output has shut down"))
    }

    pub fn snapshot(&self) -> Result<MetronomeSnapshot> {
        Ok(self.lock()?.snapshot())
    }

    fn launch(&self, state: &mut EngineState) -> Result<()> {
        state.generation = self.clock.start()?;
        state.running = true;
        tracing::info!(bpm = state.tempo.bpm(), "metronome started");
        Ok(())
    }

    fn halt(&self, state: &mut EngineState) -> Result<()> {
        state.generation = self.clock.stop()?;
        state.running = false;
        tracing::info!("metronome stopped");
        Ok(())
    }

    /// Pushes an accepted tempo change to the clock.
    fn retune(&self, state: &mut EngineState, requested: Result<u32>) -> Result<u32> {
        let bpm = match requested {
            Ok(bpm) => bpm,
            Err(err) => {
                tracing::warn!(%err, "tempo change refused");
                return Err(err);
            }
        };

        let generation = self.clock.reprogram(state.tempo.interval())?;
        if state.running {
            state.generation = generation;
        }
        tracing::info!(bpm, interval_ms = state.tempo.interval_ms(), "tempo changed");
        Ok(bpm)
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState>> {
        self.state
            .lock()
            .map_err(|_| MetronomeError::msg("engine state has been poisoned"))
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        // Each worker exits once its channel's last sender is gone: the clock
        // holds the tick sender, the engine state the output sender.
        self.clock.shutdown();
        if let Some(worker) = self.dispatch_worker.take() {
            if worker.join().is_err() {
                tracing::error!("dispatch thread panicked");
            }
        }

        if let Ok(mut state) = self.state.lock() {
            state.output = None;
        }
        if let Some(worker) = self.output_worker.take() {
            if worker.join().is_err() {
                tracing::error!("output thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for Metronome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metronome")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

fn run_dispatch(state: &Mutex<EngineState>, ticks: Receiver<Tick>) {
    for tick in ticks {
        let Ok(mut state) = state.lock() else {
            tracing::error!("engine state poisoned; dispatch thread exiting");
            return;
        };
        if !state.running || tick.generation != state.generation {
            tracing::debug!(generation = tick.generation, "dropping stale tick");
            continue;
        }

        let lateness = tick.scheduled_at.elapsed();
        match state.fire() {
            Ok(plan) => tracing::debug!(
                count = plan.count,
                beat = %plan.state,
                index = tick.index,
                ?lateness,
                "beat"
            ),
            Err(err) => tracing::warn!(%err, "beat dispatch failed"),
        }
    }
}

fn run_output(mut sink: Box<dyn BeatSink>, outputs: Receiver<Output>) {
    for output in outputs {
        match output {
            Output::Beat(plan) => {
                let event = plan.perform(sink.as_mut());
                tracing::trace!(count = event.count, sounded = event.sounded, "beat rendered");
            }
            Output::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
