//! Repeating beat timer.
//!
//! A single background thread owns the schedule. Every call to [`TempoClock::start`],
//! [`TempoClock::reprogram`] or [`TempoClock::stop`] bumps a generation counter;
//! ticks carry the generation they were scheduled under so a consumer can drop
//! anything queued before the change.

use std::{
    sync::{mpsc::Sender, Arc, Condvar, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{MetronomeError, Result};

/// One firing of the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub generation: u64,
    /// 1-based ordinal within the generation.
    pub index: u64,
    /// Deadline the tick was scheduled for.
    pub scheduled_at: Instant,
}

#[derive(Debug)]
struct Schedule {
    interval: Duration,
    generation: u64,
    running: bool,
    shutdown: bool,
}

#[derive(Debug)]
struct Shared {
    schedule: Mutex<Schedule>,
    wake: Condvar,
}

/// Owner of the one active repeating schedule.
#[derive(Debug)]
pub struct TempoClock {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl TempoClock {
    /// Spawns the timer thread in the stopped state. Ticks are posted to `ticks`
    /// once [`start`](Self::start) is called.
    pub fn spawn(interval: Duration, ticks: Sender<Tick>) -> Result<Self> {
        let shared = Arc::new(Shared {
            schedule: Mutex::new(Schedule {
                interval: interval.max(Duration::from_millis(1)),
                generation: 0,
                running: false,
                shutdown: false,
            }),
            wake: Condvar::new(),
        });

        let worker = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("metronome-clock".into())
                .spawn(move || run_schedule(&shared, &ticks))?
        };

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Starts firing if stopped. The first tick arrives one interval from now.
    pub fn start(&self) -> Result<u64> {
        let mut schedule = self.lock()?;
        if !schedule.running {
            schedule.running = true;
            schedule.generation += 1;
            self.shared.wake.notify_all();
        }
        Ok(schedule.generation)
    }

    /// Installs a new interval. A running clock restarts its schedule from now;
    /// nothing already scheduled under the old interval fires afterwards.
    pub fn reprogram(&self, interval: Duration) -> Result<u64> {
        let mut schedule = self.lock()?;
        schedule.interval = interval.max(Duration::from_millis(1));
        schedule.generation += 1;
        self.shared.wake.notify_all();
        Ok(schedule.generation)
    }

    pub fn stop(&self) -> Result<u64> {
        let mut schedule = self.lock()?;
        if schedule.running {
            schedule.running = false;
            schedule.generation += 1;
            self.shared.wake.notify_all();
        }
        Ok(schedule.generation)
    }

    pub fn interval(&self) -> Result<Duration> {
        Ok(self.lock()?.interval)
    }

    pub fn is_running(&self) -> Result<bool> {
        Ok(self.lock()?.running)
    }

    /// Stops the timer thread and waits for it to exit. Dropping the clock
    /// does the same.
    pub fn shutdown(&mut self) {
        if let Ok(mut schedule) = self.shared.schedule.lock() {
            schedule.shutdown = true;
            schedule.running = false;
        }
        self.shared.wake.notify_all();

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("clock thread panicked");
            }
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Schedule>> {
        self.shared
            .schedule
            .lock()
            .map_err(|_| MetronomeError::msg("clock schedule has been poisoned"))
    }
}

impl Drop for TempoClock {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_schedule(shared: &Shared, ticks: &Sender<Tick>) {
    let Ok(mut schedule) = shared.schedule.lock() else {
        return;
    };

    loop {
        if schedule.shutdown {
            return;
        }
        if !schedule.running {
            schedule = match shared.wake.wait(schedule) {
                Ok(guard) => guard,
                Err(_) => return,
            };
            continue;
        }

        let generation = schedule.generation;
        let interval = schedule.interval;
        let mut deadline = Instant::now() + interval;
        let mut index = 0;
        tracing::debug!(generation, ?interval, "clock schedule armed");

        loop {
            let now = Instant::now();
            if now >= deadline {
                index += 1;
                let tick = Tick {
                    generation,
                    index,
                    scheduled_at: deadline,
                };
                if ticks.send(tick).is_err() {
                    tracing::debug!("tick receiver dropped; clock exiting");
                    return;
                }

                // Deadlines sit on a fixed grid, so late handling never drifts
                // the schedule. Missed grid points are skipped, not replayed.
                deadline += interval;
                let mut skipped = 0u64;
                while deadline <= now {
                    deadline += interval;
                    skipped += 1;
                }
                if skipped > 0 {
                    tracing::warn!(generation, skipped, "clock fell behind; skipping ticks");
                }
                continue;
            }

            schedule = match shared.wake.wait_timeout(schedule, deadline - now) {
                Ok((guard, _)) => guard,
                Err(_) => return,
            };
            if schedule.shutdown || !schedule.running || schedule.generation != generation {
                break;
            }
        }
    }
}
