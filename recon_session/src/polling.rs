//! A cancellable, self-rescheduling status poll loop.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use recon_config::groups::session;
use recon_types::SessionId;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Bookkeeping of the most recent cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollCycle {
    /// 1-based count of cycles in this run.
    pub attempt: u64,
    pub last_error: Option<String>,
    /// Delay before the next cycle fires.
    pub next_delay: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSchedule {
    /// Delay between cycles; also the delay before the first one.
    pub interval: Duration,
    /// Delay after a failed cycle.
    pub error_delay: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::from_config(&session::ConfigValueGroup::default())
    }
}

impl PollSchedule {
    pub fn from_config(config: &session::ConfigValueGroup) -> Self {
        Self {
            interval: config.poll_interval,
            error_delay: config.poll_error_delay,
        }
    }
}

/// Liveness flag of one polling run.  Once stopped, no further cycle of that run fires.
#[derive(Clone, Debug)]
pub struct PollControl {
    alive: Arc<AtomicBool>,
}

impl PollControl {
    fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn stop(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

struct ActiveRun {
    session_id: SessionId,
    control: PollControl,
    task: JoinHandle<()>,
}

/// Runs at most one poll loop at a time.
///
/// Each cycle is awaited to completion before the next delay is armed, so cycles never
/// overlap.  `stop_polling` clears the run's liveness flag and aborts its task; the flag
/// is checked before arming the timer and again when it fires, so no cycle starts after
/// `stop_polling` returns, even when it is called from inside a cycle.
#[derive(Default)]
pub struct PollingScheduler {
    active: Mutex<Option<ActiveRun>>,
    last_cycle: Arc<Mutex<Option<PollCycle>>>,
}

impl PollingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts polling `session_id`, replacing any run already active.  `cycle` performs one
    /// status fetch; an `Err` is recorded and the next cycle is delayed by `error_delay`.
    /// Must be called within a tokio runtime.
    pub fn start_polling<F, Fut>(&self, session_id: SessionId, schedule: PollSchedule, mut cycle: F)
    where
        F: FnMut(PollControl) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.stop_polling();
        *self.last_cycle.lock() = None;

        let control = PollControl::new();
        let last_cycle = self.last_cycle.clone();

        let task = {
            let control = control.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                let mut attempt = 0u64;
                let mut delay = schedule.interval;

                loop {
                    if !control.is_alive() {
                        break;
                    }
                    tokio::time::sleep(delay).await;
                    if !control.is_alive() {
                        break;
                    }

                    attempt += 1;
                    let outcome = cycle(control.clone()).await;

                    let (last_error, next_delay) = match outcome {
                        Ok(()) => (None, schedule.interval),
                        Err(e) => {
                            debug!(%session_id, attempt, error = %e, "poll cycle failed");
                            (Some(e), schedule.error_delay)
                        },
                    };
                    *last_cycle.lock() = Some(PollCycle {
                        attempt,
                        last_error,
                        next_delay,
                    });
                    delay = next_delay;
                }

                debug!(%session_id, attempt, "polling finished");
            })
        };

        info!(%session_id, interval_ms = schedule.interval.as_millis() as u64, "polling started");
        *self.active.lock() = Some(ActiveRun {
            session_id,
            control,
            task,
        });
    }

    /// Stops the active run, if any.  Idempotent.
    pub fn stop_polling(&self) {
        let Some(run) = self.active.lock().take() else {
            return;
        };
        run.control.stop();
        run.task.abort();
        debug!(session_id = %run.session_id, "polling stopped");
    }

    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|run| run.control.is_alive() && !run.task.is_finished())
    }

    pub fn last_cycle(&self) -> Option<PollCycle> {
        self.last_cycle.lock().clone()
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop_polling();
    }
}
