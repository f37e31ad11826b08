//! Fixed-cadence, no-overlap task runner.
//!
//! A ticker thread wakes every `interval` and offers a trigger to the
//! worker thread over a zero-capacity channel. The offer only succeeds when
//! the worker is idle and blocked on the channel; otherwise the trigger is
//! dropped and counted as skipped. Triggers are never queued, so at most one
//! task invocation runs at a time.

mod task;

pub use task::{Pipeline, StepOutcome, TickOutcome};

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

/// Longest uninterrupted sleep of the ticker, so `stop()` is prompt.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Work invoked on every accepted trigger.
pub trait Task: Send + 'static {
    fn run(&mut self);
}

/// Trigger counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Triggers accepted by the worker.
    pub fired: u64,
    /// Triggers dropped because the previous invocation was still running.
    pub skipped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    fired: AtomicU64,
    skipped: AtomicU64,
}

/// Handle to a running scheduler.
///
/// Dropping the handle signals the ticker to stop but does not wait;
/// use [`SchedulerHandle::stop`] to wait for the in-flight invocation.
pub struct SchedulerHandle<T: Task> {
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    ticker: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<T>>,
}

/// Starts running `task` every `interval`. The first trigger fires one
/// interval after start.
pub fn spawn<T: Task>(interval: Duration, task: T) -> io::Result<SchedulerHandle<T>> {
    if interval.is_zero() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "scheduler interval must be positive",
        ));
    }

    let running = Arc::new(AtomicBool::new(true));
    let counters = Arc::new(Counters::default());
    let (trigger, triggers) = mpsc::sync_channel::<()>(0);

    let worker = thread::Builder::new()
        .name("sts-worker".to_string())
        .spawn(move || worker_loop(triggers, task))?;

    let ticker = {
        let running = running.clone();
        let counters = counters.clone();
        thread::Builder::new()
            .name("sts-ticker".to_string())
            .spawn(move || ticker_loop(interval, trigger, &running, &counters))?
    };

    info!(interval_ms = interval.as_millis() as u64, "scheduler started");
    Ok(SchedulerHandle {
        running,
        counters,
        ticker: Some(ticker),
        worker: Some(worker),
    })
}

fn worker_loop<T: Task>(triggers: Receiver<()>, mut task: T) -> T {
    while triggers.recv().is_ok() {
        task.run();
    }
    task
}

fn ticker_loop(
    interval: Duration,
    trigger: SyncSender<()>,
    running: &AtomicBool,
    counters: &Counters,
) {
    while sleep_while_running(interval, running) {
        match trigger.try_send(()) {
            Ok(()) => {
                counters.fired.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(())) => {
                let skipped = counters.skipped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(skipped, "previous tick still running, trigger skipped");
            }
            Err(TrySendError::Disconnected(())) => {
                error!("worker thread exited, ticker stopping");
                return;
            }
        }
    }
}

/// Sleeps for `duration` in short slices. Returns `false` if stopped meanwhile.
fn sleep_while_running(duration: Duration, running: &AtomicBool) -> bool {
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let slice = remaining.min(SLEEP_SLICE);
        thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
    running.load(Ordering::SeqCst)
}

impl<T: Task> SchedulerHandle<T> {
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            fired: self.counters.fired.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }

    /// Stops the ticker and waits for the in-flight invocation to finish.
    ///
    /// Returns the task, or `None` if the worker panicked.
    pub fn stop(mut self) -> Option<T> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(ticker) = self.ticker.take()
            && ticker.join().is_err()
        {
            error!("ticker thread panicked");
        }

        let task = match self.worker.take()?.join() {
            Ok(task) => Some(task),
            Err(_) => {
                error!("worker thread panicked");
                None
            }
        };

        let stats = self.stats();
        info!(
            fired = stats.fired,
            skipped = stats.skipped,
            "scheduler stopped"
        );
        task
    }
}

impl<T: Task> Drop for SchedulerHandle<T> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
