//! One collection-and-write cycle.

use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::collector::MetricsCollector;
use crate::error::{CollectionError, WriteError};
use crate::scheduler::Task;
use crate::writer::MetricsWriter;

/// Result of one collect-and-write step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The batch was committed with this many rows.
    Written(usize),
    CollectFailed,
    WriteFailed,
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The store was unreachable; nothing was collected.
    Disconnected,
    /// Statements could not be prepared; nothing was collected.
    NotPrepared,
    Completed {
        cpu: StepOutcome,
        processes: StepOutcome,
    },
}

/// Collector and writer driven once per tick.
pub struct Pipeline<C, W> {
    collector: C,
    writer: W,
    interval: Duration,
}

impl<C: MetricsCollector, W: MetricsWriter> Pipeline<C, W> {
    /// `interval` is only used to flag slow ticks.
    pub fn new(collector: C, writer: W, interval: Duration) -> Self {
        Self {
            collector,
            writer,
            interval,
        }
    }

    /// Runs one cycle: ping, prepare if needed, CPU, then processes.
    ///
    /// Errors are logged here and never returned.
    pub fn run_tick(&mut self) -> TickOutcome {
        let started = Instant::now();
        let outcome = self.cycle();
        let elapsed = started.elapsed();

        debug!(
            duration_ms = elapsed.as_millis() as u64,
            outcome = ?outcome,
            "tick completed"
        );
        if elapsed > self.interval / 2 {
            warn!(
                duration_ms = elapsed.as_millis() as u64,
                interval_ms = self.interval.as_millis() as u64,
                "tick exceeded 50% of interval"
            );
        }
        outcome
    }

    fn cycle(&mut self) -> TickOutcome {
        if let Err(e) = self.writer.ping_connect() {
            error!(error = %e, "store unreachable, skipping tick");
            return TickOutcome::Disconnected;
        }

        if !self.writer.prepared()
            && let Err(e) = self.writer.prepare()
        {
            error!(error = %e, "skipping tick");
            return TickOutcome::NotPrepared;
        }

        let cpu = step("cpu", self.collector.collect_cpu(), |samples| {
            self.writer.write_cpu(samples)
        });
        let processes = step("processes", self.collector.collect_processes(), |samples| {
            self.writer.write_processes(samples)
        });

        TickOutcome::Completed { cpu, processes }
    }

    /// Releases the store connection.
    pub fn close(&mut self) {
        self.writer.close();
    }
}

impl<C, W> Task for Pipeline<C, W>
where
    C: MetricsCollector + 'static,
    W: MetricsWriter + 'static,
{
    fn run(&mut self) {
        self.run_tick();
    }
}

fn step<T>(
    kind: &'static str,
    collected: Result<Vec<T>, CollectionError>,
    write: impl FnOnce(&[T]) -> Result<(), WriteError>,
) -> StepOutcome {
    let samples = match collected {
        Ok(samples) => samples,
        Err(e) => {
            error!(kind, error = %e, "collection failed");
            return StepOutcome::CollectFailed;
        }
    };

    match write(&samples) {
        Ok(()) => {
            debug!(kind, rows = samples.len(), "metrics written");
            StepOutcome::Written(samples.len())
        }
        Err(e) => {
            error!(kind, error = %e, "write failed");
            StepOutcome::WriteFailed
        }
    }
}
