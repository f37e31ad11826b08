//! Per-core CPU timing and utilization from `/proc/stat`.

use crate::collector::procfs::parser::{CpuTimes, parse_per_cpu_times};
use crate::collector::traits::FileSystem;
use crate::error::CollectionError;
use crate::model::CpuSample;
use std::path::Path;
use tracing::debug;

/// Clock ticks per second (USER_HZ). Standard value for Linux.
pub(crate) const CLK_TCK: f64 = 100.0;

/// Utilization of one core, as returned by [`CpuReader::percents`].
#[derive(Debug, Clone, PartialEq)]
pub struct CpuPercent {
    pub cpu: String,
    pub percent: f64,
}

/// Reads per-core counters and derives utilization between calls.
pub struct CpuReader<F: FileSystem> {
    fs: F,
    stat_path: String,
    /// Counters seen by the previous `percents()` call, or at construction.
    /// A core missing here is measured since boot.
    last: Vec<CpuTimes>,
}

impl<F: FileSystem> CpuReader<F> {
    /// Creates a reader and takes the baseline for the first `percents()`.
    pub fn new(fs: F, proc_path: &str) -> Self {
        let mut reader = Self {
            fs,
            stat_path: format!("{}/stat", proc_path),
            last: Vec::new(),
        };
        match reader.times() {
            Ok(times) => reader.last = times,
            Err(e) => debug!(error = %e, "no cpu baseline, first reading measures since boot"),
        }
        reader
    }

    /// Current per-core counters in ticks.
    pub fn times(&self) -> Result<Vec<CpuTimes>, CollectionError> {
        let content = self
            .fs
            .read_to_string(Path::new(&self.stat_path))
            .map_err(|source| CollectionError::Io {
                path: self.stat_path.clone(),
                source,
            })?;
        parse_per_cpu_times(&content).map_err(|e| CollectionError::Parse {
            path: self.stat_path.clone(),
            message: e.message,
        })
    }

    /// Per-core utilization since the previous call.
    pub fn percents(&mut self) -> Result<Vec<CpuPercent>, CollectionError> {
        let current = self.times()?;

        let percents = current
            .iter()
            .map(|now| {
                let before = self.last.iter().find(|c| c.cpu == now.cpu);
                CpuPercent {
                    cpu: now.cpu.clone(),
                    percent: busy_percent(before, now),
                }
            })
            .collect();

        self.last = current;
        Ok(percents)
    }
}

/// Utilization between two readings of the same core, clamped to 0..=100.
///
/// A counter that moved backwards (e.g. after CPU hotplug) falls into the
/// same branches as one that did not advance.
pub fn busy_percent(before: Option<&CpuTimes>, now: &CpuTimes) -> f64 {
    let (busy_before, total_before) = before.map_or((0, 0), |b| (b.busy(), b.total()));
    let (busy_now, total_now) = (now.busy(), now.total());

    if busy_now <= busy_before {
        return 0.0;
    }
    if total_now <= total_before {
        return 100.0;
    }

    let percent = (busy_now - busy_before) as f64 / (total_now - total_before) as f64 * 100.0;
    percent.clamp(0.0, 100.0)
}

/// Pairs the timing and percent reads by index.
///
/// Both lists come from separate reads of `/proc/stat`; if a core appeared or
/// disappeared in between, the batch is rejected instead of mis-pairing rows.
pub fn zip_cpu_samples(
    times: Vec<CpuTimes>,
    percents: Vec<CpuPercent>,
) -> Result<Vec<CpuSample>, CollectionError> {
    if times.len() != percents.len() {
        return Err(CollectionError::Misaligned {
            times: times.len(),
            percents: percents.len(),
        });
    }

    times
        .into_iter()
        .zip(percents)
        .enumerate()
        .map(|(index, (t, p))| {
            if t.cpu != p.cpu {
                return Err(CollectionError::CoreMismatch {
                    index,
                    expected: t.cpu,
                    actual: p.cpu,
                });
            }
            Ok(CpuSample {
                percent: p.percent,
                user: t.user as f64 / CLK_TCK,
                system: t.system as f64 / CLK_TCK,
                idle: t.idle as f64 / CLK_TCK,
                nice: t.nice as f64 / CLK_TCK,
                iowait: t.iowait as f64 / CLK_TCK,
                irq: t.irq as f64 / CLK_TCK,
                softirq: t.softirq as f64 / CLK_TCK,
                steal: t.steal as f64 / CLK_TCK,
                guest: t.guest as f64 / CLK_TCK,
                guest_nice: t.guest_nice as f64 / CLK_TCK,
                cpu: t.cpu,
            })
        })
        .collect()
}
