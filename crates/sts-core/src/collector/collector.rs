//! Collector backed by the `/proc` filesystem.

use std::time::Instant;

use tracing::debug;

use crate::collector::MetricsCollector;
use crate::collector::procfs::cpu::zip_cpu_samples;
use crate::collector::procfs::{CpuReader, ProcessReader};
use crate::collector::traits::FileSystem;
use crate::error::CollectionError;
use crate::model::{CpuSample, ProcessSample};

/// Reads CPU and process metrics from `/proc`.
pub struct ProcfsCollector<F: FileSystem + Clone> {
    cpu: CpuReader<F>,
    processes: ProcessReader<F>,
}

impl<F: FileSystem + Clone> ProcfsCollector<F> {
    /// Creates a new collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        let proc_path = proc_path.into();
        Self {
            cpu: CpuReader::new(fs.clone(), &proc_path),
            processes: ProcessReader::new(fs, &proc_path),
        }
    }
}

impl<F: FileSystem + Clone> MetricsCollector for ProcfsCollector<F> {
    fn collect_cpu(&mut self) -> Result<Vec<CpuSample>, CollectionError> {
        let start = Instant::now();
        let times = self.cpu.times()?;
        let percents = self.cpu.percents()?;
        let samples = zip_cpu_samples(times, percents)?;
        debug!(
            cores = samples.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "cpu collected"
        );
        Ok(samples)
    }

    fn collect_processes(&mut self) -> Result<Vec<ProcessSample>, CollectionError> {
        let start = Instant::now();
        let samples = self.processes.read_all()?;
        debug!(
            processes = samples.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "processes collected"
        );
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use crate::model::ProcessStatus;

    #[test]
    fn test_collect_cpu() {
        let mut collector = ProcfsCollector::new(MockFs::typical_system(), "/proc");
        let cpus = collector.collect_cpu().unwrap();

        let ids: Vec<&str> = cpus.iter().map(|c| c.cpu.as_str()).collect();
        assert_eq!(ids, vec!["cpu0", "cpu1", "cpu2", "cpu3"]);
        assert_eq!(cpus[0].user, 25.0);
        assert_eq!(cpus[0].nice, 1.25);
        assert_eq!(cpus[0].idle, 200.0);
        // measured against the baseline taken at construction
        assert!(cpus.iter().all(|c| c.percent == 0.0));
    }

    #[test]
    fn test_collect_cpu_twice_measures_delta() {
        let fs = MockFs::typical_system();
        let mut collector = ProcfsCollector::new(fs.clone(), "/proc");
        collector.collect_cpu().unwrap();

        let cpus = collector.collect_cpu().unwrap();
        // nothing moved between the two reads
        assert!(cpus.iter().all(|c| c.percent == 0.0));
    }

    #[test]
    fn test_collect_cpu_without_stat_fails() {
        let fs = MockFs::typical_system();
        fs.remove("/proc/stat");
        let mut collector = ProcfsCollector::new(fs, "/proc");
        assert!(collector.collect_cpu().is_err());
    }

    #[test]
    fn test_collect_processes() {
        let mut collector = ProcfsCollector::new(MockFs::with_odd_processes(), "/proc");
        let processes = collector.collect_processes().unwrap();

        assert_eq!(processes.len(), 5);
        let statuses: Vec<ProcessStatus> = processes.iter().map(|p| p.status).collect();
        assert!(statuses.contains(&ProcessStatus::Zombie));
        assert!(statuses.contains(&ProcessStatus::Undefined));
    }
}
