//! Host metrics collection.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │             ProcfsCollector                   │
//! │  ┌──────────────────┐  ┌───────────────────┐  │
//! │  │    CpuReader     │  │   ProcessReader   │  │
//! │  │  - /proc/stat    │  │  - /proc/[pid]/*  │  │
//! │  └────────┬─────────┘  │  - /etc/passwd    │  │
//! │           │            └─────────┬─────────┘  │
//! │           └───────────┬──────────┘            │
//! │                ┌──────▼──────┐                │
//! │                │  FileSystem │ (trait)        │
//! │                └──────┬──────┘                │
//! └───────────────────────┼───────────────────────┘
//!              ┌──────────┴──────────┐
//!       ┌──────▼──────┐       ┌──────▼──────┐
//!       │   RealFs    │       │   MockFs    │
//!       └─────────────┘       └─────────────┘
//! ```
//!
//! ```
//! use sts_core::collector::{MetricsCollector, MockFs, ProcfsCollector};
//!
//! let mut collector = ProcfsCollector::new(MockFs::typical_system(), "/proc");
//! let cpus = collector.collect_cpu().unwrap();
//! assert_eq!(cpus.len(), 4);
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod mock;
pub mod procfs;
pub mod traits;

pub use collector::ProcfsCollector;
pub use mock::MockFs;
pub use traits::{FileSystem, RealFs};

use crate::error::CollectionError;
use crate::model::{CpuSample, ProcessSample};

/// Source of one batch per metric kind.
///
/// Each call re-reads OS state; nothing is cached between calls.
pub trait MetricsCollector: Send {
    /// One sample per logical core.
    ///
    /// # Errors
    ///
    /// Fails if either bulk read fails or the reads disagree on the cores.
    fn collect_cpu(&mut self) -> Result<Vec<CpuSample>, CollectionError>;

    /// One sample per visible process. Per-field failures degrade fields
    /// instead of failing the call. A process that exits while being read
    /// is left out, so there can be fewer samples than listed pids.
    ///
    /// # Errors
    ///
    /// Fails only if the process table itself cannot be listed.
    fn collect_processes(&mut self) -> Result<Vec<ProcessSample>, CollectionError>;
}
