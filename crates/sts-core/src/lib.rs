//! sts-core: host metrics collection and storage.
//!
//! Provides:
//! - `collector`: per-core CPU and per-process metrics from `/proc`
//! - `writer`: transactional batch inserts into PostgreSQL
//! - `scheduler`: fixed-cadence tick runner that never overlaps itself
//! - `model`: sample types shared by the above
//! - `error`: error types of the collection → write pipeline

pub mod collector;
pub mod error;
pub mod model;
pub mod scheduler;
pub mod writer;
