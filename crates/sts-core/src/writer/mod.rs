//! Transactional batch writes of metric samples.
//!
//! [`StoreWriter`] keeps one connection and the two prepared insert
//! statements for its lifetime. Each write call is one transaction: every
//! row of the batch is committed, or none is.
//!
//! # Example
//!
//! ```
//! use sts_core::model::CpuSample;
//! use sts_core::writer::{MemoryStore, MetricsWriter, StoreWriter, CPU_METRICS_TABLE};
//!
//! let store = MemoryStore::new();
//! let mut writer = StoreWriter::new(store.clone());
//!
//! writer.ping_connect().unwrap();
//! writer.prepare().unwrap();
//! writer.write_cpu(&[CpuSample { cpu: "cpu0".into(), ..Default::default() }]).unwrap();
//!
//! assert_eq!(store.rows(CPU_METRICS_TABLE).len(), 1);
//! ```

pub mod memory;
pub mod pg_store;
mod queries;
mod rows;
mod store;

pub use memory::{MemoryStore, StoreEvent};
pub use pg_store::PgStore;
pub use queries::{
    CPU_METRICS_TABLE, INSERT_CPU_METRICS, INSERT_PROCESSES_METRICS, PROCESSES_METRICS_TABLE,
};
pub use rows::InsertRow;
pub use store::{Ping, SqlValue, Store, StoreTransaction};

use tracing::{debug, warn};

use crate::error::{ConnectionError, PrepareError, WriteError};
use crate::model::{CpuSample, ProcessSample};

/// Persists batches of samples.
pub trait MetricsWriter: Send {
    /// Checks the connection, re-opening it if it dropped.
    fn ping_connect(&mut self) -> Result<(), ConnectionError>;

    fn prepared(&self) -> bool;

    /// Prepares both insert statements. Safe to call again after a failure.
    fn prepare(&mut self) -> Result<(), PrepareError>;

    fn write_cpu(&mut self, samples: &[CpuSample]) -> Result<(), WriteError>;

    fn write_processes(&mut self, samples: &[ProcessSample]) -> Result<(), WriteError>;

    /// Drops statements and the connection.
    fn close(&mut self);
}

#[derive(Debug, Clone)]
struct Statements<S> {
    cpu: S,
    processes: S,
}

/// [`MetricsWriter`] over any [`Store`].
pub struct StoreWriter<S: Store> {
    store: S,
    statements: Option<Statements<S::Statement>>,
}

impl<S: Store> StoreWriter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            statements: None,
        }
    }

    fn prepare_one(
        &mut self,
        query: &'static str,
        table: &'static str,
    ) -> Result<S::Statement, PrepareError> {
        self.store.prepare(query).map_err(|source| PrepareError {
            statement: table,
            source,
        })
    }
}

impl<S: Store> MetricsWriter for StoreWriter<S> {
    fn ping_connect(&mut self) -> Result<(), ConnectionError> {
        match self.store.ping()? {
            Ping::Alive => {}
            Ping::Reconnected => {
                if self.statements.take().is_some() {
                    warn!("connection re-established, prepared statements discarded");
                }
            }
        }
        Ok(())
    }

    fn prepared(&self) -> bool {
        self.statements.is_some()
    }

    fn prepare(&mut self) -> Result<(), PrepareError> {
        let cpu = self.prepare_one(CpuSample::QUERY, CpuSample::TABLE)?;
        let processes = self.prepare_one(ProcessSample::QUERY, ProcessSample::TABLE)?;

        self.statements = Some(Statements { cpu, processes });
        debug!("insert statements prepared");
        Ok(())
    }

    fn write_cpu(&mut self, samples: &[CpuSample]) -> Result<(), WriteError> {
        let statement = match &self.statements {
            Some(s) => s.cpu.clone(),
            None => return Err(WriteError::NotPrepared),
        };
        insert_all(&mut self.store, &statement, samples)
    }

    fn write_processes(&mut self, samples: &[ProcessSample]) -> Result<(), WriteError> {
        let statement = match &self.statements {
            Some(s) => s.processes.clone(),
            None => return Err(WriteError::NotPrepared),
        };
        insert_all(&mut self.store, &statement, samples)
    }

    fn close(&mut self) {
        self.statements = None;
        self.store.close();
    }
}

/// Inserts every row inside one transaction.
///
/// Stops at the first failing row and rolls back.
fn insert_all<S: Store, R: InsertRow>(
    store: &mut S,
    statement: &S::Statement,
    rows: &[R],
) -> Result<(), WriteError> {
    let mut tx = store.begin().map_err(WriteError::Begin)?;

    for (row, sample) in rows.iter().enumerate() {
        if let Err(insert) = tx.execute(statement, &sample.params()) {
            return match tx.rollback() {
                Ok(()) => Err(WriteError::Insert {
                    row,
                    source: insert,
                }),
                Err(rollback) => Err(WriteError::Rollback {
                    row,
                    insert,
                    rollback,
                }),
            };
        }
    }

    tx.commit().map_err(WriteError::Commit)?;
    debug!(table = R::TABLE, rows = rows.len(), "batch committed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcessStatus;

    fn ready() -> (MemoryStore, StoreWriter<MemoryStore>) {
        let store = MemoryStore::new();
        let mut writer = StoreWriter::new(store.clone());
        writer.ping_connect().unwrap();
        writer.prepare().unwrap();
        (store, writer)
    }

    fn cpu(name: &str) -> CpuSample {
        CpuSample {
            cpu: name.to_string(),
            ..Default::default()
        }
    }

    fn process(pid: i32, status: ProcessStatus) -> ProcessSample {
        ProcessSample {
            pid,
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_cpu_row_parameters() {
        let (store, mut writer) = ready();
        let sample = CpuSample {
            cpu: "cpu0".to_string(),
            percent: 12.5,
            user: 3.1,
            system: 1.2,
            idle: 90.0,
            iowait: 0.1,
            ..Default::default()
        };

        writer.write_cpu(&[sample]).unwrap();

        let rows = store.rows(CPU_METRICS_TABLE);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0],
            vec![
                SqlValue::Text("cpu0".to_string()),
                SqlValue::Float8(12.5),
                SqlValue::Float8(3.1),
                SqlValue::Float8(1.2),
                SqlValue::Float8(90.0),
                SqlValue::Float8(0.0),
                SqlValue::Float8(0.1),
                SqlValue::Float8(0.0),
                SqlValue::Float8(0.0),
                SqlValue::Float8(0.0),
                SqlValue::Float8(0.0),
                SqlValue::Float8(0.0),
            ]
        );
    }

    #[test]
    fn test_batch_commits_in_one_transaction() {
        let (store, mut writer) = ready();
        let batch: Vec<_> = (1..=3).map(|pid| process(pid, ProcessStatus::Running)).collect();

        writer.write_processes(&batch).unwrap();

        assert_eq!(store.rows(PROCESSES_METRICS_TABLE).len(), 3);
        let begins = store
            .events()
            .iter()
            .filter(|e| **e == StoreEvent::Begin)
            .count();
        assert_eq!(begins, 1);
    }

    #[test]
    fn test_zombie_status_stored_as_word() {
        let (store, mut writer) = ready();
        let code = ProcessStatus::from_code('Z').unwrap();
        writer.write_processes(&[process(7, code)]).unwrap();

        let rows = store.rows(PROCESSES_METRICS_TABLE);
        assert_eq!(rows[0][3], SqlValue::Text("Zombie".to_string()));
    }

    #[test]
    fn test_failed_insert_rolls_back_whole_batch() {
        let (store, mut writer) = ready();
        store.fail_insert(CPU_METRICS_TABLE, 1);

        let err = writer
            .write_cpu(&[cpu("cpu0"), cpu("cpu1"), cpu("cpu2")])
            .unwrap_err();

        assert!(matches!(err, WriteError::Insert { row: 1, .. }));
        assert!(store.rows(CPU_METRICS_TABLE).is_empty());
        assert_eq!(store.events().last(), Some(&StoreEvent::Rollback));
    }

    #[test]
    fn test_rollback_failure_reports_both_errors() {
        let (store, mut writer) = ready();
        store.fail_insert(PROCESSES_METRICS_TABLE, 0);
        store.fail_rollback(true);

        let err = writer
            .write_processes(&[process(1, ProcessStatus::Sleep)])
            .unwrap_err();

        match err {
            WriteError::Rollback { row, insert, rollback } => {
                assert_eq!(row, 0);
                assert!(insert.to_string().contains("insert into processes_metrics"));
                assert!(rollback.to_string().contains("roll back"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.rows(PROCESSES_METRICS_TABLE).is_empty());
    }

    #[test]
    fn test_begin_failure_writes_nothing() {
        let (store, mut writer) = ready();
        store.fail_next_begins(1);

        let err = writer.write_cpu(&[cpu("cpu0"), cpu("cpu1")]).unwrap_err();
        assert!(matches!(err, WriteError::Begin(_)));
        assert!(store.rows(CPU_METRICS_TABLE).is_empty());
        assert!(!store.events().iter().any(|e| matches!(e, StoreEvent::Execute { .. })));

        writer.write_cpu(&[cpu("cpu0")]).unwrap();
        assert_eq!(store.rows(CPU_METRICS_TABLE).len(), 1);
    }

    #[test]
    fn test_insert_failure_is_per_batch() {
        let (store, mut writer) = ready();
        store.fail_insert(CPU_METRICS_TABLE, 0);
        assert!(writer.write_cpu(&[cpu("cpu0")]).is_err());

        store.clear_insert_failure();
        writer.write_cpu(&[cpu("cpu0"), cpu("cpu1")]).unwrap();
        assert_eq!(store.rows(CPU_METRICS_TABLE).len(), 2);
    }

    #[test]
    fn test_commit_failure() {
        let (store, mut writer) = ready();
        store.fail_commit(true);

        let err = writer.write_cpu(&[cpu("cpu0")]).unwrap_err();
        assert!(matches!(err, WriteError::Commit(_)));
        assert!(store.rows(CPU_METRICS_TABLE).is_empty());
    }

    #[test]
    fn test_empty_batch_commits() {
        let (store, mut writer) = ready();
        writer.write_cpu(&[]).unwrap();

        let events = store.events();
        assert_eq!(&events[events.len() - 2..], &[StoreEvent::Begin, StoreEvent::Commit]);
        assert!(store.rows(CPU_METRICS_TABLE).is_empty());
    }

    #[test]
    fn test_write_before_prepare() {
        let store = MemoryStore::new();
        let mut writer = StoreWriter::new(store.clone());
        writer.ping_connect().unwrap();

        assert!(!writer.prepared());
        assert!(matches!(
            writer.write_cpu(&[cpu("cpu0")]),
            Err(WriteError::NotPrepared)
        ));
        assert!(!store.events().contains(&StoreEvent::Begin));
    }

    #[test]
    fn test_prepare_failure_then_retry() {
        let store = MemoryStore::new();
        let mut writer = StoreWriter::new(store.clone());
        writer.ping_connect().unwrap();

        store.fail_prepare(true);
        let err = writer.prepare().unwrap_err();
        assert_eq!(err.statement, CPU_METRICS_TABLE);
        assert!(!writer.prepared());

        store.fail_prepare(false);
        writer.prepare().unwrap();
        assert!(writer.prepared());
    }

    #[test]
    fn test_ping_unconfigured() {
        let mut writer = StoreWriter::new(MemoryStore::unconfigured());
        let err = writer.ping_connect().unwrap_err();
        assert!(err.to_string().starts_with("database ping error"));
    }

    #[test]
    fn test_reconnect_clears_prepared() {
        let (store, mut writer) = ready();
        assert!(writer.prepared());

        writer.ping_connect().unwrap();
        assert!(writer.prepared());

        store.drop_connection();
        writer.ping_connect().unwrap();
        assert!(!writer.prepared());

        writer.prepare().unwrap();
        writer.write_cpu(&[cpu("cpu0")]).unwrap();
        assert_eq!(store.rows(CPU_METRICS_TABLE).len(), 1);
    }

    #[test]
    fn test_close_drops_statements() {
        let (_store, mut writer) = ready();
        writer.close();
        assert!(!writer.prepared());
        assert!(writer.ping_connect().is_ok());
    }
}
