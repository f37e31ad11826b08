//! Error taxonomy for the collection → write pipeline.
//!
//! Field-level failures ([`FieldReadError`]) are never propagated past the
//! collector; they degrade a single value and are logged. Everything else
//! ends a batch or a tick and is logged by the scheduler.

use thiserror::Error;

/// Failure reported by a [`Store`](crate::writer::Store) implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store has no configured connection.
    #[error("connection hasn't been opened yet")]
    NotConnected,

    /// Error raised by the PostgreSQL driver.
    #[error("{0}")]
    Postgres(String),

    /// Failure injected by the in-memory store.
    #[error("{0}")]
    Injected(String),
}

impl From<postgres::Error> for StoreError {
    fn from(e: postgres::Error) -> Self {
        StoreError::Postgres(crate::writer::pg_store::format_postgres_error(&e))
    }
}

/// A bulk OS read failed, so no batch could be produced.
#[derive(Error, Debug)]
pub enum CollectionError {
    /// I/O error reading a `/proc` file or directory.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A `/proc` file did not have the expected format.
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    /// The timing read and the percent read disagree on the set of cores.
    #[error("cpu reads are misaligned: {times} timing entries vs {percents} percent entries")]
    Misaligned { times: usize, percents: usize },

    /// Same number of cores, but the identifiers differ at `index`.
    #[error("cpu reads are misaligned at index {index}: {expected} vs {actual}")]
    CoreMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
}

/// A single per-process field could not be read. Non-fatal.
///
/// Cloneable because one failed file read degrades several fields.
#[derive(Error, Debug, Clone)]
pub enum FieldReadError {
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    /// A shared input (e.g. `/proc/meminfo`) was not available this cycle.
    #[error("{0} unavailable")]
    Unavailable(&'static str),
}

/// The store is unreachable.
#[derive(Error, Debug)]
#[error("database ping error: {0}")]
pub struct ConnectionError(#[from] pub StoreError);

/// Statement compilation failed; retried on the next tick.
#[derive(Error, Debug)]
#[error("creating prepared statement error ({statement}): {source}")]
pub struct PrepareError {
    pub statement: &'static str,
    #[source]
    pub source: StoreError,
}

/// A batch write failed and nothing from it was committed.
#[derive(Error, Debug)]
pub enum WriteError {
    /// `prepare()` has not succeeded yet.
    #[error("statements are not prepared")]
    NotPrepared,

    #[error("failed to begin transaction: {0}")]
    Begin(#[source] StoreError),

    /// Insert of row `row` failed; the transaction was rolled back.
    #[error("insert of row {row} failed: {source}")]
    Insert {
        row: usize,
        #[source]
        source: StoreError,
    },

    /// Insert failed and the rollback failed as well.
    #[error("insert of row {row} failed: {insert}; rollback also failed: {rollback}")]
    Rollback {
        row: usize,
        insert: StoreError,
        rollback: StoreError,
    },

    #[error("failed to commit transaction: {0}")]
    Commit(#[source] StoreError),
}
