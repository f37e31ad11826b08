//! Abstraction over the relational store.
//!
//! The writer needs a health check, statement preparation, and transactions
//! that execute prepared statements. [`PgStore`] implements them over the
//! synchronous `postgres` client, [`MemoryStore`] in memory for tests.
//!
//! [`PgStore`]: super::pg_store::PgStore
//! [`MemoryStore`]: super::memory::MemoryStore

use crate::error::StoreError;

/// A statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int4(i32),
    Float4(f32),
    Float8(f64),
    Text(String),
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int4(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        SqlValue::Float4(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float8(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

/// Outcome of a successful health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ping {
    /// The existing connection answered.
    Alive,
    /// A new connection was opened; statements prepared on the previous
    /// one are gone.
    Reconnected,
}

/// A database connection able to prepare statements and run transactions.
pub trait Store: Send {
    /// Handle to a prepared statement, valid for the connection it was
    /// prepared on.
    type Statement: Clone + Send;

    type Transaction<'a>: StoreTransaction<Statement = Self::Statement>
    where
        Self: 'a;

    /// Checks the connection, opening a new one if it is missing or dead.
    fn ping(&mut self) -> Result<Ping, StoreError>;

    fn prepare(&mut self, query: &str) -> Result<Self::Statement, StoreError>;

    fn begin(&mut self) -> Result<Self::Transaction<'_>, StoreError>;

    /// Drops the connection.
    fn close(&mut self);
}

/// An open transaction. Dropping it without `commit` rolls it back.
pub trait StoreTransaction {
    type Statement;

    /// Executes a prepared statement, returning the affected row count.
    fn execute(
        &mut self,
        statement: &Self::Statement,
        params: &[SqlValue],
    ) -> Result<u64, StoreError>;

    fn commit(self) -> Result<(), StoreError>;

    fn rollback(self) -> Result<(), StoreError>;
}
