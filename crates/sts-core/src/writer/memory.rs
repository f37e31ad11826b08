//! In-memory [`Store`] for tests.
//!
//! Keeps committed rows per table, records every interaction in order, and
//! can be told to fail at any step. Clones share state, so a test keeps one
//! handle for inspection after moving another into the writer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::StoreError;
use crate::writer::queries::insert_target;
use crate::writer::store::{Ping, SqlValue, Store, StoreTransaction};

/// One recorded store interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Ping,
    Prepare(String),
    Begin,
    Execute { table: String, params: Vec<SqlValue> },
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
struct State {
    unconfigured: bool,
    connected: bool,
    generation: u64,
    drop_connection: bool,
    fail_ping: bool,
    fail_prepare: bool,
    failing_begins: usize,
    fail_insert: Option<(String, usize)>,
    fail_commit: bool,
    fail_rollback: bool,
    delay: Duration,
    rows: HashMap<String, Vec<Vec<SqlValue>>>,
    events: Vec<StoreEvent>,
    open_transactions: usize,
    max_open_transactions: usize,
}

/// Statement handle bound to the connection generation it was prepared on.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryStatement {
    table: String,
    generation: u64,
}

/// Store that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose connection was never set up; every call fails.
    pub fn unconfigured() -> Self {
        let store = Self::new();
        store.lock().unconfigured = true;
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_ping(&self, fail: bool) {
        self.lock().fail_ping = fail;
    }

    pub fn fail_prepare(&self, fail: bool) {
        self.lock().fail_prepare = fail;
    }

    /// Makes the next `count` calls to `begin` fail.
    pub fn fail_next_begins(&self, count: usize) {
        self.lock().failing_begins = count;
    }

    /// Makes the `row`-th insert (0-based) of every transaction on `table` fail.
    pub fn fail_insert(&self, table: &str, row: usize) {
        self.lock().fail_insert = Some((table.to_string(), row));
    }

    pub fn clear_insert_failure(&self) {
        self.lock().fail_insert = None;
    }

    pub fn fail_commit(&self, fail: bool) {
        self.lock().fail_commit = fail;
    }

    pub fn fail_rollback(&self, fail: bool) {
        self.lock().fail_rollback = fail;
    }

    /// Sleeps this long at the start of every transaction.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    /// Simulates a server-side disconnect: the next ping reconnects and
    /// statements prepared before it stop working.
    pub fn drop_connection(&self) {
        self.lock().drop_connection = true;
    }

    /// Committed rows of `table`, in insert order.
    pub fn rows(&self, table: &str) -> Vec<Vec<SqlValue>> {
        self.lock().rows.get(table).cloned().unwrap_or_default()
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.lock().events.clone()
    }

    /// Highest number of simultaneously open transactions seen so far.
    pub fn max_open_transactions(&self) -> usize {
        self.lock().max_open_transactions
    }

    fn check_connected(state: &State) -> Result<(), StoreError> {
        if state.unconfigured || !state.connected {
            return Err(StoreError::NotConnected);
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    type Statement = MemoryStatement;
    type Transaction<'a> = MemoryTransaction<'a>;

    fn ping(&mut self) -> Result<Ping, StoreError> {
        let mut state = self.lock();
        state.events.push(StoreEvent::Ping);

        if state.unconfigured {
            return Err(StoreError::NotConnected);
        }
        if state.fail_ping {
            state.connected = false;
            return Err(StoreError::Injected("connection refused".to_string()));
        }
        if state.connected && !state.drop_connection {
            return Ok(Ping::Alive);
        }

        state.connected = true;
        state.drop_connection = false;
        state.generation += 1;
        Ok(Ping::Reconnected)
    }

    fn prepare(&mut self, query: &str) -> Result<MemoryStatement, StoreError> {
        let mut state = self.lock();
        Self::check_connected(&state)?;
        if state.fail_prepare {
            return Err(StoreError::Injected("syntax error".to_string()));
        }

        let table = insert_target(query)
            .ok_or_else(|| StoreError::Injected(format!("unsupported statement: {}", query)))?
            .to_string();
        state.events.push(StoreEvent::Prepare(table.clone()));
        Ok(MemoryStatement {
            table,
            generation: state.generation,
        })
    }

    fn begin(&mut self) -> Result<MemoryTransaction<'_>, StoreError> {
        let delay = {
            let mut state = self.lock();
            Self::check_connected(&state)?;
            if state.failing_begins > 0 {
                state.failing_begins -= 1;
                return Err(StoreError::Injected("could not begin".to_string()));
            }
            state.events.push(StoreEvent::Begin);
            state.open_transactions += 1;
            state.max_open_transactions = state.max_open_transactions.max(state.open_transactions);
            state.delay
        };

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        Ok(MemoryTransaction {
            store: self,
            pending: Vec::new(),
            executed: HashMap::new(),
            finished: false,
        })
    }

    fn close(&mut self) {
        self.lock().connected = false;
    }
}

/// Transaction over a [`MemoryStore`]; rows become visible on commit.
pub struct MemoryTransaction<'a> {
    store: &'a mut MemoryStore,
    pending: Vec<(String, Vec<SqlValue>)>,
    executed: HashMap<String, usize>,
    finished: bool,
}

impl MemoryTransaction<'_> {
    fn finish(&mut self, state: &mut State) {
        self.finished = true;
        state.open_transactions -= 1;
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    type Statement = MemoryStatement;

    fn execute(
        &mut self,
        statement: &MemoryStatement,
        params: &[SqlValue],
    ) -> Result<u64, StoreError> {
        let store = self.store.clone();
        let mut state = store.lock();

        if statement.generation != state.generation {
            return Err(StoreError::Injected(
                "prepared statement does not exist".to_string(),
            ));
        }

        let row = self.executed.entry(statement.table.clone()).or_default();
        if let Some((table, at)) = &state.fail_insert
            && *table == statement.table
            && *at == *row
        {
            return Err(StoreError::Injected(format!(
                "insert into {} failed",
                statement.table
            )));
        }
        *row += 1;

        state.events.push(StoreEvent::Execute {
            table: statement.table.clone(),
            params: params.to_vec(),
        });
        self.pending.push((statement.table.clone(), params.to_vec()));
        Ok(1)
    }

    fn commit(mut self) -> Result<(), StoreError> {
        let store = self.store.clone();
        let mut state = store.lock();
        self.finish(&mut state);

        if state.fail_commit {
            return Err(StoreError::Injected("could not commit".to_string()));
        }
        for (table, params) in std::mem::take(&mut self.pending) {
            state.rows.entry(table).or_default().push(params);
        }
        state.events.push(StoreEvent::Commit);
        Ok(())
    }

    fn rollback(mut self) -> Result<(), StoreError> {
        let store = self.store.clone();
        let mut state = store.lock();
        self.finish(&mut state);

        if state.fail_rollback {
            return Err(StoreError::Injected("could not roll back".to_string()));
        }
        state.events.push(StoreEvent::Rollback);
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let store = self.store.clone();
            let mut state = store.lock();
            self.finish(&mut state);
            state.events.push(StoreEvent::Rollback);
        }
    }
}
