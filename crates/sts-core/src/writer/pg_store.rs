//! PostgreSQL-backed [`Store`].
//!
//! Holds a single synchronous client. The connection string is parsed once
//! at construction; the connection itself is opened by the first `ping()`
//! and re-opened by any later `ping()` that finds it dead.

use postgres::config::Host;
use postgres::types::ToSql;
use postgres::{Client, Config, NoTls, Statement, Transaction};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::writer::store::{Ping, SqlValue, Store, StoreTransaction};

/// Store backed by a PostgreSQL connection.
pub struct PgStore {
    config: Config,
    client: Option<Client>,
}

impl PgStore {
    /// Parses a libpq-style (`host=... user=...`) or URL connection string.
    ///
    /// Does not connect.
    pub fn new(connection_string: &str) -> Result<Self, StoreError> {
        let config: Config = connection_string.parse()?;
        Ok(Self {
            config,
            client: None,
        })
    }

    /// `host:port/dbname` of the configured target, for logging.
    pub fn target(&self) -> String {
        let host = match self.config.get_hosts().first() {
            Some(Host::Tcp(host)) => host.clone(),
            #[cfg(unix)]
            Some(Host::Unix(path)) => path.display().to_string(),
            None => "localhost".to_string(),
        };
        let port = self.config.get_ports().first().copied().unwrap_or(5432);
        let dbname = self.config.get_dbname().unwrap_or("");
        format!("{}:{}/{}", host, port, dbname)
    }

    fn connect(&mut self) -> Result<Ping, StoreError> {
        let client = self.config.connect(NoTls)?;
        self.client = Some(client);
        info!(server = %self.target(), "database connection established");
        Ok(Ping::Reconnected)
    }
}

impl Store for PgStore {
    type Statement = Statement;
    type Transaction<'a> = Transaction<'a>;

    fn ping(&mut self) -> Result<Ping, StoreError> {
        let Some(client) = self.client.as_mut() else {
            return self.connect();
        };

        if !client.is_closed() {
            match client.simple_query("") {
                Ok(_) => return Ok(Ping::Alive),
                Err(e) => warn!(error = %format_postgres_error(&e), "database connection lost"),
            }
        }

        self.client = None;
        self.connect()
    }

    fn prepare(&mut self, query: &str) -> Result<Statement, StoreError> {
        let client = self.client.as_mut().ok_or(StoreError::NotConnected)?;
        Ok(client.prepare(query)?)
    }

    fn begin(&mut self) -> Result<Transaction<'_>, StoreError> {
        let client = self.client.as_mut().ok_or(StoreError::NotConnected)?;
        Ok(client.transaction()?)
    }

    fn close(&mut self) {
        if let Some(client) = self.client.take()
            && let Err(e) = client.close()
        {
            warn!(error = %format_postgres_error(&e), "failed to close database connection");
        }
    }
}

impl StoreTransaction for Transaction<'_> {
    type Statement = Statement;

    fn execute(&mut self, statement: &Statement, params: &[SqlValue]) -> Result<u64, StoreError> {
        let params: Vec<&(dyn ToSql + Sync)> = params.iter().map(as_sql).collect();
        Ok(Transaction::execute(self, statement, &params)?)
    }

    fn commit(self) -> Result<(), StoreError> {
        Ok(Transaction::commit(self)?)
    }

    fn rollback(self) -> Result<(), StoreError> {
        Ok(Transaction::rollback(self)?)
    }
}

fn as_sql(value: &SqlValue) -> &(dyn ToSql + Sync) {
    match value {
        SqlValue::Int4(v) => v,
        SqlValue::Float4(v) => v,
        SqlValue::Float8(v) => v,
        SqlValue::Text(v) => v,
    }
}

/// Formats PostgreSQL error message for display.
pub(crate) fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else if msg.contains("does not exist") {
            msg.split("FATAL:")
                .last()
                .unwrap_or(&msg)
                .trim()
                .to_string()
        } else {
            msg
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_invalid_connection_string() {
        assert!(PgStore::new("host=localhost port=notaport").is_err());
    }

    #[test]
    fn target_describes_key_value_config() {
        let store = PgStore::new("host=db.internal port=6432 user=sts dbname=metrics").unwrap();
        assert_eq!(store.target(), "db.internal:6432/metrics");
    }

    #[test]
    fn target_describes_url_config() {
        let store = PgStore::new("postgres://sts@localhost/metrics").unwrap();
        assert_eq!(store.target(), "localhost:5432/metrics");
    }

    #[test]
    fn statements_need_a_connection() {
        let mut store = PgStore::new("host=localhost user=sts").unwrap();
        assert!(matches!(
            store.prepare("SELECT 1"),
            Err(StoreError::NotConnected)
        ));
        assert!(matches!(store.begin(), Err(StoreError::NotConnected)));
        store.close();
    }

    #[test]
    fn ping_fails_when_server_unreachable() {
        let mut store =
            PgStore::new("host=127.0.0.1 port=1 user=sts dbname=metrics connect_timeout=1")
                .unwrap();
        assert!(store.ping().is_err());
    }

    #[test]
    fn as_sql_keeps_parameter_order() {
        let values = [
            SqlValue::Text("cpu0".to_string()),
            SqlValue::Float8(12.5),
            SqlValue::Int4(7),
            SqlValue::Float4(1.5),
        ];
        let params: Vec<&(dyn ToSql + Sync)> = values.iter().map(as_sql).collect();
        assert_eq!(params.len(), 4);
    }
}
