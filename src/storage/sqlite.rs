//! SQLite store implementation
//!
//! Owns the single `rusqlite::Connection` and the codec registry. Result
//! rows are captured with their declared column types so the record layer
//! can decode timestamps, decimals, and record references the schema
//! declares - SQLite itself only hands back integers, reals, text, and
//! blobs.

use std::path::Path;
use std::thread;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, params_from_iter};
use rusqlite::types::Value as SqlValue;

use crate::codec::Registry;
use crate::kind::RecordKind;
use crate::value::Value;
use crate::{Error, Result};

/// Backoff budget for busy/locked statements: waits start at 1 ms and
/// double until the next wait would push the cumulative total past
/// `max_wait`
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_wait: Duration::from_secs(60) }
    }
}

/// Result of a write statement
#[derive(Debug, Clone, Copy)]
pub struct WriteOutcome {
    pub rows_affected: usize,
    pub last_insert_id: i64,
}

/// One result cell: column name, declared type, raw SQL value
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub decl: Option<String>,
    pub value: SqlValue,
}

/// One captured result row
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<Column>,
}

impl Row {
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The integer identity column every record table carries
    pub fn id(&self) -> Result<i64> {
        match self.get("id").map(|c| &c.value) {
            Some(SqlValue::Integer(id)) => Ok(*id),
            other => Err(Error::Codec(format!("row has no integer id column: {other:?}"))),
        }
    }
}

/// SQLite-backed store: connection, registry, retry policy
pub struct Store {
    conn: Connection,
    registry: Registry,
    retry: RetryPolicy,
}

impl Store {
    /// Open a database file (creates if it doesn't exist)
    pub fn open(path: &Path, registry: Registry) -> Result<Self> {
        Self::open_with(path, registry, RetryPolicy::default())
    }

    /// Open with an explicit retry policy
    pub fn open_with(path: &Path, registry: Registry, retry: RetryPolicy) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn, registry, retry })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(registry: Registry) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn, registry, retry: RetryPolicy::default() })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Commit anything pending and close the connection
    pub fn close(self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        self.conn.close().map_err(|(_, e)| e.into())
    }

    /// Run a kind's templated CREATE TABLE, optionally dropping first
    pub fn create_table(&self, kind: &RecordKind, drop_first: bool) -> Result<()> {
        if drop_first {
            self.execute_write(&format!("DROP TABLE IF EXISTS {}", kind.table), &[])?;
        }
        self.execute_write(&kind.create_statement(), &[])?;
        Ok(())
    }

    /// Execute a write statement, retrying while the database is busy
    pub fn execute_write(&self, sql: &str, params: &[Value]) -> Result<WriteOutcome> {
        self.with_retry(sql, params, |conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows_affected = stmt.execute(params_from_iter(params.iter()))?;
            Ok(WriteOutcome { rows_affected, last_insert_id: conn.last_insert_rowid() })
        })
    }

    /// Execute a query, retrying while the database is busy; rows are
    /// captured with column names and declared types
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.with_retry(sql, params, |conn| {
            let mut stmt = conn.prepare(sql)?;
            let metas: Vec<(String, Option<String>)> = stmt
                .columns()
                .iter()
                .map(|c| (c.name().to_string(), c.decl_type().map(str::to_ascii_lowercase)))
                .collect();
            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut columns = Vec::with_capacity(metas.len());
                for (i, (name, decl)) in metas.iter().enumerate() {
                    columns.push(Column {
                        name: name.clone(),
                        decl: decl.clone(),
                        value: row.get(i)?,
                    });
                }
                out.push(Row { columns });
            }
            Ok(out)
        })
    }

    /// Query expecting at most one row
    pub fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    fn with_retry<T>(
        &self,
        sql: &str,
        params: &[Value],
        op: impl Fn(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        tracing::trace!("executing: {} {}", sql, render_params(params));
        let mut delay = Duration::from_millis(1);
        let mut waited = Duration::ZERO;
        loop {
            match op(&self.conn) {
                Ok(value) => return Ok(value),
                Err(e) if is_busy(&e) => {
                    if waited + delay > self.retry.max_wait {
                        return Err(Error::Busy {
                            sql: sql.to_string(),
                            params: render_params(params),
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    tracing::debug!(
                        "database busy, retrying in {}ms: {}",
                        delay.as_millis(),
                        sql
                    );
                    thread::sleep(delay);
                    waited += delay;
                    delay *= 2;
                }
                Err(e) => {
                    tracing::error!("statement failed: {} {}: {}", sql, render_params(params), e);
                    return Err(Error::Statement {
                        sql: sql.to_string(),
                        params: render_params(params),
                        source: e,
                    });
                }
            }
        }
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn render_params(params: &[Value]) -> String {
    let parts: Vec<String> = params.iter().map(|p| p.to_string()).collect();
    format!("[{}]", parts.join(", "))
}
