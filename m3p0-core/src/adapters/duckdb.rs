//! DuckDB driver implementation

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use duckdb::types::{ToSql, ValueRef};
use duckdb::Connection;
use serde_json::Value as JsonValue;

use crate::domain::result::{Error, Result};
use crate::ports::{MigrationDriver, Row};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Error::Driver(e.to_string())
    }
}

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

/// DuckDB migration driver
///
/// Holds one root connection to the database. Every driver call works on a
/// clone of it, which DuckDB treats as a separate connection to the same
/// database instance.
pub struct DuckDbDriver {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbDriver {
    /// Open (or create) the database file at `db_path`
    ///
    /// Retries with exponential backoff while another process holds the file lock.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[m3p0] Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(last_error.map(Error::from).unwrap_or_else(|| {
            Error::driver(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> duckdb::Result<Connection> {
        // Extension autoloading off: cached extensions may fail code signing on macOS
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Get a fresh connection for a single operation
    fn acquire(&self) -> Result<Connection> {
        let root = self
            .conn
            .lock()
            .map_err(|e| Error::driver(format!("Lock poisoned: {}", e)))?;
        Ok(root.try_clone()?)
    }

    fn query_rows(&self, query: &str, params: &[JsonValue]) -> Result<Vec<Row>> {
        let conn = self.acquire()?;

        let duckdb_params: Vec<Box<dyn ToSql>> = params.iter().map(json_to_duckdb_param).collect();
        let param_refs: Vec<&dyn ToSql> = duckdb_params.iter().map(|b| b.as_ref()).collect();

        let mut stmt = conn.prepare(query)?;
        let mut result_rows = stmt.query(param_refs.as_slice())?;

        let mut values: Vec<Vec<JsonValue>> = Vec::new();
        let mut column_count = 0;

        while let Some(row) = result_rows.next()? {
            if values.is_empty() {
                column_count = row.as_ref().column_count();
            }
            values.push((0..column_count).map(|i| column_value(row, i)).collect());
        }

        // Drop result_rows to release borrow on stmt
        drop(result_rows);

        let columns: Vec<String> = (0..column_count)
            .map(|i| {
                stmt.column_name(i)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| format!("col{}", i))
            })
            .collect();

        Ok(values
            .into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect())
            .collect())
    }
}

impl MigrationDriver for DuckDbDriver {
    fn name(&self) -> &str {
        "duckdb"
    }

    fn exists(&self, query: &str, params: &[JsonValue]) -> Result<bool> {
        match self.fetch_val(query, params)? {
            JsonValue::Bool(b) => Ok(b),
            JsonValue::Number(n) => Ok(n.as_i64().map(|i| i != 0).unwrap_or(false)),
            JsonValue::Null => Ok(false),
            other => Err(Error::driver(format!(
                "Expected a boolean from existence query, got {}",
                other
            ))),
        }
    }

    fn fetch(&self, query: &str, params: &[JsonValue]) -> Result<Option<Vec<Row>>> {
        let rows = self.query_rows(query, params)?;
        Ok(if rows.is_empty() { None } else { Some(rows) })
    }

    fn fetch_val(&self, query: &str, params: &[JsonValue]) -> Result<JsonValue> {
        let mut rows = self.query_rows(query, params)?;
        if rows.len() != 1 {
            return Err(Error::driver(format!(
                "Expected exactly one row, query returned {}",
                rows.len()
            )));
        }

        let row = rows.remove(0);
        if row.len() != 1 {
            return Err(Error::driver(format!(
                "Expected exactly one column, query returned {}",
                row.len()
            )));
        }

        Ok(row.into_iter().next().map(|(_, v)| v).unwrap_or(JsonValue::Null))
    }

    fn execute(&self, query: &str, params: &[JsonValue]) -> Result<()> {
        let conn = self.acquire()?;

        let duckdb_params: Vec<Box<dyn ToSql>> = params.iter().map(json_to_duckdb_param).collect();
        let param_refs: Vec<&dyn ToSql> = duckdb_params.iter().map(|b| b.as_ref()).collect();

        let mut stmt = conn.prepare(query)?;
        stmt.execute(param_refs.as_slice())?;
        Ok(())
    }

    fn execute_migration(&self, script: &str, in_transaction: bool) -> Result<()> {
        let mut conn = self.acquire()?;

        if in_transaction {
            // Dropping the transaction without commit rolls it back
            let tx = conn.transaction()?;
            tx.execute_batch(script)?;
            tx.commit()?;
        } else {
            conn.execute_batch(script)?;
        }

        Ok(())
    }
}

/// Convert JSON value to DuckDB parameter
fn json_to_duckdb_param(value: &JsonValue) -> Box<dyn ToSql> {
    match value {
        JsonValue::Null => Box::new(None::<String>),
        JsonValue::Bool(b) => Box::new(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Box::new(i)
            } else if let Some(f) = n.as_f64() {
                Box::new(f)
            } else {
                Box::new(n.to_string())
            }
        }
        JsonValue::String(s) => Box::new(s.clone()),
        // Arrays and objects are bound as their JSON text
        JsonValue::Array(_) | JsonValue::Object(_) => Box::new(value.to_string()),
    }
}

fn column_value(row: &duckdb::Row, idx: usize) -> JsonValue {
    match row.get_ref(idx) {
        Ok(ValueRef::Null) => JsonValue::Null,
        Ok(ValueRef::Boolean(b)) => JsonValue::Bool(b),
        Ok(ValueRef::TinyInt(i)) => serde_json::json!(i),
        Ok(ValueRef::SmallInt(i)) => serde_json::json!(i),
        Ok(ValueRef::Int(i)) => serde_json::json!(i),
        Ok(ValueRef::BigInt(i)) => serde_json::json!(i),
        Ok(ValueRef::HugeInt(i)) => serde_json::json!(i.to_string()),
        Ok(ValueRef::UTinyInt(i)) => serde_json::json!(i),
        Ok(ValueRef::USmallInt(i)) => serde_json::json!(i),
        Ok(ValueRef::UInt(i)) => serde_json::json!(i),
        Ok(ValueRef::UBigInt(i)) => serde_json::json!(i),
        Ok(ValueRef::Float(f)) => serde_json::json!(f),
        Ok(ValueRef::Double(f)) => serde_json::json!(f),
        Ok(ValueRef::Decimal(d)) => JsonValue::String(d.to_string()),
        Ok(ValueRef::Text(bytes)) => JsonValue::String(String::from_utf8_lossy(bytes).to_string()),
        Ok(ValueRef::Blob(bytes)) => JsonValue::String(format!("<blob {} bytes>", bytes.len())),
        Ok(ValueRef::Date32(d)) => {
            // Days since epoch
            let date = chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
                .map(|epoch| epoch + chrono::Duration::days(d as i64));
            date.map(|d| JsonValue::String(d.to_string()))
                .unwrap_or(JsonValue::Null)
        }
        Ok(ValueRef::Timestamp(_, ts)) => {
            // Microseconds since epoch
            let dt = chrono::DateTime::from_timestamp_micros(ts)
                .map(|dt| dt.naive_utc().to_string())
                .unwrap_or_else(|| ts.to_string());
            JsonValue::String(dt)
        }
        _ => JsonValue::Null,
    }
}
