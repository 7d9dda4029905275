//! Driver port - the database capabilities the migration engine needs

use serde_json::{Map, Value as JsonValue};

use crate::domain::result::Result;

/// One result row, keyed by column name
pub type Row = Map<String, JsonValue>;

/// Database driver abstraction
///
/// Parameters are bound positionally to `?` placeholders. Every call acquires
/// its own connection from the implementation and releases it on return, so
/// a transaction never spans more than one `execute_migration` call.
pub trait MigrationDriver: Send + Sync {
    /// Driver name (e.g., "duckdb")
    fn name(&self) -> &str;

    /// Run a query returning a single boolean
    fn exists(&self, query: &str, params: &[JsonValue]) -> Result<bool>;

    /// Run a query and collect its rows, `None` when it yields nothing
    fn fetch(&self, query: &str, params: &[JsonValue]) -> Result<Option<Vec<Row>>>;

    /// Run a query that must yield exactly one row with exactly one column
    fn fetch_val(&self, query: &str, params: &[JsonValue]) -> Result<JsonValue>;

    /// Run a single statement, discarding any result
    fn execute(&self, query: &str, params: &[JsonValue]) -> Result<()>;

    /// Run a migration script that may contain many `;`-separated statements
    ///
    /// With `in_transaction` all statements commit together or not at all.
    /// Without it each statement commits on its own and a failure leaves the
    /// earlier ones applied.
    fn execute_migration(&self, script: &str, in_transaction: bool) -> Result<()>;
}
