//! CLI command implementations

pub mod apply;
pub mod check;
pub mod create;
pub mod history;
pub mod init;
pub mod logs;
pub mod rollback;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use m3p0_core::config::Config;
use m3p0_core::services::{LogEvent, LoggingService};
use m3p0_core::{M3p0Context, OperationResult};

/// Event log shared by the CLI and the migration executor
pub type Logger = Option<Arc<LoggingService>>;

/// A failure the command already printed; carries the exit code to use
#[derive(Debug)]
pub struct Reported {
    pub code: u8,
    pub message: String,
}

impl fmt::Display for Reported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Reported {}

/// Resolve the project directory from the flag/env value or the current dir
pub fn resolve_project_dir(arg: Option<PathBuf>) -> PathBuf {
    arg.or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger(project_dir: &Path) -> Logger {
    let state_dir = Config::load(project_dir)
        .map(|c| c.state_dir())
        .unwrap_or_else(|_| project_dir.join(".m3p0"));
    LoggingService::new(&state_dir, env!("CARGO_PKG_VERSION"))
        .ok()
        .map(Arc::new)
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Logger, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Build the context for commands that talk to the database
pub fn get_context(project_dir: &Path, logger: &Logger) -> Result<M3p0Context> {
    let ctx = M3p0Context::new(project_dir).with_context(|| {
        format!("Failed to open m3p0 project in {}", project_dir.display())
    })?;

    Ok(match logger {
        Some(l) => ctx.with_logger(Arc::clone(l)),
        None => ctx,
    })
}

/// Print `result` as an `OperationResult` JSON document
///
/// A failure is handed back as `Reported` so it is not printed twice.
pub fn print_json<T: Serialize>(result: m3p0_core::domain::result::Result<T>) -> Result<()> {
    let failure = result
        .as_ref()
        .err()
        .map(|e| (e.exit_code(), e.to_string()));

    let op = OperationResult::from(result);
    println!("{}", serde_json::to_string_pretty(&op)?);

    match failure {
        None => Ok(()),
        Some((code, message)) => Err(Reported { code, message }.into()),
    }
}

/// Report a failure whose JSON document was already built by the command
pub fn print_json_failure<T: Serialize>(op: &OperationResult<T>, code: u8) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(op)?);
    Err(Reported {
        code,
        message: op.error.clone().unwrap_or_default(),
    }
    .into())
}
