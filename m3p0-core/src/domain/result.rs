//! Result and error types for the core library

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Revision;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    // === Chain integrity ===
    #[error("Chain integrity error: no migration without a back revision (missing chain root)")]
    NoRoot,

    #[error(
        "Chain integrity error: migrations {revisions:?} share back revision {}",
        display_back_revision(.back_revision)
    )]
    Branching {
        back_revision: Option<Revision>,
        revisions: Vec<Revision>,
    },

    #[error("Chain integrity error: revision {0} is declared by more than one migration")]
    DuplicateRevision(Revision),

    #[error("Chain integrity error: migrations {unreachable:?} are not reachable from the chain root (dangling or cyclic back revision)")]
    BrokenChain { unreachable: Vec<Revision> },

    #[error("Chain integrity error: invalid specification {}: {message}", .path.display())]
    InvalidSpecification { path: PathBuf, message: String },

    // === Reconciliation ===
    #[error(
        "History divergence at position {position}: local has {}, database has {}",
        display_slot(.local),
        display_slot(.database)
    )]
    HistoryDivergence {
        position: usize,
        local: Option<Revision>,
        database: Option<Revision>,
    },

    // === Execution ===
    #[error("Filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Driver(String),

    #[error("Migration {revision} failed after {} successful step(s): {message}", .completed.len())]
    StepFailed {
        revision: Revision,
        completed: Vec<Revision>,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("m3p0 is not initialized, run `m3p0 init` first")]
    NotInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_back_revision(back_revision: &Option<Revision>) -> String {
    match back_revision {
        Some(revision) => revision.to_string(),
        None => "<root>".to_string(),
    }
}

fn display_slot(slot: &Option<Revision>) -> String {
    match slot {
        Some(revision) => revision.to_string(),
        None => "nothing".to_string(),
    }
}

impl Error {
    /// Create a driver error
    pub fn driver(msg: impl Into<String>) -> Self {
        Self::Driver(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a filesystem error for `path`
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Whether the local migration chain itself is malformed
    pub fn is_chain_integrity(&self) -> bool {
        matches!(
            self,
            Self::NoRoot
                | Self::Branching { .. }
                | Self::DuplicateRevision(_)
                | Self::BrokenChain { .. }
                | Self::InvalidSpecification { .. }
        )
    }

    /// Process exit code for this error kind
    pub fn exit_code(&self) -> u8 {
        match self {
            e if e.is_chain_integrity() => 3,
            Self::Config(_) => 2,
            Self::HistoryDivergence { .. } => 4,
            Self::Filesystem { .. } | Self::Io(_) => 5,
            Self::Driver(_) | Self::StepFailed { .. } => 6,
            Self::Validation(_) | Self::NotFound(_) | Self::NotInitialized => 7,
            _ => 1,
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Create a failed result that still carries data
    pub fn fail_with_data(error: impl Into<String>, data: T) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(error.into()),
            context: None,
        }
    }

    /// Create a failed result with context
    pub fn fail_with_context(
        error: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: Some(context),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(Error::StepFailed {
                revision,
                completed,
                message,
            }) => {
                let mut context = HashMap::new();
                context.insert("failed_revision".to_string(), serde_json::json!(revision));
                context.insert("completed".to_string(), serde_json::json!(completed));
                Self::fail_with_context(message, context)
            }
            Err(e) => Self::fail(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_result_ok() {
        let result: OperationResult<i32> = OperationResult::ok(42);
        assert!(result.success);
        assert_eq!(result.data, Some(42));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_from_result() {
        let ok: Result<i32> = Ok(42);
        let result: OperationResult<i32> = ok.into();
        assert!(result.success);

        let err: Result<i32> = Err(Error::validation("bad input"));
        let result: OperationResult<i32> = err.into();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Validation error"));
    }

    #[test]
    fn test_step_failure_carries_progress() {
        let failed = Revision::generate();
        let done = Revision::generate();
        let err: Result<()> = Err(Error::StepFailed {
            revision: failed,
            completed: vec![done],
            message: "boom".to_string(),
        });

        let result: OperationResult<()> = err.into();
        let context = result.context.unwrap();
        assert_eq!(context["failed_revision"], serde_json::json!(failed.to_string()));
        assert_eq!(context["completed"], serde_json::json!([done.to_string()]));
    }

    #[test]
    fn test_exit_codes_by_kind() {
        assert_eq!(Error::NoRoot.exit_code(), 3);
        assert_eq!(Error::BrokenChain { unreachable: vec![] }.exit_code(), 3);
        assert_eq!(Error::config("no database").exit_code(), 2);
        assert_eq!(
            Error::HistoryDivergence {
                position: 1,
                local: None,
                database: None
            }
            .exit_code(),
            4
        );
        assert_eq!(Error::driver("down").exit_code(), 6);
        assert_eq!(Error::NotInitialized.exit_code(), 7);
    }
}
