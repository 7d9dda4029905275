//! Service layer - migration logic orchestration
//!
//! Services coordinate domain logic and the driver port. Each service
//! focuses on a specific use case.

pub mod chain;
mod create;
pub mod history;
pub mod logging;
pub mod migration;
pub mod script;

pub use chain::MigrationChain;
pub use create::{sanitize_name, CreateResult, CreateService, PLACEHOLDER_SCRIPT};
pub use history::{reconcile, HistoryStatus};
pub use logging::{LogEntry, LogEvent, LoggingService};
pub use migration::{
    ApplyResult, InitResult, MigrationService, RollbackResult, RollbackTarget,
};
