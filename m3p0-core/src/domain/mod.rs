//! Core domain entities
//!
//! Revisions, migration specifications and tracking records. These are
//! plain data structures; only `spec` touches the filesystem to load itself.

mod record;
mod revision;
pub mod result;
pub mod spec;

pub use record::AppliedRevisionRecord;
pub use revision::Revision;
pub use spec::{Direction, LocalMigration, MigrationSpec};
