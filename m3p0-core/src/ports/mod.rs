//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The migration
//! engine depends only on these traits, not on concrete database clients.

mod driver;

pub use driver::{MigrationDriver, Row};
