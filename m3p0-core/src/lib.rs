//! m3p0 Core - SQL schema migrations as a linked chain of revisions
//!
//! This crate implements the migration engine following hexagonal architecture:
//!
//! - **domain**: Revisions, migration specifications, tracking records, errors
//! - **ports**: The `MigrationDriver` trait every database backend implements
//! - **services**: Chain building, history reconciliation, apply/rollback, scaffolding
//! - **adapters**: Concrete drivers (DuckDB)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod ports;
pub mod queries;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbDriver;
use config::{Config, DatabaseTarget, DriverKind};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult};
pub use domain::{AppliedRevisionRecord, Direction, LocalMigration, MigrationSpec, Revision};
pub use ports::MigrationDriver;

/// Main context for m3p0 operations
///
/// Holds the configuration, the driver for the target database and the
/// services built on top of them.
pub struct M3p0Context {
    pub config: Config,
    pub driver: Arc<dyn MigrationDriver>,
    pub migration_service: MigrationService,
    pub create_service: CreateService,
}

impl M3p0Context {
    /// Create a context for the project in `project_dir`
    ///
    /// Fails with a configuration error when no database can be resolved.
    pub fn new(project_dir: &Path) -> Result<Self> {
        let config = Config::load(project_dir)?;

        let driver: Arc<dyn MigrationDriver> = match config.driver {
            DriverKind::DuckDb => match config.database_target()? {
                DatabaseTarget::File(path) => Arc::new(DuckDbDriver::new(&path)?),
                DatabaseTarget::InMemory => Arc::new(DuckDbDriver::open_in_memory()?),
            },
        };

        Ok(Self::with_driver(config, driver))
    }

    /// Create a context around an already constructed driver
    pub fn with_driver(config: Config, driver: Arc<dyn MigrationDriver>) -> Self {
        let migration_service = MigrationService::new(Arc::clone(&driver), &config);
        let create_service = CreateService::new(&config);

        Self {
            config,
            driver,
            migration_service,
            create_service,
        }
    }

    /// Record per-migration events through `logger`
    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.migration_service =
            MigrationService::new(Arc::clone(&self.driver), &self.config).with_logger(logger);
        self
    }
}
