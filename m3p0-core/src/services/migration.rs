//! Migration service - init, apply and rollback against the target database
//!
//! Migrations come from the local revision chain. Each applied migration is
//! tracked as a row in the m3p0_migrations table; a migration is applied if
//! and only if its row exists.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use crate::config::Config;
use crate::domain::result::{Error, Result};
use crate::domain::{AppliedRevisionRecord, Direction, LocalMigration, Revision};
use crate::ports::{MigrationDriver, Row};
use crate::queries::{
    CREATE_TABLE_SCRIPT, DELETE_REVISION, INSERT_APPLIED_REVISION, IS_TABLE_EXISTS_QUERY,
    IS_VERSION_ALREADY_EXIST, RETRIEVE_APPLIED_RECORDS, RETRIEVE_SORTED_REVISIONS,
};
use crate::services::chain::MigrationChain;
use crate::services::history::{reconcile, HistoryStatus};
use crate::services::logging::{LogEvent, LoggingService};
use crate::services::script;

/// Result of `init`
#[derive(Debug, Serialize)]
pub struct InitResult {
    pub already_initialized: bool,
    pub migration_path: PathBuf,
}

impl InitResult {
    pub fn message(&self) -> &'static str {
        if self.already_initialized {
            "m3p0 is already initialized"
        } else {
            "m3p0 initialized"
        }
    }
}

/// Result of an apply run
#[derive(Debug, Serialize)]
pub struct ApplyResult {
    pub version: Option<String>,
    /// Revisions applied by this run, in the order they ran
    pub applied: Vec<Revision>,
}

/// Result of a rollback run
#[derive(Debug, Serialize)]
pub struct RollbackResult {
    /// Newest revision left applied, `None` when everything was rolled back
    pub target: Option<Revision>,
    /// Revisions rolled back by this run, in the order they ran
    pub rolled_back: Vec<Revision>,
}

/// Point to roll the database back to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackTarget {
    /// Keep everything up to the newest migration stamped with this version
    Version(String),
    /// Keep everything up to this revision
    Revision(Revision),
    /// Roll back every applied migration
    Base,
}

/// Service for applying and rolling back migrations
pub struct MigrationService {
    driver: Arc<dyn MigrationDriver>,
    migration_path: PathBuf,
    validate_sql: bool,
    logger: Option<Arc<LoggingService>>,
}

impl MigrationService {
    pub fn new(driver: Arc<dyn MigrationDriver>, config: &Config) -> Self {
        Self {
            driver,
            migration_path: config.migration_path.clone(),
            validate_sql: config.validate_sql,
            logger: None,
        }
    }

    /// Record per-migration events in the event log
    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Log an event, ignoring any errors (logging should never break a run)
    fn log(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            let _ = logger.log(event);
        }
    }

    /// Check if the tracking table exists
    pub fn is_initialized(&self) -> Result<bool> {
        self.driver.exists(IS_TABLE_EXISTS_QUERY, &[])
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized()? {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    /// Create the migration directory and tracking table
    ///
    /// Safe to run repeatedly: an existing table is left untouched.
    pub fn init(&self) -> Result<InitResult> {
        std::fs::create_dir_all(&self.migration_path)
            .map_err(|e| Error::filesystem(&self.migration_path, e))?;

        if self.is_initialized()? {
            return Ok(InitResult {
                already_initialized: true,
                migration_path: self.migration_path.clone(),
            });
        }

        self.driver
            .execute_migration(CREATE_TABLE_SCRIPT, true)
            .map_err(|e| Error::driver(format!("Cannot initialize m3p0: {}", e)))?;

        Ok(InitResult {
            already_initialized: false,
            migration_path: self.migration_path.clone(),
        })
    }

    /// Build the local revision chain
    pub fn local_chain(&self) -> Result<MigrationChain> {
        MigrationChain::load(&self.migration_path)
    }

    /// Applied revisions, oldest first
    pub fn database_history(&self) -> Result<Vec<Revision>> {
        let rows = self.driver.fetch(RETRIEVE_SORTED_REVISIONS, &[])?;
        rows.unwrap_or_default()
            .iter()
            .map(|row| parse_revision(row, "revision"))
            .collect()
    }

    /// Applied tracking records, oldest first
    pub fn applied_records(&self) -> Result<Vec<AppliedRevisionRecord>> {
        self.ensure_initialized()?;
        self.read_applied_records()
    }

    fn read_applied_records(&self) -> Result<Vec<AppliedRevisionRecord>> {
        let rows = self.driver.fetch(RETRIEVE_APPLIED_RECORDS, &[])?;
        rows.unwrap_or_default().iter().map(parse_record).collect()
    }

    /// Compare the local chain with the database without changing anything
    pub fn check_history(&self) -> Result<HistoryStatus> {
        self.ensure_initialized()?;
        let chain = self.local_chain()?;
        let database = self.database_history()?;
        reconcile(&chain.revisions(), &database)
    }

    /// Apply every pending migration in chain order
    ///
    /// All applied migrations of the run are stamped with `version`. Without a
    /// version the caller must pass `force_no_version`. A failing migration
    /// stops the run; migrations applied before it stay applied.
    pub fn apply(&self, version: Option<&str>, force_no_version: bool) -> Result<ApplyResult> {
        self.ensure_initialized()?;

        let version = version.map(str::trim).filter(|v| !v.is_empty());
        match version {
            Some(v) => {
                if self.driver.exists(IS_VERSION_ALREADY_EXIST, &[json!(v)])? {
                    return Err(Error::validation(format!("Version {} already exists", v)));
                }
            }
            None if !force_no_version => {
                return Err(Error::validation(
                    "version parameter must be specified, or set force_no_version",
                ));
            }
            None => {}
        }

        let chain = self.local_chain()?;
        let database = self.database_history()?;

        let pending = match reconcile(&chain.revisions(), &database)? {
            HistoryStatus::Synchronized => Vec::new(),
            HistoryStatus::PendingApply(pending) => pending,
            status @ HistoryStatus::UnrecognizedInDatabase(_) => {
                return Err(Error::validation(format!(
                    "Refusing to apply: {}",
                    status.message()
                )));
            }
        };

        let steps = self.prepare_steps(&chain, &pending, Direction::Apply)?;

        let mut applied = Vec::with_capacity(steps.len());
        for (migration, sql) in steps {
            let revision = migration.revision();
            let outcome = self
                .run_script(migration, &sql, Direction::Apply)
                .and_then(|_| self.record_applied(&revision, version));

            match outcome {
                Ok(()) => {
                    self.log(
                        LogEvent::new("migration_applied")
                            .with_revision(&revision)
                            .with_version(version),
                    );
                    applied.push(revision);
                }
                Err(e) => {
                    self.log(
                        LogEvent::new("migration_apply_failed")
                            .with_revision(&revision)
                            .with_version(version)
                            .with_error(e.to_string()),
                    );
                    return Err(Error::StepFailed {
                        revision,
                        completed: applied,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(ApplyResult {
            version: version.map(|v| v.to_string()),
            applied,
        })
    }

    /// Roll back every applied migration newer than `target`, newest first
    ///
    /// A failing rollback script stops the run; migrations rolled back before
    /// it stay rolled back.
    pub fn rollback(&self, target: &RollbackTarget) -> Result<RollbackResult> {
        self.ensure_initialized()?;

        let chain = self.local_chain()?;
        let records = self.read_applied_records()?;
        let database: Vec<Revision> = records.iter().map(|r| r.revision).collect();

        if let status @ HistoryStatus::UnrecognizedInDatabase(_) =
            reconcile(&chain.revisions(), &database)?
        {
            return Err(Error::validation(format!(
                "Refusing to roll back: {}",
                status.message()
            )));
        }

        let keep = match target {
            RollbackTarget::Version(version) => Some(
                records
                    .iter()
                    .rposition(|r| r.version.as_deref() == Some(version.as_str()))
                    .ok_or_else(|| {
                        Error::not_found(format!("Version {} is not applied", version))
                    })?,
            ),
            RollbackTarget::Revision(revision) => Some(
                records
                    .iter()
                    .position(|r| &r.revision == revision)
                    .ok_or_else(|| {
                        Error::not_found(format!("Revision {} is not applied", revision))
                    })?,
            ),
            RollbackTarget::Base => None,
        };

        let first_undone = keep.map(|i| i + 1).unwrap_or(0);
        let to_undo: Vec<Revision> = database[first_undone..].iter().rev().copied().collect();
        let target_revision = keep.map(|i| database[i]);

        let steps = self.prepare_steps(&chain, &to_undo, Direction::Rollback)?;

        let mut rolled_back = Vec::with_capacity(steps.len());
        for (migration, sql) in steps {
            let revision = migration.revision();
            let outcome = self
                .run_script(migration, &sql, Direction::Rollback)
                .and_then(|_| self.remove_record(&revision));

            match outcome {
                Ok(()) => {
                    self.log(LogEvent::new("migration_rolled_back").with_revision(&revision));
                    rolled_back.push(revision);
                }
                Err(e) => {
                    self.log(
                        LogEvent::new("migration_rollback_failed")
                            .with_revision(&revision)
                            .with_error(e.to_string()),
                    );
                    return Err(Error::StepFailed {
                        revision,
                        completed: rolled_back,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(RollbackResult {
            target: target_revision,
            rolled_back,
        })
    }

    /// Read (and optionally validate) every script of a run before any of them executes
    fn prepare_steps<'a>(
        &self,
        chain: &'a MigrationChain,
        revisions: &[Revision],
        direction: Direction,
    ) -> Result<Vec<(&'a LocalMigration, String)>> {
        let mut steps = Vec::with_capacity(revisions.len());
        for revision in revisions {
            let migration = chain
                .get(revision)
                .ok_or_else(|| Error::not_found(format!("No local migration for {}", revision)))?;
            let sql = migration.read_script(direction)?;

            if self.validate_sql && !script::is_blank(&sql) {
                script::validate_sql_syntax(&sql).map_err(|msg| {
                    Error::validation(format!(
                        "{}: {}",
                        migration.script_path(direction).display(),
                        msg
                    ))
                })?;
            }

            steps.push((migration, sql));
        }
        Ok(steps)
    }

    fn run_script(&self, migration: &LocalMigration, sql: &str, direction: Direction) -> Result<()> {
        if script::is_blank(sql) {
            return Ok(());
        }
        self.driver
            .execute_migration(sql, migration.in_transaction(direction))
    }

    fn record_applied(&self, revision: &Revision, version: Option<&str>) -> Result<()> {
        self.driver.execute(
            INSERT_APPLIED_REVISION,
            &[json!(version), json!(revision.to_hyphenated())],
        )
    }

    fn remove_record(&self, revision: &Revision) -> Result<()> {
        self.driver
            .execute(DELETE_REVISION, &[json!(revision.to_hyphenated())])
    }
}

fn parse_revision(row: &Row, column: &str) -> Result<Revision> {
    row.get(column)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::driver(format!("Tracking row has no {} column", column)))?
        .parse()
        .map_err(|e| Error::driver(format!("Malformed revision in tracking table: {}", e)))
}

fn parse_record(row: &Row) -> Result<AppliedRevisionRecord> {
    let sequence_id = row
        .get("id")
        .and_then(JsonValue::as_i64)
        .ok_or_else(|| Error::driver("Tracking row has no id column"))?;

    Ok(AppliedRevisionRecord {
        sequence_id,
        version: row
            .get("version")
            .and_then(JsonValue::as_str)
            .map(|v| v.to_string()),
        revision: parse_revision(row, "revision")?,
        is_applied: row
            .get("is_applied")
            .and_then(JsonValue::as_bool)
            .unwrap_or(true),
        applied_at: row
            .get("applied_at")
            .and_then(JsonValue::as_str)
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok()),
    })
}
