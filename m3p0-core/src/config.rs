//! Configuration management
//!
//! Project settings live in `m3p0.json` next to the migrations:
//! ```json
//! {
//!   "migrationPath": "migrations",
//!   "driver": "duckdb",
//!   "database": "app.duckdb",
//!   "databaseEnv": "M3P0_DATABASE",
//!   "datetimeFormat": "%Y-%m-%d_%H-%M-%S",
//!   "validateSql": false
//! }
//! ```
//! Every key is optional. Unknown keys are ignored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};

pub const CONFIG_FILE: &str = "m3p0.json";
pub const DEFAULT_MIGRATION_PATH: &str = "migrations";
pub const DEFAULT_DATABASE_ENV: &str = "M3P0_DATABASE";
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
pub const MIGRATION_PATH_ENV: &str = "M3P0_MIGRATION_PATH";

/// Database location that means "private in-memory database"
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// Raw m3p0.json structure
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    migration_path: Option<String>,
    #[serde(default)]
    driver: Option<DriverKind>,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    database_env: Option<String>,
    #[serde(default)]
    datetime_format: Option<String>,
    #[serde(default)]
    validate_sql: Option<bool>,
}

/// Bundled database drivers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    #[default]
    DuckDb,
}

/// Where the target database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    File(PathBuf),
    InMemory,
}

/// m3p0 configuration, resolved against the project directory
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub migration_path: PathBuf,
    pub driver: DriverKind,
    pub database: Option<String>,
    pub database_env: String,
    pub datetime_format: String,
    /// Parse pending scripts with sqlparser before running any of them.
    /// Off by default: the parser does not cover every DuckDB statement.
    pub validate_sql: bool,
}

impl Config {
    /// Load config from the project directory
    ///
    /// The migration path can be overridden with `M3P0_MIGRATION_PATH`.
    /// A missing m3p0.json means defaults; a malformed one is an error.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let settings_path = project_dir.join(CONFIG_FILE);

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)
                .map_err(|e| Error::filesystem(&settings_path, e))?;
            serde_json::from_str(&content).map_err(|e| {
                Error::config(format!("Invalid {}: {}", settings_path.display(), e))
            })?
        } else {
            SettingsFile::default()
        };

        let migration_path = std::env::var(MIGRATION_PATH_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .or_else(|| raw.migration_path.clone())
            .unwrap_or_else(|| DEFAULT_MIGRATION_PATH.to_string());

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            migration_path: project_dir.join(migration_path),
            driver: raw.driver.unwrap_or_default(),
            database: raw.database,
            database_env: raw
                .database_env
                .unwrap_or_else(|| DEFAULT_DATABASE_ENV.to_string()),
            datetime_format: raw
                .datetime_format
                .unwrap_or_else(|| DEFAULT_DATETIME_FORMAT.to_string()),
            validate_sql: raw.validate_sql.unwrap_or(false),
        })
    }

    /// Defaults for `project_dir` pointing at an explicit database
    pub fn for_database(project_dir: &Path, database: impl Into<String>) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            migration_path: project_dir.join(DEFAULT_MIGRATION_PATH),
            driver: DriverKind::default(),
            database: Some(database.into()),
            database_env: DEFAULT_DATABASE_ENV.to_string(),
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
            validate_sql: false,
        }
    }

    /// Resolve the database to migrate
    ///
    /// `database` wins over the environment variable named by `databaseEnv`.
    pub fn database_target(&self) -> Result<DatabaseTarget> {
        let location = self
            .database
            .clone()
            .or_else(|| std::env::var(&self.database_env).ok())
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| {
                Error::config(format!(
                    "Cannot initialize driver to run migrations. Set \"database\" in {} or the {} environment variable.",
                    CONFIG_FILE, self.database_env
                ))
            })?;

        if location == IN_MEMORY_DATABASE {
            return Ok(DatabaseTarget::InMemory);
        }

        Ok(DatabaseTarget::File(self.project_dir.join(location)))
    }

    /// Directory for m3p0's own state (event log)
    pub fn state_dir(&self) -> PathBuf {
        self.project_dir.join(".m3p0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();

        assert_eq!(config.driver, DriverKind::DuckDb);
        assert_eq!(config.datetime_format, DEFAULT_DATETIME_FORMAT);
        assert!(!config.validate_sql);
        assert!(config.migration_path.starts_with(dir.path()));
    }

    #[test]
    fn test_reads_camel_case_settings() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"database": "app.duckdb", "validateSql": true, "datetimeFormat": "%Y%m%d", "team": "platform"}"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert!(config.validate_sql);
        assert_eq!(config.datetime_format, "%Y%m%d");
        assert_eq!(
            config.database_target().unwrap(),
            DatabaseTarget::File(dir.path().join("app.duckdb"))
        );
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();

        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_driver_is_config_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{"driver": "oracle"}"#).unwrap();

        assert!(matches!(Config::load(dir.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_database_is_config_error() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"databaseEnv": "M3P0_TEST_UNSET_DATABASE_VARIABLE"}"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert!(matches!(config.database_target(), Err(Error::Config(_))));
    }

    #[test]
    fn test_in_memory_target() {
        let dir = tempdir().unwrap();
        let config = Config::for_database(dir.path(), IN_MEMORY_DATABASE);
        assert_eq!(config.database_target().unwrap(), DatabaseTarget::InMemory);
    }
}
