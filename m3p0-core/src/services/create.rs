//! Create service - scaffolds a new migration at the tip of the chain

use std::fmt::Write;
use std::path::PathBuf;

use chrono::Local;
use regex::Regex;
use serde::Serialize;

use crate::config::Config;
use crate::domain::result::{Error, Result};
use crate::domain::spec::{APPLY_FILE, ROLLBACK_FILE, SPECIFICATION_FILE};
use crate::domain::{MigrationSpec, Revision};
use crate::services::chain::MigrationChain;

/// Content of freshly generated scripts
pub const PLACEHOLDER_SCRIPT: &str = "-- File was generated automatically\n";

const MAX_NAME_LEN: usize = 64;

/// Make a user supplied name safe to use in a directory name
pub fn sanitize_name(name: &str) -> String {
    let unsafe_re = Regex::new(r"[^A-Za-z0-9_-]+").unwrap();
    let cleaned = unsafe_re.replace_all(name.trim(), "_");
    cleaned.chars().take(MAX_NAME_LEN).collect()
}

/// Result of creating a migration
#[derive(Debug, Serialize)]
pub struct CreateResult {
    pub dir: PathBuf,
    pub revision: Revision,
    pub back_revision: Option<Revision>,
}

/// Service for scaffolding migrations
pub struct CreateService {
    migration_path: PathBuf,
    datetime_format: String,
}

impl CreateService {
    pub fn new(config: &Config) -> Self {
        Self {
            migration_path: config.migration_path.clone(),
            datetime_format: config.datetime_format.clone(),
        }
    }

    /// Create `<timestamp>_<name>/` with placeholder scripts and a spec linked
    /// to the current chain tip
    pub fn create(
        &self,
        name: &str,
        apply_in_transaction: bool,
        rollback_in_transaction: bool,
    ) -> Result<CreateResult> {
        let name = sanitize_name(name);
        if name.is_empty() {
            return Err(Error::validation("Migration name must not be empty"));
        }

        let chain = MigrationChain::load(&self.migration_path)?;
        let back_revision = chain.tip().map(|m| m.revision());
        let spec = MigrationSpec::new(back_revision, apply_in_transaction, rollback_in_transaction);

        std::fs::create_dir_all(&self.migration_path)
            .map_err(|e| Error::filesystem(&self.migration_path, e))?;

        let mut stamp = String::new();
        write!(stamp, "{}", Local::now().format(&self.datetime_format)).map_err(|_| {
            Error::config(format!("Invalid datetimeFormat: {}", self.datetime_format))
        })?;
        let dir = self.migration_path.join(format!("{}_{}", stamp, name));
        // create_dir (not create_dir_all) so an existing directory is an error
        std::fs::create_dir(&dir).map_err(|e| Error::filesystem(&dir, e))?;

        for file in [APPLY_FILE, ROLLBACK_FILE] {
            let path = dir.join(file);
            std::fs::write(&path, PLACEHOLDER_SCRIPT).map_err(|e| Error::filesystem(&path, e))?;
        }

        let spec_path = dir.join(SPECIFICATION_FILE);
        let content = serde_json::to_string_pretty(&spec)?;
        std::fs::write(&spec_path, content).map_err(|e| Error::filesystem(&spec_path, e))?;

        Ok(CreateResult {
            dir,
            revision: spec.revision,
            back_revision,
        })
    }
}
