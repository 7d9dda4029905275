//! Migration specification stored next to each migration's scripts

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::result::{Error, Result};
use super::Revision;

pub const SPECIFICATION_FILE: &str = "specification.json";
pub const APPLY_FILE: &str = "apply.sql";
pub const ROLLBACK_FILE: &str = "rollback.sql";

/// Contents of `specification.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSpec {
    pub revision: Revision,
    /// Previous revision in the chain, `None` for the root
    pub back_revision: Option<Revision>,
    pub apply_in_transaction: bool,
    pub rollback_in_transaction: bool,
}

impl MigrationSpec {
    pub fn new(
        back_revision: Option<Revision>,
        apply_in_transaction: bool,
        rollback_in_transaction: bool,
    ) -> Self {
        Self {
            revision: Revision::generate(),
            back_revision,
            apply_in_transaction,
            rollback_in_transaction,
        }
    }
}

/// Which script of a migration to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Apply,
    Rollback,
}

impl Direction {
    pub fn file_name(&self) -> &'static str {
        match self {
            Direction::Apply => APPLY_FILE,
            Direction::Rollback => ROLLBACK_FILE,
        }
    }
}

/// A specification together with the directory it was loaded from
#[derive(Debug, Clone)]
pub struct LocalMigration {
    pub spec: MigrationSpec,
    pub dir: PathBuf,
}

impl LocalMigration {
    /// Load `specification.json` from a migration directory
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SPECIFICATION_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| Error::filesystem(&path, e))?;
        let spec: MigrationSpec =
            serde_json::from_str(&content).map_err(|e| Error::InvalidSpecification {
                path: path.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            spec,
            dir: dir.to_path_buf(),
        })
    }

    pub fn revision(&self) -> Revision {
        self.spec.revision
    }

    /// Directory name, used to show migrations to humans
    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.dir.display().to_string())
    }

    pub fn in_transaction(&self, direction: Direction) -> bool {
        match direction {
            Direction::Apply => self.spec.apply_in_transaction,
            Direction::Rollback => self.spec.rollback_in_transaction,
        }
    }

    pub fn script_path(&self, direction: Direction) -> PathBuf {
        self.dir.join(direction.file_name())
    }

    /// Read the SQL script for `direction`
    pub fn read_script(&self, direction: Direction) -> Result<String> {
        let path = self.script_path(direction);
        std::fs::read_to_string(&path).map_err(|e| Error::filesystem(&path, e))
    }
}
