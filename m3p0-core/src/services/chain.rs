//! Revision chain builder
//!
//! Turns the unordered set of migration directories into the single ordered
//! chain defined by their back revisions.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::domain::result::{Error, Result};
use crate::domain::{LocalMigration, Revision};

/// The local migrations, ordered from the chain root to the tip
#[derive(Debug, Clone, Default)]
pub struct MigrationChain {
    migrations: Vec<LocalMigration>,
}

impl MigrationChain {
    /// Load every migration under `migration_root` and order it
    ///
    /// A missing root directory is an empty chain.
    pub fn load(migration_root: &Path) -> Result<Self> {
        let migrations = load_migrations(migration_root)?;
        Self::build(migrations)
    }

    /// Order already loaded migrations into a chain
    ///
    /// Fails without a partial result when the back revisions do not form a
    /// single path starting at exactly one root.
    pub fn build(migrations: Vec<LocalMigration>) -> Result<Self> {
        if migrations.is_empty() {
            return Ok(Self::default());
        }

        let mut seen = HashSet::new();
        for migration in &migrations {
            if !seen.insert(migration.revision()) {
                return Err(Error::DuplicateRevision(migration.revision()));
            }
        }

        let total = migrations.len();
        let mut by_back_revision: HashMap<Option<Revision>, LocalMigration> =
            HashMap::with_capacity(total);

        for migration in migrations {
            let key = migration.spec.back_revision;
            if let Some(existing) = by_back_revision.get(&key) {
                let mut revisions = vec![existing.revision(), migration.revision()];
                revisions.sort();
                return Err(Error::Branching {
                    back_revision: key,
                    revisions,
                });
            }
            by_back_revision.insert(key, migration);
        }

        if !by_back_revision.contains_key(&None) {
            return Err(Error::NoRoot);
        }

        // Bounded walk: at most one step per loaded migration
        let mut ordered = Vec::with_capacity(total);
        let mut cursor: Option<Revision> = None;
        for _ in 0..total {
            match by_back_revision.remove(&cursor) {
                Some(migration) => {
                    cursor = Some(migration.revision());
                    ordered.push(migration);
                }
                None => break,
            }
        }

        if !by_back_revision.is_empty() {
            let mut unreachable: Vec<Revision> =
                by_back_revision.values().map(|m| m.revision()).collect();
            unreachable.sort();
            return Err(Error::BrokenChain { unreachable });
        }

        Ok(Self {
            migrations: ordered,
        })
    }

    /// Revisions from root to tip
    pub fn revisions(&self) -> Vec<Revision> {
        self.migrations.iter().map(|m| m.revision()).collect()
    }

    pub fn migrations(&self) -> &[LocalMigration] {
        &self.migrations
    }

    /// Newest migration in the chain
    pub fn tip(&self) -> Option<&LocalMigration> {
        self.migrations.last()
    }

    pub fn get(&self, revision: &Revision) -> Option<&LocalMigration> {
        self.migrations.iter().find(|m| &m.revision() == revision)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

/// Load the specification of every migration directory under `migration_root`
///
/// Plain files and hidden directories are skipped. Directories are visited in
/// name order so error reporting is stable.
fn load_migrations(migration_root: &Path) -> Result<Vec<LocalMigration>> {
    if !migration_root.exists() {
        return Ok(Vec::new());
    }

    let entries =
        std::fs::read_dir(migration_root).map_err(|e| Error::filesystem(migration_root, e))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::filesystem(migration_root, e))?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if path.is_dir() && !hidden {
            dirs.push(path);
        }
    }
    dirs.sort();

    dirs.iter().map(|dir| LocalMigration::load(dir)).collect()
}
