//! Rollback command - undo applied migrations newer than a target

use std::path::Path;

use anyhow::{bail, Result};
use colored::Colorize;

use m3p0_core::services::RollbackTarget;
use m3p0_core::{Error, Revision};

use super::{get_context, print_json, Logger};
use crate::output;

pub fn run(
    project_dir: &Path,
    logger: &Logger,
    version: Option<String>,
    revision: Option<Revision>,
    all: bool,
    json: bool,
) -> Result<()> {
    let target = match (version, revision, all) {
        (Some(v), None, false) => RollbackTarget::Version(v),
        (None, Some(r), false) => RollbackTarget::Revision(r),
        (None, None, true) => RollbackTarget::Base,
        _ => bail!("Specify exactly one of --version, --revision or --all"),
    };

    let ctx = get_context(project_dir, logger)?;
    let result = ctx.migration_service.rollback(&target);

    if json {
        return print_json(result);
    }

    match result {
        Ok(result) if result.rolled_back.is_empty() => {
            output::info("Nothing to roll back.");
            Ok(())
        }
        Ok(result) => {
            for revision in &result.rolled_back {
                println!("{} {}", "Rolled back".yellow(), revision);
            }
            let now_at = result
                .target
                .map(|r| r.to_string())
                .unwrap_or_else(|| "base".to_string());
            output::success(&format!(
                "Rolled back {} migration(s), database is at {}",
                result.rolled_back.len(),
                now_at
            ));
            Ok(())
        }
        Err(e) => {
            if let Error::StepFailed {
                revision, completed, ..
            } = &e
            {
                for done in completed {
                    println!("{} {}", "Rolled back".yellow(), done);
                }
                println!("{} {}", "Failed".red(), revision);
            }
            Err(e.into())
        }
    }
}
