//! Apply command - apply pending migrations

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use m3p0_core::Error;

use super::{get_context, print_json, Logger};
use crate::output;

pub fn run(
    project_dir: &Path,
    logger: &Logger,
    version: Option<&str>,
    force_no_version: bool,
    json: bool,
) -> Result<()> {
    let ctx = get_context(project_dir, logger)?;
    let result = ctx.migration_service.apply(version, force_no_version);

    if json {
        return print_json(result);
    }

    match result {
        Ok(result) if result.applied.is_empty() => {
            output::info("Nothing to apply, database is up to date.");
            Ok(())
        }
        Ok(result) => {
            for revision in &result.applied {
                println!("{} {}", "Applied".green(), revision);
            }
            let label = result.version.as_deref().unwrap_or("no version");
            output::success(&format!(
                "Applied {} migration(s) ({})",
                result.applied.len(),
                label
            ));
            Ok(())
        }
        Err(e) => {
            if let Error::StepFailed {
                revision, completed, ..
            } = &e
            {
                // Earlier migrations of this run stay applied
                for done in completed {
                    println!("{} {}", "Applied".green(), done);
                }
                println!("{} {}", "Failed".red(), revision);
            }
            Err(e.into())
        }
    }
}
