//! Create command - scaffold a new migration

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use m3p0_core::config::Config;
use m3p0_core::services::CreateService;

use super::print_json;
use crate::output;

/// Creating a migration only touches the filesystem, no database is needed
pub fn run(
    project_dir: &Path,
    name: &str,
    apply_in_transaction: bool,
    rollback_in_transaction: bool,
    json: bool,
) -> Result<()> {
    let config = Config::load(project_dir)?;
    let service = CreateService::new(&config);
    let result = service.create(name, apply_in_transaction, rollback_in_transaction);

    if json {
        return print_json(result);
    }

    let result = result?;
    output::success(&format!("Created migration {}", result.dir.display()));
    println!("  Revision:      {}", result.revision);
    match result.back_revision {
        Some(back) => println!("  Back revision: {}", back),
        None => println!("  Back revision: {}", "(root)".dimmed()),
    }

    Ok(())
}
