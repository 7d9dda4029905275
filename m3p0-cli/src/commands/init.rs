//! Init command - create the migrations directory and tracking table

use anyhow::Result;
use std::path::Path;

use super::{get_context, print_json, Logger};
use crate::output;

pub fn run(project_dir: &Path, logger: &Logger, json: bool) -> Result<()> {
    let ctx = get_context(project_dir, logger)?;
    let result = ctx.migration_service.init();

    if json {
        return print_json(result);
    }

    let result = result?;
    if result.already_initialized {
        output::info(result.message());
    } else {
        output::success(result.message());
        println!("  Migrations: {}", result.migration_path.display());
    }

    Ok(())
}
