//! History command - show applied migrations

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use m3p0_core::AppliedRevisionRecord;

use super::{get_context, print_json, Logger};
use crate::output;

/// An applied record with the local directory it came from, if still present
#[derive(Serialize)]
struct HistoryEntry {
    #[serde(flatten)]
    record: AppliedRevisionRecord,
    migration: Option<String>,
}

pub fn run(project_dir: &Path, logger: &Logger, json: bool) -> Result<()> {
    let ctx = get_context(project_dir, logger)?;
    let records = ctx.migration_service.applied_records();

    // A broken local chain should not hide what the database says
    let chain = ctx.migration_service.local_chain().ok();
    let entries = records.map(|records| {
        records
            .into_iter()
            .map(|record| HistoryEntry {
                migration: chain
                    .as_ref()
                    .and_then(|c| c.get(&record.revision))
                    .map(|m| m.name()),
                record,
            })
            .collect::<Vec<_>>()
    });

    if json {
        return print_json(entries);
    }

    let entries = entries?;
    if entries.is_empty() {
        output::info("No migrations applied yet.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["#", "Revision", "Version", "Applied at", "Migration"]);

    for entry in &entries {
        table.add_row(vec![
            entry.record.sequence_id.to_string(),
            entry.record.revision.to_string(),
            entry.record.version.clone().unwrap_or_default(),
            entry
                .record
                .applied_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
            entry
                .migration
                .clone()
                .unwrap_or_else(|| "(missing locally)".red().to_string()),
        ]);
    }

    println!("{}", table);
    Ok(())
}
