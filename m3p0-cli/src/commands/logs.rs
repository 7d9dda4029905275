//! Logs command - view and manage the event log

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use colored::Colorize;

use super::Logger;
use crate::output;

fn format_timestamp(timestamp_ms: i64) -> String {
    use chrono::TimeZone;
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// Millisecond timestamp `days` before `now`
fn cutoff_ms(now: DateTime<Utc>, days: u64) -> Result<i64> {
    i64::try_from(days)
        .ok()
        .and_then(Duration::try_days)
        .and_then(|age| now.checked_sub_signed(age))
        .map(|cutoff| cutoff.timestamp_millis())
        .ok_or_else(|| anyhow!("--clear-older-than-days {} is out of range", days))
}

pub fn run(
    logger: &Logger,
    limit: usize,
    errors: bool,
    clear_older_than_days: Option<u64>,
    json: bool,
) -> Result<()> {
    let service = logger
        .as_ref()
        .ok_or_else(|| anyhow!("The event log could not be opened"))?;

    if let Some(days) = clear_older_than_days {
        let deleted = service.delete_before(cutoff_ms(Utc::now(), days)?)?;

        if json {
            println!("{}", serde_json::json!({"deleted": deleted}));
        } else {
            println!("Deleted {} log entries", deleted);
        }
        return Ok(());
    }

    let entries = if errors {
        service.get_errors(limit)?
    } else {
        service.get_recent(limit)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No log entries found.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", "Event", "Command", "Revision", "Version", "Error"]);

    for entry in &entries {
        table.add_row(vec![
            format_timestamp(entry.timestamp),
            entry.event.clone(),
            entry.command.clone().unwrap_or_default(),
            entry.revision.clone().unwrap_or_default(),
            entry.version.clone().unwrap_or_default(),
            entry
                .error_message
                .as_ref()
                .map(|_| "!".red().to_string())
                .unwrap_or_default(),
        ]);
    }

    println!("{}", table);

    // Show error details if any
    if !errors {
        let recent_errors = service.get_errors(3)?;
        if !recent_errors.is_empty() {
            println!();
            println!("{}", "Recent Errors:".red().bold());
            for err in &recent_errors {
                println!(
                    "  {} [{}]: {}",
                    format_timestamp(err.timestamp).dimmed(),
                    err.event,
                    err.error_message.as_deref().unwrap_or("Unknown error")
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cutoff_subtracts_whole_days() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap();

        assert_eq!(cutoff_ms(now, 7).unwrap(), expected.timestamp_millis());
        assert_eq!(cutoff_ms(now, 0).unwrap(), now.timestamp_millis());
    }

    #[test]
    fn test_cutoff_rejects_out_of_range_days() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();

        assert!(cutoff_ms(now, u64::MAX).is_err());
        assert!(cutoff_ms(now, i64::MAX as u64).is_err());
        assert!(cutoff_ms(now, 400_000_000).is_err());
    }
}
