//! m3p0 CLI - SQL schema migrations in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};

mod commands;
mod output;

use commands::{apply, check, create, history, init, log_event, logs, rollback, Reported};
use m3p0_core::services::LogEvent;
use m3p0_core::Revision;

/// m3p0 - SQL schema migrations as a chain of revisions
#[derive(Parser)]
#[command(name = "m3p0", version, about, long_about = None)]
struct Cli {
    /// Project directory holding m3p0.json and the migrations
    #[arg(long, global = true, env = "M3P0_PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the migrations directory and the tracking table
    Init {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a new migration at the tip of the chain
    Create {
        /// Migration name, used in the directory name
        name: String,
        /// Run the apply script in a transaction
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        apply_in_transaction: bool,
        /// Run the rollback script in a transaction
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        rollback_in_transaction: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply all pending migrations
    Apply {
        /// Version label stamped on every migration applied by this run
        #[arg(long)]
        version: Option<String>,
        /// Apply without a version label
        #[arg(long, conflicts_with = "version")]
        force_no_version: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Roll back applied migrations newer than the target
    #[command(group(ArgGroup::new("target").required(true).args(["version", "revision", "all"])))]
    Rollback {
        /// Keep migrations up to the newest one applied with this version
        #[arg(long)]
        version: Option<String>,
        /// Keep migrations up to this revision
        #[arg(long)]
        revision: Option<Revision>,
        /// Roll back every applied migration
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare local migrations with the database
    CheckHistory {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show applied migrations
    History {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only errors
        #[arg(long)]
        errors: bool,
        /// Delete entries older than N days instead of listing
        #[arg(long)]
        clear_older_than_days: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Init { .. } => "init",
            Commands::Create { .. } => "create",
            Commands::Apply { .. } => "apply",
            Commands::Rollback { .. } => "rollback",
            Commands::CheckHistory { .. } => "check-history",
            Commands::History { .. } => "history",
            Commands::Logs { .. } => "logs",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let project_dir = commands::resolve_project_dir(cli.project_dir);
    let name = cli.command.name();

    let logger = commands::get_logger(&project_dir);
    if let Some(l) = &logger {
        let _ = l.log_command(name);
    }

    match run(cli.command, &project_dir, &logger) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_event(
                &logger,
                LogEvent::new(format!("{}_failed", name))
                    .with_command(name)
                    .with_error(e.to_string())
                    .with_error_details(format!("{:#}", e)),
            );
            // Reported failures were already printed by the command
            if e.downcast_ref::<Reported>().is_none() {
                output::error(&format!("{:#}", e));
            }
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Map an error to the process exit code
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(reported) = err.downcast_ref::<Reported>() {
        return reported.code;
    }
    err.downcast_ref::<m3p0_core::Error>()
        .map(m3p0_core::Error::exit_code)
        .unwrap_or(1)
}

fn run(
    command: Commands,
    project_dir: &std::path::Path,
    logger: &commands::Logger,
) -> Result<()> {
    match command {
        Commands::Init { json } => init::run(project_dir, logger, json),
        Commands::Create {
            name,
            apply_in_transaction,
            rollback_in_transaction,
            json,
        } => create::run(
            project_dir,
            &name,
            apply_in_transaction,
            rollback_in_transaction,
            json,
        ),
        Commands::Apply {
            version,
            force_no_version,
            json,
        } => apply::run(project_dir, logger, version.as_deref(), force_no_version, json),
        Commands::Rollback {
            version,
            revision,
            all,
            json,
        } => rollback::run(project_dir, logger, version, revision, all, json),
        Commands::CheckHistory { json } => check::run(project_dir, logger, json),
        Commands::History { json } => history::run(project_dir, logger, json),
        Commands::Logs {
            limit,
            errors,
            clear_older_than_days,
            json,
        } => logs::run(logger, limit, errors, clear_older_than_days, json),
    }
}
