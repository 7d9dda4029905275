//! Check-history command - compare local migrations with the database

use std::path::Path;

use anyhow::Result;

use m3p0_core::OperationResult;

use super::{get_context, print_json, print_json_failure, Logger, Reported};
use crate::output;

/// Exit code for a readable but unsynchronized history
const NOT_SYNCHRONIZED: u8 = 1;

pub fn run(project_dir: &Path, logger: &Logger, json: bool) -> Result<()> {
    let ctx = get_context(project_dir, logger)?;
    let status = ctx.migration_service.check_history();

    match status {
        Ok(status) if status.is_synchronized() => {
            if json {
                return print_json(Ok(status));
            }
            output::success(&status.message());
            Ok(())
        }
        Ok(status) => {
            let message = status.message();
            if json {
                let op = OperationResult::fail_with_data(message, status);
                return print_json_failure(&op, NOT_SYNCHRONIZED);
            }
            output::warning(&message);
            Err(Reported {
                code: NOT_SYNCHRONIZED,
                message,
            }
            .into())
        }
        Err(e) if json => print_json::<()>(Err(e)),
        Err(e) => Err(e.into()),
    }
}
