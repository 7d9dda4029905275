use chrono::NaiveDateTime;
use serde::Serialize;

use super::Revision;

/// One row of the tracking table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedRevisionRecord {
    pub sequence_id: i64,
    pub version: Option<String>,
    pub revision: Revision,
    pub is_applied: bool,
    pub applied_at: Option<NaiveDateTime>,
}
