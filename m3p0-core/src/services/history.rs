//! History reconciliation between the local chain and the database

use std::collections::HashSet;

use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::Revision;

/// How the applied revisions relate to the local chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "revisions", rename_all = "snake_case")]
pub enum HistoryStatus {
    /// Database and local chain match exactly
    Synchronized,
    /// Local revisions not yet applied, in chain order
    PendingApply(Vec<Revision>),
    /// Applied revisions missing from the local chain, in database order
    UnrecognizedInDatabase(Vec<Revision>),
}

impl HistoryStatus {
    pub fn is_synchronized(&self) -> bool {
        matches!(self, HistoryStatus::Synchronized)
    }

    /// Human readable summary
    pub fn message(&self) -> String {
        match self {
            HistoryStatus::Synchronized => {
                "Migration history and actual database state is synchronized.".to_string()
            }
            HistoryStatus::PendingApply(revisions) => format!(
                "There are some unapplied migrations - {}",
                join_revisions(revisions)
            ),
            HistoryStatus::UnrecognizedInDatabase(revisions) => format!(
                "Database has migrations not presented locally - {}",
                join_revisions(revisions)
            ),
        }
    }
}

fn join_revisions(revisions: &[Revision]) -> String {
    revisions
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Classify the database sequence against the local chain
///
/// Both slices are oldest first. The comparison is positional: the same set
/// of revisions in another order is a divergence.
pub fn reconcile(local: &[Revision], database: &[Revision]) -> Result<HistoryStatus> {
    if local == database {
        return Ok(HistoryStatus::Synchronized);
    }

    if database.len() < local.len() && local.starts_with(database) {
        return Ok(HistoryStatus::PendingApply(local[database.len()..].to_vec()));
    }

    if local.len() < database.len() && database.starts_with(local) {
        return Ok(HistoryStatus::UnrecognizedInDatabase(
            database[local.len()..].to_vec(),
        ));
    }

    let known: HashSet<&Revision> = local.iter().collect();
    let unknown: Vec<Revision> = database
        .iter()
        .filter(|r| !known.contains(r))
        .copied()
        .collect();
    if !unknown.is_empty() {
        return Ok(HistoryStatus::UnrecognizedInDatabase(unknown));
    }

    let position = local
        .iter()
        .zip(database.iter())
        .position(|(l, d)| l != d)
        .unwrap_or_else(|| local.len().min(database.len()));

    Err(Error::HistoryDivergence {
        position,
        local: local.get(position).copied(),
        database: database.get(position).copied(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn revisions(n: usize) -> Vec<Revision> {
        (0..n).map(|_| Revision::generate()).collect()
    }

    #[test]
    fn test_synchronized() {
        let r = revisions(3);
        assert_eq!(reconcile(&r, &r).unwrap(), HistoryStatus::Synchronized);
        assert_eq!(reconcile(&[], &[]).unwrap(), HistoryStatus::Synchronized);
    }

    #[test]
    fn test_pending_suffix() {
        let r = revisions(3);
        assert_eq!(
            reconcile(&r, &r[..2]).unwrap(),
            HistoryStatus::PendingApply(vec![r[2]])
        );
        assert_eq!(
            reconcile(&r, &[]).unwrap(),
            HistoryStatus::PendingApply(r.clone())
        );
    }

    #[test]
    fn test_unrecognized_suffix() {
        let r = revisions(3);
        assert_eq!(
            reconcile(&r[..2], &r).unwrap(),
            HistoryStatus::UnrecognizedInDatabase(vec![r[2]])
        );
    }

    #[test]
    fn test_unknown_revision_inside_database() {
        let r = revisions(2);
        let stranger = Revision::generate();
        assert_eq!(
            reconcile(&r, &[r[0], stranger]).unwrap(),
            HistoryStatus::UnrecognizedInDatabase(vec![stranger])
        );
    }

    #[test]
    fn test_gap_is_divergence() {
        let r = revisions(3);
        let err = reconcile(&r, &[r[0], r[2]]).unwrap_err();
        match err {
            Error::HistoryDivergence {
                position,
                local,
                database,
            } => {
                assert_eq!(position, 1);
                assert_eq!(local, Some(r[1]));
                assert_eq!(database, Some(r[2]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_same_set_other_order_is_divergence() {
        let r = revisions(2);
        let err = reconcile(&r, &[r[1], r[0]]).unwrap_err();
        assert!(matches!(err, Error::HistoryDivergence { position: 0, .. }));
    }

    #[test]
    fn test_messages() {
        let r = revisions(1);
        assert!(HistoryStatus::Synchronized.message().contains("synchronized"));
        assert!(HistoryStatus::PendingApply(r.clone())
            .message()
            .contains(&r[0].to_string()));
    }
}
