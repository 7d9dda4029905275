//! Integration tests for m3p0-core services
//!
//! These tests drive whole migration runs against a real DuckDB database
//! stored in a temporary project directory. Failing migrations are real
//! failing SQL.
//!
//! Run with: cargo test --test integration_tests -- --nocapture

use std::path::Path;
use std::sync::Arc;
use std::thread;

use serde_json::json;
use tempfile::TempDir;

use m3p0_core::adapters::duckdb::DuckDbDriver;
use m3p0_core::config::{Config, IN_MEMORY_DATABASE};
use m3p0_core::queries::DELETE_REVISION;
use m3p0_core::services::{HistoryStatus, LoggingService, RollbackTarget};
use m3p0_core::{Error, M3p0Context, MigrationDriver, Revision};

// ============================================================================
// Test Helpers
// ============================================================================

/// Create a project whose database is `app.duckdb` and initialize it
fn create_project() -> (TempDir, M3p0Context) {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("m3p0.json"), r#"{"database": "app.duckdb"}"#).unwrap();

    let ctx = M3p0Context::new(dir.path()).expect("Failed to create context");
    ctx.migration_service.init().expect("Failed to initialize");
    (dir, ctx)
}

/// Scaffold a migration and fill in its scripts
fn add_migration(
    ctx: &M3p0Context,
    name: &str,
    apply_sql: &str,
    rollback_sql: &str,
    in_transaction: bool,
) -> Revision {
    let created = ctx
        .create_service
        .create(name, in_transaction, in_transaction)
        .unwrap();
    std::fs::write(created.dir.join("apply.sql"), apply_sql).unwrap();
    std::fs::write(created.dir.join("rollback.sql"), rollback_sql).unwrap();
    created.revision
}

fn table_exists(ctx: &M3p0Context, table: &str) -> bool {
    ctx.driver
        .exists(
            "SELECT COUNT(*) > 0 FROM information_schema.tables WHERE table_name = ?",
            &[json!(table)],
        )
        .unwrap()
}

fn database_file(dir: &Path) -> std::path::PathBuf {
    dir.join("app.duckdb")
}

// ============================================================================
// Apply / Rollback Round Trips
// ============================================================================

#[test]
fn test_full_cycle_persists_across_contexts() {
    let (dir, ctx) = create_project();
    let r1 = add_migration(
        &ctx,
        "users",
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR);",
        "DROP TABLE users;",
        true,
    );
    let r2 = add_migration(
        &ctx,
        "posts",
        "CREATE TABLE posts (id INTEGER, user_id INTEGER);",
        "DROP TABLE posts;",
        true,
    );

    let result = ctx.migration_service.apply(Some("v1"), false).unwrap();
    assert_eq!(result.applied, vec![r1, r2]);
    assert!(table_exists(&ctx, "users"));
    assert!(table_exists(&ctx, "posts"));
    assert!(database_file(dir.path()).exists());
    drop(ctx);

    // A new context sees the same state
    let ctx = M3p0Context::new(dir.path()).unwrap();
    assert!(ctx.migration_service.check_history().unwrap().is_synchronized());

    let records = ctx.migration_service.applied_records().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records[0].sequence_id < records[1].sequence_id);
    assert!(records.iter().all(|r| r.version.as_deref() == Some("v1")));

    let rollback = ctx.migration_service.rollback(&RollbackTarget::Base).unwrap();
    assert_eq!(rollback.rolled_back, vec![r2, r1]);
    assert!(!table_exists(&ctx, "users"));
    assert_eq!(
        ctx.migration_service.check_history().unwrap(),
        HistoryStatus::PendingApply(vec![r1, r2])
    );

    // Everything can be applied again after a full rollback
    let again = ctx.migration_service.apply(Some("v2"), false).unwrap();
    assert_eq!(again.applied.len(), 2);
}

#[test]
fn test_failed_step_keeps_earlier_progress() {
    let (_dir, ctx) = create_project();
    let r1 = add_migration(&ctx, "one", "CREATE TABLE one (id INTEGER);", "DROP TABLE one;", true);
    ctx.migration_service.apply(Some("v1"), false).unwrap();

    let r2 = add_migration(&ctx, "two", "CREATE TABLE two (id INTEGER);", "DROP TABLE two;", true);
    let r3 = add_migration(
        &ctx,
        "three",
        "INSERT INTO missing_table VALUES (1);",
        "SELECT 1;",
        true,
    );
    let r4 = add_migration(&ctx, "four", "CREATE TABLE four (id INTEGER);", "DROP TABLE four;", true);

    let err = ctx.migration_service.apply(Some("v2"), false).unwrap_err();
    match err {
        Error::StepFailed {
            revision,
            completed,
            ..
        } => {
            assert_eq!(revision, r3);
            assert_eq!(completed, vec![r2]);
        }
        other => panic!("unexpected error: {other}"),
    }

    // r2 stays applied, nothing after r3 ran
    assert!(table_exists(&ctx, "two"));
    assert!(!table_exists(&ctx, "four"));
    assert_eq!(
        ctx.migration_service.database_history().unwrap(),
        vec![r1, r2]
    );
    assert_eq!(
        ctx.migration_service.check_history().unwrap(),
        HistoryStatus::PendingApply(vec![r3, r4])
    );
}

#[test]
fn test_rollback_runs_newest_first() {
    let (_dir, ctx) = create_project();
    let r1 = add_migration(
        &ctx,
        "audit",
        "CREATE TABLE audit (step VARCHAR, seq BIGINT);",
        "DROP TABLE audit;",
        true,
    );
    ctx.migration_service.apply(Some("v1"), false).unwrap();

    let r2 = add_migration(
        &ctx,
        "second",
        "SELECT 1;",
        "INSERT INTO audit SELECT 'r2', COUNT(*) FROM audit;",
        true,
    );
    let r3 = add_migration(
        &ctx,
        "third",
        "SELECT 1;",
        "INSERT INTO audit SELECT 'r3', COUNT(*) FROM audit;",
        true,
    );
    ctx.migration_service.apply(Some("v2"), false).unwrap();

    let result = ctx
        .migration_service
        .rollback(&RollbackTarget::Revision(r1))
        .unwrap();
    assert_eq!(result.rolled_back, vec![r3, r2]);
    assert_eq!(result.target, Some(r1));

    let rows = ctx
        .driver
        .fetch("SELECT step FROM audit ORDER BY seq", &[])
        .unwrap()
        .unwrap();
    let steps: Vec<&str> = rows.iter().map(|r| r["step"].as_str().unwrap()).collect();
    assert_eq!(steps, vec!["r3", "r2"]);
    assert_eq!(ctx.migration_service.database_history().unwrap(), vec![r1]);
}

#[test]
fn test_failed_rollback_keeps_earlier_progress() {
    let (_dir, ctx) = create_project();
    let r1 = add_migration(
        &ctx,
        "audit",
        "CREATE TABLE audit (step VARCHAR);",
        "INSERT INTO audit VALUES ('r1');",
        true,
    );
    let r2 = add_migration(
        &ctx,
        "second",
        "SELECT 1;",
        "DROP TABLE nothing_here;",
        true,
    );
    let r3 = add_migration(
        &ctx,
        "third",
        "SELECT 1;",
        "INSERT INTO audit VALUES ('r3');",
        true,
    );
    ctx.migration_service.apply(Some("v1"), false).unwrap();

    let err = ctx
        .migration_service
        .rollback(&RollbackTarget::Base)
        .unwrap_err();
    match err {
        Error::StepFailed {
            revision,
            completed,
            ..
        } => {
            assert_eq!(revision, r2);
            assert_eq!(completed, vec![r3]);
        }
        other => panic!("unexpected error: {other}"),
    }

    // r3 is undone, r2 and r1 stay applied and r1's rollback never ran
    assert_eq!(
        ctx.migration_service.database_history().unwrap(),
        vec![r1, r2]
    );
    let rows = ctx
        .driver
        .fetch("SELECT step FROM audit", &[])
        .unwrap()
        .unwrap();
    let steps: Vec<&str> = rows.iter().map(|r| r["step"].as_str().unwrap()).collect();
    assert_eq!(steps, vec!["r3"]);
    assert_eq!(
        ctx.migration_service.check_history().unwrap(),
        HistoryStatus::PendingApply(vec![r3])
    );
}

#[test]
fn test_rollback_to_version() {
    let (_dir, ctx) = create_project();
    let r1 = add_migration(&ctx, "a", "CREATE TABLE a (id INTEGER);", "DROP TABLE a;", true);
    ctx.migration_service.apply(Some("v1"), false).unwrap();
    let r2 = add_migration(&ctx, "b", "CREATE TABLE b (id INTEGER);", "DROP TABLE b;", true);
    ctx.migration_service.apply(None, true).unwrap();
    let r3 = add_migration(&ctx, "c", "CREATE TABLE c (id INTEGER);", "DROP TABLE c;", true);
    ctx.migration_service.apply(Some("v3"), false).unwrap();

    let records = ctx.migration_service.applied_records().unwrap();
    assert_eq!(records[1].revision, r2);
    assert!(records[1].version.is_none());

    let result = ctx
        .migration_service
        .rollback(&RollbackTarget::Version("v1".to_string()))
        .unwrap();
    assert_eq!(result.rolled_back, vec![r3, r2]);
    assert_eq!(ctx.migration_service.database_history().unwrap(), vec![r1]);

    // Rolling back to the current state is a no-op
    let noop = ctx
        .migration_service
        .rollback(&RollbackTarget::Version("v1".to_string()))
        .unwrap();
    assert!(noop.rolled_back.is_empty());
}

// ============================================================================
// Transaction Semantics
// ============================================================================

#[test]
fn test_transactional_failure_leaves_no_partial_effects() {
    let (_dir, ctx) = create_project();
    add_migration(
        &ctx,
        "twice",
        "CREATE TABLE dup (id INTEGER); CREATE TABLE dup (id INTEGER);",
        "DROP TABLE dup;",
        true,
    );

    let err = ctx.migration_service.apply(Some("v1"), false).unwrap_err();
    assert!(matches!(err, Error::StepFailed { .. }));
    assert!(!table_exists(&ctx, "dup"));
    assert!(ctx.migration_service.database_history().unwrap().is_empty());
}

#[test]
fn test_non_transactional_failure_keeps_earlier_statements() {
    let (_dir, ctx) = create_project();
    add_migration(
        &ctx,
        "twice",
        "CREATE TABLE dup (id INTEGER); CREATE TABLE dup (id INTEGER);",
        "DROP TABLE dup;",
        false,
    );

    let err = ctx.migration_service.apply(Some("v1"), false).unwrap_err();
    assert!(matches!(err, Error::StepFailed { .. }));
    assert!(table_exists(&ctx, "dup"));
    assert!(ctx.migration_service.database_history().unwrap().is_empty());
}

// ============================================================================
// History Integrity
// ============================================================================

#[test]
fn test_divergent_history_is_reported() {
    let (_dir, ctx) = create_project();
    add_migration(&ctx, "a", "SELECT 1;", "SELECT 1;", true);
    let r2 = add_migration(&ctx, "b", "SELECT 1;", "SELECT 1;", true);
    add_migration(&ctx, "c", "SELECT 1;", "SELECT 1;", true);
    ctx.migration_service.apply(Some("v1"), false).unwrap();

    // Remove a record from the middle of the applied history
    ctx.driver
        .execute(DELETE_REVISION, &[json!(r2.to_hyphenated())])
        .unwrap();

    let err = ctx.migration_service.check_history().unwrap_err();
    assert!(matches!(err, Error::HistoryDivergence { position: 1, .. }));
    assert!(matches!(
        ctx.migration_service.apply(Some("v2"), false),
        Err(Error::HistoryDivergence { .. })
    ));
}

#[test]
fn test_unknown_database_revision_blocks_apply() {
    let (dir, ctx) = create_project();
    add_migration(&ctx, "a", "SELECT 1;", "SELECT 1;", true);
    ctx.migration_service.apply(Some("v1"), false).unwrap();

    // Local migrations disappear (e.g. another branch checked out)
    std::fs::remove_dir_all(dir.path().join("migrations")).unwrap();

    let status = ctx.migration_service.check_history().unwrap();
    assert!(matches!(status, HistoryStatus::UnrecognizedInDatabase(ref r) if r.len() == 1));
    assert!(matches!(
        ctx.migration_service.apply(Some("v2"), false),
        Err(Error::Validation(_))
    ));
}

#[test]
fn test_branching_chain_blocks_every_command() {
    let (dir, ctx) = create_project();
    add_migration(&ctx, "a", "SELECT 1;", "SELECT 1;", true);

    // A second root, as if two developers created migrations independently
    let stray = dir.path().join("migrations").join("stray");
    std::fs::create_dir_all(&stray).unwrap();
    let spec = m3p0_core::MigrationSpec::new(None, true, true);
    std::fs::write(
        stray.join("specification.json"),
        serde_json::to_string(&spec).unwrap(),
    )
    .unwrap();

    assert!(matches!(
        ctx.migration_service.check_history(),
        Err(Error::Branching { .. })
    ));
    assert!(matches!(
        ctx.create_service.create("next", true, true),
        Err(Error::Branching { .. })
    ));
}

// ============================================================================
// Logging and Drivers
// ============================================================================

#[test]
fn test_executor_logs_migration_events() {
    let (dir, ctx) = create_project();
    let logger = Arc::new(LoggingService::new(&dir.path().join(".m3p0"), "test").unwrap());
    let ctx = ctx.with_logger(Arc::clone(&logger));

    add_migration(&ctx, "ok", "CREATE TABLE ok (id INTEGER);", "DROP TABLE ok;", true);
    add_migration(&ctx, "bad", "DROP TABLE nothing_here;", "SELECT 1;", true);

    assert!(ctx.migration_service.apply(Some("v1"), false).is_err());

    let entries = logger.get_recent(10).unwrap();
    let events: Vec<&str> = entries.iter().map(|e| e.event.as_str()).collect();
    assert!(events.contains(&"migration_applied"));
    assert!(events.contains(&"migration_apply_failed"));

    let errors = logger.get_errors(10).unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].version.as_deref(), Some("v1"));
}

#[test]
fn test_custom_driver_injection() {
    let dir = TempDir::new().unwrap();
    let driver: Arc<dyn MigrationDriver> = Arc::new(DuckDbDriver::open_in_memory().unwrap());
    let config = Config::for_database(dir.path(), IN_MEMORY_DATABASE);
    let ctx = M3p0Context::with_driver(config, driver);

    assert!(!ctx.migration_service.init().unwrap().already_initialized);
    assert!(ctx.migration_service.init().unwrap().already_initialized);
    assert_eq!(ctx.driver.name(), "duckdb");
}

#[test]
fn test_driver_is_shared_across_threads() {
    let dir = TempDir::new().unwrap();
    let driver = Arc::new(DuckDbDriver::new(&dir.path().join("shared.duckdb")).unwrap());
    driver
        .execute_migration("CREATE TABLE counter (n INTEGER);", true)
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let driver = Arc::clone(&driver);
            thread::spawn(move || {
                driver
                    .execute("INSERT INTO counter VALUES (?)", &[json!(i)])
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        driver.fetch_val("SELECT COUNT(*) FROM counter", &[]).unwrap(),
        json!(4)
    );
}

#[test]
fn test_missing_database_is_config_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("m3p0.json"),
        r#"{"databaseEnv": "M3P0_INTEGRATION_UNSET_VARIABLE"}"#,
    )
    .unwrap();

    let err = M3p0Context::new(dir.path()).err().unwrap();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))));
}
