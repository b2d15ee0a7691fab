use super::*;
use crate::ledger::VersionLedger;
use crate::lock::MigrationLock;
use shale_core::{Migration, MigrationId};
use shale_db::DuckDbBackend;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

fn graph(b_up: &str) -> MigrationGraph {
    MigrationGraph::from_migrations(vec![
        Migration::new(MigrationId::new("001"), None, "CREATE TABLE a (id INT);", None).unwrap(),
        Migration::new(
            MigrationId::new("002"),
            Some(MigrationId::new("001")),
            b_up,
            None,
        )
        .unwrap(),
    ])
    .unwrap()
}

fn executor() -> Executor {
    Executor::new(
        VersionLedger::new("shale", "schema_ledger"),
        MigrationLock::new("shale", "migration_lock")
            .with_timeout(Duration::from_millis(50), Duration::from_millis(10)),
    )
}

#[tokio::test]
async fn test_startup_reaches_latest_and_is_repeatable() {
    let db = DuckDbBackend::in_memory().unwrap();
    let graph = graph("CREATE TABLE b (id INT);");
    let exec = executor();

    let report = migrate_on_startup(&graph, &db, &exec, &Target::Latest)
        .await
        .unwrap();
    assert_eq!(report.completed_count(), 2);

    // Second boot finds nothing to do
    let report = migrate_on_startup(&graph, &db, &exec, &Target::Latest)
        .await
        .unwrap();
    assert_eq!(report.completed_count(), 0);
}

#[tokio::test]
async fn test_startup_fails_on_broken_migration() {
    let db = DuckDbBackend::in_memory().unwrap();
    let graph = graph("CREATE TABLE b (id INT); SELECT * FROM nowhere;");
    let err = migrate_on_startup(&graph, &db, &executor(), &Target::Latest)
        .await
        .unwrap_err();
    assert_eq!(err.migration_id(), Some("002"));
}

#[tokio::test]
async fn test_startup_fails_when_cancelled() {
    let db = DuckDbBackend::in_memory().unwrap();
    let graph = graph("CREATE TABLE b (id INT);");
    let exec = executor().with_cancel_flag(Arc::new(AtomicBool::new(true)));
    let err = migrate_on_startup(&graph, &db, &exec, &Target::Latest)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TargetNotReached { .. }));
}

#[tokio::test]
async fn test_startup_fails_on_unknown_target() {
    let db = DuckDbBackend::in_memory().unwrap();
    let graph = graph("CREATE TABLE b (id INT);");
    let err = migrate_on_startup(
        &graph,
        &db,
        &executor(),
        &Target::Id(MigrationId::new("999")),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("[P001]"));
}
