//! Integration tests driving the engine against on-disk migrations and a
//! file-backed DuckDB database.

use shale_core::{Migration, MigrationGraph, MigrationId, Target};
use shale_db::{Database, DuckDbBackend};
use shale_engine::{EngineError, Executor, MigrationLock, VersionLedger};
use std::path::Path;
use std::time::Duration;

// ── Helpers ────────────────────────────────────────────────────────────

fn write_migration(root: &Path, dir: &str, id: &str, revises: Option<&str>, up: &str) {
    let path = root.join(dir);
    std::fs::create_dir_all(&path).unwrap();
    let revises = revises.map_or("null".to_string(), |r| format!("'{r}'"));
    std::fs::write(
        path.join("migration.yml"),
        format!("id: '{id}'\nrevises: {revises}\n"),
    )
    .unwrap();
    std::fs::write(path.join("up.sql"), up).unwrap();
    std::fs::write(path.join("down.sql"), format!("DROP TABLE {dir};\n")).unwrap();
}

fn abc_project(root: &Path) {
    write_migration(root, "t_a", "A", None, "CREATE TABLE t_a (id INTEGER);\n");
    write_migration(root, "t_b", "B", Some("A"), "CREATE TABLE t_b (id INTEGER);\n");
    write_migration(root, "t_c", "C", Some("B"), "CREATE TABLE t_c (id INTEGER);\n");
}

fn executor() -> Executor {
    Executor::new(
        VersionLedger::new("shale", "schema_ledger"),
        MigrationLock::new("shale", "migration_lock")
            .with_timeout(Duration::from_millis(100), Duration::from_millis(10)),
    )
}

fn ids(migrations: &[&Migration]) -> Vec<String> {
    migrations.iter().map(|m| m.id.to_string()).collect()
}

// ── Scenario ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_abc_scenario_with_drift() {
    let tmp = tempfile::tempdir().unwrap();
    let migrations = tmp.path().join("migrations");
    abc_project(&migrations);
    let db_path = tmp.path().join("app.duckdb");

    {
        let graph = MigrationGraph::load(&migrations).unwrap();
        let db = DuckDbBackend::from_path(&db_path).unwrap();
        let exec = executor();

        let plan = exec
            .plan(&graph, &db, &Target::Id(MigrationId::new("C")))
            .await
            .unwrap();
        assert_eq!(ids(&plan.steps), vec!["A", "B", "C"]);

        let report = exec.apply(&plan, &db).await.unwrap();
        assert_eq!(report.completed_count(), 3);
        assert_eq!(exec.ledger().current(&db).await.unwrap().unwrap(), "C");
    }

    // Edit B's forward operation after it was applied
    std::fs::write(
        migrations.join("t_b").join("up.sql"),
        "CREATE TABLE t_b (id BIGINT);\n",
    )
    .unwrap();

    let graph = MigrationGraph::load(&migrations).unwrap();
    let db = DuckDbBackend::from_path(&db_path).unwrap();
    let exec = executor();

    // The ledger survived reconnecting
    let entries = exec.ledger().entries(&db).await.unwrap();
    assert_eq!(entries.len(), 3);

    let err = exec
        .ledger()
        .verify(&db, graph.get("B").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Drift { ref id, .. } if id == "B"));
    exec.ledger()
        .verify(&db, graph.get("C").unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_new_migration_is_picked_up_incrementally() {
    let tmp = tempfile::tempdir().unwrap();
    let migrations = tmp.path().join("migrations");
    write_migration(&migrations, "t_a", "A", None, "CREATE TABLE t_a (id INTEGER);\n");
    let db = DuckDbBackend::in_memory().unwrap();
    let exec = executor();

    let graph = MigrationGraph::load(&migrations).unwrap();
    let plan = exec.plan(&graph, &db, &Target::Latest).await.unwrap();
    exec.apply(&plan, &db).await.unwrap();

    write_migration(&migrations, "t_b", "B", Some("A"), "CREATE TABLE t_b (id INTEGER);\n");
    let graph = MigrationGraph::load(&migrations).unwrap();
    let plan = exec.plan(&graph, &db, &Target::Latest).await.unwrap();
    assert_eq!(ids(&plan.steps), vec!["B"]);
    assert_eq!(plan.base.as_ref().map(|b| b.as_str()), Some("A"));

    exec.apply(&plan, &db).await.unwrap();
    assert!(db.relation_exists("t_b").await.unwrap());
}

#[tokio::test]
async fn test_removed_migration_is_diverged_history() {
    let tmp = tempfile::tempdir().unwrap();
    let migrations = tmp.path().join("migrations");
    abc_project(&migrations);
    let db = DuckDbBackend::in_memory().unwrap();
    let exec = executor();

    let graph = MigrationGraph::load(&migrations).unwrap();
    let plan = exec.plan(&graph, &db, &Target::Latest).await.unwrap();
    exec.apply(&plan, &db).await.unwrap();

    // The deployed artefact no longer ships C
    std::fs::remove_dir_all(migrations.join("t_c")).unwrap();
    let graph = MigrationGraph::load(&migrations).unwrap();
    let err = exec.plan(&graph, &db, &Target::Latest).await.unwrap_err();
    assert!(err.to_string().contains("[P002]"));
}

#[tokio::test]
async fn test_full_rollback_restores_empty_schema() {
    let tmp = tempfile::tempdir().unwrap();
    let migrations = tmp.path().join("migrations");
    abc_project(&migrations);
    let db = DuckDbBackend::in_memory().unwrap();
    let exec = executor();

    let graph = MigrationGraph::load(&migrations).unwrap();
    let plan = exec.plan(&graph, &db, &Target::Latest).await.unwrap();
    exec.apply(&plan, &db).await.unwrap();

    let report = exec.rollback(&graph, &db, 3).await.unwrap();
    assert!(report.is_success());
    assert_eq!(exec.ledger().current(&db).await.unwrap(), None);
    for table in ["t_a", "t_b", "t_c"] {
        assert!(!db.relation_exists(table).await.unwrap());
    }
}
