use super::*;
use shale_db::DuckDbBackend;

fn migration(id: &str, up: &str) -> Migration {
    Migration::new(MigrationId::new(id), None, up, None).unwrap()
}

async fn fresh() -> (DuckDbBackend, VersionLedger) {
    let db = DuckDbBackend::in_memory().unwrap();
    let ledger = VersionLedger::new("shale", "schema_ledger");
    ledger.ensure(&db).await.unwrap();
    (db, ledger)
}

#[tokio::test]
async fn test_ensure_is_idempotent() {
    let (db, ledger) = fresh().await;
    ledger.ensure(&db).await.unwrap();
    assert!(db.relation_exists("shale.schema_ledger").await.unwrap());
}

#[tokio::test]
async fn test_missing_table_reads_as_empty() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ledger = VersionLedger::new("shale", "schema_ledger");
    assert!(ledger.entries(&db).await.unwrap().is_empty());
    assert_eq!(ledger.current(&db).await.unwrap(), None);
    // Reading must not create anything
    assert!(!db.relation_exists("shale.schema_ledger").await.unwrap());
}

#[tokio::test]
async fn test_record_appends_in_order() {
    let (db, ledger) = fresh().await;
    let a = migration("A", "SELECT 1;");
    let b = migration("B", "SELECT 2;");

    let before = Utc::now().timestamp_micros();
    let first = ledger.record(&db, &a, &a.checksum()).await.unwrap();
    ledger.record(&db, &b, &b.checksum()).await.unwrap();
    assert_eq!(first.seq, 1);

    let entries = ledger.entries(&db).await.unwrap();
    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B"]);
    assert_eq!(entries[1].seq, 2);
    assert_eq!(entries[0].checksum, a.checksum());
    // Timestamps survive the round trip at microsecond precision
    assert_eq!(entries[0].applied_at, first.applied_at);
    assert!(entries[0].applied_at.timestamp_micros() >= before);

    assert_eq!(ledger.current(&db).await.unwrap().unwrap(), "B");
}

#[tokio::test]
async fn test_duplicate_record_is_ledger_write_error() {
    let (db, ledger) = fresh().await;
    let a = migration("A", "SELECT 1;");
    ledger.record(&db, &a, &a.checksum()).await.unwrap();

    let err = ledger.record(&db, &a, &a.checksum()).await.unwrap_err();
    assert!(matches!(err, EngineError::LedgerWrite { ref id, .. } if id == "A"));
    assert_eq!(ledger.entries(&db).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_record_without_table_is_ledger_write_error() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ledger = VersionLedger::new("shale", "schema_ledger");
    let a = migration("A", "SELECT 1;");
    let err = ledger.record(&db, &a, &a.checksum()).await.unwrap_err();
    assert!(err.to_string().starts_with("[L001]"));
}

#[tokio::test]
async fn test_remove() {
    let (db, ledger) = fresh().await;
    let a = migration("A", "SELECT 1;");
    ledger.record(&db, &a, &a.checksum()).await.unwrap();

    ledger.remove(&db, "A").await.unwrap();
    assert!(ledger.entries(&db).await.unwrap().is_empty());

    let err = ledger.remove(&db, "A").await.unwrap_err();
    assert!(matches!(err, EngineError::LedgerWrite { .. }));
}

#[tokio::test]
async fn test_verify_detects_drift() {
    let (db, ledger) = fresh().await;
    let b = migration("B", "CREATE TABLE b (id INT);");
    ledger.record(&db, &b, &b.checksum()).await.unwrap();
    ledger.verify(&db, &b).await.unwrap();

    let edited = migration("B", "CREATE TABLE b (id BIGINT);");
    let err = ledger.verify(&db, &edited).await.unwrap_err();
    match err {
        EngineError::Drift {
            id,
            recorded,
            current,
        } => {
            assert_eq!(id, "B");
            assert_eq!(recorded, b.checksum());
            assert_eq!(current, edited.checksum());
        }
        other => panic!("expected drift, got {other}"),
    }
}

#[tokio::test]
async fn test_verify_unrecorded_migration_passes() {
    let (db, ledger) = fresh().await;
    ledger
        .verify(&db, &migration("never", "SELECT 1;"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_verify_all_reports_first_drift() {
    let (db, ledger) = fresh().await;
    let a = Migration::new(MigrationId::new("A"), None, "SELECT 1;", None).unwrap();
    let b = Migration::new(
        MigrationId::new("B"),
        Some(MigrationId::new("A")),
        "SELECT 2;",
        None,
    )
    .unwrap();
    ledger.record(&db, &a, &a.checksum()).await.unwrap();
    ledger.record(&db, &b, "stale-checksum").await.unwrap();

    let graph = MigrationGraph::from_migrations(vec![a, b]).unwrap();
    let err = ledger.verify_all(&db, &graph).await.unwrap_err();
    assert!(matches!(err, EngineError::Drift { ref id, .. } if id == "B"));
}

#[tokio::test]
async fn test_ledger_in_custom_schema() {
    let db = DuckDbBackend::in_memory().unwrap();
    let ledger = VersionLedger::from_config(&LedgerConfig {
        schema: "ops".to_string(),
        table: "applied".to_string(),
        lock_table: "applied_lock".to_string(),
    });
    ledger.ensure(&db).await.unwrap();
    assert_eq!(ledger.qualified_name(), "ops.applied");
    assert!(db.relation_exists("ops.applied").await.unwrap());
}

#[tokio::test]
async fn test_ledger_in_database_file_named_after_schema() {
    let dir = tempfile::tempdir().unwrap();
    let db = DuckDbBackend::from_path(&dir.path().join("shale.duckdb")).unwrap();
    assert_eq!(db.catalog(), "shale");

    let ledger = VersionLedger::new("shale", "schema_ledger");
    ledger.ensure(&db).await.unwrap();
    let a = migration("A", "SELECT 1;");
    ledger.record(&db, &a, &a.checksum()).await.unwrap();

    assert_eq!(ledger.current(&db).await.unwrap(), Some(MigrationId::new("A")));
    ledger.verify(&db, &a).await.unwrap();
    ledger.remove(&db, "A").await.unwrap();
    assert!(ledger.entries(&db).await.unwrap().is_empty());
}
