use super::*;
use chrono::Utc;

fn chain(ids: &[&str]) -> MigrationGraph {
    let mut prev: Option<&str> = None;
    let mut migrations = Vec::new();
    for id in ids {
        let migration = Migration::new(
            MigrationId::new(*id),
            prev.map(MigrationId::new),
            format!("CREATE TABLE t_{id} (x INTEGER);"),
            Some(format!("DROP TABLE t_{id};")),
        )
        .unwrap();
        migrations.push(migration);
        prev = Some(*id);
    }
    MigrationGraph::from_migrations(migrations).unwrap()
}

fn entries(ids: &[&str]) -> Vec<LedgerEntry> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| LedgerEntry {
            id: MigrationId::new(*id),
            seq: i as i64 + 1,
            applied_at: Utc::now(),
            checksum: String::new(),
        })
        .collect()
}

fn step_ids<'a>(steps: &[&'a Migration]) -> Vec<&'a str> {
    steps.iter().map(|&m| m.id.as_str()).collect()
}

#[test]
fn test_target_from_str() {
    assert_eq!("latest".parse::<Target>().unwrap(), Target::Latest);
    assert_eq!("HEAD".parse::<Target>().unwrap(), Target::Latest);
    assert_eq!(
        "002".parse::<Target>().unwrap(),
        Target::Id(MigrationId::new("002"))
    );
    assert!("  ".parse::<Target>().is_err());
    assert_eq!(Target::default().to_string(), "latest");
}

#[test]
fn test_plan_from_empty_ledger_to_specific_target() {
    let graph = chain(&["A", "B", "C"]);
    let plan = plan(&graph, &[], &Target::Id(MigrationId::new("C"))).unwrap();
    assert_eq!(step_ids(&plan.steps), vec!["A", "B", "C"]);
    assert_eq!(plan.base, None);
    assert_eq!(plan.target.as_ref().map(|t| t.as_str()), Some("C"));
}

#[test]
fn test_plan_resumes_after_current() {
    let graph = chain(&["A", "B", "C", "D"]);
    let plan = plan(&graph, &entries(&["A", "B"]), &Target::Latest).unwrap();
    assert_eq!(step_ids(&plan.steps), vec!["C", "D"]);
    assert_eq!(plan.base.as_ref().map(|b| b.as_str()), Some("B"));
}

#[test]
fn test_plan_stops_at_intermediate_target() {
    let graph = chain(&["A", "B", "C"]);
    let plan = plan(&graph, &entries(&["A"]), &Target::Id(MigrationId::new("B"))).unwrap();
    assert_eq!(step_ids(&plan.steps), vec!["B"]);
}

#[test]
fn test_plan_is_empty_when_target_reached() {
    let graph = chain(&["A", "B"]);
    let plan = plan(&graph, &entries(&["A", "B"]), &Target::Latest).unwrap();
    assert!(plan.is_empty());

    let plan = plan_at(&graph, &["A"], "A");
    assert!(plan.is_empty());
}

fn plan_at<'a>(graph: &'a MigrationGraph, applied: &[&str], target: &str) -> Plan<'a> {
    plan(graph, &entries(applied), &Target::Id(MigrationId::new(target))).unwrap()
}

#[test]
fn test_plan_on_empty_graph() {
    let graph = chain(&[]);
    let plan = plan(&graph, &[], &Target::Latest).unwrap();
    assert!(plan.is_empty());
    assert!(plan.target.is_none());
}

#[test]
fn test_unknown_target() {
    let graph = chain(&["A", "B"]);
    let err = plan(&graph, &[], &Target::Id(MigrationId::new("Z"))).unwrap_err();
    assert!(matches!(err, CoreError::UnknownTarget { ref target } if target == "Z"));
}

#[test]
fn test_ledger_past_target_is_already_ahead() {
    let graph = chain(&["A", "B", "C"]);
    let err = plan(
        &graph,
        &entries(&["A", "B", "C"]),
        &Target::Id(MigrationId::new("A")),
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyAhead { .. }));
    assert!(err.to_string().contains("past the target"));
}

#[test]
fn test_diverged_history_is_already_ahead() {
    let graph = chain(&["A", "B", "C"]);

    // Recorded out of graph order
    let err = plan(&graph, &entries(&["A", "C"]), &Target::Latest).unwrap_err();
    assert!(matches!(err, CoreError::AlreadyAhead { .. }));

    // Skipped the root
    let err = plan(&graph, &entries(&["B"]), &Target::Latest).unwrap_err();
    assert!(matches!(err, CoreError::AlreadyAhead { .. }));

    // Unknown recorded id
    let err = plan(&graph, &entries(&["A", "X"]), &Target::Latest).unwrap_err();
    assert!(err.to_string().contains("'X' is not in the migration graph"));
}

#[test]
fn test_rollback_plan_newest_first() {
    let graph = chain(&["A", "B", "C"]);
    let rollback = plan_rollback(&graph, &entries(&["A", "B", "C"]), 2).unwrap();
    assert_eq!(step_ids(&rollback.steps), vec!["C", "B"]);
    assert_eq!(rollback.base.as_ref().map(|b| b.as_str()), Some("C"));
    assert_eq!(rollback.after.as_ref().map(|a| a.as_str()), Some("A"));
}

#[test]
fn test_rollback_plan_lists_irreversible_steps() {
    let mut migrations: Vec<Migration> =
        chain(&["A", "B", "C"]).ordered().into_iter().cloned().collect();
    migrations[1].down_sql = None;
    let graph = MigrationGraph::from_migrations(migrations).unwrap();

    let rollback = plan_rollback(&graph, &entries(&["A", "B", "C"]), 3).unwrap();
    assert_eq!(rollback.irreversible(), vec![&MigrationId::new("B")]);

    let rollback = plan_rollback(&graph, &entries(&["A", "B", "C"]), 1).unwrap();
    assert!(rollback.irreversible().is_empty());
}

#[test]
fn test_rollback_everything_leaves_no_head() {
    let graph = chain(&["A", "B"]);
    let rollback = plan_rollback(&graph, &entries(&["A", "B"]), 2).unwrap();
    assert_eq!(step_ids(&rollback.steps), vec!["B", "A"]);
    assert!(rollback.after.is_none());
}

#[test]
fn test_rollback_zero_steps_is_empty() {
    let graph = chain(&["A"]);
    let rollback = plan_rollback(&graph, &entries(&["A"]), 0).unwrap();
    assert!(rollback.is_empty());
}

#[test]
fn test_rollback_out_of_range() {
    let graph = chain(&["A", "B", "C"]);
    let err = plan_rollback(&graph, &entries(&["A"]), 2).unwrap_err();
    assert!(matches!(
        err,
        CoreError::RollbackOutOfRange {
            requested: 2,
            applied: 1
        }
    ));
}

#[test]
fn test_rollback_rejects_diverged_ledger() {
    let graph = chain(&["A", "B"]);
    let err = plan_rollback(&graph, &entries(&["B"]), 1).unwrap_err();
    assert!(matches!(err, CoreError::AlreadyAhead { .. }));
}
