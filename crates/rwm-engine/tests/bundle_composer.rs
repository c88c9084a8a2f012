//! Composes a bundle against a realistic store fixture (active task, mixed
//! decision/test-fail/note events, and project facts) and checks mandatory
//! inclusion and budget respect end-to-end.

use chrono::Utc;
use rwm_core::{HeuristicEstimator, ModelFamily};
use rwm_engine::{compose, ComposeRequest};
use rwm_store::{Event, EventKind, Fact, FactScope, Store, Task, TaskStatus};

fn seeded_store() -> Store {
    let dir = tempfile::tempdir().unwrap();
    let mut store = Store::open(dir.path().join("rwm.db")).unwrap();
    let now = Utc::now();

    store
        .upsert_task(Task {
            id: "T-ship".to_string(),
            session_id: "proj@main".to_string(),
            parent_id: None,
            title: "ship the release".to_string(),
            status: TaskStatus::Doing,
            accept_criteria: None,
            created_at: now,
            updated_at: now,
        })
        .unwrap();

    store
        .insert_event(Event {
            id: "D-1".to_string(),
            kind: EventKind::Decision,
            task_id: Some("T-ship".to_string()),
            session_id: "proj@main".to_string(),
            summary: "chose blue-green deploy".to_string(),
            evidence_ids: vec![],
            ts: now,
        })
        .unwrap();

    store
        .insert_event(Event {
            id: "E-fail".to_string(),
            kind: EventKind::TestFail,
            task_id: Some("T-ship".to_string()),
            session_id: "proj@main".to_string(),
            summary: "integration test timeout".to_string(),
            evidence_ids: vec![],
            ts: now,
        })
        .unwrap();

    store
        .insert_event(Event {
            id: "E-note".to_string(),
            kind: EventKind::Note,
            task_id: None,
            session_id: "proj@main".to_string(),
            summary: "a low-priority observation nobody needs in a tiny budget".to_string(),
            evidence_ids: vec![],
            ts: now,
        })
        .unwrap();

    store
        .upsert_fact(Fact {
            id: "F-engine".to_string(),
            key: "runtime".to_string(),
            value: "tokio".to_string(),
            scope: FactScope::Repo,
        })
        .unwrap();

    store
}

#[test]
fn mandatory_items_survive_even_a_tight_budget() {
    let store = seeded_store();
    let estimator = HeuristicEstimator;
    let request = ComposeRequest { session: "proj@main".to_string(), budget: 30, family: ModelFamily::Generic };

    let result = compose(&store, &estimator, &request, Utc::now());

    let ids: Vec<&str> = result.picked.iter().map(|p| p.pointer_id.as_str()).collect();
    assert!(ids.contains(&"D-1"), "decision must be mandatory: {ids:?}");
    assert!(ids.contains(&"E-fail"), "test failure must be mandatory: {ids:?}");
    assert!(result.token_estimate <= result.budget);
}

#[test]
fn now_card_reports_the_active_task_as_the_objective() {
    let store = seeded_store();
    let estimator = HeuristicEstimator;
    let request = ComposeRequest { session: "proj@main".to_string(), budget: 5000, family: ModelFamily::Generic };

    let result = compose(&store, &estimator, &request, Utc::now());

    assert!(result.now.objective.contains("ship the release"));
    assert!(result.now.active_task_ids.contains(&"T-ship".to_string()));
    assert!(result.now.decision_ids.contains(&"D-1".to_string()));
    assert!(result.now.failing_test_ids.contains(&"E-fail".to_string()));
}

#[test]
fn a_generous_budget_admits_the_low_priority_note_too() {
    let store = seeded_store();
    let estimator = HeuristicEstimator;
    let request = ComposeRequest { session: "proj@main".to_string(), budget: 5000, family: ModelFamily::Generic };

    let result = compose(&store, &estimator, &request, Utc::now());
    let ids: Vec<&str> = result.picked.iter().map(|p| p.pointer_id.as_str()).collect();
    assert!(ids.contains(&"E-note"));
    assert!(ids.contains(&"F-engine"));
}
