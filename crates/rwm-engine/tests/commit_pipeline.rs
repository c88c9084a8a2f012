//! Exercises `handle_commit` end-to-end through a real [`Store`] and
//! [`ArtifactStore`], covering evidence inheritance and the pipeline's
//! stage ordering (task, then artifacts, then events, then facts, then
//! prune).

use chrono::Utc;
use rwm_artifacts::{ArtifactDescriptor, ArtifactStore};
use rwm_store::{EventKind, FactScope, Store};

use rwm_engine::{handle_commit, CommitInput, DecisionInput, FactInput};

fn fixture() -> (Store, ArtifactStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("rwm.db")).unwrap();
    let artifacts = ArtifactStore::new(dir.path(), dir.path().join("pool")).unwrap();
    (store, artifacts, dir)
}

#[test]
fn a_decision_with_no_explicit_evidence_inherits_every_artifact_from_the_same_commit() {
    let (mut store, artifacts, _dir) = fixture();
    let input = CommitInput {
        task: Some("refactor the parser".to_string()),
        decisions: vec![DecisionInput {
            id: None,
            kind: EventKind::Decision,
            task_id: None,
            summary: "switched to a recursive descent parser".to_string(),
            evidence: None,
        }],
        artifacts: vec![
            ArtifactDescriptor {
                text: Some("diff --git a/parser.rs".to_string()),
                ..Default::default()
            },
            ArtifactDescriptor {
                text: Some("diff --git a/lexer.rs".to_string()),
                ..Default::default()
            },
        ],
        facts: vec![],
    };

    let artifact_ids = handle_commit(&mut store, &artifacts, "proj@main", input, Utc::now()).unwrap();
    assert_eq!(artifact_ids.len(), 2);

    let events = store.list_recent_events("proj@main", 10);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].evidence_ids, artifact_ids);
}

#[test]
fn fact_upserts_are_deduplicated_by_key_and_scope() {
    let (mut store, artifacts, _dir) = fixture();
    let input = CommitInput {
        task: None,
        decisions: vec![],
        artifacts: vec![],
        facts: vec![
            FactInput { key: "build_tool".to_string(), value: "cargo".to_string(), scope: Some(FactScope::Repo) },
            FactInput { key: "build_tool".to_string(), value: "bazel".to_string(), scope: Some(FactScope::Repo) },
        ],
    };
    handle_commit(&mut store, &artifacts, "proj@main", input, Utc::now()).unwrap();

    assert_eq!(store.list_facts().len(), 1);
    assert_eq!(store.list_facts()[0].value, "bazel");
}

#[test]
fn committing_a_task_twice_updates_rather_than_duplicates_it() {
    let (mut store, artifacts, _dir) = fixture();
    let first = CommitInput { task: Some("ship the release".to_string()), ..Default::default() };
    let second = CommitInput { task: Some("ship the release".to_string()), ..Default::default() };

    handle_commit(&mut store, &artifacts, "proj@main", first, Utc::now()).unwrap();
    handle_commit(&mut store, &artifacts, "proj@main", second, Utc::now()).unwrap();

    assert_eq!(store.list_active_tasks("proj@main", 10).len(), 1);
}
