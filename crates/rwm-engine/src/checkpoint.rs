//! Checkpoint meta builder: a trimmed snapshot of the session's working
//! state, persisted as a [`rwm_store::Checkpoint`]'s `bundle_meta`.

use rwm_store::Store;

/// Builds the `{objective, active_tasks, recent_events, facts}` snapshot
/// for a new checkpoint, each list trimmed to at most 5 entries.
#[must_use]
pub fn build_checkpoint_meta(store: &Store, session: &str) -> serde_json::Value {
    let tasks = store.list_active_tasks(session, 5);
    let events = store.list_recent_events(session, 5);
    let facts = store.list_facts();

    let objective = tasks
        .first()
        .map(|t| t.title.clone())
        .unwrap_or_else(|| "No active task".to_string());

    let active_tasks: Vec<serde_json::Value> = tasks
        .iter()
        .map(|t| serde_json::json!({"id": t.id, "title": t.title, "status": t.status}))
        .collect();

    let recent_events: Vec<serde_json::Value> = events
        .iter()
        .map(|e| serde_json::json!({"id": e.id, "kind": e.kind, "summary": e.summary}))
        .collect();

    let facts: Vec<serde_json::Value> = facts
        .into_iter()
        .take(5)
        .map(|f| serde_json::json!({"id": f.id, "key": f.key, "value": f.value}))
        .collect();

    serde_json::json!({
        "objective": objective,
        "active_tasks": active_tasks,
        "recent_events": recent_events,
        "facts": facts,
    })
}
