//! The state-frame commit pipeline: task upsert, artifact prep, event
//! insert, fact upsert, orphan prune.

use chrono::{DateTime, Utc};
use rwm_artifacts::{ArtifactDescriptor, ArtifactStore};
use rwm_core::{fact_id, rid, task_id};
use rwm_error::Result;
use rwm_store::{Event, EventKind, Fact, FactScope, Store, Task, TaskStatus};
use tracing::debug;

/// A single decision to log as an event.
#[derive(Debug, Clone)]
pub struct DecisionInput {
    /// Caller-supplied event ID; a fresh random one is generated if absent.
    pub id: Option<String>,
    /// Event category.
    pub kind: EventKind,
    /// Explicit task link; falls back to the commit's current task.
    pub task_id: Option<String>,
    /// Human-readable summary.
    pub summary: String,
    /// Explicit evidence IDs; if omitted, all artifact IDs from this commit
    /// are attached instead.
    pub evidence: Option<Vec<String>>,
}

/// A single fact to upsert.
#[derive(Debug, Clone)]
pub struct FactInput {
    /// The fact's key.
    pub key: String,
    /// The fact's value.
    pub value: String,
    /// Visibility scope; defaults to [`FactScope::Repo`].
    pub scope: Option<FactScope>,
}

/// The full payload of one `memory_commit` request.
#[derive(Debug, Clone, Default)]
pub struct CommitInput {
    /// Task title; when set, upserts (or touches) a task and links events to it.
    pub task: Option<String>,
    /// Decisions to log, in the order they should be inserted.
    pub decisions: Vec<DecisionInput>,
    /// Artifacts to prepare and store, in positional order.
    pub artifacts: Vec<ArtifactDescriptor>,
    /// Facts to upsert.
    pub facts: Vec<FactInput>,
}

/// Applies one state frame to the store: task upsert, artifact prep, event
/// insert, fact upsert, orphan prune — in that order.
///
/// Returns the artifact IDs produced, in the same order as `input.artifacts`.
pub fn handle_commit(
    store: &mut Store,
    artifacts: &ArtifactStore,
    session: &str,
    input: CommitInput,
    ts: DateTime<Utc>,
) -> Result<Vec<String>> {
    let current_task_id = match &input.task {
        Some(title) => {
            let id = task_id(title);
            store.upsert_task(Task {
                id: id.clone(),
                session_id: session.to_string(),
                parent_id: None,
                title: title.clone(),
                status: TaskStatus::Doing,
                accept_criteria: None,
                created_at: ts,
                updated_at: ts,
            })?;
            debug!(target: "rwm.commit", task_id = %id, "upserted task");
            Some(id)
        }
        None => None,
    };

    // Build every artifact ID before inserting any event: a decision that
    // omits evidence inherits *all* artifact IDs from this commit, not just
    // the ones produced before it.
    let mut artifact_ids = Vec::with_capacity(input.artifacts.len());
    for descriptor in &input.artifacts {
        let (id, record) = artifacts.prepare_artifact(descriptor, ts)?;
        store.upsert_artifact(record)?;
        debug!(target: "rwm.commit", artifact_id = %id, "prepared artifact");
        artifact_ids.push(id);
    }

    for decision in &input.decisions {
        let event_id = decision.id.clone().unwrap_or_else(|| rid("D"));
        let evidence_ids = decision.evidence.clone().unwrap_or_else(|| artifact_ids.clone());
        store.insert_event(Event {
            id: event_id.clone(),
            kind: decision.kind,
            task_id: decision.task_id.clone().or_else(|| current_task_id.clone()),
            session_id: session.to_string(),
            summary: decision.summary.clone(),
            evidence_ids,
            ts,
        })?;
        debug!(target: "rwm.commit", event_id = %event_id, "inserted event");
    }

    for fact in &input.facts {
        let scope = fact.scope.unwrap_or(FactScope::Repo);
        let id = fact_id(&fact.key, scope.as_str());
        store.upsert_fact(Fact {
            id: id.clone(),
            key: fact.key.clone(),
            value: fact.value.clone(),
            scope,
        })?;
        debug!(target: "rwm.commit", fact_id = %id, "upserted fact");
    }

    let pruned = artifacts.prune_orphans(store);
    if pruned > 0 {
        debug!(target: "rwm.commit", pruned, "pruned orphan artifact bodies");
    }

    Ok(artifact_ids)
}
