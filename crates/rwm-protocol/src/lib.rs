//! Request validation and dispatch for the RWM tool surface: six `memory_*`
//! operations (§6), each a variant of [`schema::Request`], matched by
//! [`Engine::dispatch`] to the relevant core routine.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Wire types for the six operations.
pub mod schema;
/// Resolution of `artifact://`/`workspace://` resource URIs.
pub mod resource;

use std::path::PathBuf;

use chrono::Utc;
use rwm_artifacts::{ArtifactDescriptor, ArtifactStore};
use rwm_core::{canonicalize_alias, normalize_session_id, rid, BranchCache, HeuristicEstimator, ModelFamily};
use rwm_engine::{build_checkpoint_meta, compose, handle_commit, CommitInput, ComposeRequest, DecisionInput, FactInput};
use rwm_error::{Result, RwmError};
use rwm_store::{Artifact, ArtifactKind, Checkpoint, FactScope, Store, TaskStatus, TokenMetric};

pub use schema::{ArtifactPayload, DecisionPayload, FactPayload, Request, Response, UpdateTarget};
pub use resource::ResourceBody;

const MAX_TOKEN_BUDGET: u32 = 1_000_000;
const MAX_SEARCH_LIMIT: usize = 200;

/// Everything a request handler needs: the structured store, the artifact
/// pool, the session branch cache, the workspace root, and the configured
/// defaults (bundle budget, model family).
pub struct Engine {
    store: Store,
    artifacts: ArtifactStore,
    branch_cache: BranchCache,
    root: PathBuf,
    estimator: HeuristicEstimator,
    default_budget: u32,
    default_family: ModelFamily,
}

impl Engine {
    /// Opens the store and artifact pool rooted at `root`.
    pub fn open(
        root: impl Into<PathBuf>,
        db_path: impl Into<PathBuf>,
        pool_dir: impl Into<PathBuf>,
        default_budget: u32,
        default_family: ModelFamily,
    ) -> Result<Self> {
        let root = root.into();
        let store = Store::open(db_path)?;
        let artifacts = ArtifactStore::new(&root, pool_dir)?;
        Ok(Self {
            store,
            artifacts,
            branch_cache: BranchCache::new(),
            root,
            estimator: HeuristicEstimator,
            default_budget,
            default_family,
        })
    }

    /// Resolves `raw` to its canonical session ID and folds any rows
    /// recorded under the no-git-lookup alias (`canonicalize_alias`, e.g.
    /// `proj@unknown` or a dated fallback) into it, so a branch that only
    /// resolves on a later call does not strand prior records under the
    /// stale id.
    fn session(&mut self, raw: &str) -> String {
        let session = normalize_session_id(raw, &self.root, &self.branch_cache);
        let alias = canonicalize_alias(raw, &self.root);
        if alias != session {
            let base = alias.split('@').next().unwrap_or(&alias);
            if let Err(err) = self.store.canonicalize_sessions(base, &session) {
                tracing::warn!(%err, %base, canonical = %session, "session alias fold failed");
            }
        }
        session
    }

    /// Validates, resolves, and executes `request`, returning a uniform
    /// `{text, structured, error}` response. Never panics on bad input —
    /// failures are folded into [`Response::from_error`].
    pub fn dispatch(&mut self, request: Request) -> Response {
        let result = match request {
            Request::MemoryResume { session_id, token_budget } => self.resume(session_id, token_budget),
            Request::MemoryCommit { session_id, task, decisions, artifacts, facts } => {
                self.commit(session_id, task, decisions, artifacts, facts)
            }
            Request::MemoryUpdate { target, id, fields } => self.update(target, id, fields),
            Request::MemoryFetch { id } => self.fetch(id),
            Request::MemorySpan { path, start_line, end_line } => self.span(path, start_line, end_line),
            Request::MemorySearch { session_id, query, limit } => self.search(session_id, query, limit),
            Request::MemoryCheckpoint { session_id, label } => self.checkpoint(session_id, label),
        };
        match result {
            Ok(response) => response,
            Err(err) => Response::from_error(&err),
        }
    }

    // -- memory_resume ---------------------------------------------------

    fn resume(&mut self, session_id: String, token_budget: Option<u32>) -> Result<Response> {
        let budget = token_budget.unwrap_or(self.default_budget);
        if !(1..=MAX_TOKEN_BUDGET).contains(&budget) {
            return Err(RwmError::validation(format!(
                "tokenBudget must be within 1..={MAX_TOKEN_BUDGET}, got {budget}"
            )));
        }
        let session = self.session(&session_id);
        let result = compose(
            &self.store,
            &self.estimator,
            &ComposeRequest {
                session: session.clone(),
                budget,
                family: self.default_family,
            },
            Utc::now(),
        );

        for item in &result.picked {
            self.store.insert_token_metric(TokenMetric {
                id: rid("M"),
                session_id: session.clone(),
                pointer_id: item.pointer_id.clone(),
                token_cost: item.token_cost,
                budget,
                created_at: Utc::now(),
            })?;
        }

        let pointers: Vec<serde_json::Value> = result
            .picked
            .iter()
            .map(|p| serde_json::json!({"id": p.pointer_id, "type": item_kind_str(p.kind), "text": p.text, "tokenCost": p.token_cost}))
            .collect();

        Ok(Response::ok(
            result.text,
            serde_json::json!({
                "now": {
                    "objective": result.now.objective,
                    "active": result.now.active_task_ids,
                    "decisions": result.now.decision_ids,
                    "failingTests": result.now.failing_test_ids,
                },
                "pointers": pointers,
                "token_estimate": result.token_estimate,
                "budget": result.budget,
                "session_id": session,
            }),
        ))
    }

    // -- memory_commit -----------------------------------------------------

    fn commit(
        &mut self,
        session_id: String,
        task: Option<String>,
        decisions: Vec<DecisionPayload>,
        artifacts: Vec<ArtifactPayload>,
        facts: Vec<FactPayload>,
    ) -> Result<Response> {
        let session = self.session(&session_id);

        let decisions = decisions
            .into_iter()
            .map(|d| DecisionInput {
                id: d.id,
                kind: d.kind,
                task_id: d.task_id,
                summary: d.summary,
                evidence: d.evidence,
            })
            .collect();

        let artifacts_in = artifacts
            .into_iter()
            .map(|a| ArtifactDescriptor {
                id: a.id,
                kind: a.kind,
                uri: a.uri,
                text: a.text,
                path: a.path,
                start_line: a.start_line,
                end_line: a.end_line,
                meta: a.meta,
            })
            .collect();

        let mut facts_in = Vec::with_capacity(facts.len());
        for f in facts {
            let scope = match &f.scope {
                Some(s) if !s.is_empty() => Some(
                    s.parse::<FactScope>()
                        .map_err(RwmError::validation)?,
                ),
                _ => None,
            };
            facts_in.push(FactInput {
                key: f.key,
                value: f.value,
                scope,
            });
        }

        let ts = Utc::now();
        let input = CommitInput {
            task,
            decisions,
            artifacts: artifacts_in,
            facts: facts_in,
        };
        let artifact_ids = handle_commit(&mut self.store, &self.artifacts, &session, input, ts)?;

        Ok(Response::ok(
            format!("committed {} artifact(s) for {session}", artifact_ids.len()),
            serde_json::json!({
                "ok": true,
                "ts": ts,
                "artifactIds": artifact_ids,
                "session_id": session,
            }),
        ))
    }

    // -- memory_update -----------------------------------------------------

    fn update(&mut self, target: UpdateTarget, id: String, fields: serde_json::Value) -> Result<Response> {
        let fields = fields
            .as_object()
            .cloned()
            .ok_or_else(|| RwmError::validation("fields must be a JSON object"))?;

        match target {
            UpdateTarget::Task => self.update_task(id, fields),
            UpdateTarget::Artifact => self.update_artifact(id, fields),
            UpdateTarget::Fact => self.update_fact(id, fields),
        }
    }

    fn update_task(&mut self, id: String, fields: serde_json::Map<String, serde_json::Value>) -> Result<Response> {
        let existing = self
            .store
            .get_task_by_id(&id)
            .cloned()
            .ok_or_else(|| RwmError::not_found(format!("task {id} not found")))?;

        if fields.is_empty() {
            return Err(RwmError::invalid_update(format!("no mutable fields supplied for task {id}")));
        }

        let mut task = existing;
        if let Some(title) = fields.get("title").and_then(|v| v.as_str()) {
            task.title = title.to_string();
        }
        if let Some(status) = fields.get("status") {
            task.status = serde_json::from_value::<TaskStatus>(status.clone())
                .map_err(|e| RwmError::validation(format!("invalid status: {e}")))?;
        }
        if let Some(parent_id) = fields.get("parent_id").or_else(|| fields.get("parentId")) {
            task.parent_id = parent_id.as_str().map(str::to_string);
        }
        // `accept_criteria` distinguishes "omit" (key absent) from "set to
        // null" (key present, value null) — only touch it when present.
        if let Some(criteria) = fields.get("accept_criteria").or_else(|| fields.get("acceptCriteria")) {
            task.accept_criteria = criteria.as_str().map(str::to_string);
        }
        task.updated_at = Utc::now();

        self.store.upsert_task(task.clone())?;
        Ok(Response::ok(format!("updated task {id}"), serde_json::to_value(&task)?))
    }

    fn update_artifact(&mut self, id: String, fields: serde_json::Map<String, serde_json::Value>) -> Result<Response> {
        let existing = self
            .store
            .get_artifact_by_id(&id)
            .cloned()
            .ok_or_else(|| RwmError::not_found(format!("artifact {id} not found")))?;

        let has_text = fields.contains_key("text");
        let has_kind = fields.contains_key("kind");
        let has_meta = fields.contains_key("meta");
        if !has_text && !has_kind && !has_meta {
            return Err(RwmError::invalid_update(format!(
                "no mutable fields supplied for artifact {id}"
            )));
        }

        let ts = Utc::now();
        let mut artifact: Artifact = existing;

        if let Some(kind) = fields.get("kind") {
            artifact.kind = serde_json::from_value::<ArtifactKind>(kind.clone())
                .map_err(|e| RwmError::validation(format!("invalid artifact kind: {e}")))?;
        }
        if let Some(meta) = fields.get("meta") {
            artifact.meta_json = meta.clone();
        }
        if let Some(text) = fields.get("text").and_then(|v| v.as_str()) {
            let descriptor = ArtifactDescriptor {
                id: Some(artifact.id.clone()),
                kind: artifact.kind,
                text: Some(text.to_string()),
                meta: Some(artifact.meta_json.clone()),
                ..Default::default()
            };
            let (_, record) = self.artifacts.prepare_artifact(&descriptor, ts)?;
            artifact.uri = record.uri;
            artifact.sha256 = record.sha256;
            artifact.size = record.size;
            artifact.meta_json = record.meta_json;
        }

        self.store.upsert_artifact(artifact.clone())?;
        self.artifacts.prune_orphans(&self.store);
        Ok(Response::ok(format!("updated artifact {id}"), serde_json::to_value(&artifact)?))
    }

    fn update_fact(&mut self, id: String, fields: serde_json::Map<String, serde_json::Value>) -> Result<Response> {
        let existing = self
            .store
            .get_fact_by_id(&id)
            .cloned()
            .ok_or_else(|| RwmError::not_found(format!("fact {id} not found")))?;

        let has_value = fields.contains_key("value");
        let has_scope = fields.contains_key("scope");
        if !has_value && !has_scope {
            return Err(RwmError::invalid_update(format!("no mutable fields supplied for fact {id}")));
        }

        let mut fact = existing;
        if let Some(value) = fields.get("value").and_then(|v| v.as_str()) {
            fact.value = value.to_string();
        }
        if let Some(scope) = fields.get("scope").and_then(|v| v.as_str()) {
            fact.scope = scope.parse::<FactScope>().map_err(RwmError::validation)?;
        }

        self.store.upsert_fact(fact.clone())?;
        Ok(Response::ok(format!("updated fact {id}"), serde_json::to_value(&fact)?))
    }

    // -- memory_fetch -----------------------------------------------------

    fn fetch(&self, id: String) -> Result<Response> {
        if let Some(task) = self.store.get_task_by_id(&id) {
            return Ok(Response::ok(
                format!("task {id}"),
                serde_json::json!({"type": "task", "record": task}),
            ));
        }
        if let Some(event) = self.store.get_event_by_id(&id) {
            return Ok(Response::ok(
                format!("event {id}"),
                serde_json::json!({"type": "event", "record": event}),
            ));
        }
        if let Some(artifact) = self.store.get_artifact_by_id(&id) {
            let resource_link = format!("artifact://sha256/{}", artifact.sha256);
            return Ok(Response::ok(
                format!("artifact {id}"),
                serde_json::json!({"type": "artifact", "record": artifact, "resourceLink": resource_link}),
            ));
        }
        if let Some(fact) = self.store.get_fact_by_id(&id) {
            return Ok(Response::ok(
                format!("fact {id}"),
                serde_json::json!({"type": "fact", "record": fact}),
            ));
        }
        if let Some(checkpoint) = self.store.get_checkpoint_by_id(&id) {
            return Ok(Response::ok(
                format!("checkpoint {id}"),
                serde_json::json!({"type": "checkpoint", "record": checkpoint}),
            ));
        }
        Err(RwmError::not_found(format!("no record with id {id}")))
    }

    // -- memory_span -----------------------------------------------------

    fn span(&self, path: String, start_line: Option<usize>, end_line: Option<usize>) -> Result<Response> {
        if matches!(start_line, Some(0)) || matches!(end_line, Some(0)) {
            return Err(RwmError::validation("startLine/endLine must be positive"));
        }

        let text = if path.starts_with("artifact://") || path.starts_with("workspace://") {
            match resource::resolve(&self.artifacts, &path)? {
                ResourceBody::Text(t) => clamp_lines(&t, start_line, end_line),
                ResourceBody::Base64(b) => b,
            }
        } else {
            let bytes = self.artifacts.read_line_span(&path, start_line, end_line)?;
            String::from_utf8_lossy(&bytes).into_owned()
        };

        Ok(Response::ok(text.clone(), serde_json::json!({"path": path, "text": text})))
    }

    // -- memory_search -----------------------------------------------------

    fn search(&mut self, session_id: String, query: String, limit: Option<usize>) -> Result<Response> {
        let limit = limit.unwrap_or(MAX_SEARCH_LIMIT).min(MAX_SEARCH_LIMIT);
        let session = self.session(&session_id);
        let results = self.store.search(&session, &query, limit);

        let events: Vec<_> = results.events.iter().map(|e| serde_json::to_value(e).unwrap()).collect();
        let tasks: Vec<_> = results.tasks.iter().map(|t| serde_json::to_value(t).unwrap()).collect();
        let facts: Vec<_> = results.facts.iter().map(|f| serde_json::to_value(f).unwrap()).collect();

        Ok(Response::ok(
            format!("{} event(s), {} task(s), {} fact(s) matched", events.len(), tasks.len(), facts.len()),
            serde_json::json!({"events": events, "tasks": tasks, "facts": facts}),
        ))
    }

    // -- memory_checkpoint -----------------------------------------------------

    fn checkpoint(&mut self, session_id: String, label: String) -> Result<Response> {
        let session = self.session(&session_id);
        let meta = build_checkpoint_meta(&self.store, &session);
        let id = rid("CP");
        self.store.insert_checkpoint(Checkpoint {
            id: id.clone(),
            session_id: session.clone(),
            label: label.clone(),
            ts: Utc::now(),
            bundle_meta: meta,
        })?;
        Ok(Response::ok(
            format!("checkpoint {id} saved for {session}"),
            serde_json::json!({"id": id, "session_id": session, "label": label}),
        ))
    }
}

fn clamp_lines(text: &str, start_line: Option<usize>, end_line: Option<usize>) -> String {
    if start_line.is_none() && end_line.is_none() {
        return text.to_string();
    }
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = start_line.unwrap_or(1).max(1);
    let end = end_line.unwrap_or(lines.len()).min(lines.len());
    if start > end {
        return String::new();
    }
    lines[(start - 1).min(lines.len() - 1)..end].join("\n")
}

fn item_kind_str(kind: rwm_engine::ItemKind) -> &'static str {
    match kind {
        rwm_engine::ItemKind::Task => "TASK",
        rwm_engine::ItemKind::Event => "EVENT",
        rwm_engine::ItemKind::Fact => "FACT",
    }
}
