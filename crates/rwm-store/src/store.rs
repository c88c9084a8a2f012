//! The structured store: durable image plus its query surface.

use std::fs;
use std::path::{Path, PathBuf};

use rwm_error::{ErrorKind, Result, RwmError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::schema::{Artifact, Checkpoint, Edge, Event, Fact, Task, TaskStatus, TokenMetric};

/// The full durable image of a project's structured store: everything that
/// gets serialized to `rwm.db` on every mutating operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreImage {
    tasks: Vec<Task>,
    events: Vec<Event>,
    artifacts: Vec<Artifact>,
    facts: Vec<Fact>,
    checkpoints: Vec<Checkpoint>,
    token_metrics: Vec<TokenMetric>,
    #[serde(default)]
    edges: Vec<Edge>,
}

/// Embedded, single-process structured store with durable JSON persistence.
///
/// Every mutating method flushes the full image atomically (write to a
/// sibling temp file, then rename) before returning, so a crash never leaves
/// a torn `rwm.db` on disk.
pub struct Store {
    path: PathBuf,
    image: StoreImage,
}

impl Store {
    /// Opens (or creates) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let image = if path.exists() {
            let raw = fs::read(&path)?;
            serde_json::from_slice(&raw)?
        } else {
            StoreImage::default()
        };
        Ok(Self { path, image })
    }

    fn flush(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.image)?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let tmp = dir.join(format!(
            ".{}.tmp-{}",
            self.path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("rwm.db"),
            std::process::id()
        ));
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        debug!(target: "rwm.store", path = %self.path.display(), bytes = bytes.len(), "flushed store image");
        Ok(())
    }

    // -- tasks ---------------------------------------------------------

    /// Primary-key upsert; updates all columns except `created_at`.
    pub fn upsert_task(&mut self, task: Task) -> Result<()> {
        if let Some(existing) = self.image.tasks.iter_mut().find(|t| t.id == task.id) {
            let created_at = existing.created_at;
            *existing = task;
            existing.created_at = created_at;
        } else {
            self.image.tasks.push(task);
        }
        self.flush()
    }

    /// Returns the task with the given ID, if any.
    #[must_use]
    pub fn get_task_by_id(&self, id: &str) -> Option<&Task> {
        self.image.tasks.iter().find(|t| t.id == id)
    }

    /// Tasks for `session` with `status ∈ {doing, blocked}`, ordered by
    /// `updated_at` descending, limited to `n`.
    #[must_use]
    pub fn list_active_tasks(&self, session: &str, n: usize) -> Vec<&Task> {
        let mut active: Vec<&Task> = self
            .image
            .tasks
            .iter()
            .filter(|t| {
                t.session_id == session
                    && matches!(t.status, TaskStatus::Doing | TaskStatus::Blocked)
            })
            .collect();
        active.sort_by_key(|t| std::cmp::Reverse(t.updated_at));
        active.truncate(n);
        active
    }

    // -- events ----------------------------------------------------------

    /// Appends `event`; fails on duplicate primary key.
    pub fn insert_event(&mut self, event: Event) -> Result<()> {
        if self.image.events.iter().any(|e| e.id == event.id) {
            return Err(RwmError::new(
                ErrorKind::Validation,
                format!("duplicate event id {}", event.id),
            ));
        }
        self.image.events.push(event);
        self.flush()
    }

    /// Returns the event with the given ID, if any.
    #[must_use]
    pub fn get_event_by_id(&self, id: &str) -> Option<&Event> {
        self.image.events.iter().find(|e| e.id == id)
    }

    /// Events for `session` ordered by `ts` descending, limited to `n`.
    #[must_use]
    pub fn list_recent_events(&self, session: &str, n: usize) -> Vec<&Event> {
        let mut events: Vec<&Event> = self
            .image
            .events
            .iter()
            .filter(|e| e.session_id == session)
            .collect();
        events.sort_by_key(|e| std::cmp::Reverse(e.ts));
        events.truncate(n);
        events
    }

    // -- artifacts ---------------------------------------------------------

    /// Overwrites all mutable columns for `artifact`.
    pub fn upsert_artifact(&mut self, artifact: Artifact) -> Result<()> {
        if let Some(existing) = self.image.artifacts.iter_mut().find(|a| a.id == artifact.id) {
            *existing = artifact;
        } else {
            self.image.artifacts.push(artifact);
        }
        self.flush()
    }

    /// Returns the artifact with the given ID, if any.
    #[must_use]
    pub fn get_artifact_by_id(&self, id: &str) -> Option<&Artifact> {
        self.image.artifacts.iter().find(|a| a.id == id)
    }

    /// Distinct `sha256` values across all artifacts, for orphan pruning.
    #[must_use]
    pub fn list_artifact_hashes(&self) -> Vec<String> {
        let mut hashes: Vec<String> = self
            .image
            .artifacts
            .iter()
            .map(|a| a.sha256.clone())
            .collect();
        hashes.sort();
        hashes.dedup();
        hashes
    }

    // -- facts ---------------------------------------------------------

    /// Overwrites `value, scope` by deterministic `id`.
    pub fn upsert_fact(&mut self, fact: Fact) -> Result<()> {
        if let Some(existing) = self.image.facts.iter_mut().find(|f| f.id == fact.id) {
            existing.value = fact.value;
            existing.scope = fact.scope;
            existing.key = fact.key;
        } else {
            self.image.facts.push(fact);
        }
        self.flush()
    }

    /// Returns the fact with the given ID, if any.
    #[must_use]
    pub fn get_fact_by_id(&self, id: &str) -> Option<&Fact> {
        self.image.facts.iter().find(|f| f.id == id)
    }

    /// All facts (no session filter — facts are project-wide).
    #[must_use]
    pub fn list_facts(&self) -> Vec<&Fact> {
        self.image.facts.iter().collect()
    }

    // -- checkpoints ---------------------------------------------------------

    /// Appends `checkpoint`.
    pub fn insert_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<()> {
        self.image.checkpoints.push(checkpoint);
        self.flush()
    }

    /// Returns the checkpoint with the given ID, if any.
    #[must_use]
    pub fn get_checkpoint_by_id(&self, id: &str) -> Option<&Checkpoint> {
        self.image.checkpoints.iter().find(|c| c.id == id)
    }

    // -- token metrics ---------------------------------------------------------

    /// Appends a diagnostic token metric row.
    pub fn insert_token_metric(&mut self, metric: TokenMetric) -> Result<()> {
        self.image.token_metrics.push(metric);
        self.flush()
    }

    // -- edges ---------------------------------------------------------

    /// Appends an edge (reserved for future relation tracking).
    pub fn insert_edge(&mut self, edge: Edge) -> Result<()> {
        self.image.edges.push(edge);
        self.flush()
    }

    // -- search ---------------------------------------------------------

    /// Substring search over events/tasks (scoped to `session`) and facts
    /// (unscoped), limited to `n` results per category.
    #[must_use]
    pub fn search(&self, session: &str, q: &str, n: usize) -> SearchResults<'_> {
        let needle = q.to_lowercase();

        let mut events: Vec<&Event> = self
            .image
            .events
            .iter()
            .filter(|e| {
                e.session_id == session
                    && (e.summary.to_lowercase().contains(&needle) || e.id.to_lowercase().contains(&needle))
            })
            .collect();
        events.truncate(n);

        let mut tasks: Vec<&Task> = self
            .image
            .tasks
            .iter()
            .filter(|t| {
                t.session_id == session
                    && (t.title.to_lowercase().contains(&needle) || t.id.to_lowercase().contains(&needle))
            })
            .collect();
        tasks.truncate(n);

        let mut facts: Vec<&Fact> = self
            .image
            .facts
            .iter()
            .filter(|f| {
                f.key.to_lowercase().contains(&needle) || f.value.to_lowercase().contains(&needle)
            })
            .collect();
        facts.truncate(n);

        SearchResults { events, tasks, facts }
    }

    // -- session canonicalization ---------------------------------------------------------

    /// Rewrites `session_id = canonical` for rows whose `session_id` starts
    /// with `"<base>@"` and is not already `canonical`, across
    /// events/tasks/checkpoints.
    pub fn canonicalize_sessions(&mut self, base: &str, canonical: &str) -> Result<()> {
        let prefix = format!("{base}@");

        let mut changed = false;
        for task in &mut self.image.tasks {
            if task.session_id.starts_with(&prefix) && task.session_id != canonical {
                task.session_id = canonical.to_string();
                changed = true;
            }
        }
        for event in &mut self.image.events {
            if event.session_id.starts_with(&prefix) && event.session_id != canonical {
                event.session_id = canonical.to_string();
                changed = true;
            }
        }
        for checkpoint in &mut self.image.checkpoints {
            if checkpoint.session_id.starts_with(&prefix) && checkpoint.session_id != canonical {
                checkpoint.session_id = canonical.to_string();
                changed = true;
            }
        }

        if changed {
            self.flush()
        } else {
            Ok(())
        }
    }
}

/// Result of [`Store::search`].
#[derive(Debug)]
pub struct SearchResults<'a> {
    /// Matching events.
    pub events: Vec<&'a Event>,
    /// Matching tasks.
    pub tasks: Vec<&'a Task>,
    /// Matching facts.
    pub facts: Vec<&'a Fact>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ArtifactKind, EventKind, FactScope};
    use chrono::Utc;

    fn sample_task(id: &str, session: &str, status: TaskStatus) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            session_id: session.to_string(),
            parent_id: None,
            title: "Sample task".to_string(),
            status,
            accept_criteria: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn upsert_task_preserves_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path().join("rwm.db")).unwrap();
        let mut t = sample_task("T-abc", "s@main", TaskStatus::Doing);
        let original_created = t.created_at;
        store.upsert_task(t.clone()).unwrap();

        t.updated_at = Utc::now();
        t.status = TaskStatus::Done;
        store.upsert_task(t).unwrap();

        let fetched = store.get_task_by_id("T-abc").unwrap();
        assert_eq!(fetched.created_at, original_created);
        assert_eq!(fetched.status, TaskStatus::Done);
    }

    #[test]
    fn duplicate_event_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path().join("rwm.db")).unwrap();
        let event = Event {
            id: "D-1".to_string(),
            kind: EventKind::Decision,
            task_id: None,
            session_id: "s@main".to_string(),
            summary: "chose approach".to_string(),
            evidence_ids: vec![],
            ts: Utc::now(),
        };
        store.insert_event(event.clone()).unwrap();
        let err = store.insert_event(event).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn fact_upsert_dedups_by_deterministic_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path().join("rwm.db")).unwrap();
        let id = rwm_core_fact_id("build", "repo");
        store
            .upsert_fact(Fact {
                id: id.clone(),
                key: "build".to_string(),
                value: "npm run build".to_string(),
                scope: FactScope::Repo,
            })
            .unwrap();
        store
            .upsert_fact(Fact {
                id: id.clone(),
                key: "build".to_string(),
                value: "make build".to_string(),
                scope: FactScope::Repo,
            })
            .unwrap();

        assert_eq!(store.list_facts().len(), 1);
        assert_eq!(store.get_fact_by_id(&id).unwrap().value, "make build");
    }

    fn rwm_core_fact_id(key: &str, scope: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(format!("{key}::{scope}").as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        format!("F-{}", &digest[..16])
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("rwm.db");
        {
            let mut store = Store::open(&db_path).unwrap();
            store
                .upsert_task(sample_task("T-abc", "s@main", TaskStatus::Doing))
                .unwrap();
        }
        let reopened = Store::open(&db_path).unwrap();
        assert!(reopened.get_task_by_id("T-abc").is_some());
    }

    #[test]
    fn list_artifact_hashes_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path().join("rwm.db")).unwrap();
        for id in ["P-aaa", "P-bbb"] {
            store
                .upsert_artifact(Artifact {
                    id: id.to_string(),
                    kind: ArtifactKind::Snippet,
                    uri: "artifact://sha256/deadbeef".to_string(),
                    sha256: "deadbeef".to_string(),
                    size: 4,
                    meta_json: serde_json::json!({}),
                    created_at: Utc::now(),
                })
                .unwrap();
        }
        assert_eq!(store.list_artifact_hashes(), vec!["deadbeef".to_string()]);
    }

    #[test]
    fn canonicalize_sessions_rewrites_matching_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path().join("rwm.db")).unwrap();
        store
            .upsert_task(sample_task("T-1", "proj@20260101", TaskStatus::Doing))
            .unwrap();
        store.canonicalize_sessions("proj", "proj@main").unwrap();
        assert_eq!(store.get_task_by_id("T-1").unwrap().session_id, "proj@main");
    }
}
