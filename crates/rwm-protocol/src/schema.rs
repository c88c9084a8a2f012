//! Wire types for the six `memory_*` tool operations.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An artifact descriptor as it crosses the wire. One of `text`, `path`, or
/// `uri` should be set; see the artifact store's resolution order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactPayload {
    /// Caller-supplied ID.
    pub id: Option<String>,
    /// Artifact category; defaults to `"OTHER"`.
    #[serde(default)]
    pub kind: rwm_store::ArtifactKind,
    /// External URI (pointer branch).
    pub uri: Option<String>,
    /// Inline text body (text branch).
    pub text: Option<String>,
    /// Workspace-relative path to read (path branch).
    pub path: Option<String>,
    #[serde(rename = "startLine")]
    /// 1-indexed inclusive start line.
    pub start_line: Option<usize>,
    #[serde(rename = "endLine")]
    /// 1-indexed inclusive end line.
    pub end_line: Option<usize>,
    /// Caller metadata merged into the stored `meta_json`.
    pub meta: Option<serde_json::Value>,
}

/// A decision to log, as it crosses the wire.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DecisionPayload {
    /// Caller-supplied event ID.
    pub id: Option<String>,
    /// Event category.
    #[serde(rename = "type")]
    pub kind: rwm_store::EventKind,
    #[serde(rename = "taskId")]
    /// Explicit task link.
    pub task_id: Option<String>,
    /// Human-readable summary.
    pub summary: String,
    /// Explicit evidence IDs; omitted means "all artifacts from this commit".
    pub evidence: Option<Vec<String>>,
}

/// A fact to upsert, as it crosses the wire.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FactPayload {
    /// The fact's key.
    pub key: String,
    /// The fact's value.
    pub value: String,
    /// Visibility scope; defaults to `repo`.
    pub scope: Option<String>,
}

/// The record kind targeted by `memory_update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UpdateTarget {
    /// Update a task by ID.
    Task,
    /// Update an artifact by ID (text changes rehash the body).
    Artifact,
    /// Update a fact by ID.
    Fact,
}

/// The six `memory_*` operations, tagged by `op` in `snake_case`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Compose a budgeted context bundle for a session.
    MemoryResume {
        /// Raw session identifier, normalized before use.
        session_id: String,
        #[serde(rename = "tokenBudget")]
        /// Token budget, `1..=1_000_000`; defaults to the engine's configured budget.
        token_budget: Option<u32>,
    },
    /// Apply one state frame: task upsert, decisions, artifacts, facts.
    MemoryCommit {
        /// Raw session identifier, normalized before use.
        session_id: String,
        /// Task title; upserts (or touches) a task when present.
        task: Option<String>,
        /// Decisions to log.
        #[serde(default)]
        decisions: Vec<DecisionPayload>,
        /// Artifacts to prepare and store.
        #[serde(default)]
        artifacts: Vec<ArtifactPayload>,
        /// Facts to upsert.
        #[serde(default)]
        facts: Vec<FactPayload>,
    },
    /// Mutate a single record by ID with partial fields.
    MemoryUpdate {
        /// Which table the `id` refers to.
        target: UpdateTarget,
        /// The record ID to update.
        id: String,
        /// Partial fields to apply.
        fields: serde_json::Value,
    },
    /// Fetch a single record by ID.
    MemoryFetch {
        /// The record ID to fetch.
        id: String,
    },
    /// Read a line span from a workspace file, or resolve an
    /// `artifact://`/`workspace://` resource URI.
    MemorySpan {
        /// Workspace-relative path, or a `artifact://`/`workspace://` URI.
        path: String,
        #[serde(rename = "startLine")]
        /// 1-indexed inclusive start line.
        start_line: Option<usize>,
        #[serde(rename = "endLine")]
        /// 1-indexed inclusive end line.
        end_line: Option<usize>,
    },
    /// Substring search over events/tasks (scoped) and facts (unscoped).
    MemorySearch {
        /// Raw session identifier, normalized before use.
        session_id: String,
        /// The search query.
        query: String,
        /// Result cap per category; clamped to `200`.
        limit: Option<usize>,
    },
    /// Record a checkpoint snapshot of the session's working state.
    MemoryCheckpoint {
        /// Raw session identifier, normalized before use.
        session_id: String,
        /// Caller-supplied label.
        label: String,
    },
}

/// The uniform `{text, structured, error}` response shape.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Response {
    /// Human-readable rendering of the result.
    pub text: String,
    /// Machine-readable result payload.
    pub structured: serde_json::Value,
    /// Set when the operation failed; `structured` then carries `{kind, message}`.
    #[serde(default)]
    pub error: bool,
}

impl Response {
    /// Builds a success response.
    #[must_use]
    pub fn ok(text: impl Into<String>, structured: serde_json::Value) -> Self {
        Self {
            text: text.into(),
            structured,
            error: false,
        }
    }

    /// Builds an error response from an [`rwm_error::RwmError`].
    #[must_use]
    pub fn from_error(err: &rwm_error::RwmError) -> Self {
        Self {
            text: err.to_string(),
            structured: serde_json::json!({
                "kind": err.kind.as_str(),
                "message": err.message,
            }),
            error: true,
        }
    }
}
