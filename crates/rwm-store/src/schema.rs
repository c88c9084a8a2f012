//! Relational schema for the structured store.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status a [`Task`] can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet started.
    Todo,
    /// Actively being worked.
    Doing,
    /// Stalled on an external dependency.
    Blocked,
    /// Finished.
    Done,
    /// Awaiting review.
    Review,
}

/// `{id, session_id, parent_id?, title, status, accept_criteria?, created_at, updated_at}`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    /// `"T-" + slug(title)[:12]`.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Optional parent task ID.
    pub parent_id: Option<String>,
    /// Human title.
    pub title: String,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Optional acceptance criteria text.
    pub accept_criteria: Option<String>,
    /// Creation timestamp; never changed after first upsert.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent upsert.
    pub updated_at: DateTime<Utc>,
}

/// The kind of a logged [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A deliberate choice was made.
    Decision,
    /// A belief was assumed without verification.
    Assumption,
    /// A bug was fixed.
    Fix,
    /// Work is stalled.
    Blocker,
    /// A general observation.
    Note,
    /// A test failed.
    TestFail,
    /// A test passed.
    TestPass,
}

/// `{id, kind, task_id?, session_id, summary, evidence_ids, ts}`. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Event {
    /// Caller-supplied or randomly generated ID.
    pub id: String,
    /// Event category.
    pub kind: EventKind,
    /// The task this event is linked to, if any.
    pub task_id: Option<String>,
    /// Owning session.
    pub session_id: String,
    /// Human-readable summary.
    pub summary: String,
    /// Artifact or event IDs backing this event.
    pub evidence_ids: Vec<String>,
    /// When the event occurred.
    pub ts: DateTime<Utc>,
}

/// The kind of an [`Artifact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactKind {
    /// A code diff.
    Diff,
    /// A code snippet or file span.
    Snippet,
    /// A configuration file or value.
    Config,
    /// A test fixture.
    Fixture,
    /// A test trace/log.
    TestTrace,
    /// A generic log excerpt.
    Log,
    /// Anything else.
    #[default]
    Other,
}

/// `{type, recordedAt}` stamp describing how an artifact's body was derived.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactOrigin {
    /// One of `text`, `workspace`, `workspace-uri`, `uri`, `empty`.
    #[serde(rename = "type")]
    pub origin_type: String,
    /// When the artifact was recorded.
    #[serde(rename = "recordedAt")]
    pub recorded_at: DateTime<Utc>,
}

/// `{id, kind, uri, sha256, size, meta_json, created_at}`.
///
/// Bodied artifacts have `uri = "artifact://sha256/<hex>"` and a pool file
/// named `<hex>`; pointer artifacts have an external `uri`, `size = 0`, and
/// no pool file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Artifact {
    /// Defaults to `"P-" + sha256[:8]` but may be client-supplied.
    pub id: String,
    /// Artifact category.
    pub kind: ArtifactKind,
    /// `artifact://sha256/<hex>` for bodied artifacts, else an external URI.
    pub uri: String,
    /// Hex SHA-256 of the body (bodied) or of the URI string (pointer).
    pub sha256: String,
    /// Byte length of the body; `0` for pointer artifacts.
    pub size: u64,
    /// Caller metadata plus the `origin` stamp.
    pub meta_json: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Scope a [`Fact`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum FactScope {
    /// Scoped to the current repo (default).
    #[default]
    Repo,
    /// Scoped to a service.
    Service,
    /// Scoped to a team.
    Team,
    /// Scoped globally.
    Global,
}

impl FactScope {
    /// Wire representation matching the `fact_id` scope string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Repo => "repo",
            Self::Service => "service",
            Self::Team => "team",
            Self::Global => "global",
        }
    }
}

impl std::str::FromStr for FactScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repo" => Ok(Self::Repo),
            "service" => Ok(Self::Service),
            "team" => Ok(Self::Team),
            "global" => Ok(Self::Global),
            other => Err(format!("unrecognized fact scope: {other}")),
        }
    }
}

/// `{id, key, value, scope}`. Project-wide — no session column.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Fact {
    /// `"F-" + sha256("key::scope")[:16]`.
    pub id: String,
    /// The fact's key.
    pub key: String,
    /// The fact's value.
    pub value: String,
    /// Visibility scope.
    pub scope: FactScope,
}

/// `{id, session_id, label, ts, bundle_meta}`. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Checkpoint {
    /// Randomly generated ID.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Caller-supplied label.
    pub label: String,
    /// Creation timestamp.
    pub ts: DateTime<Utc>,
    /// JSON snapshot produced by the checkpoint meta builder.
    pub bundle_meta: serde_json::Value,
}

/// Optional diagnostics: `{id, session_id, pointer_id, token_cost, budget, created_at}`.
/// Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TokenMetric {
    /// Randomly generated ID.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// The bundle item this metric describes.
    pub pointer_id: String,
    /// Estimated token cost of the item.
    pub token_cost: u32,
    /// The budget the bundle was composed under.
    pub budget: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// The kind of relation an [`Edge`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// `src` depends on `dst`.
    DependsOn,
    /// `src` relates to `dst`.
    RelatesTo,
    /// `src` touches `dst`.
    Touches,
}

/// `{src_id, dst_id, kind}`. Reserved for future relation tracking; present
/// in schema, unused by the core write paths.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Edge {
    /// Source entity ID.
    pub src_id: String,
    /// Destination entity ID.
    pub dst_id: String,
    /// Relation kind.
    pub kind: EdgeKind,
}
