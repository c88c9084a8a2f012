//! The structured store: typed schema and query surface backing tasks,
//! events, artifacts, facts, checkpoints, token metrics, and edges.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Schema types.
pub mod schema;
/// The store itself and its query methods.
pub mod store;

pub use schema::{
    Artifact, ArtifactKind, ArtifactOrigin, Checkpoint, Edge, EdgeKind, Event, EventKind, Fact,
    FactScope, Task, TaskStatus, TokenMetric,
};
pub use store::{SearchResults, Store};
