//! Foundational helpers for the Resumable Working Memory engine: hashing and
//! ID generation, path confinement, token estimation, and session identity
//! resolution.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Path confinement to a workspace root.
pub mod guard;
/// SHA-256 hashing and ID generation.
pub mod hash;
/// Deterministic session ID resolution.
pub mod session;
/// Token estimation capability.
pub mod tokens;

pub use guard::safe_join;
pub use hash::{fact_id, pointer_id, rid, sha256_bytes, sha256_str, slug, task_id};
pub use session::{canonicalize_alias, normalize_session_id, sanitize, BranchCache};
pub use tokens::{heuristic_estimate, HeuristicEstimator, ModelFamily, TokenEstimator};
