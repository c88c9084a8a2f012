//! Deterministic session ID resolution, keyed to project + branch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use chrono::Utc;
use tracing::debug;

/// Per-process memoization of git branch lookups, keyed by canonicalized
/// workspace root. Cleared only by [`BranchCache::reset`] (used by tests).
#[derive(Default)]
pub struct BranchCache {
    entries: Mutex<HashMap<PathBuf, Option<String>>>,
}

impl BranchCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached or freshly-looked-up branch marker for `root`.
    fn lookup(&self, root: &Path) -> Option<String> {
        let key = root.to_path_buf();
        let mut guard = self.entries.lock().expect("branch cache lock poisoned");
        if let Some(cached) = guard.get(&key) {
            return cached.clone();
        }
        let found = current_branch_marker(root);
        guard.insert(key, found.clone());
        found
    }

    /// Drops all cached entries.
    pub fn reset(&self) {
        self.entries
            .lock()
            .expect("branch cache lock poisoned")
            .clear();
    }
}

/// Replaces runs of `[^A-Za-z0-9._-]` with `-`, returning `"proj"` when the
/// result would be empty.
#[must_use]
pub fn sanitize(s: &str) -> String {
    let mut out = String::new();
    let mut last_was_dash = false;
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' || ch == '-' {
            out.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = out.trim_matches('-').to_string();
    if trimmed.is_empty() {
        "proj".to_string()
    } else {
        trimmed
    }
}

/// Resolves a raw session string plus a workspace root into a canonical
/// `"<base>@<suffix>"` session ID, consulting `cache` for git branch lookups.
#[must_use]
pub fn normalize_session_id(raw: &str, root: &Path, cache: &BranchCache) -> String {
    let (raw_base, raw_suffix) = split_once_at(raw);

    let base = {
        let candidate = if !raw_base.is_empty() {
            raw_base.to_string()
        } else {
            root.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("workspace")
                .to_string()
        };
        sanitize(&candidate)
    };

    let mut suffix = if raw_suffix.is_empty() {
        String::new()
    } else {
        sanitize(raw_suffix)
    };
    if suffix.is_empty() || suffix == "unknown" {
        suffix = cache.lookup(root).map(|b| sanitize(&b)).unwrap_or_default();
    }
    if suffix.is_empty() {
        suffix = Utc::now().format("%Y%m%d").to_string();
    }

    let session = format!("{base}@{suffix}");
    debug!(target: "rwm.session", session = %session, "resolved session id");
    session
}

/// Resolves a session alias without a git lookup, defaulting the suffix to
/// `"main"`. Used by the store's alias-folding (`canonicalize_sessions`).
#[must_use]
pub fn canonicalize_alias(raw: &str, root: &Path) -> String {
    let (raw_base, raw_suffix) = split_once_at(raw);

    let base = if !raw_base.is_empty() {
        sanitize(raw_base)
    } else {
        sanitize(
            root.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("workspace"),
        )
    };

    let mut suffix = if raw_suffix.is_empty() {
        String::new()
    } else {
        sanitize(raw_suffix)
    };
    if suffix.is_empty() || suffix == "unknown" {
        suffix = "main".to_string();
    }

    format!("{base}@{suffix}")
}

fn split_once_at(raw: &str) -> (&str, &str) {
    match raw.split_once('@') {
        Some((base, suffix)) => (base, suffix),
        None => (raw, ""),
    }
}

/// Returns `Some("<branch>")` on an attached HEAD, `Some("detached-<hash>")`
/// on a detached HEAD, or `None` if `root` is not a git repository.
fn current_branch_marker(root: &Path) -> Option<String> {
    let branch = run_git(root, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    let branch = branch.trim();

    if branch != "HEAD" {
        return Some(branch.to_string());
    }

    let short = run_git(root, &["rev-parse", "--short", "HEAD"])?;
    Some(format!("detached-{}", short.trim()))
}

fn run_git(root: &Path, args: &[&str]) -> Option<String> {
    let out = Command::new("git").args(args).current_dir(root).output().ok()?;
    if !out.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&out.stdout).to_string())
}
