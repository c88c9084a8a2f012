//! Content-addressed artifact body pool: bodied artifacts dedup by hash,
//! pointer artifacts carry only a URI, and orphaned pool files are pruned.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rwm_core::{pointer_id, safe_join, sha256_bytes, sha256_str};
use rwm_error::{Result, RwmError};
use rwm_store::{Artifact, ArtifactKind, ArtifactOrigin, Store};
use tracing::debug;

/// Caller-supplied description of an artifact to prepare. Exactly one of
/// `text`, `path`, or `uri` determines the resolution branch; if none are
/// set the artifact falls back to an empty body.
#[derive(Debug, Clone, Default)]
pub struct ArtifactDescriptor {
    /// Caller-supplied ID; defaults to `"P-" + sha256[:8]` if absent.
    pub id: Option<String>,
    /// Artifact category.
    pub kind: ArtifactKind,
    /// External URI (pointer branch).
    pub uri: Option<String>,
    /// Inline text body (text branch).
    pub text: Option<String>,
    /// Workspace-relative path to read (path branch).
    pub path: Option<String>,
    /// 1-indexed inclusive start line; defaults to the first line.
    pub start_line: Option<usize>,
    /// 1-indexed inclusive end line; defaults to the last line.
    pub end_line: Option<usize>,
    /// Caller metadata merged into `meta_json`.
    pub meta: Option<serde_json::Value>,
}

/// Content-addressed file pool plus pointer-artifact bookkeeping.
pub struct ArtifactStore {
    workspace_root: PathBuf,
    pool_dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `workspace_root` with bodies under `pool_dir`.
    pub fn new(workspace_root: impl Into<PathBuf>, pool_dir: impl Into<PathBuf>) -> Result<Self> {
        let pool_dir = pool_dir.into();
        fs::create_dir_all(&pool_dir)?;
        Ok(Self {
            workspace_root: workspace_root.into(),
            pool_dir,
        })
    }

    /// Resolves `descriptor` into a body (or pointer), writes the pool file
    /// if needed, and returns the artifact's ID alongside its row.
    pub fn prepare_artifact(
        &self,
        descriptor: &ArtifactDescriptor,
        ts: DateTime<Utc>,
    ) -> Result<(String, Artifact)> {
        let mut meta = descriptor.meta.clone().unwrap_or_else(|| serde_json::json!({}));

        let (uri, sha256, size, had_body) = if let Some(text) = &descriptor.text {
            let bytes = text.as_bytes();
            let hash = sha256_bytes(bytes);
            self.write_body_if_absent(&hash, bytes)?;
            stamp_origin(&mut meta, "text", ts);
            (format!("artifact://sha256/{hash}"), hash, bytes.len() as u64, true)
        } else if let Some(path) = &descriptor.path {
            let bytes = self.read_span(path, descriptor.start_line, descriptor.end_line)?;
            let hash = sha256_bytes(&bytes);
            self.write_body_if_absent(&hash, &bytes)?;
            if let serde_json::Value::Object(map) = &mut meta {
                map.entry("path").or_insert_with(|| serde_json::json!(path));
                if let Some(start) = descriptor.start_line {
                    map.entry("startLine").or_insert_with(|| serde_json::json!(start));
                }
                if let Some(end) = descriptor.end_line {
                    map.entry("endLine").or_insert_with(|| serde_json::json!(end));
                }
            }
            stamp_origin(&mut meta, "workspace", ts);
            (format!("artifact://sha256/{hash}"), hash, bytes.len() as u64, true)
        } else if let Some(uri) = &descriptor.uri {
            let hash = sha256_str(uri);
            let origin_type = if uri.starts_with("workspace://") {
                "workspace-uri"
            } else {
                "uri"
            };
            if let serde_json::Value::Object(map) = &mut meta {
                map.entry("pointer").or_insert_with(|| serde_json::json!(true));
            }
            stamp_origin(&mut meta, origin_type, ts);
            (uri.clone(), hash, 0, false)
        } else {
            stamp_origin(&mut meta, "empty", ts);
            let hash = sha256_bytes(&[]);
            self.write_body_if_absent(&hash, &[])?;
            (format!("artifact://sha256/{hash}"), hash, 0, true)
        };

        let id = descriptor.id.clone().unwrap_or_else(|| pointer_id(&sha256));

        let record = Artifact {
            id: id.clone(),
            kind: descriptor.kind,
            uri,
            sha256,
            size,
            meta_json: meta,
            created_at: ts,
        };
        debug!(target: "rwm.artifacts", id = %id, bodied = had_body, "prepared artifact");
        Ok((id, record))
    }

    /// Reads lines `[start_line..end_line]` (1-indexed inclusive, defaulting
    /// to the full file) from a workspace-relative path through the path
    /// guard. Used directly by `memory_span`, and internally by the `path`
    /// branch of [`Self::prepare_artifact`].
    pub fn read_line_span(
        &self,
        rel_path: &str,
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> Result<Vec<u8>> {
        self.read_span(rel_path, start_line, end_line)
    }

    fn read_span(
        &self,
        rel_path: &str,
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> Result<Vec<u8>> {
        let abs = safe_join(&self.workspace_root, Path::new(rel_path))?;
        let content = fs::read_to_string(&abs)
            .map_err(|e| RwmError::io(format!("read {}: {e}", abs.display())))?;
        let lines: Vec<&str> = content.lines().collect();

        let start = start_line.unwrap_or(1).max(1);
        let end = end_line.unwrap_or(lines.len()).min(lines.len().max(1));
        if start > end || lines.is_empty() {
            return Ok(Vec::new());
        }

        let slice = &lines[(start - 1).min(lines.len() - 1)..end.min(lines.len())];
        Ok(slice.join("\n").into_bytes())
    }

    fn write_body_if_absent(&self, hash: &str, bytes: &[u8]) -> Result<()> {
        let path = self.pool_dir.join(hash);
        if !path.exists() {
            fs::write(&path, bytes)?;
        }
        Ok(())
    }

    /// Reads a bodied artifact's raw bytes from the pool by hash.
    pub fn read_body(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.pool_dir.join(hash);
        fs::read(&path).map_err(|e| RwmError::not_found(format!("artifact body {hash}: {e}")))
    }

    /// Reads a `workspace://`-relative file through the path guard.
    pub fn read_workspace_file(&self, rel_path: &str) -> Result<Vec<u8>> {
        let abs = safe_join(&self.workspace_root, Path::new(rel_path))?;
        fs::read(&abs).map_err(|e| RwmError::io(format!("read {}: {e}", abs.display())))
    }

    /// Lists pool filenames not referenced by any artifact row in `store`
    /// and unlinks them. Individual delete failures are swallowed
    /// (best-effort).
    pub fn prune_orphans(&self, store: &Store) -> usize {
        let referenced: HashSet<String> = store.list_artifact_hashes().into_iter().collect();

        let entries = match fs::read_dir(&self.pool_dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut pruned = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(n) => n.to_string(),
                None => continue,
            };
            if referenced.contains(&name) {
                continue;
            }
            if fs::remove_file(entry.path()).is_ok() {
                pruned += 1;
                debug!(target: "rwm.artifacts", hash = %name, "pruned orphan artifact body");
            }
        }
        pruned
    }
}

fn stamp_origin(meta: &mut serde_json::Value, origin_type: &str, ts: DateTime<Utc>) {
    if let serde_json::Value::Object(map) = meta {
        if map.contains_key("origin") {
            return;
        }
        let origin = ArtifactOrigin {
            origin_type: origin_type.to_string(),
            recorded_at: ts,
        };
        map.insert("origin".to_string(), serde_json::to_value(origin).unwrap());
    }
}
