//! Confines relative paths to a workspace root.

use std::path::{Path, PathBuf};

use rwm_error::RwmError;

/// Joins `rel` onto `root` and fails with [`rwm_error::ErrorKind::PathEscape`]
/// if the resolved path is not contained within the resolved root.
///
/// Both sides are canonicalized so symlinks and `..` segments cannot be used
/// to step outside the workspace.
pub fn safe_join(root: &Path, rel: &Path) -> Result<PathBuf, RwmError> {
    let root_canon = root
        .canonicalize()
        .map_err(|e| RwmError::io(format!("canonicalize root {}: {e}", root.display())))?;

    let candidate = root_canon.join(rel);

    // The candidate file may not exist yet (e.g. a write target), so only
    // canonicalize the existing prefix and rebuild the tail manually.
    let resolved = canonicalize_existing_prefix(&candidate)?;

    if resolved == root_canon {
        return Ok(resolved);
    }

    if resolved.strip_prefix(&root_canon).is_ok() {
        return Ok(resolved);
    }

    Err(RwmError::path_escape(format!(
        "{} escapes workspace root {}",
        rel.display(),
        root.display()
    )))
}

/// Canonicalizes as much of `path` as exists, then rejoins the remaining
/// (possibly nonexistent) tail components without touching the filesystem.
fn canonicalize_existing_prefix(path: &Path) -> Result<PathBuf, RwmError> {
    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();

    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                tail.push(name.to_owned());
                existing = existing
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("/"));
            }
            None => break,
        }
    }

    let mut resolved = existing
        .canonicalize()
        .map_err(|e| RwmError::io(format!("canonicalize {}: {e}", existing.display())))?;

    for component in tail.into_iter().rev() {
        resolved.push(component);
    }

    Ok(resolved)
}
