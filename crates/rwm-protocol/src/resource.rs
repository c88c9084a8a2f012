//! Resolution of `artifact://sha256/<hex>` and `workspace://<relpath>`
//! resource URIs into response-ready content.

use base64::Engine;
use rwm_artifacts::ArtifactStore;
use rwm_error::{Result, RwmError};

const MAX_REPLACEMENT_CHARS: usize = 5;

/// A resolved resource body: text when the bytes decode cleanly as UTF-8
/// with few replacement characters, otherwise base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceBody {
    /// Readable UTF-8 text.
    Text(String),
    /// Base64-encoded opaque bytes.
    Base64(String),
}

/// Resolves a `artifact://sha256/<hex>` or `workspace://<relpath>` URI.
pub fn resolve(artifacts: &ArtifactStore, uri: &str) -> Result<ResourceBody> {
    if let Some(hex) = uri.strip_prefix("artifact://sha256/") {
        let bytes = artifacts.read_body(hex)?;
        return Ok(decode_body(&bytes));
    }
    if let Some(rel_path) = uri.strip_prefix("workspace://") {
        let bytes = artifacts.read_workspace_file(rel_path)?;
        return Ok(decode_body(&bytes));
    }
    Err(RwmError::validation(format!("unrecognized resource scheme: {uri}")))
}

fn decode_body(bytes: &[u8]) -> ResourceBody {
    let lossy = String::from_utf8_lossy(bytes);
    let replacements = lossy.chars().filter(|c| *c == '\u{FFFD}').count();
    if replacements < MAX_REPLACEMENT_CHARS {
        ResourceBody::Text(lossy.into_owned())
    } else {
        ResourceBody::Base64(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}
