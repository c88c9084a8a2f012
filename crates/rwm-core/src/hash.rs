//! SHA-256 hashing and ID generation.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Returns the lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Returns the lowercase hex SHA-256 digest of a UTF-8 string.
#[must_use]
pub fn sha256_str(s: &str) -> String {
    sha256_bytes(s.as_bytes())
}

/// 36 alphanumeric symbols used for base36 rendering of random IDs.
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generates a short random ID of the form `"<prefix>-<6 base36 chars>"`.
///
/// Uniqueness within a short window is sufficient: collisions are resolved
/// by primary-key upsert at the store layer, so no retry loop is needed here.
#[must_use]
pub fn rid(prefix: &str) -> String {
    let raw = Uuid::new_v4().as_u128() as u32;
    let mut n = raw;
    let mut chars = [b'0'; 6];
    for slot in chars.iter_mut().rev() {
        *slot = BASE36[(n % 36) as usize];
        n /= 36;
    }
    format!("{prefix}-{}", std::str::from_utf8(&chars).unwrap())
}

/// Deterministic fact ID derived from `(key, scope)` so repeated commits of
/// the same fact update in place instead of duplicating.
#[must_use]
pub fn fact_id(key: &str, scope: &str) -> String {
    let scope = if scope.is_empty() { "repo" } else { scope };
    let digest = sha256_str(&format!("{key}::{scope}"));
    format!("F-{}", &digest[..16])
}

/// Lowercases `title`, collapses runs of non-`[a-z0-9]` to `-`, and truncates
/// to `max_len` characters.
#[must_use]
pub fn slug(title: &str, max_len: usize) -> String {
    let mut out = String::new();
    let mut last_was_dash = false;
    for ch in title.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = out.trim_matches('-');
    trimmed.chars().take(max_len).collect()
}

/// Derives a task ID from its title: `"T-" + slug(title, 12)`.
#[must_use]
pub fn task_id(title: &str) -> String {
    format!("T-{}", slug(title, 12))
}

/// Default artifact ID when the caller does not supply one: `"P-" + sha256[..8]`.
#[must_use]
pub fn pointer_id(sha256: &str) -> String {
    format!("P-{}", &sha256[..8.min(sha256.len())])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256_str(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(sha256_str("").len(), 64);
    }

    #[test]
    fn rid_has_expected_shape() {
        let id = rid("D");
        assert!(id.starts_with("D-"));
        assert_eq!(id.len(), 8);
        assert!(id[2..].chars().all(|c| BASE36.contains(&(c as u8))));
    }

    #[test]
    fn fact_id_is_deterministic() {
        assert_eq!(fact_id("build", "repo"), fact_id("build", "repo"));
        assert_eq!(fact_id("build", ""), fact_id("build", "repo"));
        assert_ne!(fact_id("build", "repo"), fact_id("build", "team"));
    }

    #[test]
    fn task_id_truncates_slug_to_twelve() {
        assert_eq!(task_id("Implement feature"), "T-implement-fe");
    }

    #[test]
    fn slug_collapses_non_alphanumeric_runs() {
        assert_eq!(slug("Hello, World!!", 20), "hello-world");
    }
}
