//! Token estimation: an abstract capability with a default heuristic.

use serde::{Deserialize, Serialize};

/// Model families the estimator can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// OpenAI-style BPE tokenization.
    Openai,
    /// Anthropic-style tokenization.
    Anthropic,
    /// Generic / unknown family — always uses the heuristic.
    #[default]
    Generic,
}

impl std::str::FromStr for ModelFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::Openai),
            "anthropic" => Ok(Self::Anthropic),
            "generic" => Ok(Self::Generic),
            other => Err(format!("unrecognized model family: {other}")),
        }
    }
}

/// A pluggable token-counting capability.
///
/// No BPE backend is vendored in this build — every family dispatches to the
/// heuristic — but the trait boundary exists so a real encoder can be slotted
/// in later without touching call sites.
pub trait TokenEstimator: Send + Sync {
    /// Estimates the token cost of `text` for the requested `family`.
    fn estimate(&self, text: &str, family: ModelFamily) -> u32;
}

/// The always-available fallback estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str, _family: ModelFamily) -> u32 {
        heuristic_estimate(text)
    }
}

/// `max(1, ceil(words*1.25 + punctuation*0.5 + non_ascii*0.5))`.
#[must_use]
pub fn heuristic_estimate(text: &str) -> u32 {
    let words = text.split_whitespace().count() as f64;

    const PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '(', ')', '[', ']', '{', '}', '"', '\'', '`'];
    let punctuation = text.chars().filter(|c| PUNCTUATION.contains(c)).count() as f64;

    let non_ascii = text.chars().filter(|c| !c.is_ascii()).count() as f64;

    let raw = words * 1.25 + punctuation * 0.5 + non_ascii * 0.5;
    (raw.ceil() as i64).max(1) as u32
}
