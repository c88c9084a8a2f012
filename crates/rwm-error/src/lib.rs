//! Unified error taxonomy for the Resumable Working Memory engine.
//!
//! Every fallible operation in the engine returns (or converts into)
//! [`RwmError`], which carries a stable [`ErrorKind`] plus a human-readable
//! message. The kind is what the tool surface (`memory_*` operations) turns
//! into the response's error flag; the message is for humans.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

/// The error kinds surfaced to callers, one per failure mode in the design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Input failed schema validation.
    Validation,
    /// A relative path escaped the confined workspace root.
    PathEscape,
    /// The requested record does not exist.
    NotFound,
    /// An update carried no mutable fields for its target.
    InvalidUpdate,
    /// A read or write against the store or artifact pool failed.
    Io,
}

impl ErrorKind {
    /// Stable kebab-case string used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::PathEscape => "path-escape",
            Self::NotFound => "not-found",
            Self::InvalidUpdate => "invalid-update",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single error from anywhere in the engine.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RwmError {
    /// Machine-readable kind.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Underlying cause, if any.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RwmError {
    /// Build a new error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for [`ErrorKind::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Shorthand for [`ErrorKind::PathEscape`].
    pub fn path_escape(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PathEscape, message)
    }

    /// Shorthand for [`ErrorKind::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Shorthand for [`ErrorKind::InvalidUpdate`].
    pub fn invalid_update(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidUpdate, message)
    }

    /// Shorthand for [`ErrorKind::Io`].
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl From<std::io::Error> for RwmError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for RwmError {
    fn from(err: serde_json::Error) -> Self {
        Self::io(err.to_string()).with_source(err)
    }
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, RwmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_kebab_case() {
        assert_eq!(ErrorKind::PathEscape.as_str(), "path-escape");
        assert_eq!(ErrorKind::InvalidUpdate.as_str(), "invalid-update");
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = RwmError::not_found("task T-abc123 absent");
        assert_eq!(err.to_string(), "not-found: task T-abc123 absent");
    }
}
