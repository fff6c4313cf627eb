//! Error types for BCO-RAG.
//!
//! Library crates use [`BcoRagError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all BCO-RAG operations.
#[derive(Debug, thiserror::Error)]
pub enum BcoRagError {
    /// Configuration loading or validation error. Fatal before any query runs.
    #[error("config error: {message}")]
    Config { message: String },

    /// A domain name that is not in the registry reached the orchestrator.
    #[error("unknown domain: {0}")]
    UnknownDomain(String),

    /// Transport-level failure talking to the model backend.
    #[error("network error: {0}")]
    Network(String),

    /// The model backend answered with an error or an unusable payload.
    #[error("service error: {0}")]
    Service(String),

    /// The query did not complete within the configured bound.
    #[error("query timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Source document could not be loaded or its text extracted.
    #[error("document error at {path:?}: {message}")]
    Document { path: PathBuf, message: String },

    /// Embedding cache (libSQL) error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (duplicate domain codes, bad index input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BcoRagError>;

impl BcoRagError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a document error for the given path.
    pub fn document(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Document {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from the model backend (network, API, or timeout).
    pub fn is_service_failure(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Service(_) | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = BcoRagError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = BcoRagError::UnknownDomain("provenance".into());
        assert_eq!(err.to_string(), "unknown domain: provenance");

        let err = BcoRagError::Timeout { secs: 30 };
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn service_failure_classification() {
        assert!(BcoRagError::Service("rate limited".into()).is_service_failure());
        assert!(BcoRagError::Network("connection reset".into()).is_service_failure());
        assert!(BcoRagError::Timeout { secs: 1 }.is_service_failure());
        assert!(!BcoRagError::UnknownDomain("x".into()).is_service_failure());
        assert!(!BcoRagError::config("bad").is_service_failure());
    }
}
