//! Core value types shared across BCO-RAG crates.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionMode
// ---------------------------------------------------------------------------

/// Whether a session records token usage and verbose trace entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Plain operation, no token accounting.
    #[default]
    Production,
    /// Token accounting and query/ledger trace entries.
    Debug,
}

impl SessionMode {
    /// Whether diagnostics (token ledger, query traces) are enabled.
    pub fn is_debug(&self) -> bool {
        matches!(self, Self::Debug)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Debug => "debug",
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TokenUsage
// ---------------------------------------------------------------------------

/// Token consumption of a single completed query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens spent embedding the query text.
    pub embedding: u64,
    /// Prompt tokens sent to the chat model.
    pub prompt: u64,
    /// Completion tokens produced by the chat model.
    pub completion: u64,
    /// Total chat tokens as reported by the backend.
    pub total: u64,
}

// ---------------------------------------------------------------------------
// Document names
// ---------------------------------------------------------------------------

/// Normalize a document name for use as a directory or log file name.
///
/// Lower-cases, trims, and collapses every whitespace run to one underscore:
/// `"Example  Paper"` becomes `"example_paper"`.
pub fn normalize_document_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}
