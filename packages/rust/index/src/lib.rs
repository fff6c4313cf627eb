//! Semantic index over a single source document.
//!
//! The core pipeline depends on exactly two capabilities from this crate:
//! [`build_index`] ("produce a queryable index from a document") and
//! [`QueryEngine`] ("answer a text query against that index").
//!
//! The bundled implementation loads the paper ([`loader`]), splits it into
//! overlapping chunks ([`chunker`]), embeds them through an OpenAI-compatible
//! API ([`openai`]), and answers queries by retrieving the most similar chunks
//! and asking the chat model with them as context ([`vector`]).

pub mod chunker;
pub mod loader;
pub mod openai;
pub mod vector;

use std::future::Future;

use bcorag_shared::{Result, TokenUsage};

pub use chunker::{Chunk, chunk_text};
pub use loader::{Document, load_document};
pub use openai::{Completion, EmbeddingBatch, OpenAiClient};
pub use vector::{IndexStats, VectorIndex, build_index, cosine_similarity};

/// Answer to one query against an index.
#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    /// The model's response text, verbatim.
    pub text: String,
    /// Tokens consumed by this query alone.
    pub usage: TokenUsage,
    /// Chunk indexes used as context, most similar first.
    pub sources: Vec<usize>,
}

/// Anything that can answer a text query against an indexed document.
///
/// This is the only point where a domain query may block on an external
/// service, and the only point of genuine failure risk.
pub trait QueryEngine: Send + Sync {
    /// Answer `text`. Service failures are returned as errors, never retried.
    fn query(&self, text: &str) -> impl Future<Output = Result<QueryResponse>> + Send;
}
