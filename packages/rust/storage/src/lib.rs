//! Persistence for BCO-RAG.
//!
//! Two independent stores live here:
//! - [`OutputStore`]: the per-document output directory holding one
//!   `{domain}_domain.txt` / `{domain}_domain.json` pair per domain.
//! - [`EmbeddingCache`]: a Turso Embedded / libSQL database of chunk
//!   embeddings keyed by content hash and embedding model, so re-indexing the
//!   same paper does not pay for the same embeddings twice.

mod cache;
mod migrations;
mod output;

pub use cache::{EmbeddingCache, content_hash};
pub use output::{OutputStore, RAW_SUFFIX, STRUCTURED_SUFFIX};
