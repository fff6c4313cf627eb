//! Shared types, error model, and configuration for BCO-RAG.
//!
//! This crate is the foundation depended on by all other BCO-RAG crates.
//! It provides:
//! - [`BcoRagError`]: the unified error type
//! - Domain-neutral types ([`TokenUsage`], [`SessionMode`], document-name normalization)
//! - Configuration ([`AppConfig`], [`IndexSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, IndexSettings, OpenAiConfig, RetrievalConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{BcoRagError, Result};
pub use types::{SessionMode, TokenUsage, normalize_document_name};
