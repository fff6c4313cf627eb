//! Application configuration for BCO-RAG.
//!
//! User config lives at `~/.bcorag/bcorag.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BcoRagError, Result};
use crate::types::SessionMode;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "bcorag.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".bcorag";

// ---------------------------------------------------------------------------
// Config structs (matching bcorag.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenAI-compatible backend settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Chunking and retrieval settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Path to a TOML file with `[[domains]]` descriptors. Uses the bundled
    /// BioCompute domains when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domains_file: Option<String>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory under which each paper gets its own output directory.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Directory scanned for `*.pdf` papers when none is given on the command line.
    #[serde(default = "default_papers_dir")]
    pub papers_dir: String,

    /// Directory for the run log and per-document logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Session mode: production or debug.
    #[serde(default)]
    pub mode: SessionMode,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            papers_dir: default_papers_dir(),
            log_dir: default_log_dir(),
            mode: SessionMode::default(),
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_papers_dir() -> String {
    "./papers".into()
}
fn default_log_dir() -> String {
    "./logs".into()
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat model used to answer domain queries.
    #[serde(default = "default_llm")]
    pub llm: String,

    /// Embedding model used to index the paper and the queries.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound for one whole domain query (retrieval + completion).
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            llm: default_llm(),
            embedding_model: default_embedding_model(),
            request_timeout_secs: default_request_timeout(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_llm() -> String {
    "gpt-4-turbo".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_request_timeout() -> u64 {
    120
}
fn default_query_timeout() -> u64 {
    300
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Target chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Number of chunks retrieved as context for each query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum inputs per embeddings request.
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,

    /// Whether chunk embeddings are cached on disk across runs.
    #[serde(default = "default_true")]
    pub cache_embeddings: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            embed_batch_size: default_embed_batch_size(),
            cache_embeddings: true,
        }
    }
}

fn default_chunk_size() -> usize {
    4_000
}
fn default_chunk_overlap() -> usize {
    400
}
fn default_top_k() -> usize {
    2
}
fn default_embed_batch_size() -> usize {
    64
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Index settings (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime settings for building and querying one document index.
///
/// Passed explicitly into index construction and owned by the index; there is
/// no process-wide backend state.
#[derive(Clone)]
pub struct IndexSettings {
    /// Resolved API key.
    pub api_key: String,
    /// Parsed API base URL.
    pub base_url: Url,
    /// Chat model.
    pub llm: String,
    /// Embedding model.
    pub embedding_model: String,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between chunks in characters.
    pub chunk_overlap: usize,
    /// Chunks retrieved per query.
    pub top_k: usize,
    /// Inputs per embeddings request.
    pub embed_batch_size: usize,
}

impl std::fmt::Debug for IndexSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSettings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("llm", &self.llm)
            .field("embedding_model", &self.embedding_model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("top_k", &self.top_k)
            .field("embed_batch_size", &self.embed_batch_size)
            .finish()
    }
}

impl IndexSettings {
    /// Build settings from the loaded config, resolving the API key from the
    /// environment. Fails with a config error if the key or URL is invalid.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = resolve_api_key(config)?;
        let base_url = Url::parse(&config.openai.base_url).map_err(|e| {
            BcoRagError::config(format!(
                "invalid openai.base_url '{}': {e}",
                config.openai.base_url
            ))
        })?;

        if config.openai.request_timeout_secs == 0 || config.openai.query_timeout_secs == 0 {
            return Err(BcoRagError::config(
                "openai.request_timeout_secs and openai.query_timeout_secs must be positive",
            ));
        }

        let retrieval = &config.retrieval;
        if retrieval.chunk_size == 0 {
            return Err(BcoRagError::config("retrieval.chunk_size must be positive"));
        }
        if retrieval.chunk_overlap >= retrieval.chunk_size {
            return Err(BcoRagError::config(
                "retrieval.chunk_overlap must be smaller than retrieval.chunk_size",
            ));
        }
        if retrieval.top_k == 0 || retrieval.embed_batch_size == 0 {
            return Err(BcoRagError::config(
                "retrieval.top_k and retrieval.embed_batch_size must be positive",
            ));
        }

        Ok(Self {
            api_key,
            base_url,
            llm: config.openai.llm.clone(),
            embedding_model: config.openai.embedding_model.clone(),
            request_timeout_secs: config.openai.request_timeout_secs,
            chunk_size: retrieval.chunk_size,
            chunk_overlap: retrieval.chunk_overlap,
            top_k: retrieval.top_k,
            embed_batch_size: retrieval.embed_batch_size,
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.bcorag/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| BcoRagError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.bcorag/bcorag.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BcoRagError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| BcoRagError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BcoRagError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BcoRagError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BcoRagError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    resolve_api_key(config).map(|_| ())
}

fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openai.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(BcoRagError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}
