//! Domain query orchestrator.
//!
//! Resolves a domain, composes its grounded query, runs it against the
//! session's index with a bounded timeout, accounts for tokens, normalizes
//! the response, and persists the artifacts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bcorag_index::QueryEngine;
use bcorag_shared::{BcoRagError, Result, TokenUsage};
use bcorag_storage::OutputStore;
use serde_json::Value;
use tracing::{info, instrument};

use crate::normalizer::{ParseOutcome, normalize};
use crate::prompts::compose_query;
use crate::provenance::{LogLevel, SessionLog};
use crate::registry::DomainRegistry;
use crate::tokens::{Diagnostics, LedgerSnapshot};

/// Default bound on a single domain query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything one document session needs. Owned by the orchestrator.
#[derive(Debug)]
pub struct SessionContext<E> {
    /// Document name as given (e.g. the paper's file stem).
    pub document_identity: String,
    /// Queryable index over the document.
    pub index: E,
    pub diagnostics: Diagnostics,
    /// Root under which the session directory is created.
    pub output_root: PathBuf,
}

/// Outcome of one successful domain query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub domain: String,
    /// Response text with any ```json fence removed, as written to disk.
    pub raw_text: String,
    /// Parsed record, when the response was valid JSON.
    pub structured: Option<Value>,
    pub raw_path: PathBuf,
    /// Set only when the structured artifact was written.
    pub structured_path: Option<PathBuf>,
    /// Usage of this query alone.
    pub usage: TokenUsage,
}

/// Drives domain queries for one session.
pub struct DomainQueryOrchestrator<E> {
    registry: DomainRegistry,
    context: SessionContext<E>,
    store: OutputStore,
    log: Arc<dyn SessionLog>,
    query_timeout: Duration,
}

impl<E: QueryEngine> DomainQueryOrchestrator<E> {
    /// Create the orchestrator and its session output directory.
    pub fn new(
        registry: DomainRegistry,
        context: SessionContext<E>,
        log: Arc<dyn SessionLog>,
    ) -> Result<Self> {
        let store = OutputStore::open(&context.output_root, &context.document_identity)?;
        Ok(Self {
            registry,
            context,
            store,
            log,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        })
    }

    /// Override the per-query timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    pub fn log(&self) -> &Arc<dyn SessionLog> {
        &self.log
    }

    pub fn document_identity(&self) -> &str {
        &self.context.document_identity
    }

    /// Ledger totals so far, if the session is in diagnostic mode.
    pub fn ledger(&self) -> Option<LedgerSnapshot> {
        self.context.diagnostics.snapshot()
    }

    /// Query `domain` and return the response text written to its `.txt`
    /// artifact.
    pub async fn query(&self, domain: &str) -> Result<String> {
        self.query_detailed(domain).await.map(|r| r.raw_text)
    }

    /// Query `domain` and return the full result.
    ///
    /// Unknown domains fail before anything is sent. Service failures and
    /// timeouts leave the domain's artifacts untouched.
    #[instrument(skip(self), fields(document = %self.context.document_identity))]
    pub async fn query_detailed(&self, domain: &str) -> Result<QueryResult> {
        let Some(descriptor) = self.registry.lookup(domain) else {
            self.log.error(&format!("Unknown domain '{domain}', no query dispatched"));
            return Err(BcoRagError::UnknownDomain(domain.to_string()));
        };

        let query = compose_query(descriptor);

        let response =
            match tokio::time::timeout(self.query_timeout, self.context.index.query(&query)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return Err(self.fail(domain, e)),
                Err(_) => {
                    let e = BcoRagError::Timeout {
                        secs: self.query_timeout.as_secs(),
                    };
                    return Err(self.fail(domain, e));
                }
            };

        self.context.diagnostics.record(response.usage);
        if let Some(snapshot) = self.context.diagnostics.snapshot() {
            self.log.info(&format!("QUERY PROMPT for the {domain} domain:\n{query}"));
            self.log.info(&format!("Token counts after the {domain} domain:\n{snapshot}"));
        }

        let normalized = normalize(&response.text);

        let raw_path = match self.store.write_raw(domain, &normalized.body) {
            Ok(path) => path,
            Err(e) => {
                self.log.error(&format!(
                    "Failed to write the {domain} domain response: {e}"
                ));
                return Err(e);
            }
        };

        let (structured, structured_path) = match normalized.outcome {
            ParseOutcome::Structured(record) => {
                let path = self.store.write_structured(domain, &record);
                if path.is_none() {
                    self.log.warn(&format!(
                        "Could not write the structured {domain} domain, raw response kept at {}",
                        raw_path.display()
                    ));
                    self.clear_stale_structured(domain);
                }
                (Some(record), path)
            }
            ParseOutcome::Unstructured { error } => {
                self.log.error(&format!(
                    "Error parsing the {domain} domain response as JSON: {error}. \
                     Raw response stored at {}",
                    raw_path.display()
                ));
                self.clear_stale_structured(domain);
                (None, None)
            }
        };

        self.log.info(&format!(
            "QUERY RESPONSE for the {domain} domain:\n{}",
            normalized.body
        ));
        info!(
            domain,
            structured = structured.is_some(),
            sources = ?response.sources,
            "domain generated"
        );

        Ok(QueryResult {
            domain: domain.to_string(),
            raw_text: normalized.body,
            structured,
            raw_path,
            structured_path,
            usage: response.usage,
        })
    }

    /// Drop a `.json` left by an earlier response so it never sits next to
    /// the new `.txt`.
    fn clear_stale_structured(&self, domain: &str) {
        if let Err(e) = self.store.clear_structured(domain) {
            self.log.warn(&format!(
                "Could not remove the stale structured {domain} domain: {e}"
            ));
        }
    }

    fn fail(&self, domain: &str, e: BcoRagError) -> BcoRagError {
        self.log.log(
            LogLevel::Error,
            &format!("Query for the {domain} domain failed: {e}"),
        );
        e
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bcorag_index::QueryResponse;

    use super::*;
    use crate::registry::DomainDescriptor;

    /// Engine answering from a fixed queue of replies.
    #[derive(Debug, Default)]
    pub struct MockEngine {
        replies: Mutex<VecDeque<Result<QueryResponse>>>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl MockEngine {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn reply(self, text: &str, usage: TokenUsage) -> Self {
            self.replies.lock().unwrap().push_back(Ok(QueryResponse {
                text: text.to_string(),
                usage,
                sources: vec![0],
            }));
            self
        }

        pub fn fail(self, error: BcoRagError) -> Self {
            self.replies.lock().unwrap().push_back(Err(error));
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl QueryEngine for MockEngine {
        async fn query(&self, text: &str) -> Result<QueryResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(text.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.replies.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(BcoRagError::Service("no scripted reply".into())))
        }
    }

    pub fn registry() -> DomainRegistry {
        let domains = [
            ("usability", "u"),
            ("io", "i"),
            ("description", "d"),
            ("execution", "e"),
            ("parametric", "p"),
            ("error", "err"),
        ];
        DomainRegistry::new(
            domains
                .iter()
                .map(|(name, code)| DomainDescriptor {
                    name: name.to_string(),
                    grounding_text: format!("Schema for the {name} domain."),
                    user_label: format!("{name} domain"),
                    selection_code: code.to_string(),
                })
                .collect(),
        )
        .unwrap()
    }

    pub fn temp_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bcorag-core-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn usage(embedding: u64, prompt: u64, completion: u64) -> TokenUsage {
        TokenUsage {
            embedding,
            prompt,
            completion,
            total: prompt + completion,
        }
    }
}
