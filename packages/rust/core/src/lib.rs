//! Domain query and response-normalization pipeline for BCO-RAG.
//!
//! Given an indexed paper, this crate composes a schema-grounded query per
//! BioCompute Object domain, runs it against a [`bcorag_index::QueryEngine`],
//! accounts for tokens, normalizes the answer, and persists the raw and
//! structured artifacts through [`bcorag_storage::OutputStore`].
//!
//! Leaf-first: [`registry`] → [`tokens`] → [`normalizer`] →
//! [`orchestrator`] → [`session`].

pub mod normalizer;
pub mod orchestrator;
pub mod prompts;
pub mod provenance;
pub mod registry;
pub mod session;
pub mod tokens;

pub use normalizer::{Normalized, ParseOutcome, normalize, strip_fence};
pub use orchestrator::{DomainQueryOrchestrator, QueryResult, SessionContext};
pub use prompts::{QUERY_TEMPLATE, compose_query};
pub use provenance::{DocumentLog, LogLevel, SessionLog, TracingLog};
pub use registry::{DomainDescriptor, DomainRegistry, EXIT_TOKEN};
pub use session::{
    DomainSelector, LoopState, LoopSummary, RUN_END, ScriptedSelector, Selection,
    resolve_selection, run_domain_loop,
};
pub use tokens::{Diagnostics, LedgerSnapshot, TokenLedger};
