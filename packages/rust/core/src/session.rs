//! Interactive domain loop.
//!
//! A two-state machine: `Selecting` until the selector yields an exit, then
//! `Terminated`. Unrecognized input never dispatches a query, and a failed
//! domain never ends the loop.

use std::collections::VecDeque;

use bcorag_index::QueryEngine;
use bcorag_shared::{BcoRagError, Result};
use tracing::{info, instrument};

use crate::orchestrator::{DomainQueryOrchestrator, QueryResult};
use crate::registry::{DomainRegistry, EXIT_TOKEN};

/// Marker written as the final entry of every session log.
pub const RUN_END: &str = "RUN END";

/// Loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Selecting,
    Terminated,
}

/// What the user picked at the selection prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// A registered domain, by canonical name.
    Domain(String),
    Exit,
    /// Input matching no domain, code, or the exit token.
    Unrecognized(String),
}

/// Resolve raw prompt input against the registry.
///
/// Matches a full domain name first, then a selection code, then the exit
/// token. Matching is case-insensitive and ignores surrounding whitespace.
pub fn resolve_selection(registry: &DomainRegistry, input: &str) -> Selection {
    let token = input.trim();
    let all = registry.all();

    if let Some(d) = all.iter().find(|d| d.name.eq_ignore_ascii_case(token)) {
        return Selection::Domain(d.name.clone());
    }
    if let Some(d) = all.iter().find(|d| d.selection_code.eq_ignore_ascii_case(token)) {
        return Selection::Domain(d.name.clone());
    }
    if token.eq_ignore_ascii_case(EXIT_TOKEN) {
        return Selection::Exit;
    }
    Selection::Unrecognized(token.to_string())
}

/// Source of selections and sink for per-domain feedback.
pub trait DomainSelector {
    /// Next selection. `None` (end of input) is treated as exit.
    fn select(&mut self, registry: &DomainRegistry) -> Option<Selection>;

    /// Called for unrecognized input before prompting again.
    fn on_unrecognized(&mut self, _token: &str) {}

    /// Called just before a domain query is sent.
    fn on_dispatch(&mut self, _domain: &str) {}

    /// Called after a domain was generated.
    fn on_generated(&mut self, _result: &QueryResult) {}

    /// Called after a domain query failed.
    fn on_failed(&mut self, _domain: &str, _error: &BcoRagError) {}
}

/// Selector replaying a fixed list of inputs, then exiting.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSelector {
    inputs: VecDeque<String>,
    unrecognized: Vec<String>,
}

impl ScriptedSelector {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            unrecognized: Vec::new(),
        }
    }

    /// Inputs that resolved to nothing, in order.
    pub fn unrecognized(&self) -> &[String] {
        &self.unrecognized
    }
}

impl DomainSelector for ScriptedSelector {
    fn select(&mut self, registry: &DomainRegistry) -> Option<Selection> {
        self.inputs
            .pop_front()
            .map(|input| resolve_selection(registry, &input))
    }

    fn on_unrecognized(&mut self, token: &str) {
        self.unrecognized.push(token.to_string());
    }
}

/// What happened during one loop run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopSummary {
    /// Domains generated, in order.
    pub generated: Vec<String>,
    /// Domains whose query failed, in order.
    pub failed: Vec<String>,
    /// Count of unrecognized inputs.
    pub unrecognized: usize,
}

/// Drive the orchestrator from `selector` until exit.
///
/// Always finishes with a `RUN END` entry in the session log.
#[instrument(skip_all, fields(document = %orchestrator.document_identity()))]
pub async fn run_domain_loop<E, S>(
    orchestrator: &DomainQueryOrchestrator<E>,
    selector: &mut S,
) -> Result<LoopSummary>
where
    E: QueryEngine,
    S: DomainSelector + ?Sized,
{
    let log = orchestrator.log();
    let mut state = LoopState::Selecting;
    let mut summary = LoopSummary::default();

    while state == LoopState::Selecting {
        match selector.select(orchestrator.registry()) {
            None | Some(Selection::Exit) => {
                state = LoopState::Terminated;
            }
            Some(Selection::Unrecognized(token)) => {
                summary.unrecognized += 1;
                selector.on_unrecognized(&token);
            }
            Some(Selection::Domain(domain)) => {
                log.info(&format!("Generating the {domain} domain"));
                selector.on_dispatch(&domain);
                match orchestrator.query_detailed(&domain).await {
                    Ok(result) => {
                        selector.on_generated(&result);
                        summary.generated.push(domain);
                    }
                    Err(e) => {
                        selector.on_failed(&domain, &e);
                        summary.failed.push(domain);
                    }
                }
            }
        }
    }

    if let Some(ledger) = orchestrator.ledger() {
        log.info(&format!("Final token counts:\n{ledger}"));
    }
    log.info(&format!(
        "{RUN_END} ({} generated, {} failed)",
        summary.generated.len(),
        summary.failed.len()
    ));
    info!(
        generated = summary.generated.len(),
        failed = summary.failed.len(),
        "session finished"
    );

    Ok(summary)
}
