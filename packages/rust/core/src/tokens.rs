//! Token accounting for diagnostic sessions.

use std::sync::atomic::{AtomicU64, Ordering};

use bcorag_shared::TokenUsage;
use serde::Serialize;

/// Cumulative token counters. Never reset within a session.
#[derive(Debug, Default)]
pub struct TokenLedger {
    embedding: AtomicU64,
    input: AtomicU64,
    output: AtomicU64,
    total: AtomicU64,
}

/// Point-in-time copy of a [`TokenLedger`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    pub embedding: u64,
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl std::fmt::Display for LedgerSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "embedding: {}, input: {}, output: {}, total: {}",
            self.embedding, self.input, self.output, self.total
        )
    }
}

impl TokenLedger {
    fn add(&self, usage: TokenUsage) {
        self.embedding.fetch_add(usage.embedding, Ordering::Relaxed);
        self.input.fetch_add(usage.prompt, Ordering::Relaxed);
        self.output.fetch_add(usage.completion, Ordering::Relaxed);
        self.total.fetch_add(usage.total, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            embedding: self.embedding.load(Ordering::Relaxed),
            input: self.input.load(Ordering::Relaxed),
            output: self.output.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
        }
    }
}

/// Diagnostic capability of a session.
///
/// In production sessions there is no ledger at all, so call sites have to
/// handle `Disabled` rather than reading zeros.
#[derive(Debug)]
pub enum Diagnostics {
    Enabled(TokenLedger),
    Disabled,
}

impl Diagnostics {
    /// Diagnostics with a fresh, zeroed ledger.
    pub fn enabled() -> Self {
        Self::Enabled(TokenLedger::default())
    }

    /// Add one completed query's usage. No-op when disabled.
    pub fn record(&self, usage: TokenUsage) {
        if let Self::Enabled(ledger) = self {
            ledger.add(usage);
        }
    }

    /// Current totals, or `None` when disabled.
    pub fn snapshot(&self) -> Option<LedgerSnapshot> {
        match self {
            Self::Enabled(ledger) => Some(ledger.snapshot()),
            Self::Disabled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(embedding: u64, prompt: u64, completion: u64) -> TokenUsage {
        TokenUsage {
            embedding,
            prompt,
            completion,
            total: prompt + completion,
        }
    }

    #[test]
    fn enabled_ledger_starts_at_zero() {
        assert_eq!(Diagnostics::enabled().snapshot(), Some(LedgerSnapshot::default()));
    }

    #[test]
    fn ledger_is_cumulative() {
        let diagnostics = Diagnostics::enabled();
        let deltas = [usage(10, 100, 20), usage(12, 250, 40), usage(0, 90, 5)];
        for d in deltas {
            diagnostics.record(d);
        }

        let snapshot = diagnostics.snapshot().unwrap();
        assert_eq!(snapshot.embedding, 22);
        assert_eq!(snapshot.input, 440);
        assert_eq!(snapshot.output, 65);
        assert_eq!(snapshot.total, 505);
    }

    #[test]
    fn disabled_has_no_ledger() {
        let diagnostics = Diagnostics::Disabled;
        diagnostics.record(usage(1, 2, 3));
        assert!(diagnostics.snapshot().is_none());
    }

    #[test]
    fn snapshot_display() {
        let s = LedgerSnapshot {
            embedding: 1,
            input: 2,
            output: 3,
            total: 5,
        };
        assert_eq!(s.to_string(), "embedding: 1, input: 2, output: 3, total: 5");
    }
}
