//! Non-fatal data-integrity caveats.
//!
//! These never stop an analysis; they flag inputs that weaken it (weights
//! that do not sum to one slow sampler convergence, a null network that
//! looks like the empirical one makes the evidence comparison meaningless).
//! Producers report through a [`DiagnosticSink`]; callers decide whether to
//! log, collect or drop them.

use serde::{Serialize, Deserialize};
use std::sync::Mutex;
use tracing::warn;

use crate::network::Day;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// Per-timestep edge weights do not sum to one.
    UnnormalizedWeights {
        timesteps: Vec<Day>,
    },
    /// A randomized network is too similar to the one it was drawn from.
    NullResemblesEmpirical {
        mean_jaccard: f64,
    },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::UnnormalizedWeights { timesteps } => write!(
                f,
                "edge weights do not sum to 1 at {} timestep(s); \
                sampler convergence is better with normalized weights",
                timesteps.len()
            ),
            Diagnostic::NullResemblesEmpirical { mean_jaccard } => write!(
                f,
                "randomized network resembles empirical network (mean Jaccard {:.3}); \
                evidence comparison may be inconsistent",
                mean_jaccard
            ),
        }
    }
}

pub trait DiagnosticSink {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards every diagnostic to `tracing` at WARN level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        warn!(?diagnostic, "{}", diagnostic);
    }
}

/// Keeps every diagnostic for later inspection.
#[derive(Debug, Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self.diagnostics.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics().is_empty()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        match self.diagnostics.lock() {
            Ok(mut guard) => guard.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn report(&self, _diagnostic: Diagnostic) {}
}
