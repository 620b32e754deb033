//! Per-run execution context.
//!
//! Thread count, verbosity, accelerator toggle and seed for one fit run.
//! Components receive the context explicitly; nothing here is process-global.

use serde::{Deserialize, Serialize};

/// Printout level for diagnostic dumps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Verbosity {
    /// Regular milestones only.
    #[default]
    Normal,
    /// Extra breakdown tables.
    MorePrintout,
    /// Per-step tracing.
    DebugTrace,
    /// Tracing inside hot loops.
    InLoopTrace,
}

/// Settings scoped to a single fit run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunContext {
    /// Worker threads used for the per-sample refill jobs (0 = all cores).
    pub n_threads: usize,
    /// Diagnostic printout level.
    pub verbosity: Verbosity,
    /// Request an accelerated reweighting backend when one is available.
    pub enable_cache_manager: bool,
    /// Seed for parameter and statistical throws.
    pub seed: u64,
}

impl Default for RunContext {
    fn default() -> Self {
        Self { n_threads: 1, verbosity: Verbosity::Normal, enable_cache_manager: false, seed: 42 }
    }
}

impl RunContext {
    /// Context with `n_threads` workers and default everything else.
    pub fn with_threads(n_threads: usize) -> Self {
        Self { n_threads, ..Self::default() }
    }

    /// Builder-style seed override.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builder-style verbosity override.
    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// True when debug dumps should be printed.
    pub fn is_debug(&self) -> bool {
        self.verbosity >= Verbosity::DebugTrace
    }
}
