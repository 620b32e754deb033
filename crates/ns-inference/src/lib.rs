//! # ns-inference
//!
//! Likelihood engine for binned model/data fits.
//!
//! This crate provides:
//! - [`LikelihoodEngine`]: loads the model and data propagators, pairs their
//!   samples and evaluates `stat + penalty`
//! - Asimov, toy and real-data modes, with parameter and statistical throws
//! - Joint-probability strategies selected by tag ([`JointProbabilityRegistry`])
//! - [`FitObjective`]: the minimizer-facing objective function with
//!   convergence bookkeeping
//!
//! ## Architecture
//!
//! Propagation (parameters, dials, samples, histograms) lives in
//! `ns-propagator`. This crate only coordinates the two propagators and
//! evaluates; it never runs a minimizer.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Engine configuration document.
pub mod config;
/// The likelihood engine.
pub mod engine;
/// Event and rate export.
pub mod export;
/// Joint-probability strategies and their registry.
pub mod joint_probability;
/// Load pipeline and data-mode selection.
pub mod load;
/// Deprecated configuration key relocation.
pub mod migration;
/// Convergence monitor.
pub mod monitor;
/// Minimizer-facing objective function.
pub mod objective;
/// Prior penalty.
pub mod penalty;
/// Summaries and breakdown tables.
pub mod report;
/// Model/data sample pairing.
pub mod sample_pair;
/// Toy throws.
pub mod toys;

pub use config::{JointProbabilityConfig, LikelihoodConfig};
pub use engine::{DatasetStatus, LikelihoodEngine};
pub use export::{SampleEvents, SampleRates, Side};
pub use joint_probability::{
    BarlowLlh, JointProbability, JointProbabilityFactory, JointProbabilityRegistry, LeastSquares,
    PoissonLlh,
};
pub use migration::{MIGRATIONS, Migration, MigrationSource, apply_migrations};
pub use monitor::{ConvergenceMonitor, MonitorRow, MonitoredVariable};
pub use objective::{FitObjective, FitStats};
pub use penalty::penalty_likelihood;
pub use report::{LikelihoodSummary, ParameterSetTerm, SampleTerm, TablePrinter, chi2_p_value};
pub use sample_pair::{SamplePair, SamplePairView, build_sample_pairs};
pub use toys::StatThrowOptions;
