//! # ns-propagator
//!
//! Propagation layer of the likelihood engine.
//!
//! A [`Propagator`] owns parameter sets, a sample set with binned histograms
//! and the per-event dial cache. Given a parameter state it reweights events
//! and refills histograms, one worker-pool job per sample.
//!
//! ## Architecture
//!
//! Reweighting goes through the [`ReweightBackend`] trait so an accelerated
//! backend can replace the CPU one. Event loading goes through
//! [`EventSource`]; dispensers may also carry inline events.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Reweighting backends.
pub mod backend;
/// Multi-dimensional binning.
pub mod binning;
/// Configuration schema and override merging.
pub mod config;
/// Dataset definitions, data dispensers and event sources.
pub mod dataset;
/// Dials and the event-dial cache.
pub mod dial;
/// Events
pub mod event;
/// Parameters manager.
pub mod manager;
/// Parameters and parameter sets (eigen decomposition, throws).
pub mod parameter;
/// Worker pool.
pub mod pool;
/// The propagator.
pub mod propagator;
/// Samples and histograms.
pub mod sample;

pub use backend::{CpuReweightBackend, ReweightBackend};
pub use binning::Binning;
pub use config::{ParameterInjection, PropagatorConfig, merge_override};
pub use dataset::{
    DataDispenser, DatasetConfig, DatasetDefinition, DispenserParameters, EventSource,
    MemoryEventSource, is_asimov_entry,
};
pub use dial::{DialCollection, DialKind, EventDialCache};
pub use event::{Event, EventRecord};
pub use manager::{ParameterKind, ParameterRef, ParametersManager};
pub use parameter::{Parameter, ParameterSet};
pub use pool::WorkerPool;
pub use propagator::{Propagator, SampleBreakdown};
pub use sample::{Histogram, Sample, SampleSet};
