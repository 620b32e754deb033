//! Model/data sample pairing.
//!
//! Pairs are stored as indices into the two sample sets, so they stay valid
//! while samples are mutated and are rebuilt whenever either set changes
//! shape.

use ns_core::{Error, Result};
use ns_propagator::{Sample, SampleSet};

/// Index of a sample present at the same position on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplePair {
    /// Sample index (same on model and data side)
    pub index: usize,
}

/// Borrowed view of one pair, handed to joint-probability strategies.
#[derive(Debug, Clone, Copy)]
pub struct SamplePairView<'a> {
    /// Sample index
    pub index: usize,
    /// Model (expected) side
    pub model: &'a Sample,
    /// Data (observed) side
    pub data: &'a Sample,
}

impl SamplePairView<'_> {
    /// True when both sides take part in the fit. A sample disabled on the
    /// data side only (configuration override) contributes nothing.
    pub fn is_active(&self) -> bool {
        self.model.is_enabled() && self.data.is_enabled()
    }
}

impl SamplePair {
    /// Resolve against the two sample sets.
    pub fn view<'a>(&self, model: &'a SampleSet, data: &'a SampleSet) -> SamplePairView<'a> {
        SamplePairView {
            index: self.index,
            model: &model.samples()[self.index],
            data: &data.samples()[self.index],
        }
    }
}

/// Pair every enabled sample. Both sets must have the same number of samples.
pub fn build_sample_pairs(model: &SampleSet, data: &SampleSet) -> Result<Vec<SamplePair>> {
    if model.len() != data.len() {
        return Err(Error::SampleCountMismatch { n_model: model.len(), n_data: data.len() });
    }
    Ok(model
        .samples()
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_enabled())
        .map(|(index, _)| SamplePair { index })
        .collect())
}
