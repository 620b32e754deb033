//! Event and rate export for external persistence.

use crate::engine::LikelihoodEngine;
use ns_propagator::{EventRecord, Propagator};
use serde::Serialize;
use std::fmt;

/// Propagator side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Expected
    Model,
    /// Observed
    Data,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Model => "model",
            Side::Data => "data",
        })
    }
}

/// Final events of one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleEvents {
    /// Side
    pub side: Side,
    /// Sample name
    pub sample: String,
    /// Events with their current weight.
    pub events: Vec<EventRecord>,
}

/// Binned content of one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRates {
    /// Side
    pub side: Side,
    /// Sample name
    pub sample: String,
    /// Human-readable bin edges
    pub bin_labels: Vec<String>,
    /// Bin contents
    pub content: Vec<f64>,
    /// Sum of squared weights per bin
    pub sum_w2: Vec<f64>,
}

fn sides(engine: &LikelihoodEngine) -> [(Side, &Propagator); 2] {
    [(Side::Model, engine.model()), (Side::Data, engine.data())]
}

impl LikelihoodEngine {
    /// Binned events of every enabled sample, model side first.
    pub fn export_events(&self) -> Vec<SampleEvents> {
        let mut out = Vec::new();
        for (side, propagator) in sides(self) {
            for sample in propagator.samples().samples().iter().filter(|s| s.is_enabled()) {
                let events = sample
                    .events()
                    .iter()
                    .filter(|e| e.bin_index.is_some())
                    .map(|e| e.to_record(sample.name()))
                    .collect();
                out.push(SampleEvents { side, sample: sample.name().to_string(), events });
            }
        }
        out
    }

    /// Histogram content of every enabled sample, model side first.
    pub fn export_event_rates(&self) -> Vec<SampleRates> {
        let mut out = Vec::new();
        for (side, propagator) in sides(self) {
            for sample in propagator.samples().samples().iter().filter(|s| s.is_enabled()) {
                let hist = sample.histogram();
                out.push(SampleRates {
                    side,
                    sample: sample.name().to_string(),
                    bin_labels: (0..hist.n_bins()).map(|b| sample.binning().bin_label(b)).collect(),
                    content: hist.content().to_vec(),
                    sum_w2: hist.sum_w2().to_vec(),
                });
            }
        }
        out
    }
}
