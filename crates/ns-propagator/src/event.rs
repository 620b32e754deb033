//! Events and their serialized records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Event as read from a dispenser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Target sample name
    pub sample: String,
    /// Event variables (binning and dial conditions read these).
    #[serde(default)]
    pub variables: BTreeMap<String, f64>,
    /// Initial weight
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Event living inside a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event variables
    pub variables: BTreeMap<String, f64>,
    /// Weight before any dial or throw.
    pub base_weight: f64,
    /// Current weight: `base_weight * mc_throw_factor * prod(dials)`.
    pub weight: f64,
    /// Multiplier from the per-event MC statistical throw.
    pub mc_throw_factor: f64,
    /// Bin the event falls into, once binned.
    pub bin_index: Option<usize>,
    /// Dataset the event was loaded from.
    pub data_set_index: usize,
    /// Position in the dispenser's output.
    pub entry_index: usize,
    /// Observed-data events carry no dials.
    pub is_data: bool,
}

impl Event {
    /// New event at its base weight.
    pub fn new(variables: BTreeMap<String, f64>, base_weight: f64, data_set_index: usize) -> Self {
        Self {
            variables,
            base_weight,
            weight: base_weight,
            mc_throw_factor: 1.0,
            bin_index: None,
            data_set_index,
            entry_index: 0,
            is_data: false,
        }
    }

    /// Variable value, if present.
    pub fn variable(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }

    /// Reset the weight to `base_weight * mc_throw_factor`.
    pub fn reset_weight(&mut self) {
        self.weight = self.base_weight * self.mc_throw_factor;
    }

    /// Record for export.
    pub fn to_record(&self, sample: &str) -> EventRecord {
        EventRecord { sample: sample.to_string(), variables: self.variables.clone(), weight: self.weight }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event{{dataset={}, entry={}, bin={:?}, base={}, weight={}, vars={:?}}}",
            self.data_set_index,
            self.entry_index,
            self.bin_index,
            self.base_weight,
            self.weight,
            self.variables
        )
    }
}
