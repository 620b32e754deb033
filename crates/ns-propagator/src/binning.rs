//! Multi-dimensional binning.

use crate::config::BinningConfig;
use crate::event::Event;
use ns_core::{Error, Result};

/// Set of bins, each a box of `[lo, hi)` ranges over the binning variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binning {
    variables: Vec<String>,
    bins: Vec<Vec<(f64, f64)>>,
}

impl Binning {
    /// Build from `edges` (single variable) or explicit `bins`.
    pub fn from_config(cfg: &BinningConfig) -> Result<Self> {
        if !cfg.edges.is_empty() {
            if cfg.variables.len() != 1 {
                return Err(Error::Config(format!(
                    "binning with edges needs exactly one variable, got {}",
                    cfg.variables.len()
                )));
            }
            if cfg.edges.len() < 2 || cfg.edges.windows(2).any(|w| w[0] >= w[1]) {
                return Err(Error::Config(
                    "binning edges must be strictly increasing with at least 2 entries".into(),
                ));
            }
            let bins = cfg.edges.windows(2).map(|w| vec![(w[0], w[1])]).collect();
            return Ok(Self { variables: cfg.variables.clone(), bins });
        }

        let mut bins = Vec::with_capacity(cfg.bins.len());
        for (i, bin) in cfg.bins.iter().enumerate() {
            if bin.len() != cfg.variables.len() {
                return Err(Error::Config(format!(
                    "bin #{i} has {} ranges for {} variables",
                    bin.len(),
                    cfg.variables.len()
                )));
            }
            if let Some([lo, hi]) = bin.iter().find(|[lo, hi]| lo >= hi) {
                return Err(Error::Config(format!("bin #{i} has an empty range [{lo}, {hi})")));
            }
            bins.push(bin.iter().map(|[lo, hi]| (*lo, *hi)).collect());
        }
        Ok(Self { variables: cfg.variables.clone(), bins })
    }

    /// Number of bins
    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    /// Binning variables
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// First bin containing the event; `None` when outside or a variable is missing.
    pub fn find_bin(&self, event: &Event) -> Option<usize> {
        let values: Vec<f64> =
            self.variables.iter().map(|v| event.variable(v)).collect::<Option<_>>()?;
        self.bins.iter().position(|bin| {
            bin.iter().zip(&values).all(|(&(lo, hi), &x)| x >= lo && x < hi)
        })
    }

    /// Human readable description of one bin.
    pub fn bin_label(&self, index: usize) -> String {
        match self.bins.get(index) {
            Some(bin) => self
                .variables
                .iter()
                .zip(bin)
                .map(|(v, (lo, hi))| format!("{v}: [{lo}, {hi})"))
                .collect::<Vec<_>>()
                .join(", "),
            None => format!("bin #{index} (out of range)"),
        }
    }
}
