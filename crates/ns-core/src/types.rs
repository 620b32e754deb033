//! Common data types for the likelihood engine

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Cached likelihood values from the last evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LikelihoodBuffer {
    /// Sum of the joint-probability terms over all sample pairs.
    pub stat_likelihood: f64,

    /// Sum of the prior penalty terms over all parameter sets.
    pub penalty_likelihood: f64,

    /// `stat_likelihood + penalty_likelihood`
    pub total_likelihood: f64,
}

impl LikelihoodBuffer {
    /// Recompute the total from the two partial sums.
    pub fn update_total(&mut self) {
        self.total_likelihood = self.stat_likelihood + self.penalty_likelihood;
    }

    /// True when all three cached values are finite.
    pub fn is_finite(&self) -> bool {
        self.stat_likelihood.is_finite()
            && self.penalty_likelihood.is_finite()
            && self.total_likelihood.is_finite()
    }
}

/// Which entry feeds the "data" side of the fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Data is an unmodified copy of the model's nominal prediction.
    #[default]
    Asimov,
    /// Data is a randomized pseudo-dataset.
    Toy,
    /// Data is read from a real-data dispenser.
    RealData,
}

impl DataType {
    /// Configuration tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Asimov => "Asimov",
            DataType::Toy => "Toy",
            DataType::RealData => "RealData",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Asimov" | "asimov" => Ok(DataType::Asimov),
            "Toy" | "toy" => Ok(DataType::Toy),
            "RealData" | "realData" | "Data" | "data" => Ok(DataType::RealData),
            other => Err(Error::Config(format!(
                "invalid data type \"{other}\" (expected Asimov, Toy or RealData)"
            ))),
        }
    }
}

/// Running average of a repeated timing measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AvgTimer {
    /// Number of recorded measurements.
    pub counts: u64,
    /// Sum of all recorded durations.
    pub cumulated: Duration,
}

impl AvgTimer {
    /// Record one measurement.
    pub fn record(&mut self, elapsed: Duration) {
        self.counts += 1;
        self.cumulated += elapsed;
    }

    /// Mean duration (zero when nothing was recorded).
    pub fn average(&self) -> Duration {
        match u32::try_from(self.counts) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.cumulated / n,
            Err(_) => Duration::from_secs_f64(self.cumulated.as_secs_f64() / self.counts as f64),
        }
    }
}

impl fmt::Display for AvgTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3?} (avg over {} calls)", self.average(), self.counts)
    }
}
