use super::{JointProbability, parse_options};
use crate::sample_pair::SamplePairView;
use ns_core::Result;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PoissonOptions {
    allow_zero_mc_when_zero_data: bool,
}

impl Default for PoissonOptions {
    fn default() -> Self {
        Self { allow_zero_mc_when_zero_data: true }
    }
}

/// Poisson likelihood ratio against the saturated model:
/// `2 * sum[(mu - n) + n ln(n / mu)]`.
#[derive(Debug, Clone)]
pub struct PoissonLlh {
    allow_zero_mc_when_zero_data: bool,
}

impl Default for PoissonLlh {
    fn default() -> Self {
        Self { allow_zero_mc_when_zero_data: true }
    }
}

impl PoissonLlh {
    /// Build from an options block.
    pub fn from_options(options: &Value) -> Result<Self> {
        let opts: PoissonOptions = parse_options("PoissonLLH", options)?;
        Ok(Self { allow_zero_mc_when_zero_data: opts.allow_zero_mc_when_zero_data })
    }

    /// Contribution of one bin.
    pub fn bin_term(&self, expected: f64, observed: f64) -> f64 {
        if expected <= 0.0 {
            if observed > 0.0 || !self.allow_zero_mc_when_zero_data {
                return f64::INFINITY;
            }
            return 0.0;
        }
        if observed <= 0.0 {
            return 2.0 * expected;
        }
        2.0 * ((expected - observed) + observed * (observed / expected).ln())
    }
}

impl JointProbability for PoissonLlh {
    fn type_tag(&self) -> &str {
        "PoissonLLH"
    }

    fn eval(&self, pair: &SamplePairView<'_>) -> f64 {
        let model = pair.model.histogram().content();
        let data = pair.data.histogram().content();
        model.iter().zip(data).map(|(&mu, &n)| self.bin_term(mu, n)).sum()
    }
}
