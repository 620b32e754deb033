use super::{JointProbability, parse_options};
use crate::sample_pair::SamplePairView;
use ns_core::Result;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LeastSquaresOptions {
    lsq_poissonian_approximation: bool,
}

/// `sum (n - mu)^2`, or `sum (n - mu)^2 / mu` with the Poissonian approximation.
#[derive(Debug, Clone, Default)]
pub struct LeastSquares {
    poissonian_approximation: bool,
}

impl LeastSquares {
    /// Build from an options block.
    pub fn from_options(options: &Value) -> Result<Self> {
        let opts: LeastSquaresOptions = parse_options("LeastSquares", options)?;
        Ok(Self { poissonian_approximation: opts.lsq_poissonian_approximation })
    }
}

impl JointProbability for LeastSquares {
    fn type_tag(&self) -> &str {
        "LeastSquares"
    }

    fn eval(&self, pair: &SamplePairView<'_>) -> f64 {
        let model = pair.model.histogram().content();
        let data = pair.data.histogram().content();
        model
            .iter()
            .zip(data)
            .map(|(&mu, &n)| {
                let d2 = (n - mu) * (n - mu);
                if !self.poissonian_approximation {
                    d2
                } else if mu > 0.0 {
                    d2 / mu
                } else if d2 == 0.0 {
                    0.0
                } else {
                    f64::INFINITY
                }
            })
            .sum()
    }
}
