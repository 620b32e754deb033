use super::{JointProbability, PoissonLlh, parse_options};
use crate::sample_pair::SamplePairView;
use ns_core::Result;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BarlowOptions {
    use_nominal_mc_error: bool,
}

/// Poisson likelihood with a per-bin Barlow-Beeston nuisance `beta`,
/// profiled analytically (Conway's approximation).
///
/// The MC statistical error is read from the model's sum of squared weights,
/// or frozen at the nominal point with `useNominalMcError`.
#[derive(Debug, Clone, Default)]
pub struct BarlowLlh {
    use_nominal_mc_error: bool,
    /// Relative MC variance per sample index, per bin.
    nominal_rel_var: Vec<Option<Vec<f64>>>,
    poisson: PoissonLlh,
}

impl BarlowLlh {
    /// Build from an options block.
    pub fn from_options(options: &Value) -> Result<Self> {
        let opts: BarlowOptions = parse_options("BarlowLLH", options)?;
        Ok(Self { use_nominal_mc_error: opts.use_nominal_mc_error, ..Self::default() })
    }

    fn rel_var(content: f64, sum_w2: f64) -> f64 {
        if content > 0.0 { sum_w2 / (content * content) } else { 0.0 }
    }

    /// Contribution of one bin given the relative MC variance.
    pub fn bin_term(&self, expected: f64, observed: f64, rel_var: f64) -> f64 {
        if expected <= 0.0 || rel_var <= 0.0 {
            return self.poisson.bin_term(expected, observed);
        }
        let b = expected * rel_var - 1.0;
        let beta = 0.5 * (-b + (b * b + 4.0 * observed * rel_var).sqrt());
        let mu_beta = expected * beta;
        let stat = if observed > 0.0 {
            if mu_beta <= 0.0 {
                return f64::INFINITY;
            }
            2.0 * (mu_beta - observed + observed * (observed / mu_beta).ln())
        } else {
            2.0 * mu_beta
        };
        stat + (beta - 1.0) * (beta - 1.0) / rel_var
    }
}

impl JointProbability for BarlowLlh {
    fn type_tag(&self) -> &str {
        "BarlowLLH"
    }

    fn capture_nominal(&mut self, pairs: &[SamplePairView<'_>]) -> Result<()> {
        if !self.use_nominal_mc_error {
            return Ok(());
        }
        self.nominal_rel_var.clear();
        for pair in pairs {
            if self.nominal_rel_var.len() <= pair.index {
                self.nominal_rel_var.resize(pair.index + 1, None);
            }
            let hist = pair.model.histogram();
            let rel: Vec<f64> =
                hist.content().iter().zip(hist.sum_w2()).map(|(&c, &w2)| Self::rel_var(c, w2)).collect();
            self.nominal_rel_var[pair.index] = Some(rel);
        }
        log::debug!("BarlowLLH: nominal MC errors captured for {} sample pairs", pairs.len());
        Ok(())
    }

    fn eval(&self, pair: &SamplePairView<'_>) -> f64 {
        let hist = pair.model.histogram();
        let data = pair.data.histogram().content();
        let nominal = if self.use_nominal_mc_error {
            self.nominal_rel_var.get(pair.index).and_then(Option::as_ref)
        } else {
            None
        };
        hist.content()
            .iter()
            .zip(data)
            .enumerate()
            .map(|(bin, (&mu, &n))| {
                let rel_var = match nominal {
                    Some(rel) => rel.get(bin).copied().unwrap_or(0.0),
                    None => Self::rel_var(mu, hist.sum_w2()[bin]),
                };
                self.bin_term(mu, n, rel_var)
            })
            .sum()
    }
}
