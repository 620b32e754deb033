//! Joint-probability strategies: the statistical term of one sample pair.
//!
//! Strategies are built by tag through a [`JointProbabilityRegistry`].

mod barlow;
mod least_squares;
mod poisson;

pub use barlow::BarlowLlh;
pub use least_squares::LeastSquares;
pub use poisson::PoissonLlh;

use crate::config::JointProbabilityConfig;
use crate::sample_pair::SamplePairView;
use ns_core::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Statistical comparison of binned model and data content.
pub trait JointProbability: Send + Sync + Debug {
    /// Registry tag
    fn type_tag(&self) -> &str;

    /// Prepare internal state before the first evaluation.
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once at the nominal point, right before the first evaluation.
    fn capture_nominal(&mut self, _pairs: &[SamplePairView<'_>]) -> Result<()> {
        Ok(())
    }

    /// Statistical term for one pair (non-negative; `+inf` when undefined).
    fn eval(&self, pair: &SamplePairView<'_>) -> f64;
}

/// Builds a strategy from its options block.
pub type JointProbabilityFactory = fn(&Value) -> Result<Box<dyn JointProbability>>;

/// Tag -> factory map.
#[derive(Debug, Clone)]
pub struct JointProbabilityRegistry {
    factories: BTreeMap<String, JointProbabilityFactory>,
}

impl Default for JointProbabilityRegistry {
    fn default() -> Self {
        let mut registry = Self { factories: BTreeMap::new() };
        registry.register("PoissonLLH", |v| Ok(Box::new(PoissonLlh::from_options(v)?)));
        registry.register("LeastSquares", |v| Ok(Box::new(LeastSquares::from_options(v)?)));
        registry.register("BarlowLLH", |v| Ok(Box::new(BarlowLlh::from_options(v)?)));
        registry
    }
}

impl JointProbabilityRegistry {
    /// Registry with no strategy at all.
    pub fn empty() -> Self {
        Self { factories: BTreeMap::new() }
    }

    /// Add (or replace) a factory.
    pub fn register(&mut self, tag: impl Into<String>, factory: JointProbabilityFactory) {
        self.factories.insert(tag.into(), factory);
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build the strategy named by `config.type_tag`. Unknown tags are fatal.
    pub fn make(&self, config: &JointProbabilityConfig) -> Result<Box<dyn JointProbability>> {
        let factory = self.factories.get(&config.type_tag).ok_or_else(|| {
            Error::UnknownJointProbability {
                tag: config.type_tag.clone(),
                known: self.tags().join(", "),
            }
        })?;
        factory(&config.options_value())
    }
}

pub(crate) fn parse_options<T: serde::de::DeserializeOwned>(tag: &str, options: &Value) -> Result<T> {
    serde_json::from_value(options.clone())
        .map_err(|e| Error::Config(format!("invalid {tag} options: {e}")))
}
