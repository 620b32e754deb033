//! Likelihood engine configuration.

use crate::migration::{Migration, apply_migrations};
use ns_core::{DataType, Error, Result};
use ns_propagator::{DatasetConfig, ParameterInjection};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default joint-probability tag.
pub const DEFAULT_JOINT_PROBABILITY: &str = "PoissonLLH";

fn default_true() -> bool {
    true
}

fn default_history() -> usize {
    256
}

fn default_tag() -> String {
    DEFAULT_JOINT_PROBABILITY.to_string()
}

/// `jointProbabilityConfig` block: a type tag plus strategy options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointProbabilityConfig {
    /// Strategy tag
    #[serde(rename = "type", default = "default_tag")]
    pub type_tag: String,
    /// Remaining keys, handed to the strategy factory.
    #[serde(flatten)]
    pub options: serde_json::Map<String, Value>,
}

impl Default for JointProbabilityConfig {
    fn default() -> Self {
        Self { type_tag: default_tag(), options: serde_json::Map::new() }
    }
}

impl JointProbabilityConfig {
    /// Options as a JSON object.
    pub fn options_value(&self) -> Value {
        Value::Object(self.options.clone())
    }
}

/// Engine document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikelihoodConfig {
    /// Model propagator configuration.
    pub propagator_config: Value,
    /// Datasets
    #[serde(default)]
    pub data_set_list: Vec<DatasetConfig>,
    /// Legacy dataset manager block; its `dataSetList` is used when the top-level one is empty.
    #[serde(default, alias = "dataSetManagerConfig")]
    pub dataset_manager_config: Option<Value>,
    /// Statistical term
    #[serde(default)]
    pub joint_probability_config: JointProbabilityConfig,
    /// Throw parameters on the model before copying it as toy data.
    #[serde(default)]
    pub throw_asimov_fit_parameters: bool,
    /// Statistical throws in toy mode.
    #[serde(default = "default_true")]
    pub enable_stat_throw_in_toys: bool,
    /// Gaussian instead of Poisson bin throws.
    #[serde(default)]
    pub gauss_stat_throw_in_toys: bool,
    /// Per-event MC statistical throw before the bin throw.
    #[serde(default = "default_true")]
    pub enable_event_mc_throw: bool,
    /// Forwarded verbatim to the plot generator.
    #[serde(default)]
    pub plot_generator_config: Option<Value>,
    /// Data side
    #[serde(default)]
    pub data_type: DataType,
    /// Copy the model as data whatever the data type.
    #[serde(default)]
    pub force_asimov_data: bool,
    /// Fixed toy parameters, used instead of a random throw.
    #[serde(default)]
    pub toy_parameter_injector: Option<ParameterInjection>,
    /// Minimizer works in `(x - prior) / sigma` units.
    #[serde(default)]
    pub use_normalized_fit_space: bool,
    /// Capacity of the convergence monitor history.
    #[serde(default = "default_history")]
    pub monitor_history_size: usize,
    /// Minimum version required by the document.
    #[serde(default, alias = "minGundamVersion")]
    pub min_version: Option<String>,
}

impl LikelihoodConfig {
    /// Relocate deprecated keys, then parse.
    pub fn from_value(document: &Value) -> Result<Self> {
        Self::from_value_with_migrations(document).map(|(cfg, _)| cfg)
    }

    /// Same as [`LikelihoodConfig::from_value`], also returning the relocations applied.
    pub fn from_value_with_migrations(
        document: &Value,
    ) -> Result<(Self, Vec<&'static Migration>)> {
        if !document.is_object() {
            return Err(Error::Config("likelihood configuration must be an object".into()));
        }
        let mut doc = document.clone();
        let applied = apply_migrations(&mut doc);
        if doc.get("propagatorConfig").is_none() {
            return Err(Error::Config("missing \"propagatorConfig\"".into()));
        }

        let mut cfg: LikelihoodConfig = serde_json::from_value(doc)
            .map_err(|e| Error::Config(format!("invalid likelihood config: {e}")))?;

        if cfg.data_set_list.is_empty()
            && let Some(list) = cfg.dataset_manager_config.as_ref().and_then(|m| m.get("dataSetList"))
        {
            cfg.data_set_list = serde_json::from_value(list.clone())
                .map_err(|e| Error::Config(format!("invalid dataSetManagerConfig/dataSetList: {e}")))?;
        }

        if let Some(min) = &cfg.min_version
            && !ns_core::version::check_min_version(min)?
        {
            return Err(Error::Config(format!(
                "configuration requires version {min}, running {}",
                ns_core::VERSION
            )));
        }
        Ok((cfg, applied))
    }

    /// Plot generator block, forwarded untouched.
    pub fn plot_generator_config(&self) -> Option<&Value> {
        self.plot_generator_config.as_ref()
    }
}
