//! Propagator configuration schema and override merging.

use ns_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_true() -> bool {
    true
}

fn default_prior() -> f64 {
    1.0
}

fn default_debug_events() -> usize {
    5
}

/// Model (or data) propagator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagatorConfig {
    /// Parameter groups
    #[serde(default)]
    pub parameter_set_list: Vec<ParameterSetConfig>,
    /// Sample definitions
    #[serde(default)]
    pub sample_set_config: SampleSetConfig,
    /// Values injected on the model after the nominal evaluation.
    #[serde(default)]
    pub parameter_injector_mc: Option<ParameterInjection>,
    /// Dump the first loaded events before throwing toys.
    #[serde(default)]
    pub debug_print_loaded_events: bool,
    /// Number of events printed per dump.
    #[serde(default = "default_debug_events")]
    pub debug_print_loaded_events_nb_per_sample: usize,
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        Self {
            parameter_set_list: Vec::new(),
            sample_set_config: SampleSetConfig::default(),
            parameter_injector_mc: None,
            debug_print_loaded_events: false,
            debug_print_loaded_events_nb_per_sample: default_debug_events(),
        }
    }
}

impl PropagatorConfig {
    /// Parse from a JSON document.
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| Error::Config(format!("invalid propagator config: {e}")))
    }
}

/// One parameter group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSetConfig {
    /// Set name
    pub name: String,
    /// Disabled sets contribute neither dials nor penalty.
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    /// Fit in the eigenbasis of the prior covariance.
    #[serde(default)]
    pub use_eigen_decomposition: bool,
    /// Eigen parameters with `lambda / lambda_max` below this are fixed.
    #[serde(default)]
    pub eigen_value_threshold: Option<f64>,
    /// Prior covariance, row-major `N x N`.
    #[serde(default)]
    pub prior_covariance: Option<Vec<Vec<f64>>>,
    /// Parameters
    #[serde(default)]
    pub parameter_definitions: Vec<ParameterConfig>,
    /// Legacy: keep this set at prior when generating toys on the data side.
    #[serde(default)]
    pub mask_for_toy_generation: bool,
}

/// One fit parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterConfig {
    /// Parameter name
    pub name: String,
    /// Prior (nominal) value
    #[serde(default = "default_prior")]
    pub prior_value: f64,
    /// Prior width; defaults to `sqrt(cov[i][i])` when a covariance is given.
    #[serde(default)]
    pub std_dev: Option<f64>,
    /// Enabled flag
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    /// Fixed parameters are not exposed to the minimizer.
    #[serde(default)]
    pub is_fixed: bool,
    /// Free parameters have no prior constraint.
    #[serde(default)]
    pub is_free: bool,
    /// Lower bound
    #[serde(default)]
    pub min_value: Option<f64>,
    /// Upper bound
    #[serde(default)]
    pub max_value: Option<f64>,
    /// Dials driven by this parameter.
    #[serde(default)]
    pub dial_set_definitions: Vec<DialSetConfig>,
}

/// Dial response model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialType {
    /// Weight multiplier equals the parameter value.
    #[default]
    Normalization,
    /// Piecewise-linear response through `(xPoints, yPoints)`.
    Graph,
}

/// Dials attached to a parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialSetConfig {
    /// Response model
    #[serde(alias = "type")]
    pub dial_type: DialType,
    /// Sample names; empty means every sample.
    pub apply_on_samples: Vec<String>,
    /// Graph knots (x)
    pub x_points: Vec<f64>,
    /// Graph knots (y)
    pub y_points: Vec<f64>,
    /// Only events with the variable inside `[min, max)` get the dial.
    pub apply_condition: Option<VariableRange>,
}

/// Half-open interval on one event variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableRange {
    /// Event variable name
    pub variable: String,
    /// Inclusive lower edge
    pub min: f64,
    /// Exclusive upper edge
    pub max: f64,
}

impl VariableRange {
    /// True when `value` lies in `[min, max)`.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value < self.max
    }
}

/// Sample list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SampleSetConfig {
    /// Samples, in pairing order
    pub sample_list: Vec<SampleConfig>,
}

/// One analysis sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleConfig {
    /// Sample name
    pub name: String,
    /// Disabled samples are excluded from the stat likelihood.
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    /// Binning definition
    #[serde(default)]
    pub binning: BinningConfig,
}

/// Binning definition: either 1D `edges` or explicit multi-dimensional `bins`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BinningConfig {
    /// Variables the bins are defined on.
    pub variables: Vec<String>,
    /// Consecutive edges for a single variable.
    pub edges: Vec<f64>,
    /// One `[lo, hi)` pair per variable, per bin.
    pub bins: Vec<Vec<[f64; 2]>>,
}

/// Parameter values to inject, grouped by parameter set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterInjection {
    /// Per-set injections
    pub parameter_set_list: Vec<ParameterSetInjection>,
}

impl ParameterInjection {
    /// True when nothing would be injected.
    pub fn is_empty(&self) -> bool {
        self.parameter_set_list.is_empty()
    }
}

/// Injection for one parameter set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterSetInjection {
    /// Target set name
    pub name: String,
    /// Positional values (all parameters of the set, in order).
    pub parameter_values: Vec<f64>,
    /// Named values.
    pub parameter_list: Vec<NamedValue>,
}

/// `{ name, value }` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    /// Parameter name
    pub name: String,
    /// Value to assign
    pub value: f64,
}

/// Merge `patch` into `base`.
///
/// Objects merge key by key. Arrays whose elements are objects with a `name`
/// field merge element-wise by name, unmatched patch elements are appended.
/// Everything else is replaced.
pub fn merge_override(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(base_value) => merge_override(base_value, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (Value::Array(base_list), Value::Array(patch_list)) if is_named_list(patch_list) => {
            for patch_entry in patch_list {
                let name = patch_entry.get("name");
                match base_list.iter_mut().find(|entry| entry.get("name") == name) {
                    Some(base_entry) => merge_override(base_entry, patch_entry),
                    None => base_list.push(patch_entry.clone()),
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

fn is_named_list(list: &[Value]) -> bool {
    !list.is_empty() && list.iter().all(|v| v.get("name").is_some_and(Value::is_string))
}
