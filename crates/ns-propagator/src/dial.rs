//! Dials: per-event weight responses to parameter values.

use crate::config::{DialSetConfig, DialType, VariableRange};
use crate::event::Event;
use crate::manager::ParametersManager;
use crate::sample::SampleSet;
use ns_core::{Error, Result};

/// Response model of one dial.
#[derive(Debug, Clone, PartialEq)]
pub enum DialKind {
    /// Response equals the parameter value.
    Normalization,
    /// Linear interpolation through knots, flat outside.
    Graph {
        /// Strictly increasing knot abscissae
        x: Vec<f64>,
        /// Knot responses
        y: Vec<f64>,
    },
}

impl DialKind {
    fn from_config(cfg: &DialSetConfig) -> Result<Self> {
        match cfg.dial_type {
            DialType::Normalization => Ok(DialKind::Normalization),
            DialType::Graph => {
                if cfg.x_points.len() != cfg.y_points.len() || cfg.x_points.is_empty() {
                    return Err(Error::Config(format!(
                        "graph dial needs matching, non-empty xPoints/yPoints ({} vs {})",
                        cfg.x_points.len(),
                        cfg.y_points.len()
                    )));
                }
                if cfg.x_points.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(Error::Config("graph dial xPoints must be strictly increasing".into()));
                }
                Ok(DialKind::Graph { x: cfg.x_points.clone(), y: cfg.y_points.clone() })
            }
        }
    }

    /// Weight multiplier at `value`, floored at zero.
    pub fn response(&self, value: f64) -> f64 {
        let r = match self {
            DialKind::Normalization => value,
            DialKind::Graph { x, y } => {
                let last = x.len() - 1;
                if value <= x[0] {
                    y[0]
                } else if value >= x[last] {
                    y[last]
                } else {
                    let k = x.partition_point(|&xi| xi <= value) - 1;
                    let t = (value - x[k]) / (x[k + 1] - x[k]);
                    y[k] + t * (y[k + 1] - y[k])
                }
            }
        };
        r.max(0.0)
    }
}

/// All dials one parameter defines, with their applicability rules.
#[derive(Debug, Clone)]
pub struct DialCollection {
    /// Parameter set index
    pub set: usize,
    /// Original parameter index inside the set
    pub parameter: usize,
    /// Response model
    pub kind: DialKind,
    apply_on_samples: Vec<String>,
    condition: Option<VariableRange>,
}

impl DialCollection {
    /// Build every collection declared by enabled parameter sets.
    pub fn build_all(parameters: &ParametersManager) -> Result<Vec<DialCollection>> {
        let mut collections = Vec::new();
        for (set_index, set) in parameters.sets().iter().enumerate().filter(|(_, s)| s.is_enabled()) {
            for (par_index, cfg) in set.dial_definitions() {
                if !set.parameters()[*par_index].is_enabled() {
                    continue;
                }
                collections.push(DialCollection {
                    set: set_index,
                    parameter: *par_index,
                    kind: DialKind::from_config(cfg)?,
                    apply_on_samples: cfg.apply_on_samples.clone(),
                    condition: cfg.apply_condition.clone(),
                });
            }
        }
        Ok(collections)
    }

    /// Whether the dial applies to `event` of sample `sample`.
    pub fn applies_to(&self, sample: &str, event: &Event) -> bool {
        let sample_ok =
            self.apply_on_samples.is_empty() || self.apply_on_samples.iter().any(|s| s == sample);
        let condition_ok = match &self.condition {
            Some(range) => event.variable(&range.variable).is_some_and(|v| range.contains(v)),
            None => true,
        };
        sample_ok && condition_ok
    }

    /// Current response for the parameter this collection reads.
    pub fn response(&self, parameters: &ParametersManager) -> f64 {
        let value = parameters.sets()[self.set].parameters()[self.parameter].value();
        self.kind.response(value)
    }
}

/// For every sample and event, the dial collections that act on it.
#[derive(Debug, Clone, Default)]
pub struct EventDialCache {
    entries: Vec<Vec<Vec<usize>>>,
}

impl EventDialCache {
    /// Evaluate applicability of every collection for every event.
    pub fn build(samples: &SampleSet, collections: &[DialCollection]) -> Self {
        let entries = samples
            .samples()
            .iter()
            .map(|sample| {
                sample
                    .events()
                    .iter()
                    .map(|event| {
                        if event.is_data {
                            return Vec::new();
                        }
                        collections
                            .iter()
                            .enumerate()
                            .filter(|(_, c)| c.applies_to(sample.name(), event))
                            .map(|(i, _)| i)
                            .collect()
                    })
                    .collect()
            })
            .collect();
        Self { entries }
    }

    /// Collections acting on one event (empty when outside the cache).
    pub fn dials_for(&self, sample: usize, event: usize) -> &[usize] {
        self.entries
            .get(sample)
            .and_then(|s| s.get(event))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Per-sample slices, parallel to the sample list.
    pub fn per_sample(&self) -> &[Vec<Vec<usize>>] {
        &self.entries
    }

    /// Release spare capacity.
    pub fn shrink(&mut self) {
        for sample in &mut self.entries {
            for event in sample.iter_mut() {
                event.shrink_to_fit();
            }
            sample.shrink_to_fit();
        }
        self.entries.shrink_to_fit();
    }

    /// Total number of (event, dial) links.
    pub fn n_links(&self) -> usize {
        self.entries.iter().flatten().map(Vec::len).sum()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
