//! Parameters manager: owns every parameter set of one propagator.

use crate::config::{ParameterInjection, ParameterSetConfig};
use crate::parameter::{Parameter, ParameterSet};
use ns_core::{Error, Result};
use rand::Rng;

/// Which list of a set a [`ParameterRef`] points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    /// Physical parameter
    Original,
    /// Parameter of the eigenbasis
    Eigen,
}

/// Stable address of one parameter inside a [`ParametersManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterRef {
    /// Set index
    pub set: usize,
    /// Index inside the set's original or eigen list.
    pub index: usize,
    /// List kind
    pub kind: ParameterKind,
}

/// Owner of all parameter sets.
#[derive(Debug, Clone, Default)]
pub struct ParametersManager {
    sets: Vec<ParameterSet>,
}

impl ParametersManager {
    /// Build every set from configuration.
    pub fn from_config(configs: &[ParameterSetConfig]) -> Result<Self> {
        let sets = configs
            .iter()
            .enumerate()
            .map(|(i, cfg)| ParameterSet::from_config(cfg, i))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { sets })
    }

    /// Parameter sets in configuration order.
    pub fn sets(&self) -> &[ParameterSet] {
        &self.sets
    }

    /// Mutable parameter sets.
    pub fn sets_mut(&mut self) -> &mut [ParameterSet] {
        &mut self.sets
    }

    /// Look up a set by name.
    pub fn set_by_name(&self, name: &str) -> Option<&ParameterSet> {
        self.sets.iter().find(|s| s.name() == name)
    }

    /// Look up a set by name (mutable).
    pub fn set_by_name_mut(&mut self, name: &str) -> Option<&mut ParameterSet> {
        self.sets.iter_mut().find(|s| s.name() == name)
    }

    /// Reset every parameter of every set to its prior.
    pub fn move_parameters_to_prior(&mut self) {
        for set in &mut self.sets {
            set.move_to_prior();
        }
    }

    /// Assign injected values. Unknown set names are fatal.
    pub fn inject_parameter_values(&mut self, injection: &ParameterInjection) -> Result<()> {
        for set_injection in &injection.parameter_set_list {
            let set = self.set_by_name_mut(&set_injection.name).ok_or_else(|| {
                Error::Config(format!(
                    "cannot inject values: no parameter set named \"{}\"",
                    set_injection.name
                ))
            })?;
            set.inject(set_injection)?;
        }
        Ok(())
    }

    /// Throw every enabled, unmasked set from its prior.
    pub fn throw_parameters<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        for set in &mut self.sets {
            set.throw_parameters(rng)?;
        }
        Ok(())
    }

    /// Push eigen parameter values onto the original parameters.
    pub fn propagate_eigen(&mut self) {
        for set in self.sets.iter_mut().filter(|s| s.is_eigen_decomposed()) {
            set.propagate_eigen_to_original();
        }
    }

    /// Copy values from a manager with the same set layout.
    pub fn copy_values_from(&mut self, other: &ParametersManager) {
        for (dst, src) in self.sets.iter_mut().zip(&other.sets) {
            dst.copy_values_from(src);
        }
    }

    /// Enabled, non-fixed parameters the minimizer drives, in a stable order.
    ///
    /// Eigen-decomposed sets contribute their eigen parameters instead of the
    /// originals.
    pub fn effective_parameters(&self) -> Vec<ParameterRef> {
        let mut refs = Vec::new();
        for (set_index, set) in self.sets.iter().enumerate().filter(|(_, s)| s.is_enabled()) {
            let kind = if set.is_eigen_decomposed() {
                ParameterKind::Eigen
            } else {
                ParameterKind::Original
            };
            refs.extend(
                set.effective_parameters()
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.is_effective())
                    .map(|(index, _)| ParameterRef { set: set_index, index, kind }),
            );
        }
        refs
    }

    /// Resolve a reference.
    pub fn parameter(&self, r: ParameterRef) -> Option<&Parameter> {
        let set = self.sets.get(r.set)?;
        match r.kind {
            ParameterKind::Original => set.parameters().get(r.index),
            ParameterKind::Eigen => set.eigen_parameters().get(r.index),
        }
    }

    /// Assign a value through a reference.
    pub fn set_parameter_value(&mut self, r: ParameterRef, value: f64) -> Result<()> {
        let set = self
            .sets
            .get_mut(r.set)
            .ok_or_else(|| Error::Validation(format!("parameter set index {} out of range", r.set)))?;
        let list = match r.kind {
            ParameterKind::Original if !set.is_eigen_decomposed() => set.parameters_mut(),
            ParameterKind::Original => {
                return Err(Error::Validation(format!(
                    "parameter set \"{}\" is driven by its eigen parameters",
                    set.name()
                )));
            }
            ParameterKind::Eigen => set.effective_parameters_mut(),
        };
        let par = list.get_mut(r.index).ok_or_else(|| {
            Error::Validation(format!("parameter index {} out of range", r.index))
        })?;
        par.set_value(value);
        Ok(())
    }

    /// Total number of original parameters.
    pub fn n_parameters(&self) -> usize {
        self.sets.iter().map(ParameterSet::n_parameters).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NamedValue, ParameterSetInjection};
    use serde_json::json;

    fn manager() -> ParametersManager {
        let configs: Vec<ParameterSetConfig> = serde_json::from_value(json!([
            {
                "name": "flux",
                "parameterDefinitions": [
                    { "name": "f0", "stdDev": 0.1 },
                    { "name": "f1", "stdDev": 0.1, "isFixed": true }
                ]
            },
            {
                "name": "xsec",
                "useEigenDecomposition": true,
                "priorCovariance": [[0.04, 0.0], [0.0, 0.01]],
                "parameterDefinitions": [{ "name": "x0" }, { "name": "x1" }]
            },
            {
                "name": "off",
                "isEnabled": false,
                "parameterDefinitions": [{ "name": "o0", "stdDev": 1.0 }]
            }
        ]))
        .unwrap();
        ParametersManager::from_config(&configs).unwrap()
    }

    #[test]
    fn test_effective_parameters_enumeration() {
        let m = manager();
        let refs = m.effective_parameters();
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0], ParameterRef { set: 0, index: 0, kind: ParameterKind::Original });
        assert_eq!(refs[1].kind, ParameterKind::Eigen);
        assert_eq!(refs, m.effective_parameters());
    }

    #[test]
    fn test_inject_unknown_set_is_fatal() {
        let mut m = manager();
        let injection = ParameterInjection {
            parameter_set_list: vec![ParameterSetInjection {
                name: "nope".into(),
                ..Default::default()
            }],
        };
        assert!(matches!(m.inject_parameter_values(&injection), Err(Error::Config(_))));
    }

    #[test]
    fn test_inject_then_read_back() {
        let mut m = manager();
        let injection = ParameterInjection {
            parameter_set_list: vec![ParameterSetInjection {
                name: "flux".into(),
                parameter_values: vec![],
                parameter_list: vec![NamedValue { name: "f0".into(), value: 1.234 }],
            }],
        };
        m.inject_parameter_values(&injection).unwrap();
        assert_eq!(m.sets()[0].parameters()[0].value(), 1.234);
        m.move_parameters_to_prior();
        assert_eq!(m.sets()[0].parameters()[0].value(), 1.0);
    }

    #[test]
    fn test_set_value_on_eigen_set_requires_eigen_ref() {
        let mut m = manager();
        let original = ParameterRef { set: 1, index: 0, kind: ParameterKind::Original };
        assert!(m.set_parameter_value(original, 2.0).is_err());
        let eigen = ParameterRef { set: 1, index: 0, kind: ParameterKind::Eigen };
        m.set_parameter_value(eigen, 2.0).unwrap();
        assert_eq!(m.parameter(eigen).unwrap().value(), 2.0);
    }
}
