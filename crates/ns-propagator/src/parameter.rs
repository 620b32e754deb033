//! Fit parameters and parameter sets.

use crate::config::{DialSetConfig, ParameterConfig, ParameterSetConfig, ParameterSetInjection};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use ns_core::{Error, Result};
use rand::Rng;
use rand_distr::StandardNormal;

/// A single fit parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    index: usize,
    value: f64,
    prior_value: f64,
    std_dev: f64,
    bounds: (f64, f64),
    enabled: bool,
    fixed: bool,
    free: bool,
    updated: bool,
}

impl Parameter {
    /// Enabled, unbounded, constrained parameter sitting at its prior.
    pub fn new(name: impl Into<String>, index: usize, prior_value: f64, std_dev: f64) -> Self {
        Self {
            name: name.into(),
            index,
            value: prior_value,
            prior_value,
            std_dev,
            bounds: (f64::NEG_INFINITY, f64::INFINITY),
            enabled: true,
            fixed: false,
            free: false,
            updated: false,
        }
    }

    fn from_config(cfg: &ParameterConfig, index: usize, cov_diag: Option<f64>) -> Result<Self> {
        let std_dev = cfg.std_dev.or(cov_diag.map(f64::sqrt));
        let free = cfg.is_free || std_dev.is_none();
        let std_dev = std_dev.unwrap_or(1.0);
        if !(std_dev.is_finite() && std_dev > 0.0) {
            return Err(Error::Config(format!(
                "parameter \"{}\": stdDev must be finite and > 0, got {std_dev}",
                cfg.name
            )));
        }
        let mut par = Parameter::new(cfg.name.clone(), index, cfg.prior_value, std_dev);
        par.bounds = (
            cfg.min_value.unwrap_or(f64::NEG_INFINITY),
            cfg.max_value.unwrap_or(f64::INFINITY),
        );
        par.enabled = cfg.is_enabled;
        par.fixed = cfg.is_fixed;
        par.free = free;
        Ok(par)
    }

    /// Parameter name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position inside the owning set.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current value
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Prior (nominal) value
    pub fn prior_value(&self) -> f64 {
        self.prior_value
    }

    /// Prior width
    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }

    /// `(min, max)`; infinite when unbounded.
    pub fn bounds(&self) -> (f64, f64) {
        self.bounds
    }

    /// Enabled flag
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fixed flag
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// True when the parameter has no prior constraint.
    pub fn is_free(&self) -> bool {
        self.free
    }

    /// Enabled and not fixed: exposed to the minimizer.
    pub fn is_effective(&self) -> bool {
        self.enabled && !self.fixed
    }

    /// Set the value, remembering whether it changed.
    pub fn set_value(&mut self, value: f64) {
        self.updated = value != self.value;
        self.value = value;
    }

    /// Set the fixed flag.
    pub fn set_fixed(&mut self, fixed: bool) {
        self.fixed = fixed;
    }

    /// Set the enabled flag.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the last `set_value` moved the parameter.
    pub fn got_updated(&self) -> bool {
        self.updated
    }

    /// Reset to the prior value.
    pub fn move_to_prior(&mut self) {
        self.set_value(self.prior_value);
    }

    /// Real value -> normalized space `(x - prior) / sigma`.
    pub fn to_normalized(&self, value: f64) -> f64 {
        (value - self.prior_value) / self.std_dev
    }

    /// Normalized space -> real value.
    pub fn to_real(&self, normalized: f64) -> f64 {
        self.prior_value + normalized * self.std_dev
    }
}

/// Eigenbasis of a prior covariance matrix.
#[derive(Debug, Clone)]
pub struct EigenBasis {
    /// Columns are the eigenvectors.
    vectors: DMatrix<f64>,
    eigen_values: DVector<f64>,
    parameters: Vec<Parameter>,
}

impl EigenBasis {
    fn new(
        set_name: &str,
        covariance: &DMatrix<f64>,
        originals: &[Parameter],
        threshold: Option<f64>,
    ) -> Result<Self> {
        let eigen = SymmetricEigen::new(covariance.clone());
        let lambda_max = eigen.eigenvalues.iter().fold(0.0_f64, |a, &b| a.max(b));
        if lambda_max <= 0.0 {
            return Err(Error::Computation(format!(
                "parameter set \"{set_name}\": covariance has no positive eigenvalue"
            )));
        }

        let prior = DVector::from_iterator(originals.len(), originals.iter().map(|p| p.prior_value));
        let current = DVector::from_iterator(originals.len(), originals.iter().map(|p| p.value));
        let prior_eigen = eigen.eigenvectors.transpose() * &prior;
        let current_eigen = eigen.eigenvectors.transpose() * &current;

        let mut parameters = Vec::with_capacity(originals.len());
        for (i, &lambda) in eigen.eigenvalues.iter().enumerate() {
            let below_threshold = threshold.is_some_and(|thr| lambda / lambda_max < thr);
            let mut par = Parameter::new(
                format!("{set_name}_eigen#{i}"),
                i,
                prior_eigen[i],
                lambda.max(f64::MIN_POSITIVE).sqrt(),
            );
            par.value = current_eigen[i];
            if lambda <= 0.0 || below_threshold {
                par.fixed = true;
            }
            parameters.push(par);
        }

        Ok(Self { vectors: eigen.eigenvectors, eigen_values: eigen.eigenvalues, parameters })
    }

    /// Eigenvalues, in the same order as the eigen parameters.
    pub fn eigen_values(&self) -> &DVector<f64> {
        &self.eigen_values
    }

    /// Eigen parameters
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }
}

/// Named group of parameters sharing a prior covariance.
#[derive(Debug, Clone)]
pub struct ParameterSet {
    name: String,
    index: usize,
    enabled: bool,
    mask_for_toy_generation: bool,
    masked: bool,
    parameters: Vec<Parameter>,
    prior_covariance: Option<DMatrix<f64>>,
    eigen: Option<EigenBasis>,
    stripped_indices: Vec<usize>,
    inverse_stripped_covariance: Option<DMatrix<f64>>,
    dial_definitions: Vec<(usize, DialSetConfig)>,
}

impl ParameterSet {
    /// Build from its configuration block.
    pub fn from_config(cfg: &ParameterSetConfig, index: usize) -> Result<Self> {
        let n = cfg.parameter_definitions.len();
        let prior_covariance = match &cfg.prior_covariance {
            Some(rows) => {
                if rows.len() != n || rows.iter().any(|r| r.len() != n) {
                    return Err(Error::Config(format!(
                        "parameter set \"{}\": covariance must be {n}x{n} (got {} rows)",
                        cfg.name,
                        rows.len()
                    )));
                }
                Some(DMatrix::from_fn(n, n, |i, j| rows[i][j]))
            }
            None => None,
        };

        let mut parameters = Vec::with_capacity(n);
        let mut dial_definitions = Vec::new();
        for (i, par_cfg) in cfg.parameter_definitions.iter().enumerate() {
            let cov_diag = prior_covariance.as_ref().map(|c| c[(i, i)]);
            parameters.push(Parameter::from_config(par_cfg, i, cov_diag)?);
            for dial in &par_cfg.dial_set_definitions {
                dial_definitions.push((i, dial.clone()));
            }
        }

        let eigen = if cfg.use_eigen_decomposition {
            let cov = prior_covariance.as_ref().ok_or_else(|| {
                Error::Config(format!(
                    "parameter set \"{}\": eigen decomposition requires a prior covariance",
                    cfg.name
                ))
            })?;
            Some(EigenBasis::new(&cfg.name, cov, &parameters, cfg.eigen_value_threshold)?)
        } else {
            None
        };

        let mut set = Self {
            name: cfg.name.clone(),
            index,
            enabled: cfg.is_enabled,
            mask_for_toy_generation: cfg.mask_for_toy_generation,
            masked: false,
            parameters,
            prior_covariance,
            eigen,
            stripped_indices: Vec::new(),
            inverse_stripped_covariance: None,
            dial_definitions,
        };
        set.refresh_stripped_covariance()?;
        Ok(set)
    }

    /// Set name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position inside the manager.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Enabled flag
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Set the enabled flag.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// True when fitting in the eigenbasis.
    pub fn is_eigen_decomposed(&self) -> bool {
        self.eigen.is_some()
    }

    /// Legacy toy mask from the configuration.
    pub fn is_mask_for_toy_generation(&self) -> bool {
        self.mask_for_toy_generation
    }

    /// True once [`ParameterSet::nullify`] was called.
    pub fn is_masked(&self) -> bool {
        self.masked
    }

    /// Original (physical) parameters
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Mutable original parameters
    pub fn parameters_mut(&mut self) -> &mut [Parameter] {
        &mut self.parameters
    }

    /// Number of original parameters
    pub fn n_parameters(&self) -> usize {
        self.parameters.len()
    }

    /// Eigen parameters (empty without eigen decomposition).
    pub fn eigen_parameters(&self) -> &[Parameter] {
        self.eigen.as_ref().map(|e| e.parameters.as_slice()).unwrap_or(&[])
    }

    /// Eigenbasis, when enabled.
    pub fn eigen_basis(&self) -> Option<&EigenBasis> {
        self.eigen.as_ref()
    }

    /// Parameters the minimizer drives: eigen parameters when decomposed.
    pub fn effective_parameters(&self) -> &[Parameter] {
        match &self.eigen {
            Some(eigen) => &eigen.parameters,
            None => &self.parameters,
        }
    }

    /// Mutable view of [`ParameterSet::effective_parameters`].
    pub fn effective_parameters_mut(&mut self) -> &mut [Parameter] {
        match &mut self.eigen {
            Some(eigen) => &mut eigen.parameters,
            None => &mut self.parameters,
        }
    }

    /// Prior covariance, if any.
    pub fn prior_covariance(&self) -> Option<&DMatrix<f64>> {
        self.prior_covariance.as_ref()
    }

    /// Inverse covariance restricted to enabled, non-fixed, constrained parameters.
    pub fn inverse_stripped_covariance(&self) -> Option<&DMatrix<f64>> {
        self.inverse_stripped_covariance.as_ref()
    }

    /// Original-parameter indices kept in the stripped covariance.
    pub fn stripped_indices(&self) -> &[usize] {
        &self.stripped_indices
    }

    /// `value - prior` over the stripped parameters.
    pub fn delta_vector(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.stripped_indices.len(),
            self.stripped_indices.iter().map(|&i| {
                let p = &self.parameters[i];
                p.value - p.prior_value
            }),
        )
    }

    /// Dial definitions as `(parameter index, definition)`.
    pub fn dial_definitions(&self) -> &[(usize, DialSetConfig)] {
        &self.dial_definitions
    }

    /// Fix or release an original parameter and rebuild the stripped covariance.
    pub fn set_parameter_fixed(&mut self, index: usize, fixed: bool) -> Result<()> {
        let n = self.parameters.len();
        let par = self.parameters.get_mut(index).ok_or_else(|| {
            Error::Validation(format!("parameter index {index} out of range (len={n})"))
        })?;
        par.set_fixed(fixed);
        self.refresh_stripped_covariance()
    }

    /// Recompute the inverse of the covariance restricted to the constrained parameters.
    pub fn refresh_stripped_covariance(&mut self) -> Result<()> {
        self.stripped_indices = self
            .parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.enabled && !p.fixed && !p.free)
            .map(|(i, _)| i)
            .collect();

        self.inverse_stripped_covariance = match &self.prior_covariance {
            Some(cov) if !self.stripped_indices.is_empty() => {
                let stripped =
                    cov.select_rows(&self.stripped_indices).select_columns(&self.stripped_indices);
                let inverse = match stripped.clone().cholesky() {
                    Some(chol) => chol.inverse(),
                    None => stripped.try_inverse().ok_or_else(|| {
                        Error::Computation(format!(
                            "parameter set \"{}\": stripped covariance is singular",
                            self.name
                        ))
                    })?,
                };
                Some(inverse)
            }
            _ => None,
        };
        Ok(())
    }

    /// Move every parameter (original and eigen) to its prior.
    pub fn move_to_prior(&mut self) {
        for par in &mut self.parameters {
            par.move_to_prior();
        }
        if let Some(eigen) = &mut self.eigen {
            for par in &mut eigen.parameters {
                par.move_to_prior();
            }
        }
    }

    /// Move to prior and exclude the set from toy throws.
    pub fn nullify(&mut self) {
        self.move_to_prior();
        self.masked = true;
    }

    /// `x = V e`: push eigen values onto the original parameters.
    pub fn propagate_eigen_to_original(&mut self) {
        let Some(eigen) = &self.eigen else { return };
        let e = DVector::from_iterator(
            eigen.parameters.len(),
            eigen.parameters.iter().map(|p| p.value),
        );
        let x = &eigen.vectors * e;
        for (par, &value) in self.parameters.iter_mut().zip(x.iter()) {
            par.set_value(value);
        }
    }

    /// `e = V^T x`: pull original values into the eigenbasis.
    pub fn propagate_original_to_eigen(&mut self) {
        let Some(eigen) = &mut self.eigen else { return };
        let x = DVector::from_iterator(
            self.parameters.len(),
            self.parameters.iter().map(|p| p.value),
        );
        let e = eigen.vectors.transpose() * x;
        for (par, &value) in eigen.parameters.iter_mut().zip(e.iter()) {
            par.set_value(value);
        }
    }

    /// Assign injected values.
    pub fn inject(&mut self, injection: &ParameterSetInjection) -> Result<()> {
        if !injection.parameter_values.is_empty() {
            if injection.parameter_values.len() != self.parameters.len() {
                return Err(Error::Config(format!(
                    "parameter set \"{}\": injecting {} values into {} parameters",
                    self.name,
                    injection.parameter_values.len(),
                    self.parameters.len()
                )));
            }
            for (par, &value) in self.parameters.iter_mut().zip(&injection.parameter_values) {
                par.set_value(value);
            }
        }
        for named in &injection.parameter_list {
            let par =
                self.parameters.iter_mut().find(|p| p.name == named.name).ok_or_else(|| {
                    Error::Config(format!(
                        "parameter set \"{}\": no parameter named \"{}\" to inject",
                        self.name, named.name
                    ))
                })?;
            par.set_value(named.value);
        }
        self.propagate_original_to_eigen();
        Ok(())
    }

    /// Draw a random parameter vector from the prior.
    ///
    /// Correlated through the Cholesky factor of the covariance when present,
    /// independent per parameter otherwise. Fixed, disabled and free
    /// parameters keep their value.
    pub fn throw_parameters<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        if !self.enabled || self.masked {
            return Ok(());
        }

        if let Some(eigen) = &mut self.eigen {
            for par in eigen.parameters.iter_mut().filter(|p| p.is_effective()) {
                let z: f64 = rng.sample(StandardNormal);
                par.set_value(par.prior_value + par.std_dev * z);
            }
            self.propagate_eigen_to_original();
            return Ok(());
        }

        match &self.prior_covariance {
            Some(cov) if !self.stripped_indices.is_empty() => {
                let stripped =
                    cov.select_rows(&self.stripped_indices).select_columns(&self.stripped_indices);
                let chol = stripped.cholesky().ok_or_else(|| {
                    Error::Computation(format!(
                        "parameter set \"{}\": covariance is not positive definite, can't throw",
                        self.name
                    ))
                })?;
                let z = DVector::from_iterator(
                    self.stripped_indices.len(),
                    (0..self.stripped_indices.len()).map(|_| rng.sample::<f64, _>(StandardNormal)),
                );
                let delta = chol.l() * z;
                for (k, &i) in self.stripped_indices.iter().enumerate() {
                    let par = &mut self.parameters[i];
                    par.set_value(par.prior_value + delta[k]);
                }
            }
            _ => {
                for par in self.parameters.iter_mut().filter(|p| p.is_effective() && !p.free) {
                    let z: f64 = rng.sample(StandardNormal);
                    par.set_value(par.prior_value + par.std_dev * z);
                }
            }
        }
        Ok(())
    }

    /// Copy current values from a structurally identical set.
    pub fn copy_values_from(&mut self, other: &ParameterSet) {
        for (dst, src) in self.parameters.iter_mut().zip(&other.parameters) {
            dst.value = src.value;
        }
        if let (Some(dst), Some(src)) = (&mut self.eigen, &other.eigen) {
            for (d, s) in dst.parameters.iter_mut().zip(&src.parameters) {
                d.value = s.value;
            }
        }
    }
}
