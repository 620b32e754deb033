//! Core traits
//!
//! The engine exposes its goodness-of-fit as an [`ObjectiveFunction`]; the
//! minimizer that consumes it lives outside this workspace.

use crate::Result;

/// Objective function boundary between the likelihood engine and a minimizer.
///
/// The input vector has one entry per enabled, non-fixed parameter, in the
/// engine's stable enumeration order.
pub trait ObjectiveFunction: Send + Sync {
    /// Number of entries expected in the parameter vector.
    fn dim(&self) -> usize;

    /// Evaluate function at given parameters
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Compute gradient at given parameters (numerical if not overridden)
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        // Default: central differences with adaptive step size
        let n = params.len();
        let mut grad = vec![0.0; n];

        for i in 0..n {
            let eps = 1e-6 * params[i].abs().max(1.0);

            let mut params_plus = params.to_vec();
            params_plus[i] += eps;
            let f_plus = self.eval(&params_plus)?;

            let mut params_minus = params.to_vec();
            params_minus[i] -= eps;
            let f_minus = self.eval(&params_minus)?;

            grad[i] = (f_plus - f_minus) / (2.0 * eps);
        }

        Ok(grad)
    }
}
