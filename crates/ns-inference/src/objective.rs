//! Minimizer-facing objective function.
//!
//! [`FitObjective`] maps a flat parameter vector onto the model, propagates,
//! evaluates and keeps fixed-size bookkeeping (call counter, timers,
//! convergence monitor). Calls are serialized through a mutex: one writer at
//! a time.

use crate::engine::LikelihoodEngine;
use crate::monitor::ConvergenceMonitor;
use ns_core::{AvgTimer, Error, LikelihoodBuffer, ObjectiveFunction, Result};
use ns_propagator::ParameterRef;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Bookkeeping snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitStats {
    /// Objective calls so far
    pub nb_fit_calls: u64,
    /// Time spent inside the objective.
    pub eval_timer: AvgTimer,
    /// Time spent by the minimizer between two calls.
    pub out_timer: AvgTimer,
    /// Calls per second since construction.
    pub iteration_speed: f64,
    /// Last evaluated likelihood
    pub buffer: LikelihoodBuffer,
    /// `total / (nb_bins - nb_free_parameters)`, when the dof is positive.
    pub chi2_per_dof: Option<f64>,
}

impl fmt::Display for FitStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "call #{}: total={:.6} stat={:.6} syst={:.6}, eval {}, out {}, {:.1} it/s",
            self.nb_fit_calls,
            self.buffer.total_likelihood,
            self.buffer.stat_likelihood,
            self.buffer.penalty_likelihood,
            self.eval_timer,
            self.out_timer,
            self.iteration_speed
        )?;
        if let Some(chi2) = self.chi2_per_dof {
            write!(f, ", chi2/dof={chi2:.4}")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct FitState {
    engine: LikelihoodEngine,
    parameters: Vec<ParameterRef>,
    normalized: bool,
    monitor: ConvergenceMonitor,
    nb_fit_calls: u64,
    eval_timer: AvgTimer,
    out_timer: AvgTimer,
    last_call_end: Option<Instant>,
    start: Instant,
    last_log: Instant,
    log_interval: Duration,
}

impl FitState {
    fn evaluate(&mut self, params: &[f64]) -> Result<f64> {
        if params.len() != self.parameters.len() {
            return Err(Error::Validation(format!(
                "expected {} parameters, got {}",
                self.parameters.len(),
                params.len()
            )));
        }
        let call_start = Instant::now();
        if let Some(end) = self.last_call_end {
            self.out_timer.record(call_start.duration_since(end));
        }

        for (&r, &x) in self.parameters.iter().zip(params) {
            let value = if self.normalized { self.real_value(r, x)? } else { x };
            self.engine.model_mut().parameters_mut().set_parameter_value(r, value)?;
        }
        self.engine.propagate_model()?;
        let total = self.engine.evaluate()?;
        let buffer = *self.engine.buffer();

        self.nb_fit_calls += 1;
        self.monitor.record(buffer.total_likelihood, buffer.stat_likelihood, buffer.penalty_likelihood);
        let end = Instant::now();
        self.eval_timer.record(end.duration_since(call_start));
        self.last_call_end = Some(end);

        if end.duration_since(self.last_log) >= self.log_interval {
            self.last_log = end;
            log::info!("{}", self.stats());
        }

        if !total.is_finite() {
            return Err(Error::Computation(format!(
                "non-finite likelihood at call #{}: stat={}, penalty={}",
                self.nb_fit_calls, buffer.stat_likelihood, buffer.penalty_likelihood
            )));
        }
        Ok(total)
    }

    fn resolve(&self, r: ParameterRef) -> Result<&ns_propagator::Parameter> {
        self.engine
            .model()
            .parameters()
            .parameter(r)
            .ok_or_else(|| Error::Validation(format!("dangling parameter reference {r:?}")))
    }

    fn real_value(&self, r: ParameterRef, normalized: f64) -> Result<f64> {
        Ok(self.resolve(r)?.to_real(normalized))
    }

    fn stats(&self) -> FitStats {
        let elapsed = self.start.elapsed().as_secs_f64();
        let iteration_speed = if elapsed > 0.0 { self.nb_fit_calls as f64 / elapsed } else { 0.0 };
        let buffer = *self.engine.buffer();
        let dof = self.engine.nb_fit_bins() as f64 - self.parameters.len() as f64;
        FitStats {
            nb_fit_calls: self.nb_fit_calls,
            eval_timer: self.eval_timer,
            out_timer: self.out_timer,
            iteration_speed,
            buffer,
            chi2_per_dof: (dof > 0.0).then(|| buffer.total_likelihood / dof),
        }
    }
}

/// Objective function over the enabled, non-fixed model parameters.
#[derive(Debug)]
pub struct FitObjective {
    state: Mutex<FitState>,
}

impl FitObjective {
    /// Wrap an initialized engine.
    ///
    /// The parameter enumeration is frozen here; fixing or enabling
    /// parameters afterwards needs a new objective.
    pub fn new(engine: LikelihoodEngine) -> Result<Self> {
        if !engine.is_initialized() {
            return Err(Error::Usage("fit objective built from an uninitialized engine".into()));
        }
        let parameters = engine.model().parameters().effective_parameters();
        let normalized = engine.config().use_normalized_fit_space;
        let monitor = ConvergenceMonitor::new(engine.config().monitor_history_size);
        log::info!(
            "fit objective: {} parameters, {} bins, {} space",
            parameters.len(),
            engine.nb_fit_bins(),
            if normalized { "normalized" } else { "real" }
        );
        let now = Instant::now();
        Ok(Self {
            state: Mutex::new(FitState {
                engine,
                parameters,
                normalized,
                monitor,
                nb_fit_calls: 0,
                eval_timer: AvgTimer::default(),
                out_timer: AvgTimer::default(),
                last_call_end: None,
                start: now,
                last_log: now,
                log_interval: DEFAULT_LOG_INTERVAL,
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, FitState>> {
        self.state
            .lock()
            .map_err(|_| Error::Computation("fit objective poisoned by a panicking call".into()))
    }

    /// Switch between real and normalized parameter space.
    pub fn set_normalized(&self, normalized: bool) -> Result<()> {
        self.lock()?.normalized = normalized;
        Ok(())
    }

    /// True when vectors are in `(x - prior) / sigma` units.
    pub fn is_normalized(&self) -> Result<bool> {
        Ok(self.lock()?.normalized)
    }

    /// Progress log period.
    pub fn set_log_interval(&self, interval: Duration) -> Result<()> {
        self.lock()?.log_interval = interval;
        Ok(())
    }

    /// Names of the driven parameters, in vector order.
    pub fn parameter_names(&self) -> Result<Vec<String>> {
        let state = self.lock()?;
        state
            .parameters
            .iter()
            .map(|&r| state.resolve(r).map(|p| p.name().to_string()))
            .collect()
    }

    /// Current values, in the active space.
    pub fn current_parameters(&self) -> Result<Vec<f64>> {
        let state = self.lock()?;
        state
            .parameters
            .iter()
            .map(|&r| {
                let p = state.resolve(r)?;
                Ok(if state.normalized { p.to_normalized(p.value()) } else { p.value() })
            })
            .collect()
    }

    /// Priors, in the active space.
    pub fn prior_parameters(&self) -> Result<Vec<f64>> {
        let state = self.lock()?;
        state
            .parameters
            .iter()
            .map(|&r| Ok(if state.normalized { 0.0 } else { state.resolve(r)?.prior_value() }))
            .collect()
    }

    /// Bounds, in the active space.
    pub fn bounds(&self) -> Result<Vec<(f64, f64)>> {
        let state = self.lock()?;
        state
            .parameters
            .iter()
            .map(|&r| {
                let p = state.resolve(r)?;
                let (lo, hi) = p.bounds();
                Ok(if state.normalized { (p.to_normalized(lo), p.to_normalized(hi)) } else { (lo, hi) })
            })
            .collect()
    }

    /// Real values -> normalized space.
    pub fn encode(&self, real: &[f64]) -> Result<Vec<f64>> {
        let state = self.lock()?;
        state.parameters.iter().zip(real).map(|(&r, &x)| Ok(state.resolve(r)?.to_normalized(x))).collect()
    }

    /// Normalized space -> real values.
    pub fn decode(&self, normalized: &[f64]) -> Result<Vec<f64>> {
        let state = self.lock()?;
        state.parameters.iter().zip(normalized).map(|(&r, &x)| state.real_value(r, x)).collect()
    }

    /// Bookkeeping snapshot.
    pub fn stats(&self) -> Result<FitStats> {
        Ok(self.lock()?.stats())
    }

    /// Copy of the convergence monitor.
    pub fn monitor(&self) -> Result<ConvergenceMonitor> {
        Ok(self.lock()?.monitor.clone())
    }

    /// Run `f` on the wrapped engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&LikelihoodEngine) -> R) -> Result<R> {
        Ok(f(&self.lock()?.engine))
    }

    /// Give the engine back.
    pub fn into_engine(self) -> Result<LikelihoodEngine> {
        self.state
            .into_inner()
            .map(|state| state.engine)
            .map_err(|_| Error::Computation("fit objective poisoned by a panicking call".into()))
    }
}

impl ObjectiveFunction for FitObjective {
    fn dim(&self) -> usize {
        self.lock().map(|state| state.parameters.len()).unwrap_or(0)
    }

    fn eval(&self, params: &[f64]) -> Result<f64> {
        self.lock()?.evaluate(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ns_core::RunContext;
    use serde_json::json;

    fn engine(normalized: bool) -> LikelihoodEngine {
        let document = json!({
            "useNormalizedFitSpace": normalized,
            "propagatorConfig": {
                "parameterSetList": [{
                    "name": "xsec",
                    "priorCovariance": [[0.04, 0.0, 0.0], [0.0, 0.09, 0.0], [0.0, 0.0, 0.01]],
                    "parameterDefinitions": [
                        { "name": "a", "priorValue": 1.0, "dialSetDefinitions": [{ "applyOnSamples": ["s"] }] },
                        { "name": "b", "priorValue": 1.0 },
                        { "name": "c", "priorValue": 1.0, "isFixed": true }
                    ]
                }],
                "sampleSetConfig": { "sampleList": [
                    { "name": "s", "binning": { "variables": ["x"], "edges": [0.0, 1.0, 2.0, 3.0] } }
                ]}
            },
            "dataSetList": [{
                "name": "A",
                "model": { "events": [
                    { "sample": "s", "variables": { "x": 0.5 }, "weight": 20.0 },
                    { "sample": "s", "variables": { "x": 1.5 }, "weight": 30.0 },
                    { "sample": "s", "variables": { "x": 2.5 }, "weight": 10.0 }
                ]}
            }]
        });
        let mut engine = LikelihoodEngine::new(&document, RunContext::default()).unwrap();
        engine.initialize().unwrap();
        engine
    }

    #[test]
    fn test_uninitialized_engine_is_rejected() {
        let engine = LikelihoodEngine::new(
            &json!({ "propagatorConfig": {} }),
            RunContext::default(),
        )
        .unwrap();
        assert!(matches!(FitObjective::new(engine), Err(Error::Usage(_))));
    }

    #[test]
    fn test_enumeration_skips_fixed() {
        let objective = FitObjective::new(engine(false)).unwrap();
        assert_eq!(objective.dim(), 2);
        assert_eq!(objective.parameter_names().unwrap(), vec!["a", "b"]);
        assert_eq!(objective.prior_parameters().unwrap(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_eval_at_prior_is_zero_and_counts() {
        let objective = FitObjective::new(engine(false)).unwrap();
        assert_eq!(objective.eval(&[1.0, 1.0]).unwrap(), 0.0);
        let shifted = objective.eval(&[1.2, 1.3]).unwrap();
        let stats = objective.stats().unwrap();
        assert_eq!(stats.nb_fit_calls, 2);
        assert_eq!(stats.eval_timer.counts, 2);
        assert_eq!(stats.out_timer.counts, 1);
        assert_relative_eq!(stats.buffer.penalty_likelihood, 2.0, epsilon = 1e-12);
        assert_relative_eq!(stats.chi2_per_dof.unwrap(), shifted, epsilon = 1e-12);
        assert_eq!(objective.monitor().unwrap().total().len(), 2);
    }

    #[test]
    fn test_wrong_length_is_validation_error() {
        let objective = FitObjective::new(engine(false)).unwrap();
        objective.eval(&[1.0, 1.0]).unwrap();
        assert!(matches!(objective.eval(&[1.0]), Err(Error::Validation(_))));
        let stats = objective.stats().unwrap();
        assert_eq!(stats.nb_fit_calls, 1);
        assert_eq!(stats.eval_timer.counts, 1);
        assert_eq!(stats.out_timer.counts, 0, "rejected calls are not timed");
    }

    #[test]
    fn test_normalized_space() {
        let objective = FitObjective::new(engine(true)).unwrap();
        assert!(objective.is_normalized().unwrap());
        objective.eval(&[1.0, -2.0]).unwrap();
        let real = objective.with_engine(|e| {
            e.model().parameters().sets()[0].parameters().iter().map(|p| p.value()).collect::<Vec<_>>()
        });
        let real = real.unwrap();
        assert_relative_eq!(real[0], 1.2, epsilon = 1e-12);
        assert_relative_eq!(real[1], 0.4, epsilon = 1e-12);
        assert_eq!(real[2], 1.0);
        let current = objective.current_parameters().unwrap();
        assert_relative_eq!(current[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(current[1], -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_non_finite_total_is_computation_error() {
        let objective = FitObjective::new(engine(false)).unwrap();
        // a zero normalization empties every bin of the only sample while data stays
        assert!(matches!(objective.eval(&[0.0, 1.0]), Err(Error::Computation(_))));
    }
}
