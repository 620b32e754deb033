//! The likelihood engine.
//!
//! Owns the model and data propagators, pairs their samples and evaluates
//! `stat + penalty`. Construction parses the document; [`LikelihoodEngine::initialize`]
//! loads events and establishes the nominal point.

use crate::config::LikelihoodConfig;
use crate::joint_probability::{JointProbability, JointProbabilityFactory, JointProbabilityRegistry};
use crate::migration::Migration;
use crate::penalty::penalty_likelihood;
use crate::sample_pair::{SamplePair, SamplePairView, build_sample_pairs};
use ns_core::{Error, LikelihoodBuffer, Result, RunContext};
use ns_propagator::{
    CpuReweightBackend, DatasetDefinition, EventSource, Propagator, ReweightBackend, WorkerPool,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What the data side did with a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    /// Not loaded yet.
    Pending,
    /// Events read through a data dispenser.
    Loaded,
    /// Data is the model prediction.
    Asimov,
    /// Selected entry could not be resolved.
    Skipped,
    /// Dataset disabled in the configuration.
    Disabled,
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DatasetStatus::Pending => "pending",
            DatasetStatus::Loaded => "loaded",
            DatasetStatus::Asimov => "asimov",
            DatasetStatus::Skipped => "skipped",
            DatasetStatus::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Model/data likelihood engine.
#[derive(Debug)]
pub struct LikelihoodEngine {
    pub(crate) ctx: RunContext,
    pub(crate) config: LikelihoodConfig,
    pub(crate) applied_migrations: Vec<&'static Migration>,
    pub(crate) registry: JointProbabilityRegistry,
    pub(crate) joint_probability: Option<Box<dyn JointProbability>>,
    pub(crate) sources: BTreeMap<String, Arc<dyn EventSource>>,
    pub(crate) accelerator: Option<Arc<dyn ReweightBackend>>,
    pub(crate) datasets: Vec<DatasetDefinition>,
    pub(crate) dataset_status: Vec<DatasetStatus>,
    pub(crate) model: Propagator,
    pub(crate) data: Propagator,
    pub(crate) pool: WorkerPool,
    pub(crate) rng: StdRng,
    pub(crate) pairs: Vec<SamplePair>,
    pub(crate) buffer: LikelihoodBuffer,
    pub(crate) nb_fit_parameters: usize,
    pub(crate) nb_fit_bins: usize,
}

impl LikelihoodEngine {
    /// Parse an engine document for one fit run.
    ///
    /// Deprecated keys are relocated with a warning. Nothing is loaded until
    /// [`LikelihoodEngine::initialize`].
    pub fn new(document: &Value, ctx: RunContext) -> Result<Self> {
        let (config, applied_migrations) = LikelihoodConfig::from_value_with_migrations(document)?;
        let model = Propagator::new(&config.propagator_config)?;
        let datasets = config
            .data_set_list
            .iter()
            .enumerate()
            .map(|(i, cfg)| DatasetDefinition::from_config(cfg, i))
            .collect::<Result<Vec<_>>>()?;
        let pool = WorkerPool::new(ctx.n_threads)?;
        let rng = StdRng::seed_from_u64(ctx.seed);

        log::info!(
            "likelihood engine: {} datasets, data type {}, joint probability \"{}\", {} worker threads",
            datasets.len(),
            config.data_type,
            config.joint_probability_config.type_tag,
            pool.n_threads()
        );

        Ok(Self {
            dataset_status: vec![DatasetStatus::Pending; datasets.len()],
            data: model.clone(),
            ctx,
            config,
            applied_migrations,
            registry: JointProbabilityRegistry::default(),
            joint_probability: None,
            sources: BTreeMap::new(),
            accelerator: None,
            datasets,
            model,
            pool,
            rng,
            pairs: Vec::new(),
            buffer: LikelihoodBuffer::default(),
            nb_fit_parameters: 0,
            nb_fit_bins: 0,
        })
    }

    /// Make an event source available to dispensers under `name`.
    pub fn register_event_source(&mut self, name: impl Into<String>, source: Arc<dyn EventSource>) {
        self.sources.insert(name.into(), source);
    }

    /// Add a joint-probability strategy, selectable by `tag`.
    pub fn register_joint_probability(&mut self, tag: impl Into<String>, factory: JointProbabilityFactory) {
        self.registry.register(tag, factory);
    }

    /// Accelerated reweighting backend, used when the run context enables the cache manager.
    pub fn register_accelerator(&mut self, backend: Arc<dyn ReweightBackend>) {
        self.accelerator = Some(backend);
    }

    /// Load everything and evaluate the nominal point.
    ///
    /// Steps run in a fixed order: datasets, propagators, joint probability,
    /// counts, move to prior, nominal evaluation, then the optional MC
    /// injection. The injection must come after the nominal evaluation.
    pub fn initialize(&mut self) -> Result<()> {
        log::info!("initializing {} datasets", self.datasets.len());
        for dataset in &mut self.datasets {
            dataset.initialize(&self.sources)?;
        }

        self.model.initialize()?;
        self.select_backend();
        self.data = self.model.clone();
        self.load()?;
        self.pool.set_low_latency(true);

        let mut joint_probability = self.registry.make(&self.config.joint_probability_config)?;
        joint_probability.initialize()?;
        log::info!("joint probability: {}", joint_probability.type_tag());

        self.update_counts();
        log::info!(
            "{} free parameters, {} bins in {} sample pairs",
            self.nb_fit_parameters,
            self.nb_fit_bins,
            self.pairs.len()
        );

        self.model.parameters_mut().move_parameters_to_prior();
        self.model.propagate_parameters(&self.pool)?;

        joint_probability.capture_nominal(&self.pair_views())?;
        self.joint_probability = Some(joint_probability);
        self.evaluate()?;
        log::info!(
            "nominal likelihood: total {:.6} = stat {:.6} + penalty {:.6}",
            self.buffer.total_likelihood,
            self.buffer.stat_likelihood,
            self.buffer.penalty_likelihood
        );

        if let Some(injection) = self.model.settings().parameter_injector_mc.clone()
            && !injection.is_empty()
        {
            log::warn!("injecting parameterInjectorMc values on the model");
            self.model.parameters_mut().inject_parameter_values(&injection)?;
            self.model.propagate_parameters(&self.pool)?;
        }
        Ok(())
    }

    fn select_backend(&mut self) {
        if !self.ctx.enable_cache_manager {
            return;
        }
        match &self.accelerator {
            Some(backend) => {
                log::info!("using reweighting backend \"{}\"", backend.name());
                self.model.set_backend(Arc::clone(backend));
            }
            None => {
                log::warn!("cache manager requested but no accelerator is registered, using the CPU");
                self.model.set_backend(Arc::new(CpuReweightBackend));
            }
        }
    }

    fn update_counts(&mut self) {
        self.nb_fit_parameters = self.model.parameters().effective_parameters().len();
        let samples = self.model.samples().samples();
        self.nb_fit_bins = self.pairs.iter().map(|p| samples[p.index].histogram().n_bins()).sum();
    }

    pub(crate) fn pair_views(&self) -> Vec<SamplePairView<'_>> {
        self.pairs.iter().map(|p| p.view(self.model.samples(), self.data.samples())).collect()
    }

    /// Recompute `stat + penalty` from the current histograms and cache it.
    ///
    /// Does not propagate; call [`LikelihoodEngine::propagate_model`] first
    /// when parameters changed.
    pub fn evaluate(&mut self) -> Result<f64> {
        let joint_probability = self
            .joint_probability
            .as_deref()
            .ok_or_else(|| Error::Usage("likelihood evaluated before initialize()".into()))?;
        let stat: f64 = self
            .pairs
            .iter()
            .map(|p| p.view(self.model.samples(), self.data.samples()))
            .filter(SamplePairView::is_active)
            .map(|view| joint_probability.eval(&view))
            .sum();
        let penalty: f64 = self.model.parameters().sets().iter().map(penalty_likelihood).sum();
        self.buffer.stat_likelihood = stat;
        self.buffer.penalty_likelihood = penalty;
        self.buffer.update_total();
        Ok(self.buffer.total_likelihood)
    }

    /// Eigen -> original, reweight and refill the model side.
    pub fn propagate_model(&mut self) -> Result<()> {
        self.model.propagate_parameters(&self.pool)
    }

    /// Enable or disable sample `index` on both sides and rebuild the pairs.
    pub fn set_sample_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        let n = self.model.samples().len();
        if index >= n {
            return Err(Error::Validation(format!("sample index {index} out of range ({n} samples)")));
        }
        self.model.samples_mut().samples_mut()[index].set_enabled(enabled);
        if let Some(sample) = self.data.samples_mut().samples_mut().get_mut(index) {
            sample.set_enabled(enabled);
        }
        self.pairs = build_sample_pairs(self.model.samples(), self.data.samples())?;
        self.update_counts();
        Ok(())
    }

    /// Statistical term of sample `index`; `None` when it is disabled on either side or unpaired.
    pub fn sample_likelihood(&self, index: usize) -> Option<f64> {
        let joint_probability = self.joint_probability.as_deref()?;
        let pair = self.pairs.iter().find(|p| p.index == index)?;
        let view = pair.view(self.model.samples(), self.data.samples());
        view.is_active().then(|| joint_probability.eval(&view))
    }

    /// Penalty per parameter set; `None` for disabled sets.
    pub fn parameter_set_penalties(&self) -> Vec<Option<f64>> {
        self.model
            .parameters()
            .sets()
            .iter()
            .map(|set| set.is_enabled().then(|| penalty_likelihood(set)))
            .collect()
    }

    /// Last evaluated likelihood.
    pub fn buffer(&self) -> &LikelihoodBuffer {
        &self.buffer
    }

    /// True once [`LikelihoodEngine::initialize`] completed its nominal evaluation.
    pub fn is_initialized(&self) -> bool {
        self.joint_probability.is_some()
    }

    /// Parsed configuration
    pub fn config(&self) -> &LikelihoodConfig {
        &self.config
    }

    /// Run context
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Deprecated keys relocated while parsing.
    pub fn applied_migrations(&self) -> &[&'static Migration] {
        &self.applied_migrations
    }

    /// Plot generator block, forwarded untouched.
    pub fn plot_generator_config(&self) -> Option<&Value> {
        self.config.plot_generator_config()
    }

    /// Model propagator
    pub fn model(&self) -> &Propagator {
        &self.model
    }

    /// Mutable model propagator
    pub fn model_mut(&mut self) -> &mut Propagator {
        &mut self.model
    }

    /// Data propagator
    pub fn data(&self) -> &Propagator {
        &self.data
    }

    /// Worker pool
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Current sample pairs.
    pub fn sample_pairs(&self) -> &[SamplePair] {
        &self.pairs
    }

    /// Dataset definitions
    pub fn datasets(&self) -> &[DatasetDefinition] {
        &self.datasets
    }

    /// Load status per dataset, aligned with [`LikelihoodEngine::datasets`].
    pub fn dataset_status(&self) -> &[DatasetStatus] {
        &self.dataset_status
    }

    /// Active strategy, once initialized.
    pub fn joint_probability(&self) -> Option<&dyn JointProbability> {
        self.joint_probability.as_deref()
    }

    /// Enabled, non-fixed parameters.
    pub fn nb_fit_parameters(&self) -> usize {
        self.nb_fit_parameters
    }

    /// Bins of the paired samples.
    pub fn nb_fit_bins(&self) -> usize {
        self.nb_fit_bins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "propagatorConfig": {
                "parameterSetList": [{
                    "name": "flux",
                    "priorCovariance": [[0.04]],
                    "parameterDefinitions": [{
                        "name": "norm", "priorValue": 1.0,
                        "dialSetDefinitions": [{ "applyOnSamples": ["numu"] }]
                    }]
                }],
                "sampleSetConfig": { "sampleList": [
                    { "name": "numu", "binning": { "variables": ["x"], "edges": [0.0, 1.0, 2.0] } },
                    { "name": "nue", "binning": { "variables": ["x"], "edges": [0.0, 2.0] } }
                ]}
            },
            "dataSetList": [{
                "name": "A",
                "model": { "events": [
                    { "sample": "numu", "variables": { "x": 0.5 }, "weight": 10.0 },
                    { "sample": "numu", "variables": { "x": 1.5 }, "weight": 5.0 },
                    { "sample": "nue", "variables": { "x": 0.7 }, "weight": 3.0 }
                ]}
            }]
        })
    }

    fn engine() -> LikelihoodEngine {
        let mut engine = LikelihoodEngine::new(&document(), RunContext::default()).unwrap();
        engine.initialize().unwrap();
        engine
    }

    #[test]
    fn test_evaluate_before_initialize_is_usage_error() {
        let mut engine = LikelihoodEngine::new(&document(), RunContext::default()).unwrap();
        assert!(matches!(engine.evaluate(), Err(Error::Usage(_))));
        assert_eq!(engine.dataset_status(), &[DatasetStatus::Pending]);
    }

    #[test]
    fn test_nominal_asimov_is_zero() {
        let engine = engine();
        assert!(engine.is_initialized());
        assert_eq!(engine.buffer().total_likelihood, 0.0);
        assert_eq!(engine.nb_fit_parameters(), 1);
        assert_eq!(engine.nb_fit_bins(), 3);
        assert_eq!(engine.dataset_status(), &[DatasetStatus::Asimov]);
    }

    #[test]
    fn test_shifted_parameter_adds_stat_and_penalty() {
        let mut engine = engine();
        let r = engine.model().parameters().effective_parameters()[0];
        engine.model_mut().parameters_mut().set_parameter_value(r, 1.2).unwrap();
        engine.propagate_model().unwrap();
        engine.evaluate().unwrap();
        let buffer = *engine.buffer();
        assert_relative_eq!(buffer.penalty_likelihood, 1.0, epsilon = 1e-12);
        assert!(buffer.stat_likelihood > 0.0);
        assert_relative_eq!(buffer.total_likelihood, buffer.stat_likelihood + 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_set_sample_enabled_rebuilds_pairs() {
        let mut engine = engine();
        engine.set_sample_enabled(1, false).unwrap();
        assert_eq!(engine.sample_pairs(), &[SamplePair { index: 0 }]);
        assert_eq!(engine.sample_likelihood(1), None);
        assert_eq!(engine.nb_fit_bins(), 2);
        assert!(engine.set_sample_enabled(9, true).is_err());
    }

    #[test]
    fn test_cache_manager_without_accelerator_falls_back() {
        let ctx = RunContext { enable_cache_manager: true, ..RunContext::default() };
        let mut engine = LikelihoodEngine::new(&document(), ctx).unwrap();
        engine.initialize().unwrap();
        assert_eq!(engine.model().backend_name(), "cpu");
    }
}
