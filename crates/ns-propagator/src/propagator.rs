//! Propagator: parameters -> reweighted events -> binned histograms.

use crate::backend::{CpuReweightBackend, ReweightBackend};
use crate::config::PropagatorConfig;
use crate::dataset::DataDispenser;
use crate::dial::{DialCollection, EventDialCache};
use crate::event::Event;
use crate::manager::ParametersManager;
use crate::pool::WorkerPool;
use crate::sample::SampleSet;
use ns_core::{AvgTimer, Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Per-sample content summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleBreakdown {
    /// Sample name
    pub name: String,
    /// Enabled flag
    pub enabled: bool,
    /// Number of events assigned to a bin.
    pub n_binned: usize,
    /// Weighted sum of the binned events.
    pub sum_weights: f64,
}

/// One side (model or data) of the fit.
#[derive(Debug, Clone)]
pub struct Propagator {
    config: Value,
    settings: PropagatorConfig,
    parameters: ParametersManager,
    samples: SampleSet,
    dials: Vec<DialCollection>,
    dial_cache: EventDialCache,
    backend: Arc<dyn ReweightBackend>,
    reweight_timer: AvgTimer,
    refill_timer: AvgTimer,
}

impl Propagator {
    /// Read a configuration document without building anything yet.
    pub fn new(config: &Value) -> Result<Self> {
        let mut propagator = Self {
            config: Value::Null,
            settings: PropagatorConfig::default(),
            parameters: ParametersManager::default(),
            samples: SampleSet::default(),
            dials: Vec::new(),
            dial_cache: EventDialCache::default(),
            backend: Arc::new(CpuReweightBackend),
            reweight_timer: AvgTimer::default(),
            refill_timer: AvgTimer::default(),
        };
        propagator.read_config(config)?;
        Ok(propagator)
    }

    /// Read and initialize from a configuration document.
    pub fn from_value(config: &Value) -> Result<Self> {
        let mut propagator = Self::new(config)?;
        propagator.initialize()?;
        Ok(propagator)
    }

    /// Store a new configuration document. Takes effect at [`Propagator::initialize`].
    pub fn read_config(&mut self, config: &Value) -> Result<()> {
        self.settings = PropagatorConfig::from_value(config)?;
        self.config = config.clone();
        Ok(())
    }

    /// Build parameters, samples and dials from the stored configuration.
    ///
    /// Any loaded content is dropped.
    pub fn initialize(&mut self) -> Result<()> {
        self.parameters = ParametersManager::from_config(&self.settings.parameter_set_list)?;
        self.samples = SampleSet::from_config(&self.settings.sample_set_config)?;
        self.dials = DialCollection::build_all(&self.parameters)?;
        self.dial_cache.clear();
        Ok(())
    }

    /// Re-read the configuration while keeping loaded events, matched by sample name.
    pub fn reconfigure(&mut self, config: &Value) -> Result<()> {
        let previous = std::mem::take(&mut self.samples);
        self.read_config(config)?;
        self.initialize()?;
        for mut old in previous.into_samples() {
            match self.samples.find(old.name()) {
                Some(index) => {
                    let events = std::mem::take(old.events_mut());
                    self.samples.samples_mut()[index].events_mut().extend(events);
                }
                None if !old.events().is_empty() => log::warn!(
                    "sample \"{}\" vanished after reconfiguration, dropping {} events",
                    old.name(),
                    old.events().len()
                ),
                None => {}
            }
        }
        Ok(())
    }

    /// Raw configuration document
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Typed configuration
    pub fn settings(&self) -> &PropagatorConfig {
        &self.settings
    }

    /// Parameters
    pub fn parameters(&self) -> &ParametersManager {
        &self.parameters
    }

    /// Mutable parameters
    pub fn parameters_mut(&mut self) -> &mut ParametersManager {
        &mut self.parameters
    }

    /// Sample set
    pub fn samples(&self) -> &SampleSet {
        &self.samples
    }

    /// Mutable sample set
    pub fn samples_mut(&mut self) -> &mut SampleSet {
        &mut self.samples
    }

    /// Dial collections
    pub fn dial_collections(&self) -> &[DialCollection] {
        &self.dials
    }

    /// Event-dial cache
    pub fn dial_cache(&self) -> &EventDialCache {
        &self.dial_cache
    }

    /// Swap the reweighting backend.
    pub fn set_backend(&mut self, backend: Arc<dyn ReweightBackend>) {
        self.backend = backend;
    }

    /// Name of the active reweighting backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Time spent reweighting.
    pub fn reweight_timer(&self) -> &AvgTimer {
        &self.reweight_timer
    }

    /// Time spent refilling histograms.
    pub fn refill_timer(&self) -> &AvgTimer {
        &self.refill_timer
    }

    /// Drop all events and histogram content.
    pub fn clear_content(&mut self) {
        for sample in self.samples.samples_mut() {
            sample.clear();
        }
        self.dial_cache.clear();
    }

    /// Load one dispenser's events.
    pub fn load_dispenser(&mut self, dispenser: &DataDispenser, data_set_index: usize) -> Result<usize> {
        dispenser.load(&mut self.samples, data_set_index)
    }

    /// Load a dispenser's events as reweightable simulation, whatever its data flag.
    pub fn load_dispenser_reweightable(
        &mut self,
        dispenser: &DataDispenser,
        data_set_index: usize,
    ) -> Result<usize> {
        dispenser.load_flagged(&mut self.samples, data_set_index, false)
    }

    /// Replace every sample's events with frozen copies of `other`'s.
    ///
    /// Copied events carry the other side's current weight as base weight and
    /// no dials. Parameter values are copied along.
    pub fn copy_events_from(&mut self, other: &Propagator) -> Result<()> {
        if self.samples.len() != other.samples.len() {
            return Err(Error::SampleCountMismatch {
                n_model: other.samples.len(),
                n_data: self.samples.len(),
            });
        }
        for (dst, src) in self.samples.samples_mut().iter_mut().zip(other.samples.samples()) {
            dst.clear();
            dst.events_mut().extend(src.events().iter().map(|event| Event {
                base_weight: event.weight,
                mc_throw_factor: 1.0,
                bin_index: None,
                is_data: true,
                ..event.clone()
            }));
        }
        self.parameters.copy_values_from(&other.parameters);
        Ok(())
    }

    /// Release spare event and dial-cache capacity.
    pub fn shrink_dial_containers(&mut self) {
        for sample in self.samples.samples_mut() {
            sample.events_mut().shrink_to_fit();
        }
        self.dial_cache.shrink();
    }

    /// Rebuild the per-event dial lookup.
    pub fn build_dial_cache(&mut self) {
        self.dial_cache = EventDialCache::build(&self.samples, &self.dials);
        log::debug!(
            "dial cache: {} dial collections, {} event links",
            self.dials.len(),
            self.dial_cache.n_links()
        );
    }

    /// Recompute every event weight from the current parameter values.
    pub fn reweight_events(&mut self, pool: &WorkerPool) -> Result<()> {
        let start = Instant::now();
        self.backend.reweight(
            self.samples.samples_mut(),
            &self.dial_cache,
            &self.dials,
            &self.parameters,
            pool,
        )?;
        self.reweight_timer.record(start.elapsed());
        Ok(())
    }

    /// Assign events to bins, one job per sample.
    pub fn update_bin_event_lists(&mut self, pool: &WorkerPool) {
        pool.run_job(self.samples.samples_mut(), |_, sample| sample.update_bin_event_list());
    }

    /// Refill histograms from event weights, one job per sample.
    pub fn refill_histograms(&mut self, pool: &WorkerPool) {
        let start = Instant::now();
        pool.run_job(self.samples.samples_mut(), |_, sample| sample.refill_histogram());
        self.refill_timer.record(start.elapsed());
    }

    /// Eigen -> original parameters, reweight, refill.
    pub fn propagate_parameters(&mut self, pool: &WorkerPool) -> Result<()> {
        self.parameters.propagate_eigen();
        self.reweight_events(pool)?;
        self.refill_histograms(pool);
        Ok(())
    }

    /// Binned count and weighted sum per sample.
    pub fn breakdown(&self) -> Vec<SampleBreakdown> {
        self.samples
            .samples()
            .iter()
            .map(|s| SampleBreakdown {
                name: s.name().to_string(),
                enabled: s.is_enabled(),
                n_binned: s.nb_binned_events(),
                sum_weights: s.sum_weights(),
            })
            .collect()
    }

    /// Log the breakdown under a label.
    pub fn print_breakdowns(&self, label: &str) {
        for row in self.breakdown() {
            log::info!(
                "{label} sample \"{}\"{}: {} binned events, sum of weights {:.3}",
                row.name,
                if row.enabled { "" } else { " (disabled)" },
                row.n_binned,
                row.sum_weights
            );
        }
    }

    /// Debug dump of the first loaded events per sample, when configured.
    pub fn debug_print_loaded_events(&self) {
        if !self.settings.debug_print_loaded_events {
            return;
        }
        let n = self.settings.debug_print_loaded_events_nb_per_sample;
        for (s, sample) in self.samples.samples().iter().enumerate() {
            log::debug!("sample \"{}\": first {n} events", sample.name());
            for (e, event) in sample.events().iter().take(n).enumerate() {
                log::debug!("  #{e} {event} dials={:?}", self.dial_cache.dials_for(s, e));
            }
        }
    }
}
