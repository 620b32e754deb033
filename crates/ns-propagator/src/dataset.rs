//! Dataset definitions and data dispensers.
//!
//! A dataset offers one model dispenser and any number of named data
//! dispensers (toy or real-data entries). Reading events from storage is the
//! job of an [`EventSource`]; dispensers may also carry inline events.

use crate::event::{Event, EventRecord};
use crate::sample::SampleSet;
use ns_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Entry name meaning "use the model prediction".
pub const ASIMOV_ENTRY: &str = "Asimov";

fn default_true() -> bool {
    true
}

fn default_entry() -> String {
    ASIMOV_ENTRY.to_string()
}

/// Storage-loading collaborator.
pub trait EventSource: Send + Sync + Debug {
    /// Read the events a dispenser asks for.
    fn read_events(&self, dispenser: &str) -> Result<Vec<EventRecord>>;
}

/// Event source backed by records held in memory, keyed by dispenser name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryEventSource {
    /// Records per dispenser
    pub dispensers: BTreeMap<String, Vec<EventRecord>>,
}

impl EventSource for MemoryEventSource {
    fn read_events(&self, dispenser: &str) -> Result<Vec<EventRecord>> {
        self.dispensers
            .get(dispenser)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("no events for dispenser \"{dispenser}\"")))
    }
}

/// Dispenser configuration block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispenserConfig {
    /// Entry name
    pub name: String,
    /// Merged onto the model propagator configuration before loading.
    pub override_propagator_config: Option<Value>,
    /// Inline events
    pub events: Vec<EventRecord>,
    /// Name of a registered [`EventSource`].
    pub event_source: Option<String>,
}

/// Dataset configuration block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetConfig {
    /// Dataset name
    pub name: String,
    /// Disabled datasets are skipped.
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    /// Data entry used in real-data mode.
    #[serde(default = "default_entry")]
    pub selected_data_entry: String,
    /// Data entry used in toy mode.
    #[serde(default = "default_entry")]
    pub selected_toy_entry: String,
    /// Model dispenser
    #[serde(default)]
    pub model: DispenserConfig,
    /// Named data dispensers
    #[serde(default)]
    pub data: Vec<DispenserConfig>,
}

/// Per-load options of a dispenser.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispenserParameters {
    /// Loaded events are observed data (no dials).
    pub is_data: bool,
    /// Propagator configuration override.
    pub override_propagator_config: Option<Value>,
}

/// Produces events for one dataset entry.
#[derive(Debug, Clone)]
pub struct DataDispenser {
    name: String,
    parameters: DispenserParameters,
    events: Vec<EventRecord>,
    event_source: Option<String>,
    source: Option<Arc<dyn EventSource>>,
}

impl DataDispenser {
    fn from_config(cfg: &DispenserConfig, fallback_name: &str, is_data: bool) -> Self {
        let name = if cfg.name.is_empty() { fallback_name.to_string() } else { cfg.name.clone() };
        Self {
            name,
            parameters: DispenserParameters {
                is_data,
                override_propagator_config: cfg.override_propagator_config.clone(),
            },
            events: cfg.events.clone(),
            event_source: cfg.event_source.clone(),
            source: None,
        }
    }

    /// Entry name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load options
    pub fn parameters(&self) -> &DispenserParameters {
        &self.parameters
    }

    /// Mutable load options
    pub fn parameters_mut(&mut self) -> &mut DispenserParameters {
        &mut self.parameters
    }

    fn attach_source(&mut self, sources: &BTreeMap<String, Arc<dyn EventSource>>) -> Result<()> {
        if let Some(source_name) = &self.event_source {
            let source = sources.get(source_name).ok_or_else(|| {
                Error::Config(format!(
                    "dispenser \"{}\": unknown event source \"{source_name}\"",
                    self.name
                ))
            })?;
            self.source = Some(Arc::clone(source));
        }
        Ok(())
    }

    /// Append the dispenser's events to the matching samples.
    ///
    /// Records targeting an unknown sample are dropped. Returns the number of
    /// events loaded.
    pub fn load(&self, samples: &mut SampleSet, data_set_index: usize) -> Result<usize> {
        self.load_flagged(samples, data_set_index, self.parameters.is_data)
    }

    /// Same as [`DataDispenser::load`], with an explicit data flag.
    ///
    /// Events loaded with `is_data = false` receive dials, so toy entries
    /// built from simulation follow the parameters thrown on the data side.
    pub fn load_flagged(
        &self,
        samples: &mut SampleSet,
        data_set_index: usize,
        is_data: bool,
    ) -> Result<usize> {
        if self.event_source.is_some() && self.source.is_none() {
            return Err(Error::Usage(format!(
                "dispenser \"{}\" loaded before its dataset was initialized",
                self.name
            )));
        }
        let fetched;
        let records: &[EventRecord] = match &self.source {
            Some(source) => {
                fetched = source.read_events(&self.name)?;
                &fetched
            }
            None => &self.events,
        };

        let mut n_loaded = 0;
        let mut n_dropped = 0;
        for (entry, record) in records.iter().enumerate() {
            let Some(sample_index) = samples.find(&record.sample) else {
                n_dropped += 1;
                continue;
            };
            let mut event = Event::new(record.variables.clone(), record.weight, data_set_index);
            event.entry_index = entry;
            event.is_data = is_data;
            samples.samples_mut()[sample_index].events_mut().push(event);
            n_loaded += 1;
        }
        if n_dropped > 0 {
            log::debug!(
                "dispenser \"{}\": {n_dropped} events target unknown samples and were dropped",
                self.name
            );
        }
        log::info!("dispenser \"{}\": loaded {n_loaded} events", self.name);
        Ok(n_loaded)
    }
}

/// One physical dataset.
#[derive(Debug, Clone)]
pub struct DatasetDefinition {
    name: String,
    index: usize,
    enabled: bool,
    selected_data_entry: String,
    selected_toy_entry: String,
    model_dispenser: DataDispenser,
    data_dispensers: BTreeMap<String, DataDispenser>,
}

impl DatasetDefinition {
    /// Build from configuration. Duplicate or empty data entry names are fatal.
    pub fn from_config(cfg: &DatasetConfig, index: usize) -> Result<Self> {
        let mut data_dispensers = BTreeMap::new();
        for data_cfg in &cfg.data {
            if data_cfg.name.is_empty() {
                return Err(Error::Config(format!("dataset \"{}\": unnamed data entry", cfg.name)));
            }
            let dispenser = DataDispenser::from_config(data_cfg, &data_cfg.name, true);
            if data_dispensers.insert(data_cfg.name.clone(), dispenser).is_some() {
                return Err(Error::Config(format!(
                    "dataset \"{}\": duplicate data entry \"{}\"",
                    cfg.name, data_cfg.name
                )));
            }
        }
        Ok(Self {
            name: cfg.name.clone(),
            index,
            enabled: cfg.is_enabled,
            selected_data_entry: cfg.selected_data_entry.clone(),
            selected_toy_entry: cfg.selected_toy_entry.clone(),
            model_dispenser: DataDispenser::from_config(
                &cfg.model,
                &format!("{}/model", cfg.name),
                false,
            ),
            data_dispensers,
        })
    }

    /// Resolve event sources for every dispenser.
    pub fn initialize(&mut self, sources: &BTreeMap<String, Arc<dyn EventSource>>) -> Result<()> {
        self.model_dispenser.attach_source(sources)?;
        for dispenser in self.data_dispensers.values_mut() {
            dispenser.attach_source(sources)?;
        }
        Ok(())
    }

    /// Dataset name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position in the dataset list.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Enabled flag
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Entry selected for real-data fits.
    pub fn selected_data_entry(&self) -> &str {
        &self.selected_data_entry
    }

    /// Entry selected for toy fits.
    pub fn selected_toy_entry(&self) -> &str {
        &self.selected_toy_entry
    }

    /// Model dispenser
    pub fn model_dispenser(&self) -> &DataDispenser {
        &self.model_dispenser
    }

    /// Named data dispenser
    pub fn data_dispenser(&self, name: &str) -> Option<&DataDispenser> {
        self.data_dispensers.get(name)
    }

    /// Names of the data entries.
    pub fn data_entry_names(&self) -> impl Iterator<Item = &str> {
        self.data_dispensers.keys().map(String::as_str)
    }
}

/// True when an entry name selects the model prediction.
pub fn is_asimov_entry(entry: &str) -> bool {
    entry.is_empty() || entry == ASIMOV_ENTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SampleSetConfig;
    use serde_json::json;

    fn samples() -> SampleSet {
        let cfg: SampleSetConfig = serde_json::from_value(json!({
            "sampleList": [
                { "name": "numu", "binning": { "variables": ["x"], "edges": [0.0, 1.0] } },
                { "name": "nue", "binning": { "variables": ["x"], "edges": [0.0, 1.0] } }
            ]
        }))
        .unwrap();
        SampleSet::from_config(&cfg).unwrap()
    }

    #[test]
    fn test_dataset_defaults() {
        let cfg: DatasetConfig = serde_json::from_value(json!({ "name": "A" })).unwrap();
        let ds = DatasetDefinition::from_config(&cfg, 0).unwrap();
        assert!(ds.is_enabled());
        assert_eq!(ds.selected_data_entry(), "Asimov");
        assert!(is_asimov_entry(ds.selected_toy_entry()));
        assert_eq!(ds.model_dispenser().name(), "A/model");
        assert!(!ds.model_dispenser().parameters().is_data);
    }

    #[test]
    fn test_duplicate_data_entry_is_fatal() {
        let cfg: DatasetConfig = serde_json::from_value(json!({
            "name": "A",
            "data": [{ "name": "toy" }, { "name": "toy" }]
        }))
        .unwrap();
        assert!(matches!(DatasetDefinition::from_config(&cfg, 0), Err(Error::Config(_))));
    }

    #[test]
    fn test_inline_load_routes_by_sample() {
        let cfg: DatasetConfig = serde_json::from_value(json!({
            "name": "A",
            "model": { "events": [
                { "sample": "numu", "variables": { "x": 0.5 }, "weight": 2.0 },
                { "sample": "nue", "variables": { "x": 0.2 } },
                { "sample": "ghost", "variables": { "x": 0.2 } }
            ]}
        }))
        .unwrap();
        let ds = DatasetDefinition::from_config(&cfg, 3).unwrap();
        let mut set = samples();
        let n = ds.model_dispenser().load(&mut set, ds.index()).unwrap();
        assert_eq!(n, 2);
        assert_eq!(set.samples()[0].events()[0].base_weight, 2.0);
        assert_eq!(set.samples()[1].events()[0].data_set_index, 3);
    }

    #[test]
    fn test_event_source_resolution() {
        let cfg: DatasetConfig = serde_json::from_value(json!({
            "name": "A",
            "data": [{ "name": "run1", "eventSource": "mem" }]
        }))
        .unwrap();
        let mut ds = DatasetDefinition::from_config(&cfg, 0).unwrap();
        assert!(ds.data_dispenser("run1").unwrap().load(&mut samples(), 0).is_err());

        let mut memory = MemoryEventSource::default();
        memory.dispensers.insert(
            "run1".into(),
            vec![EventRecord { sample: "nue".into(), variables: Default::default(), weight: 1.0 }],
        );
        let mut sources: BTreeMap<String, Arc<dyn EventSource>> = BTreeMap::new();
        sources.insert("mem".into(), Arc::new(memory));
        ds.initialize(&sources).unwrap();
        let mut set = samples();
        assert_eq!(ds.data_dispenser("run1").unwrap().load(&mut set, 0).unwrap(), 1);
        assert!(set.samples()[1].events()[0].is_data);
    }

    #[test]
    fn test_load_flagged_overrides_data_flag() {
        let cfg: DatasetConfig = serde_json::from_value(json!({
            "name": "A",
            "data": [{ "name": "toy", "events": [{ "sample": "numu", "variables": { "x": 0.5 }, "weight": 3.0 }] }]
        }))
        .unwrap();
        let ds = DatasetDefinition::from_config(&cfg, 0).unwrap();
        let dispenser = ds.data_dispenser("toy").unwrap();

        let mut frozen = samples();
        dispenser.load(&mut frozen, 0).unwrap();
        assert!(frozen.samples()[0].events()[0].is_data);

        let mut reweightable = samples();
        dispenser.load_flagged(&mut reweightable, 0, false).unwrap();
        assert!(!reweightable.samples()[0].events()[0].is_data);
    }

    #[test]
    fn test_unknown_event_source_is_fatal() {
        let cfg: DatasetConfig = serde_json::from_value(json!({
            "name": "A",
            "model": { "eventSource": "missing" }
        }))
        .unwrap();
        let mut ds = DatasetDefinition::from_config(&cfg, 0).unwrap();
        assert!(ds.initialize(&BTreeMap::new()).is_err());
    }
}
