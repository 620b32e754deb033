//! Load pipeline: fill the model, then the data side, then pair samples.

use crate::engine::{DatasetStatus, LikelihoodEngine};
use crate::sample_pair::build_sample_pairs;
use crate::toys::{self, StatThrowOptions};
use ns_core::{DataType, Result};
use ns_propagator::{
    DataDispenser, DatasetDefinition, ParametersManager, is_asimov_entry, merge_override,
};
use serde_json::Value;

/// Entry a dataset selects for the given data type.
pub fn selected_entry(data_type: DataType, dataset: &DatasetDefinition) -> &str {
    match data_type {
        DataType::Toy => dataset.selected_toy_entry(),
        DataType::Asimov | DataType::RealData => dataset.selected_data_entry(),
    }
}

/// Dispenser an entry name points to. Asimov entries use the model dispenser.
pub fn resolve_dispenser<'a>(dataset: &'a DatasetDefinition, entry: &str) -> Option<&'a DataDispenser> {
    if is_asimov_entry(entry) {
        Some(dataset.model_dispenser())
    } else {
        dataset.data_dispenser(entry)
    }
}

/// True when the data side is a frozen copy of the model.
///
/// Any enabled dataset selecting a real entry forces every dataset through
/// its dispenser.
pub fn is_asimov_shared(data_type: DataType, force_asimov: bool, datasets: &[DatasetDefinition]) -> bool {
    data_type == DataType::Asimov
        || force_asimov
        || datasets
            .iter()
            .filter(|ds| ds.is_enabled())
            .all(|ds| is_asimov_entry(selected_entry(data_type, ds)))
}

fn nullify_masked_sets(parameters: &mut ParametersManager) {
    for set in parameters.sets_mut() {
        if set.is_mask_for_toy_generation() {
            set.nullify();
        }
    }
}

impl LikelihoodEngine {
    /// Model, then data, then pairs. Sample counts must agree.
    pub(crate) fn load(&mut self) -> Result<()> {
        self.load_model()?;
        self.load_data()?;
        self.pairs = build_sample_pairs(self.model.samples(), self.data.samples())?;
        log::info!("{} sample pairs", self.pairs.len());
        Ok(())
    }

    fn load_model(&mut self) -> Result<()> {
        log::info!("loading model");
        self.model.clear_content();
        for dataset in &self.datasets {
            if !dataset.is_enabled() {
                log::info!("dataset \"{}\" is disabled, skipping", dataset.name());
                continue;
            }
            self.model.load_dispenser(dataset.model_dispenser(), dataset.index())?;
        }
        self.model.shrink_dial_containers();
        self.model.build_dial_cache();
        self.model.reweight_events(&self.pool)?;
        self.model.update_bin_event_lists(&self.pool);
        self.model.refill_histograms(&self.pool);
        self.model.debug_print_loaded_events();
        self.model.print_breakdowns("model");
        Ok(())
    }

    fn load_data(&mut self) -> Result<()> {
        log::info!("loading data ({})", self.config.data_type);
        self.data.clear_content();

        if is_asimov_shared(self.config.data_type, self.config.force_asimov_data, &self.datasets) {
            self.load_asimov_data()?;
        } else {
            self.load_dispensed_data()?;
        }

        self.data.reweight_events(&self.pool)?;
        self.data.update_bin_event_lists(&self.pool);
        self.data.refill_histograms(&self.pool);

        if self.config.data_type == DataType::Toy {
            let options = StatThrowOptions {
                enabled: self.config.enable_stat_throw_in_toys,
                event_mc_throw: self.config.enable_event_mc_throw,
                gaussian: self.config.gauss_stat_throw_in_toys,
            };
            toys::throw_stat_errors(&mut self.data, &mut self.rng, options)?;
        }

        self.data.print_breakdowns("data");
        Ok(())
    }

    fn load_asimov_data(&mut self) -> Result<()> {
        let throw = self.config.data_type == DataType::Toy && self.config.throw_asimov_fit_parameters;
        if throw {
            toys::throw_toy_parameters(
                &mut self.model,
                &self.pool,
                &mut self.rng,
                self.config.toy_parameter_injector.as_ref(),
            )?;
        }

        log::info!("copying events from the model");
        self.data.copy_events_from(&self.model)?;
        self.data.shrink_dial_containers();
        self.data.build_dial_cache();

        if throw {
            self.model.parameters_mut().move_parameters_to_prior();
            self.model.propagate_parameters(&self.pool)?;
        }

        self.dataset_status = self
            .datasets
            .iter()
            .map(|ds| if ds.is_enabled() { DatasetStatus::Asimov } else { DatasetStatus::Disabled })
            .collect();
        Ok(())
    }

    fn load_dispensed_data(&mut self) -> Result<()> {
        let model_config = self.model.config().clone();
        // toy entries are simulation and must follow the parameters thrown on the data side
        let reweightable = self.config.data_type == DataType::Toy;
        let mut active_override: Option<(&str, &Value)> = None;
        let mut status = Vec::with_capacity(self.datasets.len());

        for dataset in &self.datasets {
            if !dataset.is_enabled() {
                log::info!("dataset \"{}\" is disabled, skipping", dataset.name());
                status.push(DatasetStatus::Disabled);
                continue;
            }
            let entry = selected_entry(self.config.data_type, dataset);
            let Some(dispenser) = resolve_dispenser(dataset, entry) else {
                log::warn!(
                    "dataset \"{}\": no data entry named \"{entry}\" (available: {}), skipping",
                    dataset.name(),
                    dataset.data_entry_names().collect::<Vec<_>>().join(", ")
                );
                status.push(DatasetStatus::Skipped);
                continue;
            };
            log::info!("dataset \"{}\": loading entry \"{}\"", dataset.name(), dispenser.name());

            if let Some(patch) = &dispenser.parameters().override_propagator_config
                && active_override.is_none_or(|(_, active)| active != patch)
            {
                if let Some((previous, _)) = active_override {
                    log::warn!(
                        "dataset \"{}\": its configuration override replaces the one of dataset \"{previous}\" for the whole data side",
                        dataset.name()
                    );
                } else {
                    log::warn!("dataset \"{}\": reloading the data configuration with overrides", dataset.name());
                }
                let mut merged = model_config.clone();
                merge_override(&mut merged, patch);
                self.data.reconfigure(&merged)?;
                active_override = Some((dataset.name(), patch));
            }

            nullify_masked_sets(self.data.parameters_mut());
            if reweightable {
                self.data.load_dispenser_reweightable(dispenser, dataset.index())?;
            } else {
                self.data.load_dispenser(dispenser, dataset.index())?;
            }
            status.push(if is_asimov_entry(entry) { DatasetStatus::Asimov } else { DatasetStatus::Loaded });
        }
        nullify_masked_sets(self.data.parameters_mut());
        self.dataset_status = status;

        self.data.shrink_dial_containers();
        self.data.build_dial_cache();

        if self.config.throw_asimov_fit_parameters {
            if self.data.dial_cache().n_links() == 0 {
                log::warn!("data events carry no dials, parameter throw skipped");
            } else {
                toys::throw_toy_parameters(
                    &mut self.data,
                    &self.pool,
                    &mut self.rng,
                    self.config.toy_parameter_injector.as_ref(),
                )?;
            }
        }
        Ok(())
    }
}
