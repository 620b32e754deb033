//! Toy generation on a loaded propagator.
//!
//! Two independent perturbations: a parameter throw (or a fixed injection)
//! followed by reweighting, and a statistical throw of the binned content.

use ns_core::Result;
use ns_propagator::{ParameterInjection, Propagator, WorkerPool};
use rand::Rng;

/// Options of the statistical throw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatThrowOptions {
    /// Master switch
    pub enabled: bool,
    /// Poisson(1) factor per event before the bin throw.
    pub event_mc_throw: bool,
    /// Gaussian instead of Poisson bin throws.
    pub gaussian: bool,
}

/// Move `propagator` away from its prior and reweight.
///
/// A non-empty `injector` takes precedence over the random throw.
pub fn throw_toy_parameters<R: Rng + ?Sized>(
    propagator: &mut Propagator,
    pool: &WorkerPool,
    rng: &mut R,
    injector: Option<&ParameterInjection>,
) -> Result<()> {
    propagator.reweight_events(pool)?;
    propagator.print_breakdowns("before parameter throw,");
    propagator.debug_print_loaded_events();

    match injector.filter(|inj| !inj.is_empty()) {
        Some(injection) => {
            log::warn!("injecting toy parameters");
            propagator.parameters_mut().inject_parameter_values(injection)?;
        }
        None => {
            log::warn!("throwing toy parameters according to the prior covariances");
            propagator.parameters_mut().throw_parameters(rng)?;
        }
    }
    propagator.parameters_mut().propagate_eigen();
    propagator.reweight_events(pool)
}

/// Fluctuate the binned content of every sample.
///
/// Histograms must already be binned.
pub fn throw_stat_errors<R: Rng + ?Sized>(
    propagator: &mut Propagator,
    rng: &mut R,
    options: StatThrowOptions,
) -> Result<()> {
    if !options.enabled {
        log::warn!("statistical throw is disabled, skipping");
        return Ok(());
    }

    if options.event_mc_throw {
        log::info!("throwing individual MC events");
        for sample in propagator.samples_mut().samples_mut() {
            sample.throw_event_mc_error(rng)?;
        }
    } else {
        log::warn!("event MC throw is disabled, individual MC events are not thrown");
    }

    if options.gaussian {
        log::warn!("gaussian statistical throws: distribution is truncated for bins close to zero");
    }
    for sample in propagator.samples_mut().samples_mut() {
        sample.throw_stat_error(rng, options.gaussian)?;
    }
    Ok(())
}
