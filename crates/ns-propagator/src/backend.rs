//! Reweighting backends.

use crate::dial::{DialCollection, EventDialCache};
use crate::manager::ParametersManager;
use crate::pool::WorkerPool;
use crate::sample::Sample;
use ns_core::Result;
use std::fmt::Debug;

/// Computes event weights from the current parameter state.
///
/// The CPU implementation is always available; accelerated implementations
/// plug in behind the same trait and must produce the same weights.
pub trait ReweightBackend: Send + Sync + Debug {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Set `weight = base_weight * mc_throw_factor * prod(dial responses)` on every event.
    fn reweight(
        &self,
        samples: &mut [Sample],
        cache: &EventDialCache,
        dials: &[DialCollection],
        parameters: &ParametersManager,
        pool: &WorkerPool,
    ) -> Result<()>;
}

/// Per-sample reweighting on the worker pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuReweightBackend;

impl ReweightBackend for CpuReweightBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn reweight(
        &self,
        samples: &mut [Sample],
        cache: &EventDialCache,
        dials: &[DialCollection],
        parameters: &ParametersManager,
        pool: &WorkerPool,
    ) -> Result<()> {
        let responses: Vec<f64> = dials.iter().map(|d| d.response(parameters)).collect();
        let per_sample = cache.per_sample();
        pool.run_job(samples, |i, sample| {
            let links = per_sample.get(i);
            for (e, event) in sample.events_mut().iter_mut().enumerate() {
                let mut weight = event.base_weight * event.mc_throw_factor;
                if let Some(event_links) = links.and_then(|l| l.get(e)) {
                    for &d in event_links {
                        weight *= responses[d];
                    }
                }
                event.weight = weight;
            }
        });
        Ok(())
    }
}
