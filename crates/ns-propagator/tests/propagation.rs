use approx::assert_relative_eq;
use ns_propagator::{DatasetConfig, DatasetDefinition, ParameterKind, ParameterRef, Propagator, WorkerPool};
use serde_json::Value;

fn fixture() -> Value {
    serde_json::from_str(include_str!("../../../tests/fixtures/likelihood_single_dataset.json")).unwrap()
}

fn loaded(n_threads: usize) -> (Propagator, WorkerPool) {
    let doc = fixture();
    let pool = WorkerPool::new(n_threads).unwrap();
    let mut propagator = Propagator::from_value(&doc["propagatorConfig"]).unwrap();
    let ds_cfg: DatasetConfig = serde_json::from_value(doc["dataSetList"][0].clone()).unwrap();
    let dataset = DatasetDefinition::from_config(&ds_cfg, 0).unwrap();
    let n = propagator.load_dispenser(dataset.model_dispenser(), 0).unwrap();
    assert_eq!(n, 12, "the nu_tau record targets no sample");
    propagator.build_dial_cache();
    propagator.reweight_events(&pool).unwrap();
    propagator.update_bin_event_lists(&pool);
    propagator.refill_histograms(&pool);
    (propagator, pool)
}

#[test]
fn test_nominal_histograms() {
    let (p, _) = loaded(1);
    let samples = p.samples().samples();
    assert_eq!(samples[0].histogram().content(), &[21.5, 34.0, 6.5]);
    assert_eq!(samples[1].histogram().content(), &[5.5, 1.5]);
    // last nc event lies outside the binning
    assert_eq!(samples[2].histogram().content(), &[4.0, 5.0, 3.5]);
    assert_eq!(samples[2].nb_binned_events(), 3);
}

#[test]
fn test_dials_follow_parameters() {
    let (mut p, pool) = loaded(2);
    let flux_numu = ParameterRef { set: 0, index: 0, kind: ParameterKind::Original };
    let energy_scale = ParameterRef { set: 1, index: 0, kind: ParameterKind::Original };
    p.parameters_mut().set_parameter_value(flux_numu, 1.1).unwrap();
    p.parameters_mut().set_parameter_value(energy_scale, 1.2).unwrap();
    p.propagate_parameters(&pool).unwrap();

    let numu = p.samples().samples()[0].histogram().content().to_vec();
    // below 1.0 only the flux dial applies; above, the graph dial adds x1.2
    assert_relative_eq!(numu[0], 21.5 * 1.1, epsilon = 1e-12);
    assert_relative_eq!(numu[1], 34.0 * 1.1 * 1.2, epsilon = 1e-12);
    assert_relative_eq!(numu[2], 6.5 * 1.1 * 1.2, epsilon = 1e-12);

    let nc = p.samples().samples()[2].histogram().content().to_vec();
    assert_relative_eq!(nc[0], 4.0, epsilon = 1e-12);
    assert_relative_eq!(nc[1], 5.0 * 1.2, epsilon = 1e-12);
    assert_relative_eq!(nc[2], 3.5 * 1.2, epsilon = 1e-12);
}

#[test]
fn test_thread_count_does_not_change_content() {
    let (a, _) = loaded(1);
    let (b, _) = loaded(3);
    for (sa, sb) in a.samples().samples().iter().zip(b.samples().samples()) {
        assert_eq!(sa.histogram().content(), sb.histogram().content());
        assert_eq!(sa.histogram().sum_w2(), sb.histogram().sum_w2());
    }
}

#[test]
fn test_frozen_copy_ignores_parameters() {
    let (model, pool) = loaded(1);
    let mut data = Propagator::from_value(model.config()).unwrap();
    data.copy_events_from(&model).unwrap();
    data.build_dial_cache();
    assert_eq!(data.dial_cache().n_links(), 0);

    let flux_numu = ParameterRef { set: 0, index: 0, kind: ParameterKind::Original };
    data.parameters_mut().set_parameter_value(flux_numu, 2.0).unwrap();
    data.reweight_events(&pool).unwrap();
    data.update_bin_event_lists(&pool);
    data.refill_histograms(&pool);
    for (m, d) in model.samples().samples().iter().zip(data.samples().samples()) {
        assert_eq!(m.histogram().content(), d.histogram().content());
    }
}

#[test]
fn test_breakdown_matches_histograms() {
    let (p, _) = loaded(1);
    let breakdown = p.breakdown();
    assert_eq!(breakdown.len(), 3);
    for (row, sample) in breakdown.iter().zip(p.samples().samples()) {
        assert_eq!(row.name, sample.name());
        assert_relative_eq!(row.sum_weights, sample.histogram().sum(), epsilon = 1e-12);
    }
}
