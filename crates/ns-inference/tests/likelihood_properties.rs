use approx::assert_relative_eq;
use ns_core::RunContext;
use ns_inference::{FitObjective, LikelihoodEngine, build_sample_pairs};
use ns_propagator::ParameterInjection;
use proptest::prelude::*;
use serde_json::{Value, json};

fn fixture() -> Value {
    serde_json::from_str(include_str!("../../../tests/fixtures/likelihood_single_dataset.json")).unwrap()
}

fn engine_from(document: &Value) -> LikelihoodEngine {
    let mut engine = LikelihoodEngine::new(document, RunContext::default()).unwrap();
    engine.initialize().unwrap();
    engine
}

fn shift_flux(engine: &mut LikelihoodEngine, numu: f64, nue: f64) {
    let injection: ParameterInjection = serde_json::from_value(json!({
        "parameterSetList": [{ "name": "flux", "parameterValues": [numu, nue] }]
    }))
    .unwrap();
    engine.model_mut().parameters_mut().inject_parameter_values(&injection).unwrap();
    engine.propagate_model().unwrap();
}

#[test]
fn test_scenario_single_dataset_poisson() {
    let engine = engine_from(&fixture());
    let summary = engine.summary();
    assert!(summary.buffer.total_likelihood.is_finite());
    assert_eq!(engine.joint_probability().unwrap().type_tag(), "PoissonLLH");
    let table = engine.dataset_breakdown_table();
    assert_eq!(table.n_rows(), 1);
    assert!(table.to_string().contains("| A "));
    assert_eq!(engine.sample_breakdown_table().n_rows(), 3);
}

#[test]
fn test_nominal_evaluation_matches_summary_and_is_idempotent() {
    let mut engine = engine_from(&fixture());
    let cached = engine.summary().buffer.total_likelihood;
    let first = engine.evaluate().unwrap();
    let second = engine.evaluate().unwrap();
    assert_eq!(first.to_bits(), cached.to_bits());
    assert_eq!(first.to_bits(), second.to_bits());
}

#[test]
fn test_evaluate_does_not_propagate() {
    let mut engine = engine_from(&fixture());
    let before = engine.evaluate().unwrap();
    let injection: ParameterInjection = serde_json::from_value(json!({
        "parameterSetList": [{ "name": "detector", "parameterList": [{ "name": "energy_scale", "value": 1.1 }] }]
    }))
    .unwrap();
    engine.model_mut().parameters_mut().inject_parameter_values(&injection).unwrap();
    // detector has no covariance: no penalty, and histograms are stale until propagation
    assert_eq!(engine.evaluate().unwrap(), before);
    engine.propagate_model().unwrap();
    assert!(engine.evaluate().unwrap() > before);
}

#[test]
fn test_penalty_without_covariance_is_zero() {
    let mut engine = engine_from(&fixture());
    let injection: ParameterInjection = serde_json::from_value(json!({
        "parameterSetList": [{ "name": "detector", "parameterValues": [1.19, 40.0] }]
    }))
    .unwrap();
    engine.model_mut().parameters_mut().inject_parameter_values(&injection).unwrap();
    assert_eq!(engine.parameter_set_penalties()[1], Some(0.0));
}

#[test]
fn test_penalty_one_parameter_hand_computed() {
    let document = json!({
        "propagatorConfig": {
            "parameterSetList": [{
                "name": "single",
                "priorCovariance": [[4.0]],
                "parameterDefinitions": [{ "name": "p", "priorValue": 0.0 }]
            }]
        }
    });
    let mut engine = engine_from(&document);
    let injection: ParameterInjection = serde_json::from_value(json!({
        "parameterSetList": [{ "name": "single", "parameterValues": [4.0] }]
    }))
    .unwrap();
    engine.model_mut().parameters_mut().inject_parameter_values(&injection).unwrap();
    engine.evaluate().unwrap();
    assert_relative_eq!(engine.buffer().penalty_likelihood, 4.0, epsilon = 1e-12);
    assert_eq!(engine.buffer().stat_likelihood, 0.0);
}

#[test]
fn test_disabling_a_sample_removes_exactly_its_term() {
    let mut engine = engine_from(&fixture());
    shift_flux(&mut engine, 1.15, 0.9);
    let all = engine.evaluate().unwrap();
    for k in 0..3 {
        let term = engine.sample_likelihood(k).unwrap();
        engine.set_sample_enabled(k, false).unwrap();
        let without = engine.evaluate().unwrap();
        assert_relative_eq!(all - without, term, epsilon = 1e-9);
        assert!(engine.summary().to_string().contains("disabled"));
        engine.set_sample_enabled(k, true).unwrap();
    }
    assert_relative_eq!(engine.evaluate().unwrap(), all, epsilon = 1e-12);
}

#[test]
fn test_asimov_data_equals_model_bins() {
    let engine = engine_from(&fixture());
    for (model, data) in engine.model().samples().samples().iter().zip(engine.data().samples().samples()) {
        assert_eq!(model.histogram().content(), data.histogram().content(), "sample {}", model.name());
    }
    assert_eq!(engine.buffer().stat_likelihood, 0.0);
}

#[test]
fn test_injection_round_trip_is_exact() {
    let mut engine = engine_from(&fixture());
    let values = [0.873_214_9, 1.304_56];
    shift_flux(&mut engine, values[0], values[1]);
    let read: Vec<f64> =
        engine.model().parameters().sets()[0].parameters().iter().map(|p| p.value()).collect();
    assert_eq!(read, values);
}

#[test]
fn test_objective_matches_engine_evaluation() {
    let engine = engine_from(&fixture());
    let objective = FitObjective::new(engine).unwrap();
    // flux_numu, flux_nue, energy_scale, nc_norm
    assert_eq!(objective.parameter_names().unwrap(), vec!["flux_numu", "flux_nue", "energy_scale", "nc_norm"]);
    let total = ns_core::ObjectiveFunction::eval(&objective, &[1.15, 0.9, 1.0, 1.0]).unwrap();

    let mut reference = engine_from(&fixture());
    shift_flux(&mut reference, 1.15, 0.9);
    assert_eq!(reference.evaluate().unwrap(), total);

    let engine = objective.into_engine().unwrap();
    assert_eq!(engine.buffer().total_likelihood, total);
}

fn with_enabled(mask: [bool; 3]) -> Value {
    let mut document = fixture();
    let list = document["propagatorConfig"]["sampleSetConfig"]["sampleList"].as_array_mut().unwrap();
    for (sample, enabled) in list.iter_mut().zip(mask) {
        sample["isEnabled"] = Value::Bool(enabled);
    }
    document
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_pairs_follow_enabled_samples(mask in proptest::array::uniform3(any::<bool>())) {
        let engine = engine_from(&with_enabled(mask));
        let expected: Vec<usize> = (0..3).filter(|&i| mask[i]).collect();
        let indices: Vec<usize> = engine.sample_pairs().iter().map(|p| p.index).collect();
        prop_assert_eq!(&indices, &expected);

        let again = build_sample_pairs(engine.model().samples(), engine.data().samples()).unwrap();
        prop_assert_eq!(again.as_slice(), engine.sample_pairs());
    }

    #[test]
    fn prop_normalized_round_trip(
        numu in 0.5f64..1.5,
        nue in 0.2f64..2.0,
        scale in 0.8f64..1.2,
        nc in -3.0f64..3.0,
    ) {
        let objective = FitObjective::new(engine_from(&fixture())).unwrap();
        let real = vec![numu, nue, scale, nc];
        let decoded = objective.decode(&objective.encode(&real).unwrap()).unwrap();
        for (x, y) in real.iter().zip(&decoded) {
            prop_assert!((x - y).abs() <= 1e-9);
        }
    }
}
