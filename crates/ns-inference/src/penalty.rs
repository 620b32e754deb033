//! Prior penalty of a parameter set.

use ns_propagator::ParameterSet;

/// Penalty term of one set.
///
/// Disabled sets and sets without a prior covariance contribute 0. Eigen
/// sets sum the squared standardized deviations of their non-fixed eigen
/// parameters; other sets use `delta^T Sigma^-1 delta` over the constrained
/// parameters.
pub fn penalty_likelihood(set: &ParameterSet) -> f64 {
    if !set.is_enabled() || set.prior_covariance().is_none() {
        return 0.0;
    }
    if set.is_eigen_decomposed() {
        return set
            .eigen_parameters()
            .iter()
            .filter(|p| !p.is_fixed())
            .map(|p| {
                let z = (p.value() - p.prior_value()) / p.std_dev();
                z * z
            })
            .sum();
    }
    match set.inverse_stripped_covariance() {
        Some(inverse) => {
            let delta = set.delta_vector();
            delta.dot(&(inverse * &delta))
        }
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ns_propagator::config::ParameterSetConfig;
    use serde_json::json;

    fn set(value: serde_json::Value) -> ParameterSet {
        let cfg: ParameterSetConfig = serde_json::from_value(value).unwrap();
        ParameterSet::from_config(&cfg, 0).unwrap()
    }

    #[test]
    fn test_one_parameter_hand_computed() {
        let mut s = set(json!({
            "name": "one",
            "priorCovariance": [[4.0]],
            "parameterDefinitions": [{ "name": "p", "priorValue": 1.0 }]
        }));
        s.parameters_mut()[0].set_value(5.0);
        assert_relative_eq!(penalty_likelihood(&s), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_no_covariance_is_zero() {
        let mut s = set(json!({
            "name": "free",
            "parameterDefinitions": [{ "name": "p", "stdDev": 0.1 }]
        }));
        s.parameters_mut()[0].set_value(100.0);
        assert_eq!(penalty_likelihood(&s), 0.0);
    }

    #[test]
    fn test_disabled_set_is_zero() {
        let mut s = set(json!({
            "name": "off",
            "isEnabled": false,
            "priorCovariance": [[1.0]],
            "parameterDefinitions": [{ "name": "p" }]
        }));
        s.parameters_mut()[0].set_value(3.0);
        assert_eq!(penalty_likelihood(&s), 0.0);
    }

    #[test]
    fn test_eigen_and_direct_forms_agree() {
        let cov = json!([[0.04, 0.012], [0.012, 0.09]]);
        let mut direct = set(json!({
            "name": "d",
            "priorCovariance": cov,
            "parameterDefinitions": [{ "name": "a" }, { "name": "b" }]
        }));
        let mut eigen = set(json!({
            "name": "e",
            "useEigenDecomposition": true,
            "priorCovariance": cov,
            "parameterDefinitions": [{ "name": "a" }, { "name": "b" }]
        }));
        for s in [&mut direct, &mut eigen] {
            s.parameters_mut()[0].set_value(1.1);
            s.parameters_mut()[1].set_value(0.7);
        }
        eigen.propagate_original_to_eigen();
        assert_relative_eq!(penalty_likelihood(&direct), penalty_likelihood(&eigen), epsilon = 1e-9);
    }

    #[test]
    fn test_fixed_parameter_excluded() {
        let mut s = set(json!({
            "name": "two",
            "priorCovariance": [[1.0, 0.0], [0.0, 1.0]],
            "parameterDefinitions": [{ "name": "a", "isFixed": true }, { "name": "b" }]
        }));
        s.parameters_mut()[0].set_value(10.0);
        s.parameters_mut()[1].set_value(2.0);
        assert_relative_eq!(penalty_likelihood(&s), 1.0, epsilon = 1e-12);
    }
}
