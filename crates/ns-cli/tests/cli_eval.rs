use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ns-cli"))
}

fn repo_root() -> PathBuf {
    // crates/ns-cli -> repo root
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").canonicalize().unwrap()
}

fn fixture_path(name: &str) -> PathBuf {
    repo_root().join("tests/fixtures").join(name)
}

fn tmp_path(filename: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("ns_cli_{}_{}_{}", std::process::id(), nanos, filename));
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn stdout_json(out: &Output) -> serde_json::Value {
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).expect("stdout should be valid JSON")
}

#[test]
fn eval_nominal_asimov_is_zero() {
    let config = fixture_path("likelihood_single_dataset.json");
    let v = stdout_json(&run(&["eval", "--config", config.to_str().unwrap()]));

    assert_eq!(v["data_type"], "Asimov");
    assert_eq!(v["joint_probability"], "PoissonLLH");
    assert_eq!(v["summary"]["buffer"]["total_likelihood"].as_f64(), Some(0.0));
    assert_eq!(v["nb_fit_parameters"], 4);
    assert_eq!(v["nb_fit_bins"], 8);
    assert_eq!(v["datasets"][0]["status"], "asimov");
    assert_eq!(v["summary"]["samples"].as_array().unwrap().len(), 3);
}

#[test]
fn eval_with_injection_moves_the_likelihood() {
    let config = fixture_path("likelihood_single_dataset.json");
    let inject = tmp_path("inject.json");
    std::fs::write(
        &inject,
        r#"{ "parameterSetList": [{ "name": "flux", "parameterValues": [1.1, 1.0] }] }"#,
    )
    .unwrap();

    let v = stdout_json(&run(&[
        "eval",
        "--config",
        config.to_str().unwrap(),
        "--inject",
        inject.to_str().unwrap(),
    ]));
    let total = v["summary"]["buffer"]["total_likelihood"].as_f64().unwrap();
    let penalty = v["summary"]["buffer"]["penalty_likelihood"].as_f64().unwrap();
    assert!(total > 0.0 && total.is_finite());
    assert!(penalty > 0.0);
    let p = v["p_value"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&p));
    let _ = std::fs::remove_file(&inject);
}

#[test]
fn eval_legacy_config_reports_migrations() {
    let config = fixture_path("likelihood_legacy_keys.json");
    let v = stdout_json(&run(&["eval", "--config", config.to_str().unwrap()]));
    assert_eq!(v["applied_migrations"].as_array().unwrap().len(), 7);
    assert_eq!(v["joint_probability"], "LeastSquares");
}

#[test]
fn eval_toy_is_reproducible_per_seed() {
    let config = fixture_path("likelihood_toy.json");
    let a = stdout_json(&run(&["eval", "--config", config.to_str().unwrap(), "--seed", "7"]));
    let b = stdout_json(&run(&["eval", "--config", config.to_str().unwrap(), "--seed", "7"]));
    assert_eq!(a["summary"], b["summary"]);
    assert_eq!(a["datasets"][0]["status"], "loaded");
    assert_eq!(a["datasets"][1]["status"], "skipped");
}

#[test]
fn eval_data_type_override_and_event_source() {
    let config_src = fixture_path("likelihood_single_dataset.json");
    let mut document: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(config_src).unwrap()).unwrap();
    document["dataSetList"][0]["selectedDataEntry"] = serde_json::json!("run1");
    document["dataSetList"][0]["data"] = serde_json::json!([{ "name": "run1", "eventSource": "disk" }]);
    let config = tmp_path("real_data.json");
    std::fs::write(&config, serde_json::to_string(&document).unwrap()).unwrap();

    let events = tmp_path("events.json");
    std::fs::write(
        &events,
        r#"{ "dispensers": { "run1": [
            { "sample": "numu_cc", "variables": { "reco_energy": 0.5, "cos_theta": 0.1 }, "weight": 1.0 }
        ] } }"#,
    )
    .unwrap();

    let source = format!("disk={}", events.display());
    let v = stdout_json(&run(&[
        "eval",
        "--config",
        config.to_str().unwrap(),
        "--data-type",
        "real-data",
        "--event-source",
        &source,
    ]));
    assert_eq!(v["data_type"], "RealData");
    assert_eq!(v["datasets"][0]["status"], "loaded");
    assert!(v["summary"]["buffer"]["stat_likelihood"].as_f64().unwrap() > 0.0);

    let _ = std::fs::remove_file(&config);
    let _ = std::fs::remove_file(&events);
}

#[test]
fn eval_unknown_joint_probability_fails() {
    let config_src = fixture_path("likelihood_single_dataset.json");
    let mut document: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(config_src).unwrap()).unwrap();
    document["jointProbabilityConfig"] = serde_json::json!({ "type": "NotALikelihood" });
    let config = tmp_path("bad_tag.json");
    std::fs::write(&config, serde_json::to_string(&document).unwrap()).unwrap();

    let out = run(&["eval", "--config", config.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("NotALikelihood"));
    let _ = std::fs::remove_file(&config);
}

#[test]
fn export_writes_rates_and_events() {
    let config = fixture_path("likelihood_single_dataset.json");
    let output = tmp_path("export.json");
    let out = run(&[
        "export",
        "--config",
        config.to_str().unwrap(),
        "--events",
        "--output",
        output.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(v["rates"].as_array().unwrap().len(), 6);
    assert_eq!(v["rates"][0]["content"], serde_json::json!([21.5, 34.0, 6.5]));
    assert_eq!(v["events"].as_array().unwrap().len(), 6);
    let _ = std::fs::remove_file(&output);
}

#[test]
fn migrate_relocates_legacy_keys() {
    let config = fixture_path("likelihood_legacy_keys.json");
    let v = stdout_json(&run(&["migrate", "--config", config.to_str().unwrap()]));
    assert_eq!(v["throwAsimovFitParameters"], true);
    assert_eq!(v["dataSetList"][0]["name"], "legacy");
    assert_eq!(v["jointProbabilityConfig"]["type"], "LeastSquares");
}
