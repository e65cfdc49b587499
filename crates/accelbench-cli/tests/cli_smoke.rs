//! Black-box runs of the `accelbench` binary: usage, reports and exit codes.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

const MODEL: &str = r#"{
    "name": "tiny",
    "inputs":  [{ "name": "input",  "element_type": "f32", "shape": [1, 4] }],
    "outputs": [{ "name": "output", "element_type": "f32", "shape": [1, 2] }],
    "compute_micros": 100
}"#;

fn accelbench() -> Command {
    let mut cmd = Command::cargo_bin("accelbench").unwrap();
    for key in [
        "ACCELBENCH_FAKE_ADAPTERS",
        "ACCELBENCH_ITERATIONS",
        "ACCELBENCH_DEVICE",
        "ACCELBENCH_WAIT_TIMEOUT_MS",
        "ACCELBENCH_LOG_LEVEL",
        "ACCELBENCH_LOG_FORMAT",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

fn model_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(MODEL.as_bytes()).unwrap();
    file
}

#[test]
fn help_works() {
    accelbench().arg("--help").assert().success();
}

#[test]
fn version_works() {
    accelbench().arg("--version").assert().success();
}

#[test]
fn no_model_prints_usage_and_capabilities() {
    accelbench()
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("Execution providers"))
        .stdout(predicate::str::contains("Reference NPU"));
}

#[test]
fn benchmark_reports_average_latency() {
    let model = model_file();
    accelbench()
        .arg(model.path())
        .arg("3")
        .assert()
        .success()
        .stdout(predicate::str::contains("Model load took:"))
        .stdout(predicate::str::contains("Average inference time:"))
        .stdout(predicate::str::contains("over 3 iterations"));
}

#[test]
fn json_report_parses() {
    let model = model_file();
    let out = accelbench()
        .args(["--format", "json"])
        .arg(model.path())
        .args(["4", "any"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["iterations"], 4);
    assert_eq!(v["adapter"], "Reference GPU");
    assert_eq!(v["compute_only"], false);
}

#[test]
fn no_adapters_exits_with_no_accelerator_code() {
    let model = model_file();
    accelbench()
        .args(["--adapters", "none"])
        .arg(model.path())
        .assert()
        .code(3)
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn adapters_env_var_is_honoured() {
    let model = model_file();
    accelbench()
        .env("ACCELBENCH_FAKE_ADAPTERS", "unavailable")
        .arg(model.path())
        .assert()
        .code(3);
}

#[test]
fn missing_model_exits_with_model_load_code() {
    accelbench().arg("/no/such/model.json").assert().code(5);
}

#[test]
fn zero_iterations_is_a_config_error() {
    let model = model_file();
    accelbench().arg(model.path()).arg("0").assert().code(2);
}

#[test]
fn unknown_device_fails() {
    let model = model_file();
    accelbench().arg(model.path()).args(["10", "tpu"]).assert().failure();
}
