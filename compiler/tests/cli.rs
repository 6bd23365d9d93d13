// Command-line tests for the patchc binary.
//
// Each test runs the built binary against a document in tests/fixtures and
// checks exit status, stdout and stderr.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

fn patchc_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_patchc"))
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn run(args: &[&str], input: &Path) -> Output {
    Command::new(patchc_binary())
        .args(args)
        .arg(input)
        .output()
        .expect("failed to run patchc")
}

fn run_ok(args: &[&str], input: &Path) -> String {
    let output = run(args, input);
    assert!(
        output.status.success(),
        "patchc failed with args {:?}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

fn run_json(args: &[&str], input: &Path) -> Value {
    serde_json::from_str(&run_ok(args, input)).unwrap()
}

#[test]
fn emits_ir_by_default() {
    let ir = run_json(&[], &fixture("osc.hv.json"));
    assert_eq!(ir["name"]["display"], "osc");
    assert_eq!(ir["name"]["escaped"], "osc");
    assert_eq!(ir["signal"]["numOutputBuffers"], 2);
    assert_eq!(ir["signal"]["numInputBuffers"], 0);

    let objects = ir["objects"].as_object().unwrap();
    let types: Vec<&str> = objects.values().map(|o| o["type"].as_str().unwrap()).collect();
    assert!(types.contains(&"__phasor_k~f"), "{types:?}");
    assert!(types.contains(&"__mul~f"), "{types:?}");
    assert_eq!(types.iter().filter(|&&t| t == "__add~f").count(), 2);
    for key in objects.keys() {
        assert_eq!(key.len(), 8, "{key}");
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()), "{key}");
    }

    let order = ir["signal"]["processOrder"].as_array().unwrap();
    assert_eq!(order.len(), objects.len());
    // the oscillator has no signal inputs and runs first
    let first = &order[0]["id"];
    assert_eq!(ir["objects"][first.as_str().unwrap()]["type"], "__phasor_k~f");
}

#[test]
fn summary_counts_loaded_objects() {
    let summary = run_json(&["--emit", "summary"], &fixture("osc.hv.json"));
    assert_eq!(summary["name"], "osc");
    assert_eq!(summary["total_objects"], 3);
    assert_eq!(summary["objects"]["phasor"], 1);
    assert_eq!(summary["objects"]["*"], 1);
    assert_eq!(summary["objects"]["dac"], 1);
    assert_eq!(summary["warnings"], 0);
    assert!(summary["buffers"]["float"].as_u64().unwrap() >= 1);
}

#[test]
fn build_info_hashes_the_source() {
    let info = run_json(&["--emit", "build-info"], &fixture("osc.hv.json"));
    let hash = info["source_hash"].as_str().unwrap();
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(info["compiler_version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn name_flag_overrides_the_document_name() {
    let ir = run_json(&["--name", "synth"], &fixture("osc.hv.json"));
    assert_eq!(ir["name"]["display"], "synth");
}

#[test]
fn pretty_output_is_the_same_document() {
    let compact = run_ok(&[], &fixture("osc.hv.json"));
    let pretty = run_ok(&["--pretty"], &fixture("osc.hv.json"));
    assert!(pretty.lines().count() > compact.lines().count());
    let a: Value = serde_json::from_str(&compact).unwrap();
    let b: Value = serde_json::from_str(&pretty).unwrap();
    assert_eq!(a, b);
}

#[test]
fn output_flag_writes_a_file() {
    let dir = std::env::temp_dir().join(format!("patchc-cli-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let out = dir.join("osc.ir.json");
    let stdout = run_ok(&["-o", out.to_str().unwrap()], &fixture("osc.hv.json"));
    assert!(stdout.is_empty());
    let written: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["name"]["display"], "osc");
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn verbose_reports_each_pass() {
    let output = run(&["--verbose"], &fixture("osc.hv.json"));
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    for pass in ["resolve_types", "reduce", "cascade_expansion", "assign_buffers"] {
        assert!(stderr.contains(&format!("patchc: {pass} complete")), "{stderr}");
    }
}

#[test]
fn abstractions_are_found_through_import_paths() {
    let input = fixture("uses_gain.hv.json");

    let output = run(&[], &input);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error[E0109]"));

    let lib = fixture("lib");
    let ir = run_json(&["-I", lib.to_str().unwrap()], &input);
    let objects = ir["objects"].as_object().unwrap();
    let mul = objects.values().find(|o| o["type"] == "__mul~f").unwrap();
    assert!(mul["args"].as_object().is_some());
    let constant = objects.values().find(|o| o["type"] == "__var_k~f").unwrap();
    assert_eq!(constant["args"]["k"], 0.25);
    // graph proxies never reach the IR
    assert!(objects.values().all(|o| o["type"] != "__inlet" && o["type"] != "__outlet"));
}

#[test]
fn merged_receivers_fire_in_priority_order() {
    let ir = run_json(&[], &fixture("receivers.hv.json"));
    let receivers = ir["control"]["receivers"].as_object().unwrap();
    assert_eq!(receivers.len(), 1);
    let freq = &receivers["freq"];
    assert_eq!(freq["display"], "freq");
    let ids = freq["ids"].as_array().unwrap();
    assert_eq!(ids.len(), 1);

    let routes = ir["control"]["sendMessage"].as_array().unwrap();
    let receiver = routes.iter().find(|r| r["id"] == ids[0]).unwrap();
    let labels: Vec<&str> = receiver["onMessage"][0]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| ir["objects"][m["id"].as_str().unwrap()]["args"]["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, ["second", "first"]);

    let send = routes.iter().find(|r| r["name"] == "freq").unwrap();
    assert_eq!(send["hash"], freq["hash"]);
    assert_eq!(send["onMessage"][0][0]["id"], ids[0]);
}

#[test]
fn compile_errors_exit_with_one_and_print_the_report() {
    let output = run(&[], &fixture("unknown_type.hv.json"));
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error[E0109]: object type \"osc~\" cannot be found"), "{stderr}");
    assert!(stderr.contains("--> osc~ x in broken"), "{stderr}");
}

#[test]
fn missing_input_exits_with_two() {
    let output = run(&[], &fixture("does_not_exist.hv.json"));
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("patchc: error:"));
}
