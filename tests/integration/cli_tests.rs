//! Command-line front end tests

use super::fixtures::create_test_dir;
use std::process::{Command, Output};

fn tbuckets(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tbuckets"))
        .args(args)
        .env_remove("TBUCKETS_LIMIT")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run tbuckets")
}

const MANIFEST: &str = r#"{"tensors": [
    {"name": "a", "shape": [25], "dtype": "f32"},
    {"name": "b", "shape": [25], "dtype": "f32"},
    {"name": "c", "shape": [25], "dtype": "f32"},
    {"name": "d", "shape": [25], "dtype": "f32"},
    {"name": "e", "shape": [25], "dtype": "f32"},
    {"name": "big", "shape": [500], "dtype": "f16"}
]}"#;

#[test]
fn test_plan_json_output() {
    let (_dir, path) = create_test_dir();
    let manifest = path.join("tensors.json");
    std::fs::write(&manifest, MANIFEST).unwrap();

    let output = tbuckets(&["plan", "--manifest", manifest.to_str().unwrap(), "--limit", "250", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let buckets = plan.as_array().unwrap();
    let sizes: Vec<u64> = buckets.iter().map(|b| b["bytes"].as_u64().unwrap()).collect();
    assert_eq!(sizes, vec![200, 200, 100, 1000]);
    assert_eq!(buckets[3]["tensors"][0], "big");
    assert_eq!(buckets[3]["tensor_type"], "cpu.f16");
}

#[test]
fn test_plan_table_marks_oversized_chunks() {
    let (_dir, path) = create_test_dir();
    let manifest = path.join("tensors.json");
    std::fs::write(&manifest, MANIFEST).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_tbuckets"))
        .args(["plan", "--manifest", manifest.to_str().unwrap()])
        .env("TBUCKETS_LIMIT", "250")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("a, b"));
    assert!(stdout.contains("big (oversized)"));
}

#[test]
fn test_plan_uses_config_limit() {
    let (_dir, path) = create_test_dir();
    let manifest = path.join("tensors.json");
    let config = path.join("config.yaml");
    std::fs::write(&manifest, MANIFEST).unwrap();
    std::fs::write(&config, "bucket:\n  size_limit_bytes: 100000\n  parallel: false\n").unwrap();

    let output = tbuckets(&[
        "plan",
        "-m",
        manifest.to_str().unwrap(),
        "-c",
        config.to_str().unwrap(),
        "--json",
    ]);
    assert!(output.status.success());
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan.as_array().unwrap().len(), 2);
}

#[test]
fn test_config_validation() {
    let (_dir, path) = create_test_dir();
    let good = path.join("good.json");
    let bad = path.join("bad.json");
    std::fs::write(&good, r#"{"bucket": {"size_limit_bytes": 4096, "parallel": true}}"#).unwrap();
    std::fs::write(&bad, r#"{"bucket": {"size_limit_bytes": 0, "parallel": true}}"#).unwrap();

    let output = tbuckets(&["config", "--file", good.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("4096"));

    let output = tbuckets(&["config", "--file", bad.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_missing_manifest_fails() {
    let output = tbuckets(&["plan", "--manifest", "/nonexistent/tensors.json"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load manifest"));
}

#[test]
fn test_info() {
    let output = tbuckets(&["-q", "info"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("default bucket size: 26214400 bytes"));
}

#[test]
fn test_configured_log_level_drives_the_filter() {
    let (_dir, path) = create_test_dir();
    let manifest = path.join("tensors.json");
    let verbose = path.join("verbose.yaml");
    let silent = path.join("silent.yaml");
    std::fs::write(&manifest, MANIFEST).unwrap();
    std::fs::write(&verbose, "system:\n  log_level: debug\n").unwrap();
    std::fs::write(&silent, "system:\n  log_level: error\n").unwrap();

    let output = tbuckets(&["plan", "-m", manifest.to_str().unwrap(), "-c", verbose.to_str().unwrap()]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Using chunk size limit"), "{}", stderr);

    let output = tbuckets(&["plan", "-m", manifest.to_str().unwrap(), "-c", silent.to_str().unwrap()]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("Using chunk size limit"), "{}", stderr);
    assert!(!stderr.contains("chunks"), "{}", stderr);
}

#[test]
fn test_unknown_log_level_fails_validation() {
    let (_dir, path) = create_test_dir();
    let config = path.join("config.yaml");
    std::fs::write(&config, "system:\n  log_level: chatty\n").unwrap();

    let output = tbuckets(&["config", "--file", config.to_str().unwrap()]);
    assert!(!output.status.success());
}
