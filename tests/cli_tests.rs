//! End-to-end tests of the model-runner binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn demo_plugin() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/plugins/replay_sampler.lua")
}

fn runner(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("model-runner").unwrap();
    // keep a developer's ~/.model-runner/config.yaml out of the picture
    cmd.env("HOME", home).env_remove("RUST_LOG");
    cmd
}

/// Ten sales rows and an empty-options metadata document
fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
    let mut csv = String::from("region,amount\n");
    for i in 1..=10 {
        let region = if i % 2 == 1 { "north" } else { "south" };
        csv.push_str(&format!("{region},{i}\n"));
    }
    let data = dir.join("sales.csv");
    fs::write(&data, csv).unwrap();

    let metadata = dir.join("metadata.json");
    fs::write(&metadata, r#"{"options": {}, "schema": {"columns": ["region", "amount"]}}"#).unwrap();
    (data, metadata)
}

fn train(dir: &TempDir) -> PathBuf {
    let (data, metadata) = write_inputs(dir.path());
    let model = dir.path().join("model");

    runner(dir.path())
        .arg("train")
        .arg("ReplaySampler")
        .arg(demo_plugin())
        .arg(&data)
        .arg(&metadata)
        .arg(&model)
        .assert()
        .success();
    model
}

#[test]
fn test_train_writes_train_info() {
    let dir = TempDir::new().unwrap();
    let model = train(&dir);

    assert_eq!(
        fs::read_to_string(model.join("train_info.json")).unwrap(),
        r#"{"base_table_rows":10,"trained_rows":10}"#
    );
    assert!(model.join("replay_sampler.state.lua").exists());
}

#[test]
fn test_synopsis_writes_csv_with_header() {
    let dir = TempDir::new().unwrap();
    let model = train(&dir);
    let output = dir.path().join("synopsis.csv");

    runner(dir.path())
        .args(["synopsis", "ReplaySampler"])
        .arg(demo_plugin())
        .arg(&model)
        .arg("5")
        .arg(&output)
        .assert()
        .success();

    let written = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], "region,amount");
    assert_eq!(lines[1], "north,1");
}

#[test]
fn test_infer_without_output_file_prints_to_stdout() {
    let dir = TempDir::new().unwrap();
    let model = train(&dir);
    let before: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();

    runner(dir.path())
        .args(["infer", "ReplaySampler"])
        .arg(demo_plugin())
        .arg(&model)
        .args(["COUNT(*)", "", ""])
        .assert()
        .success()
        .stdout("10\n");

    let after: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(before.len(), after.len());
}

#[test]
fn test_infer_with_output_and_confidence_files() {
    let dir = TempDir::new().unwrap();
    let model = train(&dir);
    let output = dir.path().join("result.csv");
    let confidence = dir.path().join("confidence.json");

    runner(dir.path())
        .args(["infer", "ReplaySampler"])
        .arg(demo_plugin())
        .arg(&model)
        .args(["SUM(amount)", "region", "amount <= 4"])
        .arg(&output)
        .arg("--confidence-output")
        .arg(&confidence)
        .assert()
        .success()
        .stdout("");

    assert_eq!(fs::read_to_string(&output).unwrap(), "north,4\nsouth,6\n");
    let intervals: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&confidence).unwrap()).unwrap();
    assert_eq!(intervals[1]["upper"], serde_json::json!(6));
}

#[test]
fn test_list_writes_hyperparameters_without_a_model() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("hyperparameters.json");

    runner(dir.path())
        .args(["list", "ReplaySampler"])
        .arg(demo_plugin())
        .arg(&output)
        .assert()
        .success();

    let listed: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(listed["max_rows"]["type"], serde_json::json!("int"));
    assert_eq!(listed["max_rows"]["default"], serde_json::json!(0));
}

const LISTING: &str = r#"
Listing = {}
Listing.__index = Listing
function Listing:new(options) return setmetatable({}, self) end
function Listing:train(data, metadata) end
function Listing:save(path) end
function Listing:load(path) end
function Listing:synopsis(n) return { columns = {}, rows = {} } end
function Listing:infer(agg, group, where) return {}, nil end
function Listing:list_hyperparameters()
  return {
    { name = "lr", type = "float", default_value = 0.1 },
    { name = "depth", type = { "int", "float" }, description = 3 },
  }
end
"#;

#[test]
fn test_list_writes_plugin_document_unchanged() {
    let dir = TempDir::new().unwrap();
    let plugin = dir.path().join("listing.lua");
    fs::write(&plugin, LISTING).unwrap();
    let output = dir.path().join("hyperparameters.json");

    runner(dir.path())
        .args(["list", "Listing"])
        .arg(&plugin)
        .arg(&output)
        .assert()
        .success();

    let written = fs::read_to_string(&output).unwrap();
    assert!(!written.contains('\n'));
    let listed: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(
        listed,
        serde_json::json!([
            {"name": "lr", "type": "float", "default_value": 0.1},
            {"name": "depth", "type": ["int", "float"], "description": 3}
        ])
    );
}

#[test]
fn test_missing_plugin_fails_with_message() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("hyperparameters.json");

    runner(dir.path())
        .args(["list", "ReplaySampler", "/no/such/plugin.lua"])
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("plugin not found"));

    assert!(!output.exists());
}

#[test]
fn test_remote_uri_is_rejected() {
    let dir = TempDir::new().unwrap();

    runner(dir.path())
        .args(["list", "ReplaySampler", "https://models.example.com/replay.lua"])
        .arg(dir.path().join("out.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported URI scheme"));
}

#[test]
fn test_config_file_delimiter() {
    let dir = TempDir::new().unwrap();
    let model = train(&dir);
    let config = dir.path().join("runner.yaml");
    fs::write(&config, "data:\n  delimiter: \";\"\n").unwrap();
    let output = dir.path().join("synopsis.csv");

    runner(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["synopsis", "ReplaySampler"])
        .arg(demo_plugin())
        .arg(&model)
        .arg("2")
        .arg(&output)
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "region;amount\nnorth;1\nsouth;2\n"
    );
}
