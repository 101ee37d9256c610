//! Shared test infrastructure for integration tests.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const ENDPOINT: &str = "145.23.218.149";

/// Remote time axis: days 0..=3 since the epoch, two grid cells per step.
pub fn remote_document() -> Value {
    json!({
        "dimensions": {"time": 4, "x": 2},
        "variables": {
            "time": {
                "dimensions": ["time"],
                "attributes": {"units": "days since 1970-01-01", "calendar": "standard"},
                "data": [0.0, 1.0, 2.0, 3.0]
            },
            "precip": {
                "dimensions": ["time", "x"],
                "attributes": {"units": "mm"},
                "data": [9.0, 9.0, 1.0, 2.0, 3.0, 4.0, 0.0, 0.0]
            },
            "lon": {"dimensions": ["x"], "data": [4.5, 5.5]}
        }
    })
}

/// Local granule holding day 2 of the remote dataset.
pub fn local_document(precip: [f64; 2]) -> Value {
    json!({
        "dimensions": {"time": 1, "x": 2},
        "variables": {
            "time": {
                "dimensions": ["time"],
                "attributes": {"units": "days since 1970-01-01", "calendar": "standard"},
                "data": [2.0]
            },
            "precip": {
                "dimensions": ["time", "x"],
                "attributes": {"units": "mm"},
                "data": precip
            },
            "lon": {"dimensions": ["x"], "data": [4.5, 5.5]}
        }
    })
}

/// Temp batch directory: config, local granules and a remote mirror.
pub struct BatchFixture {
    temp_dir: TempDir,
    scenarios: Vec<Value>,
}

impl Default for BatchFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchFixture {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(temp_dir.path().join("mirror")).expect("create mirror");
        std::fs::create_dir_all(temp_dir.path().join("local")).expect("create local");
        Self {
            temp_dir,
            scenarios: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn mirror_dir(&self) -> PathBuf {
        self.root().join("mirror")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join("batch.json")
    }

    /// Adds a scenario, writing its local granule and, when given, its mirror document.
    pub fn scenario(&mut self, dataset_id: &str, local: Value, remote: Option<Value>) -> &mut Self {
        let rel = format!("local/{dataset_id}.json");
        write_json(&self.root().join(&rel), &local);
        if let Some(remote) = remote {
            write_json(&self.mirror_dir().join(format!("{dataset_id}.json")), &remote);
        }
        self.scenarios.push(json!({
            "local_file": rel,
            "dataset_id": dataset_id,
            "reference_time_seconds": 60.0
        }));
        self
    }

    /// Adds a scenario whose local file does not exist.
    pub fn missing_scenario(&mut self, dataset_id: &str) -> &mut Self {
        self.scenarios.push(json!({
            "local_file": format!("local/{dataset_id}.nc"),
            "dataset_id": dataset_id,
            "reference_time_seconds": 1.2
        }));
        self
    }

    pub fn write_config(&self) -> PathBuf {
        let config = json!({
            "schema_version": 1,
            "endpoint": ENDPOINT,
            "scenarios": self.scenarios
        });
        let path = self.config_path();
        write_json(&path, &config);
        path
    }

    /// Runs `dapreg <command> --config <batch> --mirror <mirror> [extra..]`.
    pub fn run(&self, command: &str, extra: &[&str]) -> Output {
        let config = self.write_config();
        Command::new(bin())
            .arg(command)
            .arg("--config")
            .arg(&config)
            .arg("--mirror")
            .arg(self.mirror_dir())
            .args(extra)
            .env("RUST_LOG", "warn")
            .output()
            .expect("run dapreg")
    }
}

pub fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_dapreg")
}

pub fn write_json(path: &Path, value: &Value) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent directory");
    }
    std::fs::write(path, serde_json::to_vec_pretty(value).expect("serialize")).expect("write");
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
