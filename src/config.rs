//! Batch configuration.
//!
//! The config names the endpoint once and lists the scenarios in the order
//! they run. Loading resolves relative local paths against the config file so
//! a batch can be checked in alongside its fixtures.
use crate::error::RegressError;
use crate::gate::Thresholds;
use crate::locator::Locator;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    pub schema_version: u32,
    pub endpoint: String,
    #[serde(default)]
    pub auto_download: bool,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub locator: Locator,
    pub scenarios: Vec<ScenarioConfig>,
}

/// One local granule and the remote dataset it belongs to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    pub local_file: PathBuf,
    pub dataset_id: String,
    pub reference_time_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixture_url: Option<String>,
    /// Lowercase hex digest checked after a fixture download.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Load, resolve and validate a batch config.
pub fn load_config(path: &Path) -> Result<BatchConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let mut config: BatchConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse batch config JSON {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    resolve_paths(&mut config, base);
    validate_config(&config).with_context(|| format!("validate config {}", path.display()))?;
    tracing::debug!(
        scenarios = config.scenarios.len(),
        endpoint = %config.endpoint,
        "loaded batch config"
    );
    Ok(config)
}

fn resolve_paths(config: &mut BatchConfig, base: &Path) {
    for scenario in &mut config.scenarios {
        if scenario.local_file.is_relative() && !scenario.local_file.as_os_str().is_empty() {
            scenario.local_file = base.join(&scenario.local_file);
        }
    }
}

/// Checks the whole config and reports every problem at once.
pub fn validate_config(config: &BatchConfig) -> crate::error::Result<()> {
    let mut problems = Vec::new();
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        problems.push(format!(
            "unsupported schema_version {} (expected {CONFIG_SCHEMA_VERSION})",
            config.schema_version
        ));
    }
    if config.endpoint.trim().is_empty() {
        problems.push("endpoint must be non-empty".to_string());
    }
    if let Err(err) = config.thresholds.validate() {
        problems.push(err.to_string());
    }
    if let Err(err) = config.locator.validate() {
        problems.push(err.to_string());
    }
    if config.scenarios.is_empty() {
        problems.push("scenarios must list at least one dataset".to_string());
    }

    let mut seen = BTreeSet::new();
    for (index, scenario) in config.scenarios.iter().enumerate() {
        let label = format!("scenarios[{index}]");
        validate_scenario(scenario, &label, &mut problems);
        let id = scenario.dataset_id.trim();
        if !id.is_empty() && !seen.insert(id) {
            problems.push(format!("{label}: duplicate dataset_id {id:?}"));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(RegressError::invalid(problems.join("; ")))
    }
}

fn validate_scenario(scenario: &ScenarioConfig, label: &str, problems: &mut Vec<String>) {
    if scenario.dataset_id.trim().is_empty() {
        problems.push(format!("{label}: dataset_id must be non-empty"));
    }
    if scenario.local_file.as_os_str().is_empty() {
        problems.push(format!("{label}: local_file must be non-empty"));
    }
    let reference = scenario.reference_time_seconds;
    if !reference.is_finite() || reference <= 0.0 {
        problems.push(format!(
            "{label}: reference_time_seconds must be > 0 (got {reference})"
        ));
    }
    if let Some(url) = scenario.fixture_url.as_deref() {
        if url.starts_with("ftp://") {
            problems.push(format!(
                "{label}: fixture_url must be http(s); mirror ftp sources over http(s) (got {url:?})"
            ));
        } else if !(url.starts_with("http://") || url.starts_with("https://")) {
            problems.push(format!("{label}: fixture_url must be http(s) (got {url:?})"));
        }
    }
    if let Some(digest) = scenario.sha256.as_deref() {
        let is_hex = digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit());
        if !is_hex {
            problems.push(format!("{label}: sha256 must be 64 hex characters"));
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
