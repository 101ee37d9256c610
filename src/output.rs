//! Run report output.
//!
//! The JSON report wraps the batch report with tool identity so archived
//! reports stay comparable across releases.
use crate::runner::{BatchReport, RunMode, ScenarioReport};
use crate::util::format_seconds;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct RunReport<'a> {
    schema_version: u32,
    generated_at_epoch_ms: u128,
    tool_name: &'static str,
    tool_version: &'static str,
    #[serde(flatten)]
    batch: &'a BatchReport,
}

/// Write the batch report as pretty JSON, creating parent directories.
pub fn write_report_json(path: &Path, batch: &BatchReport) -> Result<()> {
    let generated_at_epoch_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    let report = RunReport {
        schema_version: REPORT_SCHEMA_VERSION,
        generated_at_epoch_ms,
        tool_name: env!("CARGO_PKG_NAME"),
        tool_version: env!("CARGO_PKG_VERSION"),
        batch,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(&report).context("serialize run report")?;
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Human-readable batch summary for stdout.
pub fn render_summary(batch: &BatchReport) -> String {
    let mut out = String::new();
    let mode = match batch.mode {
        RunMode::Full => "full",
        RunMode::HeaderOnly => "header-only",
    };
    let _ = writeln!(out, "endpoint {} ({mode})", batch.endpoint);
    for report in &batch.scenarios {
        let _ = writeln!(out, "  {}", scenario_line(report));
    }
    if !batch.skipped.is_empty() {
        let _ = writeln!(out, "  skipped: {}", batch.skipped.join(", "));
    }
    let passed = batch.scenarios.iter().filter(|r| r.succeeded()).count();
    let total = batch.scenarios.len() + batch.skipped.len();
    let verdict = if batch.success { "PASS" } else { "FAIL" };
    let _ = writeln!(out, "result: {verdict} ({passed}/{total} scenarios)");
    out
}

fn scenario_line(report: &ScenarioReport) -> String {
    let mut line = format!("{} {}", report.dataset_id, report.stage.as_str());
    if let Some(timing) = &report.timing {
        let _ = write!(
            line,
            "  fetch {} / ref {} ratio {:.3} {}",
            format_seconds(timing.elapsed_seconds),
            format_seconds(timing.reference_seconds),
            timing.ratio,
            timing.outcome.as_str()
        );
    }
    if let Some(content) = &report.content {
        let _ = write!(
            line,
            "  time[{}] {}  {} variables",
            content.time_index,
            content.date,
            content.compared.len()
        );
    } else if let Some(header) = &report.header {
        let _ = write!(line, "  {} variables in header", header.variables);
    }
    if let Some(failure) = &report.failure {
        let _ = write!(
            line,
            " after {}: {}: {}",
            failure.stage.as_str(),
            failure.kind.as_str(),
            failure.message
        );
    }
    line
}
