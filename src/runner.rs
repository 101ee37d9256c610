//! Scenario orchestration.
//!
//! A scenario walks locate, header check, timed fetch and content check in
//! order and stops at the first failure. A batch runs scenarios in config
//! order and stops at the first aborted scenario.
use crate::check::{check, check_header, first_time_value, ContentSummary, HeaderReport};
use crate::config::ScenarioConfig;
use crate::dataset::{Accessor, Source};
use crate::error::{FailureKind, RegressError, Result};
use crate::gate::{self, GateOutcome, Thresholds, Timing};
use crate::locator::Locator;
use serde::Serialize;

/// Furthest point a scenario reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    NotStarted,
    LocalOpened,
    HeaderChecked,
    RemoteFetched,
    ContentChecked,
    Done,
    Aborted,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::NotStarted => "not_started",
            Stage::LocalOpened => "local_opened",
            Stage::HeaderChecked => "header_checked",
            Stage::RemoteFetched => "remote_fetched",
            Stage::ContentChecked => "content_checked",
            Stage::Done => "done",
            Stage::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Full,
    /// Stop after the header comparison; no timed fetch, no array reads.
    HeaderOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
    pub kind: FailureKind,
    /// Last stage completed before the failure.
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub dataset_id: String,
    pub local_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<HeaderReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
}

impl ScenarioReport {
    fn new(scenario: &ScenarioConfig) -> Self {
        Self {
            dataset_id: scenario.dataset_id.clone(),
            local_file: scenario.local_file.display().to_string(),
            address: None,
            stage: Stage::NotStarted,
            header: None,
            timing: None,
            content: None,
            failure: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.stage == Stage::Done
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub endpoint: String,
    pub mode: RunMode,
    pub scenarios: Vec<ScenarioReport>,
    /// Dataset ids never started because an earlier scenario aborted.
    pub skipped: Vec<String>,
    pub success: bool,
}

impl BatchReport {
    /// The aborted scenario, if any.
    pub fn failure(&self) -> Option<(&ScenarioReport, &FailureReport)> {
        self.scenarios
            .iter()
            .find_map(|report| report.failure.as_ref().map(|failure| (report, failure)))
    }
}

pub struct ScenarioRunner<'a> {
    accessor: &'a dyn Accessor,
    locator: &'a Locator,
    thresholds: Thresholds,
    mode: RunMode,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(
        accessor: &'a dyn Accessor,
        locator: &'a Locator,
        thresholds: Thresholds,
        mode: RunMode,
    ) -> Self {
        Self {
            accessor,
            locator,
            thresholds,
            mode,
        }
    }

    pub fn run_batch(&self, endpoint: &str, scenarios: &[ScenarioConfig]) -> BatchReport {
        let mut reports = Vec::with_capacity(scenarios.len());
        let mut skipped = Vec::new();
        let mut aborted = false;
        for scenario in scenarios {
            if aborted {
                skipped.push(scenario.dataset_id.clone());
                continue;
            }
            let report = self.run_scenario(endpoint, scenario);
            aborted = !report.succeeded();
            reports.push(report);
        }
        if !skipped.is_empty() {
            tracing::info!(skipped = skipped.len(), "batch halted; remaining scenarios skipped");
        }
        BatchReport {
            endpoint: endpoint.to_string(),
            mode: self.mode,
            scenarios: reports,
            success: !aborted,
            skipped,
        }
    }

    pub fn run_scenario(&self, endpoint: &str, scenario: &ScenarioConfig) -> ScenarioReport {
        let mut report = ScenarioReport::new(scenario);
        if let Err(err) = self.execute(endpoint, scenario, &mut report) {
            tracing::error!(
                dataset_id = %scenario.dataset_id,
                kind = err.kind().as_str(),
                stage = ?report.stage,
                "scenario aborted: {err}"
            );
            report.failure = Some(FailureReport {
                kind: err.kind(),
                stage: report.stage,
                message: err.to_string(),
            });
            report.stage = Stage::Aborted;
        }
        report
    }

    fn execute(
        &self,
        endpoint: &str,
        scenario: &ScenarioConfig,
        report: &mut ScenarioReport,
    ) -> Result<()> {
        let dataset_id = scenario.dataset_id.as_str();
        let address = self.locator.address(endpoint, dataset_id)?;
        report.address = Some(address.clone());

        let local = self.accessor.open(Source::Local(&scenario.local_file))?;
        advance(report, Stage::LocalOpened);

        let header = {
            let remote = self.accessor.open(Source::Remote(&address))?;
            check_header(local.as_ref(), remote.as_ref()).map_err(RegressError::from)?
        };
        if !header.attribute_drift.is_empty() {
            tracing::warn!(
                dataset_id,
                attributes = ?header.attribute_drift,
                "local attributes differ from remote"
            );
        }
        report.header = Some(header);
        advance(report, Stage::HeaderChecked);

        if self.mode == RunMode::HeaderOnly {
            advance(report, Stage::Done);
            return Ok(());
        }

        let gated = gate::evaluate(
            || self.accessor.open(Source::Remote(&address)),
            scenario.reference_time_seconds,
            &self.thresholds,
        )?;
        let timing = gated.timing;
        report.timing = Some(timing);
        tracing::info!(
            dataset_id,
            elapsed_ms = (timing.elapsed_seconds * 1000.0).round() as u64,
            reference_seconds = timing.reference_seconds,
            ratio = timing.ratio,
            outcome = timing.outcome.as_str(),
            "remote fetch timed"
        );
        if timing.outcome == GateOutcome::Warn {
            tracing::warn!(
                dataset_id,
                ratio = timing.ratio,
                warn_ratio = self.thresholds.warn_ratio,
                "remote fetch slower than reference"
            );
        }
        timing.ensure_not_failed(&self.thresholds)?;
        advance(report, Stage::RemoteFetched);

        let remote = gated.value;
        let local_time = first_time_value(local.as_ref())?;
        let summary = check(local.as_ref(), remote.as_ref(), local_time)?.into_result()?;
        tracing::info!(
            dataset_id,
            time_index = summary.time_index,
            date = %summary.date,
            variables = summary.compared.len(),
            "content matches"
        );
        report.content = Some(summary);
        advance(report, Stage::ContentChecked);
        advance(report, Stage::Done);
        Ok(())
    }
}

fn advance(report: &mut ScenarioReport, stage: Stage) {
    tracing::debug!(dataset_id = %report.dataset_id, ?stage, "stage reached");
    report.stage = stage;
}
