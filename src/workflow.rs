//! Command implementations.
//!
//! Each command loads the batch config, settles fixtures, then hands the
//! scenarios to the runner. Typed core failures surface here with the dataset
//! id and failure kind attached.
use crate::cli::{CheckArgs, FetchArgs, HeaderArgs, SourceArgs, UrlArgs};
use crate::config::{load_config, BatchConfig};
use crate::dataset::{Accessor, JsonAccessor};
use crate::fixtures::{ensure_fixtures, verify_present};
use crate::locator::Locator;
use crate::output::{render_summary, write_report_json};
use crate::runner::{BatchReport, RunMode, ScenarioRunner};
use anyhow::{anyhow, Result};
use std::path::Path;

pub fn run_check(args: CheckArgs) -> Result<()> {
    run_batch(&args.source, RunMode::Full, args.out.as_deref())
}

pub fn run_header(args: HeaderArgs) -> Result<()> {
    run_batch(&args.source, RunMode::HeaderOnly, args.out.as_deref())
}

pub fn run_fetch(args: FetchArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let downloaded = ensure_fixtures(&config, true)?;
    for path in &downloaded {
        println!("downloaded {}", path.display());
    }
    let verified = verify_present(&config)?;
    println!(
        "{} fixtures present ({} downloaded, {verified} digests verified)",
        config.scenarios.len(),
        downloaded.len()
    );
    Ok(())
}

pub fn run_url(args: UrlArgs) -> Result<()> {
    let address = Locator::default().address(&args.endpoint, &args.dataset)?;
    println!("{address}");
    Ok(())
}

fn run_batch(source: &SourceArgs, mode: RunMode, out: Option<&Path>) -> Result<()> {
    let config = load_config(&source.config)?;
    ensure_fixtures(&config, config.auto_download || source.download)?;
    let accessor = accessor_for(source.mirror.as_deref())?;

    let batch = execute_batch(&config, accessor.as_ref(), mode);
    print!("{}", render_summary(&batch));
    if let Some(out) = out {
        write_report_json(out, &batch)?;
        println!("wrote {}", out.display());
    }
    batch_outcome(&batch)
}

/// Runs every scenario of `config` in order, stopping at the first abort.
pub fn execute_batch(config: &BatchConfig, accessor: &dyn Accessor, mode: RunMode) -> BatchReport {
    let runner = ScenarioRunner::new(accessor, &config.locator, config.thresholds, mode);
    runner.run_batch(&config.endpoint, &config.scenarios)
}

fn batch_outcome(batch: &BatchReport) -> Result<()> {
    match batch.failure() {
        None => Ok(()),
        Some((report, failure)) => Err(anyhow!(
            "dataset {} failed ({}): {}",
            report.dataset_id,
            failure.kind.as_str(),
            failure.message
        )),
    }
}

fn accessor_for(mirror: Option<&Path>) -> Result<Box<dyn Accessor>> {
    if let Some(mirror) = mirror {
        if !mirror.is_dir() {
            return Err(anyhow!("mirror directory {} does not exist", mirror.display()));
        }
        return Ok(Box::new(JsonAccessor::with_mirror(mirror)));
    }
    network_accessor()
}

#[cfg(feature = "netcdf")]
fn network_accessor() -> Result<Box<dyn Accessor>> {
    Ok(Box::new(crate::dataset::NetcdfAccessor))
}

#[cfg(not(feature = "netcdf"))]
fn network_accessor() -> Result<Box<dyn Accessor>> {
    Err(anyhow!(
        "built without the `netcdf` feature; pass --mirror <DIR> or rebuild with --features netcdf"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::runner::Stage;

    #[test]
    fn missing_mirror_directory_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = match accessor_for(Some(&dir.path().join("absent"))) {
            Ok(_) => panic!("expected error"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("does not exist"), "{err}");
    }

    #[test]
    fn outcome_names_dataset_and_kind() {
        let batch = BatchReport {
            endpoint: "host".to_string(),
            mode: RunMode::Full,
            scenarios: vec![crate::runner::ScenarioReport {
                dataset_id: "ds_a".to_string(),
                local_file: "a.nc".to_string(),
                address: None,
                stage: Stage::Aborted,
                header: None,
                timing: None,
                content: None,
                failure: Some(crate::runner::FailureReport {
                    kind: FailureKind::PerformanceRegression,
                    stage: Stage::HeaderChecked,
                    message: "ratio 0.833".to_string(),
                }),
            }],
            skipped: Vec::new(),
            success: false,
        };
        let err = batch_outcome(&batch).expect_err("failure");
        assert_eq!(
            err.to_string(),
            "dataset ds_a failed (performance_regression): ratio 0.833"
        );
    }
}
