//! Structural and numerical equivalence between a local granule and the
//! remote dataset that should contain it.
//!
//! Values are compared bit for bit: both sides are the same stored granule
//! read through two access paths, so any difference is a defect.
use crate::dataset::{Dataset, VariableHeader};
use crate::error::{RegressError, Result};
use crate::time::{CalendarDate, TimeCoordinate, TimeError};
use ndarray::{ArrayD, ArrayViewD, Dimension};
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

pub const TIME_VARIABLE: &str = "time";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Mismatch {
    #[error("variable sets differ (only local: {only_local:?}, only remote: {only_remote:?})")]
    VariableSet {
        only_local: Vec<String>,
        only_remote: Vec<String>,
    },

    #[error("remote lacks local dimensions {dimensions:?}")]
    MissingDimensions { dimensions: Vec<String> },

    #[error("variable {variable}: text on one side only (local text: {local_text})")]
    TextKind { variable: String, local_text: bool },

    #[error(transparent)]
    Time(#[from] TimeError),

    #[error("variable {variable}: local shape {local:?} differs from remote shape {remote:?}")]
    Shape {
        variable: String,
        local: Vec<usize>,
        remote: Vec<usize>,
    },

    #[error(
        "variable {variable}: {differing} of {total} values differ, \
         first at {index:?} (local {local}, remote {remote})"
    )]
    Content {
        variable: String,
        index: Vec<usize>,
        local: f64,
        remote: f64,
        differing: usize,
        total: usize,
    },
}

/// Findings of the header-only comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeaderReport {
    pub variables: usize,
    pub local_dimensions: usize,
    pub remote_dimensions: usize,
    /// `variable:attribute` pairs (`:attribute` for globals) whose local value
    /// is absent or different remotely.
    pub attribute_drift: Vec<String>,
}

/// What a successful content comparison covered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentSummary {
    pub time_index: usize,
    pub date: String,
    pub compared: Vec<String>,
    pub skipped_scalars: Vec<String>,
    /// Character and string variables, present on both sides but not compared.
    pub skipped_text: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Match(ContentSummary),
    Mismatch(Mismatch),
}

impl Verdict {
    pub fn into_result(self) -> Result<ContentSummary> {
        match self {
            Verdict::Match(summary) => Ok(summary),
            Verdict::Mismatch(mismatch) => Err(RegressError::from(mismatch)),
        }
    }
}

/// Compares variable names and dimension coverage without reading values.
pub fn check_header(
    local: &dyn Dataset,
    remote: &dyn Dataset,
) -> std::result::Result<HeaderReport, Mismatch> {
    let local_header = local.header();
    let remote_header = remote.header();

    let local_names = local_header.variable_names();
    let remote_names = remote_header.variable_names();
    if local_names != remote_names {
        return Err(Mismatch::VariableSet {
            only_local: difference(&local_names, &remote_names),
            only_remote: difference(&remote_names, &local_names),
        });
    }

    let missing: Vec<String> = local_header
        .dimensions
        .keys()
        .filter(|dim| !remote_header.dimensions.contains_key(*dim))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(Mismatch::MissingDimensions { dimensions: missing });
    }

    let mut attribute_drift = Vec::new();
    for (name, local_var) in &local_header.variables {
        let Some(remote_var) = remote_header.variable(name) else {
            continue;
        };
        if local_var.text != remote_var.text {
            return Err(Mismatch::TextKind {
                variable: name.clone(),
                local_text: local_var.text,
            });
        }
        for (attr, value) in &local_var.attributes {
            if !remote_var.attributes.get(attr).is_some_and(|remote| remote.same_as(value)) {
                attribute_drift.push(format!("{name}:{attr}"));
            }
        }
    }
    for (attr, value) in &local_header.attributes {
        if !remote_header.attributes.get(attr).is_some_and(|remote| remote.same_as(value)) {
            attribute_drift.push(format!(":{attr}"));
        }
    }

    Ok(HeaderReport {
        variables: local_names.len(),
        local_dimensions: local_header.dimensions.len(),
        remote_dimensions: remote_header.dimensions.len(),
        attribute_drift,
    })
}

/// Full equivalence check of `local` against `remote`.
///
/// `local_time_value` is the raw time coordinate of the local granule's slice.
/// Mismatches come back as a [`Verdict`]; only failures to read data are errors.
pub fn check(local: &dyn Dataset, remote: &dyn Dataset, local_time_value: f64) -> Result<Verdict> {
    if let Err(mismatch) = check_header(local, remote) {
        return Ok(Verdict::Mismatch(mismatch));
    }

    let remote_axis = match remote.header().variable(TIME_VARIABLE) {
        Some(_) => Some(remote.read(TIME_VARIABLE)?),
        None => None,
    };
    let (time_index, date) =
        match resolve_time_index(local, remote, remote_axis.as_ref(), local_time_value) {
            Ok(resolved) => resolved,
            Err(err) => return Ok(Verdict::Mismatch(Mismatch::Time(err))),
        };

    let mut compared = Vec::new();
    let mut skipped_scalars = Vec::new();
    let mut skipped_text = Vec::new();
    for (name, local_var) in &local.header().variables {
        if name == TIME_VARIABLE {
            continue;
        }
        if local_var.text {
            skipped_text.push(name.clone());
            continue;
        }
        if local_var.is_scalar() {
            skipped_scalars.push(name.clone());
            continue;
        }
        let Some(remote_var) = remote.header().variable(name) else {
            continue;
        };

        let (local_values, remote_values) = if remote_var.first_dimension() == Some(TIME_VARIABLE)
        {
            (
                read_local_slice(local, name, local_var)?,
                remote.read_index(name, time_index)?,
            )
        } else {
            (local.read(name)?, remote.read(name)?)
        };

        if let Some(mismatch) = compare_arrays(name, local_values.view(), remote_values.view()) {
            return Ok(Verdict::Mismatch(mismatch));
        }
        tracing::debug!(variable = %name, values = local_values.len(), "variable matches");
        compared.push(name.clone());
    }

    Ok(Verdict::Match(ContentSummary {
        time_index,
        date: date.to_string(),
        compared,
        skipped_scalars,
        skipped_text,
    }))
}

/// First value of the local `time` variable.
pub fn first_time_value(local: &dyn Dataset) -> Result<f64> {
    let missing = || TimeError::MissingTime {
        dataset: local.source().to_string(),
    };
    if local.header().variable(TIME_VARIABLE).is_none() {
        return Err(missing().into());
    }
    let values = local.read(TIME_VARIABLE)?;
    let first = values.iter().next().copied().ok_or_else(missing)?;
    Ok(first)
}

fn resolve_time_index(
    local: &dyn Dataset,
    remote: &dyn Dataset,
    remote_axis: Option<&ArrayD<f64>>,
    local_time_value: f64,
) -> std::result::Result<(usize, CalendarDate), TimeError> {
    let missing_remote = || TimeError::MissingTime {
        dataset: remote.source().to_string(),
    };
    let remote_time = remote
        .header()
        .variable(TIME_VARIABLE)
        .ok_or_else(missing_remote)?;
    let axis: Vec<f64> = remote_axis.ok_or_else(missing_remote)?.iter().copied().collect();

    let remote_coord = coordinate(remote.source(), Some(remote_time), None)?;
    // The local value decodes with the local units and calendar, each falling
    // back to the remote attribute, not with the remote units and a default
    // calendar.
    let local_coord = coordinate(
        local.source(),
        local.header().variable(TIME_VARIABLE),
        Some(remote_time),
    )?;

    let date = local_coord.decode(local_time_value)?;
    let index = remote_coord.locate(&date, &axis)?;
    tracing::debug!(
        %date,
        index,
        calendar = ?remote_coord.calendar(),
        "resolved local time in remote axis"
    );
    Ok((index, date))
}

// Units and calendar come from `primary`, falling back to `fallback` for
// whichever attribute the primary variable does not declare.
fn coordinate(
    dataset: &str,
    primary: Option<&VariableHeader>,
    fallback: Option<&VariableHeader>,
) -> std::result::Result<TimeCoordinate, TimeError> {
    let attribute = |name: &str| {
        primary
            .and_then(|var| var.attribute_text(name))
            .or_else(|| fallback.and_then(|var| var.attribute_text(name)))
    };
    let units = attribute("units").ok_or_else(|| TimeError::MissingUnits {
        dataset: dataset.to_string(),
    })?;
    TimeCoordinate::parse(units, attribute("calendar"))
}

// A time-dimensioned local variable holds its single slice at index 0; one
// without the time dimension already is that slice.
fn read_local_slice(
    local: &dyn Dataset,
    name: &str,
    header: &VariableHeader,
) -> Result<ArrayD<f64>> {
    if header.first_dimension() == Some(TIME_VARIABLE) {
        Ok(local.read_index(name, 0)?)
    } else {
        Ok(local.read(name)?)
    }
}

fn compare_arrays(
    name: &str,
    local: ArrayViewD<'_, f64>,
    remote: ArrayViewD<'_, f64>,
) -> Option<Mismatch> {
    if local.shape() != remote.shape() {
        return Some(Mismatch::Shape {
            variable: name.to_string(),
            local: local.shape().to_vec(),
            remote: remote.shape().to_vec(),
        });
    }
    let mut first = None;
    let mut differing = 0;
    for ((index, &local_value), &remote_value) in local.indexed_iter().zip(remote.iter()) {
        if local_value.to_bits() != remote_value.to_bits() {
            differing += 1;
            if first.is_none() {
                first = Some((index.slice().to_vec(), local_value, remote_value));
            }
        }
    }
    let (index, local_value, remote_value) = first?;
    Some(Mismatch::Content {
        variable: name.to_string(),
        index,
        local: local_value,
        remote: remote_value,
        differing,
        total: local.len(),
    })
}

fn difference(left: &BTreeSet<&str>, right: &BTreeSet<&str>) -> Vec<String> {
    left.difference(right).map(|name| name.to_string()).collect()
}

#[cfg(test)]
#[path = "check_tests.rs"]
mod tests;
