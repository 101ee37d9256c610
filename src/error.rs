//! Failure taxonomy for the comparison core.
//!
//! Every variant except a performance warning aborts the batch, so each one
//! carries enough context to diagnose without rerunning.
use crate::check::Mismatch;
use crate::dataset::DatasetError;
use crate::time::TimeError;
use serde::Serialize;
use thiserror::Error;

/// Coarse failure class reported in run reports and on exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidArgument,
    OpenError,
    PerformanceRegression,
    SchemaMismatch,
    ContentMismatch,
    TimeResolution,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidArgument => "invalid_argument",
            FailureKind::OpenError => "open_error",
            FailureKind::PerformanceRegression => "performance_regression",
            FailureKind::SchemaMismatch => "schema_mismatch",
            FailureKind::ContentMismatch => "content_mismatch",
            FailureKind::TimeResolution => "time_resolution",
        }
    }
}

#[derive(Debug, Error)]
pub enum RegressError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(
        "performance regression: ratio {ratio:.3} <= {fail_ratio} \
         (took {elapsed_seconds:.4} s, reference {reference_seconds} s)"
    )]
    PerformanceRegression {
        ratio: f64,
        fail_ratio: f64,
        elapsed_seconds: f64,
        reference_seconds: f64,
    },

    #[error("schema mismatch: {0}")]
    SchemaMismatch(Mismatch),

    #[error("content mismatch: {0}")]
    ContentMismatch(Mismatch),

    #[error("time resolution failed: {0}")]
    TimeResolution(#[from] TimeError),
}

impl RegressError {
    pub fn invalid(message: impl Into<String>) -> Self {
        RegressError::InvalidArgument(message.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            RegressError::InvalidArgument(_) => FailureKind::InvalidArgument,
            RegressError::Dataset(_) => FailureKind::OpenError,
            RegressError::PerformanceRegression { .. } => FailureKind::PerformanceRegression,
            RegressError::SchemaMismatch(_) => FailureKind::SchemaMismatch,
            RegressError::ContentMismatch(_) => FailureKind::ContentMismatch,
            RegressError::TimeResolution(_) => FailureKind::TimeResolution,
        }
    }
}

impl From<Mismatch> for RegressError {
    fn from(mismatch: Mismatch) -> Self {
        match mismatch {
            Mismatch::Time(err) => RegressError::TimeResolution(err),
            Mismatch::VariableSet { .. }
            | Mismatch::MissingDimensions { .. }
            | Mismatch::TextKind { .. } => {
                RegressError::SchemaMismatch(mismatch)
            }
            Mismatch::Shape { .. } | Mismatch::Content { .. } => {
                RegressError::ContentMismatch(mismatch)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RegressError>;
