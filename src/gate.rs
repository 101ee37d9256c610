//! Performance gate around a single remote fetch.
//!
//! Two thresholds absorb jitter from shared hosting: a ratio between the fail
//! and warn ratios is surfaced but tolerated, at or below the fail ratio the
//! run aborts.
use crate::error::{RegressError, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const DEFAULT_WARN_RATIO: f64 = 0.95;
pub const DEFAULT_FAIL_RATIO: f64 = 0.90;

fn default_warn_ratio() -> f64 {
    DEFAULT_WARN_RATIO
}

fn default_fail_ratio() -> f64 {
    DEFAULT_FAIL_RATIO
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Pass,
    Warn,
    Fail,
}

impl GateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateOutcome::Pass => "PASS",
            GateOutcome::Warn => "WARN",
            GateOutcome::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Thresholds {
    #[serde(default = "default_warn_ratio")]
    pub warn_ratio: f64,
    #[serde(default = "default_fail_ratio")]
    pub fail_ratio: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn_ratio: DEFAULT_WARN_RATIO,
            fail_ratio: DEFAULT_FAIL_RATIO,
        }
    }
}

impl Thresholds {
    /// Requires `0 < fail_ratio < warn_ratio`.
    pub fn validate(&self) -> Result<()> {
        let ordered = self.fail_ratio > 0.0 && self.fail_ratio < self.warn_ratio;
        if !self.warn_ratio.is_finite() || !ordered {
            return Err(RegressError::invalid(format!(
                "thresholds need 0 < fail_ratio < warn_ratio (got fail {}, warn {})",
                self.fail_ratio, self.warn_ratio
            )));
        }
        Ok(())
    }

    pub fn classify(&self, ratio: f64) -> GateOutcome {
        if ratio <= self.fail_ratio {
            GateOutcome::Fail
        } else if ratio < self.warn_ratio {
            GateOutcome::Warn
        } else {
            GateOutcome::Pass
        }
    }
}

/// Timing of one fetch against its reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Timing {
    pub elapsed_seconds: f64,
    pub reference_seconds: f64,
    pub ratio: f64,
    pub outcome: GateOutcome,
}

impl Timing {
    pub fn measure(elapsed: Duration, reference_seconds: f64, thresholds: &Thresholds) -> Result<Self> {
        validate_reference(reference_seconds)?;
        let elapsed_seconds = elapsed.as_secs_f64();
        if elapsed_seconds <= 0.0 {
            return Err(RegressError::invalid(
                "fetch took no measurable time; refusing to compute an infinite ratio",
            ));
        }
        let ratio = reference_seconds / elapsed_seconds;
        Ok(Self {
            elapsed_seconds,
            reference_seconds,
            ratio,
            outcome: thresholds.classify(ratio),
        })
    }

    /// Turns a FAIL into the fatal regression error.
    pub fn ensure_not_failed(&self, thresholds: &Thresholds) -> Result<()> {
        if self.outcome == GateOutcome::Fail {
            return Err(RegressError::PerformanceRegression {
                ratio: self.ratio,
                fail_ratio: thresholds.fail_ratio,
                elapsed_seconds: self.elapsed_seconds,
                reference_seconds: self.reference_seconds,
            });
        }
        Ok(())
    }
}

pub struct Gated<T> {
    pub value: T,
    pub timing: Timing,
}

/// Runs `fetch` once, timing only the call itself.
///
/// Inputs are validated before the fetch runs. A fetch error propagates
/// without a timing classification.
pub fn evaluate<T, E, F>(fetch: F, reference_seconds: f64, thresholds: &Thresholds) -> Result<Gated<T>>
where
    F: FnOnce() -> std::result::Result<T, E>,
    E: Into<RegressError>,
{
    validate_reference(reference_seconds)?;
    thresholds.validate()?;

    let start = Instant::now();
    let fetched = fetch();
    let elapsed = start.elapsed();

    let value = fetched.map_err(Into::into)?;
    let timing = Timing::measure(elapsed, reference_seconds, thresholds)?;
    Ok(Gated { value, timing })
}

fn validate_reference(reference_seconds: f64) -> Result<()> {
    if !reference_seconds.is_finite() || reference_seconds <= 0.0 {
        return Err(RegressError::invalid(format!(
            "reference time must be a positive number of seconds (got {reference_seconds})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetError;
    use crate::error::FailureKind;
    use std::cell::Cell;
    use std::thread;

    fn sleeping(seconds: f64) -> impl FnOnce() -> std::result::Result<(), RegressError> {
        move || {
            thread::sleep(Duration::from_secs_f64(seconds));
            Ok(())
        }
    }

    #[test]
    fn fast_fetch_passes() {
        let gated = evaluate(sleeping(0.5), 1.0, &Thresholds::default()).expect("evaluate");
        assert_eq!(gated.timing.outcome, GateOutcome::Pass);
        assert!(gated.timing.ratio > 1.0);
    }

    #[test]
    fn slightly_slow_fetch_warns() {
        let gated = evaluate(sleeping(1.07), 1.0, &Thresholds::default()).expect("evaluate");
        assert_eq!(gated.timing.outcome, GateOutcome::Warn);
        assert!(gated.timing.ensure_not_failed(&Thresholds::default()).is_ok());
    }

    #[test]
    fn slow_fetch_fails() {
        let thresholds = Thresholds::default();
        let gated = evaluate(sleeping(1.2), 1.0, &thresholds).expect("evaluate");
        assert_eq!(gated.timing.outcome, GateOutcome::Fail);
        let err = gated.timing.ensure_not_failed(&thresholds).unwrap_err();
        assert_eq!(err.kind(), FailureKind::PerformanceRegression);
    }

    #[test]
    fn classification_boundaries() {
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.classify(0.90), GateOutcome::Fail);
        assert_eq!(thresholds.classify(0.9001), GateOutcome::Warn);
        assert_eq!(thresholds.classify(0.9499), GateOutcome::Warn);
        assert_eq!(thresholds.classify(0.95), GateOutcome::Pass);
        assert_eq!(thresholds.classify(2.0), GateOutcome::Pass);
    }

    #[test]
    fn measure_uses_reference_over_elapsed() {
        let timing = Timing::measure(Duration::from_millis(500), 1.0, &Thresholds::default())
            .expect("measure");
        assert_eq!(timing.ratio, 2.0);
        assert_eq!(timing.outcome, GateOutcome::Pass);

        let timing = Timing::measure(Duration::from_millis(1200), 1.0, &Thresholds::default())
            .expect("measure");
        assert!((timing.ratio - 0.8333).abs() < 1e-3);
        assert_eq!(timing.outcome, GateOutcome::Fail);
    }

    #[test]
    fn zero_elapsed_is_an_error() {
        let err = Timing::measure(Duration::ZERO, 1.0, &Thresholds::default()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidArgument);
    }

    #[test]
    fn bad_reference_rejected_before_fetch() {
        for reference in [0.0, -1.0, f64::NAN] {
            let calls = Cell::new(0);
            let result = evaluate(
                || {
                    calls.set(calls.get() + 1);
                    Ok::<_, RegressError>(())
                },
                reference,
                &Thresholds::default(),
            );
            assert!(matches!(result, Err(RegressError::InvalidArgument(_))));
            assert_eq!(calls.get(), 0);
        }
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let thresholds = Thresholds {
            warn_ratio: 0.9,
            fail_ratio: 0.95,
        };
        assert!(thresholds.validate().is_err());
        assert!(evaluate(|| Ok::<_, RegressError>(()), 1.0, &thresholds).is_err());
        assert!(Thresholds {
            warn_ratio: 0.95,
            fail_ratio: 0.0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn fetch_error_propagates_as_open_error() {
        let result = evaluate(
            || {
                Err::<(), _>(DatasetError::Open {
                    dataset: "https://host/opendap/x/".to_string(),
                    reason: "connection refused".to_string(),
                })
            },
            1.0,
            &Thresholds::default(),
        );
        let err = match result {
            Ok(_) => panic!("expected open error"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), FailureKind::OpenError);
    }

    #[test]
    fn fetch_runs_exactly_once() {
        let calls = Cell::new(0);
        let gated = evaluate(
            || {
                calls.set(calls.get() + 1);
                thread::sleep(Duration::from_millis(1));
                Ok::<_, RegressError>(7)
            },
            1.0,
            &Thresholds::default(),
        )
        .expect("evaluate");
        assert_eq!(gated.value, 7);
        assert_eq!(calls.get(), 1);
    }
}
