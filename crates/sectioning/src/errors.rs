//! Error and retry-policy types for the sectioning domain.
//!
//! Geometry and tolerance computations are total and never fail. Errors arise
//! only from plan invariants ([`PlanError`]) and from the executor boundary
//! ([`ExecutorError`]); [`SchedulerError`] wraps both for the caller of a run.
//!
//! A clean abort is not an error: it is reported as a [`crate::RunOutcome`] on
//! a successful return.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Axis, AxisSet, PositionHistory, SliceNumber, StepKind, StepName, StepNumber};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an executor failure is safe to retry and, if so, after what delay.
///
/// Only infrastructure decorators consult this. The scheduler never retries:
/// any executor error ends the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means retry
        /// immediately or apply the caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Executor errors
// ---------------------------------------------------------------------------

/// Failure reported by a [`crate::StepExecutor`].
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ExecutorError {
    /// The requested target lies outside the stage travel limits. No move was
    /// issued.
    #[error("Target {axis} = {value} {unit} is outside stage limits [{min}, {max}]", unit = .axis.unit())]
    OutOfLimits {
        axis: Axis,
        value: f64,
        min: f64,
        max: f64,
    },

    /// The stage did not reach the target within tolerance after moving.
    #[error("Stage did not settle on axes {axes}: {detail}")]
    NotSettled {
        /// Axes still outside tolerance.
        axes: AxisSet,
        /// Per-axis error summary.
        detail: String,
    },

    /// A device did not answer within its deadline.
    #[error("Timed out waiting for {device}")]
    Timeout {
        /// Device or subsystem that did not answer.
        device: String,
    },

    /// A device needed by the step is not connected or is in an error state.
    #[error("Device unavailable: {device}")]
    DeviceUnavailable { device: String },

    /// The step's operation itself failed.
    #[error("{kind} operation failed: {message}")]
    Operation { kind: StepKind, message: String },
}

impl ExecutorError {
    /// Returns whether this failure may be retried by a decorator.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            ExecutorError::NotSettled { .. } => RetryPolicy::Retryable { after: None },
            ExecutorError::Timeout { .. } => RetryPolicy::Retryable {
                after: Some(Duration::from_millis(500)),
            },
            ExecutorError::OutOfLimits { .. }
            | ExecutorError::DeviceUnavailable { .. }
            | ExecutorError::Operation { .. } => RetryPolicy::NonRetryable,
        }
    }
}

// ---------------------------------------------------------------------------
// Plan invariants
// ---------------------------------------------------------------------------

/// A [`crate::SlicePlan`] invariant does not hold.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PlanError {
    #[error("Slice thickness must be finite and positive, got {0}")]
    NonPositiveThickness(f64),

    #[error("Pre-tilt angle must be finite, got {0}")]
    NonFinitePreTilt(f64),

    #[error("Slice count must be at least 1")]
    NoSlices,

    #[error("Plan has no steps")]
    NoSteps,

    #[error("Step {step} ('{name}') has frequency 0; it must be at least 1")]
    ZeroFrequency { step: StepNumber, name: StepName },

    #[error("Step {step} ('{name}') has a non-finite initial position")]
    NonFinitePosition { step: StepNumber, name: StepName },

    #[error("Tolerance must be finite and non-negative")]
    InvalidTolerance,

    #[error("Resume point slice {slice}, step {step} is outside the plan ({slice_count} slices, {step_count} steps)")]
    ResumeOutOfRange {
        slice: SliceNumber,
        step: StepNumber,
        slice_count: u32,
        step_count: usize,
    },
}

// ---------------------------------------------------------------------------
// Scheduler errors
// ---------------------------------------------------------------------------

/// Why a run did not complete or cleanly abort.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The plan violates an invariant; the run never started and no command
    /// was issued.
    #[error("Refusing to start run: {0}")]
    ConfigurationPrecondition(#[from] PlanError),

    /// The executor failed. The run stopped at this step; `positions` holds
    /// the last position every step successfully reached.
    #[error("Step {step} ('{name}') failed on slice {slice}: {source}")]
    ExecutorFailure {
        slice: SliceNumber,
        step: StepNumber,
        name: StepName,
        #[source]
        source: ExecutorError,
        positions: PositionHistory,
    },
}
