//! Serial-sectioning domain: stage geometry and the slice/step scheduler.
//!
//! At every slice a fixed pipeline of steps (imaging, milling, mapping, custom
//! scripts) runs against a target that moves as material is removed. This
//! crate computes those targets for a pre-tilted sample, decides which axes
//! actually need to move, and drives the slice × step loop with cooperative
//! stop requests. Instrument access is delegated to infrastructure crates
//! through the [`StepExecutor`] port.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RunId`, `StepName`, `SliceNumber`, `StepNumber`) |
//! | [`types`] | Value types (`StagePosition`, `Orientation`, `StepDefinition`, `ToleranceSpec`, etc.) |
//! | [`geometry`] | Per-slice axis increments from thickness, pre-tilt and orientation |
//! | [`coordinates`] | Absolute per-slice targets for each step |
//! | [`tolerance`] | Tolerance gate selecting the axes to move |
//! | [`plan`] | Validated `SlicePlan` and resume points |
//! | [`abort`] | Process-wide stop requests |
//! | [`executor`] | `StepExecutor` port trait |
//! | [`scheduler`] | The slice × step state machine |
//! | [`report`] | Run outcome, position history and execution records |
//! | [`errors`] | Error and retry-policy types |
//!
//! Only sectioning along Z is supported: Z advances each slice and Y
//! compensates for pre-tilt.

pub mod abort;
pub mod coordinates;
pub mod errors;
pub mod executor;
pub mod geometry;
pub mod identifiers;
pub mod plan;
pub mod report;
pub mod scheduler;
pub mod tolerance;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use abort::{AbortController, AbortSignal, StopLevel};
pub use coordinates::{last_reachable_slice, target_for};
pub use errors::{ExecutorError, PlanError, RetryPolicy, SchedulerError};
pub use executor::{StepContext, StepExecutor};
pub use geometry::{axis_deltas, AxisDeltas};
pub use identifiers::{RunId, SliceNumber, StepName, StepNumber};
pub use plan::{ResumePoint, SlicePlan, TargetPreview};
pub use report::{PositionHistory, RunOutcome, RunReport, StepRecord};
pub use scheduler::{Scheduler, SchedulerState};
pub use tolerance::{moves_from, moves_required};
pub use types::{
    Axis, AxisKind, AxisLimit, AxisSet, Orientation, StageLimits, StagePosition, StepDefinition,
    StepKind, Timestamp, ToleranceSpec,
};
