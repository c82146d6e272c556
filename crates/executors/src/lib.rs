//! Step executors for the sectioning scheduler.
//!
//! Implements the [`sectioning::StepExecutor`] port on top of two narrower
//! ports defined here:
//!
//! - [`StageDriver`] moves one stage axis at a time and reports position.
//! - [`OperationHandler`] runs the step's imaging, milling or mapping
//!   operation once the stage is in place.
//!
//! [`InstrumentExecutor`] combines them: it refuses targets outside the
//! stage limits, orders the moves (rotation first with tilt homed, then X,
//! Y, Z, T), verifies the stage settled and re-moves unsettled axes.
//! [`Retrying`] wraps any executor and re-issues steps whose error is
//! retryable.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Device access, move sequencing and timing live here.
//! The [`sectioning`] crate sees only [`sectioning::StepExecutor`].
//!
//! | Type | Role |
//! |------|------|
//! | [`SimulatedStage`] | In-memory stage with injectable positioning faults |
//! | [`SimulatedOperations`] | Logs operations, optional dwell and missing devices |
//! | [`InstrumentExecutor`] | Limit check, move sequencing, settle verification |
//! | [`Retrying`] | Retry decorator honouring [`sectioning::RetryPolicy`] |

pub mod instrument;
pub mod motion;
pub mod operations;
pub mod retry;
pub mod stage;

pub use instrument::{InstrumentExecutor, DEFAULT_MOVE_ATTEMPTS};
pub use motion::{plan_moves, rotation_distance, settle_report, unsettled_axes, AxisMove};
pub use operations::{device_for, OperationHandler, SimulatedOperations};
pub use retry::Retrying;
pub use stage::{SimulatedStage, StageDriver};
