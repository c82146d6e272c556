//! Port through which the scheduler acts on the instrument.
//!
//! Infrastructure crates implement [`StepExecutor`] for real hardware, a
//! simulated stage, or test doubles. The scheduler awaits each call to
//! completion before issuing the next, so an implementation never sees two
//! commands in flight. Timeouts and retries, if any, belong to the
//! implementation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{AxisSet, ExecutorError, SliceNumber, StagePosition, StepKind, StepName, StepNumber};

/// Identity of the step being executed, for executors that log or name
/// their outputs by slice and step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContext {
    pub slice: SliceNumber,
    pub step: StepNumber,
    pub name: StepName,
    pub kind: StepKind,
}

/// Performs one step: positions the stage on the flagged axes, then runs the
/// step's operation.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Executes the step described by `ctx` at `target`.
    ///
    /// Only the axes in `axes_to_move` need a move command; the rest are
    /// already within tolerance of `target`. Any error ends the run.
    async fn execute(
        &self,
        ctx: &StepContext,
        target: StagePosition,
        axes_to_move: AxisSet,
    ) -> Result<(), ExecutorError>;
}

#[async_trait]
impl<T: StepExecutor + ?Sized> StepExecutor for Arc<T> {
    async fn execute(
        &self,
        ctx: &StepContext,
        target: StagePosition,
        axes_to_move: AxisSet,
    ) -> Result<(), ExecutorError> {
        (**self).execute(ctx, target, axes_to_move).await
    }
}

#[async_trait]
impl<T: StepExecutor + ?Sized> StepExecutor for Box<T> {
    async fn execute(
        &self,
        ctx: &StepContext,
        target: StagePosition,
        axes_to_move: AxisSet,
    ) -> Result<(), ExecutorError> {
        (**self).execute(ctx, target, axes_to_move).await
    }
}
