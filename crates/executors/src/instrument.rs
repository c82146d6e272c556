//! [`StepExecutor`] that drives a stage and an operation handler.

use async_trait::async_trait;
use sectioning::{
    AxisSet, ExecutorError, StageLimits, StagePosition, StepContext, StepExecutor, ToleranceSpec,
};

use crate::motion::{plan_moves, settle_report, unsettled_axes};
use crate::operations::OperationHandler;
use crate::stage::StageDriver;

/// Default number of move attempts per step, including the first.
pub const DEFAULT_MOVE_ATTEMPTS: u32 = 2;

/// Positions the stage for a step, verifies it settled, then runs the step's
/// operation.
///
/// Targets outside `limits` are refused before any axis moves. After each
/// round of moves the stage is read back; axes still outside tolerance are
/// moved again from the actual position until `move_attempts` is used up.
#[derive(Debug)]
pub struct InstrumentExecutor<D, H> {
    stage: D,
    operations: H,
    limits: StageLimits,
    tolerance: ToleranceSpec,
    move_attempts: u32,
}

impl<D: StageDriver, H: OperationHandler> InstrumentExecutor<D, H> {
    pub fn new(stage: D, operations: H) -> Self {
        Self {
            stage,
            operations,
            limits: StageLimits::default(),
            tolerance: ToleranceSpec::default(),
            move_attempts: DEFAULT_MOVE_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: StageLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: ToleranceSpec) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the number of move attempts per step; clamped to at least 1.
    #[must_use]
    pub fn with_move_attempts(mut self, attempts: u32) -> Self {
        self.move_attempts = attempts.max(1);
        self
    }

    pub fn stage(&self) -> &D {
        &self.stage
    }

    fn check_limits(&self, target: &StagePosition) -> Result<(), ExecutorError> {
        match self.limits.first_violation(target) {
            Some(axis) => {
                let limit = self.limits.for_axis(axis);
                Err(ExecutorError::OutOfLimits {
                    axis,
                    value: target.axis(axis),
                    min: limit.min,
                    max: limit.max,
                })
            }
            None => Ok(()),
        }
    }

    /// Moves until every axis is within tolerance of `target`.
    ///
    /// The flagged axes always move. Axes the gate skipped are moved too when
    /// the stage is physically off target, e.g. after another step moved it.
    async fn move_to(
        &self,
        ctx: &StepContext,
        target: &StagePosition,
        flagged: AxisSet,
    ) -> Result<StagePosition, ExecutorError> {
        let mut current = self.stage.position().await?;
        let mut pending = flagged;
        for axis in unsettled_axes(&current, target, &self.tolerance).iter() {
            pending.insert(axis);
        }
        if pending.is_empty() {
            return Ok(current);
        }
        tracing::debug!(
            slice = %ctx.slice,
            step = %ctx.step,
            from = %current,
            to = %target,
            axes = %pending,
            "Moving stage"
        );

        for attempt in 1..=self.move_attempts {
            for mv in plan_moves(&current, target, pending, &self.tolerance) {
                self.stage.move_axis(mv.axis, mv.value).await?;
            }
            current = self.stage.position().await?;
            pending = unsettled_axes(&current, target, &self.tolerance);
            if pending.is_empty() {
                return Ok(current);
            }
            tracing::warn!(
                attempt,
                axes = %pending,
                detail = %settle_report(&current, target, pending, &self.tolerance),
                "Stage not settled"
            );
        }

        Err(ExecutorError::NotSettled {
            axes: pending,
            detail: settle_report(&current, target, pending, &self.tolerance),
        })
    }
}

#[async_trait]
impl<D: StageDriver, H: OperationHandler> StepExecutor for InstrumentExecutor<D, H> {
    async fn execute(
        &self,
        ctx: &StepContext,
        target: StagePosition,
        axes_to_move: AxisSet,
    ) -> Result<(), ExecutorError> {
        self.check_limits(&target)?;
        let position = self.move_to(ctx, &target, axes_to_move).await?;
        self.operations.perform(ctx, &position).await
    }
}
