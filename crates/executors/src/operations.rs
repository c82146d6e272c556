//! Per-step instrument operations (image capture, laser or FIB milling,
//! EBSD/EDS mapping, custom scripts) behind the [`OperationHandler`] port.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use sectioning::{ExecutorError, StagePosition, StepContext, StepKind};

/// Runs the operation of a step once the stage is in position.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn perform(
        &self,
        ctx: &StepContext,
        position: &StagePosition,
    ) -> Result<(), ExecutorError>;
}

/// Operation handler that only waits and logs.
///
/// Each step kind can be given a dwell time standing in for acquisition or
/// milling, and any kind can be marked as having no device attached.
#[derive(Debug, Default)]
pub struct SimulatedOperations {
    dwell: HashMap<StepKind, Duration>,
    missing: HashSet<StepKind>,
}

impl SimulatedOperations {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_dwell(mut self, kind: StepKind, dwell: Duration) -> Self {
        self.dwell.insert(kind, dwell);
        self
    }

    /// Steps of `kind` fail with [`ExecutorError::DeviceUnavailable`].
    #[must_use]
    pub fn without_device(mut self, kind: StepKind) -> Self {
        self.missing.insert(kind);
        self
    }
}

/// Device name reported when an operation of `kind` has no hardware.
pub fn device_for(kind: StepKind) -> &'static str {
    match kind {
        StepKind::Image => "electron imaging detector",
        StepKind::Laser => "femtosecond laser",
        StepKind::Fib => "focused ion beam",
        StepKind::Ebsd => "EBSD detector",
        StepKind::Eds => "EDS detector",
        StepKind::Custom => "custom script host",
    }
}

#[async_trait]
impl OperationHandler for SimulatedOperations {
    async fn perform(
        &self,
        ctx: &StepContext,
        position: &StagePosition,
    ) -> Result<(), ExecutorError> {
        if self.missing.contains(&ctx.kind) {
            return Err(ExecutorError::DeviceUnavailable {
                device: device_for(ctx.kind).to_string(),
            });
        }
        if let Some(dwell) = self.dwell.get(&ctx.kind) {
            tokio::time::sleep(*dwell).await;
        }
        tracing::info!(
            slice = %ctx.slice,
            step = %ctx.step,
            name = %ctx.name,
            kind = %ctx.kind,
            position = %position,
            "Operation performed"
        );
        Ok(())
    }
}
