//! Retry decorator for any [`StepExecutor`].

use async_trait::async_trait;
use sectioning::{AxisSet, ExecutorError, RetryPolicy, StagePosition, StepContext, StepExecutor};

/// Re-issues a failed step while the error's [`RetryPolicy`] allows it.
///
/// `max_attempts` counts the first call. Non-retryable errors, and the error
/// from the final attempt, are returned unchanged.
#[derive(Debug)]
pub struct Retrying<E> {
    inner: E,
    max_attempts: u32,
}

impl<E: StepExecutor> Retrying<E> {
    pub fn new(inner: E, max_attempts: u32) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

#[async_trait]
impl<E: StepExecutor> StepExecutor for Retrying<E> {
    async fn execute(
        &self,
        ctx: &StepContext,
        target: StagePosition,
        axes_to_move: AxisSet,
    ) -> Result<(), ExecutorError> {
        let mut attempt = 1;
        loop {
            let err = match self.inner.execute(ctx, target, axes_to_move).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            let delay = match err.retry_policy() {
                RetryPolicy::Retryable { after } if attempt < self.max_attempts => after,
                _ => return Err(err),
            };
            tracing::warn!(
                slice = %ctx.slice,
                step = %ctx.step,
                attempt,
                error = %err,
                "Step failed; retrying"
            );
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }
}
