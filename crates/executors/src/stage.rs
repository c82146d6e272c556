//! Stage driver abstraction and an in-memory stage for dry runs and tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sectioning::{Axis, ExecutorError, StagePosition};

/// Hardware-agnostic single-axis stage control.
///
/// Coordinated motion is the caller's job (see [`crate::motion`]); a driver
/// only moves one axis to an absolute position and reports where the stage is.
#[async_trait]
pub trait StageDriver: Send + Sync {
    /// Current stage position in raw coordinates.
    async fn position(&self) -> Result<StagePosition, ExecutorError>;

    /// Moves `axis` to the absolute `value` and waits for the move to finish.
    async fn move_axis(&self, axis: Axis, value: f64) -> Result<(), ExecutorError>;
}

/// A persistent positioning error injected on one axis.
#[derive(Debug, Clone, Copy)]
struct Fault {
    axis: Axis,
    offset: f64,
    remaining: u32,
}

/// In-memory five-axis stage. Starts at home and lands exactly on every
/// commanded position unless a fault is injected.
#[derive(Debug)]
pub struct SimulatedStage {
    position: Mutex<StagePosition>,
    history: Mutex<Vec<(Axis, f64)>>,
    faults: Mutex<Vec<Fault>>,
    move_delay: Duration,
}

impl Default for SimulatedStage {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedStage {
    pub fn new() -> Self {
        Self::at(StagePosition::HOME)
    }

    /// A stage already sitting at `position`.
    pub fn at(position: StagePosition) -> Self {
        Self {
            position: Mutex::new(position),
            history: Mutex::new(Vec::new()),
            faults: Mutex::new(Vec::new()),
            move_delay: Duration::ZERO,
        }
    }

    /// Simulated duration of every single-axis move.
    #[must_use]
    pub fn with_move_delay(mut self, delay: Duration) -> Self {
        self.move_delay = delay;
        self
    }

    /// The next `moves` commands on `axis` land `offset` away from the
    /// commanded value.
    #[must_use]
    pub fn with_fault(self, axis: Axis, offset: f64, moves: u32) -> Self {
        lock(&self.faults).push(Fault {
            axis,
            offset,
            remaining: moves,
        });
        self
    }

    /// Every move commanded so far, in order.
    pub fn history(&self) -> Vec<(Axis, f64)> {
        lock(&self.history).clone()
    }

    fn landing(&self, axis: Axis, value: f64) -> f64 {
        let mut faults = lock(&self.faults);
        match faults.iter_mut().find(|f| f.axis == axis && f.remaining > 0) {
            Some(fault) => {
                fault.remaining -= 1;
                value + fault.offset
            }
            None => value,
        }
    }
}

#[async_trait]
impl StageDriver for SimulatedStage {
    async fn position(&self) -> Result<StagePosition, ExecutorError> {
        Ok(*lock(&self.position))
    }

    async fn move_axis(&self, axis: Axis, value: f64) -> Result<(), ExecutorError> {
        if !self.move_delay.is_zero() {
            tokio::time::sleep(self.move_delay).await;
        }
        let landed = self.landing(axis, value);
        lock(&self.history).push((axis, value));
        let mut position = lock(&self.position);
        *position = position.with_axis(axis, landed);
        tracing::trace!(%axis, commanded = value, landed, "Simulated axis move");
        Ok(())
    }
}

// A poisoned lock only means another test thread panicked mid-update; the
// simulated state is still usable.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
