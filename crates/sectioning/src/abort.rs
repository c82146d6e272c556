//! Cooperative stop requests from outside the scheduler's thread.
//!
//! The operator's command layer writes; the scheduler polls at step and slice
//! boundaries. The state is a single atomic byte, so a writer never waits
//! behind a hardware call in progress and the reader never blocks.
//!
//! ## Precedence
//!
//! The most recent request wins, except that [`AbortSignal::Hard`] cannot be
//! downgraded: once set it stays until [`AbortController::reset`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// Stop level an external actor may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopLevel {
    /// Finish the step in progress, then stop.
    AfterStep,
    /// Finish the slice in progress, then stop.
    AfterSlice,
    /// Issue no further commands.
    Hard,
}

/// Signal observed by the scheduler when it polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortSignal {
    None,
    AfterStep,
    AfterSlice,
    Hard,
}

impl AbortSignal {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => AbortSignal::AfterStep,
            2 => AbortSignal::AfterSlice,
            3 => AbortSignal::Hard,
            _ => AbortSignal::None,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            AbortSignal::None => 0,
            AbortSignal::AfterStep => 1,
            AbortSignal::AfterSlice => 2,
            AbortSignal::Hard => 3,
        }
    }
}

impl From<StopLevel> for AbortSignal {
    fn from(level: StopLevel) -> Self {
        match level {
            StopLevel::AfterStep => AbortSignal::AfterStep,
            StopLevel::AfterSlice => AbortSignal::AfterSlice,
            StopLevel::Hard => AbortSignal::Hard,
        }
    }
}

impl std::fmt::Display for AbortSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AbortSignal::None => "none",
            AbortSignal::AfterStep => "after_step",
            AbortSignal::AfterSlice => "after_slice",
            AbortSignal::Hard => "hard",
        };
        f.write_str(label)
    }
}

/// Holder for the pending stop request.
#[derive(Debug, Default)]
pub struct AbortController {
    signal: AtomicU8,
}

static GLOBAL: OnceLock<Arc<AbortController>> = OnceLock::new();

impl AbortController {
    /// Creates a controller with no pending request.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide controller shared by the command layer and the
    /// scheduler. Persists across runs.
    pub fn global() -> Arc<AbortController> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(AbortController::new())))
    }

    /// Records a stop request. A pending hard stop is never downgraded.
    pub fn request(&self, level: StopLevel) {
        let requested = AbortSignal::from(level).as_u8();
        let hard = AbortSignal::Hard.as_u8();
        // The closure returns `None` only when a hard stop is already pending,
        // which leaves it in place.
        let _ = self
            .signal
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != hard).then_some(requested)
            });
        tracing::info!(level = ?level, effective = %self.current(), "Stop requested");
    }

    /// Requests a stop once the step in progress finishes.
    pub fn request_stop_after_step(&self) {
        self.request(StopLevel::AfterStep);
    }

    /// Requests a stop once the slice in progress finishes.
    pub fn request_stop_after_slice(&self) {
        self.request(StopLevel::AfterSlice);
    }

    /// Requests that no further commands be issued.
    pub fn request_hard_stop(&self) {
        self.request(StopLevel::Hard);
    }

    /// Returns the pending signal without consuming it.
    pub fn current(&self) -> AbortSignal {
        AbortSignal::from_u8(self.signal.load(Ordering::Acquire))
    }

    /// Clears any pending request. Called at the start of every run.
    pub fn reset(&self) {
        self.signal.store(AbortSignal::None.as_u8(), Ordering::Release);
    }
}
