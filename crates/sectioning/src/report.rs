//! What a run leaves behind: its outcome, every step's last reached position,
//! and a record of each executed step.

use serde::{Deserialize, Serialize};

use crate::{AxisSet, RunId, SliceNumber, StagePosition, StepName, StepNumber, Timestamp};

/// Last position each step successfully reached, indexed by step number.
///
/// `None` means the step has not completed in this run. Positions are the
/// requested targets (updated optimistically once the executor accepts the
/// step), not read back from hardware.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionHistory(Vec<Option<StagePosition>>);

impl PositionHistory {
    /// An empty history for a plan with `step_count` steps.
    pub fn new(step_count: usize) -> Self {
        Self(vec![None; step_count])
    }

    /// Last position reached by `step`.
    pub fn get(&self, step: StepNumber) -> Option<&StagePosition> {
        self.0.get(step.index()).and_then(Option::as_ref)
    }

    /// Records that `step` reached `position`.
    pub fn record(&mut self, step: StepNumber, position: StagePosition) {
        if let Some(slot) = self.0.get_mut(step.index()) {
            *slot = Some(position);
        }
    }

    /// Iterates every step with its last position.
    pub fn iter(&self) -> impl Iterator<Item = (StepNumber, Option<&StagePosition>)> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, p)| StepNumber::from_index(i).map(|n| (n, p.as_ref())))
    }

    /// Steps that have reached a position in this run.
    pub fn reached(&self) -> impl Iterator<Item = StepNumber> + '_ {
        self.iter().filter(|(_, p)| p.is_some()).map(|(n, _)| n)
    }
}

/// How a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every slice ran and no stop was pending at the end.
    Completed,
    /// Stopped after finishing `step` of `slice`.
    AbortedAfterStep { slice: SliceNumber, step: StepNumber },
    /// Stopped after finishing `slice`.
    AbortedAfterSlice { slice: SliceNumber },
    /// Hard stop observed after `step` of `slice`; nothing further was issued.
    AbortedHard { slice: SliceNumber, step: StepNumber },
}

impl RunOutcome {
    /// Returns `true` for any of the abort outcomes.
    pub fn is_aborted(self) -> bool {
        !matches!(self, RunOutcome::Completed)
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::AbortedAfterStep { slice, step } => {
                write!(f, "stopped after step {step} of slice {slice}")
            }
            RunOutcome::AbortedAfterSlice { slice } => write!(f, "stopped after slice {slice}"),
            RunOutcome::AbortedHard { slice, step } => {
                write!(f, "hard stop after step {step} of slice {slice}")
            }
        }
    }
}

/// One executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub slice: SliceNumber,
    pub step: StepNumber,
    pub name: StepName,
    pub target: StagePosition,
    /// Axes the tolerance gate flagged for this execution.
    pub moved: AxisSet,
    pub finished_at: Timestamp,
}

/// Result of a run that completed or stopped cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub outcome: RunOutcome,
    pub positions: PositionHistory,
    pub records: Vec<StepRecord>,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}
