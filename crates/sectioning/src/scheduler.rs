//! Drives the slice × step loop.
//!
//! ## State machine
//!
//! ```text
//! Idle ──run──▶ Running ──AfterStep/AfterSlice──▶ Draining ───▶ Idle
//!                  │  └────────────Hard────────▶ HardStopped ─▶ Idle
//!                  └──completed / executor failure──────────────▶ Idle
//! ```
//!
//! Slices run in increasing order and steps in the plan's fixed order. A step
//! runs on a slice only when `(slice - 1) % frequency == 0`. For each running
//! step the scheduler computes the target, asks the tolerance gate which axes
//! must move, and awaits the executor. The first executor error ends the run.
//!
//! ## Abort boundaries
//!
//! The [`AbortController`] is polled at two places only:
//!
//! - after every executed step: `Hard` and `AfterStep` stop here, `AfterSlice`
//!   is deferred;
//! - after the last step of every slice: any pending signal stops here.
//!
//! A hard stop never interrupts the command in flight; it guarantees only that
//! nothing further is issued.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::{
    moves_from, AbortController, AbortSignal, PlanError, PositionHistory, ResumePoint, RunId,
    RunOutcome, RunReport, SchedulerError, SliceNumber, SlicePlan, StepContext, StepExecutor,
    StepNumber, StepRecord, Timestamp, ToleranceSpec,
};

/// Lifecycle state of a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// No run in progress.
    Idle,
    /// Executing slices.
    Running,
    /// A soft stop was observed; finishing up.
    Draining,
    /// A hard stop was observed; no further commands.
    HardStopped,
}

#[derive(Debug, Clone, Copy)]
enum Boundary {
    Step,
    Slice,
}

impl Boundary {
    fn as_str(self) -> &'static str {
        match self {
            Boundary::Step => "step",
            Boundary::Slice => "slice",
        }
    }
}

/// Run-time cursor, owned by a single run.
struct PipelineState {
    slice: SliceNumber,
    step: StepNumber,
    positions: PositionHistory,
    records: Vec<StepRecord>,
    started_at: Timestamp,
}

impl PipelineState {
    fn new(start: ResumePoint, step_count: usize) -> Self {
        Self {
            slice: start.slice,
            step: start.step,
            positions: PositionHistory::new(step_count),
            records: Vec::new(),
            started_at: Timestamp::now(),
        }
    }

    fn finish(self, run_id: RunId, outcome: RunOutcome) -> RunReport {
        RunReport {
            run_id,
            outcome,
            positions: self.positions,
            records: self.records,
            started_at: self.started_at,
            finished_at: Timestamp::now(),
        }
    }
}

/// Executes [`SlicePlan`]s against a [`StepExecutor`].
pub struct Scheduler<E> {
    executor: E,
    abort: Arc<AbortController>,
    tolerance: ToleranceSpec,
    state: SchedulerState,
}

impl<E: StepExecutor> Scheduler<E> {
    /// Creates an idle scheduler using the default stage tolerance.
    pub fn new(executor: E, abort: Arc<AbortController>) -> Self {
        Self {
            executor,
            abort,
            tolerance: ToleranceSpec::default(),
            state: SchedulerState::Idle,
        }
    }

    /// Sets the tolerance below which axes are not moved.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: ToleranceSpec) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn abort_controller(&self) -> &Arc<AbortController> {
        &self.abort
    }

    /// Runs `plan` from slice 1, step 1.
    pub async fn run(&mut self, plan: &SlicePlan) -> Result<RunReport, SchedulerError> {
        self.run_from(plan, ResumePoint::default()).await
    }

    /// Runs `plan` starting at `start`.
    ///
    /// Resets the abort controller first. Returns a report for completed and
    /// cleanly aborted runs; an executor failure or an invalid plan is an
    /// error. The scheduler is [`SchedulerState::Idle`] again on return.
    pub async fn run_from(
        &mut self,
        plan: &SlicePlan,
        start: ResumePoint,
    ) -> Result<RunReport, SchedulerError> {
        plan.validate()?;
        start.check(plan)?;
        ToleranceSpec::new(self.tolerance.linear, self.tolerance.angular)
            .ok_or(PlanError::InvalidTolerance)?;

        let run_id = RunId::new_random();
        let span = tracing::info_span!(
            "run",
            %run_id,
            slices = plan.slice_count(),
            steps = plan.step_count()
        );

        self.abort.reset();
        self.transition(SchedulerState::Running);
        let result = self.drive(plan, start, run_id).instrument(span).await;
        self.transition(SchedulerState::Idle);
        result
    }

    async fn drive(
        &mut self,
        plan: &SlicePlan,
        start: ResumePoint,
        run_id: RunId,
    ) -> Result<RunReport, SchedulerError> {
        tracing::info!(
            start_slice = start.slice.get(),
            start_step = start.step.get(),
            thickness = plan.thickness(),
            pre_tilt_deg = plan.pre_tilt_deg(),
            "Run started"
        );
        let mut state = PipelineState::new(start, plan.step_count());

        for slice in plan.slices_from(start.slice) {
            let first_step = if slice == start.slice {
                start.step
            } else {
                StepNumber::first()
            };
            state.slice = slice;

            for (number, step) in plan.numbered_steps().skip(first_step.index()) {
                state.step = number;

                if !step.fires_on(slice) {
                    tracing::info!(
                        slice = slice.get(),
                        step = number.get(),
                        name = %step.name,
                        frequency = step.frequency,
                        decision = "skipped",
                        "Step not scheduled on this slice"
                    );
                    continue;
                }

                let target = plan.target_for(step, slice);
                let moves = moves_from(&target, state.positions.get(number), &self.tolerance);
                tracing::info!(
                    slice = slice.get(),
                    step = number.get(),
                    name = %step.name,
                    kind = %step.kind,
                    decision = "executing",
                    %target,
                    moves = %moves,
                    "Executing step"
                );

                let ctx = StepContext {
                    slice,
                    step: number,
                    name: step.name.clone(),
                    kind: step.kind,
                };
                if let Err(source) = self.executor.execute(&ctx, target, moves).await {
                    tracing::error!(
                        slice = slice.get(),
                        step = number.get(),
                        name = %step.name,
                        error = %source,
                        "Step failed; stopping run"
                    );
                    return Err(SchedulerError::ExecutorFailure {
                        slice,
                        step: number,
                        name: step.name.clone(),
                        source,
                        positions: state.positions,
                    });
                }

                state.positions.record(number, target);
                state.records.push(StepRecord {
                    slice,
                    step: number,
                    name: step.name.clone(),
                    target,
                    moved: moves,
                    finished_at: Timestamp::now(),
                });

                match self.poll(Boundary::Step, slice, number) {
                    AbortSignal::Hard => {
                        self.transition(SchedulerState::HardStopped);
                        let outcome = RunOutcome::AbortedHard { slice, step: number };
                        return Ok(state.finish(run_id, outcome));
                    }
                    AbortSignal::AfterStep => {
                        self.transition(SchedulerState::Draining);
                        let outcome = RunOutcome::AbortedAfterStep { slice, step: number };
                        return Ok(state.finish(run_id, outcome));
                    }
                    AbortSignal::AfterSlice | AbortSignal::None => {}
                }
            }

            let last = state.step;
            let outcome = match self.poll(Boundary::Slice, slice, last) {
                AbortSignal::None => continue,
                AbortSignal::Hard => {
                    self.transition(SchedulerState::HardStopped);
                    RunOutcome::AbortedHard { slice, step: last }
                }
                AbortSignal::AfterStep => {
                    self.transition(SchedulerState::Draining);
                    RunOutcome::AbortedAfterStep { slice, step: last }
                }
                AbortSignal::AfterSlice => {
                    self.transition(SchedulerState::Draining);
                    RunOutcome::AbortedAfterSlice { slice }
                }
            };
            return Ok(state.finish(run_id, outcome));
        }

        tracing::info!(
            last_slice = state.slice.get(),
            records = state.records.len(),
            "Run completed"
        );
        Ok(state.finish(run_id, RunOutcome::Completed))
    }

    fn poll(&self, boundary: Boundary, slice: SliceNumber, step: StepNumber) -> AbortSignal {
        let signal = self.abort.current();
        let deferred =
            matches!(boundary, Boundary::Step) && signal == AbortSignal::AfterSlice;
        if signal == AbortSignal::None || deferred {
            tracing::debug!(
                boundary = boundary.as_str(),
                slice = slice.get(),
                step = step.get(),
                %signal,
                "Abort boundary check"
            );
        } else {
            tracing::warn!(
                boundary = boundary.as_str(),
                slice = slice.get(),
                step = step.get(),
                %signal,
                "Abort boundary check: stopping"
            );
        }
        signal
    }

    fn transition(&mut self, to: SchedulerState) {
        if self.state != to {
            tracing::debug!(from = ?self.state, to = ?to, "Scheduler state change");
            self.state = to;
        }
    }
}
