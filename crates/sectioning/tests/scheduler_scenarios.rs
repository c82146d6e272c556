//! End-to-end scheduler scenarios against a scripted executor.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sectioning::{
    AbortController, AbortSignal, AxisSet, ExecutorError, Orientation, PlanError, ResumePoint,
    RunOutcome, Scheduler, SchedulerError, SchedulerState, SliceNumber, SlicePlan, StagePosition,
    StepContext, StepDefinition, StepExecutor, StepKind, StepName, StepNumber, StopLevel,
    ToleranceSpec,
};

#[derive(Debug, Clone, PartialEq)]
struct Call {
    slice: u32,
    step: u32,
    target: StagePosition,
    axes: AxisSet,
}

/// Records every call; optionally issues a stop request or fails at a given
/// (slice, step) while that step is "in flight".
struct ScriptedExecutor {
    abort: Arc<AbortController>,
    calls: Mutex<Vec<Call>>,
    stop_at: Vec<(u32, u32, StopLevel)>,
    fail_at: Option<(u32, u32)>,
}

impl ScriptedExecutor {
    fn new(abort: &Arc<AbortController>) -> Self {
        Self {
            abort: Arc::clone(abort),
            calls: Mutex::new(Vec::new()),
            stop_at: Vec::new(),
            fail_at: None,
        }
    }

    fn stop_at(mut self, slice: u32, step: u32, level: StopLevel) -> Self {
        self.stop_at.push((slice, step, level));
        self
    }

    fn fail_at(mut self, slice: u32, step: u32) -> Self {
        self.fail_at = Some((slice, step));
        self
    }

    fn executed(&self) -> Vec<(u32, u32)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| (c.slice, c.step))
            .collect()
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        ctx: &StepContext,
        target: StagePosition,
        axes: AxisSet,
    ) -> Result<(), ExecutorError> {
        let key = (ctx.slice.get(), ctx.step.get());
        self.calls.lock().unwrap().push(Call {
            slice: key.0,
            step: key.1,
            target,
            axes,
        });
        for &(slice, step, level) in &self.stop_at {
            if (slice, step) == key {
                self.abort.request(level);
            }
        }
        if self.fail_at == Some(key) {
            return Err(ExecutorError::Operation {
                kind: ctx.kind,
                message: "detector did not respond".into(),
            });
        }
        Ok(())
    }
}

fn step(name: &str, frequency: u32, orientation: Orientation, initial: StagePosition) -> StepDefinition {
    StepDefinition {
        name: StepName::new(name).unwrap(),
        kind: StepKind::Image,
        frequency,
        orientation,
        initial,
    }
}

fn three_step_plan(slices: u32) -> SlicePlan {
    let steps = vec![
        step("laser", 1, Orientation::LaserSide, StagePosition::new(0.0, 0.0, 0.0, 0.0, 0.0)),
        step("image", 1, Orientation::MillSide, StagePosition::new(0.0, 0.0, 0.0, 52.0, 180.0)),
        step("fiducial", 1, Orientation::NormalNoCorrection, StagePosition::new(1.0, 1.0, 0.0, 0.0, 0.0)),
    ];
    SlicePlan::new(steps, slices, 36.0, 0.002).unwrap()
}

fn scheduler(executor: ScriptedExecutor, abort: &Arc<AbortController>) -> Scheduler<ScriptedExecutor> {
    Scheduler::new(executor, Arc::clone(abort))
}

fn slice(n: u32) -> SliceNumber {
    SliceNumber::new(n).unwrap()
}

fn step_no(n: u32) -> StepNumber {
    StepNumber::new(n).unwrap()
}

#[tokio::test]
async fn laser_side_run_tracks_pre_tilt() {
    let abort = Arc::new(AbortController::new());
    let plan = SlicePlan::new(
        vec![step("mill", 1, Orientation::LaserSide, StagePosition::new(1.0, 2.0, 0.0, 0.0, 0.0))],
        3,
        30.0,
        2.0,
    )
    .unwrap();
    let mut s = scheduler(ScriptedExecutor::new(&abort), &abort);

    let report = s.run(&plan).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);

    let round3 = |v: f64| (v * 1000.0).round() / 1000.0;
    let targets: Vec<_> = s.executor().calls().into_iter().map(|c| c.target).collect();
    let ys: Vec<_> = targets.iter().map(|t| round3(t.y)).collect();
    let zs: Vec<_> = targets.iter().map(|t| round3(t.z)).collect();
    assert_eq!(ys, vec![2.0, 1.0, 0.0]);
    assert_eq!(zs, vec![0.0, 1.732, 3.464]);
    for t in &targets {
        assert_eq!((t.x, t.t, t.r), (1.0, 0.0, 0.0));
    }
    assert_eq!(report.positions.get(step_no(1)), targets.last());
}

#[tokio::test]
async fn frequency_gates_steps_per_slice() {
    let abort = Arc::new(AbortController::new());
    let plan = SlicePlan::new(
        vec![
            step("every", 1, Orientation::MillSide, StagePosition::HOME),
            step("alternate", 2, Orientation::MillSide, StagePosition::HOME),
        ],
        4,
        0.0,
        0.001,
    )
    .unwrap();
    let mut s = scheduler(ScriptedExecutor::new(&abort), &abort);
    s.run(&plan).await.unwrap();

    let executed = s.executor().executed();
    let alternate: Vec<_> = executed.iter().filter(|(_, st)| *st == 2).map(|(sl, _)| *sl).collect();
    assert_eq!(alternate, vec![1, 3]);
    assert_eq!(
        executed,
        vec![(1, 1), (1, 2), (2, 1), (3, 1), (3, 2), (4, 1)]
    );
}

#[tokio::test]
async fn frequency_above_slice_count_fires_only_on_first_slice() {
    let abort = Arc::new(AbortController::new());
    let plan = SlicePlan::new(
        vec![
            step("every", 1, Orientation::MillSide, StagePosition::HOME),
            step("rare", 10, Orientation::MillSide, StagePosition::HOME),
        ],
        1,
        0.0,
        0.001,
    )
    .unwrap();
    let mut s = scheduler(ScriptedExecutor::new(&abort), &abort);
    let report = s.run(&plan).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(s.executor().executed(), vec![(1, 1), (1, 2)]);

    let plan = SlicePlan::new(
        vec![
            step("every", 1, Orientation::MillSide, StagePosition::HOME),
            step("rare", 10, Orientation::MillSide, StagePosition::HOME),
        ],
        5,
        0.0,
        0.001,
    )
    .unwrap();
    let mut s = scheduler(ScriptedExecutor::new(&abort), &abort);
    s.run_from(&plan, ResumePoint::new(slice(2), step_no(1))).await.unwrap();
    assert!(s.executor().executed().iter().all(|&(_, st)| st == 1));
}

#[tokio::test]
async fn hard_stop_during_step_two_issues_nothing_further() {
    let abort = Arc::new(AbortController::new());
    let exec = ScriptedExecutor::new(&abort).stop_at(1, 2, StopLevel::Hard);
    let mut s = scheduler(exec, &abort);

    let report = s.run(&three_step_plan(2)).await.unwrap();

    assert_eq!(
        report.outcome,
        RunOutcome::AbortedHard {
            slice: slice(1),
            step: step_no(2)
        }
    );
    assert_eq!(s.executor().executed(), vec![(1, 1), (1, 2)]);
    assert_eq!(
        report.positions.reached().collect::<Vec<_>>(),
        vec![step_no(1), step_no(2)]
    );
    assert_eq!(s.state(), SchedulerState::Idle);
}

#[tokio::test]
async fn stop_after_step_finishes_current_step_only() {
    let abort = Arc::new(AbortController::new());
    let exec = ScriptedExecutor::new(&abort).stop_at(1, 1, StopLevel::AfterStep);
    let mut s = scheduler(exec, &abort);

    let report = s.run(&three_step_plan(2)).await.unwrap();

    assert_eq!(
        report.outcome,
        RunOutcome::AbortedAfterStep {
            slice: slice(1),
            step: step_no(1)
        }
    );
    assert_eq!(s.executor().executed(), vec![(1, 1)]);
    assert_eq!(report.records.len(), 1);
}

#[tokio::test]
async fn stop_after_slice_completes_the_slice() {
    let abort = Arc::new(AbortController::new());
    let exec = ScriptedExecutor::new(&abort).stop_at(2, 1, StopLevel::AfterSlice);
    let mut s = scheduler(exec, &abort);

    let report = s.run(&three_step_plan(4)).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::AbortedAfterSlice { slice: slice(2) });
    assert_eq!(
        s.executor().executed(),
        vec![(1, 1), (1, 2), (1, 3), (2, 1), (2, 2), (2, 3)]
    );
}

#[tokio::test]
async fn hard_takes_precedence_over_pending_soft_stop() {
    let abort = Arc::new(AbortController::new());
    // Both arrive while step 1 is in flight; hard was requested first.
    let exec = ScriptedExecutor::new(&abort)
        .stop_at(1, 1, StopLevel::Hard)
        .stop_at(1, 1, StopLevel::AfterStep);
    let mut s = scheduler(exec, &abort);

    let report = s.run(&three_step_plan(2)).await.unwrap();

    assert_eq!(abort.current(), AbortSignal::Hard);
    assert_eq!(
        report.outcome,
        RunOutcome::AbortedHard {
            slice: slice(1),
            step: step_no(1)
        }
    );
}

#[tokio::test]
async fn soft_stop_then_hard_is_observed_as_hard() {
    let abort = Arc::new(AbortController::new());
    let exec = ScriptedExecutor::new(&abort)
        .stop_at(1, 2, StopLevel::AfterSlice)
        .stop_at(1, 2, StopLevel::Hard);
    let mut s = scheduler(exec, &abort);

    let report = s.run(&three_step_plan(2)).await.unwrap();

    assert!(matches!(report.outcome, RunOutcome::AbortedHard { .. }));
    assert_eq!(s.executor().executed().len(), 2);
}

#[tokio::test]
async fn pending_stop_after_final_slice_is_reported() {
    let abort = Arc::new(AbortController::new());
    let exec = ScriptedExecutor::new(&abort).stop_at(2, 3, StopLevel::AfterSlice);
    let mut s = scheduler(exec, &abort);

    let report = s.run(&three_step_plan(2)).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::AbortedAfterSlice { slice: slice(2) });
    assert_eq!(s.executor().executed().len(), 6);
}

#[tokio::test]
async fn executor_failure_reports_step_and_positions() {
    let abort = Arc::new(AbortController::new());
    let exec = ScriptedExecutor::new(&abort).fail_at(2, 2);
    let mut s = scheduler(exec, &abort);
    let plan = three_step_plan(3);

    let err = s.run(&plan).await.unwrap_err();

    match err {
        SchedulerError::ExecutorFailure {
            slice: failed_slice,
            step,
            name,
            positions,
            source,
        } => {
            assert_eq!(failed_slice, slice(2));
            assert_eq!(step, step_no(2));
            assert_eq!(name.as_str(), "image");
            assert!(matches!(source, ExecutorError::Operation { .. }));

            let laser = &plan.steps()[0];
            let image = &plan.steps()[1];
            let fiducial = &plan.steps()[2];
            assert_eq!(positions.get(step_no(1)), Some(&plan.target_for(laser, slice(2))));
            assert_eq!(positions.get(step_no(2)), Some(&plan.target_for(image, slice(1))));
            assert_eq!(positions.get(step_no(3)), Some(&plan.target_for(fiducial, slice(1))));
        }
        other => panic!("expected executor failure, got {other:?}"),
    }
    assert_eq!(s.executor().executed(), vec![(1, 1), (1, 2), (1, 3), (2, 1), (2, 2)]);
    assert_eq!(s.state(), SchedulerState::Idle);
}

#[tokio::test]
async fn resume_skips_earlier_work() {
    let abort = Arc::new(AbortController::new());
    let mut s = scheduler(ScriptedExecutor::new(&abort), &abort);

    let report = s
        .run_from(&three_step_plan(3), ResumePoint::new(slice(2), step_no(3)))
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(s.executor().executed(), vec![(2, 3), (3, 1), (3, 2), (3, 3)]);
    // Nothing is known about positions before the resume point, so each
    // step's first execution moves every axis.
    let calls = s.executor().calls();
    assert!(calls[..3].iter().all(|c| c.axes == AxisSet::all()));
    assert_eq!(calls[3].axes.to_string(), "Z");
}

#[tokio::test]
async fn resume_outside_plan_is_refused() {
    let abort = Arc::new(AbortController::new());
    let mut s = scheduler(ScriptedExecutor::new(&abort), &abort);

    let err = s
        .run_from(&three_step_plan(3), ResumePoint::new(slice(4), step_no(1)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SchedulerError::ConfigurationPrecondition(PlanError::ResumeOutOfRange { .. })
    ));
    assert!(s.executor().executed().is_empty());
}

#[tokio::test]
async fn thin_slices_never_move_angular_axes() {
    let abort = Arc::new(AbortController::new());
    let mut s = scheduler(ScriptedExecutor::new(&abort), &abort).with_tolerance(ToleranceSpec {
        linear: 0.0005,
        angular: 0.02,
    });
    let plan = SlicePlan::new(
        vec![step("image", 1, Orientation::MillSide, StagePosition::new(0.0, 0.0, 0.0, 52.0, 180.0))],
        5,
        36.0,
        0.002,
    )
    .unwrap();

    s.run(&plan).await.unwrap();

    let calls = s.executor().calls();
    for c in &calls[1..] {
        assert_eq!(c.axes.to_string(), "YZ", "slice {}", c.slice);
    }
}

#[tokio::test]
async fn sub_tolerance_slices_do_not_move() {
    let abort = Arc::new(AbortController::new());
    let mut s = scheduler(ScriptedExecutor::new(&abort), &abort).with_tolerance(ToleranceSpec {
        linear: 0.5,
        angular: 0.02,
    });
    let plan = SlicePlan::new(
        vec![step("image", 1, Orientation::NormalNoCorrection, StagePosition::HOME)],
        3,
        0.0,
        0.1,
    )
    .unwrap();

    s.run(&plan).await.unwrap();

    let calls = s.executor().calls();
    assert!(calls[1].axes.is_empty());
    assert!(calls[2].axes.is_empty());
}

#[tokio::test]
async fn tampered_plan_refuses_to_start() {
    let abort = Arc::new(AbortController::new());
    let mut s = scheduler(ScriptedExecutor::new(&abort), &abort);
    let mut json = serde_json::to_value(three_step_plan(2)).unwrap();
    json["steps"][1]["frequency"] = serde_json::json!(0);
    let plan: SlicePlan = serde_json::from_value(json).unwrap();

    let err = s.run(&plan).await.unwrap_err();

    assert!(matches!(
        err,
        SchedulerError::ConfigurationPrecondition(PlanError::ZeroFrequency { .. })
    ));
    assert!(s.executor().executed().is_empty());
}
