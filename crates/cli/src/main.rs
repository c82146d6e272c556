//! `slicerun` entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse arguments** with `clap` and load the experiment TOML through
//!    [`config`], which validates it and converts it to a `SlicePlan`.
//! 2. **Wire observability**: `tracing-subscriber` with an env filter, a
//!    pretty or JSON console layer, and an optional OTLP exporter
//!    (see [`telemetry`]).
//! 3. **Construct infrastructure**: the simulated stage and operation
//!    handler, wrapped in the instrument executor and the retry decorator,
//!    plus the operator command sources feeding the abort controller.
//! 4. **Run or preview**: `run` drives the scheduler and prints the run
//!    report as JSON on stdout; `plan` prints per-slice targets without
//!    touching the instrument.
//!
//! Exit status is zero when a run completes or is stopped cleanly.

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use executors::{InstrumentExecutor, Retrying, SimulatedOperations, SimulatedStage};
use sectioning::{
    AbortController, ResumePoint, RunReport, Scheduler, SchedulerError, SliceNumber, StepNumber,
    TargetPreview,
};

mod config;
mod telemetry;

use config::Experiment;
use telemetry::LogFormat;

/// Attempts per step in the retry decorator, including the first.
const STEP_ATTEMPTS: u32 = 2;

#[derive(Debug, Parser)]
#[command(name = "slicerun", version, about = "Serial-sectioning run controller")]
struct Cli {
    /// Console log format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    /// Export spans to this OTLP/gRPC endpoint (e.g. http://localhost:4317).
    #[arg(long, global = true)]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run an experiment against the simulated instrument.
    Run(RunArgs),
    /// Print the stage targets each step would use, without running.
    Plan(PlanArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Experiment file (TOML).
    experiment: PathBuf,

    /// First slice to run.
    #[arg(long, default_value_t = 1)]
    start_slice: u32,

    /// First step to run on the start slice.
    #[arg(long, default_value_t = 1)]
    start_step: u32,

    /// Read stop commands (step, slice, stop) from stdin while running.
    #[arg(long)]
    console: bool,
}

#[derive(Debug, Args)]
struct PlanArgs {
    /// Experiment file (TOML).
    experiment: PathBuf,

    /// Slices to show, as `N` or `A..B` (inclusive). Defaults to every slice.
    #[arg(long)]
    slices: Option<SliceRange>,

    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
}

/// Inclusive range of slice numbers given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SliceRange {
    first: u32,
    last: u32,
}

impl FromStr for SliceRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid slice number '{v}': {e}"))
        };
        let (first, last) = match s.split_once("..") {
            Some((a, b)) => (parse(a)?, parse(b.trim_start_matches('='))?),
            None => {
                let n = parse(s)?;
                (n, n)
            }
        };
        if first == 0 || first > last {
            return Err(format!("slice range '{s}' must satisfy 1 <= first <= last"));
        }
        Ok(SliceRange { first, last })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Error: cannot start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(async_main(cli));
    // A pending stdin read must not hold the process open.
    runtime.shutdown_background();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn async_main(cli: Cli) -> anyhow::Result<()> {
    let telemetry = telemetry::init(cli.log_format, cli.otlp_endpoint.as_deref())?;
    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Plan(args) => plan(args),
    };
    telemetry.shutdown();
    result
}

fn load_experiment(path: &std::path::Path) -> anyhow::Result<Experiment> {
    let experiment = config::load(path)
        .with_context(|| format!("loading experiment {}", path.display()))?;
    for (name, last) in experiment.travel_shortfalls() {
        tracing::warn!(
            step = %name,
            last_reachable_slice = last,
            slice_count = experiment.plan.slice_count(),
            "Step will leave the stage limits before the final slice"
        );
    }
    Ok(experiment)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let experiment = load_experiment(&args.experiment)?;
    let resume = ResumePoint::new(
        SliceNumber::new(args.start_slice).context("--start-slice must be at least 1")?,
        StepNumber::new(args.start_step).context("--start-step must be at least 1")?,
    );

    let abort = AbortController::global();
    spawn_operator_sources(&abort, args.console);

    match execute(&experiment, resume, abort).await {
        Ok(report) => {
            tracing::info!(outcome = %report.outcome, "Run finished");
            print_json(&report)
        }
        Err(SchedulerError::ExecutorFailure {
            slice,
            step,
            name,
            source,
            positions,
        }) => {
            // Positions go to stdout so the run can be resumed from them.
            print_json(&positions)?;
            Err(anyhow::Error::new(source)
                .context(format!("step {step} ('{name}') failed on slice {slice}")))
        }
        Err(err) => Err(err.into()),
    }
}

/// Builds the simulated instrument and runs the experiment's plan.
async fn execute(
    experiment: &Experiment,
    resume: ResumePoint,
    abort: Arc<AbortController>,
) -> Result<RunReport, SchedulerError> {
    let instrument = InstrumentExecutor::new(SimulatedStage::new(), SimulatedOperations::new())
        .with_limits(experiment.limits)
        .with_tolerance(experiment.tolerance);
    let executor = Retrying::new(instrument, STEP_ATTEMPTS);

    let mut scheduler = Scheduler::new(executor, abort).with_tolerance(experiment.tolerance);
    scheduler.run_from(&experiment.plan, resume).await
}

fn spawn_operator_sources(abort: &Arc<AbortController>, console: bool) {
    let interrupts = Arc::clone(abort);
    tokio::spawn(async move {
        if let Err(err) = operator::watch_interrupts(interrupts).await {
            tracing::error!(error = %err, "Cannot listen for Ctrl-C");
        }
    });

    if console {
        let commands = Arc::clone(abort);
        tokio::spawn(async move {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            if let Err(err) = operator::forward_commands(stdin, &commands).await {
                tracing::error!(error = %err, "Operator console closed");
            }
        });
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialising report")?;
    println!("{text}");
    Ok(())
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

#[derive(serde::Serialize)]
struct SlicePreview<'a> {
    slice: SliceNumber,
    targets: &'a [TargetPreview],
}

fn plan(args: PlanArgs) -> anyhow::Result<()> {
    let experiment = load_experiment(&args.experiment)?;
    let plan = &experiment.plan;
    let range = args.slices.unwrap_or(SliceRange {
        first: 1,
        last: plan.slice_count(),
    });
    anyhow::ensure!(
        range.last <= plan.slice_count(),
        "slice range ends at {} but the experiment has {} slices",
        range.last,
        plan.slice_count()
    );

    let rows: Vec<_> = (range.first..=range.last)
        .filter_map(SliceNumber::new)
        .map(|slice| (slice, plan.preview(slice)))
        .collect();

    if args.json {
        let json: Vec<_> = rows
            .iter()
            .map(|(slice, targets)| SlicePreview {
                slice: *slice,
                targets,
            })
            .collect();
        return print_json(&json);
    }

    println!(
        "{:>6} {:>4}  {:<16} {:>5}  {:>12} {:>12} {:>12} {:>9} {:>9}",
        "slice", "step", "name", "fires", "x (mm)", "y (mm)", "z (mm)", "t (deg)", "r (deg)"
    );
    for (slice, targets) in &rows {
        for t in targets {
            println!(
                "{:>6} {:>4}  {:<16} {:>5}  {:>12.6} {:>12.6} {:>12.6} {:>9.3} {:>9.3}",
                slice.get(),
                t.step.get(),
                t.name.as_str(),
                if t.fires { "yes" } else { "-" },
                t.target.x,
                t.target.y,
                t.target.z,
                t.target.t,
                t.target.r,
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sectioning::{AbortSignal, RunOutcome};

    const EXPERIMENT: &str = r#"
        [general]
        slice_thickness_um = 10.0
        max_slice_number = 3
        pre_tilt_deg = 30.0

        [[steps]]
        name = "mill"
        type = "laser"
        rotation_side = "laser_side"
        position = { x_mm = 0.0, y_mm = 0.0, z_mm = 0.0, t_deg = 0.0, r_deg = 0.0 }

        [[steps]]
        name = "image"
        type = "image"
        rotation_side = "mill_side"
        position = { x_mm = 0.0, y_mm = 0.0, z_mm = 0.0, t_deg = 52.0, r_deg = 180.0 }
    "#;

    #[test]
    fn slice_range_parses_single_and_span() {
        assert_eq!("4".parse::<SliceRange>(), Ok(SliceRange { first: 4, last: 4 }));
        assert_eq!("2..5".parse::<SliceRange>(), Ok(SliceRange { first: 2, last: 5 }));
        assert_eq!("2..=5".parse::<SliceRange>(), Ok(SliceRange { first: 2, last: 5 }));
        assert!("0..2".parse::<SliceRange>().is_err());
        assert!("5..2".parse::<SliceRange>().is_err());
    }

    #[test]
    fn cli_accepts_run_arguments() {
        let cli = Cli::try_parse_from([
            "slicerun",
            "run",
            "exp.toml",
            "--start-slice",
            "3",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.start_slice, 3);
                assert_eq!(args.start_step, 1);
                assert!(!args.console);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn simulated_run_completes_every_step() {
        let experiment = config::parse(EXPERIMENT).unwrap();
        let abort = Arc::new(AbortController::new());

        let report = execute(&experiment, ResumePoint::default(), abort).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.records.len(), 6);
        let last_mill = report.positions.get(StepNumber::first()).unwrap();
        assert!((last_mill.z - 2.0 * 0.01 * 30f64.to_radians().cos()).abs() < 1e-12);
    }

    #[tokio::test]
    async fn pending_hard_stop_is_cleared_at_run_start() {
        let experiment = config::parse(EXPERIMENT).unwrap();
        let abort = Arc::new(AbortController::new());
        abort.request_hard_stop();

        let report = execute(&experiment, ResumePoint::default(), Arc::clone(&abort))
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(abort.current(), AbortSignal::None);
    }

    #[tokio::test]
    async fn out_of_limits_step_fails_the_run() {
        let text = EXPERIMENT.replace(
            "pre_tilt_deg = 30.0",
            "pre_tilt_deg = 30.0\n[general.stage_limits]\nz_mm = [0.0, 0.015]",
        );
        let experiment = config::parse(&text).unwrap();
        let abort = Arc::new(AbortController::new());

        let err = execute(&experiment, ResumePoint::default(), abort)
            .await
            .unwrap_err();

        match err {
            SchedulerError::ExecutorFailure { slice, step, positions, .. } => {
                assert_eq!(slice.get(), 3);
                assert_eq!(step, StepNumber::first());
                assert!(positions.get(StepNumber::first()).is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
