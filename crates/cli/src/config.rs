//! Experiment file loading and validation.
//!
//! The experiment file is TOML in the instrument's units: stage positions in
//! mm and degrees, slice thickness and translational tolerance in µm. The
//! loader converts to mm and checks every operator-facing rule here, so the
//! errors name the offending step. The sectioning core only re-checks its own
//! invariants.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sectioning::{
    last_reachable_slice, Axis, AxisLimit, Orientation, PlanError, SlicePlan, StageLimits,
    StagePosition, StepDefinition, StepKind, StepName, ToleranceSpec,
};
use serde::Deserialize;
use thiserror::Error;

/// Largest accepted slice thickness, in µm.
pub const MAX_SLICE_THICKNESS_UM: f64 = 30.0;

/// Largest accepted pre-tilt magnitude, in degrees.
pub const MAX_PRE_TILT_DEG: f64 = 60.0;

const UM_PER_MM: f64 = 1000.0;

// ---------------------------------------------------------------------------
// File schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExperimentFile {
    general: GeneralSection,
    #[serde(default)]
    steps: Vec<StepSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GeneralSection {
    slice_thickness_um: f64,
    max_slice_number: u32,
    pre_tilt_deg: f64,
    #[serde(default)]
    stage_tolerance: ToleranceSection,
    #[serde(default)]
    stage_limits: LimitsSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ToleranceSection {
    translational_um: f64,
    angular_deg: f64,
}

impl Default for ToleranceSection {
    fn default() -> Self {
        let d = ToleranceSpec::default();
        Self {
            translational_um: d.linear * UM_PER_MM,
            angular_deg: d.angular,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LimitsSection {
    x_mm: Option<[f64; 2]>,
    y_mm: Option<[f64; 2]>,
    z_mm: Option<[f64; 2]>,
    t_deg: Option<[f64; 2]>,
    r_deg: Option<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepSection {
    name: String,
    #[serde(rename = "type")]
    kind: StepKind,
    #[serde(default = "default_frequency")]
    frequency: u32,
    rotation_side: Orientation,
    position: PositionSection,
}

fn default_frequency() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PositionSection {
    x_mm: f64,
    y_mm: f64,
    z_mm: f64,
    t_deg: f64,
    r_deg: f64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an experiment file was rejected.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read experiment file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Experiment file does not match the expected schema: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Slice thickness must be in (0, 30] µm, got {0} µm")]
    ThicknessOutOfRange(f64),

    #[error("Pre-tilt must be within ±60°, got {0}°")]
    PreTiltOutOfRange(f64),

    #[error("Stage tolerance must be finite and non-negative")]
    InvalidTolerance,

    #[error("Stage limit for {axis} has min {min} greater than max {max}")]
    InvertedLimit { axis: Axis, min: f64, max: f64 },

    #[error("Step {index} has an empty name")]
    EmptyStepName { index: usize },

    #[error("Step name '{name}' is used more than once")]
    DuplicateStepName { name: String },

    #[error("Step '{name}' has frequency 0; it must be at least 1")]
    ZeroFrequency { name: String },

    #[error("EBSD step '{ebsd}' and EDS step '{eds}' cannot both be configured; use a single map step")]
    MapConflict { ebsd: String, eds: String },

    #[error("Step '{name}' starts at {axis} = {value}, outside stage limits [{min}, {max}]")]
    InitialOutOfLimits {
        name: String,
        axis: Axis,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error(transparent)]
    Plan(#[from] PlanError),
}

// ---------------------------------------------------------------------------
// Validated experiment
// ---------------------------------------------------------------------------

/// A loaded and validated experiment.
#[derive(Debug, Clone)]
pub struct Experiment {
    pub plan: SlicePlan,
    pub tolerance: ToleranceSpec,
    pub limits: StageLimits,
}

impl Experiment {
    /// Steps whose target leaves the stage limits before the last slice,
    /// with the last slice each can still reach.
    pub fn travel_shortfalls(&self) -> Vec<(StepName, u32)> {
        let plan = &self.plan;
        plan.steps()
            .iter()
            .filter_map(|step| {
                let last = last_reachable_slice(
                    step,
                    &self.limits,
                    plan.slice_count(),
                    plan.pre_tilt_deg(),
                    plan.thickness(),
                )?;
                (last.get() < plan.slice_count()).then(|| (step.name.clone(), last.get()))
            })
            .collect()
    }
}

/// Reads and validates the experiment at `path`.
pub fn load(path: &Path) -> Result<Experiment, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text)
}

/// Parses and validates experiment TOML.
pub fn parse(text: &str) -> Result<Experiment, ConfigError> {
    let file: ExperimentFile = toml::from_str(text)?;
    let general = &file.general;

    let thickness_um = general.slice_thickness_um;
    if !(thickness_um > 0.0 && thickness_um <= MAX_SLICE_THICKNESS_UM) {
        return Err(ConfigError::ThicknessOutOfRange(thickness_um));
    }
    if !(general.pre_tilt_deg.abs() <= MAX_PRE_TILT_DEG) {
        return Err(ConfigError::PreTiltOutOfRange(general.pre_tilt_deg));
    }

    let tolerance = ToleranceSpec::new(
        general.stage_tolerance.translational_um / UM_PER_MM,
        general.stage_tolerance.angular_deg,
    )
    .ok_or(ConfigError::InvalidTolerance)?;

    let limits = build_limits(&general.stage_limits)?;
    let steps = build_steps(&file.steps, &limits)?;

    let plan = SlicePlan::new(
        steps,
        general.max_slice_number,
        general.pre_tilt_deg,
        thickness_um / UM_PER_MM,
    )?;

    Ok(Experiment {
        plan,
        tolerance,
        limits,
    })
}

fn build_limits(section: &LimitsSection) -> Result<StageLimits, ConfigError> {
    let limit = |axis: Axis, pair: Option<[f64; 2]>| match pair {
        None => Ok(AxisLimit::UNBOUNDED),
        Some([min, max]) if min <= max => Ok(AxisLimit { min, max }),
        Some([min, max]) => Err(ConfigError::InvertedLimit { axis, min, max }),
    };
    Ok(StageLimits {
        x: limit(Axis::X, section.x_mm)?,
        y: limit(Axis::Y, section.y_mm)?,
        z: limit(Axis::Z, section.z_mm)?,
        t: limit(Axis::T, section.t_deg)?,
        r: limit(Axis::R, section.r_deg)?,
    })
}

fn build_steps(
    sections: &[StepSection],
    limits: &StageLimits,
) -> Result<Vec<StepDefinition>, ConfigError> {
    let mut seen = HashSet::new();
    let mut ebsd = None;
    let mut eds = None;
    let mut steps = Vec::with_capacity(sections.len());

    for (i, s) in sections.iter().enumerate() {
        let name = StepName::new(s.name.trim()).ok_or(ConfigError::EmptyStepName { index: i + 1 })?;
        if !seen.insert(name.clone()) {
            return Err(ConfigError::DuplicateStepName { name: s.name.clone() });
        }
        if s.frequency == 0 {
            return Err(ConfigError::ZeroFrequency { name: s.name.clone() });
        }
        match s.kind {
            StepKind::Ebsd => ebsd = ebsd.or(Some(s.name.clone())),
            StepKind::Eds => eds = eds.or(Some(s.name.clone())),
            _ => {}
        }

        let p = &s.position;
        let initial = StagePosition::new(p.x_mm, p.y_mm, p.z_mm, p.t_deg, p.r_deg);
        if let Some(axis) = limits.first_violation(&initial) {
            let limit = limits.for_axis(axis);
            return Err(ConfigError::InitialOutOfLimits {
                name: s.name.clone(),
                axis,
                value: initial.axis(axis),
                min: limit.min,
                max: limit.max,
            });
        }

        steps.push(StepDefinition {
            name,
            kind: s.kind,
            frequency: s.frequency,
            orientation: s.rotation_side,
            initial,
        });
    }

    if let (Some(ebsd), Some(eds)) = (ebsd, eds) {
        return Err(ConfigError::MapConflict { ebsd, eds });
    }
    Ok(steps)
}
