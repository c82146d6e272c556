//! The validated description of a sectioning run.
//!
//! A [`SlicePlan`] is built once before a run and never mutated while one is
//! in progress; re-running with different settings means building a new plan.

use serde::{Deserialize, Serialize};

use crate::{
    target_for, PlanError, SliceNumber, StagePosition, StepDefinition, StepName, StepNumber,
};

/// Ordered steps plus the run-wide sectioning geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlicePlan {
    steps: Vec<StepDefinition>,
    slice_count: u32,
    pre_tilt_deg: f64,
    thickness: f64,
}

impl SlicePlan {
    /// Builds a plan, checking its invariants.
    ///
    /// `thickness` is in the same linear unit as the step positions (mm).
    pub fn new(
        steps: Vec<StepDefinition>,
        slice_count: u32,
        pre_tilt_deg: f64,
        thickness: f64,
    ) -> Result<Self, PlanError> {
        let plan = Self {
            steps,
            slice_count,
            pre_tilt_deg,
            thickness,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Re-checks the plan invariants.
    ///
    /// Deserialised plans bypass [`SlicePlan::new`], so the scheduler calls
    /// this before every run.
    pub fn validate(&self) -> Result<(), PlanError> {
        if !(self.thickness.is_finite() && self.thickness > 0.0) {
            return Err(PlanError::NonPositiveThickness(self.thickness));
        }
        if !self.pre_tilt_deg.is_finite() {
            return Err(PlanError::NonFinitePreTilt(self.pre_tilt_deg));
        }
        if self.slice_count == 0 {
            return Err(PlanError::NoSlices);
        }
        if self.steps.is_empty() {
            return Err(PlanError::NoSteps);
        }
        for (number, step) in self.numbered_steps() {
            if step.frequency == 0 {
                return Err(PlanError::ZeroFrequency {
                    step: number,
                    name: step.name.clone(),
                });
            }
            if !step.initial.is_finite() {
                return Err(PlanError::NonFinitePosition {
                    step: number,
                    name: step.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn slice_count(&self) -> u32 {
        self.slice_count
    }

    pub fn pre_tilt_deg(&self) -> f64 {
        self.pre_tilt_deg
    }

    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    /// Returns the step at `number`, if the plan has that many steps.
    pub fn step(&self, number: StepNumber) -> Option<&StepDefinition> {
        self.steps.get(number.index())
    }

    /// Iterates the steps in execution order with their 1-based numbers.
    pub fn numbered_steps(&self) -> impl Iterator<Item = (StepNumber, &StepDefinition)> {
        self.steps
            .iter()
            .enumerate()
            .filter_map(|(i, s)| StepNumber::from_index(i).map(|n| (n, s)))
    }

    /// Iterates slice numbers from `first` through the last slice.
    pub fn slices_from(&self, first: SliceNumber) -> impl Iterator<Item = SliceNumber> {
        (first.get()..=self.slice_count).filter_map(SliceNumber::new)
    }

    /// Absolute target of `step` on `slice` under this plan's geometry.
    pub fn target_for(&self, step: &StepDefinition, slice: SliceNumber) -> StagePosition {
        target_for(step, slice, self.pre_tilt_deg, self.thickness)
    }

    /// Every step's target on `slice`, and whether the step fires there.
    pub fn preview(&self, slice: SliceNumber) -> Vec<TargetPreview> {
        self.numbered_steps()
            .map(|(number, step)| TargetPreview {
                step: number,
                name: step.name.clone(),
                fires: step.fires_on(slice),
                target: self.target_for(step, slice),
            })
            .collect()
    }
}

/// One row of [`SlicePlan::preview`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetPreview {
    pub step: StepNumber,
    pub name: StepName,
    /// Whether the frequency gate lets this step run on the previewed slice.
    pub fires: bool,
    pub target: StagePosition,
}

// ---------------------------------------------------------------------------
// Resume
// ---------------------------------------------------------------------------

/// Where a run begins. Slices before `slice` are skipped entirely; on `slice`
/// itself only steps from `step` onward run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub slice: SliceNumber,
    pub step: StepNumber,
}

impl ResumePoint {
    pub fn new(slice: SliceNumber, step: StepNumber) -> Self {
        Self { slice, step }
    }

    /// Checks that the resume point addresses a slice and step in `plan`.
    pub fn check(&self, plan: &SlicePlan) -> Result<(), PlanError> {
        if self.slice.get() > plan.slice_count() || self.step.index() >= plan.step_count() {
            return Err(PlanError::ResumeOutOfRange {
                slice: self.slice,
                step: self.step,
                slice_count: plan.slice_count(),
                step_count: plan.step_count(),
            });
        }
        Ok(())
    }
}

impl Default for ResumePoint {
    fn default() -> Self {
        Self {
            slice: SliceNumber::first(),
            step: StepNumber::first(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Orientation, StepKind};

    fn step(name: &str, frequency: u32) -> StepDefinition {
        StepDefinition {
            name: StepName::new(name).unwrap(),
            kind: StepKind::Image,
            frequency,
            orientation: Orientation::MillSide,
            initial: StagePosition::HOME,
        }
    }

    #[test]
    fn rejects_invalid_geometry() {
        assert_eq!(
            SlicePlan::new(vec![step("a", 1)], 10, 30.0, 0.0),
            Err(PlanError::NonPositiveThickness(0.0))
        );
        assert_eq!(
            SlicePlan::new(vec![step("a", 1)], 0, 30.0, 0.001),
            Err(PlanError::NoSlices)
        );
        assert_eq!(SlicePlan::new(vec![], 1, 30.0, 0.001), Err(PlanError::NoSteps));
    }

    #[test]
    fn rejects_zero_frequency_naming_step() {
        let err = SlicePlan::new(vec![step("a", 1), step("b", 0)], 3, 0.0, 0.001).unwrap_err();
        assert_eq!(
            err,
            PlanError::ZeroFrequency {
                step: StepNumber::new(2).unwrap(),
                name: StepName::new("b").unwrap(),
            }
        );
    }

    #[test]
    fn deserialised_plan_is_revalidated() {
        let plan = SlicePlan::new(vec![step("a", 1)], 2, 0.0, 0.001).unwrap();
        let mut json = serde_json::to_value(&plan).unwrap();
        json["thickness"] = serde_json::json!(-1.0);
        let tampered: SlicePlan = serde_json::from_value(json).unwrap();
        assert!(tampered.validate().is_err());
    }

    #[test]
    fn preview_reports_frequency_gate() {
        let plan = SlicePlan::new(vec![step("every", 1), step("odd", 2)], 4, 0.0, 0.001).unwrap();
        let slice2 = plan.preview(SliceNumber::new(2).unwrap());
        assert_eq!(slice2.iter().map(|p| p.fires).collect::<Vec<_>>(), vec![true, false]);
        let slice3 = plan.preview(SliceNumber::new(3).unwrap());
        assert!(slice3.iter().all(|p| p.fires));
    }

    #[test]
    fn resume_point_must_be_inside_plan() {
        let plan = SlicePlan::new(vec![step("a", 1), step("b", 1)], 3, 0.0, 0.001).unwrap();
        let ok = ResumePoint::new(SliceNumber::new(3).unwrap(), StepNumber::new(2).unwrap());
        assert!(ok.check(&plan).is_ok());
        let bad_step = ResumePoint::new(SliceNumber::new(1).unwrap(), StepNumber::new(3).unwrap());
        assert!(bad_step.check(&plan).is_err());
        let bad_slice = ResumePoint::new(SliceNumber::new(4).unwrap(), StepNumber::first());
        assert!(bad_slice.check(&plan).is_err());
    }
}
