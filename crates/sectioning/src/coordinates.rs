//! Absolute per-slice targets for each step.
//!
//! Targets are an affine function of the slice number, computed from the
//! step's fixed initial position as `initial + (slice - 1) * delta`. They are
//! never accumulated by repeated addition, so slice 500 carries exactly one
//! multiplication worth of rounding error, the same as slice 2.

use crate::{axis_deltas, SliceNumber, StageLimits, StagePosition, StepDefinition};

/// Returns the absolute stage target for `step` on `slice`.
///
/// Only Z and Y change with slice number; X, T and R stay at the step's
/// initial values.
pub fn target_for(
    step: &StepDefinition,
    slice: SliceNumber,
    pre_tilt_deg: f64,
    thickness: f64,
) -> StagePosition {
    let n = f64::from(slice.get() - 1);
    let deltas = axis_deltas(thickness, pre_tilt_deg, step.orientation);
    StagePosition {
        z: step.initial.z + n * deltas.primary,
        y: step.initial.y + n * deltas.secondary,
        ..step.initial
    }
}

/// Returns the last slice on which `step` stays within `limits`, searching up
/// to `slice_count`, or `None` if even slice 1 is out of range.
///
/// Useful for warning an operator before a long run that the stage will run
/// out of travel part way through.
pub fn last_reachable_slice(
    step: &StepDefinition,
    limits: &StageLimits,
    slice_count: u32,
    pre_tilt_deg: f64,
    thickness: f64,
) -> Option<SliceNumber> {
    // Targets are affine in the slice number, so reachability is monotone
    // within the interval and the slice bounds can be bisected.
    let reachable = |s: u32| {
        SliceNumber::new(s).is_some_and(|slice| {
            let target = target_for(step, slice, pre_tilt_deg, thickness);
            limits.first_violation(&target).is_none()
        })
    };
    if !reachable(1) {
        return None;
    }
    let (mut lo, mut hi) = (1u32, slice_count.max(1));
    if reachable(hi) {
        return SliceNumber::new(hi);
    }
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if reachable(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    SliceNumber::new(lo)
}
