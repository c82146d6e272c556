//! Tolerance gate: decides which axes actually need a move command.
//!
//! Moving an axis that is already within tolerance only adds settling time and
//! wear. The gate is a pure filter; the caller issues the moves and records the
//! new position.

use crate::{Axis, AxisSet, StagePosition, ToleranceSpec};

/// Returns the axes whose distance from `target` strictly exceeds the
/// tolerance for that axis kind.
///
/// A difference exactly equal to the tolerance does not require a move.
pub fn moves_required(
    target: &StagePosition,
    last_actual: &StagePosition,
    tol: &ToleranceSpec,
) -> AxisSet {
    Axis::ALL
        .into_iter()
        .filter(|&axis| (target.axis(axis) - last_actual.axis(axis)).abs() > tol.for_axis(axis))
        .collect()
}

/// Like [`moves_required`], but with no known prior position every axis is
/// flagged.
pub fn moves_from(
    target: &StagePosition,
    last_actual: Option<&StagePosition>,
    tol: &ToleranceSpec,
) -> AxisSet {
    match last_actual {
        Some(last) => moves_required(target, last, tol),
        None => AxisSet::all(),
    }
}
