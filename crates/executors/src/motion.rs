//! Move ordering and settle verification for the five-axis stage.
//!
//! Axes are moved one at a time. Rotation goes first, and because rotating a
//! tilted stage can sweep the sample into the pole piece, tilt is brought to
//! 0° before any rotation. X, Y, Z and T follow in that order.

use sectioning::{moves_required, Axis, AxisSet, StagePosition, ToleranceSpec};

/// One single-axis absolute move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisMove {
    pub axis: Axis,
    pub value: f64,
}

const LINEAR_THEN_TILT: [Axis; 4] = [Axis::X, Axis::Y, Axis::Z, Axis::T];

/// Orders the moves needed to bring the flagged `axes` from `current` to
/// `target`.
///
/// If R is flagged and the stage is tilted beyond tolerance, T is first homed
/// to 0°. T is then restored to its target even when it was not flagged, and
/// skipped if the target tilt is already 0°.
pub fn plan_moves(
    current: &StagePosition,
    target: &StagePosition,
    axes: AxisSet,
    tol: &ToleranceSpec,
) -> Vec<AxisMove> {
    let mut moves = Vec::with_capacity(axes.len() + 1);
    let mut tilt_homed = false;

    if axes.contains(Axis::R) {
        if current.t.abs() > tol.angular {
            moves.push(AxisMove {
                axis: Axis::T,
                value: 0.0,
            });
            tilt_homed = true;
        }
        moves.push(AxisMove {
            axis: Axis::R,
            value: target.r,
        });
    }

    for axis in LINEAR_THEN_TILT {
        let needed = if axis == Axis::T && tilt_homed {
            target.t.abs() > tol.angular
        } else {
            axes.contains(axis)
        };
        if needed {
            moves.push(AxisMove {
                axis,
                value: target.axis(axis),
            });
        }
    }
    moves
}

/// Shortest angular distance between two rotation values, treating values
/// 360° apart as the same orientation.
pub fn rotation_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % 360.0;
    d.min(360.0 - d)
}

/// Axes on which `actual` is not within tolerance of `target`.
///
/// All five axes are checked, not only the ones just moved, so drift on an
/// axis the gate skipped is caught too.
pub fn unsettled_axes(actual: &StagePosition, target: &StagePosition, tol: &ToleranceSpec) -> AxisSet {
    let mut off = moves_required(target, actual, tol);
    if off.contains(Axis::R) && rotation_distance(actual.r, target.r) <= tol.angular {
        off.remove(Axis::R);
    }
    off
}

/// Human-readable per-axis error summary for a stage that did not settle.
pub fn settle_report(
    actual: &StagePosition,
    target: &StagePosition,
    axes: AxisSet,
    tol: &ToleranceSpec,
) -> String {
    axes.iter()
        .map(|axis| {
            let error = match axis {
                Axis::R => rotation_distance(actual.r, target.r),
                _ => (actual.axis(axis) - target.axis(axis)).abs(),
            };
            match axis.kind() {
                sectioning::AxisKind::Linear => format!(
                    "{axis} off by {:.3} µm (tolerance {:.3} µm)",
                    error * 1000.0,
                    tol.linear * 1000.0
                ),
                sectioning::AxisKind::Angular => format!(
                    "{axis} off by {:.3}° (tolerance {:.3}°)",
                    error, tol.angular
                ),
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}
