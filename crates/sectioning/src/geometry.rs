//! Per-slice axis corrections for a pre-tilted sample.
//!
//! The sample surface and the slice-thickness vector form a right triangle:
//! removing `thickness` of material perpendicular to a surface tilted by
//! `pre_tilt` moves the cut face by `thickness * cos(pre_tilt)` along the
//! sectioning axis (Z) and `thickness * sin(pre_tilt)` along Y. Which way Y
//! moves depends on the side of the pre-tilt the step was set up on.

use serde::{Deserialize, Serialize};

use crate::Orientation;

/// Per-slice increments on the primary (Z) and secondary (Y) axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisDeltas {
    /// Correction toward the beam source; non-negative for |pre-tilt| <= 90°.
    pub primary: f64,
    /// Pre-tilt compensation; its sign encodes the orientation.
    pub secondary: f64,
}

/// Decomposes one slice of material removal into axis increments.
///
/// Inputs are trusted: thickness and pre-tilt range are validated when the
/// plan is built.
pub fn axis_deltas(thickness: f64, pre_tilt_deg: f64, orientation: Orientation) -> AxisDeltas {
    let pre_tilt = pre_tilt_deg.to_radians();
    match orientation {
        Orientation::LaserSide => AxisDeltas {
            primary: thickness * pre_tilt.cos(),
            secondary: -(thickness * pre_tilt.sin()),
        },
        Orientation::MillSide => AxisDeltas {
            primary: thickness * pre_tilt.cos(),
            secondary: thickness * pre_tilt.sin(),
        },
        Orientation::NormalNoCorrection => AxisDeltas {
            primary: thickness,
            secondary: 0.0,
        },
    }
}
