//! Shared value types for the sectioning domain.
//!
//! Positions are plain values: every target computation produces a fresh
//! [`StagePosition`] and nothing mutates one in place. Linear axes are in
//! millimetres and angular axes in degrees throughout the crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Axes
// ---------------------------------------------------------------------------

/// Whether an axis translates or rotates the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisKind {
    /// Translation, in millimetres.
    Linear,
    /// Rotation, in degrees.
    Angular,
}

/// One of the five stage axes.
///
/// Z is the sectioning (primary) axis, Y the pre-tilt compensation
/// (secondary) axis, X the orthogonal linear axis. T is tilt and R rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
    T,
    R,
}

impl Axis {
    /// Every axis, in declaration order.
    pub const ALL: [Axis; 5] = [Axis::X, Axis::Y, Axis::Z, Axis::T, Axis::R];

    /// Returns whether this axis translates or rotates.
    pub fn kind(self) -> AxisKind {
        match self {
            Axis::X | Axis::Y | Axis::Z => AxisKind::Linear,
            Axis::T | Axis::R => AxisKind::Angular,
        }
    }

    /// Display unit for values on this axis.
    pub fn unit(self) -> &'static str {
        match self.kind() {
            AxisKind::Linear => "mm",
            AxisKind::Angular => "deg",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
            Axis::T => "T",
            Axis::R => "R",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------

/// A set of stage axes, e.g. the axes the tolerance gate flagged for a move.
///
/// Iteration always follows [`Axis::ALL`] order regardless of insertion order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AxisSet(u8);

impl AxisSet {
    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// The set of all five axes.
    pub fn all() -> Self {
        Axis::ALL.into_iter().collect()
    }

    /// Adds `axis` to the set.
    pub fn insert(&mut self, axis: Axis) {
        self.0 |= axis.bit();
    }

    /// Removes `axis` from the set.
    pub fn remove(&mut self, axis: Axis) {
        self.0 &= !axis.bit();
    }

    /// Returns `true` if `axis` is in the set.
    pub fn contains(self, axis: Axis) -> bool {
        self.0 & axis.bit() != 0
    }

    /// Returns `true` if no axis is in the set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of axes in the set.
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterates the axes in [`Axis::ALL`] order.
    pub fn iter(self) -> impl Iterator<Item = Axis> {
        Axis::ALL.into_iter().filter(move |a| self.contains(*a))
    }
}

impl FromIterator<Axis> for AxisSet {
    fn from_iter<I: IntoIterator<Item = Axis>>(iter: I) -> Self {
        let mut set = AxisSet::empty();
        for axis in iter {
            set.insert(axis);
        }
        set
    }
}

impl std::fmt::Debug for AxisSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl std::fmt::Display for AxisSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        for axis in self.iter() {
            write!(f, "{axis}")?;
        }
        Ok(())
    }
}

impl Serialize for AxisSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for AxisSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let axes = Vec::<Axis>::deserialize(deserializer)?;
        Ok(axes.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Absolute stage position in raw stage coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StagePosition {
    /// Orthogonal linear axis (mm).
    pub x: f64,
    /// Secondary linear axis (mm); compensates for pre-tilt.
    pub y: f64,
    /// Primary linear axis (mm); advances toward the beam source each slice.
    pub z: f64,
    /// Tilt (degrees).
    pub t: f64,
    /// Rotation (degrees).
    pub r: f64,
}

impl StagePosition {
    /// The home position: every axis at zero.
    pub const HOME: StagePosition = StagePosition {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        t: 0.0,
        r: 0.0,
    };

    /// Creates a position from its five axis values.
    pub fn new(x: f64, y: f64, z: f64, t: f64, r: f64) -> Self {
        Self { x, y, z, t, r }
    }

    /// Returns the value on `axis`.
    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
            Axis::T => self.t,
            Axis::R => self.r,
        }
    }

    /// Returns a copy with `axis` replaced by `value`.
    #[must_use]
    pub fn with_axis(self, axis: Axis, value: f64) -> Self {
        let mut next = self;
        match axis {
            Axis::X => next.x = value,
            Axis::Y => next.y = value,
            Axis::Z => next.z = value,
            Axis::T => next.t = value,
            Axis::R => next.r = value,
        }
        next
    }

    /// Returns `true` if every axis value is finite.
    pub fn is_finite(&self) -> bool {
        Axis::ALL.into_iter().all(|a| self.axis(a).is_finite())
    }
}

impl std::fmt::Display for StagePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "X {:.4} mm, Y {:.4} mm, Z {:.4} mm, T {:.3}°, R {:.3}°",
            self.x, self.y, self.z, self.t, self.r
        )
    }
}

// ---------------------------------------------------------------------------
// Orientation
// ---------------------------------------------------------------------------

/// Which side of the pre-tilt a step's stage position was set up on.
///
/// Determines the sign of the secondary-axis (Y) correction per slice. The
/// serialised names accept the instrument's rotation-side vocabulary as
/// aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Cut face toward the laser: Y decreases each slice.
    #[serde(alias = "fsl_mill")]
    LaserSide,
    /// Cut face toward the mill/imaging column (rotated 180°): Y increases each slice.
    #[serde(alias = "fib_mill")]
    MillSide,
    /// No secondary correction; sectioning lies directly along Z.
    #[serde(alias = "ebeam_normal")]
    NormalNoCorrection,
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Orientation::LaserSide => "laser_side",
            Orientation::MillSide => "mill_side",
            Orientation::NormalNoCorrection => "normal_no_correction",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// The operation a step performs. Opaque to the scheduler; only executors
/// branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Electron or ion beam image capture.
    Image,
    /// Femtosecond laser milling.
    Laser,
    /// Focused ion beam milling.
    Fib,
    /// Electron backscatter diffraction map.
    Ebsd,
    /// Energy dispersive spectroscopy map.
    Eds,
    /// Operator-provided script.
    Custom,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StepKind::Image => "image",
            StepKind::Laser => "laser",
            StepKind::Fib => "fib",
            StepKind::Ebsd => "ebsd",
            StepKind::Eds => "eds",
            StepKind::Custom => "custom",
        };
        f.write_str(label)
    }
}

/// One configured operation in the per-slice pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Operator-facing name.
    pub name: crate::StepName,
    /// What the executor does at the target position.
    pub kind: StepKind,
    /// Execute on slices 1, 1 + f, 1 + 2f, ...; must be at least 1.
    pub frequency: u32,
    /// Side of the pre-tilt the initial position was set up on.
    pub orientation: Orientation,
    /// Stage position for slice 1.
    pub initial: StagePosition,
}

impl StepDefinition {
    /// Returns `true` if this step executes on `slice`.
    ///
    /// A zero frequency never fires; plan validation rejects it before a run.
    pub fn fires_on(&self, slice: crate::SliceNumber) -> bool {
        self.frequency != 0 && (slice.get() - 1) % self.frequency == 0
    }
}

// ---------------------------------------------------------------------------
// Tolerance and limits
// ---------------------------------------------------------------------------

/// Positional tolerance below which an axis is not moved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceSpec {
    /// Shared by X, Y and Z (mm).
    pub linear: f64,
    /// Shared by T and R (degrees).
    pub angular: f64,
}

impl ToleranceSpec {
    /// Creates a tolerance, returning `None` if either value is negative or
    /// not finite.
    #[must_use]
    pub fn new(linear: f64, angular: f64) -> Option<Self> {
        let ok = |v: f64| v.is_finite() && v >= 0.0;
        if ok(linear) && ok(angular) {
            Some(Self { linear, angular })
        } else {
            None
        }
    }

    /// Returns the tolerance applying to `axis`.
    pub fn for_axis(&self, axis: Axis) -> f64 {
        match axis.kind() {
            AxisKind::Linear => self.linear,
            AxisKind::Angular => self.angular,
        }
    }
}

impl Default for ToleranceSpec {
    /// 0.5 µm translational, 0.02° angular.
    fn default() -> Self {
        Self {
            linear: 0.0005,
            angular: 0.02,
        }
    }
}

// ---------------------------------------------------------------------------

/// Closed interval `[min, max]` of permitted values on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisLimit {
    pub min: f64,
    pub max: f64,
}

impl AxisLimit {
    /// An interval admitting every finite value.
    pub const UNBOUNDED: AxisLimit = AxisLimit {
        min: f64::NEG_INFINITY,
        max: f64::INFINITY,
    };

    /// Returns `true` if `value` lies within the closed interval.
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl Default for AxisLimit {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

/// Travel limits of the stage, one closed interval per axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageLimits {
    pub x: AxisLimit,
    pub y: AxisLimit,
    pub z: AxisLimit,
    pub t: AxisLimit,
    pub r: AxisLimit,
}

impl StageLimits {
    /// Returns the interval for `axis`.
    pub fn for_axis(&self, axis: Axis) -> AxisLimit {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
            Axis::T => self.t,
            Axis::R => self.r,
        }
    }

    /// Returns the first axis (in [`Axis::ALL`] order) on which `position`
    /// falls outside the limits, or `None` if the position is reachable.
    pub fn first_violation(&self, position: &StagePosition) -> Option<Axis> {
        Axis::ALL
            .into_iter()
            .find(|a| !self.for_axis(*a).contains(position.axis(*a)))
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_set_iterates_in_axis_order() {
        let set: AxisSet = [Axis::R, Axis::X, Axis::Z].into_iter().collect();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Axis::X, Axis::Z, Axis::R]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.to_string(), "XZR");
    }

    #[test]
    fn axis_set_serialises_as_list() {
        let set: AxisSet = [Axis::Y, Axis::T].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["y","t"]"#);
        let back: AxisSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn orientation_accepts_rotation_side_aliases() {
        let o: Orientation = serde_json::from_str(r#""fsl_mill""#).unwrap();
        assert_eq!(o, Orientation::LaserSide);
        let o: Orientation = serde_json::from_str(r#""fib_mill""#).unwrap();
        assert_eq!(o, Orientation::MillSide);
        let o: Orientation = serde_json::from_str(r#""ebeam_normal""#).unwrap();
        assert_eq!(o, Orientation::NormalNoCorrection);
    }

    #[test]
    fn tolerance_rejects_negative() {
        assert!(ToleranceSpec::new(-0.1, 0.0).is_none());
        assert!(ToleranceSpec::new(0.0, f64::NAN).is_none());
        assert_eq!(ToleranceSpec::new(0.5, 0.1).unwrap().for_axis(Axis::R), 0.1);
    }

    #[test]
    fn limits_report_first_violating_axis() {
        let limits = StageLimits {
            z: AxisLimit { min: 0.0, max: 10.0 },
            r: AxisLimit { min: -180.0, max: 180.0 },
            ..StageLimits::default()
        };
        assert_eq!(limits.first_violation(&StagePosition::HOME), None);
        let pos = StagePosition::new(0.0, 0.0, 12.0, 0.0, 200.0);
        assert_eq!(limits.first_violation(&pos), Some(Axis::Z));
    }
}
