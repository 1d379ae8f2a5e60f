// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! Common numeric types used throughout the system.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    ops::{Add, AddAssign, Mul, Sub},
    time::{Duration, Instant},
};

/// A float constrained to the range [0.0, 1.0].
///
/// [Normal] enforces the range at construction by clamping, silently. Math
/// operations between two [Normal]s re-clamp where the result could escape
/// the range. All controller knob values in the system are [Normal] or
/// [BipolarNormal], which makes the mapping to 7-bit MIDI values and OSC
/// floats trivial.
#[derive(Display, Debug, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Normal(f64);
impl Normal {
    #[allow(missing_docs)]
    pub const ZERO: Self = Self(0.0);
    #[allow(missing_docs)]
    pub const ONE: Self = Self(1.0);

    /// Creates a new [Normal], clamping out-of-range values.
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    /// The inner value.
    pub fn val(&self) -> f64 {
        self.0
    }

    /// The larger of two unit values.
    pub fn max(&self, other: Normal) -> Normal {
        Self(self.0.max(other.0))
    }
}
impl Default for Normal {
    fn default() -> Self {
        Self::ZERO
    }
}
impl From<Normal> for f64 {
    fn from(value: Normal) -> Self {
        value.0
    }
}
impl Mul<Normal> for Normal {
    type Output = Normal;
    // The product of two unit values cannot escape the unit range.
    fn mul(self, rhs: Normal) -> Self::Output {
        Self(self.0 * rhs.0)
    }
}
impl Add<Normal> for Normal {
    type Output = Normal;
    fn add(self, rhs: Normal) -> Self::Output {
        Self::new(self.0 + rhs.0)
    }
}
impl Sub<Normal> for Normal {
    type Output = Normal;
    fn sub(self, rhs: Normal) -> Self::Output {
        Self::new(self.0 - rhs.0)
    }
}
impl Add<f64> for Normal {
    type Output = Normal;
    fn add(self, rhs: f64) -> Self::Output {
        Self::new(self.0 + rhs)
    }
}
impl PartialEq<f64> for Normal {
    fn eq(&self, other: &f64) -> bool {
        self.0.eq(other)
    }
}
impl PartialOrd<f64> for Normal {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}

/// A float constrained to the range [-1.0, 1.0], clamped at construction.
///
/// Used for detented bipolar knobs such as rotation speed, where the center
/// of the knob's travel means zero.
#[derive(Display, Debug, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BipolarNormal(f64);
impl BipolarNormal {
    #[allow(missing_docs)]
    pub const ZERO: Self = Self(0.0);

    /// Creates a new [BipolarNormal], clamping out-of-range values.
    pub fn new(value: f64) -> Self {
        Self(value.clamp(-1.0, 1.0))
    }

    /// The inner value.
    pub fn val(&self) -> f64 {
        self.0
    }

    /// The absolute value as a [Normal].
    pub fn abs(&self) -> Normal {
        Normal::new(self.0.abs())
    }
}
impl Default for BipolarNormal {
    fn default() -> Self {
        Self::ZERO
    }
}
impl From<BipolarNormal> for f64 {
    fn from(value: BipolarNormal) -> Self {
        value.0
    }
}
impl Mul<Normal> for BipolarNormal {
    type Output = BipolarNormal;
    fn mul(self, rhs: Normal) -> Self::Output {
        Self(self.0 * rhs.val())
    }
}
impl PartialEq<f64> for BipolarNormal {
    fn eq(&self, other: &f64) -> bool {
        self.0.eq(other)
    }
}
impl PartialOrd<f64> for BipolarNormal {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}

/// A unit angular phase on [0.0, 1.0).
///
/// All periodic quantities in the system -- angles, positions within a wave
/// cycle -- are expressed in this radial unit rather than radians or degrees.
/// [Phase] upholds the range invariant by wrapping with euclidean modulus, so
/// arithmetic on phases never needs an explicit `% 1.0`.
#[derive(Display, Debug, Default, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Phase(f64);
impl Phase {
    #[allow(missing_docs)]
    pub const ZERO: Self = Self(0.0);

    /// Creates a new [Phase], wrapping into [0.0, 1.0).
    pub fn new(value: f64) -> Self {
        Self(value.rem_euclid(1.0))
    }

    /// The inner value.
    pub fn val(&self) -> f64 {
        self.0
    }
}
impl Add<Phase> for Phase {
    type Output = Phase;
    fn add(self, rhs: Phase) -> Self::Output {
        Self::new(self.0 + rhs.0)
    }
}
impl Add<f64> for Phase {
    type Output = Phase;
    fn add(self, rhs: f64) -> Self::Output {
        Self::new(self.0 + rhs)
    }
}
impl AddAssign<f64> for Phase {
    fn add_assign(&mut self, rhs: f64) {
        *self = *self + rhs;
    }
}
impl Mul<f64> for Phase {
    type Output = Phase;
    fn mul(self, rhs: f64) -> Self::Output {
        Self::new(self.0 * rhs)
    }
}
impl PartialEq<f64> for Phase {
    fn eq(&self, other: &f64) -> bool {
        self.0.eq(other)
    }
}
impl PartialOrd<f64> for Phase {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}
impl PartialOrd<Normal> for Phase {
    fn partial_cmp(&self, other: &Normal) -> Option<Ordering> {
        self.0.partial_cmp(&other.val())
    }
}
impl PartialEq<Normal> for Phase {
    fn eq(&self, other: &Normal) -> bool {
        self.0.eq(&other.val())
    }
}

/// Milliseconds since an arbitrary epoch, normally show start.
///
/// Signed so that subtracting two timestamps is always well-defined. Clients
/// use deltas only; the absolute origin carries no meaning on the wire.
#[derive(
    Display,
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct Timestamp(pub i64);
impl Timestamp {
    /// The elapsed time since `start`, as a [Timestamp].
    pub fn since(start: Instant) -> Self {
        Self::from_duration(start.elapsed())
    }

    #[allow(missing_docs)]
    pub fn from_duration(d: Duration) -> Self {
        Self(d.as_millis() as i64)
    }
}
impl Sub<Timestamp> for Timestamp {
    type Output = Timestamp;
    fn sub(self, rhs: Timestamp) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_clamps() {
        assert_eq!(Normal::new(1.5), 1.0);
        assert_eq!(Normal::new(-0.5), 0.0);
        assert_eq!(Normal::new(0.25).val(), 0.25);
        assert_eq!(Normal::new(0.75) + Normal::new(0.75), 1.0);
    }

    #[test]
    fn bipolar_clamps() {
        assert_eq!(BipolarNormal::new(2.0), 1.0);
        assert_eq!(BipolarNormal::new(-2.0), -1.0);
        assert_eq!(BipolarNormal::new(-0.5).abs(), 0.5);
    }

    #[test]
    fn phase_wraps() {
        assert_eq!(Phase::new(1.25), 0.25);
        assert_eq!(Phase::new(-0.25), 0.75);
        assert_eq!(Phase::new(1.0), 0.0);
        let mut p = Phase::new(0.9);
        p += 0.2;
        assert!((p.val() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn timestamp_deltas() {
        let a = Timestamp(1500);
        let b = Timestamp(1000);
        assert_eq!(a - b, Timestamp(500));
        assert_eq!(Timestamp::from_duration(Duration::from_millis(17)).0, 17);
    }
}
