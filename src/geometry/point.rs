//! Parametric (u,v) points and the 3D point types used for surface positions.
//!
//! # Equality Semantics
//!
//! [`Point2`] compares coordinates by their bit patterns after normalizing
//! `-0.0` to `0.0`. Two points are equal only when they denote exactly the same
//! parametric location, which lets them key hash maps when coincident boundary
//! nodes of different wires have to be merged.

#![forbid(unsafe_code)]

use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Position of a vertex on the 3D surface.
pub type Point3 = na::Point3<f64>;

/// Direction or displacement in 3D space.
pub type Vector3 = na::Vector3<f64>;

// =============================================================================
// POINT2 STRUCT DEFINITION
// =============================================================================

/// A point in the parameter plane of a surface.
///
/// # Examples
///
/// ```rust
/// use patchmesh::geometry::point::Point2;
///
/// let a = Point2::new(0.0, 0.0);
/// let b = Point2::new(2.0, 4.0);
/// assert_eq!(a.midpoint(&b), Point2::new(1.0, 2.0));
/// ```
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Point2 {
    /// First parametric coordinate.
    pub u: f64,
    /// Second parametric coordinate.
    pub v: f64,
}

impl Point2 {
    /// Creates a point from its two parametric coordinates.
    #[must_use]
    pub const fn new(u: f64, v: f64) -> Self {
        Self { u, v }
    }

    /// Coordinates as an array `[u, v]`.
    #[must_use]
    pub const fn coords(&self) -> [f64; 2] {
        [self.u, self.v]
    }

    /// Displacement `other - self`.
    #[must_use]
    pub fn to(&self, other: &Self) -> [f64; 2] {
        [other.u - self.u, other.v - self.v]
    }

    /// Point halfway between `self` and `other`.
    #[must_use]
    pub fn midpoint(&self, other: &Self) -> Self {
        Self::new(0.5 * (self.u + other.u), 0.5 * (self.v + other.v))
    }

    /// Linear interpolation, `t = 0` gives `self` and `t = 1` gives `other`.
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        Self::new(
            (other.u - self.u).mul_add(t, self.u),
            (other.v - self.v).mul_add(t, self.v),
        )
    }

    /// Centroid of three points.
    #[must_use]
    pub fn centroid(a: &Self, b: &Self, c: &Self) -> Self {
        Self::new((a.u + b.u + c.u) / 3.0, (a.v + b.v + c.v) / 3.0)
    }

    /// Euclidean distance in the parameter plane.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        (other.u - self.u).hypot(other.v - self.v)
    }

    /// Returns `true` if both coordinates are finite.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.u.is_finite() && self.v.is_finite()
    }

    fn canonical_bits(&self) -> [u64; 2] {
        // 0.0 and -0.0 must hash identically
        [(self.u + 0.0).to_bits(), (self.v + 0.0).to_bits()]
    }
}

impl PartialEq for Point2 {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_bits() == other.canonical_bits()
    }
}

impl Eq for Point2 {}

impl Hash for Point2 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_bits().hash(state);
    }
}

impl From<[f64; 2]> for Point2 {
    fn from(coords: [f64; 2]) -> Self {
        Self::new(coords[0], coords[1])
    }
}

impl From<Point2> for [f64; 2] {
    fn from(point: Point2) -> Self {
        point.coords()
    }
}

impl fmt::Display for Point2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.u, self.v)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::core::collections::FastHashSet;

    #[test]
    fn test_point2_signed_zero_equality_and_hash() {
        let mut set: FastHashSet<Point2> = FastHashSet::default();
        set.insert(Point2::new(0.0, 1.0));
        assert!(set.contains(&Point2::new(-0.0, 1.0)));
        assert_eq!(Point2::new(0.0, -0.0), Point2::new(-0.0, 0.0));
        assert_ne!(Point2::new(0.0, 1.0), Point2::new(0.0, 1.0 + f64::EPSILON));
    }

    #[test]
    fn test_point2_interpolation() {
        let a = Point2::new(1.0, -1.0);
        let b = Point2::new(3.0, 5.0);
        let q = a.lerp(&b, 0.25);
        assert_relative_eq!(q.u, 1.5);
        assert_relative_eq!(q.v, 0.5);
        assert_relative_eq!(a.distance(&b), 40.0_f64.sqrt());
        let c = Point2::centroid(&a, &b, &Point2::new(2.0, 2.0));
        assert_relative_eq!(c.u, 2.0);
        assert_relative_eq!(c.v, 2.0);
    }

    #[test]
    fn test_point2_conversions() {
        let p: Point2 = [0.5, 0.25].into();
        let arr: [f64; 2] = p.into();
        assert_eq!(arr, [0.5, 0.25]);
        assert_eq!(format!("{p}"), "(0.5, 0.25)");
        assert!(!Point2::new(f64::NAN, 0.0).is_finite());
    }
}
