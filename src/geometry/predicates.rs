//! Exact-sign geometric predicates over parametric coordinates.
//!
//! Every topological decision of the mesher goes through [`orientation`] and
//! [`in_circle`]. Both are total and deterministic, and they return the
//! degenerate answer only for exactly collinear (resp. cocircular) input. The
//! numerical work lives in [`crate::geometry::robust_predicates`].

use crate::geometry::point::Point2;
use crate::geometry::robust_predicates::{incircle, orient2d};

/// Position of a point relative to the circle through three others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InCircle {
    /// The point is outside the circumcircle
    OUTSIDE,
    /// The point lies exactly on the circumcircle
    BOUNDARY,
    /// The point is inside the circumcircle
    INSIDE,
}

impl std::fmt::Display for InCircle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OUTSIDE => write!(f, "OUTSIDE"),
            Self::BOUNDARY => write!(f, "BOUNDARY"),
            Self::INSIDE => write!(f, "INSIDE"),
        }
    }
}

/// Represents the orientation of a triangle in the parameter plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Clockwise (determinant < 0)
    NEGATIVE,
    /// Collinear (determinant exactly 0)
    DEGENERATE,
    /// Counter-clockwise (determinant > 0)
    POSITIVE,
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NEGATIVE => write!(f, "NEGATIVE"),
            Self::DEGENERATE => write!(f, "DEGENERATE"),
            Self::POSITIVE => write!(f, "POSITIVE"),
        }
    }
}

impl Orientation {
    /// Classifies the sign of a determinant.
    #[must_use]
    pub fn from_determinant(det: f64) -> Self {
        if det > 0.0 {
            Self::POSITIVE
        } else if det < 0.0 {
            Self::NEGATIVE
        } else {
            Self::DEGENERATE
        }
    }

    /// Returns `true` for counter-clockwise triangles.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        matches!(self, Self::POSITIVE)
    }

    /// Orientation of the same points listed in reverse order.
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::NEGATIVE => Self::POSITIVE,
            Self::DEGENERATE => Self::DEGENERATE,
            Self::POSITIVE => Self::NEGATIVE,
        }
    }
}

/// Orientation of the triangle `(a, b, c)`.
///
/// # Arguments
///
/// * `a`, `b`, `c` - Vertices of the triangle, in order
///
/// # Returns
///
/// `POSITIVE` when `c` lies to the left of the directed line `a -> b`,
/// `NEGATIVE` when it lies to the right and `DEGENERATE` only when the three
/// points are exactly collinear.
///
/// # Example
///
/// ```
/// use patchmesh::geometry::point::Point2;
/// use patchmesh::geometry::predicates::{orientation, Orientation};
///
/// let a = Point2::new(0.0, 0.0);
/// let b = Point2::new(1.0, 0.0);
/// assert_eq!(orientation(&a, &b, &Point2::new(0.3, 1e-300)), Orientation::POSITIVE);
/// assert_eq!(orientation(&a, &b, &Point2::new(7.0, 0.0)), Orientation::DEGENERATE);
/// ```
#[inline]
#[must_use]
pub fn orientation(a: &Point2, b: &Point2, c: &Point2) -> Orientation {
    Orientation::from_determinant(orient2d(a, b, c))
}

/// Position of `d` relative to the circle through `a`, `b`, `c`.
///
/// `a`, `b`, `c` must be in counter-clockwise order; for clockwise input the
/// `INSIDE` and `OUTSIDE` answers swap.
///
/// # Example
///
/// ```
/// use patchmesh::geometry::point::Point2;
/// use patchmesh::geometry::predicates::{in_circle, InCircle};
///
/// let a = Point2::new(0.0, 0.0);
/// let b = Point2::new(1.0, 0.0);
/// let c = Point2::new(1.0, 1.0);
/// assert_eq!(in_circle(&a, &b, &c, &Point2::new(0.0, 1.0)), InCircle::BOUNDARY);
/// assert_eq!(in_circle(&a, &b, &c, &Point2::new(0.5, 0.5)), InCircle::INSIDE);
/// ```
#[inline]
#[must_use]
pub fn in_circle(a: &Point2, b: &Point2, c: &Point2, d: &Point2) -> InCircle {
    let det = incircle(a, b, c, d);
    if det > 0.0 {
        InCircle::INSIDE
    } else if det < 0.0 {
        InCircle::OUTSIDE
    } else {
        InCircle::BOUNDARY
    }
}

/// Returns `true` if the segments `p1-p2` and `q1-q2` cross at a single
/// point interior to both.
#[must_use]
pub fn segments_cross(p1: &Point2, p2: &Point2, q1: &Point2, q2: &Point2) -> bool {
    let o1 = orient2d(p1, p2, q1);
    let o2 = orient2d(p1, p2, q2);
    let o3 = orient2d(q1, q2, p1);
    let o4 = orient2d(q1, q2, p2);
    ((o1 > 0.0 && o2 < 0.0) || (o1 < 0.0 && o2 > 0.0))
        && ((o3 > 0.0 && o4 < 0.0) || (o3 < 0.0 && o4 > 0.0))
}
