//! Surface evaluation interface.
//!
//! The mesher only sees a face through [`GeometryProvider`]: positions,
//! normals and curvature at parametric locations, plus 3D positions along
//! boundary curves. [`Plane`] and [`Cylinder`] are analytic implementations
//! used for testing and for flat or revolved patches.

use serde::{Deserialize, Serialize};

use crate::geometry::point::{Point2, Point3, Vector3};

/// Step of the central differences used by [`GeometryProvider::derivatives`].
pub const DERIVATIVE_STEP: f64 = 1.0e-6;

/// Principal curvatures and directions at a surface point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Curvature {
    /// Smallest principal curvature.
    pub min: f64,
    /// Largest principal curvature.
    pub max: f64,
    /// 3D direction of `min`.
    pub dir_min: Vector3,
    /// 3D direction of `max`.
    pub dir_max: Vector3,
}

impl Curvature {
    /// Curvature of a flat surface.
    #[must_use]
    pub fn flat() -> Self {
        Self {
            min: 0.0,
            max: 0.0,
            dir_min: Vector3::x(),
            dir_max: Vector3::y(),
        }
    }
}

/// Evaluator of a parametric surface and its boundary curves.
///
/// Implementations must be pure: the same arguments always give the same
/// answer and evaluation has no side effects.
pub trait GeometryProvider {
    /// 3D position at `uv`.
    fn value(&self, uv: Point2) -> Point3;

    /// Unit normal at `uv`.
    fn normal(&self, uv: Point2) -> Vector3;

    /// Principal curvatures at `uv`.
    fn curvature(&self, uv: Point2) -> Curvature;

    /// 3D position on boundary curve `curve` at arc-length `param`, when the
    /// curve is known to the provider.
    fn curve_value_3d(&self, curve: u32, param: f64) -> Option<Point3> {
        let _ = (curve, param);
        None
    }

    /// First derivatives `(∂S/∂u, ∂S/∂v)` at `uv`.
    fn derivatives(&self, uv: Point2) -> (Vector3, Vector3) {
        let h = DERIVATIVE_STEP;
        let du = (self.value(Point2::new(uv.u + h, uv.v)) - self.value(Point2::new(uv.u - h, uv.v))) / (2.0 * h);
        let dv = (self.value(Point2::new(uv.u, uv.v + h)) - self.value(Point2::new(uv.u, uv.v - h))) / (2.0 * h);
        (du, dv)
    }
}

// =============================================================================
// ANALYTIC SURFACES
// =============================================================================

/// Affine plane `origin + u * x_axis + v * y_axis`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    origin: Point3,
    x_axis: Vector3,
    y_axis: Vector3,
}

impl Plane {
    /// Plane through `origin` spanned by two independent axes.
    #[must_use]
    pub const fn new(origin: Point3, x_axis: Vector3, y_axis: Vector3) -> Self {
        Self { origin, x_axis, y_axis }
    }

    /// The `z = 0` plane with `(u, v) = (x, y)`.
    #[must_use]
    pub fn xy() -> Self {
        Self::new(Point3::origin(), Vector3::x(), Vector3::y())
    }
}

impl GeometryProvider for Plane {
    fn value(&self, uv: Point2) -> Point3 {
        self.origin + self.x_axis * uv.u + self.y_axis * uv.v
    }

    fn normal(&self, _uv: Point2) -> Vector3 {
        self.x_axis.cross(&self.y_axis).normalize()
    }

    fn curvature(&self, _uv: Point2) -> Curvature {
        Curvature::flat()
    }

    fn derivatives(&self, _uv: Point2) -> (Vector3, Vector3) {
        (self.x_axis, self.y_axis)
    }
}

/// Circular cylinder around the z axis, parameterized by angle `u` and
/// height `v`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cylinder {
    radius: f64,
}

impl Cylinder {
    /// Cylinder of the given radius.
    #[must_use]
    pub const fn new(radius: f64) -> Self {
        Self { radius }
    }

    /// Radius of the cylinder.
    #[must_use]
    pub const fn radius(&self) -> f64 {
        self.radius
    }
}

impl GeometryProvider for Cylinder {
    fn value(&self, uv: Point2) -> Point3 {
        let (s, c) = uv.u.sin_cos();
        Point3::new(self.radius * c, self.radius * s, uv.v)
    }

    fn normal(&self, uv: Point2) -> Vector3 {
        let (s, c) = uv.u.sin_cos();
        Vector3::new(c, s, 0.0)
    }

    fn curvature(&self, uv: Point2) -> Curvature {
        let (s, c) = uv.u.sin_cos();
        Curvature {
            min: 0.0,
            max: 1.0 / self.radius,
            dir_min: Vector3::z(),
            dir_max: Vector3::new(-s, c, 0.0),
        }
    }

    fn derivatives(&self, uv: Point2) -> (Vector3, Vector3) {
        let (s, c) = uv.u.sin_cos();
        (Vector3::new(-self.radius * s, self.radius * c, 0.0), Vector3::z())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Paraboloid;

    impl GeometryProvider for Paraboloid {
        fn value(&self, uv: Point2) -> Point3 {
            Point3::new(uv.u, uv.v, uv.u * uv.u + uv.v * uv.v)
        }
        fn normal(&self, uv: Point2) -> Vector3 {
            Vector3::new(-2.0 * uv.u, -2.0 * uv.v, 1.0).normalize()
        }
        fn curvature(&self, _uv: Point2) -> Curvature {
            Curvature::flat()
        }
    }

    #[test]
    fn test_default_derivatives_use_central_differences() {
        let (du, dv) = Paraboloid.derivatives(Point2::new(0.5, -1.0));
        assert_relative_eq!(du, Vector3::new(1.0, 0.0, 1.0), epsilon = 1e-6);
        assert_relative_eq!(dv, Vector3::new(0.0, 1.0, -2.0), epsilon = 1e-6);
        assert!(Paraboloid.curve_value_3d(0, 0.5).is_none());
    }

    #[test]
    fn test_cylinder_normal_matches_derivatives() {
        let cyl = Cylinder::new(3.0);
        let uv = Point2::new(1.2, 0.4);
        let (du, dv) = cyl.derivatives(uv);
        let n = du.cross(&dv).normalize();
        assert_relative_eq!(n, cyl.normal(uv), epsilon = 1e-12);
        assert_relative_eq!(cyl.value(uv).coords.xy().norm(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_plane_frame() {
        let plane = Plane::new(Point3::new(0.0, 0.0, 1.0), Vector3::x(), Vector3::z());
        assert_relative_eq!(plane.value(Point2::new(2.0, 3.0)), Point3::new(2.0, 0.0, 4.0));
        assert_relative_eq!(plane.normal(Point2::default()), -Vector3::y());
    }
}
