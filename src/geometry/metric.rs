//! Riemannian metrics of the parameter plane.
//!
//! A [`Metric2D`] is a symmetric positive-definite tensor `[[e, f], [f, g]]`
//! measuring `|pq|² = (q-p)ᵀ M (q-p)`. Meshing algorithms query a
//! [`MetricField`] for the tensor at a location; vertices cache the tensor of
//! their own position. Distances between two vertices whose tensors differ are
//! measured under both and the larger value is taken, refined by subdivision
//! when the two disagree strongly.

use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::geometry::point::{Point2, Vector3};
use crate::geometry::predicates::{InCircle, in_circle};
use crate::geometry::robust_predicates::PredicateConstants;
use crate::geometry::surface::GeometryProvider;

/// Relative tolerance under which a tensor is treated as a scaled identity.
pub const PSEUDO_ISOTROPIC_EPSILON: f64 = 0.001;

/// Maximum recursion depth of [`metric_distance`].
pub const MAX_DISTANCE_SUBDIVISION: u32 = 10;

/// Relative length mismatch that triggers subdivision in [`metric_distance`].
pub const DISTANCE_MISMATCH_RATIO: f64 = 0.5;

/// Symmetric positive-definite 2x2 tensor.
///
/// # Examples
///
/// ```rust
/// use patchmesh::geometry::metric::Metric2D;
/// use patchmesh::geometry::point::Point2;
///
/// // Target edge length 0.5 everywhere
/// let m = Metric2D::isotropic(0.5);
/// let d = m.length(&Point2::new(0.0, 0.0), &Point2::new(1.0, 0.0));
/// assert!((d - 2.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metric2D {
    /// `M[0][0]`
    pub e: f64,
    /// `M[0][1] == M[1][0]`
    pub f: f64,
    /// `M[1][1]`
    pub g: f64,
}

impl Default for Metric2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Metric2D {
    /// Creates a tensor from its three independent coefficients.
    #[must_use]
    pub const fn new(e: f64, f: f64, g: f64) -> Self {
        Self { e, f, g }
    }

    /// The Euclidean metric of the parameter plane.
    #[must_use]
    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 1.0)
    }

    /// Isotropic metric whose unit length is `h` parametric units.
    #[must_use]
    pub fn isotropic(h: f64) -> Self {
        let c = 1.0 / (h * h);
        Self::new(c, 0.0, c)
    }

    /// Metric measuring lengths in multiples of `size` target lengths.
    #[must_use]
    pub fn scaled(&self, size: f64) -> Self {
        let c = 1.0 / (size * size);
        Self::new(self.e * c, self.f * c, self.g * c)
    }

    /// Determinant `eg - f²`.
    #[must_use]
    pub fn det(&self) -> f64 {
        self.e.mul_add(self.g, -(self.f * self.f))
    }

    /// Returns `true` if the tensor is finite and positive definite.
    #[must_use]
    pub fn is_positive_definite(&self) -> bool {
        self.e.is_finite() && self.f.is_finite() && self.g.is_finite() && self.e > 0.0 && self.det() > 0.0
    }

    /// Inverse tensor, `None` when singular.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        let det = self.det();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        Some(Self::new(self.g / det, -self.f / det, self.e / det))
    }

    /// Bilinear form `xᵀ M y`.
    #[must_use]
    pub fn dot(&self, x: [f64; 2], y: [f64; 2]) -> f64 {
        self.e * x[0] * y[0] + self.f * (x[0] * y[1] + x[1] * y[0]) + self.g * x[1] * y[1]
    }

    /// Squared length of the segment `pq`.
    #[must_use]
    pub fn length2(&self, p: &Point2, q: &Point2) -> f64 {
        let d = p.to(q);
        self.dot(d, d)
    }

    /// Length of the segment `pq`.
    #[must_use]
    pub fn length(&self, p: &Point2, q: &Point2) -> f64 {
        self.length2(p, q).sqrt()
    }

    /// Vector `M`-orthogonal to `x`, with `|orth(x)|²_M = det(M) |x|²_M`.
    #[must_use]
    pub fn orth(&self, x: [f64; 2]) -> [f64; 2] {
        [
            -self.f * x[0] - self.g * x[1],
            self.e * x[0] + self.f * x[1],
        ]
    }

    /// Returns `true` when the tensor is a scaled identity up to
    /// [`PSEUDO_ISOTROPIC_EPSILON`].
    #[must_use]
    pub fn is_pseudo_isotropic(&self) -> bool {
        self.e > 0.0
            && self.f.abs() < PSEUDO_ISOTROPIC_EPSILON * self.e
            && (self.e - self.g).abs() < PSEUDO_ISOTROPIC_EPSILON * self.e
    }

    /// Half-widths `(du, dv)` of the axis-aligned box enclosing the unit ball.
    #[must_use]
    pub fn unit_ball_bbox(&self) -> [f64; 2] {
        let det = self.det();
        if det < 1.0e-20 {
            let min_eigen = self.eigenvalues()[0].max(f64::MIN_POSITIVE);
            let r = 1.0 / min_eigen.sqrt();
            return [r, r];
        }
        [(self.g / det).sqrt(), (self.e / det).sqrt()]
    }

    /// Eigenvalues in increasing order.
    #[must_use]
    pub fn eigenvalues(&self) -> [f64; 2] {
        let eigen = na::SymmetricEigen::new(self.to_matrix());
        let (a, b) = (eigen.eigenvalues[0], eigen.eigenvalues[1]);
        if a <= b { [a, b] } else { [b, a] }
    }

    /// Dense `nalgebra` representation.
    #[must_use]
    pub fn to_matrix(&self) -> na::Matrix2<f64> {
        na::Matrix2::new(self.e, self.f, self.f, self.g)
    }

    /// Builds a tensor from the symmetric part of `m`.
    #[must_use]
    pub fn from_matrix(m: &na::Matrix2<f64>) -> Self {
        Self::new(m[(0, 0)], 0.5 * (m[(0, 1)] + m[(1, 0)]), m[(1, 1)])
    }

    /// Interpolated metric `inv((inv(a) + inv(b)) / 2)`.
    ///
    /// Falls back to the arithmetic mean when either tensor is singular.
    #[must_use]
    pub fn interpolate(a: &Self, b: &Self) -> Self {
        if a == b {
            return *a;
        }
        let mean_inverse = match (a.inverse(), b.inverse()) {
            (Some(ia), Some(ib)) => Self::new(
                0.5 * (ia.e + ib.e),
                0.5 * (ia.f + ib.f),
                0.5 * (ia.g + ib.g),
            ),
            _ => return Self::new(0.5 * (a.e + b.e), 0.5 * (a.f + b.f), 0.5 * (a.g + b.g)),
        };
        mean_inverse
            .inverse()
            .unwrap_or_else(|| Self::new(0.5 * (a.e + b.e), 0.5 * (a.f + b.f), 0.5 * (a.g + b.g)))
    }

    /// Circumcenter of `(p1, p2, p3)` under this metric.
    ///
    /// Returns `None` for flat triangles where the center would lie more than
    /// a thousand edge lengths away.
    #[must_use]
    pub fn circumcenter(&self, p1: &Point2, p2: &Point2, p3: &Point2) -> Option<Point2> {
        let v12 = p1.to(p2);
        let v23 = p2.to(p3);
        let v31 = p3.to(p1);
        let num = self.dot(v23, v31);
        let po = self.orth(v12);
        let den = 2.0 * self.dot(po, v31);
        if den == 0.0 || num * num * self.det() >= 1.0e6 * den * den {
            return None;
        }
        let mid = p1.midpoint(p2);
        Some(Point2::new(
            po[0].mul_add(num / den, mid.u),
            po[1].mul_add(num / den, mid.v),
        ))
    }
}

/// Position of `d` relative to the circle through counter-clockwise `a, b, c`
/// measured under a constant `metric`.
///
/// Pseudo-isotropic metrics use the exact [`in_circle`] predicate. Otherwise
/// the lifted determinant is evaluated with the quadratic form of the metric
/// and any result within its rounding-error bound is reported as `BOUNDARY`.
#[must_use]
pub fn metric_in_circle(a: &Point2, b: &Point2, c: &Point2, d: &Point2, metric: &Metric2D) -> InCircle {
    if metric.is_pseudo_isotropic() {
        return in_circle(a, b, c, d);
    }
    let ad = d.to(a);
    let bd = d.to(b);
    let cd = d.to(c);
    let a_lift = metric.dot(ad, ad);
    let b_lift = metric.dot(bd, bd);
    let c_lift = metric.dot(cd, cd);

    let bc = bd[0] * cd[1] - cd[0] * bd[1];
    let ca = cd[0] * ad[1] - ad[0] * cd[1];
    let ab = ad[0] * bd[1] - bd[0] * ad[1];
    let det = a_lift * bc + b_lift * ca + c_lift * ab;

    let permanent = a_lift.abs() * ((bd[0] * cd[1]).abs() + (cd[0] * bd[1]).abs())
        + b_lift.abs() * ((cd[0] * ad[1]).abs() + (ad[0] * cd[1]).abs())
        + c_lift.abs() * ((ad[0] * bd[1]).abs() + (bd[0] * ad[1]).abs());
    let bound = 32.0 * PredicateConstants::get().epsilon * permanent;
    if det > bound {
        InCircle::INSIDE
    } else if det < -bound {
        InCircle::OUTSIDE
    } else {
        InCircle::BOUNDARY
    }
}

/// Edge length as the larger of the lengths under both endpoint metrics.
#[must_use]
pub fn edge_length(p: &Point2, mp: &Metric2D, q: &Point2, mq: &Metric2D) -> f64 {
    mp.length(p, q).max(mq.length(p, q))
}

/// Source of metric tensors over the parameter plane.
pub trait MetricField {
    /// Tensor at `uv`.
    fn metric(&self, uv: Point2) -> Metric2D;
}

/// Distance between `p` and `q` under a metric field.
///
/// When the lengths under the two endpoint tensors differ by more than
/// [`DISTANCE_MISMATCH_RATIO`] of the larger one, the segment is split at its
/// midpoint and both halves are measured recursively, up to
/// [`MAX_DISTANCE_SUBDIVISION`] levels.
pub fn metric_distance<F>(field: &F, p: &Point2, mp: &Metric2D, q: &Point2, mq: &Metric2D) -> f64
where
    F: MetricField + ?Sized,
{
    subdivided_distance(field, p, mp, q, mq, MAX_DISTANCE_SUBDIVISION)
}

fn subdivided_distance<F>(field: &F, p: &Point2, mp: &Metric2D, q: &Point2, mq: &Metric2D, depth: u32) -> f64
where
    F: MetricField + ?Sized,
{
    let lp = mp.length(p, q);
    let lq = mq.length(p, q);
    let lmax = lp.max(lq);
    if depth == 0 || (lp - lq).abs() < DISTANCE_MISMATCH_RATIO * lmax {
        return lmax;
    }
    let mid = p.midpoint(q);
    let mm = field.metric(mid);
    subdivided_distance(field, p, mp, &mid, &mm, depth - 1)
        + subdivided_distance(field, &mid, &mm, q, mq, depth - 1)
}

// =============================================================================
// METRIC FIELDS
// =============================================================================

/// Constant metric over the whole parameter plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EuclideanMetricField {
    metric: Metric2D,
}

impl EuclideanMetricField {
    /// Field returning `metric` everywhere.
    #[must_use]
    pub const fn new(metric: Metric2D) -> Self {
        Self { metric }
    }

    /// Isotropic field with target length `h`.
    #[must_use]
    pub fn with_length(h: f64) -> Self {
        Self::new(Metric2D::isotropic(h))
    }
}

impl MetricField for EuclideanMetricField {
    fn metric(&self, _uv: Point2) -> Metric2D {
        self.metric
    }
}

/// Metric induced by a target 3D edge length and an optional chordal
/// deflection tolerance on a parametric surface.
///
/// The isotropic 3D tensor `Id/h²` is refined along each principal curvature
/// direction so that a chord of unit metric length deviates from the surface
/// by at most the deflection, then restricted to the tangent plane through
/// the first derivatives of the parameterization.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceMetricField<'a, G: GeometryProvider + ?Sized> {
    surface: &'a G,
    length: f64,
    deflection: Option<f64>,
    relative_deflection: bool,
}

impl<'a, G: GeometryProvider + ?Sized> SurfaceMetricField<'a, G> {
    /// Field with target 3D length `length` and no curvature refinement.
    #[must_use]
    pub const fn new(surface: &'a G, length: f64) -> Self {
        Self {
            surface,
            length,
            deflection: None,
            relative_deflection: false,
        }
    }

    /// Enables curvature refinement; `relative` interprets `deflection` as a
    /// fraction of the local radius of curvature.
    #[must_use]
    pub const fn with_deflection(mut self, deflection: f64, relative: bool) -> Self {
        self.deflection = Some(deflection);
        self.relative_deflection = relative;
        self
    }

    /// Chord length whose sagitta on a circle of curvature `kappa` equals the
    /// deflection, capped by the target length.
    fn curvature_length(&self, kappa: f64, deflection: f64) -> f64 {
        if kappa.abs() < 1.0e-12 {
            return self.length;
        }
        let radius = 1.0 / kappa.abs();
        let sagitta = if self.relative_deflection {
            deflection * radius
        } else {
            deflection
        }
        .min(radius);
        (2.0 * (sagitta * (2.0 * radius - sagitta)).sqrt()).min(self.length)
    }
}

impl<G: GeometryProvider + ?Sized> MetricField for SurfaceMetricField<'_, G> {
    fn metric(&self, uv: Point2) -> Metric2D {
        let inv_h2 = 1.0 / (self.length * self.length);
        let mut m3 = na::Matrix3::<f64>::identity() * inv_h2;
        if let Some(deflection) = self.deflection {
            let curvature = self.surface.curvature(uv);
            for (kappa, direction) in [
                (curvature.min, curvature.dir_min),
                (curvature.max, curvature.dir_max),
            ] {
                let Some(dir) = direction.try_normalize(1.0e-12) else {
                    continue;
                };
                let l = self.curvature_length(kappa, deflection);
                let coef = 1.0 / (l * l);
                if coef > inv_h2 {
                    m3 += (dir * dir.transpose()) * (coef - inv_h2);
                }
            }
        }
        let (du, dv): (Vector3, Vector3) = self.surface.derivatives(uv);
        let jacobian = na::Matrix3x2::from_columns(&[du, dv]);
        let m2 = jacobian.transpose() * m3 * jacobian;
        let metric = Metric2D::from_matrix(&m2);
        if metric.is_positive_definite() {
            metric
        } else {
            tracing::debug!("[metric] degenerate surface metric at {uv}, using isotropic fallback");
            Metric2D::isotropic(self.length)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::surface::{Cylinder, Plane};
    use approx::assert_relative_eq;

    #[test]
    fn test_metric_inverse_and_interpolation() {
        let a = Metric2D::new(4.0, 1.0, 2.0);
        let inv = a.inverse().unwrap();
        let product = a.to_matrix() * inv.to_matrix();
        assert_relative_eq!(product, na::Matrix2::identity(), epsilon = 1e-12);

        let b = Metric2D::isotropic(0.5);
        let c = Metric2D::isotropic(1.0);
        let m = Metric2D::interpolate(&b, &c);
        // harmonic mean of 4 and 1 under inverse averaging
        assert_relative_eq!(m.e, 1.6, epsilon = 1e-12);
        assert!(m.is_pseudo_isotropic());
        assert_eq!(Metric2D::interpolate(&a, &a), a);
        assert!(Metric2D::new(1.0, 1.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_metric_orth_is_orthogonal() {
        let m = Metric2D::new(3.0, 0.5, 1.0);
        let x = [0.3, -1.2];
        let o = m.orth(x);
        assert_relative_eq!(m.dot(o, x), 0.0, epsilon = 1e-12);
        assert_relative_eq!(m.dot(o, o), m.det() * m.dot(x, x), epsilon = 1e-12);
    }

    #[test]
    fn test_unit_ball_bbox() {
        let m = Metric2D::new(4.0, 0.0, 1.0);
        let bbox = m.unit_ball_bbox();
        assert_relative_eq!(bbox[0], 0.5);
        assert_relative_eq!(bbox[1], 1.0);
        let eig = m.eigenvalues();
        assert_relative_eq!(eig[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(eig[1], 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_circumcenter_isotropic_and_flat() {
        let m = Metric2D::identity();
        let c = m
            .circumcenter(&Point2::new(0.0, 0.0), &Point2::new(2.0, 0.0), &Point2::new(0.0, 2.0))
            .unwrap();
        assert_relative_eq!(c.u, 1.0, epsilon = 1e-12);
        assert_relative_eq!(c.v, 1.0, epsilon = 1e-12);
        let flat = m.circumcenter(&Point2::new(0.0, 0.0), &Point2::new(1.0, 0.0), &Point2::new(2.0, 0.0));
        assert!(flat.is_none());
    }

    #[test]
    fn test_metric_in_circle_follows_stretch() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(1.0, 0.0);
        let c = Point2::new(0.0, 1.0);
        let d = Point2::new(0.5, -0.3);
        assert_eq!(metric_in_circle(&a, &b, &c, &d, &Metric2D::identity()), InCircle::OUTSIDE);
        // compressing v brings d inside the ellipse through a, b, c
        let squashed = Metric2D::new(1.0, 0.0, 0.01);
        assert_eq!(metric_in_circle(&a, &b, &c, &d, &squashed), InCircle::INSIDE);
    }

    #[test]
    fn test_metric_distance_subdivides_on_mismatch() {
        struct Ramp;
        impl MetricField for Ramp {
            fn metric(&self, uv: Point2) -> Metric2D {
                Metric2D::isotropic(1.0 + uv.u)
            }
        }
        let p = Point2::new(0.0, 0.0);
        let q = Point2::new(4.0, 0.0);
        let mp = Ramp.metric(p);
        let mq = Ramp.metric(q);
        let plain = edge_length(&p, &mp, &q, &mq);
        let refined = metric_distance(&Ramp, &p, &mp, &q, &mq);
        assert_relative_eq!(plain, 4.0);
        // exact integral of 1/(1+u) over [0,4] is ln 5
        assert!(refined < plain);
        assert!(refined > 5.0_f64.ln());
    }

    #[test]
    fn test_surface_metric_on_plane_is_scaled_identity() {
        let plane = Plane::xy();
        let field = SurfaceMetricField::new(&plane, 0.25);
        let m = field.metric(Point2::new(0.3, 0.7));
        assert_relative_eq!(m.e, 16.0, epsilon = 1e-6);
        assert_relative_eq!(m.f, 0.0, epsilon = 1e-6);
        assert_relative_eq!(m.g, 16.0, epsilon = 1e-6);
    }

    #[test]
    fn test_surface_metric_on_cylinder_refines_with_deflection() {
        let cylinder = Cylinder::new(2.0);
        let coarse = SurfaceMetricField::new(&cylinder, 1.0);
        let m = coarse.metric(Point2::new(0.5, 0.0));
        // d/dtheta has length 2, d/dz has length 1
        assert_relative_eq!(m.e, 4.0, epsilon = 1e-5);
        assert_relative_eq!(m.g, 1.0, epsilon = 1e-5);

        let fine = SurfaceMetricField::new(&cylinder, 1.0).with_deflection(0.01, false);
        let mf = fine.metric(Point2::new(0.5, 0.0));
        assert!(mf.e > m.e * 2.0);
        assert_relative_eq!(mf.g, 1.0, epsilon = 1e-5);
    }
}
