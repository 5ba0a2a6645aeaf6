//! Refinement of triangles that stray too far from the surface.
//!
//! The deviation of a triangle is measured at its parametric centroid: the
//! distance from the surface point there to the plane through the three
//! corner positions. Triangles above the tolerance are split at the centroid
//! and the Delaunay criterion is restored around the new vertex.

use serde::{Deserialize, Serialize};

use crate::core::algorithms::flips::check_and_swap;
use crate::core::half_edge::HalfEdge;
use crate::core::mesh::{Mesh, MeshError};
use crate::core::triangle::{EdgeAttributes, TriangleKey};
use crate::core::vertex::{Vertex, VertexKey};
use crate::geometry::metric::Metric2D;
use crate::geometry::point::{Point2, Point3};
use crate::geometry::surface::GeometryProvider;

/// Chordal tolerance of a [`DeflectionEnforcer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeflectionConfig {
    /// Largest allowed distance between a triangle and the surface.
    pub tolerance: f64,
    /// Scale the tolerance by the longest 3D edge of each triangle.
    pub relative: bool,
}

/// Outcome of a [`DeflectionEnforcer`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeflectionStats {
    /// Refinement rounds run.
    pub rounds: usize,
    /// Triangles found above the tolerance, summed over rounds.
    pub flagged: usize,
    /// Centroids inserted.
    pub inserted: usize,
    /// Splits refused because the centroid was not strictly inside.
    pub failed_splits: usize,
    /// `true` if the last round flagged nothing.
    pub converged: bool,
}

/// Distance from the surface point at the centroid of `corners` to the plane
/// through their 3D positions, together with the longest 3D edge.
fn centroid_deviation<G: GeometryProvider + ?Sized>(surface: &G, corners: [&Vertex; 3]) -> (f64, f64) {
    let [p0, p1, p2] = corners.map(Vertex::position);
    let centroid = Point2::centroid(corners[0].uv(), corners[1].uv(), corners[2].uv());
    let normal = (p1 - p0).cross(&(p2 - p0));
    let longest = [(p1 - p0).norm(), (p2 - p1).norm(), (p0 - p2).norm()]
        .into_iter()
        .fold(0.0_f64, f64::max);
    let norm = normal.norm();
    if norm <= 0.0 {
        return (0.0, longest);
    }
    let on_surface: Point3 = surface.value(centroid);
    ((on_surface - p0).dot(&normal).abs() / norm, longest)
}

/// Pass splitting triangles whose centroid deviates from the surface.
///
/// # Examples
///
/// ```rust
/// use patchmesh::core::algorithms::boundary_triangulation::{BoundaryConfig, BoundaryTriangulator};
/// use patchmesh::core::algorithms::deflection::{DeflectionConfig, DeflectionEnforcer};
/// use patchmesh::core::boundary::BoundaryLoop;
/// use patchmesh::geometry::surface::Plane;
///
/// let plane = Plane::xy();
/// let wire = BoundaryLoop::from_uv(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
/// let (mut mesh, _) = BoundaryTriangulator::new(&plane, BoundaryConfig::default())
///     .triangulate(&[wire])
///     .unwrap();
///
/// let config = DeflectionConfig { tolerance: 1e-3, relative: false };
/// let stats = DeflectionEnforcer::new(&plane, config).run(&mut mesh).unwrap();
/// assert_eq!(stats.inserted, 0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DeflectionEnforcer<'a, G: GeometryProvider + ?Sized> {
    surface: &'a G,
    config: DeflectionConfig,
}

impl<'a, G: GeometryProvider + ?Sized> DeflectionEnforcer<'a, G> {
    /// Creates the pass measuring deflection against `surface`.
    #[must_use]
    pub const fn new(surface: &'a G, config: DeflectionConfig) -> Self {
        Self { surface, config }
    }

    /// Splits deviating triangles until none is left or the round cap
    /// (the initial triangle count) runs out.
    ///
    /// # Errors
    ///
    /// Fails only on a structurally broken mesh.
    pub fn run(&self, mesh: &mut Mesh) -> Result<DeflectionStats, MeshError> {
        let mut stats = DeflectionStats::default();
        let mut remaining = mesh.triangle_count();
        while remaining > 0 {
            remaining -= 1;
            stats.rounds += 1;
            let queue = self.flagged(mesh)?;
            stats.flagged += queue.len();
            let mut redo = false;
            for (t, corners) in queue {
                let still_there = mesh
                    .triangle(t)
                    .is_ok_and(|tri| *tri.vertices() == corners);
                if !still_there {
                    continue;
                }
                let uv = Point2::centroid(&mesh.uv(corners[0])?, &mesh.uv(corners[1])?, &mesh.uv(corners[2])?);
                let mut vertex = Vertex::new(uv, self.surface.value(uv));
                let [m0, m1, m2] = [mesh.metric(corners[0])?, mesh.metric(corners[1])?, mesh.metric(corners[2])?];
                vertex.metric = Metric2D::interpolate(&m0, &Metric2D::interpolate(&m1, &m2));
                let v = mesh.add_vertex(vertex);
                match mesh.split3(t, v) {
                    Ok(_) => {
                        check_and_swap(mesh, v)?;
                        stats.inserted += 1;
                        redo = true;
                    }
                    Err(MeshError::PointNotInside { .. }) => {
                        mesh.remove_unlinked_vertex(v);
                        stats.failed_splits += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
            tracing::debug!("[deflection] round={} inserted={}", stats.rounds, stats.inserted);
            if !redo {
                stats.converged = true;
                break;
            }
        }
        if !stats.converged {
            tracing::warn!("[deflection] gave up after {} rounds", stats.rounds);
        }
        Ok(stats)
    }

    fn flagged(&self, mesh: &Mesh) -> Result<Vec<(TriangleKey, [VertexKey; 3])>, MeshError> {
        let mut queue = Vec::new();
        for (t, tri) in mesh.inner_triangles() {
            let mut on_boundary = false;
            for i in 0..3 {
                on_boundary |= mesh.edge_attributes(HalfEdge::new(t, i))?.contains(EdgeAttributes::BOUNDARY);
            }
            if on_boundary {
                continue;
            }
            let corners = *tri.vertices();
            let [a, b, c] = corners.map(|k| mesh.vertex(k));
            let (deviation, longest) = centroid_deviation(self.surface, [a?, b?, c?]);
            let tolerance = if self.config.relative {
                self.config.tolerance * longest
            } else {
                self.config.tolerance
            };
            if deviation > tolerance {
                queue.push((t, corners));
            }
        }
        Ok(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::algorithms::boundary_triangulation::{BoundaryConfig, BoundaryTriangulator};
    use crate::core::boundary::BoundaryLoop;
    use crate::geometry::surface::{Cylinder, Plane};
    use crate::vertex;

    #[test]
    fn test_centroid_deviation_on_flat_triangle() {
        let a = vertex!([0.0, 0.0]);
        let b = vertex!([1.0, 0.0]);
        let c = vertex!([0.0, 1.0]);
        let (dev, longest) = centroid_deviation(&Plane::xy(), [&a, &b, &c]);
        assert!(dev.abs() < 1e-12);
        assert!((longest - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    fn cylinder_patch(surface: &Cylinder) -> Mesh {
        // a quarter turn wide strip; interior points keep inner triangles off
        // the boundary
        let quarter = std::f64::consts::FRAC_PI_2;
        let wire = BoundaryLoop::from_uv(&[
            [0.0, 0.0],
            [quarter / 2.0, 0.0],
            [quarter, 0.0],
            [quarter, 1.0],
            [quarter / 2.0, 1.0],
            [0.0, 1.0],
        ]);
        let interior = [Point2::new(quarter / 3.0, 0.5), Point2::new(2.0 * quarter / 3.0, 0.5)];
        BoundaryTriangulator::new(surface, BoundaryConfig::default())
            .triangulate_with_interior(&[wire], &interior)
            .unwrap()
            .0
    }

    #[test]
    fn test_curved_surface_gets_refined() {
        let cylinder = Cylinder::new(1.0);
        let mut mesh = cylinder_patch(&cylinder);
        let before = mesh.vertex_count();
        let config = DeflectionConfig {
            tolerance: 1e-3,
            relative: false,
        };
        let stats = DeflectionEnforcer::new(&cylinder, config).run(&mut mesh).unwrap();
        assert!(stats.inserted > 0);
        assert_eq!(mesh.vertex_count(), before + stats.inserted);
        for (_, tri) in mesh.inner_triangles() {
            let [p, q, r] = *tri.vertices();
            assert!(mesh.orient(p, q, r).unwrap().is_positive());
        }
    }

    #[test]
    fn test_loose_tolerance_changes_nothing() {
        let cylinder = Cylinder::new(1.0);
        let mut mesh = cylinder_patch(&cylinder);
        let before = mesh.vertex_count();
        let config = DeflectionConfig {
            tolerance: 10.0,
            relative: true,
        };
        let stats = DeflectionEnforcer::new(&cylinder, config).run(&mut mesh).unwrap();
        assert_eq!(stats.inserted, 0);
        assert!(stats.converged);
        assert_eq!(mesh.vertex_count(), before);
    }
}
