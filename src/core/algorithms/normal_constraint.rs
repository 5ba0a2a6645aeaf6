//! Edge flips that align triangle normals with the surface normal.
//!
//! A triangulation that is Delaunay in the parameter plane can still fold
//! over in 3D where the parameterization is strongly distorted. For each
//! interior edge the two incident triangles are scored by the cosine between
//! their 3D normal and the true surface normal at the middle of the edge; an
//! edge is flipped when the worse of the two scores improves.

use serde::{Deserialize, Serialize};

use crate::core::algorithms::flips::is_flip_candidate;
use crate::core::half_edge::HalfEdge;
use crate::core::mesh::{Mesh, MeshError};
use crate::core::triangle::EdgeAttributes;
use crate::geometry::point::{Point3, Vector3};
use crate::geometry::predicates::Orientation;
use crate::geometry::surface::GeometryProvider;

/// Options of [`NormalConstraintSwapper`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalConstraintConfig {
    /// Edges whose incident triangles both align better than this cosine are
    /// left alone.
    pub min_alignment: f64,
}

impl Default for NormalConstraintConfig {
    fn default() -> Self {
        Self { min_alignment: 0.4 }
    }
}

/// Outcome of a [`NormalConstraintSwapper`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalSwapStats {
    /// Sweeps over the mesh.
    pub sweeps: usize,
    /// Edges flipped.
    pub swaps: usize,
    /// `true` if the last sweep found nothing to flip.
    pub converged: bool,
}

/// Cosine between the normal of `(p, q, r)` and `normal`.
fn alignment(p: &Point3, q: &Point3, r: &Point3, normal: &Vector3) -> f64 {
    let n = (q - p).cross(&(r - p));
    let norm = n.norm();
    let norm = if norm < 1.0e-20 { 1.0 } else { norm };
    n.dot(normal) / norm
}

/// Quality pass flipping edges toward better 3D normal alignment.
///
/// A flipped edge is tagged SWAPPED and left alone for the rest of its
/// sweep. The tags are cleared when the pass returns.
#[derive(Debug, Clone, Copy)]
pub struct NormalConstraintSwapper<'a, G: GeometryProvider + ?Sized> {
    surface: &'a G,
    config: NormalConstraintConfig,
}

impl<'a, G: GeometryProvider + ?Sized> NormalConstraintSwapper<'a, G> {
    /// Creates the pass comparing against the normals of `surface`.
    #[must_use]
    pub const fn new(surface: &'a G, config: NormalConstraintConfig) -> Self {
        Self { surface, config }
    }

    /// Flips edges until a sweep finds nothing to improve.
    ///
    /// The sweep cap starts at the triangle count and drops to the number of
    /// flips of the previous sweep whenever that is smaller.
    ///
    /// # Errors
    ///
    /// Fails only on a structurally broken mesh.
    pub fn run(&self, mesh: &mut Mesh) -> Result<NormalSwapStats, MeshError> {
        let mut stats = NormalSwapStats::default();
        let mut remaining = mesh.triangle_count();
        loop {
            remaining = remaining.saturating_sub(1);
            mesh.clear_attributes(EdgeAttributes::SWAPPED);
            let swaps = self.sweep(mesh)?;
            stats.sweeps += 1;
            stats.swaps += swaps;
            if swaps == 0 {
                stats.converged = true;
                break;
            }
            remaining = remaining.min(swaps);
            if remaining == 0 {
                tracing::warn!("[normal] stopped after {} sweeps with flips pending", stats.sweeps);
                break;
            }
        }
        mesh.clear_attributes(EdgeAttributes::SWAPPED);
        tracing::debug!("[normal] sweeps={} swaps={}", stats.sweeps, stats.swaps);
        Ok(stats)
    }

    fn sweep(&self, mesh: &mut Mesh) -> Result<usize, MeshError> {
        let mut swaps = 0;
        for t in mesh.triangle_keys() {
            if !mesh.contains_triangle(t) {
                continue;
            }
            let mut best: Option<(HalfEdge, f64)> = None;
            for i in 0..3 {
                let he = HalfEdge::new(t, i);
                if let Some(gain) = self.gain(mesh, he)?
                    && best.is_none_or(|(_, g)| gain > g)
                {
                    best = Some((he, gain));
                }
            }
            if let Some((he, _)) = best
                && let Some(diagonal) = mesh.swap(he)?
            {
                mesh.insert_edge_attributes(diagonal, EdgeAttributes::SWAPPED)?;
                swaps += 1;
            }
        }
        Ok(swaps)
    }

    /// Improvement of the worse alignment if `he` were flipped, or `None`
    /// when the edge is fine as it is or the flip would not help.
    fn gain(&self, mesh: &Mesh, he: HalfEdge) -> Result<Option<f64>, MeshError> {
        if !is_flip_candidate(mesh, he)? {
            return Ok(None);
        }
        let sym = mesh.sym(he)?;
        if (mesh.edge_attributes(he)? | mesh.edge_attributes(sym)?).contains(EdgeAttributes::SWAPPED) {
            return Ok(None);
        }
        let o = mesh.origin(he)?;
        let d = mesh.destination(he)?;
        let a = mesh.apex(he)?;
        let b = mesh.apex(sym)?;
        if mesh.orient(d, a, b)? != Orientation::POSITIVE || mesh.orient(o, b, a)? != Orientation::POSITIVE {
            return Ok(None);
        }

        let [uo, ud, ua, ub] = [mesh.uv(o)?, mesh.uv(d)?, mesh.uv(a)?, mesh.uv(b)?];
        let [xo, xd, xa, xb] = [uo, ud, ua, ub].map(|uv| self.surface.value(uv));
        let normal = self.surface.normal(uo.midpoint(&ud));
        let normal = normal.try_normalize(1.0e-20).unwrap_or(normal);

        let before = [alignment(&xo, &xd, &xa, &normal), alignment(&xo, &xb, &xd, &normal)];
        if before.iter().all(|&s| s > self.config.min_alignment) {
            return Ok(None);
        }
        let after = [alignment(&xb, &xa, &xo, &normal), alignment(&xb, &xd, &xa, &normal)];
        let gain = after[0].min(after[1]) - before[0].min(before[1]);
        Ok((gain > 0.0).then_some(gain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point2;
    use crate::geometry::surface::{Curvature, Plane};
    use crate::vertex;

    /// Height field with a spike at `(0, 1)` and a fixed upward normal.
    struct Spike;

    impl GeometryProvider for Spike {
        fn value(&self, uv: Point2) -> Point3 {
            Point3::new(uv.u, uv.v, 5.0 * (1.0 - uv.u) * uv.v)
        }

        fn normal(&self, _uv: Point2) -> Vector3 {
            Vector3::z()
        }

        fn curvature(&self, _uv: Point2) -> Curvature {
            Curvature::flat()
        }
    }

    /// Unit square with the diagonal `(0,0)-(1,1)` and `(0,1)` last.
    fn square(mesh: &mut Mesh) -> [crate::core::vertex::VertexKey; 4] {
        let o = mesh.add_vertex(vertex!([0.0, 0.0]));
        let b = mesh.add_vertex(vertex!([1.0, 0.0]));
        let d = mesh.add_vertex(vertex!([1.0, 1.0]));
        let a = mesh.add_vertex(vertex!([0.0, 1.0]));
        mesh.bootstrap(o, b, d).unwrap();
        let beyond = mesh.find_edge(o, d).unwrap().unwrap().triangle;
        mesh.split3(beyond, a).unwrap();
        [o, b, d, a]
    }

    #[test]
    fn test_flips_folded_diagonal() {
        let mut mesh = Mesh::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0), 8);
        let [o, b, d, a] = square(&mut mesh);
        let stats = NormalConstraintSwapper::new(&Spike, NormalConstraintConfig::default())
            .run(&mut mesh)
            .unwrap();
        assert_eq!(stats.swaps, 1);
        assert!(stats.converged);
        assert!(mesh.find_edge(o, d).unwrap().is_none());
        let he = mesh.find_edge(a, b).unwrap().unwrap();
        assert!(is_flip_candidate(&mesh, he).unwrap());
        for (_, tri) in mesh.triangles() {
            assert!(!tri.any_edge_has(EdgeAttributes::SWAPPED | EdgeAttributes::IMMUTABLE));
        }
    }

    #[test]
    fn test_flat_surface_is_untouched() {
        let mut mesh = Mesh::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0), 8);
        let [o, _, d, _] = square(&mut mesh);
        let stats = NormalConstraintSwapper::new(&Plane::xy(), NormalConstraintConfig::default())
            .run(&mut mesh)
            .unwrap();
        assert_eq!(stats.swaps, 0);
        assert!(mesh.find_edge(o, d).unwrap().is_some());
    }
}
