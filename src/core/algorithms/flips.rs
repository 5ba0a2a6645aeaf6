//! Edge flips enforcing the Delaunay criterion.
//!
//! Two entry points share one in-circle rule:
//! - [`DelaunaySwapper`] sweeps every flippable edge of the mesh until a sweep
//!   flips nothing or its budget runs out.
//! - [`check_and_swap`] restores the criterion locally around a freshly
//!   inserted vertex (Lawson's algorithm), and also repairs the convex hull
//!   while the outer triangles are still untagged.
//!
//! The in-circle test measures the quadrilateral under the metric
//! interpolated from the two endpoints of the tested edge, which makes the
//! decision independent of the side the edge is looked at from.

use serde::{Deserialize, Serialize};

use crate::core::half_edge::HalfEdge;
use crate::core::mesh::{Mesh, MeshError};
use crate::core::triangle::EdgeAttributes;
use crate::core::vertex::VertexKey;
use crate::geometry::metric::{Metric2D, metric_in_circle};
use crate::geometry::predicates::InCircle;

/// Steps per triangle allowed to [`check_and_swap`] before it gives up.
pub const LOCAL_SWAP_STEPS_PER_TRIANGLE: usize = 3;

fn swap_trace_enabled() -> bool {
    std::env::var_os("PATCHMESH_SWAP_TRACE").is_some()
}

/// Budget policy of the global sweep.
///
/// # Examples
///
/// ```rust
/// use patchmesh::core::algorithms::flips::SwapConfig;
///
/// assert_eq!(SwapConfig::default().sweep_cap_multiplier, 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapConfig {
    /// After each sweep the remaining sweep budget becomes
    /// `min(budget - 1, sweep_cap_multiplier * flips)`.
    pub sweep_cap_multiplier: usize,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            sweep_cap_multiplier: 10,
        }
    }
}

/// Outcome of a [`DelaunaySwapper`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapStats {
    /// Number of sweeps over the mesh.
    pub sweeps: usize,
    /// Number of edges flipped.
    pub flips: usize,
    /// `true` if the last sweep flipped nothing.
    pub converged: bool,
}

/// In-circle classification of the apex of `sym(he)` against the triangle of
/// `he`, under the metric interpolated from the endpoints of `he`.
///
/// # Errors
///
/// Fails on a stale key or an open edge.
pub fn delaunay_test(mesh: &Mesh, he: HalfEdge) -> Result<InCircle, MeshError> {
    let o = mesh.origin(he)?;
    let d = mesh.destination(he)?;
    let a = mesh.apex(he)?;
    let b = mesh.apex(mesh.sym(he)?)?;
    let metric = Metric2D::interpolate(&mesh.metric(o)?, &mesh.metric(d)?);
    Ok(metric_in_circle(
        &mesh.uv(o)?,
        &mesh.uv(d)?,
        &mesh.uv(a)?,
        &mesh.uv(b)?,
        &metric,
    ))
}

/// Returns `true` if the apex of either side of `he` lies strictly inside
/// the circle of the other side.
///
/// Under an anisotropic metric the two tests are not exact mirrors of each
/// other, so both are run.
///
/// # Errors
///
/// Fails on a stale key or an open edge.
pub fn violates_delaunay(mesh: &Mesh, he: HalfEdge) -> Result<bool, MeshError> {
    Ok(delaunay_test(mesh, he)? == InCircle::INSIDE || delaunay_test(mesh, mesh.sym(he)?)? == InCircle::INSIDE)
}

/// Returns `true` if the Delaunay criterion applies to `he`: no unflippable
/// attribute on either side and no corner of the quadrilateral at infinity.
///
/// # Errors
///
/// Fails on a stale key or an open edge.
pub fn is_flip_candidate(mesh: &Mesh, he: HalfEdge) -> Result<bool, MeshError> {
    let sym = mesh.sym(he)?;
    if (mesh.edge_attributes(he)? | mesh.edge_attributes(sym)?).intersects(EdgeAttributes::UNFLIPPABLE) {
        return Ok(false);
    }
    let corners = [
        mesh.origin(he)?,
        mesh.destination(he)?,
        mesh.apex(he)?,
        mesh.apex(sym)?,
    ];
    Ok(!corners.iter().any(|&v| mesh.is_outer_vertex(v)))
}

/// Restores the Delaunay criterion around the vertex `v` after it was
/// inserted by a split.
///
/// Edges opposite `v` are tested and flipped; every flip exposes two new
/// edges opposite `v`. Edges touching the outer vertex are flipped whenever
/// the flip is geometrically valid, which keeps the hull convex. Returns the
/// number of flips.
///
/// # Errors
///
/// Fails if `v` is not linked into the mesh or navigation meets a stale key.
pub fn check_and_swap(mesh: &mut Mesh, v: VertexKey) -> Result<usize, MeshError> {
    let mut stack: Vec<HalfEdge> = mesh.triangles_around(v)?.iter().map(|he| he.next()).collect();
    let max_steps = LOCAL_SWAP_STEPS_PER_TRIANGLE * mesh.triangle_count() + 64;
    let mut steps = 0;
    let mut flips = 0;

    while let Some(he) = stack.pop() {
        steps += 1;
        if steps > max_steps {
            tracing::warn!("[swap] local re-check around {v:?} stopped after {max_steps} steps");
            break;
        }
        if !mesh.contains_triangle(he.triangle) || mesh.apex(he)? != v {
            continue;
        }
        let sym = mesh.sym(he)?;
        if (mesh.edge_attributes(he)? | mesh.edge_attributes(sym)?).intersects(EdgeAttributes::UNFLIPPABLE) {
            continue;
        }
        let o = mesh.origin(he)?;
        let d = mesh.destination(he)?;
        if mesh.is_outer_vertex(mesh.apex(sym)?) {
            continue;
        }
        let hull_edge = mesh.is_outer_vertex(o) || mesh.is_outer_vertex(d);
        if !hull_edge && !violates_delaunay(mesh, he)? {
            continue;
        }
        if let Some(diagonal) = mesh.swap(he)? {
            flips += 1;
            stack.push(diagonal.prev());
            stack.push(mesh.sym(diagonal)?.next());
        }
    }
    Ok(flips)
}

/// Global edge-flip pass.
///
/// Each sweep visits every edge once, using the SWAPPED bit as the visited
/// mark, and flips the edges whose quadrilateral fails the in-circle test.
///
/// # Examples
///
/// ```rust
/// use patchmesh::core::algorithms::flips::{DelaunaySwapper, SwapConfig};
/// use patchmesh::core::mesh::Mesh;
/// use patchmesh::geometry::point::Point2;
/// use patchmesh::vertex;
///
/// let mut mesh = Mesh::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0), 8);
/// let a = mesh.add_vertex(vertex!([0.0, 0.0]));
/// let b = mesh.add_vertex(vertex!([1.0, 0.0]));
/// let c = mesh.add_vertex(vertex!([0.0, 1.0]));
/// mesh.bootstrap(a, b, c).unwrap();
///
/// let stats = DelaunaySwapper::new(SwapConfig::default()).run(&mut mesh).unwrap();
/// assert!(stats.converged);
/// assert_eq!(stats.flips, 0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DelaunaySwapper {
    config: SwapConfig,
}

impl DelaunaySwapper {
    /// Swapper with the given budget policy.
    #[must_use]
    pub const fn new(config: SwapConfig) -> Self {
        Self { config }
    }

    /// Sweeps until no edge is flipped or the budget is exhausted.
    ///
    /// Running out of budget is logged and reported through
    /// [`SwapStats::converged`], never as an error.
    ///
    /// # Errors
    ///
    /// Fails only on a structurally broken mesh.
    pub fn run(&self, mesh: &mut Mesh) -> Result<SwapStats, MeshError> {
        let mut stats = SwapStats::default();
        let mut budget = mesh.triangle_count().max(1);
        loop {
            let flips = self.sweep(mesh)?;
            stats.sweeps += 1;
            stats.flips += flips;
            if flips == 0 {
                stats.converged = true;
                break;
            }
            budget = (budget - 1).min(self.config.sweep_cap_multiplier.saturating_mul(flips));
            if budget == 0 {
                tracing::warn!(
                    "[swap] sweep budget exhausted after {} sweeps ({} flips)",
                    stats.sweeps,
                    stats.flips
                );
                break;
            }
        }
        mesh.clear_attributes(EdgeAttributes::SWAPPED);
        tracing::debug!(
            "[swap] sweeps={} flips={} converged={}",
            stats.sweeps,
            stats.flips,
            stats.converged
        );
        Ok(stats)
    }

    fn sweep(&self, mesh: &mut Mesh) -> Result<usize, MeshError> {
        mesh.clear_attributes(EdgeAttributes::SWAPPED);
        let trace = swap_trace_enabled();
        let mut flips = 0;
        for t in mesh.triangle_keys() {
            for i in 0..3 {
                let he = HalfEdge::new(t, i);
                if mesh.edge_attributes(he)?.contains(EdgeAttributes::SWAPPED) {
                    continue;
                }
                mesh.insert_edge_attributes(he, EdgeAttributes::SWAPPED)?;
                if !is_flip_candidate(mesh, he)? || !violates_delaunay(mesh, he)? {
                    continue;
                }
                let ends = (mesh.origin(he)?, mesh.destination(he)?);
                if let Some(diagonal) = mesh.swap(he)? {
                    flips += 1;
                    mesh.insert_edge_attributes(diagonal, EdgeAttributes::SWAPPED)?;
                    if trace {
                        tracing::debug!(
                            "[swap] flipped {:?}-{:?} into {:?}-{:?}",
                            ends.0,
                            ends.1,
                            mesh.origin(diagonal)?,
                            mesh.destination(diagonal)?
                        );
                    }
                }
            }
        }
        Ok(flips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::triangle::TriangleKey;
    use crate::geometry::point::Point2;
    use crate::vertex;

    /// Quad `a b c d` triangulated with the diagonal `a-c`, built without any
    /// local re-check so the diagonal may violate the criterion.
    fn quad_with_diagonal_ac(d_uv: [f64; 2]) -> (Mesh, [VertexKey; 4]) {
        let mut mesh = Mesh::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0), 8);
        let a = mesh.add_vertex(vertex!([0.0, 0.0]));
        let b = mesh.add_vertex(vertex!([1.0, 0.0]));
        let c = mesh.add_vertex(vertex!([1.0, 1.0]));
        let d = mesh.add_vertex(vertex!(d_uv));
        mesh.bootstrap(a, b, c).unwrap();
        // a->c belongs to the outer triangle beyond the hull edge
        let beyond_ca: TriangleKey = mesh.find_edge(a, c).unwrap().unwrap().triangle;
        mesh.split3(beyond_ca, d).unwrap();
        (mesh, [a, b, c, d])
    }

    #[test]
    fn test_swapper_flips_non_delaunay_diagonal_once() {
        let (mut mesh, [a, b, c, d]) = quad_with_diagonal_ac([0.1, 1.0]);
        let he = mesh.find_edge(a, c).unwrap().unwrap();
        assert_eq!(delaunay_test(&mesh, he).unwrap(), InCircle::INSIDE);

        let stats = DelaunaySwapper::default().run(&mut mesh).unwrap();
        assert_eq!(stats.flips, 1);
        assert!(stats.converged);
        assert!(mesh.find_edge(a, c).unwrap().is_none());
        assert!(mesh.find_edge(b, d).unwrap().is_some());
        assert_eq!(mesh.inner_triangles().count(), 2);

        let again = DelaunaySwapper::default().run(&mut mesh).unwrap();
        assert_eq!(again.flips, 0);
        // scratch bits never leak
        for (_, tri) in mesh.triangles() {
            assert!(!tri.any_edge_has(EdgeAttributes::SWAPPED));
        }
    }

    #[test]
    fn test_violation_is_seen_from_either_side() {
        let (mesh, [a, _, c, _]) = quad_with_diagonal_ac([0.1, 1.0]);
        let he = mesh.find_edge(a, c).unwrap().unwrap();
        let sym = mesh.sym(he).unwrap();
        assert!(violates_delaunay(&mesh, he).unwrap());
        assert!(violates_delaunay(&mesh, sym).unwrap());

        let (mesh, [a, _, c, _]) = quad_with_diagonal_ac([0.0, 1.0]);
        let he = mesh.find_edge(a, c).unwrap().unwrap();
        assert!(!violates_delaunay(&mesh, he).unwrap());
        assert!(!violates_delaunay(&mesh, mesh.sym(he).unwrap()).unwrap());
    }

    #[test]
    fn test_swapper_keeps_cocircular_diagonal() {
        let (mut mesh, [a, _, c, _]) = quad_with_diagonal_ac([0.0, 1.0]);
        let stats = DelaunaySwapper::default().run(&mut mesh).unwrap();
        assert_eq!(stats.flips, 0);
        assert!(mesh.find_edge(a, c).unwrap().is_some());
    }

    #[test]
    fn test_swapper_never_flips_boundary_edge() {
        let (mut mesh, [a, _, c, _]) = quad_with_diagonal_ac([0.1, 1.0]);
        let he = mesh.find_edge(a, c).unwrap().unwrap();
        mesh.insert_edge_attributes(he, EdgeAttributes::BOUNDARY).unwrap();
        assert!(!is_flip_candidate(&mesh, he).unwrap());
        let stats = DelaunaySwapper::default().run(&mut mesh).unwrap();
        assert_eq!(stats.flips, 0);
        assert!(mesh.find_edge(a, c).unwrap().is_some());
    }

    #[test]
    fn test_check_and_swap_repairs_split() {
        let (mut mesh, [a, _, c, d]) = quad_with_diagonal_ac([0.1, 1.0]);
        // d was inserted without a re-check; run it now
        let flips = check_and_swap(&mut mesh, d).unwrap();
        assert_eq!(flips, 1);
        assert!(mesh.find_edge(a, c).unwrap().is_none());
        assert_eq!(DelaunaySwapper::default().run(&mut mesh).unwrap().flips, 0);
    }

    #[test]
    fn test_check_and_swap_restores_convex_hull() {
        let mut mesh = Mesh::new(Point2::new(0.0, 0.0), Point2::new(4.0, 4.0), 8);
        let a = mesh.add_vertex(vertex!([0.0, 0.0]));
        let b = mesh.add_vertex(vertex!([4.0, 0.0]));
        let c = mesh.add_vertex(vertex!([2.0, 1.0]));
        mesh.bootstrap(a, b, c).unwrap();
        // far above c: the hull must swallow c
        let v = mesh.add_vertex(vertex!([2.0, 4.0]));
        let beyond_bc = mesh.sym(mesh.find_edge(b, c).unwrap().unwrap()).unwrap().triangle;
        mesh.split3(beyond_bc, v).unwrap();
        check_and_swap(&mut mesh, v).unwrap();

        // c is interior now, so it no longer touches the outer vertex
        let outer = mesh.outer_vertex();
        for he in mesh.triangles_around(c).unwrap() {
            assert!(!mesh.triangle(he.triangle).unwrap().contains_vertex(outer));
        }
        assert_eq!(mesh.inner_triangles().count(), 3);
        assert!(mesh.find_edge(a, v).unwrap().is_some());
    }
}
