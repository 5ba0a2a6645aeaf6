//! Incremental point insertion into the half-edge mesh.
//!
//! Insertion follows the classic Lawson scheme:
//! 1. Locate the triangle (or edge, or vertex) under the new point
//! 2. Split the triangle in three, or the edge and its two triangles in four
//! 3. Restore the Delaunay criterion around the new vertex by edge flips
//!
//! A point landing exactly on an existing vertex is not inserted; the
//! existing vertex is reported instead.

use rand::Rng;
use thiserror::Error;

use crate::core::algorithms::flips::check_and_swap;
use crate::core::algorithms::locate::{LocateError, LocateResult, locate};
use crate::core::mesh::{Mesh, MeshError};
use crate::core::vertex::{Vertex, VertexKey};

/// Error during incremental insertion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum InsertionError {
    /// Point location failed
    #[error("Location error: {0}")]
    Location(#[from] LocateError),

    /// The split or the flips after it failed
    #[error("Mesh error: {0}")]
    Mesh(#[from] MeshError),
}

/// What happened to an inserted point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionOutcome {
    /// A new vertex was linked into the mesh
    Inserted {
        /// Key of the new vertex
        vertex: VertexKey,
        /// Edge flips performed to restore the Delaunay criterion
        flips: usize,
    },
    /// The point coincides with this existing vertex
    Duplicate(VertexKey),
}

impl InsertionOutcome {
    /// Key of the vertex standing at the inserted position.
    #[must_use]
    pub const fn vertex(&self) -> VertexKey {
        match *self {
            Self::Inserted { vertex, .. } | Self::Duplicate(vertex) => vertex,
        }
    }
}

/// Splits the located simplex around the detached vertex `v` and flips
/// edges around it.
///
/// Returns the number of flips.
///
/// # Errors
///
/// Fails if the split is rejected, or on [`LocateResult::OnVertex`] which
/// leaves nothing to split.
pub fn insert_located(mesh: &mut Mesh, v: VertexKey, location: LocateResult) -> Result<usize, MeshError> {
    match location {
        LocateResult::InsideTriangle(t) => {
            mesh.split3(t, v)?;
        }
        LocateResult::OnEdge(he) => {
            mesh.split_edge(he, v)?;
        }
        LocateResult::OnVertex(_) => {
            return Err(MeshError::PointNotInside { uv: mesh.uv(v)? });
        }
    }
    check_and_swap(mesh, v)
}

/// Inserts `vertex` at its parametric position.
///
/// On failure the vertex is not left behind in the mesh storage.
///
/// # Errors
///
/// Fails if the point cannot be located or the split is rejected.
///
/// # Examples
///
/// ```rust
/// use patchmesh::core::algorithms::incremental_insertion::{InsertionOutcome, insert_vertex};
/// use patchmesh::core::algorithms::locate::LOCATE_SEED;
/// use patchmesh::core::mesh::Mesh;
/// use patchmesh::geometry::point::Point2;
/// use patchmesh::vertex;
/// use rand::SeedableRng;
///
/// let mut mesh = Mesh::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0), 8);
/// let a = mesh.add_vertex(vertex!([0.0, 0.0]));
/// let b = mesh.add_vertex(vertex!([1.0, 0.0]));
/// let c = mesh.add_vertex(vertex!([0.0, 1.0]));
/// mesh.bootstrap(a, b, c).unwrap();
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(LOCATE_SEED);
/// let outcome = insert_vertex(&mut mesh, vertex!([0.25, 0.25]), &mut rng).unwrap();
/// assert!(matches!(outcome, InsertionOutcome::Inserted { .. }));
/// assert_eq!(mesh.inner_triangles().count(), 3);
///
/// let again = insert_vertex(&mut mesh, vertex!([1.0, 0.0]), &mut rng).unwrap();
/// assert_eq!(again, InsertionOutcome::Duplicate(b));
/// ```
pub fn insert_vertex<R: Rng + ?Sized>(
    mesh: &mut Mesh,
    vertex: Vertex,
    rng: &mut R,
) -> Result<InsertionOutcome, InsertionError> {
    let location = locate(mesh, vertex.uv(), rng)?;
    if let LocateResult::OnVertex(existing) = location {
        return Ok(InsertionOutcome::Duplicate(existing));
    }
    let key = mesh.add_vertex(vertex);
    match insert_located(mesh, key, location) {
        Ok(flips) => Ok(InsertionOutcome::Inserted { vertex: key, flips }),
        Err(err) => {
            mesh.remove_unlinked_vertex(key);
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::algorithms::flips::{DelaunaySwapper, SwapConfig};
    use crate::core::algorithms::locate::LOCATE_SEED;
    use crate::geometry::point::Point2;
    use crate::vertex;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn seeded_square() -> (Mesh, StdRng) {
        let mut mesh = Mesh::new(Point2::new(0.0, 0.0), Point2::new(2.0, 2.0), 32);
        let a = mesh.add_vertex(vertex!([0.0, 0.0]));
        let b = mesh.add_vertex(vertex!([2.0, 0.0]));
        let c = mesh.add_vertex(vertex!([2.0, 2.0]));
        mesh.bootstrap(a, b, c).unwrap();
        let mut rng = StdRng::seed_from_u64(LOCATE_SEED);
        insert_vertex(&mut mesh, vertex!([0.0, 2.0]), &mut rng).unwrap();
        (mesh, rng)
    }

    #[test]
    fn test_insert_beyond_hull_extends_it() {
        let (mesh, _) = seeded_square();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.inner_triangles().count(), 2);
    }

    #[test]
    fn test_insert_on_edge_splits_both_sides() {
        let (mut mesh, mut rng) = seeded_square();
        // (2, 1) lies on the hull edge b-c
        let outcome = insert_vertex(&mut mesh, vertex!([2.0, 1.0]), &mut rng).unwrap();
        let v = outcome.vertex();
        assert!(matches!(outcome, InsertionOutcome::Inserted { .. }));
        assert_eq!(mesh.inner_triangles().count(), 3);
        for he in mesh.triangles_around(v).unwrap() {
            let tri = mesh.triangle(he.triangle).unwrap();
            assert!(tri.contains_vertex(v));
        }
    }

    #[test]
    fn test_grid_insertion_stays_delaunay() {
        let (mut mesh, mut rng) = seeded_square();
        for i in 1..8 {
            for j in 1..8 {
                let uv = [f64::from(i) * 0.25, f64::from(j) * 0.25 + 0.01 * f64::from(i % 3)];
                if uv[1] < 2.0 {
                    insert_vertex(&mut mesh, vertex!(uv), &mut rng).unwrap();
                }
            }
        }
        let stats = DelaunaySwapper::new(SwapConfig::default()).run(&mut mesh).unwrap();
        assert_eq!(stats.flips, 0);
    }
}
