//! Walking point location in the parameter plane.
//!
//! The walk starts from the back-link triangle of the vertex nearest to the
//! query and repeatedly crosses an edge that separates the current triangle
//! from the query point. When several edges qualify one is picked at random,
//! which rules out the cycles a deterministic visibility walk can run into.
//!
//! Outer triangles are handled uniformly: the only real edge of an outer
//! triangle decides whether the query lies beyond the hull on that side.
//!
//! # References
//!
//! - O. Devillers, S. Pion, and M. Teillaud, "Walking in a Triangulation",
//!   International Journal of Foundations of Computer Science, 2001.

use rand::Rng;
use thiserror::Error;

use crate::core::collections::SmallBuffer;
use crate::core::half_edge::HalfEdge;
use crate::core::mesh::{Mesh, MeshError};
use crate::core::triangle::TriangleKey;
use crate::core::vertex::VertexKey;
use crate::geometry::point::Point2;
use crate::geometry::predicates::{Orientation, orientation};

/// Step limit of the walk before switching to a linear scan.
pub const MAX_WALK_STEPS: usize = 10_000;

/// Seed of the random tie-breaking used by point location and edge forcing.
pub const LOCATE_SEED: u64 = 139;

/// Result of a point location query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateResult {
    /// Point is strictly inside the triangle (or strictly beyond the real
    /// edge of an outer triangle)
    InsideTriangle(TriangleKey),
    /// Point is in the interior of this edge
    OnEdge(HalfEdge),
    /// Point coincides with a vertex
    OnVertex(VertexKey),
}

/// Error during point location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LocateError {
    /// The mesh has no triangles yet
    #[error("Cannot locate in an empty mesh")]
    EmptyMesh,

    /// Neither the walk nor the linear scan found the point
    #[error("Point {uv} is not covered by any triangle")]
    NotFound {
        /// The query point
        uv: Point2,
    },

    /// Navigation hit a broken mesh
    #[error("Mesh error during point location: {source}")]
    Mesh {
        #[from]
        /// The underlying mesh error
        source: MeshError,
    },
}

enum Step {
    Found(LocateResult),
    /// Local indices of the edges separating the triangle from the point.
    Cross(SmallBuffer<usize, 3>),
}

/// Locates `uv` starting next to the nearest indexed vertex.
///
/// # Errors
///
/// [`LocateError::EmptyMesh`] if there is nothing to walk, or a mesh error if
/// navigation meets a stale key.
///
/// # Examples
///
/// ```rust
/// use patchmesh::core::algorithms::locate::{LOCATE_SEED, LocateResult, locate};
/// use patchmesh::core::mesh::Mesh;
/// use patchmesh::geometry::point::Point2;
/// use patchmesh::vertex;
/// use rand::SeedableRng;
///
/// let mut mesh = Mesh::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0), 8);
/// let a = mesh.add_vertex(vertex!([0.0, 0.0]));
/// let b = mesh.add_vertex(vertex!([1.0, 0.0]));
/// let c = mesh.add_vertex(vertex!([0.0, 1.0]));
/// let t = mesh.bootstrap(a, b, c).unwrap();
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(LOCATE_SEED);
/// let hit = locate(&mesh, &Point2::new(0.2, 0.2), &mut rng).unwrap();
/// assert_eq!(hit, LocateResult::InsideTriangle(t));
/// let corner = locate(&mesh, &Point2::new(1.0, 0.0), &mut rng).unwrap();
/// assert_eq!(corner, LocateResult::OnVertex(b));
/// ```
pub fn locate<R: Rng + ?Sized>(mesh: &Mesh, uv: &Point2, rng: &mut R) -> Result<LocateResult, LocateError> {
    let hint = mesh
        .nearest_vertex(*uv)
        .and_then(|v| mesh.vertex(v).ok())
        .and_then(|v| v.link());
    locate_from(mesh, hint, uv, rng)
}

/// Locates `uv` starting from `hint` (or an arbitrary triangle).
///
/// # Errors
///
/// See [`locate`].
pub fn locate_from<R: Rng + ?Sized>(
    mesh: &Mesh,
    hint: Option<TriangleKey>,
    uv: &Point2,
    rng: &mut R,
) -> Result<LocateResult, LocateError> {
    let mut current = match hint {
        Some(key) if mesh.contains_triangle(key) => key,
        _ => mesh.triangles().next().map(|(k, _)| k).ok_or(LocateError::EmptyMesh)?,
    };

    for _ in 0..MAX_WALK_STEPS {
        match classify(mesh, current, uv)? {
            Step::Found(found) => return Ok(found),
            Step::Cross(edges) => {
                let edge = if edges.len() == 1 {
                    edges[0]
                } else {
                    edges[rng.random_range(0..edges.len())]
                };
                current = mesh.sym(HalfEdge::new(current, edge))?.triangle;
            }
        }
    }

    tracing::warn!("[locate] walk toward {uv} exceeded {MAX_WALK_STEPS} steps, scanning all triangles");
    locate_linear(mesh, uv)
}

/// Exhaustive location, used when the walk does not terminate.
///
/// # Errors
///
/// [`LocateError::NotFound`] if no triangle claims the point.
pub fn locate_linear(mesh: &Mesh, uv: &Point2) -> Result<LocateResult, LocateError> {
    if mesh.triangle_count() == 0 {
        return Err(LocateError::EmptyMesh);
    }
    // Outer triangles only claim points no real triangle contains.
    let outer = mesh.outer_vertex();
    let mut deferred: Vec<TriangleKey> = Vec::new();
    for (key, tri) in mesh.triangles() {
        if tri.contains_vertex(outer) {
            deferred.push(key);
            continue;
        }
        if let Step::Found(found) = classify(mesh, key, uv)? {
            return Ok(found);
        }
    }
    for key in deferred {
        if let Step::Found(found) = classify(mesh, key, uv)? {
            return Ok(found);
        }
    }
    Err(LocateError::NotFound { uv: *uv })
}

fn classify(mesh: &Mesh, t: TriangleKey, p: &Point2) -> Result<Step, MeshError> {
    let tri = mesh.triangle(t)?;
    if let Some(k) = tri.index_of(mesh.outer_vertex()) {
        return classify_outer(mesh, t, k, p);
    }

    let uv = [
        mesh.uv(tri.vertex(0))?,
        mesh.uv(tri.vertex(1))?,
        mesh.uv(tri.vertex(2))?,
    ];
    let mut crossing: SmallBuffer<usize, 3> = SmallBuffer::new();
    let mut on_line: SmallBuffer<usize, 3> = SmallBuffer::new();
    for k in 0..3 {
        match orientation(&uv[(k + 1) % 3], &uv[(k + 2) % 3], p) {
            Orientation::NEGATIVE => crossing.push(k),
            Orientation::DEGENERATE => on_line.push(k),
            Orientation::POSITIVE => {}
        }
    }
    if !crossing.is_empty() {
        return Ok(Step::Cross(crossing));
    }
    Ok(Step::Found(match on_line.as_slice() {
        [] => LocateResult::InsideTriangle(t),
        [k] => LocateResult::OnEdge(HalfEdge::new(t, *k)),
        [k1, k2, ..] => LocateResult::OnVertex(tri.vertex(3 - k1 - k2)),
    }))
}

/// Outer triangle with the outer vertex at local index `k`; its real edge is
/// edge `k`.
fn classify_outer(mesh: &Mesh, t: TriangleKey, k: usize, p: &Point2) -> Result<Step, MeshError> {
    let cross = |edge: usize| Step::Cross(std::iter::once(edge % 3).collect());
    let tri = mesh.triangle(t)?;
    let o_key = tri.vertex(k + 1);
    let d_key = tri.vertex(k + 2);
    let o = mesh.uv(o_key)?;
    let d = mesh.uv(d_key)?;
    match orientation(&o, &d, p) {
        Orientation::POSITIVE => Ok(Step::Found(LocateResult::InsideTriangle(t))),
        Orientation::NEGATIVE => Ok(cross(k)),
        Orientation::DEGENERATE => {
            if *p == o {
                return Ok(Step::Found(LocateResult::OnVertex(o_key)));
            }
            if *p == d {
                return Ok(Step::Found(LocateResult::OnVertex(d_key)));
            }
            let od = o.to(&d);
            let op = o.to(p);
            let along = od[0].mul_add(op[0], od[1] * op[1]);
            let length2 = od[0].mul_add(od[0], od[1] * od[1]);
            if along <= 0.0 {
                Ok(cross(k + 2))
            } else if along >= length2 {
                Ok(cross(k + 1))
            } else {
                Ok(Step::Found(LocateResult::OnEdge(HalfEdge::new(t, k))))
            }
        }
    }
}
