//! Constrained Delaunay triangulation of the discretized wires of a face.
//!
//! The triangulator works in five stages:
//! 1. Bootstrap a first triangle from three well-separated boundary nodes
//! 2. Insert the remaining nodes by point location and splits, which gives
//!    an unconstrained Delaunay triangulation of the boundary points
//! 3. Force every wire segment into the mesh by flipping the edges crossing
//!    it, then tag it BOUNDARY
//! 4. Flood-fill from the outer shell; crossing a BOUNDARY edge toggles
//!    between outside and inside, and every outside triangle is tagged OUTER
//! 5. Optionally swap interior edges next to the boundary toward the shorter
//!    3D diagonal
//!
//! A contradiction during the flood fill, or a wire segment crossing another
//! one, means the wires are broken and the face is rejected.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::algorithms::flips::is_flip_candidate;
use crate::core::algorithms::incremental_insertion::insert_located;
use crate::core::algorithms::locate::{LOCATE_SEED, LocateError, LocateResult, locate};
use crate::core::boundary::{BoundaryLoop, BoundaryNode};
use crate::core::collections::{FastHashMap, FastHashSet, fast_hash_map_with_capacity};
use crate::core::half_edge::HalfEdge;
use crate::core::mesh::{Mesh, MeshError};
use crate::core::triangle::{EdgeAttributes, TriangleKey};
use crate::core::vertex::{Vertex, VertexKey};
use crate::geometry::point::Point2;
use crate::geometry::predicates::{Orientation, segments_cross};
use crate::geometry::surface::GeometryProvider;

/// Ratio below which the opposite 3D diagonal is preferred.
pub const SHORTER_DIAGONAL_RATIO: f64 = 0.5;

/// Errors raised while building the boundary triangulation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum BoundaryError {
    /// Fewer than three distinct boundary positions.
    #[error("Boundary has only {count} distinct points")]
    TooFewPoints {
        /// Number of distinct positions.
        count: usize,
    },
    /// All boundary points share a `u` or a `v` coordinate.
    #[error("Boundary bounding box is flat")]
    DegenerateBoundingBox,
    /// All boundary points lie on one line.
    #[error("Boundary points are collinear")]
    CollinearBoundary,
    /// A wire segment crosses another segment or runs through a vertex.
    #[error("Boundary segment {from} -> {to} intersects the boundary")]
    IntersectingBoundary {
        /// Start of the segment being forced.
        from: Point2,
        /// End of the segment being forced.
        to: Point2,
    },
    /// Edge flips did not recover a wire segment.
    #[error("Boundary segment {from} -> {to} could not be recovered")]
    EdgeNotForced {
        /// Start of the segment.
        from: Point2,
        /// End of the segment.
        to: Point2,
    },
    /// Inside and outside regions meet without a BOUNDARY edge between them.
    #[error("Inconsistent inside/outside tagging at triangle {triangle:?}")]
    InconsistentTopology {
        /// Triangle reached with contradictory states.
        triangle: TriangleKey,
    },
    /// Structural mesh failure.
    #[error(transparent)]
    Mesh(#[from] MeshError),
    /// Point location failure.
    #[error(transparent)]
    Locate(#[from] LocateError),
}

/// Options of the boundary triangulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryConfig {
    /// Swap interior edges next to the boundary when the opposite 3D
    /// diagonal is much shorter. Each edge is swapped at most once.
    pub prefer_shorter_3d_diagonals: bool,
    /// Seed of the tie-breaking random generator.
    pub seed: u64,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            prefer_shorter_3d_diagonals: false,
            seed: LOCATE_SEED,
        }
    }
}

/// Counters reported by [`BoundaryTriangulator::triangulate`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundaryStats {
    /// Distinct boundary vertices in the mesh.
    pub boundary_vertices: usize,
    /// Boundary nodes mapped onto an already present position.
    pub duplicate_nodes: usize,
    /// Wire segments recovered as mesh edges.
    pub forced_edges: usize,
    /// Edge flips spent recovering segments.
    pub forcing_flips: usize,
    /// Triangles tagged OUTER by the flood fill.
    pub outer_triangles: usize,
    /// Interior points inserted after tagging.
    pub interior_points: usize,
    /// Swaps toward shorter 3D diagonals.
    pub diagonal_swaps: usize,
}

/// Builds the initial mesh of a face from its wires.
///
/// # Examples
///
/// ```rust
/// use patchmesh::core::algorithms::boundary_triangulation::{BoundaryConfig, BoundaryTriangulator};
/// use patchmesh::core::boundary::BoundaryLoop;
/// use patchmesh::geometry::surface::Plane;
///
/// let plane = Plane::xy();
/// let square = BoundaryLoop::from_uv(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
/// let (mesh, stats) = BoundaryTriangulator::new(&plane, BoundaryConfig::default())
///     .triangulate(&[square])
///     .unwrap();
/// assert_eq!(stats.forced_edges, 4);
/// assert_eq!(mesh.inner_triangles().count(), 2);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BoundaryTriangulator<'a, G: GeometryProvider + ?Sized> {
    surface: &'a G,
    config: BoundaryConfig,
}

impl<'a, G: GeometryProvider + ?Sized> BoundaryTriangulator<'a, G> {
    /// Creates a triangulator evaluating 3D positions on `surface`.
    #[must_use]
    pub const fn new(surface: &'a G, config: BoundaryConfig) -> Self {
        Self { surface, config }
    }

    /// Triangulates the face bounded by `wires`.
    ///
    /// # Errors
    ///
    /// See [`BoundaryError`]; every variant rejects the whole face.
    pub fn triangulate(&self, wires: &[BoundaryLoop]) -> Result<(Mesh, BoundaryStats), BoundaryError> {
        self.triangulate_with_interior(wires, &[])
    }

    /// Triangulates the face and inserts fixed interior points afterwards.
    ///
    /// Interior points that fall outside the face or onto the boundary are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// See [`BoundaryError`].
    pub fn triangulate_with_interior(
        &self,
        wires: &[BoundaryLoop],
        interior: &[Point2],
    ) -> Result<(Mesh, BoundaryStats), BoundaryError> {
        let mut stats = BoundaryStats::default();
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let nodes: Vec<&BoundaryNode> = wires
            .iter()
            .flat_map(|w| w.nodes().iter())
            .filter(|n| n.uv.is_finite())
            .collect();
        let distinct: FastHashSet<Point2> = nodes.iter().map(|n| n.uv).collect();
        if distinct.len() < 3 {
            return Err(BoundaryError::TooFewPoints { count: distinct.len() });
        }
        let (min, max) = bounding_box(nodes.iter().map(|n| n.uv));
        if max.u <= min.u || max.v <= min.v {
            return Err(BoundaryError::DegenerateBoundingBox);
        }

        let mut mesh = Mesh::new(min, max, distinct.len());
        let mut keys: FastHashMap<Point2, VertexKey> = fast_hash_map_with_capacity(distinct.len());
        let mut order: Vec<VertexKey> = Vec::with_capacity(distinct.len());
        for node in &nodes {
            if let Some(&key) = keys.get(&node.uv) {
                stats.duplicate_nodes += 1;
                if node.immutable {
                    mesh.vertex_mut(key)?.freeze();
                }
                continue;
            }
            let mut vertex = Vertex::new(node.uv, self.surface.value(node.uv));
            vertex.set_reference(node.reference);
            if node.immutable {
                vertex.freeze();
            }
            let key = mesh.add_vertex(vertex);
            keys.insert(node.uv, key);
            order.push(key);
        }
        stats.boundary_vertices = order.len();

        let seeds = select_seeds(&mesh, &order)?;
        mesh.bootstrap(seeds[0], seeds[1], seeds[2])?;
        tracing::debug!("[boundary] inserting {} boundary vertices", order.len());
        for &key in &order {
            if seeds.contains(&key) {
                continue;
            }
            let location = locate(&mesh, &mesh.uv(key)?, &mut rng)?;
            insert_located(&mut mesh, key, location)?;
        }

        let mut forced: Vec<(VertexKey, VertexKey)> = Vec::with_capacity(order.len());
        for wire in wires {
            for (p, q) in wire.edges() {
                let (Some(&a), Some(&b)) = (keys.get(&p.uv), keys.get(&q.uv)) else {
                    continue;
                };
                if a == b || mesh.is_boundary_edge(a, b) {
                    continue;
                }
                let he = force_edge(&mut mesh, a, b, &mut rng, &mut stats)?;
                mesh.insert_edge_attributes(he, EdgeAttributes::BOUNDARY)?;
                mesh.record_boundary_edge(a, b);
                forced.push((a, b));
            }
        }
        stats.forced_edges = forced.len();
        tracing::debug!(
            "[boundary] forced {} segments with {} flips",
            stats.forced_edges,
            stats.forcing_flips
        );

        stats.outer_triangles = tag_outer_triangles(&mut mesh)?;

        for uv in interior {
            if self.insert_interior(&mut mesh, *uv, &mut rng)? {
                stats.interior_points += 1;
            }
        }

        if self.config.prefer_shorter_3d_diagonals {
            stats.diagonal_swaps = prefer_shorter_diagonals(&mut mesh, &forced, order.len())?;
        }
        Ok((mesh, stats))
    }

    fn insert_interior(&self, mesh: &mut Mesh, uv: Point2, rng: &mut StdRng) -> Result<bool, BoundaryError> {
        let location = locate(mesh, &uv, rng)?;
        let usable = match location {
            LocateResult::InsideTriangle(t) => !mesh.triangle(t)?.is_outer_tagged(),
            LocateResult::OnEdge(he) => !mesh
                .edge_attributes(he)?
                .intersects(EdgeAttributes::BOUNDARY | EdgeAttributes::OUTER),
            LocateResult::OnVertex(_) => false,
        };
        if !usable {
            tracing::warn!("[boundary] interior point {uv} is not inside the face, skipped");
            return Ok(false);
        }
        let mut vertex = Vertex::new(uv, self.surface.value(uv));
        vertex.freeze();
        let key = mesh.add_vertex(vertex);
        insert_located(mesh, key, location)?;
        Ok(true)
    }
}

fn bounding_box(points: impl Iterator<Item = Point2>) -> (Point2, Point2) {
    let mut min = Point2::new(f64::INFINITY, f64::INFINITY);
    let mut max = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points {
        min.u = min.u.min(p.u);
        min.v = min.v.min(p.v);
        max.u = max.u.max(p.u);
        max.v = max.v.max(p.v);
    }
    (min, max)
}

/// First node, the node farthest from it, and the node spanning the largest
/// triangle with them, ordered counter-clockwise.
fn select_seeds(mesh: &Mesh, order: &[VertexKey]) -> Result<[VertexKey; 3], BoundaryError> {
    let first = order[0];
    let p0 = mesh.uv(first)?;
    let mut far = (first, 0.0);
    for &key in order {
        let d = p0.distance(&mesh.uv(key)?);
        if d > far.1 {
            far = (key, d);
        }
    }
    let p1 = mesh.uv(far.0)?;
    let axis = p0.to(&p1);
    let mut apex = (first, 0.0);
    for &key in order {
        let w = p0.to(&mesh.uv(key)?);
        let area = axis[0].mul_add(w[1], -(axis[1] * w[0])).abs();
        if area > apex.1 {
            apex = (key, area);
        }
    }
    match mesh.orient(first, far.0, apex.0)? {
        Orientation::POSITIVE => Ok([first, far.0, apex.0]),
        Orientation::NEGATIVE => Ok([first, apex.0, far.0]),
        Orientation::DEGENERATE => Err(BoundaryError::CollinearBoundary),
    }
}

/// Mesh edges crossed by the open segment `a-b`, as vertex pairs ordered
/// right then left of `a -> b`.
fn crossing_edges(mesh: &Mesh, a: VertexKey, b: VertexKey) -> Result<Vec<(VertexKey, VertexKey)>, BoundaryError> {
    let segment_error = || -> Result<BoundaryError, MeshError> {
        Ok(BoundaryError::IntersectingBoundary {
            from: mesh.uv(a)?,
            to: mesh.uv(b)?,
        })
    };
    let not_forced = || -> Result<BoundaryError, MeshError> {
        Ok(BoundaryError::EdgeNotForced {
            from: mesh.uv(a)?,
            to: mesh.uv(b)?,
        })
    };

    let mut start = None;
    for he in mesh.triangles_around(a)? {
        let x = mesh.destination(he)?;
        let y = mesh.apex(he)?;
        if mesh.is_outer_vertex(x) || mesh.is_outer_vertex(y) {
            continue;
        }
        let ox = mesh.orient(a, x, b)?;
        if ox == Orientation::DEGENERATE {
            let [dx, dy] = mesh.uv(a)?.to(&mesh.uv(x)?);
            let [sx, sy] = mesh.uv(a)?.to(&mesh.uv(b)?);
            if dx.mul_add(sx, dy * sy) > 0.0 {
                return Err(segment_error()?);
            }
        }
        if ox == Orientation::POSITIVE && mesh.orient(a, y, b)? == Orientation::NEGATIVE {
            start = Some(he.next());
            break;
        }
    }
    let Some(mut edge) = start else {
        return Err(not_forced()?);
    };

    let mut pairs = Vec::new();
    loop {
        if mesh.edge_attributes(edge)?.contains(EdgeAttributes::BOUNDARY) {
            return Err(segment_error()?);
        }
        pairs.push((mesh.origin(edge)?, mesh.destination(edge)?));
        if pairs.len() > mesh.triangle_count() {
            return Err(not_forced()?);
        }
        let across = mesh.sym(edge)?;
        let z = mesh.apex(across)?;
        if z == b {
            return Ok(pairs);
        }
        if mesh.is_outer_vertex(z) {
            return Err(not_forced()?);
        }
        edge = match mesh.orient(a, b, z)? {
            Orientation::POSITIVE => across.next(),
            Orientation::NEGATIVE => across.prev(),
            Orientation::DEGENERATE => return Err(segment_error()?),
        };
    }
}

/// Flips edges until `a-b` is an edge of the mesh.
fn force_edge<R: Rng + ?Sized>(
    mesh: &mut Mesh,
    a: VertexKey,
    b: VertexKey,
    rng: &mut R,
    stats: &mut BoundaryStats,
) -> Result<HalfEdge, BoundaryError> {
    if let Some(he) = mesh.find_edge(a, b)? {
        return Ok(he);
    }
    let pa = mesh.uv(a)?;
    let pb = mesh.uv(b)?;
    let mut queue: VecDeque<(VertexKey, VertexKey)> = crossing_edges(mesh, a, b)?.into();
    let budget = 4 * mesh.triangle_count();
    let mut steps = 0;
    while let Some((x, y)) = queue.pop_front() {
        steps += 1;
        if steps > budget {
            tracing::warn!("[boundary] segment {pa} -> {pb} not recovered after {budget} steps");
            return Err(BoundaryError::EdgeNotForced { from: pa, to: pb });
        }
        let Some(he) = mesh.find_edge(x, y)? else {
            continue;
        };
        if mesh.edge_attributes(he)?.contains(EdgeAttributes::BOUNDARY) {
            return Err(BoundaryError::IntersectingBoundary { from: pa, to: pb });
        }
        match mesh.swap(he)? {
            None => queue.push_back((x, y)),
            Some(diagonal) => {
                stats.forcing_flips += 1;
                let p = mesh.origin(diagonal)?;
                let q = mesh.destination(diagonal)?;
                if segments_cross(&pa, &pb, &mesh.uv(p)?, &mesh.uv(q)?) {
                    if rng.random_bool(0.5) {
                        queue.push_front((p, q));
                    } else {
                        queue.push_back((p, q));
                    }
                }
            }
        }
    }
    mesh.find_edge(a, b)?
        .ok_or(BoundaryError::EdgeNotForced { from: pa, to: pb })
}

/// Tags every triangle outside the face OUTER and returns how many were
/// tagged.
///
/// Triangles touching the outer vertex are outside; the state flips across
/// BOUNDARY edges and is kept across all others.
pub(crate) fn tag_outer_triangles(mesh: &mut Mesh) -> Result<usize, BoundaryError> {
    let outer_vertex = mesh.outer_vertex();
    let mut state: FastHashMap<TriangleKey, bool> = fast_hash_map_with_capacity(mesh.triangle_count());
    let mut queue: VecDeque<TriangleKey> = VecDeque::new();
    for (key, tri) in mesh.triangles() {
        if tri.contains_vertex(outer_vertex) {
            state.insert(key, true);
            queue.push_back(key);
        }
    }
    while let Some(t) = queue.pop_front() {
        let outside = state.get(&t).copied().unwrap_or(true);
        for i in 0..3 {
            let he = HalfEdge::new(t, i);
            let crossing_boundary = mesh.edge_attributes(he)?.contains(EdgeAttributes::BOUNDARY);
            let expected = outside ^ crossing_boundary;
            let neighbor = mesh.sym(he)?.triangle;
            match state.get(&neighbor) {
                Some(&found) if found != expected => {
                    tracing::warn!("[boundary] inside/outside contradiction at {neighbor:?}");
                    return Err(BoundaryError::InconsistentTopology { triangle: neighbor });
                }
                Some(_) => {}
                None => {
                    state.insert(neighbor, expected);
                    queue.push_back(neighbor);
                }
            }
        }
    }

    let mut tagged = 0;
    for (&t, &outside) in &state {
        if outside {
            tagged += 1;
            for i in 0..3 {
                mesh.insert_half_edge_attributes(HalfEdge::new(t, i), EdgeAttributes::OUTER)?;
            }
        }
    }
    mesh.set_outer_tagged();

    // point location should start from triangles inside the face
    for (&t, &outside) in &state {
        if outside {
            continue;
        }
        let corners = *mesh.triangle(t)?.vertices();
        for v in corners {
            let linked_outside = mesh
                .vertex(v)?
                .link()
                .is_none_or(|l| state.get(&l).copied().unwrap_or(true));
            if linked_outside {
                mesh.set_link(v, t)?;
            }
        }
    }
    tracing::debug!("[boundary] tagged {tagged} outer triangles");
    Ok(tagged)
}

/// Swaps the interior edge next to each forced segment when the other
/// diagonal is much shorter in 3D. Returns the number of swaps.
fn prefer_shorter_diagonals(
    mesh: &mut Mesh,
    forced: &[(VertexKey, VertexKey)],
    max_iterations: usize,
) -> Result<usize, BoundaryError> {
    let mut swaps = 0;
    let mut remaining = max_iterations;
    let mut redo = true;
    while redo && remaining > 0 {
        redo = false;
        remaining -= 1;
        for &(a, b) in forced {
            let Some(mut he) = mesh.find_edge(a, b)? else {
                continue;
            };
            if mesh.triangle(he.triangle)?.is_outer_tagged() {
                he = mesh.sym(he)?;
            }
            let edge = he.next();
            if !is_flip_candidate(mesh, edge)? || mesh.edge_attributes(edge)?.contains(EdgeAttributes::SWAPPED) {
                continue;
            }
            let position = |v: VertexKey| -> Result<_, MeshError> { Ok(*mesh.vertex(v)?.position()) };
            let current = (position(mesh.destination(edge)?)? - position(mesh.origin(edge)?)?).norm();
            let other = (position(mesh.apex(mesh.sym(edge)?)?)? - position(mesh.apex(edge)?)?).norm();
            if other >= SHORTER_DIAGONAL_RATIO * current {
                continue;
            }
            if let Some(diagonal) = mesh.swap(edge)? {
                mesh.insert_edge_attributes(diagonal, EdgeAttributes::SWAPPED)?;
                swaps += 1;
                redo = true;
            }
        }
    }
    mesh.clear_attributes(EdgeAttributes::SWAPPED);
    if redo {
        tracing::warn!("[boundary] shorter-diagonal pass stopped after {max_iterations} iterations");
    }
    Ok(swaps)
}
