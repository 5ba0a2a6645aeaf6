//! Half-edge triangle mesh over the parameter plane.
//!
//! The [`Mesh`] owns vertex and triangle storage, the sentinel outer vertex and
//! a [`SpatialIndex`] of the inserted vertices. Triangles on the far side of
//! the current convex hull connect to the outer vertex, so the triangulation
//! is always a closed topological sphere and every half-edge has a `sym`.
//!
//! Structural mutators ([`Mesh::split3`], [`Mesh::split_edge`],
//! [`Mesh::swap`]) validate their geometric preconditions with exact
//! predicates before touching anything. On success the new triangles are
//! counter-clockwise, neighbor links are symmetric and every vertex back-link
//! points at an incident triangle.

#![forbid(unsafe_code)]

use thiserror::Error;

use crate::core::collections::{FAN_INLINE_CAPACITY, FastHashSet, SmallBuffer, SpatialIndex, StorageMap};
use crate::core::half_edge::HalfEdge;
use crate::core::triangle::{EdgeAttributes, Triangle, TriangleKey};
use crate::core::vertex::{Vertex, VertexKey};
use crate::geometry::metric::{Metric2D, edge_length};
use crate::geometry::point::Point2;
use crate::geometry::predicates::{Orientation, orientation};

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by structural mesh operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum MeshError {
    /// A triangle key no longer refers to a stored triangle.
    #[error("Triangle {key:?} not found")]
    TriangleNotFound {
        /// The stale key.
        key: TriangleKey,
    },
    /// A vertex key no longer refers to a stored vertex.
    #[error("Vertex {key:?} not found")]
    VertexNotFound {
        /// The stale key.
        key: VertexKey,
    },
    /// A half-edge has no neighbor across it.
    #[error("Half-edge {edge} has no neighbor")]
    UnlinkedEdge {
        /// The open half-edge.
        edge: HalfEdge,
    },
    /// A vertex is not attached to any triangle.
    #[error("Vertex {key:?} has no incident triangle")]
    UnlinkedVertex {
        /// The detached vertex.
        key: VertexKey,
    },
    /// A vertex was inserted twice.
    #[error("Vertex {key:?} is already part of the triangulation")]
    VertexAlreadyLinked {
        /// The vertex.
        key: VertexKey,
    },
    /// Constrained edges are never swapped.
    #[error("Boundary edge {edge} cannot be swapped")]
    BoundarySwap {
        /// The rejected half-edge.
        edge: HalfEdge,
    },
    /// A split would create an inverted or flat triangle.
    #[error("Point {uv} is not strictly inside the split region")]
    PointNotInside {
        /// Parametric position of the rejected vertex.
        uv: Point2,
    },
    /// Splitting a triangle already tagged as outside the face.
    #[error("Triangle {key:?} lies outside the face domain")]
    SplitOuterTriangle {
        /// The tagged triangle.
        key: TriangleKey,
    },
    /// The first triangle must be counter-clockwise.
    #[error("Bootstrap triangle is not counter-clockwise")]
    DegenerateBootstrap,
    /// The mesh already has triangles.
    #[error("Mesh is already bootstrapped")]
    AlreadyBootstrapped,
    /// Walking around a vertex did not return to the start.
    #[error("Triangle fan around vertex {key:?} does not close")]
    OpenFan {
        /// The center vertex.
        key: VertexKey,
    },
}

// =============================================================================
// QUALITY REPORT
// =============================================================================

/// Size and shape summary of the triangles inside the face.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityStats {
    /// Number of inner triangles measured.
    pub triangles: usize,
    /// Shortest edge under the vertex metrics.
    pub min_edge_length: f64,
    /// Longest edge under the vertex metrics.
    pub max_edge_length: f64,
    /// Smallest 3D corner angle, in degrees.
    pub min_angle_degrees: f64,
}

// =============================================================================
// MESH
// =============================================================================

/// Triangle mesh with half-edge navigation.
///
/// # Examples
///
/// ```rust
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
/// // one real triangle and three outer triangles close the sphere
/// assert_eq!(mesh.triangle_count(), 4);
/// assert_eq!(mesh.inner_triangles().count(), 1);
/// assert!(mesh.find_edge(a, b).unwrap().is_some());
/// ```
#[derive(Clone, Debug)]
pub struct Mesh {
    vertices: StorageMap<VertexKey, Vertex>,
    triangles: StorageMap<TriangleKey, Triangle>,
    outer: VertexKey,
    index: SpatialIndex,
    boundary_edges: FastHashSet<(VertexKey, VertexKey)>,
    outer_tagged: bool,
}

impl Mesh {
    /// Empty mesh for a face whose parametric bounding box is `[min, max]`.
    ///
    /// `expected_vertices` sizes the spatial index.
    #[must_use]
    pub fn new(min: Point2, max: Point2, expected_vertices: usize) -> Self {
        let mut vertices = StorageMap::with_key();
        let outer = vertices.insert(Vertex::outer(min.midpoint(&max)));
        Self {
            vertices,
            triangles: StorageMap::with_key(),
            outer,
            index: SpatialIndex::for_extent(min, max, expected_vertices),
            boundary_edges: FastHashSet::default(),
            outer_tagged: false,
        }
    }

    // -------------------------------------------------------------------------
    // Storage access
    // -------------------------------------------------------------------------

    /// Key of the sentinel outer vertex.
    #[inline]
    #[must_use]
    pub const fn outer_vertex(&self) -> VertexKey {
        self.outer
    }

    /// Returns `true` if `v` is the sentinel at infinity.
    #[inline]
    #[must_use]
    pub fn is_outer_vertex(&self, v: VertexKey) -> bool {
        v == self.outer
    }

    /// Vertex behind `key`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::VertexNotFound`] for a stale key.
    pub fn vertex(&self, key: VertexKey) -> Result<&Vertex, MeshError> {
        self.vertices.get(key).ok_or(MeshError::VertexNotFound { key })
    }

    /// Mutable vertex behind `key`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::VertexNotFound`] for a stale key.
    pub fn vertex_mut(&mut self, key: VertexKey) -> Result<&mut Vertex, MeshError> {
        self.vertices.get_mut(key).ok_or(MeshError::VertexNotFound { key })
    }

    /// Triangle behind `key`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::TriangleNotFound`] for a stale key.
    pub fn triangle(&self, key: TriangleKey) -> Result<&Triangle, MeshError> {
        self.triangles.get(key).ok_or(MeshError::TriangleNotFound { key })
    }

    fn triangle_mut(&mut self, key: TriangleKey) -> Result<&mut Triangle, MeshError> {
        self.triangles.get_mut(key).ok_or(MeshError::TriangleNotFound { key })
    }

    /// Returns `true` if `key` names a live triangle.
    #[must_use]
    pub fn contains_triangle(&self, key: TriangleKey) -> bool {
        self.triangles.contains_key(key)
    }

    /// Parametric position of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::VertexNotFound`] for a stale key.
    pub fn uv(&self, key: VertexKey) -> Result<Point2, MeshError> {
        Ok(*self.vertex(key)?.uv())
    }

    /// Metric tensor cached on `key`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::VertexNotFound`] for a stale key.
    pub fn metric(&self, key: VertexKey) -> Result<Metric2D, MeshError> {
        Ok(self.vertex(key)?.metric)
    }

    /// Stores a vertex without attaching it to the triangulation.
    pub fn add_vertex(&mut self, vertex: Vertex) -> VertexKey {
        self.vertices.insert(vertex)
    }

    /// Removes a vertex that was never attached to a triangle.
    ///
    /// Returns `false` if the vertex is linked or unknown.
    pub fn remove_unlinked_vertex(&mut self, key: VertexKey) -> bool {
        match self.vertices.get(key) {
            Some(v) if v.link.is_none() && !v.is_outer() => {
                self.vertices.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Real vertices, without the outer sentinel.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexKey, &Vertex)> {
        self.vertices.iter().filter(|(_, v)| !v.is_outer())
    }

    /// All triangles, including the outer shell.
    pub fn triangles(&self) -> impl Iterator<Item = (TriangleKey, &Triangle)> {
        self.triangles.iter()
    }

    /// Triangles inside the face: no outer vertex and no OUTER tag.
    pub fn inner_triangles(&self) -> impl Iterator<Item = (TriangleKey, &Triangle)> {
        self.triangles
            .iter()
            .filter(|(_, t)| !t.contains_vertex(self.outer) && !t.is_outer_tagged())
    }

    /// Keys of all triangles, collected so that the mesh can be mutated while
    /// iterating.
    #[must_use]
    pub fn triangle_keys(&self) -> Vec<TriangleKey> {
        self.triangles.keys().collect()
    }

    /// Number of real vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() - 1
    }

    /// Number of triangles, including the outer shell.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Returns `true` if `t` has the outer vertex as a corner.
    ///
    /// # Errors
    ///
    /// Fails on a stale key.
    pub fn touches_outer_vertex(&self, t: TriangleKey) -> Result<bool, MeshError> {
        Ok(self.triangle(t)?.contains_vertex(self.outer))
    }

    /// Returns `true` once the flood fill tagged the triangles outside the face.
    #[must_use]
    pub const fn is_outer_tagged(&self) -> bool {
        self.outer_tagged
    }

    pub(crate) const fn set_outer_tagged(&mut self) {
        self.outer_tagged = true;
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    /// Opposite half-edge.
    ///
    /// # Errors
    ///
    /// Fails on a stale key or an open edge.
    pub fn sym(&self, he: HalfEdge) -> Result<HalfEdge, MeshError> {
        self.triangle(he.triangle)?
            .neighbor(he.index())
            .ok_or(MeshError::UnlinkedEdge { edge: he })
    }

    /// Start vertex of `he`.
    ///
    /// # Errors
    ///
    /// Fails on a stale key.
    pub fn origin(&self, he: HalfEdge) -> Result<VertexKey, MeshError> {
        Ok(self.triangle(he.triangle)?.vertex(he.index() + 1))
    }

    /// End vertex of `he`.
    ///
    /// # Errors
    ///
    /// Fails on a stale key.
    pub fn destination(&self, he: HalfEdge) -> Result<VertexKey, MeshError> {
        Ok(self.triangle(he.triangle)?.vertex(he.index() + 2))
    }

    /// Vertex opposite `he` in its triangle.
    ///
    /// # Errors
    ///
    /// Fails on a stale key.
    pub fn apex(&self, he: HalfEdge) -> Result<VertexKey, MeshError> {
        Ok(self.triangle(he.triangle)?.vertex(he.index()))
    }

    /// Attribute bits on this side of `he`.
    ///
    /// # Errors
    ///
    /// Fails on a stale key.
    pub fn edge_attributes(&self, he: HalfEdge) -> Result<EdgeAttributes, MeshError> {
        Ok(self.triangle(he.triangle)?.attributes(he.index()))
    }

    /// Sets `flags` on both sides of `he`.
    ///
    /// # Errors
    ///
    /// Fails on a stale key or an open edge.
    pub fn insert_edge_attributes(&mut self, he: HalfEdge, flags: EdgeAttributes) -> Result<(), MeshError> {
        let sym = self.sym(he)?;
        self.triangle_mut(he.triangle)?.attributes[he.index()].insert(flags);
        self.triangle_mut(sym.triangle)?.attributes[sym.index()].insert(flags);
        Ok(())
    }

    /// Clears `flags` on both sides of `he`.
    ///
    /// # Errors
    ///
    /// Fails on a stale key or an open edge.
    pub fn remove_edge_attributes(&mut self, he: HalfEdge, flags: EdgeAttributes) -> Result<(), MeshError> {
        let sym = self.sym(he)?;
        self.triangle_mut(he.triangle)?.attributes[he.index()].remove(flags);
        self.triangle_mut(sym.triangle)?.attributes[sym.index()].remove(flags);
        Ok(())
    }

    /// Sets `flags` on one side of `he` only.
    pub(crate) fn insert_half_edge_attributes(&mut self, he: HalfEdge, flags: EdgeAttributes) -> Result<(), MeshError> {
        self.triangle_mut(he.triangle)?.attributes[he.index()].insert(flags);
        Ok(())
    }

    /// Clears `flags` on every edge of the mesh.
    pub fn clear_attributes(&mut self, flags: EdgeAttributes) {
        for tri in self.triangles.values_mut() {
            for attr in &mut tri.attributes {
                attr.remove(flags);
            }
        }
    }

    /// Group id of `t`.
    ///
    /// # Errors
    ///
    /// Fails on a stale key.
    pub fn group(&self, t: TriangleKey) -> Result<Option<u32>, MeshError> {
        Ok(self.triangle(t)?.group)
    }

    /// Assigns a group id to `t`.
    ///
    /// # Errors
    ///
    /// Fails on a stale key.
    pub fn set_group(&mut self, t: TriangleKey, group: Option<u32>) -> Result<(), MeshError> {
        self.triangle_mut(t)?.group = group;
        Ok(())
    }

    /// Half-edges leaving `v`, one per incident triangle, in rotational order.
    ///
    /// # Errors
    ///
    /// Fails if `v` is unknown or unlinked, or if the fan does not close.
    pub fn triangles_around(&self, v: VertexKey) -> Result<SmallBuffer<HalfEdge, FAN_INLINE_CAPACITY>, MeshError> {
        let start = self.vertex(v)?.link.ok_or(MeshError::UnlinkedVertex { key: v })?;
        let i = self
            .triangle(start)?
            .index_of(v)
            .ok_or(MeshError::UnlinkedVertex { key: v })?;
        let first = HalfEdge::new(start, i + 2);
        let mut fan = SmallBuffer::new();
        let mut he = first;
        loop {
            fan.push(he);
            if fan.len() > self.triangles.len() {
                return Err(MeshError::OpenFan { key: v });
            }
            // the incoming edge of this triangle; its twin leaves `v`
            he = self.sym(he.prev())?;
            if he == first {
                return Ok(fan);
            }
        }
    }

    /// Half-edge running from `a` to `b`, if the mesh has that edge.
    ///
    /// # Errors
    ///
    /// Fails if the fan around `a` cannot be walked.
    pub fn find_edge(&self, a: VertexKey, b: VertexKey) -> Result<Option<HalfEdge>, MeshError> {
        for he in self.triangles_around(a)? {
            if self.destination(he)? == b {
                return Ok(Some(he));
            }
        }
        Ok(None)
    }

    // -------------------------------------------------------------------------
    // Geometry helpers
    // -------------------------------------------------------------------------

    /// Orientation of three vertices in the parameter plane.
    ///
    /// # Errors
    ///
    /// Fails on a stale key.
    pub fn orient(&self, a: VertexKey, b: VertexKey, c: VertexKey) -> Result<Orientation, MeshError> {
        Ok(orientation(self.vertex(a)?.uv(), self.vertex(b)?.uv(), self.vertex(c)?.uv()))
    }

    /// A corner triple is acceptable if it involves the outer vertex or is
    /// strictly counter-clockwise.
    fn acceptable(&self, corners: &[VertexKey; 3]) -> Result<bool, MeshError> {
        if corners.contains(&self.outer) {
            return Ok(true);
        }
        Ok(self.orient(corners[0], corners[1], corners[2])?.is_positive())
    }

    /// Nearest inserted vertex to `uv`.
    #[must_use]
    pub fn nearest_vertex(&self, uv: Point2) -> Option<VertexKey> {
        if self.index.is_usable() {
            return self.index.nearest(uv);
        }
        self.vertices
            .iter()
            .filter(|(_, v)| !v.is_outer() && v.link.is_some())
            .min_by(|(_, a), (_, b)| uv.distance(a.uv()).total_cmp(&uv.distance(b.uv())))
            .map(|(k, _)| k)
    }

    /// Visits inserted vertices inside `uv ± half_extent`.
    ///
    /// The visitor returns `false` to stop.
    pub fn for_each_vertex_near<F>(&self, uv: Point2, half_extent: [f64; 2], mut f: F)
    where
        F: FnMut(VertexKey, &Vertex) -> bool,
    {
        if self.index.is_usable() {
            self.index.for_each_in_box(uv, half_extent, |key, _| {
                self.vertices.get(key).is_none_or(|v| f(key, v))
            });
            return;
        }
        for (key, v) in &self.vertices {
            if v.is_outer() || v.link.is_none() {
                continue;
            }
            let p = v.uv();
            if (p.u - uv.u).abs() <= half_extent[0] && (p.v - uv.v).abs() <= half_extent[1] && !f(key, v) {
                return;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Boundary bookkeeping
    // -------------------------------------------------------------------------

    fn edge_key(a: VertexKey, b: VertexKey) -> (VertexKey, VertexKey) {
        if a < b { (a, b) } else { (b, a) }
    }

    pub(crate) fn record_boundary_edge(&mut self, a: VertexKey, b: VertexKey) {
        self.boundary_edges.insert(Self::edge_key(a, b));
    }

    /// Returns `true` if `a-b` was forced as a boundary edge.
    #[must_use]
    pub fn is_boundary_edge(&self, a: VertexKey, b: VertexKey) -> bool {
        self.boundary_edges.contains(&Self::edge_key(a, b))
    }

    /// Forced boundary edges as unordered vertex pairs.
    pub fn boundary_edges(&self) -> impl Iterator<Item = (VertexKey, VertexKey)> + '_ {
        self.boundary_edges.iter().copied()
    }

    // -------------------------------------------------------------------------
    // Mutators
    // -------------------------------------------------------------------------

    fn set_neighbor(&mut self, he: HalfEdge, neighbor: HalfEdge) -> Result<(), MeshError> {
        self.triangle_mut(he.triangle)?.neighbors[he.index()] = Some(neighbor);
        Ok(())
    }

    fn pair(&mut self, a: HalfEdge, b: HalfEdge) -> Result<(), MeshError> {
        self.set_neighbor(a, b)?;
        self.set_neighbor(b, a)
    }

    fn attach(&mut self, v: VertexKey, t: TriangleKey) -> Result<(), MeshError> {
        let uv = {
            let vertex = self.vertex_mut(v)?;
            vertex.link = Some(t);
            *vertex.uv()
        };
        if v != self.outer {
            self.index.insert(v, uv);
        }
        Ok(())
    }

    fn relink_if(&mut self, v: VertexKey, from: TriangleKey, to: TriangleKey) -> Result<(), MeshError> {
        let vertex = self.vertex_mut(v)?;
        if vertex.link == Some(from) {
            vertex.link = Some(to);
        }
        Ok(())
    }

    /// Points the back-link of `v` at `t`, which must be incident to it.
    pub(crate) fn set_link(&mut self, v: VertexKey, t: TriangleKey) -> Result<(), MeshError> {
        if !self.triangle(t)?.contains_vertex(v) {
            return Err(MeshError::UnlinkedVertex { key: v });
        }
        self.vertex_mut(v)?.link = Some(t);
        Ok(())
    }

    fn ensure_detached(&self, v: VertexKey) -> Result<Point2, MeshError> {
        let vertex = self.vertex(v)?;
        if vertex.link.is_some() || vertex.is_outer() {
            return Err(MeshError::VertexAlreadyLinked { key: v });
        }
        Ok(*vertex.uv())
    }

    /// Creates the first triangle `(a, b, c)` and the three outer triangles
    /// closing it into a sphere.
    ///
    /// # Errors
    ///
    /// Fails if the mesh already has triangles or `(a, b, c)` is not strictly
    /// counter-clockwise.
    pub fn bootstrap(&mut self, a: VertexKey, b: VertexKey, c: VertexKey) -> Result<TriangleKey, MeshError> {
        if !self.triangles.is_empty() {
            return Err(MeshError::AlreadyBootstrapped);
        }
        for v in [a, b, c] {
            self.ensure_detached(v)?;
        }
        if !self.orient(a, b, c)?.is_positive() {
            return Err(MeshError::DegenerateBootstrap);
        }

        let corners = [a, b, c];
        let inner = self.triangles.insert(Triangle::new(corners));
        let mut shell = [inner; 3];
        for (i, slot) in shell.iter_mut().enumerate() {
            let origin = corners[(i + 1) % 3];
            let destination = corners[(i + 2) % 3];
            *slot = self.triangles.insert(Triangle::new([self.outer, destination, origin]));
        }
        for i in 0..3 {
            self.pair(HalfEdge::new(inner, i), HalfEdge::new(shell[i], 0))?;
            self.pair(HalfEdge::new(shell[i], 2), HalfEdge::new(shell[(i + 1) % 3], 1))?;
        }
        for v in corners {
            self.attach(v, inner)?;
        }
        self.vertex_mut(self.outer)?.link = Some(shell[0]);
        Ok(inner)
    }

    /// Splits triangle `t` into three around the detached vertex `v`.
    ///
    /// Triangle `k` of the result replaces corner `k` of `t` by `v` and keeps
    /// edge `k` of `t` with its neighbor and attributes; the first one reuses
    /// the key `t`. Outer triangles are split like any other as long as the
    /// flood fill has not tagged them.
    ///
    /// # Errors
    ///
    /// Fails without modifying the mesh if `v` is not strictly inside `t`,
    /// `t` is tagged OUTER, or a key is stale.
    pub fn split3(&mut self, t: TriangleKey, v: VertexKey) -> Result<[TriangleKey; 3], MeshError> {
        let uv = self.ensure_detached(v)?;
        let old = self.triangle(t)?.clone();
        if old.is_outer_tagged() {
            return Err(MeshError::SplitOuterTriangle { key: t });
        }
        let corners: [[VertexKey; 3]; 3] = std::array::from_fn(|k| {
            let mut c = old.vertices;
            c[k] = v;
            c
        });
        for c in &corners {
            if !self.acceptable(c)? {
                return Err(MeshError::PointNotInside { uv });
            }
        }

        let keys = [
            t,
            self.triangles.insert(Triangle::new(corners[1])),
            self.triangles.insert(Triangle::new(corners[2])),
        ];
        let inner_bits = old.attributes[0] & EdgeAttributes::OUTER;
        for k in 0..3 {
            let tri = self.triangle_mut(keys[k])?;
            tri.vertices = corners[k];
            tri.group = old.group;
            for j in 0..3 {
                if j == k {
                    tri.neighbors[j] = old.neighbors[k];
                    tri.attributes[j] = old.attributes[k];
                } else {
                    tri.neighbors[j] = Some(HalfEdge::new(keys[j], k));
                    tri.attributes[j] = inner_bits;
                }
            }
        }
        for k in 1..3 {
            if let Some(n) = old.neighbors[k] {
                self.set_neighbor(n, HalfEdge::new(keys[k], k))?;
            }
        }
        self.relink_if(old.vertices[0], t, keys[1])?;
        self.attach(v, t)?;
        tracing::trace!("[mesh] split3 {t:?} at {uv}");
        Ok(keys)
    }

    /// Splits the edge `he` and both triangles sharing it around the
    /// detached vertex `v`, which must lie on the edge.
    ///
    /// Attributes of the split edge are copied to both halves and a recorded
    /// boundary edge is replaced by its two halves.
    ///
    /// # Errors
    ///
    /// Fails without modifying the mesh if one of the four new triangles would
    /// be inverted or flat, both sides are tagged OUTER, or a key is stale.
    pub fn split_edge(&mut self, he: HalfEdge, v: VertexKey) -> Result<[TriangleKey; 4], MeshError> {
        let uv = self.ensure_detached(v)?;
        let sym = self.sym(he)?;
        let (t, i) = (he.triangle, he.index());
        let (t2, j) = (sym.triangle, sym.index());
        let old = self.triangle(t)?.clone();
        let old2 = self.triangle(t2)?.clone();
        if old.is_outer_tagged() && old2.is_outer_tagged() {
            return Err(MeshError::SplitOuterTriangle { key: t });
        }
        let (i1, i2) = ((i + 1) % 3, (i + 2) % 3);
        let (j1, j2) = ((j + 1) % 3, (j + 2) % 3);
        let origin = old.vertices[i1];
        let destination = old.vertices[i2];

        let mut kept = old.vertices;
        kept[i2] = v;
        let mut added = old.vertices;
        added[i1] = v;
        let mut kept2 = old2.vertices;
        kept2[j2] = v;
        let mut added2 = old2.vertices;
        added2[j1] = v;
        for c in [&kept, &added, &kept2, &added2] {
            if !self.acceptable(c)? {
                return Err(MeshError::PointNotInside { uv });
            }
        }

        let tn = self.triangles.insert(Triangle::new(added));
        let t2n = self.triangles.insert(Triangle::new(added2));
        let bits = old.attributes[0] & EdgeAttributes::OUTER;
        let bits2 = old2.attributes[0] & EdgeAttributes::OUTER;
        let split_attr = old.attributes[i];
        let split_attr2 = old2.attributes[j];

        {
            let tri = self.triangle_mut(t)?;
            tri.vertices = kept;
            tri.neighbors[i] = Some(HalfEdge::new(t2n, j));
            tri.attributes[i] = split_attr;
            tri.neighbors[i1] = Some(HalfEdge::new(tn, i2));
            tri.attributes[i1] = bits;
        }
        {
            let tri = self.triangle_mut(tn)?;
            tri.group = old.group;
            tri.neighbors[i] = Some(HalfEdge::new(t2, j));
            tri.attributes[i] = split_attr;
            tri.neighbors[i1] = old.neighbors[i1];
            tri.attributes[i1] = old.attributes[i1];
            tri.neighbors[i2] = Some(HalfEdge::new(t, i1));
            tri.attributes[i2] = bits;
        }
        {
            let tri = self.triangle_mut(t2)?;
            tri.vertices = kept2;
            tri.neighbors[j] = Some(HalfEdge::new(tn, i));
            tri.attributes[j] = split_attr2;
            tri.neighbors[j1] = Some(HalfEdge::new(t2n, j2));
            tri.attributes[j1] = bits2;
        }
        {
            let tri = self.triangle_mut(t2n)?;
            tri.group = old2.group;
            tri.neighbors[j] = Some(HalfEdge::new(t, i));
            tri.attributes[j] = split_attr2;
            tri.neighbors[j1] = old2.neighbors[j1];
            tri.attributes[j1] = old2.attributes[j1];
            tri.neighbors[j2] = Some(HalfEdge::new(t2, j1));
            tri.attributes[j2] = bits2;
        }
        if let Some(n) = old.neighbors[i1] {
            self.set_neighbor(n, HalfEdge::new(tn, i1))?;
        }
        if let Some(n) = old2.neighbors[j1] {
            self.set_neighbor(n, HalfEdge::new(t2n, j1))?;
        }

        self.relink_if(destination, t, tn)?;
        self.relink_if(origin, t2, t2n)?;
        self.attach(v, t)?;

        if self.boundary_edges.remove(&Self::edge_key(origin, destination)) {
            self.record_boundary_edge(origin, v);
            self.record_boundary_edge(v, destination);
        }
        tracing::trace!("[mesh] split_edge {he} at {uv}");
        Ok([t, tn, t2, t2n])
    }

    /// Flips the diagonal of the quadrilateral formed by the two triangles
    /// sharing `he`.
    ///
    /// Returns the new diagonal, oriented from the apex of `sym(he)` to the
    /// apex of `he` and owned by `he.triangle`, or `None` when the
    /// quadrilateral is not strictly convex and nothing changed. Edges
    /// attached to the outer vertex may be flipped; only the new triangles
    /// without the outer vertex are checked.
    ///
    /// # Errors
    ///
    /// [`MeshError::BoundarySwap`] for a BOUNDARY edge, or a stale key.
    pub fn swap(&mut self, he: HalfEdge) -> Result<Option<HalfEdge>, MeshError> {
        let sym = self.sym(he)?;
        let (t, i) = (he.triangle, he.index());
        let (t2, j) = (sym.triangle, sym.index());
        let old = self.triangle(t)?.clone();
        let old2 = self.triangle(t2)?.clone();
        if (old.attributes[i] | old2.attributes[j]).contains(EdgeAttributes::BOUNDARY) {
            return Err(MeshError::BoundarySwap { edge: he });
        }
        let (i1, i2) = ((i + 1) % 3, (i + 2) % 3);
        let (j1, j2) = ((j + 1) % 3, (j + 2) % 3);
        let a = old.vertices[i];
        let o = old.vertices[i1];
        let d = old.vertices[i2];
        let b = old2.vertices[j];
        if a == b {
            return Ok(None);
        }

        let mut first = [a; 3];
        first[i] = o;
        first[i1] = b;
        first[i2] = a;
        let mut second = [b; 3];
        second[j] = d;
        second[j1] = a;
        second[j2] = b;
        if !self.acceptable(&first)? || !self.acceptable(&second)? {
            return Ok(None);
        }

        let diagonal_bits = old.attributes[i] & EdgeAttributes::OUTER;
        {
            let tri = self.triangle_mut(t)?;
            tri.vertices = first;
            tri.neighbors[i] = Some(sym);
            tri.attributes[i] = diagonal_bits;
            tri.neighbors[i1] = old.neighbors[i2];
            tri.attributes[i1] = old.attributes[i2];
            tri.neighbors[i2] = old2.neighbors[j1];
            tri.attributes[i2] = old2.attributes[j1];
        }
        {
            let tri = self.triangle_mut(t2)?;
            tri.vertices = second;
            tri.neighbors[j] = Some(he);
            tri.attributes[j] = diagonal_bits;
            tri.neighbors[j1] = old2.neighbors[j2];
            tri.attributes[j1] = old2.attributes[j2];
            tri.neighbors[j2] = old.neighbors[i1];
            tri.attributes[j2] = old.attributes[i1];
        }
        for (n, target) in [
            (old.neighbors[i2], HalfEdge::new(t, i1)),
            (old2.neighbors[j1], HalfEdge::new(t, i2)),
            (old2.neighbors[j2], HalfEdge::new(t2, j1)),
            (old.neighbors[i1], HalfEdge::new(t2, j2)),
        ] {
            if let Some(n) = n {
                self.set_neighbor(n, target)?;
            }
        }
        self.vertex_mut(o)?.link = Some(t);
        self.vertex_mut(d)?.link = Some(t2);
        Ok(Some(he))
    }

    // -------------------------------------------------------------------------
    // Reports
    // -------------------------------------------------------------------------

    /// Edge lengths under the vertex metrics and 3D angles of the inner
    /// triangles.
    #[must_use]
    pub fn quality_stats(&self) -> QualityStats {
        let mut stats = QualityStats {
            triangles: 0,
            min_edge_length: f64::INFINITY,
            max_edge_length: 0.0,
            min_angle_degrees: 180.0,
        };
        for (_, tri) in self.inner_triangles() {
            let corners: Vec<&Vertex> = tri.vertices.iter().filter_map(|&k| self.vertices.get(k)).collect();
            if corners.len() != 3 {
                continue;
            }
            stats.triangles += 1;
            for k in 0..3 {
                let p = corners[k];
                let q = corners[(k + 1) % 3];
                let r = corners[(k + 2) % 3];
                let l = edge_length(p.uv(), &p.metric, q.uv(), &q.metric);
                stats.min_edge_length = stats.min_edge_length.min(l);
                stats.max_edge_length = stats.max_edge_length.max(l);
                let e1 = q.position() - p.position();
                let e2 = r.position() - p.position();
                if e1.norm() > 0.0 && e2.norm() > 0.0 {
                    stats.min_angle_degrees = stats.min_angle_degrees.min(e1.angle(&e2).to_degrees());
                }
            }
        }
        stats
    }
}

// =============================================================================
// TESTS
// =============================================================================
