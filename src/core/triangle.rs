//! Triangles of the half-edge mesh and their per-edge attribute bits.
//!
//! Local numbering: edge `i` is the edge opposite vertex `i`. It runs from
//! `vertices[(i + 1) % 3]` to `vertices[(i + 2) % 3]`, and `neighbors[i]` is
//! the half-edge on the other side of it. Vertices are stored in
//! counter-clockwise order in the parameter plane.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::core::half_edge::HalfEdge;
use crate::core::vertex::VertexKey;

new_key_type! {
    /// Key of a triangle in the mesh's triangle storage.
    ///
    /// Triangles are reused in place by splits and swaps, so a key can stay
    /// valid while the vertices behind it change. Compare vertex triples when
    /// identity matters.
    pub struct TriangleKey;
}

/// Attribute bits stored per half-edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeAttributes(u8);

bitflags::bitflags! {
    impl EdgeAttributes: u8 {
        /// Constrained edge on a wire of the face. Never flipped.
        const BOUNDARY = 1;
        /// Edge of a triangle outside the face domain.
        const OUTER = 1 << 1;
        /// Edge shared by more than two faces in the CAD model.
        const NONMANIFOLD = 1 << 2;
        /// Feature edge of the surface.
        const SHARP = 1 << 3;
        /// Edge fixed by a quality pass.
        const IMMUTABLE = 1 << 4;
        /// Scratch mark of the insertion pass.
        const MARKED = 1 << 5;
        /// Scratch mark of the Delaunay sweep.
        const SWAPPED = 1 << 6;

        /// Edges the Delaunay criterion is not enforced on.
        const UNFLIPPABLE = Self::BOUNDARY.bits()
            | Self::OUTER.bits()
            | Self::NONMANIFOLD.bits()
            | Self::SHARP.bits()
            | Self::IMMUTABLE.bits();
        /// Bits that only live for the duration of one algorithm.
        const SCRATCH = Self::MARKED.bits() | Self::SWAPPED.bits();
    }
}

/// A counter-clockwise triangle with its three neighbors.
///
/// A fully built mesh is a closed topological sphere, so every `neighbors`
/// entry is `Some`. Entries are `None` only inside a mutator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub(crate) vertices: [VertexKey; 3],
    pub(crate) neighbors: [Option<HalfEdge>; 3],
    pub(crate) attributes: [EdgeAttributes; 3],
    /// Optional user group id.
    pub group: Option<u32>,
}

impl Triangle {
    /// Triangle without neighbors or attributes.
    #[must_use]
    pub const fn new(vertices: [VertexKey; 3]) -> Self {
        Self {
            vertices,
            neighbors: [None; 3],
            attributes: [EdgeAttributes::empty(); 3],
            group: None,
        }
    }

    /// Vertex keys in counter-clockwise order.
    #[inline]
    #[must_use]
    pub const fn vertices(&self) -> &[VertexKey; 3] {
        &self.vertices
    }

    /// Vertex `i`, opposite edge `i`.
    #[inline]
    #[must_use]
    pub const fn vertex(&self, i: usize) -> VertexKey {
        self.vertices[i % 3]
    }

    /// Half-edge across edge `i`.
    #[inline]
    #[must_use]
    pub const fn neighbor(&self, i: usize) -> Option<HalfEdge> {
        self.neighbors[i % 3]
    }

    /// Half-edges across the three edges.
    #[inline]
    #[must_use]
    pub const fn neighbors(&self) -> &[Option<HalfEdge>; 3] {
        &self.neighbors
    }

    /// Attribute bits of edge `i` on this side.
    #[inline]
    #[must_use]
    pub const fn attributes(&self, i: usize) -> EdgeAttributes {
        self.attributes[i % 3]
    }

    /// Returns `true` if `v` is one of the corners.
    #[must_use]
    pub fn contains_vertex(&self, v: VertexKey) -> bool {
        self.vertices.contains(&v)
    }

    /// Local index of `v`.
    #[must_use]
    pub fn index_of(&self, v: VertexKey) -> Option<usize> {
        self.vertices.iter().position(|&w| w == v)
    }

    /// Local index of the directed edge `origin -> destination`.
    #[must_use]
    pub fn edge_index(&self, origin: VertexKey, destination: VertexKey) -> Option<usize> {
        (0..3).find(|&i| self.vertices[(i + 1) % 3] == origin && self.vertices[(i + 2) % 3] == destination)
    }

    /// Returns `true` once the triangle was tagged as lying outside the face.
    #[must_use]
    pub const fn is_outer_tagged(&self) -> bool {
        self.attributes[0].contains(EdgeAttributes::OUTER)
    }

    /// Returns `true` if any edge carries one of `flags`.
    #[must_use]
    pub fn any_edge_has(&self, flags: EdgeAttributes) -> bool {
        self.attributes.iter().any(|a| a.intersects(flags))
    }
}
