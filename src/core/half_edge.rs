//! Half-edges as plain `(triangle, local index)` values.
//!
//! A [`HalfEdge`] is never stored as a cursor; every navigation step returns
//! a new value. Steps inside one triangle (`next`, `prev`) need no mesh, all
//! other queries read the mesh they are given.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::mesh::{Mesh, MeshError};
use crate::core::triangle::{EdgeAttributes, TriangleKey};
use crate::core::vertex::VertexKey;

/// Directed edge `i` of a triangle, running from vertex `i + 1` to `i + 2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HalfEdge {
    /// Owning triangle.
    pub triangle: TriangleKey,
    index: u8,
}

impl HalfEdge {
    /// Half-edge `index % 3` of `triangle`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(triangle: TriangleKey, index: usize) -> Self {
        Self {
            triangle,
            index: (index % 3) as u8,
        }
    }

    /// Local index in `0..3`.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Next half-edge counter-clockwise in the same triangle.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self::new(self.triangle, self.index() + 1)
    }

    /// Previous half-edge in the same triangle.
    #[inline]
    #[must_use]
    pub const fn prev(self) -> Self {
        Self::new(self.triangle, self.index() + 2)
    }

    /// Opposite half-edge in the neighboring triangle.
    ///
    /// # Errors
    ///
    /// Fails on a stale triangle key or an unlinked edge.
    pub fn sym(self, mesh: &Mesh) -> Result<Self, MeshError> {
        mesh.sym(self)
    }

    /// Start vertex.
    ///
    /// # Errors
    ///
    /// Fails on a stale triangle key.
    pub fn origin(self, mesh: &Mesh) -> Result<VertexKey, MeshError> {
        mesh.origin(self)
    }

    /// End vertex.
    ///
    /// # Errors
    ///
    /// Fails on a stale triangle key.
    pub fn destination(self, mesh: &Mesh) -> Result<VertexKey, MeshError> {
        mesh.destination(self)
    }

    /// Vertex of the owning triangle opposite this edge.
    ///
    /// # Errors
    ///
    /// Fails on a stale triangle key.
    pub fn apex(self, mesh: &Mesh) -> Result<VertexKey, MeshError> {
        mesh.apex(self)
    }

    /// Returns `true` if this side of the edge carries any of `flags`.
    ///
    /// # Errors
    ///
    /// Fails on a stale triangle key.
    pub fn has_attributes(self, mesh: &Mesh, flags: EdgeAttributes) -> Result<bool, MeshError> {
        Ok(mesh.edge_attributes(self)?.intersects(flags))
    }
}

impl fmt::Display for HalfEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.triangle, self.index)
    }
}
