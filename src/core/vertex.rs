//! Mesh vertices in the parameter plane.
//!
//! A [`Vertex`] carries its parametric coordinates, a cached 3D position on
//! the surface, the anisotropic metric used to size edges around it and a
//! back-link to one incident triangle. The back-link is maintained by the
//! [`Mesh`](crate::core::mesh::Mesh) mutators and makes point location start
//! next to the target instead of at an arbitrary triangle.
//!
//! # Examples
//!
//! ```rust
//! use patchmesh::core::vertex::{Vertex, VertexBuilder, VertexKind};
//! use patchmesh::geometry::point::{Point2, Point3};
//!
//! let v: Vertex = VertexBuilder::default()
//!     .uv(Point2::new(0.5, 0.25))
//!     .position(Point3::new(0.5, 0.25, 0.0))
//!     .build()
//!     .unwrap();
//! assert_eq!(v.kind(), VertexKind::Regular);
//! assert!(v.is_mutable());
//! assert!(v.link().is_none());
//! ```

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

use crate::core::triangle::TriangleKey;
use crate::geometry::metric::Metric2D;
use crate::geometry::point::{Point2, Point3};

new_key_type! {
    /// Key of a vertex in the mesh's vertex storage.
    ///
    /// Keys stay valid while the vertex exists; the outer sentinel has a key
    /// like any other vertex and is told apart by [`VertexKind::Outer`].
    pub struct VertexKey;
}

/// Convenience macro building a regular vertex at `(u, v)` with the 3D
/// position `(u, v, 0)`.
///
/// # Panics
///
/// Never in practice: every field the builder requires is supplied.
///
/// ```rust
/// use patchmesh::vertex;
///
/// let v = vertex!([1.0, 2.0]);
/// assert_eq!(v.uv().u, 1.0);
/// ```
#[macro_export]
macro_rules! vertex {
    ($uv:expr) => {{
        let [u, v]: [f64; 2] = $uv;
        $crate::core::vertex::VertexBuilder::default()
            .uv($crate::geometry::point::Point2::new(u, v))
            .position($crate::geometry::point::Point3::new(u, v, 0.0))
            .build()
            .expect("vertex builder received every required field")
    }};
}

pub use crate::vertex;

/// Distinguishes real vertices from the sentinel at infinity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexKind {
    /// A vertex with meaningful coordinates.
    #[default]
    Regular,
    /// The single sentinel standing for the point at infinity. Its
    /// coordinates are a debugging aid and never enter a predicate.
    Outer,
}

/// Link from a vertex back to the CAD entity it was sampled from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexRef {
    /// Sample of the boundary curve with this id.
    Curve(u32),
    /// Degenerate point (a collapsed curve, such as a cone apex) with this id.
    Degenerate(u32),
}

/// A vertex of the surface mesh.
#[derive(Builder, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Vertex {
    /// Parametric coordinates.
    uv: Point2,
    /// Cached 3D position on the surface.
    position: Point3,
    /// Real vertex or outer sentinel.
    #[builder(default)]
    kind: VertexKind,
    /// Immutable vertices may never move or be removed.
    #[builder(default = "true")]
    mutable: bool,
    /// One triangle incident to this vertex, maintained by the mesh.
    ///
    /// Not serialized; keys are only meaningful inside one storage map.
    #[builder(setter(skip), default = "None")]
    #[serde(skip)]
    pub(crate) link: Option<TriangleKey>,
    /// Optional origin of the vertex on the CAD boundary.
    #[builder(setter(strip_option), default)]
    reference: Option<VertexRef>,
    /// Local size metric.
    #[builder(default)]
    pub metric: Metric2D,
}

impl Vertex {
    /// Creates a regular vertex with an identity metric.
    #[must_use]
    pub fn new(uv: Point2, position: Point3) -> Self {
        Self {
            uv,
            position,
            kind: VertexKind::Regular,
            mutable: true,
            link: None,
            reference: None,
            metric: Metric2D::identity(),
        }
    }

    /// Creates the outer sentinel. `debug_uv` only helps when printing.
    #[must_use]
    pub fn outer(debug_uv: Point2) -> Self {
        Self {
            uv: debug_uv,
            position: Point3::origin(),
            kind: VertexKind::Outer,
            mutable: false,
            link: None,
            reference: None,
            metric: Metric2D::identity(),
        }
    }

    /// Parametric coordinates.
    #[inline]
    #[must_use]
    pub const fn uv(&self) -> &Point2 {
        &self.uv
    }

    /// Cached 3D position.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> &Point3 {
        &self.position
    }

    /// Updates the cached 3D position.
    pub const fn set_position(&mut self, position: Point3) {
        self.position = position;
    }

    /// Origin of the vertex.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> VertexKind {
        self.kind
    }

    /// Returns `true` for the sentinel at infinity.
    #[inline]
    #[must_use]
    pub const fn is_outer(&self) -> bool {
        matches!(self.kind, VertexKind::Outer)
    }

    /// Returns `false` once the vertex is frozen.
    #[inline]
    #[must_use]
    pub const fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Marks the vertex as fixed.
    pub const fn freeze(&mut self) {
        self.mutable = false;
    }

    /// Incident triangle recorded for point location.
    #[inline]
    #[must_use]
    pub const fn link(&self) -> Option<TriangleKey> {
        self.link
    }

    /// CAD entity this vertex was sampled from, if any.
    #[inline]
    #[must_use]
    pub const fn reference(&self) -> Option<VertexRef> {
        self.reference
    }

    /// Records the CAD entity this vertex was sampled from.
    pub const fn set_reference(&mut self, reference: Option<VertexRef>) {
        self.reference = reference;
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            VertexKind::Outer => write!(f, "<outer>"),
            VertexKind::Regular => write!(f, "{}", self.uv),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_builder_defaults() {
        let v = VertexBuilder::default()
            .uv(Point2::new(1.0, 2.0))
            .position(Point3::new(1.0, 2.0, 3.0))
            .reference(VertexRef::Curve(7))
            .build()
            .unwrap();
        assert_eq!(v.kind(), VertexKind::Regular);
        assert!(v.is_mutable());
        assert_eq!(v.reference(), Some(VertexRef::Curve(7)));
        assert_eq!(v.metric, Metric2D::identity());
        assert_eq!(v.position().z, 3.0);
    }

    #[test]
    fn test_vertex_builder_requires_uv() {
        let result = VertexBuilder::default().position(Point3::origin()).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_outer_vertex_is_frozen_and_displayed() {
        let v = Vertex::outer(Point2::new(0.5, 0.5));
        assert!(v.is_outer());
        assert!(!v.is_mutable());
        assert_eq!(format!("{v}"), "<outer>");

        let mut w = vertex!([0.0, 1.0]);
        assert!(!w.is_outer());
        w.freeze();
        assert!(!w.is_mutable());
    }

    #[test]
    fn test_vertex_serialization_skips_link() {
        let v = vertex!([0.25, 0.75]);
        let json = serde_json::to_string(&v).unwrap();
        assert!(!json.contains("link"));
        let back: Vertex = serde_json::from_str(&json).unwrap();
        assert_eq!(back.uv(), v.uv());
        assert!(back.link().is_none());
    }
}
