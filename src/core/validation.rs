//! Structural and geometric validation of a [`Mesh`].
//!
//! [`Mesh::validate`] checks, in order:
//! 1. neighbor links are symmetric and agree on the shared vertices
//! 2. every vertex back-link points at an incident triangle
//! 3. every triangle inside the face is counter-clockwise
//! 4. every recorded wire segment is a mesh edge tagged BOUNDARY
//! 5. inside and outside triangles meet only across BOUNDARY edges
//! 6. every flippable edge inside the face passes the in-circle test
//!
//! The first failure is returned.

#![forbid(unsafe_code)]

use thiserror::Error;

use crate::core::algorithms::flips::{is_flip_candidate, violates_delaunay};
use crate::core::half_edge::HalfEdge;
use crate::core::mesh::{Mesh, MeshError};
use crate::core::triangle::{EdgeAttributes, TriangleKey};
use crate::core::vertex::VertexKey;
use crate::geometry::predicates::Orientation;

/// Invariant violated by a mesh.
///
/// # Examples
///
/// ```rust
/// use patchmesh::core::validation::MeshValidationError;
///
/// let err = MeshValidationError::MissingBoundaryEdge { from: Default::default(), to: Default::default() };
/// assert!(err.to_string().contains("not a BOUNDARY edge"));
/// ```
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum MeshValidationError {
    /// A triangle inside the face is clockwise or flat.
    #[error("Triangle {triangle:?} is {orientation}")]
    InvertedTriangle {
        /// The offending triangle.
        triangle: TriangleKey,
        /// Its orientation.
        orientation: Orientation,
    },
    /// A flippable edge fails the in-circle test.
    #[error("Edge {edge} violates the Delaunay criterion")]
    NonDelaunayEdge {
        /// One side of the edge.
        edge: HalfEdge,
    },
    /// A wire segment is missing or has lost its BOUNDARY tag.
    #[error("Wire segment {from:?}-{to:?} is not a BOUNDARY edge")]
    MissingBoundaryEdge {
        /// First end point.
        from: VertexKey,
        /// Second end point.
        to: VertexKey,
    },
    /// A vertex is unlinked or linked to a triangle not incident to it.
    #[error("Vertex {vertex:?} has a broken back-link")]
    BrokenVertexLink {
        /// The vertex.
        vertex: VertexKey,
    },
    /// Inside and outside triangles meet without a BOUNDARY edge, or a
    /// BOUNDARY edge separates two triangles on the same side.
    #[error("Inconsistent OUTER/BOUNDARY tagging at {edge}")]
    InconsistentTagging {
        /// One side of the edge.
        edge: HalfEdge,
    },
    /// Two triangles disagree on their shared edge.
    #[error("Asymmetric adjacency at {edge}")]
    AsymmetricAdjacency {
        /// One side of the edge.
        edge: HalfEdge,
    },
    /// Navigation failed.
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

impl Mesh {
    /// Checks every mesh invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
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
    /// assert!(mesh.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), MeshValidationError> {
        self.validate_adjacency()?;
        self.validate_links()?;
        self.validate_orientation()?;
        self.validate_boundary_edges()?;
        if self.is_outer_tagged() {
            self.validate_tagging()?;
        }
        self.validate_delaunay()
    }

    /// Returns `true` if [`Mesh::validate`] finds nothing.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    fn validate_adjacency(&self) -> Result<(), MeshValidationError> {
        for (t, _) in self.triangles() {
            for i in 0..3 {
                let he = HalfEdge::new(t, i);
                let sym = self
                    .sym(he)
                    .map_err(|_| MeshValidationError::AsymmetricAdjacency { edge: he })?;
                let back = self
                    .sym(sym)
                    .map_err(|_| MeshValidationError::AsymmetricAdjacency { edge: he })?;
                if back != he
                    || self.origin(he)? != self.destination(sym)?
                    || self.destination(he)? != self.origin(sym)?
                {
                    return Err(MeshValidationError::AsymmetricAdjacency { edge: he });
                }
            }
        }
        Ok(())
    }

    fn validate_links(&self) -> Result<(), MeshValidationError> {
        if self.triangle_count() == 0 {
            return Ok(());
        }
        let outer = self.outer_vertex();
        let linked = std::iter::once((outer, self.vertex(outer)?)).chain(self.vertices());
        for (key, vertex) in linked {
            let incident = vertex
                .link()
                .and_then(|t| self.triangle(t).ok())
                .is_some_and(|tri| tri.contains_vertex(key));
            if !incident {
                return Err(MeshValidationError::BrokenVertexLink { vertex: key });
            }
        }
        Ok(())
    }

    fn validate_orientation(&self) -> Result<(), MeshValidationError> {
        for (t, tri) in self.inner_triangles() {
            let [a, b, c] = *tri.vertices();
            let orientation = self.orient(a, b, c)?;
            if orientation != Orientation::POSITIVE {
                return Err(MeshValidationError::InvertedTriangle { triangle: t, orientation });
            }
        }
        Ok(())
    }

    fn validate_boundary_edges(&self) -> Result<(), MeshValidationError> {
        for (from, to) in self.boundary_edges() {
            let tagged = match self.find_edge(from, to)? {
                Some(he) => self.edge_attributes(he)?.contains(EdgeAttributes::BOUNDARY),
                None => false,
            };
            if !tagged {
                return Err(MeshValidationError::MissingBoundaryEdge { from, to });
            }
        }
        Ok(())
    }

    fn is_outside(&self, t: TriangleKey) -> Result<bool, MeshError> {
        let tri = self.triangle(t)?;
        Ok(tri.is_outer_tagged() || tri.contains_vertex(self.outer_vertex()))
    }

    fn validate_tagging(&self) -> Result<(), MeshValidationError> {
        for (t, tri) in self.triangles() {
            let outside = self.is_outside(t)?;
            let uniform = (0..3).all(|i| tri.attributes(i).contains(EdgeAttributes::OUTER) == outside);
            for i in 0..3 {
                let he = HalfEdge::new(t, i);
                let sym = self.sym(he)?;
                let boundary = (self.edge_attributes(he)? | self.edge_attributes(sym)?)
                    .contains(EdgeAttributes::BOUNDARY);
                if !uniform || (outside != self.is_outside(sym.triangle)?) != boundary {
                    return Err(MeshValidationError::InconsistentTagging { edge: he });
                }
            }
        }
        Ok(())
    }

    fn validate_delaunay(&self) -> Result<(), MeshValidationError> {
        for (t, _) in self.inner_triangles() {
            for i in 0..3 {
                let he = HalfEdge::new(t, i);
                let sym = self.sym(he)?;
                // each edge once
                if sym.triangle < t || !is_flip_candidate(self, he)? || self.is_outside(sym.triangle)? {
                    continue;
                }
                if violates_delaunay(self, he)? {
                    return Err(MeshValidationError::NonDelaunayEdge { edge: he });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::algorithms::boundary_triangulation::{BoundaryConfig, BoundaryTriangulator};
    use crate::core::boundary::BoundaryLoop;
    use crate::geometry::point::Point2;
    use crate::geometry::surface::Plane;
    use crate::vertex;

    fn l_shape() -> Mesh {
        let wire = BoundaryLoop::from_uv(&[[0.0, 0.0], [2.0, 0.0], [2.0, 1.0], [1.0, 1.0], [1.0, 2.0], [0.0, 2.0]]);
        BoundaryTriangulator::new(&Plane::xy(), BoundaryConfig::default())
            .triangulate(&[wire])
            .unwrap()
            .0
    }

    #[test]
    fn test_boundary_triangulation_is_valid() {
        let mesh = l_shape();
        assert!(mesh.is_valid(), "{:?}", mesh.validate());
    }

    #[test]
    fn test_detects_non_delaunay_edge() {
        let mut mesh = Mesh::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0), 8);
        let a = mesh.add_vertex(vertex!([0.0, 0.0]));
        let b = mesh.add_vertex(vertex!([1.0, 0.0]));
        let c = mesh.add_vertex(vertex!([1.0, 1.0]));
        let d = mesh.add_vertex(vertex!([0.1, 1.0]));
        mesh.bootstrap(a, b, c).unwrap();
        let beyond = mesh.find_edge(a, c).unwrap().unwrap().triangle;
        mesh.split3(beyond, d).unwrap();
        assert!(matches!(
            mesh.validate(),
            Err(MeshValidationError::NonDelaunayEdge { .. })
        ));
    }

    #[test]
    fn test_detects_lost_boundary_tag() {
        let mut mesh = l_shape();
        let (from, to) = mesh.boundary_edges().next().unwrap();
        let he = mesh.find_edge(from, to).unwrap().unwrap();
        mesh.remove_edge_attributes(he, EdgeAttributes::BOUNDARY).unwrap();
        assert_eq!(
            mesh.validate(),
            Err(MeshValidationError::MissingBoundaryEdge { from, to })
        );
    }

    #[test]
    fn test_detects_outer_tag_on_inner_triangle() {
        let mut mesh = l_shape();
        let (t, _) = mesh.inner_triangles().next().unwrap();
        let he = HalfEdge::new(t, 0);
        mesh.insert_half_edge_attributes(he, EdgeAttributes::OUTER).unwrap();
        assert!(matches!(
            mesh.validate(),
            Err(MeshValidationError::InconsistentTagging { .. })
        ));
    }
}
