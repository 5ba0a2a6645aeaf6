//! # patchmesh
//!
//! Constrained Delaunay surface meshing of parametric CAD faces.
//!
//! Given the discretized wires of a face and an evaluator of its surface,
//! `patchmesh` builds a triangulation in the parameter plane whose edges
//! follow a target 3D length and whose triangles stay close to the surface.
//!
//! # Features
//!
//! - Exact-sign [`orientation`](geometry::predicates::orientation) and
//!   [`in_circle`](geometry::predicates::in_circle) predicates built on
//!   adaptive expansion arithmetic
//! - Half-edge [`Mesh`](core::mesh::Mesh) closed into a sphere by a sentinel
//!   vertex at infinity
//! - Boundary recovery with inside/outside flood fill, and rejection of
//!   self-intersecting wires
//! - Anisotropic size control through [`Metric2D`](geometry::metric::Metric2D)
//!   tensors derived from the surface
//! - Normal alignment and chordal deflection passes
//! - Serialization of parameters and geometry with [serde](https://serde.rs)
//!
//! # Basic Usage
//!
//! ```rust
//! use patchmesh::prelude::*;
//!
//! // 2 x 1 strip on a cylinder of radius 1: u is the angle, v the height
//! let wire = BoundaryLoop::from_uv(&[[0.0, 0.0], [2.0, 0.0], [2.0, 1.0], [0.0, 1.0]]);
//! let mesher = SurfaceMesher::new(parameter_presets::coarse(0.25));
//!
//! let mesh = mesher.triangulate_face(&Cylinder::new(1.0), &wire).unwrap();
//! assert!(mesh.is_valid());
//! assert!(mesh.inner_triangles().count() > 20);
//! ```
//!
//! Faces are independent. [`SurfaceMesher::triangulate_faces`](mesher::SurfaceMesher::triangulate_faces)
//! meshes a batch and reports the faces it had to skip:
//!
//! ```rust
//! use patchmesh::prelude::*;
//!
//! let plane = Plane::xy();
//! let square = BoundaryLoop::from_uv(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
//! let bowtie = BoundaryLoop::from_uv(&[[0.0, 0.0], [1.0, 1.0], [1.0, 0.0], [0.0, 1.0]]);
//! let faces = [
//!     Face { id: 0, surface: &plane, boundary: &square },
//!     Face { id: 1, surface: &plane, boundary: &bowtie },
//! ];
//!
//! let batch = SurfaceMesher::new(parameter_presets::flat(0.25)).triangulate_faces(&faces);
//! assert_eq!(batch.success_count(), 1);
//! assert!(matches!(batch.error(1), Some(TriangulationError::InconsistentTopology { .. })));
//! ```
//!
//! # Lower-level building blocks
//!
//! Every stage of the pipeline is usable on its own: see
//! [`core::algorithms`] for the boundary triangulator, the swappers and the
//! insertion passes.

// Allow multiple crate versions due to transitive dependencies
#![expect(clippy::multiple_crate_versions)]
#![forbid(unsafe_code)]

#[macro_use]
extern crate derive_builder;

/// Mesh data structures and the algorithms operating on them.
pub mod core {
    /// Triangulation algorithms, from point location to refinement passes.
    pub mod algorithms {
        /// Constrained triangulation of the face boundary
        pub mod boundary_triangulation;
        /// Chordal deflection refinement
        pub mod deflection;
        /// Delaunay edge flips, local and global
        pub mod flips;
        /// Lawson point insertion
        pub mod incremental_insertion;
        /// Point location by walking
        pub mod locate;
        /// Metric-driven interior point insertion
        pub mod metric_insertion;
        /// Normal alignment flips
        pub mod normal_constraint;
    }
    pub mod boundary;
    /// Hash collections and the spatial index
    pub mod collections;
    pub mod half_edge;
    pub mod mesh;
    pub mod triangle;
    pub mod validation;
    pub mod vertex;

    pub use half_edge::*;
    pub use mesh::*;
    pub use triangle::*;
    pub use vertex::*;
}

/// Parametric geometry: points, exact predicates, metrics and surfaces.
pub mod geometry {
    pub mod metric;
    pub mod point;
    pub mod predicates;
    /// Adaptive-precision expansion arithmetic behind the predicates
    pub mod robust_predicates;
    pub mod surface;

    pub use metric::*;
    pub use point::*;
    pub use predicates::*;
    pub use surface::*;
}

pub mod mesher;

/// A prelude module that re-exports commonly used types and macros.
pub mod prelude {
    pub use crate::core::algorithms::boundary_triangulation::{
        BoundaryConfig, BoundaryError, BoundaryStats, BoundaryTriangulator,
    };
    pub use crate::core::algorithms::deflection::{DeflectionConfig, DeflectionEnforcer, DeflectionStats};
    pub use crate::core::algorithms::flips::{DelaunaySwapper, SwapConfig, SwapStats, check_and_swap};
    pub use crate::core::algorithms::incremental_insertion::{
        InsertionError, InsertionOutcome, insert_vertex,
    };
    pub use crate::core::algorithms::locate::{LOCATE_SEED, LocateError, LocateResult, locate};
    pub use crate::core::algorithms::metric_insertion::{
        InsertionConfig, InsertionStats, MetricInsertion, assign_metrics,
    };
    pub use crate::core::algorithms::normal_constraint::{
        NormalConstraintConfig, NormalConstraintSwapper, NormalSwapStats,
    };
    pub use crate::core::boundary::{BoundaryDiscretizer, BoundaryLoop, BoundaryNode, pre_merge};
    pub use crate::core::collections::{FastHashMap, FastHashSet, SmallBuffer};
    pub use crate::core::half_edge::HalfEdge;
    pub use crate::core::mesh::{Mesh, MeshError, QualityStats};
    pub use crate::core::triangle::{EdgeAttributes, Triangle, TriangleKey};
    pub use crate::core::validation::MeshValidationError;
    pub use crate::core::vertex::{Vertex, VertexBuilder, VertexKey, VertexKind, VertexRef};
    pub use crate::geometry::metric::{
        EuclideanMetricField, Metric2D, MetricField, SurfaceMetricField, metric_distance,
    };
    pub use crate::geometry::point::{Point2, Point3, Vector3};
    pub use crate::geometry::predicates::{InCircle, Orientation, in_circle, orientation};
    pub use crate::geometry::surface::{Curvature, Cylinder, GeometryProvider, Plane};
    pub use crate::mesher::{
        BatchReport, Face, FaceReport, MeshingParameters, MeshingParametersBuilder, SurfaceMesher,
        TriangulationError, parameter_presets,
    };

    pub use crate::vertex;
}

/// The function `is_normal` checks that structs implement `auto` traits.
/// Traits are checked at compile time, so this function is only used for
/// testing.
#[must_use]
pub const fn is_normal<T: Sized + Send + Sync + Unpin>() -> bool {
    true
}
