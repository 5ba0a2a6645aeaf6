//! Face-level meshing driver.
//!
//! [`SurfaceMesher`] chains the algorithms of [`crate::core::algorithms`]
//! into the full pipeline for one face:
//!
//! 1. Discretize and pre-merge the wires
//! 2. Build the constrained boundary triangulation
//! 3. Restore the Delaunay criterion under the surface metric
//! 4. Align triangle normals with the surface
//! 5. Insert interior points at each target size
//! 6. Align normals again
//! 7. Refine where the chordal deviation is too large
//! 8. Validate every mesh invariant
//!
//! A face that cannot be meshed yields a [`TriangulationError`];
//! [`SurfaceMesher::triangulate_faces`] records it and moves on.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::algorithms::boundary_triangulation::{
    BoundaryConfig, BoundaryError, BoundaryStats, BoundaryTriangulator,
};
use crate::core::algorithms::deflection::{DeflectionConfig, DeflectionEnforcer, DeflectionStats};
use crate::core::algorithms::flips::{DelaunaySwapper, SwapConfig, SwapStats};
use crate::core::algorithms::incremental_insertion::InsertionError;
use crate::core::algorithms::locate::LocateError;
use crate::core::algorithms::metric_insertion::{
    InsertionConfig, InsertionStats, MetricInsertion, assign_metrics,
};
use crate::core::algorithms::normal_constraint::{
    NormalConstraintConfig, NormalConstraintSwapper, NormalSwapStats,
};
use crate::core::boundary::{BoundaryDiscretizer, BoundaryLoop, pre_merge};
use crate::core::mesh::{Mesh, MeshError, QualityStats};
use crate::core::validation::MeshValidationError;
use crate::geometry::metric::SurfaceMetricField;
use crate::geometry::surface::GeometryProvider;

// =============================================================================
// ERRORS
// =============================================================================

/// Reason a face was not meshed.
///
/// # Examples
///
/// ```rust
/// use patchmesh::core::algorithms::boundary_triangulation::BoundaryError;
/// use patchmesh::mesher::TriangulationError;
///
/// let err = TriangulationError::from(BoundaryError::TooFewPoints { count: 2 });
/// assert!(matches!(err, TriangulationError::InvalidBoundary { .. }));
/// ```
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TriangulationError {
    /// Too few usable points or a flat bounding box.
    #[error("Invalid boundary: {message}")]
    InvalidBoundary {
        /// What was wrong with the wires.
        message: String,
    },
    /// The wires intersect or the inside/outside tagging contradicts itself.
    #[error("Face cannot be triangulated: {message}")]
    InconsistentTopology {
        /// Description of the contradiction.
        message: String,
    },
    /// The finished mesh broke an invariant.
    #[error("Mesh failed validation: {source}")]
    InvalidMesh {
        /// The violated invariant.
        #[from]
        source: MeshValidationError,
    },
    /// Point location failed.
    #[error(transparent)]
    Locate(#[from] LocateError),
    /// A mesh operation failed.
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

impl From<BoundaryError> for TriangulationError {
    fn from(err: BoundaryError) -> Self {
        match err {
            BoundaryError::TooFewPoints { .. }
            | BoundaryError::DegenerateBoundingBox
            | BoundaryError::CollinearBoundary => Self::InvalidBoundary {
                message: err.to_string(),
            },
            BoundaryError::IntersectingBoundary { .. }
            | BoundaryError::EdgeNotForced { .. }
            | BoundaryError::InconsistentTopology { .. } => Self::InconsistentTopology {
                message: err.to_string(),
            },
            BoundaryError::Mesh(source) => Self::Mesh(source),
            BoundaryError::Locate(source) => Self::Locate(source),
        }
    }
}

impl From<InsertionError> for TriangulationError {
    fn from(err: InsertionError) -> Self {
        match err {
            InsertionError::Location(source) => Self::Locate(source),
            InsertionError::Mesh(source) => Self::Mesh(source),
        }
    }
}

// =============================================================================
// PARAMETERS
// =============================================================================

/// Parameters of the meshing pipeline.
///
/// # Examples
///
/// ```rust
/// use patchmesh::mesher::MeshingParametersBuilder;
///
/// let params = MeshingParametersBuilder::default()
///     .length(0.5)
///     .deflection(0.01)
///     .target_sizes(vec![4.0, 1.0])
///     .build()
///     .unwrap();
/// assert_eq!(params.deflection, Some(0.01));
/// assert!(!params.relative_deflection);
///
/// assert!(MeshingParametersBuilder::default().length(-1.0).build().is_err());
/// ```
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(default, build_fn(validate = "Self::validate"))]
pub struct MeshingParameters {
    /// Target 3D edge length.
    pub length: f64,
    /// Chordal deflection tolerance. `None` disables curvature refinement.
    #[builder(setter(strip_option))]
    pub deflection: Option<f64>,
    /// Interpret `deflection` relative to the local length scale.
    pub relative_deflection: bool,
    /// Boundary nodes closer than this in 3D are merged before meshing.
    pub boundary_merge_tolerance: f64,
    /// Successive insertion sizes, in units of `length`, coarsest first.
    #[builder(setter(into))]
    pub target_sizes: Vec<f64>,
    /// Run the normal alignment passes.
    pub enforce_normals: bool,
    /// Options of the metric insertion passes.
    pub insertion: InsertionConfig,
    /// Budget of the Delaunay sweeps.
    pub swap: SwapConfig,
    /// Options of the normal alignment passes.
    pub normal: NormalConstraintConfig,
    /// Options of the boundary triangulation.
    pub boundary: BoundaryConfig,
}

impl Default for MeshingParameters {
    fn default() -> Self {
        Self {
            length: 1.0,
            deflection: None,
            relative_deflection: false,
            boundary_merge_tolerance: 1.0e-6,
            target_sizes: vec![16.0, 4.0, 1.0],
            enforce_normals: true,
            insertion: InsertionConfig::default(),
            swap: SwapConfig::default(),
            normal: NormalConstraintConfig::default(),
            boundary: BoundaryConfig::default(),
        }
    }
}

impl MeshingParametersBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(length) = self.length
            && !(length.is_finite() && length > 0.0)
        {
            return Err(format!("length must be positive, got {length}"));
        }
        if let Some(Some(deflection)) = self.deflection
            && !(deflection.is_finite() && deflection > 0.0)
        {
            return Err(format!("deflection must be positive, got {deflection}"));
        }
        if let Some(sizes) = &self.target_sizes
            && sizes.iter().any(|s| !(s.is_finite() && *s > 0.0))
        {
            return Err("target sizes must be positive".to_string());
        }
        Ok(())
    }
}

/// Ready-made parameter sets.
pub mod parameter_presets {
    use super::MeshingParameters;

    /// Uniform mesh of edge length `length`, no curvature refinement.
    #[must_use]
    pub fn coarse(length: f64) -> MeshingParameters {
        MeshingParameters {
            length,
            target_sizes: vec![4.0, 1.0],
            ..MeshingParameters::default()
        }
    }

    /// Curvature-driven mesh: relative deflection and 3D diagonal
    /// preference along the boundary.
    #[must_use]
    pub fn fine(length: f64, deflection: f64) -> MeshingParameters {
        let mut params = MeshingParameters {
            length,
            deflection: Some(deflection),
            relative_deflection: true,
            ..MeshingParameters::default()
        };
        params.boundary.prefer_shorter_3d_diagonals = true;
        params
    }

    /// Planar faces: a single insertion size and no normal alignment.
    #[must_use]
    pub fn flat(length: f64) -> MeshingParameters {
        MeshingParameters {
            length,
            target_sizes: vec![1.0],
            enforce_normals: false,
            ..MeshingParameters::default()
        }
    }
}

// =============================================================================
// DRIVER
// =============================================================================

/// Counters collected while meshing one face.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FaceReport {
    /// Boundary recovery counters.
    pub boundary: BoundaryStats,
    /// One entry per Delaunay pass, in pipeline order.
    pub delaunay: Vec<SwapStats>,
    /// One entry per normal alignment pass.
    pub normal: Vec<NormalSwapStats>,
    /// One entry per target size.
    pub insertion: Vec<InsertionStats>,
    /// Chordal refinement counters, when a deflection is set.
    pub deflection: Option<DeflectionStats>,
    /// Angle and size statistics of the final mesh.
    pub quality: Option<QualityStats>,
}

/// One face of a batch.
#[derive(Clone, Copy)]
pub struct Face<'a> {
    /// Caller's identifier, echoed in the [`BatchReport`].
    pub id: usize,
    /// Surface evaluator.
    pub surface: &'a dyn GeometryProvider,
    /// Wires of the face.
    pub boundary: &'a dyn BoundaryDiscretizer,
}

impl std::fmt::Debug for Face<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Face").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Outcome of [`SurfaceMesher::triangulate_faces`].
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Meshed faces by id.
    pub meshes: Vec<(usize, Mesh, FaceReport)>,
    /// Rejected faces by id.
    pub skipped: Vec<(usize, TriangulationError)>,
}

impl BatchReport {
    /// Number of faces meshed.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.meshes.len()
    }

    /// Error of face `id`, if it was skipped.
    #[must_use]
    pub fn error(&self, id: usize) -> Option<&TriangulationError> {
        self.skipped.iter().find(|(i, _)| *i == id).map(|(_, e)| e)
    }
}

/// Meshes faces with one set of [`MeshingParameters`].
///
/// # Examples
///
/// ```rust
/// use patchmesh::core::boundary::BoundaryLoop;
/// use patchmesh::geometry::surface::Plane;
/// use patchmesh::mesher::{SurfaceMesher, parameter_presets};
///
/// let square = BoundaryLoop::from_uv(&[[0.0, 0.0], [3.0, 0.0], [3.0, 3.0], [0.0, 3.0]]);
/// let mesher = SurfaceMesher::new(parameter_presets::flat(1.0));
/// let mesh = mesher.triangulate_face(&Plane::xy(), &square).unwrap();
/// assert!(mesh.is_valid());
/// assert!(mesh.vertex_count() > 4);
/// ```
#[derive(Clone, Debug, Default)]
pub struct SurfaceMesher {
    params: MeshingParameters,
}

impl SurfaceMesher {
    /// Creates a mesher applying `params` to every face.
    #[must_use]
    pub const fn new(params: MeshingParameters) -> Self {
        Self { params }
    }

    /// Parameters in use.
    #[must_use]
    pub const fn params(&self) -> &MeshingParameters {
        &self.params
    }

    /// Meshes one face.
    ///
    /// # Errors
    ///
    /// See [`TriangulationError`].
    pub fn triangulate_face<G, D>(&self, surface: &G, boundary: &D) -> Result<Mesh, TriangulationError>
    where
        G: GeometryProvider + ?Sized,
        D: BoundaryDiscretizer + ?Sized,
    {
        self.triangulate_face_with_report(surface, boundary)
            .map(|(mesh, _)| mesh)
    }

    /// Meshes one face and returns the counters of every stage.
    ///
    /// # Errors
    ///
    /// See [`TriangulationError`].
    pub fn triangulate_face_with_report<G, D>(
        &self,
        surface: &G,
        boundary: &D,
    ) -> Result<(Mesh, FaceReport), TriangulationError>
    where
        G: GeometryProvider + ?Sized,
        D: BoundaryDiscretizer + ?Sized,
    {
        let params = &self.params;
        let mut report = FaceReport::default();

        let wires: Vec<BoundaryLoop> = boundary
            .discretize()
            .iter()
            .map(|wire| {
                pre_merge(
                    wire,
                    surface,
                    params.boundary_merge_tolerance,
                    params.deflection,
                    params.relative_deflection,
                )
            })
            .collect();

        let (mut mesh, boundary_stats) = BoundaryTriangulator::new(surface, params.boundary).triangulate(&wires)?;
        report.boundary = boundary_stats;

        let mut field = SurfaceMetricField::new(surface, params.length);
        if let Some(deflection) = params.deflection {
            field = field.with_deflection(deflection, params.relative_deflection);
        }
        assign_metrics(&mut mesh, &field)?;

        let swapper = DelaunaySwapper::new(params.swap);
        report.delaunay.push(swapper.run(&mut mesh)?);
        if params.enforce_normals {
            report
                .normal
                .push(NormalConstraintSwapper::new(surface, params.normal).run(&mut mesh)?);
            report.delaunay.push(swapper.run(&mut mesh)?);
        }

        let insertion = MetricInsertion::new(surface, &field, params.insertion);
        for &size in &params.target_sizes {
            let stats = insertion.run(&mut mesh, size)?;
            tracing::debug!("[mesher] size {size}: inserted {} in {} rounds", stats.inserted, stats.rounds);
            report.insertion.push(stats);
            report.delaunay.push(swapper.run(&mut mesh)?);
        }

        if params.enforce_normals {
            report
                .normal
                .push(NormalConstraintSwapper::new(surface, params.normal).run(&mut mesh)?);
            report.delaunay.push(swapper.run(&mut mesh)?);
        }

        if let Some(tolerance) = params.deflection {
            let config = DeflectionConfig {
                tolerance,
                relative: params.relative_deflection,
            };
            report.deflection = Some(DeflectionEnforcer::new(surface, config).run(&mut mesh)?);
            report.delaunay.push(swapper.run(&mut mesh)?);
        }

        mesh.validate()?;
        report.quality = Some(mesh.quality_stats());
        tracing::debug!(
            "[mesher] face done: {} vertices, {} inner triangles",
            mesh.vertex_count(),
            mesh.inner_triangles().count()
        );
        Ok((mesh, report))
    }

    /// Meshes every face independently. A failing face is logged and
    /// recorded in [`BatchReport::skipped`].
    #[must_use]
    pub fn triangulate_faces(&self, faces: &[Face<'_>]) -> BatchReport {
        let mut batch = BatchReport::default();
        for face in faces {
            match self.triangulate_face_with_report(face.surface, face.boundary) {
                Ok((mesh, report)) => batch.meshes.push((face.id, mesh, report)),
                Err(err) => {
                    tracing::warn!("[mesher] skipping face {}: {err}", face.id);
                    batch.skipped.push((face.id, err));
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::surface::{Cylinder, Plane};

    fn square(side: f64) -> BoundaryLoop {
        BoundaryLoop::from_uv(&[[0.0, 0.0], [side, 0.0], [side, side], [0.0, side]])
    }

    #[test]
    fn test_builder_defaults_match_default() {
        let built = MeshingParametersBuilder::default().build().unwrap();
        assert_eq!(built, MeshingParameters::default());
        assert_eq!(built.target_sizes, vec![16.0, 4.0, 1.0]);
        assert!(
            MeshingParametersBuilder::default()
                .target_sizes(vec![1.0, 0.0])
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_parameters_serde_roundtrip() {
        let params = parameter_presets::fine(0.2, 0.05);
        let json = serde_json::to_string(&params).unwrap();
        let back: MeshingParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
        assert!(back.boundary.prefer_shorter_3d_diagonals);
    }

    #[test]
    fn test_flat_square_pipeline() {
        let mesher = SurfaceMesher::new(parameter_presets::flat(1.0));
        let (mesh, report) = mesher
            .triangulate_face_with_report(&Plane::xy(), &square(4.0))
            .unwrap();
        assert!(mesh.is_valid());
        assert_eq!(report.insertion.len(), 1);
        assert!(report.insertion[0].converged);
        assert!(report.normal.is_empty());
        let area: f64 = mesh
            .inner_triangles()
            .map(|(_, tri)| {
                let [a, b, c] = (*tri.vertices()).map(|k| mesh.uv(k).unwrap());
                0.5 * ((b.u - a.u) * (c.v - a.v) - (c.u - a.u) * (b.v - a.v))
            })
            .sum();
        assert!((area - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_batch_skips_broken_face() {
        let plane = Plane::xy();
        let cylinder = Cylinder::new(2.0);
        let good = square(2.0);
        let bowtie = BoundaryLoop::from_uv(&[[0.0, 0.0], [2.0, 2.0], [2.0, 0.0], [0.0, 2.0]]);
        let strip = BoundaryLoop::from_uv(&[[0.0, 0.0], [1.0, 0.0], [1.0, 2.0], [0.0, 2.0]]);
        let faces = [
            Face { id: 7, surface: &plane, boundary: &good },
            Face { id: 8, surface: &plane, boundary: &bowtie },
            Face { id: 9, surface: &cylinder, boundary: &strip },
        ];
        let batch = SurfaceMesher::new(parameter_presets::coarse(0.5)).triangulate_faces(&faces);
        assert_eq!(batch.success_count(), 2);
        assert!(matches!(
            batch.error(8),
            Some(TriangulationError::InconsistentTopology { .. })
        ));
        assert!(batch.error(7).is_none());
    }

    #[test]
    fn test_too_few_points_is_invalid_boundary() {
        let line = BoundaryLoop::from_uv(&[[0.0, 0.0], [1.0, 0.0], [0.0, 0.0]]);
        let err = SurfaceMesher::default()
            .triangulate_face(&Plane::xy(), &line)
            .unwrap_err();
        assert!(matches!(err, TriangulationError::InvalidBoundary { .. }));
    }
}
