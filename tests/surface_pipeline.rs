//! Full meshing pipeline on curved and holed faces.

use patchmesh::prelude::*;

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Counter-clockwise rectangle `[0, width] x [0, height]` with nodes every
/// `step` along each side.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn rectangle(width: f64, height: f64, step: f64) -> BoundaryLoop {
    let nu = (width / step).ceil().max(1.0) as usize;
    let nv = (height / step).ceil().max(1.0) as usize;
    let mut uv = Vec::with_capacity(2 * (nu + nv));
    for i in 0..nu {
        uv.push([width * i as f64 / nu as f64, 0.0]);
    }
    for j in 0..nv {
        uv.push([width, height * j as f64 / nv as f64]);
    }
    for i in (1..=nu).rev() {
        uv.push([width * i as f64 / nu as f64, height]);
    }
    for j in (1..=nv).rev() {
        uv.push([0.0, height * j as f64 / nv as f64]);
    }
    BoundaryLoop::from_uv(&uv)
}

fn uv_area(mesh: &Mesh) -> f64 {
    mesh.inner_triangles()
        .map(|(_, tri)| {
            let [a, b, c] = (*tri.vertices()).map(|k| mesh.uv(k).unwrap());
            0.5 * ((b.u - a.u) * (c.v - a.v) - (c.u - a.u) * (b.v - a.v))
        })
        .sum()
}

/// Smallest cosine between a triangle normal and the surface normal at its
/// centroid.
fn worst_normal_alignment<G: GeometryProvider>(mesh: &Mesh, surface: &G) -> f64 {
    mesh.inner_triangles()
        .map(|(_, tri)| {
            let [a, b, c] = (*tri.vertices()).map(|k| mesh.vertex(k).unwrap());
            let n = (b.position() - a.position()).cross(&(c.position() - a.position()));
            let centroid = Point2::centroid(a.uv(), b.uv(), c.uv());
            n.normalize().dot(&surface.normal(centroid))
        })
        .fold(f64::INFINITY, f64::min)
}

#[test]
fn cylinder_strip_coarse_preset() {
    init_tracing();
    let cylinder = Cylinder::new(1.0);
    let wire = rectangle(1.5, 1.0, 0.25);
    let (mesh, report) = SurfaceMesher::new(parameter_presets::coarse(0.25))
        .triangulate_face_with_report(&cylinder, &wire)
        .unwrap();

    assert!(mesh.is_valid(), "{:?}", mesh.validate());
    assert!((uv_area(&mesh) - 1.5).abs() < 1e-9);
    assert_eq!(report.insertion.len(), 2);
    assert!(report.insertion.iter().all(|s| s.converged));
    assert!(report.insertion.iter().map(|s| s.inserted).sum::<usize>() > 0);
    assert_eq!(report.normal.len(), 2);
    assert!(report.deflection.is_none());
    assert!(report.delaunay.iter().all(|s| s.converged));

    let quality = report.quality.unwrap();
    assert_eq!(quality.triangles, mesh.inner_triangles().count());
    assert!(quality.min_angle_degrees > 0.0);
    assert!(worst_normal_alignment(&mesh, &cylinder) > 0.0);
}

#[test]
fn deflection_refines_curved_faces_more() {
    init_tracing();
    let cylinder = Cylinder::new(0.5);
    let wire = rectangle(2.0, 1.0, 0.2);

    let coarse = SurfaceMesher::new(parameter_presets::coarse(0.4))
        .triangulate_face(&cylinder, &wire)
        .unwrap();
    let (fine, report) = SurfaceMesher::new(parameter_presets::fine(0.4, 0.01))
        .triangulate_face_with_report(&cylinder, &wire)
        .unwrap();

    assert!(fine.is_valid(), "{:?}", fine.validate());
    assert!(fine.vertex_count() > coarse.vertex_count());
    let deflection = report.deflection.unwrap();
    assert!(deflection.rounds >= 1);
    assert!(worst_normal_alignment(&fine, &cylinder) > 0.0);
}

#[test]
fn planar_face_with_hole() {
    init_tracing();
    let outer = rectangle(4.0, 4.0, 0.5);
    // clockwise square hole in the middle
    let hole = BoundaryLoop::from_uv(&[[1.5, 1.5], [1.5, 2.5], [2.5, 2.5], [2.5, 1.5]]);
    let wires = vec![outer, hole];

    let (mesh, report) = SurfaceMesher::new(parameter_presets::flat(0.5))
        .triangulate_face_with_report(&Plane::xy(), &wires)
        .unwrap();

    assert!(mesh.is_valid(), "{:?}", mesh.validate());
    assert!((uv_area(&mesh) - 15.0).abs() < 1e-9);
    assert_eq!(report.boundary.forced_edges, 36);
    for (_, tri) in mesh.inner_triangles() {
        let c = {
            let [a, b, c] = (*tri.vertices()).map(|k| mesh.uv(k).unwrap());
            Point2::centroid(&a, &b, &c)
        };
        let in_hole = c.u > 1.5 && c.u < 2.5 && c.v > 1.5 && c.v < 2.5;
        assert!(!in_hole, "triangle centered at {c} lies in the hole");
    }
}

#[test]
fn duplicate_closing_node_is_merged() {
    init_tracing();
    let wire = BoundaryLoop::from_uv(&[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0], [0.0, 0.0]]);
    let (mesh, report) = SurfaceMesher::new(parameter_presets::flat(0.5))
        .triangulate_face_with_report(&Plane::xy(), &wire)
        .unwrap();
    assert!(mesh.is_valid());
    assert_eq!(report.boundary.boundary_vertices, 4);
    assert!((uv_area(&mesh) - 4.0).abs() < 1e-9);
}

#[test]
fn batch_reports_each_face() {
    init_tracing();
    let plane = Plane::xy();
    let cylinder = Cylinder::new(1.0);
    let square = rectangle(1.0, 1.0, 0.25);
    let strip = rectangle(1.0, 0.5, 0.25);
    let collinear = BoundaryLoop::from_uv(&[[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]]);
    let faces = [
        Face { id: 1, surface: &plane, boundary: &square },
        Face { id: 2, surface: &cylinder, boundary: &strip },
        Face { id: 3, surface: &plane, boundary: &collinear },
    ];

    let batch = SurfaceMesher::new(parameter_presets::coarse(0.25)).triangulate_faces(&faces);
    assert_eq!(batch.success_count(), 2);
    assert_eq!(batch.skipped.len(), 1);
    assert!(matches!(batch.error(3), Some(TriangulationError::InvalidBoundary { .. })));
    for (id, mesh, report) in &batch.meshes {
        assert!(mesh.is_valid(), "face {id}: {:?}", mesh.validate());
        assert!(report.quality.is_some());
    }
}

#[test]
fn parameters_load_from_json() {
    let json = r#"{
        "length": 0.5,
        "deflection": 0.02,
        "relative_deflection": false,
        "boundary_merge_tolerance": 1e-6,
        "target_sizes": [2.0, 1.0],
        "enforce_normals": false,
        "insertion": {
            "min_spacing_ratio": 0.95,
            "dichotomy_tolerance": 0.05,
            "end_clearance": 0.02,
            "max_dichotomy_steps": 20,
            "max_points_per_edge": 4,
            "long_edge_ratio": 1.4142135623730951,
            "max_rounds": 100
        },
        "swap": { "sweep_cap_multiplier": 10 },
        "normal": { "min_alignment": 0.4 },
        "boundary": { "prefer_shorter_3d_diagonals": false, "seed": 139 }
    }"#;
    let params: MeshingParameters = serde_json::from_str(json).unwrap();
    assert_eq!(params.deflection, Some(0.02));
    assert_eq!(params.target_sizes, vec![2.0, 1.0]);

    let mesh = SurfaceMesher::new(params)
        .triangulate_face(&Plane::xy(), &rectangle(2.0, 2.0, 0.5))
        .unwrap();
    assert!(mesh.is_valid());
}
