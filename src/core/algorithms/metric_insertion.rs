//! Interior point insertion driven by a metric field.
//!
//! Each round measures every interior edge under the metric scaled to the
//! current target size. Edges longer than [`InsertionConfig::long_edge_ratio`]
//! get evenly spaced candidates, found by dichotomy along the edge; triangles
//! whose edges are not all short contribute their centroid. Candidates are
//! then visited in a prime-stride order and inserted unless an existing
//! vertex is closer than [`InsertionConfig::min_spacing_ratio`].
//!
//! Rounds repeat until one inserts nothing.

use serde::{Deserialize, Serialize};

use crate::core::algorithms::incremental_insertion::{InsertionError, insert_located};
use crate::core::algorithms::locate::{LOCATE_SEED, LocateResult, locate};
use crate::core::collections::{FastHashSet, fast_hash_set_with_capacity};
use crate::core::half_edge::HalfEdge;
use crate::core::mesh::{Mesh, MeshError};
use crate::core::triangle::EdgeAttributes;
use crate::core::vertex::{Vertex, VertexKey};
use crate::geometry::metric::{Metric2D, MetricField, edge_length, metric_distance};
use crate::geometry::point::Point2;
use crate::geometry::surface::GeometryProvider;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Tuned constants of the insertion pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InsertionConfig {
    /// Candidates closer than this to an existing vertex are rejected.
    pub min_spacing_ratio: f64,
    /// Accepted relative error on the spacing found by dichotomy.
    pub dichotomy_tolerance: f64,
    /// Candidates within this fraction of the edge from its destination are
    /// dropped.
    pub end_clearance: f64,
    /// Bisection steps allowed per candidate before it counts as a failure.
    pub max_dichotomy_steps: usize,
    /// Most points inserted on a single edge in one round.
    pub max_points_per_edge: usize,
    /// Edges at least this long (in target units) are subdivided.
    pub long_edge_ratio: f64,
    /// Cap on the number of rounds per target size.
    pub max_rounds: usize,
}

impl Default for InsertionConfig {
    fn default() -> Self {
        Self {
            min_spacing_ratio: 0.95,
            dichotomy_tolerance: 0.05,
            end_clearance: 0.02,
            max_dichotomy_steps: 20,
            max_points_per_edge: 4,
            long_edge_ratio: std::f64::consts::SQRT_2,
            max_rounds: 100,
        }
    }
}

/// Outcome of one [`MetricInsertion::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertionStats {
    /// Rounds run.
    pub rounds: usize,
    /// Vertices added.
    pub inserted: usize,
    /// Candidates rejected by the spacing filter.
    pub rejected_spacing: usize,
    /// Candidates outside the face, on its boundary or on a vertex.
    pub rejected_location: usize,
    /// Edges whose subdivision search did not converge.
    pub dichotomy_failures: usize,
    /// `true` if the last round inserted nothing.
    pub converged: bool,
}

/// Replaces the metric of every real vertex by the field value at its
/// position.
pub fn assign_metrics<F: MetricField + ?Sized>(mesh: &mut Mesh, field: &F) -> Result<(), MeshError> {
    let keys: Vec<VertexKey> = mesh.vertices().map(|(k, _)| k).collect();
    for key in keys {
        let uv = mesh.uv(key)?;
        mesh.vertex_mut(key)?.metric = field.metric(uv);
    }
    Ok(())
}

/// Visiting order `n/2, n/2 + p, n/2 + 2p, ...` modulo `n`, where `p` is a
/// prime not dividing `n`. Deterministic and a permutation of `0..n`.
#[must_use]
pub fn prime_stride_order(n: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let mut p = next_prime(n / 2);
    while n % p == 0 {
        p = next_prime(p + 1);
    }
    if p >= n {
        p = 1;
    }
    let mut index = n / 2;
    let mut order = Vec::with_capacity(n);
    for _ in 0..n {
        order.push(index);
        index += p;
        if index >= n {
            index -= n;
        }
    }
    order
}

fn next_prime(from: usize) -> usize {
    let is_prime = |k: usize| k >= 2 && (2..).take_while(|d| d * d <= k).all(|d| k % d != 0);
    (from.max(2)..).find(|&k| is_prime(k)).unwrap_or(2)
}

/// Field metric scaled to a target size.
struct ScaledField<'f, F: MetricField + ?Sized> {
    field: &'f F,
    size: f64,
}

impl<F: MetricField + ?Sized> MetricField for ScaledField<'_, F> {
    fn metric(&self, uv: Point2) -> Metric2D {
        self.field.metric(uv).scaled(self.size)
    }
}

/// Insertion pass over one face.
///
/// # Examples
///
/// ```rust
/// use patchmesh::core::algorithms::boundary_triangulation::{BoundaryConfig, BoundaryTriangulator};
/// use patchmesh::core::algorithms::metric_insertion::{InsertionConfig, MetricInsertion, assign_metrics};
/// use patchmesh::core::boundary::BoundaryLoop;
/// use patchmesh::geometry::metric::EuclideanMetricField;
/// use patchmesh::geometry::surface::Plane;
///
/// let plane = Plane::xy();
/// let field = EuclideanMetricField::with_length(1.0);
/// let square = BoundaryLoop::from_uv(&[[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]]);
/// let (mut mesh, _) = BoundaryTriangulator::new(&plane, BoundaryConfig::default())
///     .triangulate(&[square])
///     .unwrap();
/// assign_metrics(&mut mesh, &field).unwrap();
///
/// let stats = MetricInsertion::new(&plane, &field, InsertionConfig::default())
///     .run(&mut mesh, 1.0)
///     .unwrap();
/// assert!(stats.converged);
/// assert!(stats.inserted > 0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MetricInsertion<'a, G: GeometryProvider + ?Sized, F: MetricField + ?Sized> {
    surface: &'a G,
    field: &'a F,
    config: InsertionConfig,
}

impl<'a, G, F> MetricInsertion<'a, G, F>
where
    G: GeometryProvider + ?Sized,
    F: MetricField + ?Sized,
{
    /// Creates the pass for `surface`, sizing edges with `field`.
    #[must_use]
    pub const fn new(surface: &'a G, field: &'a F, config: InsertionConfig) -> Self {
        Self { surface, field, config }
    }

    /// Refines the mesh until edges are shorter than the long-edge threshold
    /// at target `size` (in units of the field's target length).
    ///
    /// # Errors
    ///
    /// Fails only on a structurally broken mesh; rejected candidates are
    /// counted in [`InsertionStats`].
    pub fn run(&self, mesh: &mut Mesh, size: f64) -> Result<InsertionStats, InsertionError> {
        let scaled = ScaledField { field: self.field, size };
        let mut rng = StdRng::seed_from_u64(LOCATE_SEED);
        let mut stats = InsertionStats::default();
        while stats.rounds < self.config.max_rounds {
            stats.rounds += 1;
            let candidates = self.collect_candidates(mesh, &scaled, &mut stats)?;
            let mut inserted = 0;
            for index in prime_stride_order(candidates.len()) {
                if self.try_insert(mesh, &scaled, candidates[index], &mut rng, &mut stats)? {
                    inserted += 1;
                }
            }
            stats.inserted += inserted;
            tracing::debug!(
                "[insert] size={size} round={} candidates={} inserted={inserted}",
                stats.rounds,
                candidates.len()
            );
            if inserted == 0 {
                stats.converged = true;
                break;
            }
        }
        if !stats.converged {
            tracing::warn!("[insert] size={size} still inserting after {} rounds", stats.rounds);
        }
        mesh.clear_attributes(EdgeAttributes::MARKED);
        Ok(stats)
    }

    fn collect_candidates(
        &self,
        mesh: &mut Mesh,
        scaled: &ScaledField<'_, F>,
        stats: &mut InsertionStats,
    ) -> Result<Vec<Point2>, MeshError> {
        mesh.clear_attributes(EdgeAttributes::MARKED);
        let mut candidates = Vec::new();
        let keys = mesh.triangle_keys();
        let mut seen: FastHashSet<(VertexKey, VertexKey)> = fast_hash_set_with_capacity(3 * keys.len() / 2);

        for &t in &keys {
            if mesh.touches_outer_vertex(t)? {
                continue;
            }
            for i in 0..3 {
                let he = HalfEdge::new(t, i);
                if mesh
                    .edge_attributes(he)?
                    .intersects(EdgeAttributes::BOUNDARY | EdgeAttributes::OUTER)
                {
                    mesh.insert_half_edge_attributes(he, EdgeAttributes::MARKED)?;
                    continue;
                }
                let o = mesh.origin(he)?;
                let d = mesh.destination(he)?;
                if !seen.insert(if o < d { (o, d) } else { (d, o) }) {
                    continue;
                }
                let (po, pd) = (mesh.uv(o)?, mesh.uv(d)?);
                let mo = mesh.metric(o)?.scaled(scaled.size);
                let md = mesh.metric(d)?.scaled(scaled.size);
                let l = edge_length(&po, &mo, &pd, &md);
                if l < self.config.long_edge_ratio {
                    mesh.insert_edge_attributes(he, EdgeAttributes::MARKED)?;
                    continue;
                }
                let (points, converged) = self.subdivide(scaled, (po, mo), (pd, md), l);
                if !converged {
                    stats.dichotomy_failures += 1;
                    mesh.insert_edge_attributes(he, EdgeAttributes::MARKED)?;
                }
                candidates.extend(points);
            }
        }

        for &t in &keys {
            let tri = mesh.triangle(t)?;
            if tri.contains_vertex(mesh.outer_vertex()) || tri.is_outer_tagged() {
                continue;
            }
            if (0..3).all(|i| tri.attributes(i).contains(EdgeAttributes::MARKED)) {
                continue;
            }
            let [a, b, c] = *tri.vertices();
            candidates.push(Point2::centroid(&mesh.uv(a)?, &mesh.uv(b)?, &mesh.uv(c)?));
        }
        Ok(candidates)
    }

    /// Points splitting `start-end` (metric length `length`) into equal
    /// metric pieces. The flag is `false` when a dichotomy failed.
    fn subdivide(
        &self,
        scaled: &ScaledField<'_, F>,
        start: (Point2, Metric2D),
        end: (Point2, Metric2D),
        length: f64,
    ) -> (Vec<Point2>, bool) {
        let pieces = num_traits::cast::<f64, usize>(length.round())
            .unwrap_or(2)
            .clamp(2, self.config.max_points_per_edge + 1);
        let spacing = length / pieces as f64;
        let tolerance = self.config.dichotomy_tolerance * spacing;

        let mut points = Vec::with_capacity(pieces - 1);
        let (mut last, mut last_metric) = start;
        let mut t_last = 0.0;
        for _ in 1..pieces {
            let (mut lo, mut hi) = (t_last, 1.0);
            let mut found = None;
            for _ in 0..self.config.max_dichotomy_steps {
                let t = 0.5 * (lo + hi);
                let x = start.0.lerp(&end.0, t);
                let mx = scaled.metric(x);
                let d = metric_distance(scaled, &last, &last_metric, &x, &mx);
                if (d - spacing).abs() < tolerance {
                    found = Some((t, x, mx));
                    break;
                }
                if d > spacing {
                    hi = t;
                } else {
                    lo = t;
                }
            }
            let Some((t, x, mx)) = found else {
                return (points, false);
            };
            if t > 1.0 - self.config.end_clearance {
                break;
            }
            points.push(x);
            (last, last_metric, t_last) = (x, mx, t);
        }
        (points, true)
    }

    fn try_insert(
        &self,
        mesh: &mut Mesh,
        scaled: &ScaledField<'_, F>,
        uv: Point2,
        rng: &mut StdRng,
        stats: &mut InsertionStats,
    ) -> Result<bool, InsertionError> {
        let base = self.field.metric(uv);
        let metric = base.scaled(scaled.size);
        let ratio = self.config.min_spacing_ratio;
        let [hu, hv] = metric.unit_ball_bbox();
        let mut crowded = false;
        mesh.for_each_vertex_near(uv, [hu * ratio, hv * ratio], |_, v| {
            let other = v.metric.scaled(scaled.size);
            crowded = edge_length(&uv, &metric, v.uv(), &other) < ratio;
            !crowded
        });
        if crowded {
            stats.rejected_spacing += 1;
            return Ok(false);
        }

        let location = locate(mesh, &uv, rng)?;
        let usable = match location {
            LocateResult::InsideTriangle(t) => {
                let tri = mesh.triangle(t)?;
                !tri.is_outer_tagged() && !tri.contains_vertex(mesh.outer_vertex())
            }
            LocateResult::OnEdge(he) => {
                let sym = mesh.sym(he)?;
                !(mesh.edge_attributes(he)? | mesh.edge_attributes(sym)?)
                    .intersects(EdgeAttributes::BOUNDARY | EdgeAttributes::OUTER)
                    && !mesh.touches_outer_vertex(he.triangle)?
                    && !mesh.touches_outer_vertex(sym.triangle)?
            }
            LocateResult::OnVertex(_) => false,
        };
        if !usable {
            stats.rejected_location += 1;
            return Ok(false);
        }

        let mut vertex = Vertex::new(uv, self.surface.value(uv));
        vertex.metric = base;
        let key = mesh.add_vertex(vertex);
        match insert_located(mesh, key, location) {
            Ok(_) => Ok(true),
            Err(MeshError::PointNotInside { .. } | MeshError::SplitOuterTriangle { .. }) => {
                mesh.remove_unlinked_vertex(key);
                stats.rejected_location += 1;
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }
}
