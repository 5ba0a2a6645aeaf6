//! Discretized wires of a face and their preparation for triangulation.
//!
//! A face is bounded by one or more closed wires. Each wire arrives as a
//! [`BoundaryLoop`]: an ordered list of [`BoundaryNode`]s in the parameter
//! plane, the closing edge from the last node back to the first being
//! implicit. Wires come from a [`BoundaryDiscretizer`], which stands for the
//! 1D mesher sampling the CAD edges.
//!
//! [`pre_merge`] drops nodes that sit too close together in 3D before the
//! triangulator sees them.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::core::vertex::VertexRef;
use crate::geometry::point::Point2;
use crate::geometry::surface::GeometryProvider;

/// One sample of a wire.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundaryNode {
    /// Parametric position on the face.
    pub uv: Point2,
    /// Arc length from the start of the wire.
    pub arc_length: f64,
    /// Immutable nodes survive [`pre_merge`] and are frozen in the mesh.
    pub immutable: bool,
    /// CAD entity the node was sampled from.
    pub reference: Option<VertexRef>,
}

impl BoundaryNode {
    /// Mutable node without CAD reference.
    #[must_use]
    pub const fn new(uv: Point2, arc_length: f64) -> Self {
        Self {
            uv,
            arc_length,
            immutable: false,
            reference: None,
        }
    }

    /// Same node, marked immutable.
    #[must_use]
    pub const fn fixed(mut self) -> Self {
        self.immutable = true;
        self
    }
}

/// A closed wire. The last node connects back to the first.
///
/// # Examples
///
/// ```rust
/// use patchmesh::core::boundary::BoundaryLoop;
///
/// let square = BoundaryLoop::from_uv(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
/// assert_eq!(square.len(), 4);
/// assert_eq!(square.edges().count(), 4);
/// assert!((square.signed_area() - 1.0).abs() < 1e-12);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundaryLoop {
    nodes: Vec<BoundaryNode>,
}

impl BoundaryLoop {
    /// Wire through `nodes`, closed from the last node back to the first.
    #[must_use]
    pub const fn new(nodes: Vec<BoundaryNode>) -> Self {
        Self { nodes }
    }

    /// Wire through the given parametric points, with arc length measured in
    /// the parameter plane.
    #[must_use]
    pub fn from_uv(points: &[[f64; 2]]) -> Self {
        let mut arc_length = 0.0;
        let mut previous: Option<Point2> = None;
        let nodes = points
            .iter()
            .map(|&p| {
                let uv = Point2::from(p);
                if let Some(prev) = previous {
                    arc_length += prev.distance(&uv);
                }
                previous = Some(uv);
                BoundaryNode::new(uv, arc_length)
            })
            .collect();
        Self { nodes }
    }

    /// Nodes in wire order.
    #[must_use]
    pub fn nodes(&self) -> &[BoundaryNode] {
        &self.nodes
    }

    /// Mutable access to the nodes, for callers fixing up parameters.
    pub fn nodes_mut(&mut self) -> &mut [BoundaryNode] {
        &mut self.nodes
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the wire has no node.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Consecutive node pairs, including the closing pair.
    pub fn edges(&self) -> impl Iterator<Item = (&BoundaryNode, &BoundaryNode)> + '_ {
        let n = self.nodes.len();
        (0..n).map(move |i| (&self.nodes[i], &self.nodes[(i + 1) % n]))
    }

    /// Shoelace area in the parameter plane; positive for counter-clockwise
    /// wires.
    #[must_use]
    pub fn signed_area(&self) -> f64 {
        0.5 * self
            .edges()
            .map(|(p, q)| p.uv.u.mul_add(q.uv.v, -(q.uv.u * p.uv.v)))
            .sum::<f64>()
    }
}

/// Source of the discretized wires of a face.
pub trait BoundaryDiscretizer {
    /// One loop per wire, outer wire first.
    fn discretize(&self) -> Vec<BoundaryLoop>;
}

impl BoundaryDiscretizer for BoundaryLoop {
    fn discretize(&self) -> Vec<BoundaryLoop> {
        vec![self.clone()]
    }
}

impl BoundaryDiscretizer for [BoundaryLoop] {
    fn discretize(&self) -> Vec<BoundaryLoop> {
        self.to_vec()
    }
}

impl BoundaryDiscretizer for Vec<BoundaryLoop> {
    fn discretize(&self) -> Vec<BoundaryLoop> {
        self.clone()
    }
}

/// Drops nodes closer than `tolerance` (3D distance on `surface`) to the
/// previously kept node.
///
/// A node is kept anyway when it is immutable, when fewer than three nodes
/// would remain, or when the chord replacing it would stray from the surface
/// by more than `deflection` at its midpoint. With `relative_deflection` the
/// budget is scaled by the chord length.
///
/// # Examples
///
/// ```rust
/// use patchmesh::core::boundary::{BoundaryLoop, pre_merge};
/// use patchmesh::geometry::surface::Plane;
///
/// let wire = BoundaryLoop::from_uv(&[[0.0, 0.0], [1.0, 0.0], [1.0005, 0.0], [1.0, 1.0], [0.0, 1.0]]);
/// let merged = pre_merge(&wire, &Plane::xy(), 0.01, None, false);
/// assert_eq!(merged.len(), 4);
/// ```
#[must_use]
pub fn pre_merge<G>(
    wire: &BoundaryLoop,
    surface: &G,
    tolerance: f64,
    deflection: Option<f64>,
    relative_deflection: bool,
) -> BoundaryLoop
where
    G: GeometryProvider + ?Sized,
{
    let nodes = wire.nodes();
    let n = nodes.len();
    if n <= 3 || tolerance <= 0.0 {
        return wire.clone();
    }

    let mut kept: Vec<BoundaryNode> = Vec::with_capacity(n);
    kept.push(nodes[0]);
    let mut dropped = 0_usize;
    for i in 1..n {
        let node = nodes[i];
        let Some(last) = kept.last().copied() else {
            kept.push(node);
            continue;
        };
        if node.immutable || n - dropped - 1 < 3 {
            kept.push(node);
            continue;
        }
        let here = surface.value(node.uv);
        let anchor = surface.value(last.uv);
        if (here - anchor).norm() >= tolerance {
            kept.push(node);
            continue;
        }
        if let Some(budget) = deflection {
            let next = nodes[(i + 1) % n];
            let far = surface.value(next.uv);
            let chord_mid = nalgebra::center(&anchor, &far);
            let on_surface = surface.value(last.uv.midpoint(&next.uv));
            let allowed = if relative_deflection {
                budget * (far - anchor).norm()
            } else {
                budget
            };
            if (on_surface - chord_mid).norm() > allowed {
                kept.push(node);
                continue;
            }
        }
        dropped += 1;
    }
    if dropped > 0 {
        tracing::debug!("[boundary] pre-merge dropped {dropped} of {n} nodes");
    }
    BoundaryLoop::new(kept)
}
