//! Spatial hash grid over vertex positions in the parameter plane.
//!
//! The grid answers two kinds of queries for the mesher:
//! - nearest vertex to an arbitrary `(u, v)`, used to seed point location
//!   from the nearest vertex's back-link triangle
//! - all vertices inside a box, used to screen insertion candidates against
//!   a minimum spacing under a metric
//!
//! Cells are keyed by `floor(coord / cell_size)`. When a coordinate cannot be
//! keyed with unit resolution the index disables itself and callers fall back
//! to linear scans over the mesh.

use super::{FastHashMap, SmallBuffer};
use crate::core::vertex::VertexKey;
use crate::geometry::point::Point2;

const BUCKET_INLINE_CAPACITY: usize = 8;

/// Upper bound on the number of cells enumerated by a box query before the
/// query switches to scanning the occupied buckets.
const MAX_BOX_CELLS: i64 = 4096;

/// Cell coordinates beyond this magnitude lose unit resolution in `f64`.
const MAX_CELL_COORD: f64 = 4_503_599_627_370_496.0; // 2^52

type GridKey = (i64, i64);

/// Hash grid of vertex keys and their parametric positions.
#[derive(Clone, Debug)]
pub struct SpatialIndex {
    cell_size: f64,
    usable: bool,
    len: usize,
    bounds: Option<(GridKey, GridKey)>,
    cells: FastHashMap<GridKey, SmallBuffer<(VertexKey, Point2), BUCKET_INLINE_CAPACITY>>,
}

impl SpatialIndex {
    /// Creates an empty index with the given cell size.
    #[must_use]
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            usable: cell_size.is_finite() && cell_size > 0.0,
            len: 0,
            bounds: None,
            cells: FastHashMap::default(),
        }
    }

    /// Creates an index sized for roughly `expected` points spread over the
    /// box `[min, max]`.
    #[must_use]
    pub fn for_extent(min: Point2, max: Point2, expected: usize) -> Self {
        let du = (max.u - min.u).abs();
        let dv = (max.v - min.v).abs();
        let extent = du.max(dv);
        #[allow(clippy::cast_precision_loss)]
        let per_axis = (expected.max(1) as f64).sqrt().ceil();
        Self::new(extent / per_axis)
    }

    /// Returns `true` while the index can answer queries.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.usable
    }

    /// Side length of one grid cell.
    #[must_use]
    pub const fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of indexed vertices.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no vertex is indexed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes every vertex.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.len = 0;
        self.bounds = None;
    }

    /// Inserts a vertex at `uv`.
    ///
    /// A position that cannot be keyed disables the index.
    pub fn insert(&mut self, key: VertexKey, uv: Point2) {
        if !self.usable {
            return;
        }
        let Some(cell) = self.key_for(&uv) else {
            self.usable = false;
            return;
        };
        self.cells.entry(cell).or_default().push((key, uv));
        self.len += 1;
        self.bounds = Some(match self.bounds {
            None => (cell, cell),
            Some((lo, hi)) => ((lo.0.min(cell.0), lo.1.min(cell.1)), (hi.0.max(cell.0), hi.1.max(cell.1))),
        });
    }

    /// Removes the vertex `key` previously inserted at `uv`.
    ///
    /// Returns `true` if the vertex was found.
    pub fn remove(&mut self, key: VertexKey, uv: Point2) -> bool {
        let Some(cell) = self.key_for(&uv) else {
            return false;
        };
        let Some(bucket) = self.cells.get_mut(&cell) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|(k, _)| *k != key);
        let removed = bucket.len() < before;
        if bucket.is_empty() {
            self.cells.remove(&cell);
        }
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Nearest indexed vertex to `uv` in the Euclidean parameter metric.
    ///
    /// Returns `None` when the index is empty or unusable.
    #[must_use]
    pub fn nearest(&self, uv: Point2) -> Option<VertexKey> {
        if !self.usable || self.len == 0 {
            return None;
        }
        let (lo, hi) = self.bounds?;
        let base = self.key_for(&uv)?;
        let max_ring = (base.0 - lo.0)
            .abs()
            .max((hi.0 - base.0).abs())
            .max((base.1 - lo.1).abs())
            .max((hi.1 - base.1).abs());

        let mut best: Option<(VertexKey, f64)> = None;
        for ring in 0..=max_ring {
            self.visit_ring(base, ring, |key, p| {
                let d = uv.distance(p);
                if best.is_none_or(|(_, bd)| d < bd) {
                    best = Some((key, d));
                }
            });
            #[allow(clippy::cast_precision_loss)]
            let ring_clearance = ring as f64 * self.cell_size;
            if let Some((_, d)) = best
                && d <= ring_clearance
            {
                break;
            }
        }
        best.map(|(key, _)| key)
    }

    /// Visits every indexed vertex within the box `uv ± half_extent`.
    ///
    /// The visitor returns `false` to stop early. Returns `false` if the index
    /// was unusable for this query, in which case nothing was visited.
    pub fn for_each_in_box<F>(&self, uv: Point2, half_extent: [f64; 2], mut f: F) -> bool
    where
        F: FnMut(VertexKey, &Point2) -> bool,
    {
        if !self.usable {
            return false;
        }
        let min = Point2::new(uv.u - half_extent[0], uv.v - half_extent[1]);
        let max = Point2::new(uv.u + half_extent[0], uv.v + half_extent[1]);
        let (Some(lo), Some(hi)) = (self.key_for(&min), self.key_for(&max)) else {
            return false;
        };
        let inside = |p: &Point2| p.u >= min.u && p.u <= max.u && p.v >= min.v && p.v <= max.v;

        let span = (hi.0 - lo.0 + 1).saturating_mul(hi.1 - lo.1 + 1);
        if span > MAX_BOX_CELLS {
            for bucket in self.cells.values() {
                for (key, p) in bucket {
                    if inside(p) && !f(*key, p) {
                        return true;
                    }
                }
            }
            return true;
        }

        for i in lo.0..=hi.0 {
            for j in lo.1..=hi.1 {
                let Some(bucket) = self.cells.get(&(i, j)) else {
                    continue;
                };
                for (key, p) in bucket {
                    if inside(p) && !f(*key, p) {
                        return true;
                    }
                }
            }
        }
        true
    }

    fn visit_ring<F>(&self, base: GridKey, ring: i64, mut f: F)
    where
        F: FnMut(VertexKey, &Point2),
    {
        let mut visit_cell = |cell: GridKey| {
            if let Some(bucket) = self.cells.get(&cell) {
                for (key, p) in bucket {
                    f(*key, p);
                }
            }
        };
        if ring == 0 {
            visit_cell(base);
            return;
        }
        for i in -ring..=ring {
            visit_cell((base.0 + i, base.1 - ring));
            visit_cell((base.0 + i, base.1 + ring));
        }
        for j in (-ring + 1)..ring {
            visit_cell((base.0 - ring, base.1 + j));
            visit_cell((base.0 + ring, base.1 + j));
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn key_for(&self, uv: &Point2) -> Option<GridKey> {
        if !self.usable || !uv.is_finite() {
            return None;
        }
        let i = (uv.u / self.cell_size).floor();
        let j = (uv.v / self.cell_size).floor();
        if !i.is_finite() || !j.is_finite() || i.abs() >= MAX_CELL_COORD || j.abs() >= MAX_CELL_COORD {
            return None;
        }
        Some((i as i64, j as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collections::FastHashSet;
    use slotmap::SlotMap;

    #[test]
    fn test_spatial_index_nearest_across_cells() {
        let mut slots: SlotMap<VertexKey, ()> = SlotMap::default();
        let mut index = SpatialIndex::new(1.0);
        let far = slots.insert(());
        let near = slots.insert(());
        index.insert(far, Point2::new(0.1, 0.1));
        index.insert(near, Point2::new(3.9, 0.0));

        assert_eq!(index.nearest(Point2::new(3.0, 0.0)), Some(near));
        assert_eq!(index.nearest(Point2::new(0.9, 0.9)), Some(far));
        // query far outside the occupied cells still finds a vertex
        assert_eq!(index.nearest(Point2::new(-50.0, 0.0)), Some(far));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_spatial_index_nearest_prefers_closer_point_in_outer_ring() {
        let mut slots: SlotMap<VertexKey, ()> = SlotMap::default();
        let mut index = SpatialIndex::new(1.0);
        let diagonal = slots.insert(());
        let straight = slots.insert(());
        // same cell ring, different true distances
        index.insert(diagonal, Point2::new(1.95, 1.95));
        index.insert(straight, Point2::new(1.05, 0.5));
        assert_eq!(index.nearest(Point2::new(0.5, 0.5)), Some(straight));
    }

    #[test]
    fn test_spatial_index_box_query_and_remove() {
        let mut slots: SlotMap<VertexKey, ()> = SlotMap::default();
        let mut index = SpatialIndex::for_extent(Point2::new(0.0, 0.0), Point2::new(10.0, 10.0), 100);
        assert!((index.cell_size() - 1.0).abs() < 1e-12);

        let mut expected: FastHashSet<VertexKey> = FastHashSet::default();
        for x in 0..10 {
            for y in 0..10 {
                let key = slots.insert(());
                let p = Point2::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                index.insert(key, p);
                if (3..=5).contains(&x) && (3..=5).contains(&y) {
                    expected.insert(key);
                }
            }
        }

        let mut found: FastHashSet<VertexKey> = FastHashSet::default();
        let used = index.for_each_in_box(Point2::new(4.5, 4.5), [1.2, 1.2], |key, _| {
            found.insert(key);
            true
        });
        assert!(used);
        assert_eq!(found, expected);

        let victim = *expected.iter().next().unwrap();
        let mut victim_pos = None;
        index.for_each_in_box(Point2::new(4.5, 4.5), [1.2, 1.2], |key, p| {
            if key == victim {
                victim_pos = Some(*p);
            }
            true
        });
        assert!(index.remove(victim, victim_pos.unwrap()));
        assert!(!index.remove(victim, victim_pos.unwrap()));
        assert_eq!(index.len(), 99);
    }

    #[test]
    fn test_spatial_index_disables_on_unkeyable_coordinates() {
        let mut slots: SlotMap<VertexKey, ()> = SlotMap::default();
        let mut index = SpatialIndex::new(1.0e-300);
        index.insert(slots.insert(()), Point2::new(1.0e300, 0.0));
        assert!(!index.is_usable());
        assert!(index.nearest(Point2::new(0.0, 0.0)).is_none());
        assert!(!index.for_each_in_box(Point2::new(0.0, 0.0), [1.0, 1.0], |_, _| true));
        assert!(!SpatialIndex::new(0.0).is_usable());
    }
}
