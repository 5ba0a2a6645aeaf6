//! Property-based tests for the exact predicates.
//!
//! Inputs are dyadic: every coordinate is `k * 2^e` with a small integer `k`
//! and one exponent `e` shared by the whole configuration. Scaling by `2^-e`
//! then maps the configuration onto integers where an `i128` evaluation of
//! the determinants is exact, which gives an oracle for the sign.
//!
//! Strategies concentrate on nearly degenerate input: points one unit away
//! from a line through two others, and points one unit away from a circle
//! through three lattice points.
//!
//! A second family mixes magnitudes inside one configuration, so that the
//! coordinates are exact doubles but their differences are not. Those
//! inputs get past the first error bounds and are decided by the tail and
//! full expansion stages.

use patchmesh::geometry::point::Point2;
use patchmesh::geometry::predicates::{InCircle, Orientation, in_circle, orientation};
use patchmesh::geometry::robust_predicates::{PredicateConstants, incircle, orient2d};
use proptest::prelude::*;

// =============================================================================
// ORACLE
// =============================================================================

type Lattice = [i64; 2];

#[allow(clippy::cast_precision_loss)]
fn to_point(p: Lattice, exponent: i32) -> Point2 {
    let scale = 2.0_f64.powi(exponent);
    Point2::new(p[0] as f64 * scale, p[1] as f64 * scale)
}

fn exact_orientation(a: Lattice, b: Lattice, c: Lattice) -> Orientation {
    let [ax, ay] = a.map(i128::from);
    let [bx, by] = b.map(i128::from);
    let [cx, cy] = c.map(i128::from);
    let det = (bx - ax) * (cy - ay) - (by - ay) * (cx - ax);
    match det.signum() {
        1 => Orientation::POSITIVE,
        -1 => Orientation::NEGATIVE,
        _ => Orientation::DEGENERATE,
    }
}

fn exact_in_circle(a: Lattice, b: Lattice, c: Lattice, d: Lattice) -> InCircle {
    let [dx, dy] = d.map(i128::from);
    let rel = |p: Lattice| (i128::from(p[0]) - dx, i128::from(p[1]) - dy);
    let (adx, ady) = rel(a);
    let (bdx, bdy) = rel(b);
    let (cdx, cdy) = rel(c);
    let a_lift = adx * adx + ady * ady;
    let b_lift = bdx * bdx + bdy * bdy;
    let c_lift = cdx * cdx + cdy * cdy;
    let det = a_lift * (bdx * cdy - cdx * bdy) + b_lift * (cdx * ady - adx * cdy) + c_lift * (adx * bdy - bdx * ady);
    match det.signum() {
        1 => InCircle::INSIDE,
        -1 => InCircle::OUTSIDE,
        _ => InCircle::BOUNDARY,
    }
}

// =============================================================================
// STRATEGIES
// =============================================================================

const ORIENT_RANGE: i64 = 1 << 28;
const CIRCLE_RANGE: i64 = 1 << 20;

fn exponent() -> impl Strategy<Value = i32> {
    -60..60
}

fn lattice(range: i64) -> impl Strategy<Value = Lattice> {
    prop::array::uniform2(-range..range)
}

/// `a`, `b` and a point one step away from the line through them.
fn near_collinear() -> impl Strategy<Value = (Lattice, Lattice, Lattice)> {
    (lattice(1 << 12), lattice(1 << 12), -(1_i64 << 10)..(1_i64 << 10), -1_i64..=1, any::<bool>()).prop_map(
        |(a, b, t, delta, along_x)| {
            let mut c = [a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1])];
            if along_x {
                c[0] += delta;
            } else {
                c[1] += delta;
            }
            (a, b, c)
        },
    )
}

/// Lattice offsets of length 5, sorted by angle.
const ON_CIRCLE: [Lattice; 12] = [
    [5, 0],
    [4, 3],
    [3, 4],
    [0, 5],
    [-3, 4],
    [-4, 3],
    [-5, 0],
    [-4, -3],
    [-3, -4],
    [0, -5],
    [3, -4],
    [4, -3],
];

/// Lattice points on the circle of radius `5r` around a center, in
/// counter-clockwise order, and a fourth point one step away from it.
fn near_cocircular() -> impl Strategy<Value = (Lattice, Lattice, Lattice, Lattice)> {
    (
        lattice(1 << 16),
        1_i64..(1 << 12),
        prop::sample::subsequence((0..12).collect::<Vec<usize>>(), 4),
        prop::array::uniform2(-1_i64..=1),
        0_usize..4,
    )
        .prop_map(|(center, r, picks, delta, moved)| {
            let at = |i: usize| [center[0] + r * ON_CIRCLE[i][0], center[1] + r * ON_CIRCLE[i][1]];
            let mut pts = [at(picks[0]), at(picks[1]), at(picks[2]), at(picks[3])];
            pts[moved][0] += delta[0];
            pts[moved][1] += delta[1];
            // the indices come sorted, so the first three run counter-clockwise
            let [a, b, c, d] = pts;
            (a, b, c, d)
        })
}

/// Shift applied to the largest point of [`mixed_near_collinear`].
const MIXED_TOP: u32 = 33;

/// `a = x * 2^33`, `b = -x * 2^(33 - r)` on the other side of the origin,
/// and `c = x * 2^(33 - s)` between them, nudged off the line by one unit
/// of a finer lattice. Every coordinate fits in 32 significant bits, while
/// `a - b` and `a - c` span up to 60.
fn mixed_near_collinear() -> impl Strategy<Value = (Lattice, Lattice, Lattice)> {
    (
        lattice(1 << 28),
        1_u32..=30,
        1_u32..=30,
        0_u32..=3,
        -1_i64..=1,
        any::<bool>(),
    )
        .prop_map(|(x, r, s, u, delta, along_x)| {
            let a = x.map(|v| v << MIXED_TOP);
            let b = x.map(|v| -(v << (MIXED_TOP - r)));
            let mut c = x.map(|v| v << (MIXED_TOP - s));
            c[usize::from(!along_x)] += delta << (MIXED_TOP - s).saturating_sub(u);
            (a, b, c)
        })
}

/// Three points of the circle of radius `5 * 2^k` centered at
/// `(3, 4) * 2^k`, which passes through the origin, and a fourth point
/// `m * 2^-j` a few units of a much finer lattice away from the origin.
#[derive(Debug, Clone)]
struct MixedCircle {
    picks: Vec<usize>,
    k: i32,
    j: i32,
    m: Lattice,
}

impl MixedCircle {
    fn points(&self, e: i32) -> [Point2; 4] {
        let on_circle = |i: usize| to_point([3 + ON_CIRCLE[i][0], 4 + ON_CIRCLE[i][1]], self.k + e);
        [
            on_circle(self.picks[0]),
            on_circle(self.picks[1]),
            on_circle(self.picks[2]),
            to_point(self.m, e - self.j),
        ]
    }

    /// Sign of `r^2 - |d - center|^2`, scaled by `2^(2j)` onto integers:
    /// `2^(k + j + 1) * (m . (3, 4)) - |m|^2`.
    fn expected(&self) -> InCircle {
        let [m0, m1] = self.m.map(i128::from);
        let shift = u32::try_from(self.k + self.j + 1).unwrap();
        let det = (3 * m0 + 4 * m1) * (1_i128 << shift) - (m0 * m0 + m1 * m1);
        match det.signum() {
            1 => InCircle::INSIDE,
            -1 => InCircle::OUTSIDE,
            _ => InCircle::BOUNDARY,
        }
    }
}

fn mixed_cocircular() -> impl Strategy<Value = MixedCircle> {
    (
        prop::sample::subsequence((0..12).collect::<Vec<usize>>(), 3),
        10_i32..=45,
        40_i32..=70,
        prop_oneof![
            prop::array::uniform2(-8_i64..=8),
            // along the tangent at the origin, where only |m|^2 decides
            (-2_i64..=2).prop_map(|t| [4 * t, -3 * t]),
        ],
    )
        .prop_map(|(picks, k, j, m)| MixedCircle { picks, k, j, m })
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    /// Property: orientation agrees with the exact oracle on arbitrary input.
    #[test]
    fn prop_orientation_matches_oracle(
        a in lattice(ORIENT_RANGE),
        b in lattice(ORIENT_RANGE),
        c in lattice(ORIENT_RANGE),
        e in exponent(),
    ) {
        let got = orientation(&to_point(a, e), &to_point(b, e), &to_point(c, e));
        prop_assert_eq!(got, exact_orientation(a, b, c));
    }

    /// Property: orientation agrees with the oracle one unit away from
    /// collinearity, at every scale.
    #[test]
    fn prop_orientation_near_collinear((a, b, c) in near_collinear(), e in exponent()) {
        let (pa, pb, pc) = (to_point(a, e), to_point(b, e), to_point(c, e));
        let expected = exact_orientation(a, b, c);
        prop_assert_eq!(orientation(&pa, &pb, &pc), expected);
        prop_assert_eq!(orientation(&pb, &pc, &pa), expected);
        prop_assert_eq!(orientation(&pb, &pa, &pc), expected.reversed());
    }

    /// Property: in-circle agrees with the exact oracle near cocircularity.
    #[test]
    fn prop_in_circle_near_cocircular((a, b, c, d) in near_cocircular(), e in exponent()) {
        let [pa, pb, pc, pd] = [a, b, c, d].map(|p| to_point(p, e));
        prop_assert_eq!(in_circle(&pa, &pb, &pc, &pd), exact_in_circle(a, b, c, d));
        // rotating the triangle does not change the answer
        prop_assert_eq!(in_circle(&pb, &pc, &pa, &pd), exact_in_circle(a, b, c, d));
    }

    /// Property: in-circle agrees with the oracle on arbitrary input.
    #[test]
    fn prop_in_circle_matches_oracle(
        a in lattice(CIRCLE_RANGE),
        b in lattice(CIRCLE_RANGE),
        c in lattice(CIRCLE_RANGE),
        d in lattice(CIRCLE_RANGE),
        e in exponent(),
    ) {
        let got = in_circle(&to_point(a, e), &to_point(b, e), &to_point(c, e), &to_point(d, e));
        prop_assert_eq!(got, exact_in_circle(a, b, c, d));
    }

    /// Property: orientation agrees with the oracle when coordinate
    /// differences are not representable.
    #[test]
    fn prop_orientation_mixed_magnitudes((a, b, c) in mixed_near_collinear(), e in -20_i32..20) {
        let (pa, pb, pc) = (to_point(a, e), to_point(b, e), to_point(c, e));
        let expected = exact_orientation(a, b, c);
        prop_assert_eq!(orientation(&pa, &pb, &pc), expected);
        prop_assert_eq!(orientation(&pc, &pa, &pb), expected);
        prop_assert_eq!(orient2d(&pa, &pb, &pc) == 0.0, expected == Orientation::DEGENERATE);
    }

    /// Property: in-circle agrees with the oracle for a point near a huge
    /// circle, at a scale far below the other three points.
    #[test]
    fn prop_in_circle_mixed_magnitudes(circle in mixed_cocircular(), e in -20_i32..20) {
        let [pa, pb, pc, pd] = circle.points(e);
        let expected = circle.expected();
        prop_assert_eq!(in_circle(&pa, &pb, &pc, &pd), expected);
        prop_assert_eq!(in_circle(&pc, &pa, &pb, &pd), expected);
        prop_assert_eq!(incircle(&pa, &pb, &pc, &pd) == 0.0, expected == InCircle::BOUNDARY);
    }

    /// Property: the raw determinants are zero exactly when the oracle says so.
    #[test]
    fn prop_zero_only_when_degenerate((a, b, c) in near_collinear(), e in exponent()) {
        let det = orient2d(&to_point(a, e), &to_point(b, e), &to_point(c, e));
        prop_assert_eq!(det == 0.0, exact_orientation(a, b, c) == Orientation::DEGENERATE);
    }
}

#[test]
fn constants_are_memoized() {
    let first = PredicateConstants::get();
    let second = PredicateConstants::get();
    assert!(std::ptr::eq(first, second));
    assert_eq!(*first, PredicateConstants::compute());
    assert_eq!(first.epsilon, f64::EPSILON / 2.0);
}

#[test]
fn incircle_of_cocircular_lattice_points_is_zero() {
    let pts = [[5, 0], [0, 5], [-5, 0], [0, -5]].map(|p| to_point(p, -3));
    assert_eq!(incircle(&pts[0], &pts[1], &pts[2], &pts[3]), 0.0);
}
