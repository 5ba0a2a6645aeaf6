//! Adaptive-precision orientation and in-circle determinants.
//!
//! Both determinants are first evaluated in plain floating point together with
//! an a-priori error bound. Only when the bound cannot certify the sign is the
//! computation escalated to expansion arithmetic: every intermediate product
//! and sum is kept as an unevaluated sum of non-overlapping doubles, so the
//! final sign is exact. Escalation is staged and each stage re-bounds the error,
//! which keeps well-conditioned inputs on the fast path.
//!
//! The error-free transformations (`two_sum`, `two_product`, `split`, ...) and
//! the bounds follow J. R. Shewchuk, "Adaptive Precision Floating-Point
//! Arithmetic and Fast Robust Geometric Predicates", Discrete & Computational
//! Geometry 18 (1997).
//!
//! Inputs must be finite and well below `f64::MAX.sqrt()` in magnitude; the
//! squared lifting terms of the in-circle test would otherwise overflow.

#![forbid(unsafe_code)]
#![allow(clippy::many_single_char_names, clippy::similar_names)]

use std::sync::LazyLock;

use crate::geometry::point::Point2;

// =============================================================================
// PREDICATE CONSTANTS
// =============================================================================

/// Machine constants and error-bound coefficients used by the predicates.
///
/// Values are derived from the floating-point format at first use and are
/// immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredicateConstants {
    /// Largest power of two such that `1.0 + epsilon` rounds to `1.0`.
    pub epsilon: f64,
    /// `2^ceil(p/2) + 1`, used to split a double into two half-width parts.
    pub splitter: f64,
    /// Relative error of rounding a computed determinant once more.
    pub result_err_bound: f64,
    /// Static orientation bound (tier A).
    pub ccw_err_bound_a: f64,
    /// Orientation bound after the exact head evaluation (tier B).
    pub ccw_err_bound_b: f64,
    /// Orientation bound after first-order tail correction (tier C).
    pub ccw_err_bound_c: f64,
    /// Static in-circle bound (tier A).
    pub icc_err_bound_a: f64,
    /// In-circle bound after the exact head evaluation (tier B).
    pub icc_err_bound_b: f64,
    /// In-circle bound after first-order tail correction (tier C).
    pub icc_err_bound_c: f64,
}

static CONSTANTS: LazyLock<PredicateConstants> = LazyLock::new(PredicateConstants::compute);

impl PredicateConstants {
    /// Returns the process-wide constants, computing them on first access.
    #[must_use]
    pub fn get() -> &'static Self {
        &CONSTANTS
    }

    /// Derives the constants from the behaviour of `f64` arithmetic.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn compute() -> Self {
        let half = 0.5;
        let mut every_other = true;
        let mut epsilon = 1.0_f64;
        let mut splitter = 1.0_f64;
        let mut check = 1.0_f64;
        loop {
            let last_check = check;
            epsilon *= half;
            if every_other {
                splitter *= 2.0;
            }
            every_other = !every_other;
            check = 1.0 + epsilon;
            if check == 1.0 || check == last_check {
                break;
            }
        }
        splitter += 1.0;

        Self {
            epsilon,
            splitter,
            result_err_bound: (3.0 + 8.0 * epsilon) * epsilon,
            ccw_err_bound_a: (3.0 + 16.0 * epsilon) * epsilon,
            ccw_err_bound_b: (2.0 + 12.0 * epsilon) * epsilon,
            ccw_err_bound_c: (9.0 + 64.0 * epsilon) * epsilon * epsilon,
            icc_err_bound_a: (10.0 + 96.0 * epsilon) * epsilon,
            icc_err_bound_b: (4.0 + 48.0 * epsilon) * epsilon,
            icc_err_bound_c: (44.0 + 576.0 * epsilon) * epsilon * epsilon,
        }
    }
}

// =============================================================================
// ERROR-FREE TRANSFORMATIONS
// =============================================================================

/// `a + b` as `(sum, error)`; requires `|a| >= |b|`.
#[inline]
fn fast_two_sum(a: f64, b: f64) -> (f64, f64) {
    let x = a + b;
    let b_virtual = x - a;
    (x, b - b_virtual)
}

/// `a + b` as `(sum, error)` with no magnitude precondition.
#[inline]
pub(crate) fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let x = a + b;
    let b_virtual = x - a;
    let a_virtual = x - b_virtual;
    let b_round = b - b_virtual;
    let a_round = a - a_virtual;
    (x, a_round + b_round)
}

/// Rounding error of the already computed difference `x = a - b`.
#[inline]
fn two_diff_tail(a: f64, b: f64, x: f64) -> f64 {
    let b_virtual = a - x;
    let a_virtual = x + b_virtual;
    let b_round = b_virtual - b;
    let a_round = a - a_virtual;
    a_round + b_round
}

/// `a - b` as `(difference, error)`.
#[inline]
fn two_diff(a: f64, b: f64) -> (f64, f64) {
    let x = a - b;
    (x, two_diff_tail(a, b, x))
}

/// Splits `a` into two non-overlapping halves of at most 26 significant bits.
#[inline]
fn split(a: f64, splitter: f64) -> (f64, f64) {
    let c = splitter * a;
    let a_big = c - a;
    let a_hi = c - a_big;
    (a_hi, a - a_hi)
}

/// `a * b` as `(product, error)` with `b` already split.
#[inline]
fn two_product_presplit(a: f64, b: f64, b_hi: f64, b_lo: f64, splitter: f64) -> (f64, f64) {
    let x = a * b;
    let (a_hi, a_lo) = split(a, splitter);
    let err1 = x - a_hi * b_hi;
    let err2 = err1 - a_lo * b_hi;
    let err3 = err2 - a_hi * b_lo;
    (x, a_lo * b_lo - err3)
}

/// `a * b` as `(product, error)`.
#[inline]
pub(crate) fn two_product(a: f64, b: f64) -> (f64, f64) {
    let splitter = PredicateConstants::get().splitter;
    let (b_hi, b_lo) = split(b, splitter);
    two_product_presplit(a, b, b_hi, b_lo, splitter)
}

/// `(a1 + a0) - b` as the three-term expansion `(x2, x1, x0)`.
#[inline]
fn two_one_diff(a1: f64, a0: f64, b: f64) -> (f64, f64, f64) {
    let (i, x0) = two_diff(a0, b);
    let (x2, x1) = two_sum(a1, i);
    (x2, x1, x0)
}

/// `(a1 + a0) - (b1 + b0)` as a four-term expansion, least significant first.
#[inline]
fn two_two_diff(a1: f64, a0: f64, b1: f64, b0: f64) -> [f64; 4] {
    let (j, zero, x0) = two_one_diff(a1, a0, b0);
    let (x3, x2, x1) = two_one_diff(j, zero, b1);
    [x0, x1, x2, x3]
}

/// Exact `a*d - b*c` as a four-term expansion.
#[inline]
fn cross_difference(a: f64, d: f64, b: f64, c: f64) -> [f64; 4] {
    let (ad1, ad0) = two_product(a, d);
    let (bc1, bc0) = two_product(b, c);
    two_two_diff(ad1, ad0, bc1, bc0)
}

// =============================================================================
// EXPANSION ARITHMETIC
// =============================================================================

/// Sums two expansions into `h`, eliminating zero components.
///
/// Both inputs must be non-overlapping and sorted by increasing magnitude; the
/// output has the same properties. `h` must hold `e.len() + f.len()` entries.
/// Returns the number of components written.
pub(crate) fn fast_expansion_sum_zeroelim(e: &[f64], f: &[f64], h: &mut [f64]) -> usize {
    let mut ei = 0;
    let mut fi = 0;
    let mut next_component = || {
        let take_e = match (e.get(ei), f.get(fi)) {
            (Some(&e_now), Some(&f_now)) => (f_now > e_now) == (f_now > -e_now),
            (Some(_), None) => true,
            _ => false,
        };
        if take_e {
            ei += 1;
            e[ei - 1]
        } else {
            fi += 1;
            f[fi - 1]
        }
    };

    let total = e.len() + f.len();
    let mut q = next_component();
    let mut h_len = 0;
    if total > 1 {
        let (q_new, hh) = fast_two_sum(next_component(), q);
        q = q_new;
        if hh != 0.0 {
            h[h_len] = hh;
            h_len += 1;
        }
    }
    for _ in 2..total {
        let (q_new, hh) = two_sum(q, next_component());
        q = q_new;
        if hh != 0.0 {
            h[h_len] = hh;
            h_len += 1;
        }
    }
    if q != 0.0 || h_len == 0 {
        h[h_len] = q;
        h_len += 1;
    }
    h_len
}

/// Multiplies expansion `e` by `b` into `h`, eliminating zero components.
///
/// `h` must hold `2 * e.len()` entries. Returns the number of components written.
pub(crate) fn scale_expansion_zeroelim(e: &[f64], b: f64, h: &mut [f64]) -> usize {
    let splitter = PredicateConstants::get().splitter;
    let (b_hi, b_lo) = split(b, splitter);
    let mut h_len = 0;

    let (mut q, hh) = two_product_presplit(e[0], b, b_hi, b_lo, splitter);
    if hh != 0.0 {
        h[h_len] = hh;
        h_len += 1;
    }
    for &e_now in &e[1..] {
        let (product1, product0) = two_product_presplit(e_now, b, b_hi, b_lo, splitter);
        let (sum, hh) = two_sum(q, product0);
        if hh != 0.0 {
            h[h_len] = hh;
            h_len += 1;
        }
        let (q_new, hh) = fast_two_sum(product1, sum);
        q = q_new;
        if hh != 0.0 {
            h[h_len] = hh;
            h_len += 1;
        }
    }
    if q != 0.0 || h_len == 0 {
        h[h_len] = q;
        h_len += 1;
    }
    h_len
}

/// One-double approximation of an expansion.
pub(crate) fn estimate(e: &[f64]) -> f64 {
    e.iter().sum()
}

/// Scales `e` twice by `s`, i.e. computes `e * s * s` exactly.
fn scale_twice(e: &[f64], s: f64, scratch: &mut [f64], out: &mut [f64]) -> usize {
    let len = scale_expansion_zeroelim(e, s, scratch);
    scale_expansion_zeroelim(&scratch[..len], s, out)
}

// =============================================================================
// ORIENTATION
// =============================================================================

/// Twice the signed area of triangle `(a, b, c)`.
///
/// Positive when the points are in counter-clockwise order, negative when
/// clockwise and exactly zero only when they are collinear. The sign is always
/// exact; the magnitude is an approximation.
#[must_use]
pub fn orient2d(a: &Point2, b: &Point2, c: &Point2) -> f64 {
    let det_left = (a.u - c.u) * (b.v - c.v);
    let det_right = (a.v - c.v) * (b.u - c.u);
    let det = det_left - det_right;

    let det_sum = if det_left > 0.0 {
        if det_right <= 0.0 {
            return det;
        }
        det_left + det_right
    } else if det_left < 0.0 {
        if det_right >= 0.0 {
            return det;
        }
        -det_left - det_right
    } else {
        return det;
    };

    let err_bound = PredicateConstants::get().ccw_err_bound_a * det_sum;
    if det >= err_bound || -det >= err_bound {
        return det;
    }
    orient2d_adapt(a, b, c, det_sum)
}

fn orient2d_adapt(a: &Point2, b: &Point2, c: &Point2, det_sum: f64) -> f64 {
    let consts = PredicateConstants::get();

    let acx = a.u - c.u;
    let bcx = b.u - c.u;
    let acy = a.v - c.v;
    let bcy = b.v - c.v;

    // Tier B: exact evaluation on the rounded differences.
    let head = cross_difference(acx, bcy, acy, bcx);
    let mut det = estimate(&head);
    let err_bound = consts.ccw_err_bound_b * det_sum;
    if det >= err_bound || -det >= err_bound {
        return det;
    }

    let acx_tail = two_diff_tail(a.u, c.u, acx);
    let bcx_tail = two_diff_tail(b.u, c.u, bcx);
    let acy_tail = two_diff_tail(a.v, c.v, acy);
    let bcy_tail = two_diff_tail(b.v, c.v, bcy);

    if acx_tail == 0.0 && acy_tail == 0.0 && bcx_tail == 0.0 && bcy_tail == 0.0 {
        return det;
    }

    // Tier C: first-order correction from the difference tails.
    let err_bound = consts.ccw_err_bound_c * det_sum + consts.result_err_bound * det.abs();
    det += (acx * bcy_tail + bcy * acx_tail) - (acy * bcx_tail + bcx * acy_tail);
    if det >= err_bound || -det >= err_bound {
        return det;
    }

    // Exact: add every tail product to the head expansion.
    let u = cross_difference(acx_tail, bcy, acy_tail, bcx);
    let mut c1 = [0.0; 8];
    let c1_len = fast_expansion_sum_zeroelim(&head, &u, &mut c1);

    let u = cross_difference(acx, bcy_tail, acy, bcx_tail);
    let mut c2 = [0.0; 12];
    let c2_len = fast_expansion_sum_zeroelim(&c1[..c1_len], &u, &mut c2);

    let u = cross_difference(acx_tail, bcy_tail, acy_tail, bcx_tail);
    let mut d = [0.0; 16];
    let d_len = fast_expansion_sum_zeroelim(&c2[..c2_len], &u, &mut d);

    d[d_len - 1]
}

// =============================================================================
// IN-CIRCLE
// =============================================================================

/// In-circle determinant of `d` against the circle through `a`, `b`, `c`.
///
/// For counter-clockwise `a, b, c` the result is positive when `d` lies inside
/// the circle, negative outside and exactly zero only when the four points are
/// cocircular. The sign is reversed for clockwise input. The sign is always
/// exact; the magnitude is an approximation.
#[must_use]
pub fn incircle(a: &Point2, b: &Point2, c: &Point2, d: &Point2) -> f64 {
    let adx = a.u - d.u;
    let bdx = b.u - d.u;
    let cdx = c.u - d.u;
    let ady = a.v - d.v;
    let bdy = b.v - d.v;
    let cdy = c.v - d.v;

    let bdxcdy = bdx * cdy;
    let cdxbdy = cdx * bdy;
    let a_lift = adx * adx + ady * ady;

    let cdxady = cdx * ady;
    let adxcdy = adx * cdy;
    let b_lift = bdx * bdx + bdy * bdy;

    let adxbdy = adx * bdy;
    let bdxady = bdx * ady;
    let c_lift = cdx * cdx + cdy * cdy;

    let det = a_lift * (bdxcdy - cdxbdy) + b_lift * (cdxady - adxcdy) + c_lift * (adxbdy - bdxady);

    let permanent = (bdxcdy.abs() + cdxbdy.abs()) * a_lift
        + (cdxady.abs() + adxcdy.abs()) * b_lift
        + (adxbdy.abs() + bdxady.abs()) * c_lift;
    let err_bound = PredicateConstants::get().icc_err_bound_a * permanent;
    if det > err_bound || -det > err_bound {
        return det;
    }
    incircle_adapt(a, b, c, d, permanent)
}

/// Exact `(x^2 + y^2) * minor` for the lifted row `(x, y)`.
fn lifted_term(minor: &[f64; 4], x: f64, y: f64, out: &mut [f64; 32]) -> usize {
    let mut scratch = [0.0; 8];
    let mut xx = [0.0; 16];
    let mut yy = [0.0; 16];
    let xx_len = scale_twice(minor, x, &mut scratch, &mut xx);
    let yy_len = scale_twice(minor, y, &mut scratch, &mut yy);
    fast_expansion_sum_zeroelim(&xx[..xx_len], &yy[..yy_len], out)
}

fn incircle_adapt(a: &Point2, b: &Point2, c: &Point2, d: &Point2, permanent: f64) -> f64 {
    let consts = PredicateConstants::get();

    let adx = a.u - d.u;
    let bdx = b.u - d.u;
    let cdx = c.u - d.u;
    let ady = a.v - d.v;
    let bdy = b.v - d.v;
    let cdy = c.v - d.v;

    // Tier B: exact evaluation on the rounded differences.
    let bc = cross_difference(bdx, cdy, cdx, bdy);
    let ca = cross_difference(cdx, ady, adx, cdy);
    let ab = cross_difference(adx, bdy, bdx, ady);

    let mut a_det = [0.0; 32];
    let mut b_det = [0.0; 32];
    let mut c_det = [0.0; 32];
    let a_len = lifted_term(&bc, adx, ady, &mut a_det);
    let b_len = lifted_term(&ca, bdx, bdy, &mut b_det);
    let c_len = lifted_term(&ab, cdx, cdy, &mut c_det);

    let mut ab_det = [0.0; 64];
    let ab_len = fast_expansion_sum_zeroelim(&a_det[..a_len], &b_det[..b_len], &mut ab_det);
    let mut fin = [0.0; 96];
    let fin_len = fast_expansion_sum_zeroelim(&ab_det[..ab_len], &c_det[..c_len], &mut fin);

    let mut det = estimate(&fin[..fin_len]);
    let err_bound = consts.icc_err_bound_b * permanent;
    if det >= err_bound || -det >= err_bound {
        return det;
    }

    let adx_tail = two_diff_tail(a.u, d.u, adx);
    let ady_tail = two_diff_tail(a.v, d.v, ady);
    let bdx_tail = two_diff_tail(b.u, d.u, bdx);
    let bdy_tail = two_diff_tail(b.v, d.v, bdy);
    let cdx_tail = two_diff_tail(c.u, d.u, cdx);
    let cdy_tail = two_diff_tail(c.v, d.v, cdy);
    if adx_tail == 0.0
        && bdx_tail == 0.0
        && cdx_tail == 0.0
        && ady_tail == 0.0
        && bdy_tail == 0.0
        && cdy_tail == 0.0
    {
        return det;
    }

    // Tier C: first-order correction from the difference tails.
    let err_bound = consts.icc_err_bound_c * permanent + consts.result_err_bound * det.abs();
    det += ((adx * adx + ady * ady)
        * ((bdx * cdy_tail + cdy * bdx_tail) - (bdy * cdx_tail + cdx * bdy_tail))
        + 2.0 * (adx * adx_tail + ady * ady_tail) * (bdx * cdy - bdy * cdx))
        + ((bdx * bdx + bdy * bdy)
            * ((cdx * ady_tail + ady * cdx_tail) - (cdy * adx_tail + adx * cdy_tail))
            + 2.0 * (bdx * bdx_tail + bdy * bdy_tail) * (cdx * ady - cdy * adx))
        + ((cdx * cdx + cdy * cdy)
            * ((adx * bdy_tail + bdy * adx_tail) - (ady * bdx_tail + bdx * ady_tail))
            + 2.0 * (cdx * cdx_tail + cdy * cdy_tail) * (adx * bdy - ady * bdx));
    if det >= err_bound || -det >= err_bound {
        return det;
    }

    incircle_exact(a, b, c, d)
}

/// Exact `m * s * s` followed by `m * t * t`, summed, for one lifted cofactor.
fn lifted_cofactor(m: &[f64], s: f64, s_neg: f64, t: f64, t_neg: f64, out: &mut [f64; 96]) -> usize {
    let mut x1 = [0.0; 24];
    let mut x2 = [0.0; 48];
    let mut y1 = [0.0; 24];
    let mut y2 = [0.0; 48];
    let x1_len = scale_expansion_zeroelim(m, s, &mut x1);
    let x2_len = scale_expansion_zeroelim(&x1[..x1_len], s_neg, &mut x2);
    let y1_len = scale_expansion_zeroelim(m, t, &mut y1);
    let y2_len = scale_expansion_zeroelim(&y1[..y1_len], t_neg, &mut y2);
    fast_expansion_sum_zeroelim(&x2[..x2_len], &y2[..y2_len], out)
}

/// Three-term minor `p + q + r` of four-term expansions.
fn minor3(p: &[f64; 4], q: &[f64; 4], r: &[f64; 4], out: &mut [f64; 12]) -> usize {
    let mut temp = [0.0; 8];
    let temp_len = fast_expansion_sum_zeroelim(p, q, &mut temp);
    fast_expansion_sum_zeroelim(&temp[..temp_len], r, out)
}

/// Exact in-circle determinant computed on the original coordinates.
fn incircle_exact(a: &Point2, b: &Point2, c: &Point2, d: &Point2) -> f64 {
    let ab = cross_difference(a.u, b.v, b.u, a.v);
    let bc = cross_difference(b.u, c.v, c.u, b.v);
    let cd = cross_difference(c.u, d.v, d.u, c.v);
    let da = cross_difference(d.u, a.v, a.u, d.v);
    let mut ac = cross_difference(a.u, c.v, c.u, a.v);
    let mut bd = cross_difference(b.u, d.v, d.u, b.v);

    let mut cda = [0.0; 12];
    let cda_len = minor3(&cd, &da, &ac, &mut cda);
    let mut dab = [0.0; 12];
    let dab_len = minor3(&da, &ab, &bd, &mut dab);
    for i in 0..4 {
        bd[i] = -bd[i];
        ac[i] = -ac[i];
    }
    let mut abc = [0.0; 12];
    let abc_len = minor3(&ab, &bc, &ac, &mut abc);
    let mut bcd = [0.0; 12];
    let bcd_len = minor3(&bc, &cd, &bd, &mut bcd);

    let mut a_det = [0.0; 96];
    let a_len = lifted_cofactor(&bcd[..bcd_len], a.u, a.u, a.v, a.v, &mut a_det);
    let mut b_det = [0.0; 96];
    let b_len = lifted_cofactor(&cda[..cda_len], b.u, -b.u, b.v, -b.v, &mut b_det);
    let mut c_det = [0.0; 96];
    let c_len = lifted_cofactor(&dab[..dab_len], c.u, c.u, c.v, c.v, &mut c_det);
    let mut d_det = [0.0; 96];
    let d_len = lifted_cofactor(&abc[..abc_len], d.u, -d.u, d.v, -d.v, &mut d_det);

    let mut ab_det = [0.0; 192];
    let ab_len = fast_expansion_sum_zeroelim(&a_det[..a_len], &b_det[..b_len], &mut ab_det);
    let mut cd_det = [0.0; 192];
    let cd_len = fast_expansion_sum_zeroelim(&c_det[..c_len], &d_det[..d_len], &mut cd_det);
    let mut deter = [0.0; 384];
    let deter_len = fast_expansion_sum_zeroelim(&ab_det[..ab_len], &cd_det[..cd_len], &mut deter);

    deter[deter_len - 1]
}

// =============================================================================
// TESTS
// =============================================================================
