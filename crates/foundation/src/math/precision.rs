//! Deterministic float ordering.
//!
//! Distances are sorted in several places (cluster members, detail lists);
//! all of them go through `stable_total_cmp_f64` so the order never depends on
//! `-0.0` vs `0.0` or on NaN payloads.

use core::cmp::Ordering;

/// Canonicalize a floating-point value for ordering.
///
/// `-0.0` becomes `0.0` and every NaN becomes the same NaN.
pub fn canonical_f64(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else if v.is_nan() {
        f64::NAN
    } else {
        v
    }
}

pub fn stable_total_cmp_f64(a: f64, b: f64) -> Ordering {
    canonical_f64(a).total_cmp(&canonical_f64(b))
}

/// Orders optional distances ascending with `None` last.
pub fn cmp_optional_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => stable_total_cmp_f64(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
