//! Pure time-series arithmetic.
//!
//! These are the functions the query layer's UDFs (`ringtsdb-query::udf`)
//! wrap as DataFusion scalar/window functions, and that the storage layer
//! could call directly in tests without pulling in a SQL engine. All
//! arithmetic is IEEE-754 double; `NaN` propagates through every function
//! here exactly as it does in raw `f64` arithmetic, and comparisons
//! involving `NaN` are treated as "unknown" (`None`) rather than `false`,
//! matching SQL `NULL` semantics. Integer intermediates (timestamps,
//! widths, steps) are 64-bit signed.

/// Floor-divide-then-multiply bucketing shared by `ts_bucket`/`align_time`.
fn floor_mul(ts: i64, width: i64) -> i64 {
    ts.div_euclid(width) * width
}

/// `ts_bucket(ts, width) = (ts // width) * width`. `width` must be `>= 1`;
/// callers are expected to validate that before calling (the query layer
/// surfaces `VALIDATION` for `width < 1`).
pub fn ts_bucket(ts: i64, width: i64) -> i64 {
    debug_assert!(width >= 1, "ts_bucket width must be >= 1");
    floor_mul(ts, width)
}

/// `align_time(ts, step) = (ts // step) * step`. Same arithmetic as
/// `ts_bucket`; kept as a separate name because the spec uses it at the
/// storage/slot-math seam rather than the query-bucketing seam.
pub fn align_time(ts: i64, step: i64) -> i64 {
    debug_assert!(step >= 1, "align_time step must be >= 1");
    floor_mul(ts, step)
}

/// `bucket_rate(curr, prev, width)`: `max(0, curr - prev) / width`.
/// `NULL` (`None`) iff `prev` is `None` or `width <= 0`. Negative deltas
/// clamp to zero rather than reporting a spurious negative rate on a
/// counter reset (see spec §4.D / §9: the alternative, reporting `NULL`
/// on a reset, is equally defensible but this crate picks the zero).
pub fn bucket_rate(curr: f64, prev: Option<f64>, width: i64) -> Option<f64> {
    let prev = prev?;
    if width <= 0 {
        return None;
    }
    let delta = curr - prev;
    let clamped = if delta.is_nan() { delta } else { delta.max(0.0) };
    Some(clamped / width as f64)
}

/// Rate between two arbitrary timestamps, shared by the `counter_rate`
/// windowed aggregate (`dt` there is `bucket[i] - bucket[i-1]`, not a fixed
/// `step`). `None` at a partition boundary (`prev` is `None`) or when
/// `dt <= 0`.
pub fn rate_between(curr: f64, prev: Option<f64>, dt: i64) -> Option<f64> {
    bucket_rate(curr, prev, dt)
}

/// Clamp `x` into `[lo, hi]`. Propagates `NaN`: `std::f64::max/min` would
/// silently discard a `NaN` operand, so this does the comparison by hand.
pub fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    if x.is_nan() {
        return x;
    }
    if x < lo {
        lo
    } else if x > hi {
        hi
    } else {
        x
    }
}

/// `Some(x)` if `lo <= x <= hi`, `None` otherwise. A `NaN` comparison is
/// never true, so `NaN` always yields `None` here (it is "outside" every
/// range) rather than producing a `NaN` value downstream.
pub fn null_if_outside(x: f64, lo: f64, hi: f64) -> Option<f64> {
    if x >= lo && x <= hi {
        Some(x)
    } else {
        None
    }
}

/// Element-wise addition on two aligned scalar inputs. `NULL` if either
/// input is `NULL`.
pub fn series_add(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? + b?)
}

/// Element-wise subtraction. `NULL` if either input is `NULL`.
pub fn series_sub(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? - b?)
}

/// Element-wise multiplication. `NULL` if either input is `NULL`.
pub fn series_mul(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? * b?)
}

/// Element-wise division. `NULL` if either input is `NULL` or the divisor
/// is exactly zero.
pub fn series_div(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    let (a, b) = (a?, b?);
    if b == 0.0 {
        None
    } else {
        Some(a / b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ts_bucket_matches_scenario_from_spec() {
        assert_eq!(ts_bucket(1_700_000_123, 60), 1_700_000_100);
    }

    #[test]
    fn bucket_rate_null_iff_prev_null_or_width_nonpositive() {
        assert_eq!(bucket_rate(10.0, None, 60), None);
        assert_eq!(bucket_rate(10.0, Some(5.0), 0), None);
        assert_eq!(bucket_rate(10.0, Some(5.0), -1), None);
        assert!(bucket_rate(10.0, Some(5.0), 60).is_some());
    }

    #[test]
    fn bucket_rate_counter_reset_scenario_from_spec() {
        // step=60,slots=10; raw (0,100),(60,160),(120,180),(180,50)
        assert_eq!(bucket_rate(160.0, Some(100.0), 60), Some(1.0));
        let r = bucket_rate(180.0, Some(160.0), 60).unwrap();
        assert!((r - (20.0 / 60.0)).abs() < 1e-12);
        assert_eq!(bucket_rate(50.0, Some(180.0), 60), Some(0.0));
    }

    #[test]
    fn clamp_propagates_nan() {
        assert!(clamp(f64::NAN, 0.0, 1.0).is_nan());
    }

    #[test]
    fn null_if_outside_treats_nan_as_outside() {
        assert_eq!(null_if_outside(f64::NAN, 0.0, 1.0), None);
    }

    #[test]
    fn series_div_by_zero_is_null() {
        assert_eq!(series_div(Some(1.0), Some(0.0)), None);
        assert_eq!(series_div(Some(1.0), None), None);
    }

    proptest! {
        #[test]
        fn bucket_rate_is_never_negative(curr in -1e6f64..1e6, prev in -1e6f64..1e6, width in 1i64..100_000) {
            if let Some(r) = bucket_rate(curr, Some(prev), width) {
                prop_assert!(r >= 0.0);
            }
        }

        #[test]
        fn ts_bucket_is_monotonic_and_bounded(ts in -1_000_000_000i64..1_000_000_000, width in 1i64..100_000) {
            let bucketed = ts_bucket(ts, width);
            prop_assert!(ts - bucketed >= 0);
            prop_assert!(ts - bucketed < width);
            // monotonic non-decreasing step function
            prop_assert!(ts_bucket(ts + width, width) >= bucketed);
        }
    }
}
