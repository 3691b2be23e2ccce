//! Integer clock-rate correction.
//!
//! Bias is expressed in tenths of a second per day, so an interval `e` is
//! corrected by `e * bias / 864_000`. Everything stays in integers; products
//! are formed in 128 bits so no combination of `i64` interval and bias can
//! overflow before the division.

use bendulum_config::TENTHS_PER_DAY;

/// Divide rounding to nearest, ties away from zero. `d` must be positive.
#[inline]
pub fn div_round_nearest_i128(n: i128, d: i128) -> i128 {
    debug_assert!(d > 0);
    let half = d / 2;
    if n >= 0 { (n + half) / d } else { (n - half) / d }
}

/// Correction term alone: `round(interval * bias / 864_000)`.
///
/// Negative products round away from zero too, so a negative bias corrects
/// slightly more than the device firmware, which truncates them toward zero.
#[inline]
pub fn bias_correction(interval_us: i64, bias_tenths_per_day: i64) -> i64 {
    let n = i128::from(interval_us) * i128::from(bias_tenths_per_day);
    saturate_i64(div_round_nearest_i128(n, i128::from(TENTHS_PER_DAY)))
}

/// Interval adjusted for a clock that gains or loses `bias` tenths of a second per day.
#[inline]
pub fn correct_interval(interval_us: i64, bias_tenths_per_day: i64) -> i64 {
    interval_us.saturating_add(bias_correction(interval_us, bias_tenths_per_day))
}

#[inline]
fn saturate_i64(v: i128) -> i64 {
    i64::try_from(v).unwrap_or(if v > 0 { i64::MAX } else { i64::MIN })
}
