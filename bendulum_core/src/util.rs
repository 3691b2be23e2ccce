//! Shared time constants.

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;
/// Number of microseconds in one day.
pub const MICROS_PER_DAY: u64 = 86_400 * MICROS_PER_SEC;
/// Longest corrected interval accepted as a real beat (μs).
pub const MAX_INTERVAL_US: i64 = bendulum_config::MAX_BEAT_US as i64;

/// Beats per minute for a beat of `us` microseconds; 0 when `us <= 0`.
#[inline]
pub fn bpm_from_us(us: i64) -> f32 {
    if us <= 0 {
        return 0.0;
    }
    (60.0 * MICROS_PER_SEC as f64 / us as f64) as f32
}
