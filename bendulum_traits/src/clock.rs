use std::thread;
use std::time::{Duration, Instant};

/// Microsecond clock abstraction used for beat timestamps and blocking delays.
///
/// - now_us(): 32-bit microsecond counter that wraps (~71.6 minutes per lap)
/// - sleep(): blocks for the provided duration (implementations may simulate)
/// - us_since(): wrapping difference between now and an earlier timestamp
pub trait Clock {
    fn now_us(&self) -> u32;
    fn sleep(&self, d: Duration);

    #[inline]
    fn sleep_ms(&self, ms: u64) {
        self.sleep(Duration::from_millis(ms));
    }

    /// Microseconds elapsed since `earlier`. Correct across one counter wrap.
    #[inline]
    fn us_since(&self, earlier: u32) -> u32 {
        self.now_us().wrapping_sub(earlier)
    }
}

/// Real-time clock backed by std::time::Instant, truncated to 32 bits.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_us(&self) -> u32 {
        // Truncation is the point: the counter must wrap like the 32-bit reference timer.
        self.epoch.elapsed().as_micros() as u32
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}
