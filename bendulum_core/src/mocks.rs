//! Scripted doubles for the hardware traits, shared by tests and benches.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use bendulum_traits::{Clock, HwResult, KickCoil, SenseCoil};

/// Replays a fixed sequence of readings forever.
#[derive(Debug, Clone)]
pub struct ScriptedSense {
    pattern: Vec<i32>,
    pos: usize,
    reads: u64,
}

impl ScriptedSense {
    pub fn new(pattern: impl Into<Vec<i32>>) -> Self {
        Self {
            pattern: pattern.into(),
            pos: 0,
            reads: 0,
        }
    }

    /// One induced pulse per beat: quiet, rising, peak, falling.
    pub fn pulse() -> Self {
        Self::new(vec![0, 30, 70, 120, 90])
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl SenseCoil for ScriptedSense {
    fn read(&mut self) -> HwResult<i32> {
        self.reads += 1;
        let Some(&v) = self.pattern.get(self.pos) else {
            return Ok(0);
        };
        self.pos = (self.pos + 1) % self.pattern.len();
        Ok(v)
    }
}

/// A sense coil whose every read fails with the given message.
#[derive(Debug, Clone)]
pub struct FailingSense(pub &'static str);

impl SenseCoil for FailingSense {
    fn read(&mut self) -> HwResult<i32> {
        Err(Box::new(std::io::Error::other(self.0)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KickEvent {
    Driving(bool),
    Level(bool),
}

/// Records every call; optionally refuses to raise the line.
#[derive(Debug, Default)]
pub struct RecordingKick {
    events: Vec<KickEvent>,
    fail_level: bool,
    driving: bool,
}

impl RecordingKick {
    pub fn new() -> Self {
        Self::default()
    }

    /// `set_level` always fails, as if the pin were stuck.
    pub fn stuck() -> Self {
        Self {
            fail_level: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> &[KickEvent] {
        &self.events
    }

    /// Completed pulses (line raised then lowered).
    pub fn pulses(&self) -> usize {
        self.events
            .windows(2)
            .filter(|w| w[0] == KickEvent::Level(true) && w[1] == KickEvent::Level(false))
            .count()
    }

    pub fn is_driving(&self) -> bool {
        self.driving
    }
}

impl KickCoil for RecordingKick {
    fn set_driving(&mut self, driving: bool) -> HwResult<()> {
        self.events.push(KickEvent::Driving(driving));
        self.driving = driving;
        Ok(())
    }

    fn set_level(&mut self, active: bool) -> HwResult<()> {
        if self.fail_level {
            return Err(Box::new(std::io::Error::other("kick line stuck")));
        }
        self.events.push(KickEvent::Level(active));
        Ok(())
    }
}

/// Every `now_us()` call returns the current value and then moves it forward
/// by `step_us`. Sleeps are only tallied.
///
/// With no detection deadline configured the engine reads the clock once per
/// beat, so consecutive beats land exactly `step_us` apart.
#[derive(Debug, Clone)]
pub struct StepClock {
    now: Arc<AtomicU32>,
    step_us: u32,
    slept_us: Arc<AtomicU64>,
}

impl StepClock {
    pub fn new(start_us: u32, step_us: u32) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(start_us)),
            step_us,
            slept_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total time the engine asked to sleep.
    pub fn slept_us(&self) -> u64 {
        self.slept_us.load(Ordering::Relaxed)
    }
}

impl Clock for StepClock {
    fn now_us(&self) -> u32 {
        // fetch_add wraps on overflow, like the hardware counter
        self.now.fetch_add(self.step_us, Ordering::Relaxed)
    }

    fn sleep(&self, d: Duration) {
        self.slept_us
            .fetch_add(d.as_micros() as u64, Ordering::Relaxed);
    }
}
