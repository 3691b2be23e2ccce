//! Simulated bendulum: one physical model shared by a sense coil, a kick
//! coil and a virtual clock.
//!
//! Time only moves when the engine sleeps or samples the coil, so a full
//! calibration run completes in milliseconds of wall time. The magnet passes
//! the coil on a fixed schedule, alternating tick and tock periods; each pass
//! induces a triangular pulse (linear rise to `peak`, linear fall to zero).

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bendulum_traits::{Clock, HwResult, KickCoil, SenseCoil};
use tracing::trace;

use crate::error::HwError;

/// Shape and timing of the simulated swing.
#[derive(Debug, Clone)]
pub struct SimParams {
    /// Interval after a tick pass (μs)
    pub tick_us: u64,
    /// Interval after a tock pass (μs)
    pub tock_us: u64,
    /// Pulse peak in ADC counts
    pub peak: i32,
    pub rise_us: u64,
    pub fall_us: u64,
    /// Virtual time consumed by one coil sample
    pub sample_us: u64,
    /// Initial counter value
    pub start_us: u64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            tick_us: 1_000_000,
            tock_us: 1_000_000,
            peak: 400,
            rise_us: 8_000,
            fall_us: 8_000,
            sample_us: 112,
            start_us: 0,
        }
    }
}

#[derive(Debug)]
struct SimState {
    params: SimParams,
    now_us: u64,
    // Start of the most recent pass, if any has happened yet
    pass_at: Option<u64>,
    next_pass_at: u64,
    passes: u64,
    driving: bool,
    level: bool,
    kicks: u64,
    reads: u64,
}

impl SimState {
    fn roll_passes(&mut self) {
        while self.now_us >= self.next_pass_at {
            self.pass_at = Some(self.next_pass_at);
            let gap = if self.passes % 2 == 0 {
                self.params.tick_us
            } else {
                self.params.tock_us
            };
            self.next_pass_at += gap.max(1);
            self.passes += 1;
        }
    }

    fn voltage(&self) -> i32 {
        let Some(start) = self.pass_at else {
            return 0;
        };
        let p = &self.params;
        let d = self.now_us - start;
        let peak = i64::from(p.peak);
        let v = if d < p.rise_us {
            peak * d as i64 / p.rise_us.max(1) as i64
        } else if d < p.rise_us + p.fall_us {
            peak * (p.rise_us + p.fall_us - d) as i64 / p.fall_us.max(1) as i64
        } else {
            0
        };
        v as i32
    }
}

/// Handle to the shared model. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SimulatedBendulum {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBendulum {
    pub fn new(params: SimParams) -> Self {
        // First pass half a tick after power-on, as if pushed by hand
        let first = params.start_us + params.tick_us / 2;
        let state = SimState {
            now_us: params.start_us,
            pass_at: None,
            next_pass_at: first,
            passes: 0,
            driving: false,
            level: false,
            kicks: 0,
            reads: 0,
            params,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A poisoned model is still consistent enough for a simulation
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn sense(&self) -> SimSense {
        SimSense { sim: self.clone() }
    }

    pub fn kick(&self) -> SimKick {
        SimKick { sim: self.clone() }
    }

    pub fn clock(&self) -> SimClock {
        SimClock { sim: self.clone() }
    }

    /// Completed kick pulses.
    pub fn kicks(&self) -> u64 {
        self.lock().kicks
    }

    /// Coil samples taken so far.
    pub fn reads(&self) -> u64 {
        self.lock().reads
    }

    /// Passes of the magnet over the coil so far.
    pub fn passes(&self) -> u64 {
        self.lock().passes
    }

    /// Full 64-bit virtual time.
    pub fn elapsed_us(&self) -> u64 {
        let s = self.lock();
        s.now_us - s.params.start_us
    }

    /// Whether the kick line is currently driven (false = high impedance).
    pub fn is_driving(&self) -> bool {
        self.lock().driving
    }
}

/// Sense coil of a [`SimulatedBendulum`].
#[derive(Debug, Clone)]
pub struct SimSense {
    sim: SimulatedBendulum,
}

impl SenseCoil for SimSense {
    fn read(&mut self) -> HwResult<i32> {
        let mut s = self.sim.lock();
        s.now_us += s.params.sample_us;
        s.reads += 1;
        s.roll_passes();
        Ok(s.voltage())
    }
}

/// Kick coil of a [`SimulatedBendulum`].
#[derive(Debug, Clone)]
pub struct SimKick {
    sim: SimulatedBendulum,
}

impl KickCoil for SimKick {
    fn set_driving(&mut self, driving: bool) -> HwResult<()> {
        let mut s = self.sim.lock();
        s.driving = driving;
        if !driving {
            s.level = false;
        }
        Ok(())
    }

    fn set_level(&mut self, active: bool) -> HwResult<()> {
        let mut s = self.sim.lock();
        if !s.driving {
            return Err(Box::new(HwError::KickNotDriving));
        }
        if s.level && !active {
            s.kicks += 1;
            trace!(kicks = s.kicks, at_us = s.now_us, "simulated kick");
        }
        s.level = active;
        Ok(())
    }
}

/// Virtual clock of a [`SimulatedBendulum`]; sleeping advances model time.
#[derive(Debug, Clone)]
pub struct SimClock {
    sim: SimulatedBendulum,
}

impl Clock for SimClock {
    fn now_us(&self) -> u32 {
        // Wraps like the 32-bit reference counter
        self.sim.lock().now_us as u32
    }

    fn sleep(&self, d: Duration) {
        let mut s = self.sim.lock();
        s.now_us += d.as_micros() as u64;
        s.roll_passes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SimParams {
        SimParams {
            tick_us: 1_000_000,
            tock_us: 900_000,
            peak: 400,
            rise_us: 8_000,
            fall_us: 8_000,
            sample_us: 1_000,
            start_us: 0,
        }
    }

    #[test]
    fn quiet_before_first_pass() {
        let sim = SimulatedBendulum::new(params());
        let mut sense = sim.sense();
        for _ in 0..100 {
            assert_eq!(sense.read().unwrap(), 0);
        }
        assert_eq!(sim.passes(), 0);
    }

    #[test]
    fn pulse_rises_then_falls() {
        let sim = SimulatedBendulum::new(params());
        let clock = sim.clock();
        let mut sense = sim.sense();
        // first pass at 500 ms; park 1 ms before it
        clock.sleep(Duration::from_micros(499_000));
        let samples: Vec<i32> = (0..20).map(|_| sense.read().unwrap()).collect();
        // sample k is taken at 500ms + (k-1) ms
        assert_eq!(samples[0], 0);
        assert_eq!(samples[1], 0);
        assert_eq!(samples[5], 200);
        assert_eq!(samples[9], 400);
        assert_eq!(samples[13], 200);
        assert_eq!(samples[17], 0);
        assert_eq!(sim.passes(), 1);
    }

    #[test]
    fn passes_alternate_tick_and_tock_gaps() {
        let sim = SimulatedBendulum::new(params());
        let clock = sim.clock();
        clock.sleep(Duration::from_micros(500_000));
        assert_eq!(sim.passes(), 1);
        clock.sleep(Duration::from_micros(999_999));
        assert_eq!(sim.passes(), 1);
        clock.sleep(Duration::from_micros(1));
        assert_eq!(sim.passes(), 2);
        clock.sleep(Duration::from_micros(900_000));
        assert_eq!(sim.passes(), 3);
    }

    #[test]
    fn kick_requires_output_mode_and_counts_pulses() {
        let sim = SimulatedBendulum::new(params());
        let mut kick = sim.kick();
        assert!(kick.set_level(true).is_err());
        kick.set_driving(true).unwrap();
        kick.set_level(true).unwrap();
        kick.set_level(false).unwrap();
        kick.set_driving(false).unwrap();
        assert_eq!(sim.kicks(), 1);
        assert!(!sim.is_driving());
    }

    #[test]
    fn clock_wraps_at_32_bits() {
        let sim = SimulatedBendulum::new(SimParams {
            start_us: u64::from(u32::MAX) - 10,
            ..params()
        });
        let clock = sim.clock();
        let before = clock.now_us();
        clock.sleep(Duration::from_micros(20));
        assert_eq!(clock.now_us(), 9);
        assert_eq!(clock.us_since(before), 20);
        assert_eq!(sim.elapsed_us(), 20);
    }
}
