//! The beat engine (`BeatEngine`).
//!
//! Each call to `beat()` blocks until the magnet passes the sense coil, kicks
//! it, measures the interval since the previous pass and feeds it through the
//! current run mode:
//!
//! | Mode        | Per beat                                            | Leaves when                     |
//! |-------------|-----------------------------------------------------|---------------------------------|
//! | Settling    | uspb = corrected interval                           | `tgt_settle` cycles done        |
//! | Scaling     | as Settling; peak scale grows while peaks exceed 1  | `tgt_scale` cycles done         |
//! | Calibrating | tick/tock running averages; uspb = their mean       | `tgt_smoothing` cycles done     |
//! | CalFinish   | nothing                                             | immediately                     |
//! | Running     | uspb held                                           | never                           |
//!
//! State is only touched after detection and the kick have both succeeded, so
//! a failed beat leaves the engine exactly as it was.

use std::sync::Arc;

use bendulum_traits::{Clock, HwResult, KickCoil, SenseCoil};
use eyre::WrapErr;
use tracing::{debug, info, trace, warn};

use crate::config::{DetectCfg, ModeTargets};
use crate::error::{BendulumError, Result};
use crate::fixed_point::correct_interval;
use crate::hw_error::map_hw_error;
use crate::mode::RunMode;
use crate::util::{MAX_INTERVAL_US, bpm_from_us};

/// Peak scale restored whenever SCALING is entered.
pub const DEFAULT_PEAK_SCALE: i32 = 10;

// Scaled peaks above this grow the peak scale while SCALING
const MAX_SCALED_PEAK: i32 = 1;

pub struct BeatEngine<S: SenseCoil, K: KickCoil> {
    pub(crate) sense: S,
    pub(crate) kick: K,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) detect: DetectCfg,
    pub(crate) targets: ModeTargets,

    pub(crate) mode: RunMode,
    pub(crate) cycle_counter: u32,
    pub(crate) cur_smoothing: u32,
    pub(crate) bias: i32,
    pub(crate) peak_scale: i32,
    pub(crate) last_peak: i32,
    pub(crate) tick: bool,
    pub(crate) tick_avg: i64,
    pub(crate) tock_avg: i64,
    pub(crate) tick_period: i64,
    pub(crate) tock_period: i64,
    pub(crate) uspb: i64,
    pub(crate) last_beat: Option<u32>,
    pub(crate) prior_beat: Option<u32>,
}

impl<S: SenseCoil, K: KickCoil> core::fmt::Debug for BeatEngine<S, K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BeatEngine")
            .field("mode", &self.mode)
            .field("uspb", &self.uspb)
            .field("tick", &self.tick)
            .field("peak_scale", &self.peak_scale)
            .field("bias", &self.bias)
            .finish()
    }
}

impl<S: SenseCoil, K: KickCoil> BeatEngine<S, K> {
    pub(crate) fn new(
        sense: S,
        kick: K,
        clock: Arc<dyn Clock + Send + Sync>,
        detect: DetectCfg,
        targets: ModeTargets,
        bias: i32,
        peak_scale: i32,
    ) -> Self {
        Self {
            sense,
            kick,
            clock,
            detect,
            targets,
            mode: RunMode::Settling,
            cycle_counter: 1,
            cur_smoothing: 1,
            bias,
            peak_scale,
            last_peak: 0,
            tick: true,
            tick_avg: 0,
            tock_avg: 0,
            tick_period: 0,
            tock_period: 0,
            uspb: 0,
            last_beat: None,
            prior_beat: None,
        }
    }

    /// Wait for one pass of the magnet, kick it, and return the beat duration (μs).
    ///
    /// The very first call only records a baseline and returns 0.
    pub fn beat(&mut self) -> Result<i64> {
        let (now, peak) = self.detect_pass()?;
        self.kick_pulse()?;
        self.last_peak = peak;

        let Some(last) = self.last_beat else {
            self.last_beat = Some(now);
            debug!(at_us = now, "baseline beat recorded");
            return Ok(0);
        };

        let elapsed = i64::from(now.wrapping_sub(last));
        let mode = self.mode;
        let tick = self.apply_interval(elapsed, peak);
        self.tick = !self.tick;
        self.prior_beat = Some(last);
        self.last_beat = Some(now);
        debug!(%mode, tick, elapsed_us = elapsed, uspb = self.uspb, "beat");
        Ok(self.uspb)
    }

    /// Two beats; returns their summed duration.
    pub fn cycle(&mut self) -> Result<i64> {
        let first = self.beat()?;
        let second = self.beat()?;
        Ok(first.saturating_add(second))
    }

    // Returns whether the interval was counted as a tick
    fn apply_interval(&mut self, elapsed: i64, peak: i32) -> bool {
        match self.mode {
            RunMode::Settling | RunMode::Scaling => {
                let target = if self.mode == RunMode::Scaling {
                    if peak > MAX_SCALED_PEAK {
                        self.peak_scale = self.peak_scale.saturating_add(1);
                    }
                    self.targets.scale
                } else {
                    self.targets.settle
                };
                self.uspb = self.corrected(elapsed);
                if self.tick {
                    self.tick_period = self.uspb;
                } else {
                    self.tock_period = self.uspb;
                    self.cycle_counter = self.cycle_counter.saturating_add(1);
                    if self.cycle_counter > target {
                        self.advance();
                    }
                }
            }
            RunMode::Calibrating => {
                // Averages assume calibration opens on a tick
                if self.tick_avg == 0 && !self.tick {
                    self.tick = true;
                }
                let period = self.corrected(elapsed);
                let n = i64::from(self.cur_smoothing);
                if self.tick {
                    self.tick_period = period;
                    if period != 0 {
                        self.tick_avg += (period - self.tick_avg) / n;
                    }
                } else {
                    self.tock_period = period;
                    if period != 0 {
                        self.tock_avg += (period - self.tock_avg) / n;
                    }
                    self.cur_smoothing = self.cur_smoothing.saturating_add(1);
                    if self.cur_smoothing > self.targets.smoothing {
                        self.advance();
                    }
                }
                self.uspb = if self.tock_avg == 0 {
                    self.tick_avg
                } else {
                    (self.tick_avg + self.tock_avg) / 2
                };
            }
            RunMode::CalFinish => self.advance(),
            RunMode::Running => {}
        }
        self.tick
    }

    fn corrected(&self, elapsed: i64) -> i64 {
        let c = correct_interval(elapsed, i64::from(self.bias));
        if c > MAX_INTERVAL_US {
            warn!(elapsed_us = elapsed, corrected_us = c, "interval too long, ignored");
            return 0;
        }
        c
    }

    fn advance(&mut self) {
        if let Some(next) = self.mode.next() {
            self.enter(next);
        }
    }

    fn enter(&mut self, mode: RunMode) {
        info!(from = %self.mode, to = %mode, cycles = ?self.cycle_count(), "run mode change");
        self.mode = mode;
        match mode {
            RunMode::Settling => self.cycle_counter = 1,
            RunMode::Scaling => {
                self.cycle_counter = 1;
                self.peak_scale = DEFAULT_PEAK_SCALE;
            }
            RunMode::Calibrating => {
                self.tick_avg = 0;
                self.tock_avg = 0;
                self.cur_smoothing = 1;
            }
            RunMode::CalFinish | RunMode::Running => {}
        }
    }

    // Blocks until the coil reading peaks; returns (timestamp, scaled peak)
    fn detect_pass(&mut self) -> Result<(u32, i32)> {
        self.clock.sleep_ms(self.detect.settle_ms);
        let deadline = self
            .detect
            .max_wait_ms
            .map(|ms| (self.clock.now_us(), ms.saturating_mul(1000)));

        let mut polls: u64 = 1;
        let mut cur = self.read_sense()?;
        while cur > 0 {
            self.check_deadline(deadline)?;
            cur = self.read_sense()?;
            polls += 1;
        }

        let mut past = 0;
        while cur >= past {
            self.check_deadline(deadline)?;
            past = cur;
            cur = self.read_sense()? / self.peak_scale;
            polls += 1;
        }

        let at = self.clock.now_us();
        trace!(peak = past, peak_scale = self.peak_scale, polls, "pass detected");
        Ok((at, past))
    }

    fn check_deadline(&self, deadline: Option<(u32, u64)>) -> Result<()> {
        if let Some((start, limit_us)) = deadline
            && u64::from(self.clock.us_since(start)) > limit_us
        {
            return Err(eyre::Report::new(BendulumError::Timeout)
                .wrap_err("waiting for the magnet to pass"));
        }
        Ok(())
    }

    fn read_sense(&mut self) -> Result<i32> {
        self.sense
            .read()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading sense coil")
    }

    fn kick_pulse(&mut self) -> Result<()> {
        let pulse = self.drive_kick();
        if pulse.is_err()
            && let Err(e) = self.kick.set_driving(false)
        {
            warn!(error = %e, "failed to return kick line to high impedance");
        }
        pulse
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("kick pulse")
    }

    fn drive_kick(&mut self) -> HwResult<()> {
        self.kick.set_driving(true)?;
        self.clock.sleep_ms(self.detect.kick_delay_ms);
        self.kick.set_level(true)?;
        self.clock.sleep_ms(self.detect.kick_ms);
        self.kick.set_level(false)?;
        self.kick.set_driving(false)
    }
}

// ── Queries and overrides ────────────────────────────────────────────────────

impl<S: SenseCoil, K: KickCoil> BeatEngine<S, K> {
    pub fn run_mode(&self) -> RunMode {
        self.mode
    }

    /// Switch mode, applying the same entry resets as an automatic transition.
    pub fn set_run_mode(&mut self, mode: RunMode) {
        self.enter(mode);
    }

    /// Cycles completed in the current mode; `None` while running.
    pub fn cycle_count(&self) -> Option<u32> {
        match self.mode {
            RunMode::Running => None,
            RunMode::Calibrating => Some(self.cur_smoothing),
            _ => Some(self.cycle_counter),
        }
    }

    pub fn tgt_settle(&self) -> u32 {
        self.targets.settle
    }
    pub fn set_tgt_settle(&mut self, cycles: u32) {
        self.targets.settle = cycles;
    }
    pub fn tgt_scale(&self) -> u32 {
        self.targets.scale
    }
    pub fn set_tgt_scale(&mut self, cycles: u32) {
        self.targets.scale = cycles;
    }
    pub fn tgt_smoothing(&self) -> u32 {
        self.targets.smoothing
    }
    pub fn set_tgt_smoothing(&mut self, cycles: u32) {
        self.targets.smoothing = cycles;
    }

    /// Clock correction in tenths of a second per day. Positive means the
    /// local microsecond is short.
    pub fn bias(&self) -> i32 {
        self.bias
    }
    pub fn set_bias(&mut self, tenths_per_day: i32) {
        self.bias = tenths_per_day;
    }
    pub fn incr_bias(&mut self, tenths_per_day: i32) -> i32 {
        self.bias = self.bias.saturating_add(tenths_per_day);
        self.bias
    }

    pub fn peak_scale(&self) -> i32 {
        self.peak_scale
    }

    /// Values below 1 are clamped; the scale divides every reading.
    pub fn set_peak_scale(&mut self, scale: i32) {
        if scale < 1 {
            warn!(requested = scale, "peak scale must be >= 1; using 1");
        }
        self.peak_scale = scale.max(1);
    }

    /// Scaled peak seen by the most recent detection.
    pub fn last_peak(&self) -> i32 {
        self.last_peak
    }

    /// True when the next beat will be counted as a tick.
    pub fn is_tick(&self) -> bool {
        self.tick
    }

    /// Whether a baseline timestamp has been recorded.
    pub fn has_baseline(&self) -> bool {
        self.last_beat.is_some()
    }

    pub fn avg_bpm(&self) -> f32 {
        let sum = i128::from(self.tick_avg) + i128::from(self.tock_avg);
        if sum == 0 {
            return 0.0;
        }
        (120_000_000.0 / sum as f64) as f32
    }

    /// Rate implied by the last interval alone.
    pub fn cur_bpm(&self) -> f32 {
        let (Some(last), Some(prior)) = (self.last_beat, self.prior_beat) else {
            return 0.0;
        };
        let diff = i64::from(last.wrapping_sub(prior));
        bpm_from_us(correct_interval(diff, i64::from(self.bias)))
    }

    /// Ratio of the last tick period to the last tock period.
    pub fn delta(&self) -> f32 {
        if self.tick_period == 0 || self.tock_period == 0 {
            return 0.0;
        }
        self.tick_period as f32 / self.tock_period as f32
    }

    pub fn beat_duration(&self) -> i64 {
        self.uspb
    }

    /// Overwrite the beat duration and both averages, bypassing calibration.
    ///
    /// Values outside `0..=MAX_INTERVAL_US` are clamped.
    pub fn set_beat_duration(&mut self, us: i64) {
        let us = clamp_beat(us);
        self.uspb = us;
        self.tick_avg = us;
        self.tock_avg = us;
    }

    /// Adjust the beat duration by a rate change in tenths of a second per day.
    ///
    /// The change is applied in steps small enough that `step * uspb` stays
    /// within `i32`. Each step rounds on its own and later steps compound on
    /// earlier ones, so one large adjustment can differ slightly from the
    /// same total given as a single step.
    pub fn incr_beat_duration(&mut self, tenths_per_day: i32) -> i64 {
        let mut remaining = i64::from(tenths_per_day);
        while remaining != 0 {
            let cap = (i64::from(i32::MAX) / self.uspb.saturating_abs().max(1)).max(1);
            let step = remaining.clamp(-cap, cap);
            self.uspb = correct_interval(self.uspb, step);
            remaining -= step;
            if self.uspb >= MAX_INTERVAL_US || self.uspb <= 0 {
                break;
            }
        }
        self.uspb = clamp_beat(self.uspb);
        self.tick_avg = self.uspb;
        self.tock_avg = self.uspb;
        self.uspb
    }

    pub fn tick_avg_us(&self) -> i64 {
        self.tick_avg
    }
    pub fn tock_avg_us(&self) -> i64 {
        self.tock_avg
    }
    pub fn tick_period_us(&self) -> i64 {
        self.tick_period
    }
    pub fn tock_period_us(&self) -> i64 {
        self.tock_period
    }

    pub fn detect_cfg(&self) -> &DetectCfg {
        &self.detect
    }

    pub fn kick_coil(&self) -> &K {
        &self.kick
    }
}

fn clamp_beat(us: i64) -> i64 {
    if !(0..=MAX_INTERVAL_US).contains(&us) {
        warn!(requested_us = us, "beat duration out of range; clamping");
    }
    us.clamp(0, MAX_INTERVAL_US)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{RecordingKick, ScriptedSense, StepClock};

    fn engine(step_us: u32) -> BeatEngine<ScriptedSense, RecordingKick> {
        BeatEngine::new(
            ScriptedSense::pulse(),
            RecordingKick::new(),
            Arc::new(StepClock::new(0, step_us)),
            DetectCfg::default(),
            ModeTargets::default(),
            0,
            DEFAULT_PEAK_SCALE,
        )
    }

    #[test]
    fn first_beat_is_a_baseline() {
        let mut e = engine(1_000_000);
        assert_eq!(e.beat().unwrap(), 0);
        assert!(e.has_baseline());
        assert!(e.is_tick());
        assert_eq!(e.run_mode(), RunMode::Settling);
        assert_eq!(e.last_peak(), 12);
    }

    #[test]
    fn second_beat_reports_the_interval() {
        let mut e = engine(1_000_000);
        e.beat().unwrap();
        assert_eq!(e.beat().unwrap(), 1_000_000);
        assert_eq!(e.tick_period_us(), 1_000_000);
        assert!(!e.is_tick());
        assert!((e.cur_bpm() - 60.0).abs() < 1e-3);
    }

    #[test]
    fn overlong_interval_is_zeroed() {
        let mut e = engine(5_000_001);
        e.beat().unwrap();
        assert_eq!(e.beat().unwrap(), 0);
        assert_eq!(e.tick_period_us(), 0);
    }

    #[test]
    fn interval_at_the_limit_is_kept() {
        let mut e = engine(5_000_000);
        e.beat().unwrap();
        assert_eq!(e.beat().unwrap(), 5_000_000);
    }

    #[test]
    fn bias_pushes_interval_over_the_limit() {
        let mut e = engine(5_000_000);
        e.set_bias(864);
        e.beat().unwrap();
        assert_eq!(e.beat().unwrap(), 0);
    }

    #[test]
    fn peak_scale_is_clamped() {
        let mut e = engine(1);
        e.set_peak_scale(0);
        assert_eq!(e.peak_scale(), 1);
        e.set_peak_scale(-7);
        assert_eq!(e.peak_scale(), 1);
        e.set_peak_scale(33);
        assert_eq!(e.peak_scale(), 33);
    }

    #[test]
    fn incr_bias_accumulates() {
        let mut e = engine(1);
        assert_eq!(e.incr_bias(5), 5);
        assert_eq!(e.incr_bias(-8), -3);
        assert_eq!(e.bias(), -3);
    }
}
