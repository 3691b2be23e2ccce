use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bendulum_traits::{KickCoil, SenseCoil};

use crate::engine::BeatEngine;
use crate::error::Result as CoreResult;
use crate::mode::RunMode;
use crate::util::{MICROS_PER_DAY, MICROS_PER_SEC};

/// Time of day driven by beat durations. Wraps at midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    us: u64,
}

impl TimeOfDay {
    pub fn from_secs(secs: u32) -> Self {
        Self {
            us: (u64::from(secs) * MICROS_PER_SEC) % MICROS_PER_DAY,
        }
    }

    /// Parse "HH:MM:SS".
    pub fn parse(s: &str) -> eyre::Result<Self> {
        bendulum_config::parse_hms(s).map(Self::from_secs)
    }

    /// Add a beat. Returns true when the displayed second changed.
    /// Non-positive durations (baseline or rejected beats) are ignored.
    pub fn advance(&mut self, uspb: i64) -> bool {
        let Ok(step) = u64::try_from(uspb) else {
            return false;
        };
        if step == 0 {
            return false;
        }
        let before = self.secs();
        self.us = (self.us + step % MICROS_PER_DAY) % MICROS_PER_DAY;
        self.secs() != before
    }

    pub fn secs(&self) -> u32 {
        (self.us / MICROS_PER_SEC) as u32
    }

    pub fn hms(&self) -> (u32, u32, u32) {
        let s = self.secs();
        (s / 3600, (s / 60) % 60, s % 60)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s) = self.hms();
        write!(f, "{h:02}:{m:02}:{s:02}")
    }
}

/// What happened on one beat, handed to the runner callback.
#[derive(Debug, Clone)]
pub struct BeatReport {
    /// 0-based beat number since the runner started
    pub index: u64,
    pub uspb: i64,
    /// Mode after the beat was processed
    pub mode: RunMode,
    /// Whether the beat counted as a tick; `None` for the baseline beat
    pub tick: Option<bool>,
    pub time: TimeOfDay,
    pub second_changed: bool,
    pub mode_changed: bool,
}

#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    /// Stop after this many beats; `None` runs until shut down
    pub max_beats: Option<u64>,
    pub shutdown: Option<Arc<AtomicBool>>,
}

impl RunOptions {
    fn should_stop(&self, done: u64) -> bool {
        if self.max_beats.is_some_and(|n| done >= n) {
            return true;
        }
        self.shutdown
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
    }
}

/// Drive the engine beat after beat, advancing `time` and reporting each beat.
/// Returns the number of beats completed.
pub fn run<S, K, F>(
    engine: &mut BeatEngine<S, K>,
    time: &mut TimeOfDay,
    opts: &RunOptions,
    mut on_beat: F,
) -> CoreResult<u64>
where
    S: SenseCoil,
    K: KickCoil,
    F: FnMut(&BeatReport),
{
    tracing::info!(mode = %engine.run_mode(), start = %time, max_beats = ?opts.max_beats, "beat loop start");
    let mut done = 0u64;
    while !opts.should_stop(done) {
        let mode_before = engine.run_mode();
        let had_baseline = engine.has_baseline();
        let uspb = match engine.beat() {
            Ok(us) => us,
            Err(e) => {
                tracing::error!(error = %e, beats = done, "beat failed");
                return Err(e);
            }
        };
        let second_changed = time.advance(uspb);
        let report = BeatReport {
            index: done,
            uspb,
            mode: engine.run_mode(),
            tick: had_baseline.then(|| !engine.is_tick()),
            time: *time,
            second_changed,
            mode_changed: engine.run_mode() != mode_before,
        };
        on_beat(&report);
        done += 1;
    }
    tracing::info!(beats = done, mode = %engine.run_mode(), time = %time, "beat loop stop");
    Ok(done)
}
