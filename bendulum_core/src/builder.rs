//! Type-state builder for `Bendulum` and the generic `build_engine` constructor.
//!
//! The builder enforces at compile time that a sense coil and a kick coil are
//! provided before `build()` is available. `try_build()` is always available
//! for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use bendulum_traits::{Clock, KickCoil, MonotonicClock, SenseCoil};

use crate::config::{DetectCfg, ModeTargets};
use crate::engine::{BeatEngine, DEFAULT_PEAK_SCALE};
use crate::error::{BuildError, Result};
use crate::mode::RunMode;
use crate::util::MAX_INTERVAL_US;

/// Boxed engine for callers that pick the backend at runtime.
pub type Bendulum = BeatEngine<Box<dyn SenseCoil>, Box<dyn KickCoil>>;

impl Bendulum {
    /// Start building a boxed engine.
    pub fn builder() -> BendulumBuilder<Missing, Missing> {
        BendulumBuilder::default()
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Bendulum`. Everything is validated on `build()`.
pub struct BendulumBuilder<S, K> {
    sense: Option<Box<dyn SenseCoil>>,
    kick: Option<Box<dyn KickCoil>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    targets: Option<ModeTargets>,
    detect: Option<DetectCfg>,
    bias: i32,
    peak_scale: Option<i32>,
    known_beat_us: Option<i64>,
    _s: PhantomData<S>,
    _k: PhantomData<K>,
}

impl Default for BendulumBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            sense: None,
            kick: None,
            clock: None,
            targets: None,
            detect: None,
            bias: 0,
            peak_scale: None,
            known_beat_us: None,
            _s: PhantomData,
            _k: PhantomData,
        }
    }
}

/// Validate settings and construct a `BeatEngine`.
///
/// Shared by `BendulumBuilder::try_build()` and `build_engine()`.
#[allow(clippy::too_many_arguments)]
fn validate_and_build<S: SenseCoil, K: KickCoil>(
    sense: S,
    kick: K,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    targets: ModeTargets,
    detect: DetectCfg,
    bias: i32,
    peak_scale: i32,
    known_beat_us: Option<i64>,
) -> Result<BeatEngine<S, K>> {
    if targets.settle == 0 || targets.scale == 0 || targets.smoothing == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "mode targets must be >= 1 cycle",
        )));
    }
    if peak_scale < 1 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "peak scale must be >= 1",
        )));
    }
    if detect.kick_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "kick pulse must be > 0 ms",
        )));
    }
    if detect.max_wait_ms == Some(0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "max wait must be >= 1 ms",
        )));
    }
    if let Some(us) = known_beat_us
        && !(1..=MAX_INTERVAL_US).contains(&us)
    {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "known beat duration out of range",
        )));
    }

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(c) => c,
        None => Arc::new(MonotonicClock::new()),
    };
    let mut engine = BeatEngine::new(sense, kick, clock, detect, targets, bias, peak_scale);
    if let Some(us) = known_beat_us {
        engine.mode = RunMode::Running;
        engine.set_beat_duration(us);
    }
    tracing::debug!(?targets, ?detect, bias, peak_scale, known_beat_us, "beat engine built");
    Ok(engine)
}

impl<S, K> BendulumBuilder<S, K> {
    /// Provide a custom clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }
    pub fn with_targets(mut self, targets: ModeTargets) -> Self {
        self.targets = Some(targets);
        self
    }
    pub fn with_detect(mut self, detect: DetectCfg) -> Self {
        self.detect = Some(detect);
        self
    }
    pub fn with_bias(mut self, tenths_per_day: i32) -> Self {
        self.bias = tenths_per_day;
        self
    }
    pub fn with_peak_scale(mut self, scale: i32) -> Self {
        self.peak_scale = Some(scale);
        self
    }
    /// Skip calibration: start in RUNNING with this beat duration (μs).
    pub fn with_known_beat(mut self, us: i64) -> Self {
        self.known_beat_us = Some(us);
        self
    }

    /// Validate and build regardless of type-state; reports missing coils at runtime.
    pub fn try_build(self) -> Result<Bendulum> {
        let sense = self
            .sense
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSense))?;
        let kick = self
            .kick
            .ok_or_else(|| eyre::Report::new(BuildError::MissingKick))?;
        validate_and_build(
            sense,
            kick,
            self.clock,
            self.targets.unwrap_or_default(),
            self.detect.unwrap_or_default(),
            self.bias,
            self.peak_scale.unwrap_or(DEFAULT_PEAK_SCALE),
            self.known_beat_us,
        )
    }
}

impl<K> BendulumBuilder<Missing, K> {
    pub fn with_sense(self, sense: impl SenseCoil + 'static) -> BendulumBuilder<Set, K> {
        BendulumBuilder {
            sense: Some(Box::new(sense)),
            kick: self.kick,
            clock: self.clock,
            targets: self.targets,
            detect: self.detect,
            bias: self.bias,
            peak_scale: self.peak_scale,
            known_beat_us: self.known_beat_us,
            _s: PhantomData,
            _k: PhantomData,
        }
    }
}

impl<S> BendulumBuilder<S, Missing> {
    pub fn with_kick(self, kick: impl KickCoil + 'static) -> BendulumBuilder<S, Set> {
        BendulumBuilder {
            sense: self.sense,
            kick: Some(Box::new(kick)),
            clock: self.clock,
            targets: self.targets,
            detect: self.detect,
            bias: self.bias,
            peak_scale: self.peak_scale,
            known_beat_us: self.known_beat_us,
            _s: PhantomData,
            _k: PhantomData,
        }
    }
}

impl BendulumBuilder<Set, Set> {
    /// Validate and build. Only available once both coils are set.
    pub fn build(self) -> Result<Bendulum> {
        self.try_build()
    }
}

/// Build a statically-dispatched engine from concrete coils.
#[allow(clippy::too_many_arguments)]
pub fn build_engine<S, K>(
    sense: S,
    kick: K,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    targets: ModeTargets,
    detect: DetectCfg,
    bias: i32,
    peak_scale: Option<i32>,
    known_beat_us: Option<i64>,
) -> Result<BeatEngine<S, K>>
where
    S: SenseCoil,
    K: KickCoil,
{
    validate_and_build(
        sense,
        kick,
        clock,
        targets,
        detect,
        bias,
        peak_scale.unwrap_or(DEFAULT_PEAK_SCALE),
        known_beat_us,
    )
}
