#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the bendulum driver.
//!
//! - `Config` and its sections are deserialized from TOML; every section is optional.
//! - `Config::validate()` rejects values the beat engine or the simulator cannot work with.
use serde::Deserialize;

/// Longest interval the engine accepts as a real beat (μs).
pub const MAX_BEAT_US: u64 = 5_000_000;

/// Tenths of a second in one day; a bias of this size is a 100% rate correction.
pub const TENTHS_PER_DAY: i64 = 864_000;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pins {
    /// ADC channel wired across the sense coil
    pub sense_channel: u8,
    /// BCM GPIO driving the kick pulse
    pub kick_pin: u8,
    pub spi_bus: u8,
    pub spi_slave: u8,
    pub spi_clock_hz: u32,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            sense_channel: 2,
            kick_pin: 12,
            spi_bus: 0,
            spi_slave: 0,
            spi_clock_hz: 1_000_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Cycles spent letting the swing settle after a hand start
    pub settle_cycles: u32,
    /// Cycles spent sizing the peak scale
    pub scale_cycles: u32,
    /// Cycles averaged while calibrating the beat duration
    pub smoothing_cycles: u32,
    /// Clock correction in tenths of a second per day
    pub bias_tenths_per_day: i32,
    /// Initial divisor applied to sense readings
    pub peak_scale: i32,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            settle_cycles: 32,
            scale_cycles: 128,
            smoothing_cycles: 2048,
            bias_tenths_per_day: 0,
            peak_scale: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DetectCfg {
    /// Quiet time before looking for the next pass
    pub settle_ms: u64,
    /// Delay between detecting the peak and starting the kick
    pub kick_delay_ms: u64,
    /// Kick pulse width
    pub kick_ms: u64,
    /// Give up waiting for a pass after this long; absent waits forever
    pub max_wait_ms: Option<u64>,
}

impl Default for DetectCfg {
    fn default() -> Self {
        Self {
            settle_ms: 250,
            kick_delay_ms: 5,
            kick_ms: 50,
            max_wait_ms: None,
        }
    }
}

/// Parameters of a bendulum whose beat is already known; skips auto calibration.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct KnownCfg {
    pub beat_us: u64,
    #[serde(default)]
    pub peak_scale: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DisplayCfg {
    /// Time of day shown before the first beat, "HH:MM:SS"
    pub start: String,
}

impl Default for DisplayCfg {
    fn default() -> Self {
        Self {
            start: "00:00:00".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationCfg {
    pub tick_us: u64,
    pub tock_us: u64,
    /// Peak sense reading in ADC counts
    pub peak: i32,
    pub rise_us: u64,
    pub fall_us: u64,
    /// Time consumed by one ADC conversion
    pub sample_us: u64,
    /// Initial counter value; set near u32::MAX to exercise the wrap
    pub start_us: u64,
}

impl Default for SimulationCfg {
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

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub pins: Pins,
    pub calibration: CalibrationCfg,
    pub detect: DetectCfg,
    pub known: Option<KnownCfg>,
    pub display: DisplayCfg,
    pub simulation: SimulationCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Parse "HH:MM:SS" into seconds past midnight.
pub fn parse_hms(s: &str) -> eyre::Result<u32> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    let [h, m, sec] = parts.as_slice() else {
        eyre::bail!("time must look like HH:MM:SS, got {s:?}");
    };
    let field = |v: &str, max: u32, name: &str| -> eyre::Result<u32> {
        let n: u32 = v
            .parse()
            .map_err(|_| eyre::eyre!("time {name} is not a number in {s:?}"))?;
        if n > max {
            eyre::bail!("time {name} out of range in {s:?}");
        }
        Ok(n)
    };
    Ok(field(*h, 23, "hours")? * 3600
        + field(*m, 59, "minutes")? * 60
        + field(*sec, 59, "seconds")?)
}

impl Config {
    /// Time the engine blocks per beat before it can look for the next pass (μs).
    pub fn blocking_us(&self) -> u64 {
        self.detect
            .settle_ms
            .saturating_add(self.detect.kick_delay_ms)
            .saturating_add(self.detect.kick_ms)
            .saturating_mul(1000)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Calibration
        if self.calibration.settle_cycles == 0 {
            eyre::bail!("calibration.settle_cycles must be >= 1");
        }
        if self.calibration.scale_cycles == 0 {
            eyre::bail!("calibration.scale_cycles must be >= 1");
        }
        if self.calibration.smoothing_cycles == 0 {
            eyre::bail!("calibration.smoothing_cycles must be >= 1");
        }
        if self.calibration.peak_scale < 1 {
            eyre::bail!("calibration.peak_scale must be >= 1");
        }
        if i64::from(self.calibration.bias_tenths_per_day).abs() > TENTHS_PER_DAY {
            eyre::bail!("calibration.bias_tenths_per_day must be within +/-{TENTHS_PER_DAY}");
        }

        // Detect
        if self.detect.kick_ms == 0 {
            eyre::bail!("detect.kick_ms must be > 0");
        }
        if self.detect.kick_delay_ms.saturating_add(self.detect.kick_ms) >= 1000 {
            eyre::bail!("detect.kick_delay_ms + detect.kick_ms must be < 1000");
        }
        if self.detect.max_wait_ms == Some(0) {
            eyre::bail!("detect.max_wait_ms must be >= 1 when set");
        }

        // Known beat
        if let Some(known) = self.known {
            if known.beat_us == 0 || known.beat_us > MAX_BEAT_US {
                eyre::bail!("known.beat_us must be in 1..={MAX_BEAT_US}");
            }
            if let Some(p) = known.peak_scale
                && p < 1
            {
                eyre::bail!("known.peak_scale must be >= 1");
            }
        }

        // Display
        parse_hms(&self.display.start)
            .map_err(|e| eyre::eyre!("display.start is invalid: {e}"))?;

        self.validate_simulation(&self.simulation)
    }

    /// Check a simulated swing against this config's detection timing.
    pub fn validate_simulation(&self, sim: &SimulationCfg) -> eyre::Result<()> {
        if sim.peak <= 0 {
            eyre::bail!("simulation.peak must be > 0");
        }
        if sim.rise_us == 0 || sim.fall_us == 0 {
            eyre::bail!("simulation.rise_us and simulation.fall_us must be > 0");
        }
        if sim.sample_us == 0 {
            eyre::bail!("simulation.sample_us must be > 0");
        }
        let shortest = sim.tick_us.min(sim.tock_us);
        let pulse_us = sim.rise_us.saturating_add(sim.fall_us);
        if shortest <= self.blocking_us().saturating_add(pulse_us) {
            eyre::bail!(
                "simulation periods must exceed the per-beat blocking time ({} us) plus the pulse",
                self.blocking_us()
            );
        }
        if sim.tick_us.max(sim.tock_us) > MAX_BEAT_US {
            eyre::bail!("simulation periods must be <= {MAX_BEAT_US} us");
        }

        Ok(())
    }
}
