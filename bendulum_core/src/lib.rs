#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Beat engine for a magnet-driven bendulum or pendulum (hardware-agnostic).
//!
//! All hardware goes through `bendulum_traits::SenseCoil`, `KickCoil` and
//! `Clock`, so the same engine runs against a Raspberry Pi, the simulator in
//! `bendulum_hardware`, or the scripted mocks in [`mocks`].
//!
//! ## Architecture
//!
//! - **Engine**: detection, kick and per-mode averaging (`engine`)
//! - **Modes**: the SETTLING → SCALING → CALIBRATING → CALFINISH → RUNNING table (`mode`)
//! - **Correction**: integer clock-rate bias arithmetic (`fixed_point`)
//! - **Construction**: type-state builder and `build_engine` (`builder`)
//! - **Runner**: beat loop feeding a time-of-day display (`runner`)
//!
//! ## Units
//!
//! Timestamps are wrapping `u32` microseconds, as on the reference board.
//! Durations and averages are `i64` microseconds; bias is tenths of a second
//! per day.

pub mod builder;
pub mod config;
pub mod conversions;
pub mod engine;
pub mod error;
pub mod fixed_point;
pub mod hw_error;
pub mod mocks;
pub mod mode;
pub mod runner;
pub mod util;

pub use builder::{Bendulum, BendulumBuilder, Missing, Set, build_engine};
pub use config::{DetectCfg, ModeTargets};
pub use engine::{BeatEngine, DEFAULT_PEAK_SCALE};
pub use error::{BendulumError, BuildError, Result};
pub use mode::RunMode;
pub use runner::{BeatReport, RunOptions, TimeOfDay};
