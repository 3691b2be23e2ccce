//! CLI argument definitions and shared statics.

use bendulum_core::RunMode;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

/// Config file looked up when `--config` is not given. Missing is fine.
pub const DEFAULT_CONFIG: &str = "etc/bendulum.toml";

#[derive(Parser, Debug)]
#[command(name = "bendulum", version, about = "Bendulum clock driver")]
pub struct Cli {
    /// Path to config TOML (defaults to etc/bendulum.toml when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print beats and errors as JSON lines, and log as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Keep the pendulum swinging and drive the clock
    Run {
        /// Stop after this many beats (runs until Ctrl-C otherwise)
        #[arg(long, value_name = "N")]
        beats: Option<u64>,
        /// Force the starting run mode (settling|scaling|calibrating|calfinish|running)
        #[arg(long, value_name = "MODE")]
        mode: Option<RunMode>,
        /// Known beat duration in microseconds; skips auto calibration
        #[arg(long = "beat-us", value_name = "US")]
        beat_us: Option<i64>,
        /// Clock correction in tenths of a second per day (overrides config)
        #[arg(long, value_name = "TENTHS", allow_negative_numbers = true)]
        bias: Option<i32>,
        /// Time of day shown before the first beat (overrides display.start)
        #[arg(long, value_name = "HH:MM:SS")]
        start: Option<String>,
        /// Enable real-time mode (SCHED_FIFO and mlockall)
        #[arg(
            long,
            action = ArgAction::SetTrue,
            long_help = "Enable real-time mode on Linux.\n\nAttempts SCHED_FIFO priority and calls mlockall(MCL_CURRENT|MCL_FUTURE). Peak detection busy-polls the sense coil, so scheduler preemption shows up directly as beat jitter. Requires CAP_SYS_NICE and CAP_IPC_LOCK (or root); failures are logged and the run continues."
        )]
        rt: bool,
        /// Real-time priority for SCHED_FIFO (1..=max)
        #[arg(
            long,
            value_name = "PRIO",
            long_help = "SCHED_FIFO priority when --rt is enabled. Range is platform-defined (usually 1..=99) and out-of-range values are clamped. Defaults to the maximum."
        )]
        rt_prio: Option<i32>,
    },
    /// Build the configured backend and read the sense coil once
    SelfCheck,
}
