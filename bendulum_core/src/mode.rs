//! Operating phases of the beat engine and their forward order.

use std::fmt;
use std::str::FromStr;

use crate::error::BendulumError;

/// Run mode. The engine walks these in declaration order; only an explicit
/// `set_run_mode` moves it anywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunMode {
    /// Let the swing settle after a hand start; intervals measured, not averaged.
    Settling,
    /// Size the peak scale so detected peaks land in `[1, 2)`.
    Scaling,
    /// Average tick and tock intervals.
    Calibrating,
    /// One pass-through beat announcing that calibration finished.
    CalFinish,
    /// Steady state; the calibrated beat duration is held.
    Running,
}

impl RunMode {
    pub const ALL: [RunMode; 5] = [
        RunMode::Settling,
        RunMode::Scaling,
        RunMode::Calibrating,
        RunMode::CalFinish,
        RunMode::Running,
    ];

    /// The mode entered when this one completes. `Running` is terminal.
    pub fn next(self) -> Option<RunMode> {
        match self {
            RunMode::Settling => Some(RunMode::Scaling),
            RunMode::Scaling => Some(RunMode::Calibrating),
            RunMode::Calibrating => Some(RunMode::CalFinish),
            RunMode::CalFinish => Some(RunMode::Running),
            RunMode::Running => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Settling => "settling",
            RunMode::Scaling => "scaling",
            RunMode::Calibrating => "calibrating",
            RunMode::CalFinish => "calfinish",
            RunMode::Running => "running",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = BendulumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', '_'], "");
        RunMode::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| BendulumError::Config(format!("unknown run mode {s:?}")))
    }
}
