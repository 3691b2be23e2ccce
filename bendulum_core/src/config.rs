//! Runtime configuration for the beat engine.
//!
//! Separate from the TOML schema in `bendulum_config`; see `conversions` for
//! the mapping.

/// Cycles spent in each automatic phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTargets {
    pub settle: u32,
    pub scale: u32,
    pub smoothing: u32,
}

impl Default for ModeTargets {
    fn default() -> Self {
        Self {
            settle: 32,
            scale: 128,
            smoothing: 2048,
        }
    }
}

/// Timing of one detection and kick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectCfg {
    /// Quiet time before polling the sense coil (ms).
    pub settle_ms: u64,
    /// Delay between the detected peak and the start of the kick (ms).
    pub kick_delay_ms: u64,
    /// Kick pulse width (ms).
    pub kick_ms: u64,
    /// Give up on a beat after this long without a pass; `None` waits forever.
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
