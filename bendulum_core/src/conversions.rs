//! `From` implementations bridging `bendulum_config` types to engine types.

use crate::config::{DetectCfg, ModeTargets};

impl From<&bendulum_config::CalibrationCfg> for ModeTargets {
    fn from(c: &bendulum_config::CalibrationCfg) -> Self {
        Self {
            settle: c.settle_cycles,
            scale: c.scale_cycles,
            smoothing: c.smoothing_cycles,
        }
    }
}

impl From<&bendulum_config::DetectCfg> for DetectCfg {
    fn from(c: &bendulum_config::DetectCfg) -> Self {
        Self {
            settle_ms: c.settle_ms,
            kick_delay_ms: c.kick_delay_ms,
            kick_ms: c.kick_ms,
            max_wait_ms: c.max_wait_ms,
        }
    }
}
