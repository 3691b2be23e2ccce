//! Maps `Box<dyn Error>` from trait boundaries to typed `BendulumError`.
//!
//! The coil and clock traits use `Box<dyn Error + Send + Sync>` so any backend
//! can plug in; known hardware errors are downcast behind the
//! `hardware-errors` feature, everything else goes through a string check.

use crate::error::BendulumError;

/// Map a trait-boundary error to a typed `BendulumError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> BendulumError {
    #[cfg(feature = "hardware-errors")]
    {
        use bendulum_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
                    BendulumError::Timeout
                }
                other => BendulumError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        BendulumError::Timeout
    } else {
        BendulumError::Hardware(s)
    }
}
