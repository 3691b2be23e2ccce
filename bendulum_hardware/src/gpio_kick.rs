use rppal::gpio::{Gpio, IoPin, Mode};

use crate::error::{HwError, Result};

/// Kick line on a single GPIO that switches between input (high impedance)
/// and output so it can share the coil with the sense circuit.
pub struct GpioKick {
    pin: IoPin,
    driving: bool,
}

impl GpioKick {
    pub fn new(bcm: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let pin = gpio
            .get(bcm)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_io(Mode::Input);
        Ok(Self {
            pin,
            driving: false,
        })
    }

    pub fn set_driving(&mut self, driving: bool) {
        if driving {
            self.pin.set_low();
            self.pin.set_mode(Mode::Output);
        } else {
            self.pin.set_mode(Mode::Input);
        }
        self.driving = driving;
    }

    pub fn set_level(&mut self, active: bool) -> Result<()> {
        if !self.driving {
            return Err(HwError::KickNotDriving);
        }
        if active {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}
