pub mod error;
#[cfg(feature = "hardware")]
pub mod gpio_kick;
#[cfg(feature = "hardware")]
pub mod mcp3008;
pub mod sim;

pub use error::HwError;
pub use sim::{SimClock, SimKick, SimParams, SimSense, SimulatedBendulum};

#[cfg(feature = "hardware")]
pub use hardware::{HardwareKick, HardwareSense};

#[cfg(feature = "hardware")]
mod hardware {
    use bendulum_traits::{HwResult, KickCoil, SenseCoil};

    use crate::error::HwError;
    use crate::gpio_kick::GpioKick;
    use crate::mcp3008::Mcp3008;

    /// Sense coil read through an MCP3008 channel.
    pub struct HardwareSense {
        adc: Mcp3008,
    }

    impl HardwareSense {
        pub fn new(bus: u8, slave: u8, clock_hz: u32, channel: u8) -> Result<Self, HwError> {
            Ok(Self {
                adc: Mcp3008::new(bus, slave, clock_hz, channel)?,
            })
        }
    }

    impl SenseCoil for HardwareSense {
        fn read(&mut self) -> HwResult<i32> {
            match self.adc.read_raw() {
                Ok(v) => Ok(v),
                Err(e) => {
                    tracing::error!("sense read error: {}", e);
                    Err(Box::new(e))
                }
            }
        }
    }

    pub struct HardwareKick {
        line: GpioKick,
    }

    impl HardwareKick {
        pub fn new(bcm: u8) -> Result<Self, HwError> {
            Ok(Self {
                line: GpioKick::new(bcm)?,
            })
        }
    }

    impl KickCoil for HardwareKick {
        fn set_driving(&mut self, driving: bool) -> HwResult<()> {
            self.line.set_driving(driving);
            Ok(())
        }

        fn set_level(&mut self, active: bool) -> HwResult<()> {
            self.line.set_level(active)?;
            Ok(())
        }
    }
}
