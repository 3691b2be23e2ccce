use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use tracing::trace;

use crate::error::{HwError, Result};

/// MCP3008 10-bit ADC on the SPI bus, single-ended mode, one channel.
pub struct Mcp3008 {
    spi: Spi,
    channel: u8,
}

impl Mcp3008 {
    pub fn new(bus: u8, slave: u8, clock_hz: u32, channel: u8) -> Result<Self> {
        if channel > 7 {
            return Err(HwError::Spi(format!("mcp3008 has no channel {channel}")));
        }
        let bus = match bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            2 => Bus::Spi2,
            other => return Err(HwError::Spi(format!("unsupported spi bus {other}"))),
        };
        let ss = match slave {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            2 => SlaveSelect::Ss2,
            other => return Err(HwError::Spi(format!("unsupported slave select {other}"))),
        };
        let spi = Spi::new(bus, ss, clock_hz, Mode::Mode0).map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(Self { spi, channel })
    }

    pub fn read_raw(&mut self) -> Result<i32> {
        // start bit, single-ended + channel, then clock out 10 result bits
        let tx = [0x01, 0x80 | (self.channel << 4), 0x00];
        let mut rx = [0u8; 3];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        let value = (i32::from(rx[1] & 0x03) << 8) | i32::from(rx[2]);
        trace!(raw = value, channel = self.channel, "mcp3008 read");
        Ok(value)
    }
}
