pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Error type used at every hardware trait boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Analog input wired across the sense coil.
pub trait SenseCoil {
    /// One instantaneous sample, proportional to the voltage induced in the coil.
    fn read(&mut self) -> HwResult<i32>;
}

/// The line used to push the magnet just after it passes the coil.
pub trait KickCoil {
    /// `true` switches the line to output mode; `false` returns it to
    /// high impedance so induced current does not flow to ground.
    fn set_driving(&mut self, driving: bool) -> HwResult<()>;
    /// Drive the line high or low. Only meaningful while driving.
    fn set_level(&mut self, active: bool) -> HwResult<()>;
}

impl<T: SenseCoil + ?Sized> SenseCoil for Box<T> {
    fn read(&mut self) -> HwResult<i32> {
        (**self).read()
    }
}

impl<T: KickCoil + ?Sized> KickCoil for Box<T> {
    fn set_driving(&mut self, driving: bool) -> HwResult<()> {
        (**self).set_driving(driving)
    }
    fn set_level(&mut self, active: bool) -> HwResult<()> {
        (**self).set_level(active)
    }
}
