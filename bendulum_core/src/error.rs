use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BendulumError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for the magnet to pass")]
    Timeout,
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing sense coil")]
    MissingSense,
    #[error("missing kick coil")]
    MissingKick,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
