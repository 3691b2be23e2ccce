//! Backend assembly: simulated bendulum by default, Raspberry Pi coils with `--features hardware`.

use bendulum_config::{Config, SimulationCfg};
use bendulum_core::hw_error::map_hw_error;
use bendulum_core::{Bendulum, BendulumBuilder, Set};
use bendulum_hardware::{SimParams, SimulatedBendulum};
use bendulum_traits::SenseCoil;
use eyre::WrapErr;

/// Environment overrides for the simulated swing, used by integration tests.
pub const SIM_TICK_ENV: &str = "BENDULUM_SIM_TICK_US";
pub const SIM_TOCK_ENV: &str = "BENDULUM_SIM_TOCK_US";

pub enum Backend {
    Sim(SimulatedBendulum),
    #[cfg(feature = "hardware")]
    Hardware {
        sense: bendulum_hardware::HardwareSense,
        kick: bendulum_hardware::HardwareKick,
    },
}

impl Backend {
    #[cfg(not(feature = "hardware"))]
    pub fn open(cfg: &Config) -> eyre::Result<Self> {
        let params = sim_params(cfg, env_us(SIM_TICK_ENV)?, env_us(SIM_TOCK_ENV)?)?;
        tracing::info!(
            tick_us = params.tick_us,
            tock_us = params.tock_us,
            peak = params.peak,
            "using simulated bendulum"
        );
        Ok(Backend::Sim(SimulatedBendulum::new(params)))
    }

    #[cfg(feature = "hardware")]
    pub fn open(cfg: &Config) -> eyre::Result<Self> {
        let p = &cfg.pins;
        let sense = bendulum_hardware::HardwareSense::new(
            p.spi_bus,
            p.spi_slave,
            p.spi_clock_hz,
            p.sense_channel,
        )
        .wrap_err("open sense coil ADC")?;
        let kick = bendulum_hardware::HardwareKick::new(p.kick_pin).wrap_err("open kick coil pin")?;
        tracing::info!(
            channel = p.sense_channel,
            kick_pin = p.kick_pin,
            "using hardware coils"
        );
        Ok(Backend::Hardware { sense, kick })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Sim(_) => "sim",
            #[cfg(feature = "hardware")]
            Backend::Hardware { .. } => "hardware",
        }
    }

    /// One raw sense reading, for the self-check.
    pub fn read_sense(&mut self) -> eyre::Result<i32> {
        let value = match self {
            Backend::Sim(sim) => sim.sense().read(),
            #[cfg(feature = "hardware")]
            Backend::Hardware { sense, .. } => sense.read(),
        };
        value
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading sense coil")
    }

    /// Hand the coils (and, for the simulation, its virtual clock) to an engine builder.
    pub fn into_builder(self) -> BendulumBuilder<Set, Set> {
        match self {
            Backend::Sim(sim) => Bendulum::builder()
                .with_clock(sim.clock())
                .with_sense(sim.sense())
                .with_kick(sim.kick()),
            #[cfg(feature = "hardware")]
            Backend::Hardware { sense, kick } => {
                Bendulum::builder().with_sense(sense).with_kick(kick)
            }
        }
    }
}

/// Map `[simulation]` onto the simulator, applying period overrides.
///
/// Overridden periods go through the same checks as the config file.
#[cfg_attr(feature = "hardware", allow(dead_code))]
pub fn sim_params(
    cfg: &Config,
    tick_us: Option<u64>,
    tock_us: Option<u64>,
) -> eyre::Result<SimParams> {
    let sim = SimulationCfg {
        tick_us: tick_us.unwrap_or(cfg.simulation.tick_us),
        tock_us: tock_us.unwrap_or(cfg.simulation.tock_us),
        ..cfg.simulation.clone()
    };
    if tick_us.is_some() || tock_us.is_some() {
        cfg.validate_simulation(&sim)
            .wrap_err_with(|| format!("{SIM_TICK_ENV}/{SIM_TOCK_ENV} override is invalid"))?;
    }
    Ok(SimParams {
        tick_us: sim.tick_us,
        tock_us: sim.tock_us,
        peak: sim.peak,
        rise_us: sim.rise_us,
        fall_us: sim.fall_us,
        sample_us: sim.sample_us,
        start_us: sim.start_us,
    })
}

#[cfg_attr(feature = "hardware", allow(dead_code))]
fn env_us(key: &str) -> eyre::Result<Option<u64>> {
    match std::env::var(key) {
        Ok(v) => {
            let us: u64 = v
                .trim()
                .parse()
                .wrap_err_with(|| format!("{key} must be a number of microseconds, got {v:?}"))?;
            if us == 0 {
                eyre::bail!("{key} must be > 0");
            }
            Ok(Some(us))
        }
        Err(_) => Ok(None),
    }
}
