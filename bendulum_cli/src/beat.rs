//! The `run` command: config mapping, engine assembly and beat output.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use bendulum_config::{Config, TENTHS_PER_DAY};
use bendulum_core::runner::{self, BeatReport, RunOptions, TimeOfDay};
use bendulum_core::util::bpm_from_us;
use bendulum_core::{Bendulum, DetectCfg, ModeTargets, RunMode};
use eyre::WrapErr;
use serde_json::json;

use crate::backend::Backend;
use crate::rt::setup_rt_once;

/// Command-line overrides for a run, already parsed by clap.
#[derive(Debug, Default, Clone)]
pub struct RunArgs {
    pub beats: Option<u64>,
    pub mode: Option<RunMode>,
    pub beat_us: Option<i64>,
    pub bias: Option<i32>,
    pub start: Option<String>,
    pub rt: bool,
    pub rt_prio: Option<i32>,
}

/// Build the engine from config plus overrides.
pub fn build(cfg: &Config, args: &RunArgs, backend: Backend) -> eyre::Result<Bendulum> {
    let targets: ModeTargets = (&cfg.calibration).into();
    let detect: DetectCfg = (&cfg.detect).into();

    let bias = args.bias.unwrap_or(cfg.calibration.bias_tenths_per_day);
    if i64::from(bias).abs() > TENTHS_PER_DAY {
        eyre::bail!("--bias must be within +/-{TENTHS_PER_DAY} tenths per day");
    }

    let known_us = match (args.beat_us, cfg.known) {
        (Some(us), _) => Some(us),
        (None, Some(k)) => {
            Some(i64::try_from(k.beat_us).wrap_err("known.beat_us is invalid")?)
        }
        (None, None) => None,
    };
    let peak_scale = cfg
        .known
        .and_then(|k| k.peak_scale)
        .unwrap_or(cfg.calibration.peak_scale);

    let mut builder = backend
        .into_builder()
        .with_targets(targets)
        .with_detect(detect)
        .with_bias(bias)
        .with_peak_scale(peak_scale);
    if let Some(us) = known_us {
        builder = builder.with_known_beat(us);
    }
    let mut engine = builder.build()?;
    if let Some(mode) = args.mode {
        engine.set_run_mode(mode);
    }
    Ok(engine)
}

/// Drive the engine until `--beats` is reached or Ctrl-C. Returns the beats completed.
pub fn run_beats(
    cfg: &Config,
    args: &RunArgs,
    backend: Backend,
    json_out: bool,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<u64> {
    setup_rt_once(args.rt, args.rt_prio);

    let start = args.start.as_deref().unwrap_or(&cfg.display.start);
    let mut time = TimeOfDay::parse(start).wrap_err("--start is invalid")?;

    let backend_name = backend.name();
    let mut engine = build(cfg, args, backend)?;
    tracing::info!(
        backend = backend_name,
        mode = %engine.run_mode(),
        bias = engine.bias(),
        peak_scale = engine.peak_scale(),
        "engine ready"
    );
    if !json_out {
        println!("{time} start ({})", engine.run_mode());
    }

    let opts = RunOptions {
        max_beats: args.beats,
        shutdown: Some(shutdown),
    };
    let done = runner::run(&mut engine, &mut time, &opts, |r| print_beat(r, json_out))?;

    let uspb = engine.beat_duration();
    if json_out {
        println!(
            "{}",
            json!({
                "event": "summary",
                "beats": done,
                "mode": engine.run_mode().as_str(),
                "time": time.to_string(),
                "uspb": uspb,
                "bpm": engine.avg_bpm(),
                "bias": engine.bias(),
                "peak_scale": engine.peak_scale(),
            })
        );
    } else {
        println!(
            "{time} stopped after {done} beats in {}; beat {uspb} us ({:.3} bpm)",
            engine.run_mode(),
            bpm_from_us(uspb)
        );
    }
    Ok(done)
}

fn tick_label(tick: Option<bool>) -> &'static str {
    match tick {
        None => "base",
        Some(true) => "tick",
        Some(false) => "tock",
    }
}

fn print_beat(r: &BeatReport, json_out: bool) {
    let finished = r.mode_changed && r.mode == RunMode::CalFinish;
    if json_out {
        println!(
            "{}",
            json!({
                "event": "beat",
                "index": r.index,
                "time": r.time.to_string(),
                "mode": r.mode.as_str(),
                "tick": r.tick,
                "uspb": r.uspb,
                "mode_changed": r.mode_changed,
            })
        );
        if finished {
            println!(
                "{}",
                json!({ "event": "calibration_complete", "index": r.index, "time": r.time.to_string() })
            );
        }
        return;
    }

    println!(
        "{} {:>6} {:<11} {} {:>8} us",
        r.time,
        r.index,
        r.mode.as_str(),
        tick_label(r.tick),
        r.uspb
    );
    if finished {
        println!("{} calibration complete", r.time);
    }
}
