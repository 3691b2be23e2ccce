mod backend;
mod beat;
mod cli;
mod error_fmt;
mod rt;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bendulum_config::{Config, Logging};
use clap::Parser;
use eyre::{Result, WrapErr};
use serde_json::json;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::backend::Backend;
use crate::beat::RunArgs;
use crate::cli::{Cli, Commands, DEFAULT_CONFIG, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn main() {
    // clap exits with code 2 on usage errors
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        tracing::debug!(error = ?err, "exiting with error");
        std::process::exit(exit_code_for_error(&err));
    }
}

fn real_main(cli: Cli) -> Result<()> {
    color_eyre::install()?;

    let cfg = load_config(cli.config.as_deref())?;
    // flushes the file appender when dropped
    let _log_guard = init_tracing(&cli, &cfg.logging)?;

    match cli.cmd {
        Commands::SelfCheck => self_check(&cfg, cli.json),
        Commands::Run {
            beats,
            mode,
            beat_us,
            bias,
            start,
            rt,
            rt_prio,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&shutdown);
            ctrlc::set_handler(move || {
                flag.store(true, Ordering::Relaxed);
            })
            .wrap_err("install Ctrl-C handler")?;

            let args = RunArgs {
                beats,
                mode,
                beat_us,
                bias,
                start,
                rt,
                rt_prio,
            };
            let backend = Backend::open(&cfg)?;
            beat::run_beats(&cfg, &args, backend, cli.json, shutdown)?;
            Ok(())
        }
    }
}

/// Read and validate the config. Without `--config` the default path is used if it exists.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let path: PathBuf = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = PathBuf::from(DEFAULT_CONFIG);
            if !p.exists() {
                return Ok(Config::default());
            }
            p
        }
    };
    let text = std::fs::read_to_string(&path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = bendulum_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

fn init_tracing(cli: &Cli, logging: &Logging) -> Result<Option<WorkerGuard>> {
    // RUST_LOG wins over --log-level
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));

    let console: BoxedLayer = if cli.json {
        Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
    };
    let mut layers: Vec<BoxedLayer> = vec![Box::new(console.with_filter(console_filter))];

    let mut guard = None;
    if let Some(file) = logging.file.as_deref() {
        let (layer, g) = file_layer(file, logging)?;
        layers.push(layer);
        guard = Some(g);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(guard)
}

/// JSON-lines file appender configured by `[logging]`.
fn file_layer(file: &str, logging: &Logging) -> Result<(BoxedLayer, WorkerGuard)> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};

    let path = Path::new(file);
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let prefix = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| eyre::eyre!("logging.file must name a file, got {file:?}"))?;
    let rotation = match logging.rotation.as_deref().unwrap_or("never") {
        "never" => Rotation::NEVER,
        "daily" => Rotation::DAILY,
        "hourly" => Rotation::HOURLY,
        other => eyre::bail!("logging.rotation must be never, daily or hourly, got {other:?}"),
    };
    std::fs::create_dir_all(dir).wrap_err_with(|| format!("create log dir {}", dir.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(prefix)
        .build(dir)
        .wrap_err("open log file")?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let level = logging.level.as_deref().unwrap_or("info");
    let layer: BoxedLayer = Box::new(
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_filter(EnvFilter::new(level)),
    );
    Ok((layer, guard))
}

/// Build the configured backend and read the sense coil once.
fn self_check(cfg: &Config, json_out: bool) -> Result<()> {
    let mut backend = Backend::open(cfg)?;
    let reading = backend.read_sense()?;
    let name = backend.name();
    // the engine must also accept the config
    beat::build(cfg, &RunArgs::default(), backend)?;
    tracing::info!(backend = name, reading, "self-check ok");
    if json_out {
        println!(
            "{}",
            json!({ "event": "self_check", "backend": name, "sense": reading, "ok": true })
        );
    } else {
        println!("OK: backend={name} sense={reading}");
    }
    Ok(())
}
