//! Human-readable error descriptions and structured JSON error formatting.

use bendulum_core::error::{BendulumError, BuildError};

/// Exit codes beyond clap's own usage error (2).
pub const EXIT_GENERIC: i32 = 1;
pub const EXIT_TIMEOUT: i32 = 3;
pub const EXIT_HARDWARE: i32 = 4;

fn find_core_error(err: &eyre::Report) -> Option<&BendulumError> {
    err.chain().find_map(|e| e.downcast_ref::<BendulumError>())
}

fn find_build_error(err: &eyre::Report) -> Option<&BuildError> {
    err.chain().find_map(|e| e.downcast_ref::<BuildError>())
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = find_build_error(err) {
        return match be {
            BuildError::MissingSense | BuildError::MissingKick => format!(
                "What happened: {be}.\nLikely causes: The backend failed to initialize a coil.\nHow to fix: Run `bendulum self-check` and check the [pins] section."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: A cycle target, peak scale or known beat out of range.\nHow to fix: Edit the config file or the command-line override, then rerun."
            ),
        };
    }

    if let Some(de) = find_core_error(err) {
        return match de {
            BendulumError::Timeout => "What happened: No magnet pass was seen within detect.max_wait_ms.\nLikely causes: The pendulum stopped swinging, the sense coil is disconnected, or the wait is shorter than one beat.\nHow to fix: Give the pendulum a push, check the sense coil wiring, or raise detect.max_wait_ms (remove it to wait forever).".to_string(),
            BendulumError::HardwareFault(msg) => format!(
                "What happened: Hardware fault ({msg}).\nLikely causes: SPI or GPIO not enabled, wrong bus or pin numbers, or insufficient permissions.\nHow to fix: Check [pins] in the config and that the process may access /dev/spidev* and /dev/gpiomem."
            ),
            BendulumError::Hardware(msg) => format!(
                "What happened: A coil operation failed ({msg}).\nLikely causes: Loose wiring or a noisy supply.\nHow to fix: Check the coil connections, then re-run with --log-level=debug."
            ),
            BendulumError::Config(msg) => format!(
                "What happened: {msg}.\nLikely causes: A misspelled value.\nHow to fix: See `bendulum run --help` for accepted values."
            ),
        };
    }

    if err.chain().any(|e| e.is::<toml::de::Error>()) {
        return format!(
            "What happened: The config file is not valid TOML.\nLikely causes: A typo or a value of the wrong type.\nHow to fix: Fix the file and rerun. Details: {}",
            err.root_cause()
        );
    }

    // outer context and every cause, joined by ": "
    let msg = format!("{err:#}");
    if msg.contains("must be") || msg.contains("is invalid") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: An out-of-range value.\nHow to fix: Edit the TOML config or the command-line override and try again."
        );
    }

    format!(
        "Something went wrong: {msg}\nHow to fix: Re-run with --log-level=debug for details."
    )
}

/// Stable exit codes: 3 for a detection timeout, 4 for hardware trouble, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match find_core_error(err) {
        Some(BendulumError::Timeout) => EXIT_TIMEOUT,
        Some(BendulumError::Hardware(_) | BendulumError::HardwareFault(_)) => EXIT_HARDWARE,
        _ => EXIT_GENERIC,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if find_build_error(err).is_some() {
        return "Build";
    }
    match find_core_error(err) {
        Some(BendulumError::Timeout) => "Timeout",
        Some(BendulumError::Hardware(_)) => "Hardware",
        Some(BendulumError::HardwareFault(_)) => "HardwareFault",
        Some(BendulumError::Config(_)) => "Config",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    json!({
        "event": "error",
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
