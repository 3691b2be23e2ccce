use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Short calibration so a run reaches RUNNING in ten beats:
// baseline + 2 settling + 2 scaling + 4 calibrating + 1 calfinish
const QUICK: &str = r#"
[calibration]
settle_cycles = 1
scale_cycles = 1
smoothing_cycles = 2

[display]
start = "06:30:00"
"#;

fn write_config(dir: &tempfile::TempDir, toml: &str) -> PathBuf {
    let path = dir.path().join("bendulum.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn bendulum(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("bendulum").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("BENDULUM_SIM_TICK_US")
        .env_remove("BENDULUM_SIM_TOCK_US")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["run", "--beats", "12"], 0, "calibration complete", "stdout")]
#[case(&["self-check"], 0, "OK: backend=sim", "stdout")]
#[case(&["run", "--mode", "sideways"], 2, "sideways", "stderr")]
#[case(&["run", "--beats", "many"], 2, "invalid value", "stderr")]
#[case(&["wind-up"], 2, "unrecognized subcommand", "stderr")]
#[case(&["run", "--beats", "1", "--bias", "900000"], 1, "--bias must be within", "stderr")]
#[case(&["run", "--beats", "1", "--beat-us", "0"], 1, "Invalid configuration", "stderr")]
#[case(&["run", "--beats", "1", "--start", "25:00:00"], 1, "out of range", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, QUICK);

    let mut cmd = bendulum(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn calibration_walks_through_every_mode() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, QUICK);

    let out = bendulum(&cfg)
        .args(["run", "--beats", "12"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&out);

    assert!(stdout.starts_with("06:30:00 start (settling)"), "{stdout}");
    for mode in ["settling", "scaling", "calibrating", "calfinish", "running"] {
        assert!(stdout.contains(mode), "no {mode} beat in: {stdout}");
    }
    assert_eq!(stdout.matches("calibration complete").count(), 1);
    assert!(stdout.contains("stopped after 12 beats in running"));
    // the baseline beat has no parity
    assert!(stdout.lines().nth(1).unwrap().contains(" base "));
}

#[rstest]
fn known_beat_drives_the_clock_from_the_start() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, QUICK);

    bendulum(&cfg)
        .args([
            "run",
            "--beats",
            "3",
            "--beat-us",
            "1000000",
            "--start",
            "12:00:00",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("12:00:00 start (running)"))
        .stdout(predicate::str::contains("12:00:02 stopped after 3 beats in running"))
        .stdout(predicate::str::contains("calibration complete").not());
}

#[rstest]
#[case::zero_target("[calibration]\nsettle_cycles = 0\n", "settle_cycles")]
#[case::bad_peak_scale("[calibration]\npeak_scale = 0\n", "peak_scale")]
#[case::long_kick("[detect]\nkick_ms = 2000\n", "kick_ms")]
#[case::bad_start("[display]\nstart = \"noon\"\n", "display.start")]
#[case::not_toml("[calibration\nsettle_cycles = 1\n", "not valid TOML")]
fn invalid_config_exits_one(#[case] toml: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, toml);

    bendulum(&cfg)
        .args(["run", "--beats", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(needle));
}

#[rstest]
fn missing_config_file_is_reported() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("nope.toml");

    bendulum(&cfg)
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("read config"));
}

#[rstest]
fn detection_timeout_exits_three() {
    let dir = tempdir().unwrap();
    // the simulated magnet first passes half a beat in, far beyond a 1 ms wait
    let cfg = write_config(&dir, "[detect]\nmax_wait_ms = 1\n");

    bendulum(&cfg)
        .args(["run", "--beats", "5"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("What happened: No magnet pass"));
}

#[rstest]
#[case("BENDULUM_SIM_TICK_US", "1000", "blocking time")]
#[case("BENDULUM_SIM_TOCK_US", "6000000", "<= 5000000")]
fn sim_period_env_overrides_are_validated(
    #[case] key: &str,
    #[case] value: &str,
    #[case] needle: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, QUICK);

    bendulum(&cfg)
        .env(key, value)
        .args(["run", "--beats", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(needle));
}

#[rstest]
fn log_file_receives_json_lines() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("logs").join("bendulum.log");
    let toml = format!(
        "{QUICK}\n[logging]\nfile = {:?}\nlevel = \"info\"\n",
        log.to_string_lossy()
    );
    let cfg = write_config(&dir, &toml);

    bendulum(&cfg).args(["run", "--beats", "12"]).assert().success();

    let text = fs::read_to_string(&log).expect("log file written");
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).expect("JSON log line"))
        .collect();
    assert!(
        lines
            .iter()
            .any(|v| v["fields"]["message"] == "beat loop start")
    );
    // one entry per mode transition
    let entered = lines
        .iter()
        .filter(|v| v["fields"]["to"].is_string())
        .count();
    assert_eq!(entered, 4, "{text}");
}
