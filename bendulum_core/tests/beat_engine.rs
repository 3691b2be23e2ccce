use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use bendulum_core::mocks::{KickEvent, RecordingKick, ScriptedSense, StepClock};
use bendulum_core::{BeatEngine, DetectCfg, ModeTargets, RunMode, build_engine};
use bendulum_traits::Clock;
use rstest::rstest;

type Engine = BeatEngine<ScriptedSense, RecordingKick>;

/// Beats land alternately `steps[0]` and `steps[1]` apart.
#[derive(Clone)]
struct AlternatingClock {
    now: Arc<AtomicU32>,
    calls: Arc<AtomicUsize>,
    steps: [u32; 2],
}

impl AlternatingClock {
    fn new(tick_us: u32, tock_us: u32) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
            steps: [tick_us, tock_us],
        }
    }
}

impl Clock for AlternatingClock {
    fn now_us(&self) -> u32 {
        let i = self.calls.fetch_add(1, Ordering::Relaxed);
        self.now.fetch_add(self.steps[i % 2], Ordering::Relaxed)
    }
    fn sleep(&self, _d: Duration) {}
}

fn engine_with_clock(clock: impl Clock + Send + Sync + 'static, targets: ModeTargets) -> Engine {
    build_engine(
        ScriptedSense::pulse(),
        RecordingKick::new(),
        Some(Arc::new(clock)),
        targets,
        DetectCfg::default(),
        0,
        None,
        None,
    )
    .unwrap()
}

fn engine(step_us: u32) -> Engine {
    engine_with_clock(StepClock::new(0, step_us), ModeTargets::default())
}

fn small_targets() -> ModeTargets {
    ModeTargets {
        settle: 2,
        scale: 3,
        smoothing: 4,
    }
}

#[test]
fn first_beat_records_baseline_then_second_returns_interval() {
    let mut e = engine(1_000_000);
    assert_eq!(e.beat().unwrap(), 0);
    assert_eq!(e.run_mode(), RunMode::Settling);
    assert_eq!(e.beat().unwrap(), 1_000_000);
    assert_eq!(e.beat_duration(), 1_000_000);
    assert_eq!(e.run_mode(), RunMode::Settling);
}

#[test]
fn every_beat_kicks_in_order_and_blocks_for_the_fixed_delays() {
    let clock = StepClock::new(0, 1_000_000);
    let mut e = engine_with_clock(clock.clone(), ModeTargets::default());
    e.beat().unwrap();
    assert_eq!(
        e.kick_coil().events(),
        &[
            KickEvent::Driving(true),
            KickEvent::Level(true),
            KickEvent::Level(false),
            KickEvent::Driving(false),
        ]
    );
    assert_eq!(clock.slept_us(), 305_000);
    e.beat().unwrap();
    assert_eq!(e.kick_coil().pulses(), 2);
    assert!(!e.kick_coil().is_driving());
    assert_eq!(clock.slept_us(), 610_000);
}

#[test]
fn modes_advance_after_the_configured_cycles() {
    let mut e = engine_with_clock(StepClock::new(0, 1_000_000), small_targets());
    e.beat().unwrap(); // baseline

    let mut modes = Vec::new();
    for _ in 0..19 {
        e.beat().unwrap();
        modes.push(e.run_mode());
    }
    let count = |m: RunMode| modes.iter().filter(|&&x| x == m).count();
    // the beat that completes a phase already reports the next mode
    assert_eq!(count(RunMode::Settling), 3);
    assert_eq!(modes[3], RunMode::Scaling);
    assert_eq!(count(RunMode::Scaling), 6);
    assert_eq!(modes[9], RunMode::Calibrating);
    assert_eq!(count(RunMode::Calibrating), 8);
    assert_eq!(modes[17], RunMode::CalFinish);
    assert_eq!(modes[18], RunMode::Running);
    assert_eq!(e.cycle_count(), None);
    assert_eq!(e.beat_duration(), 1_000_000);
}

#[test]
fn scaling_grows_the_peak_scale_once_per_beat() {
    let mut e = engine_with_clock(StepClock::new(0, 1_000_000), small_targets());
    for _ in 0..5 {
        e.beat().unwrap();
    }
    assert_eq!(e.run_mode(), RunMode::Scaling);
    assert_eq!(e.peak_scale(), 10);
    for _ in 0..6 {
        e.beat().unwrap();
    }
    assert_eq!(e.run_mode(), RunMode::Calibrating);
    // pulse peaks at 120 raw, so every scaled peak stays above 1
    assert_eq!(e.peak_scale(), 16);
    assert_eq!(e.last_peak(), 120 / 15);
}

#[test]
fn scaled_peak_is_the_detected_maximum() {
    let mut e = engine(1_000_000);
    e.set_peak_scale(25);
    e.beat().unwrap();
    assert_eq!(e.last_peak(), 120 / 25);
}

#[test]
fn cycle_counts_per_mode() {
    let mut e = engine_with_clock(StepClock::new(0, 1_000_000), small_targets());
    assert_eq!(e.cycle_count(), Some(1));
    e.beat().unwrap();
    e.beat().unwrap(); // tick
    assert_eq!(e.cycle_count(), Some(1));
    e.beat().unwrap(); // tock
    assert_eq!(e.cycle_count(), Some(2));
    e.set_run_mode(RunMode::Calibrating);
    assert_eq!(e.cycle_count(), Some(1));
    e.set_run_mode(RunMode::Running);
    assert_eq!(e.cycle_count(), None);
}

#[test]
fn entering_scaling_resets_counter_and_peak_scale() {
    let mut e = engine(1_000_000);
    e.set_peak_scale(42);
    for _ in 0..5 {
        e.beat().unwrap();
    }
    assert_eq!(e.cycle_count(), Some(3));
    e.set_run_mode(RunMode::Scaling);
    assert_eq!(e.peak_scale(), 10);
    assert_eq!(e.cycle_count(), Some(1));
}

#[test]
fn entering_calibrating_clears_averages() {
    let mut e = engine(1_000_000);
    e.set_beat_duration(5000);
    e.set_run_mode(RunMode::Calibrating);
    assert_eq!(e.tick_avg_us(), 0);
    assert_eq!(e.tock_avg_us(), 0);
    assert_eq!(e.cycle_count(), Some(1));
    // uspb itself is left alone until the next beat
    assert_eq!(e.beat_duration(), 5000);
}

#[test]
fn calibration_averages_ticks_and_tocks_separately() {
    let mut e = engine_with_clock(AlternatingClock::new(1_010_000, 990_000), small_targets());
    e.set_run_mode(RunMode::Calibrating);
    e.beat().unwrap(); // baseline
    assert_eq!(e.beat().unwrap(), 1_010_000); // tick only so far
    assert_eq!(e.beat().unwrap(), 1_000_000);
    assert_eq!(e.tick_avg_us(), 1_010_000);
    assert_eq!(e.tock_avg_us(), 990_000);
    assert!((e.avg_bpm() - 60.0).abs() < 1e-3);
    assert!((e.delta() - 1_010_000.0 / 990_000.0).abs() < 1e-5);
    assert_eq!(e.cycle_count(), Some(2));
}

#[test]
fn calibration_that_opens_on_a_tock_counts_it_as_a_tick() {
    let mut e = engine_with_clock(AlternatingClock::new(1_010_000, 990_000), small_targets());
    e.beat().unwrap(); // baseline
    e.beat().unwrap(); // settling tick
    assert!(!e.is_tick());
    e.set_run_mode(RunMode::Calibrating);
    assert_eq!(e.beat().unwrap(), 990_000);
    assert_eq!(e.tick_avg_us(), 990_000);
    assert_eq!(e.tock_avg_us(), 0);
    assert!(!e.is_tick());
}

#[test]
fn calibration_converges_on_the_running_average() {
    let mut e = engine_with_clock(AlternatingClock::new(1_000_400, 999_600), small_targets());
    e.set_run_mode(RunMode::Calibrating);
    e.beat().unwrap();
    while e.run_mode() == RunMode::Calibrating {
        e.beat().unwrap();
    }
    assert_eq!(e.run_mode(), RunMode::CalFinish);
    assert_eq!(e.tick_avg_us(), 1_000_400);
    assert_eq!(e.tock_avg_us(), 999_600);
    assert_eq!(e.beat_duration(), 1_000_000);
    e.beat().unwrap();
    assert_eq!(e.run_mode(), RunMode::Running);
}

#[test]
fn rejected_tock_still_counts_toward_smoothing() {
    let mut e = engine_with_clock(
        AlternatingClock::new(1_000_000, 6_000_000),
        ModeTargets {
            smoothing: 2,
            ..small_targets()
        },
    );
    e.set_run_mode(RunMode::Calibrating);
    e.beat().unwrap();
    for _ in 0..4 {
        assert_eq!(e.beat().unwrap(), 1_000_000);
        assert_eq!(e.tock_avg_us(), 0);
    }
    assert_eq!(e.tock_period_us(), 0);
    assert_eq!(e.run_mode(), RunMode::CalFinish);
    assert_eq!(e.delta(), 0.0);
}

#[test]
fn running_holds_the_beat_duration() {
    let mut e = engine_with_clock(AlternatingClock::new(900_000, 1_100_000), small_targets());
    e.set_run_mode(RunMode::Running);
    e.set_beat_duration(998_750);
    e.beat().unwrap();
    for _ in 0..6 {
        assert_eq!(e.beat().unwrap(), 998_750);
    }
    assert_eq!(e.tick_period_us(), 0);
}

#[test]
fn cycle_returns_the_sum_of_two_beats() {
    let mut e = engine(1_000_000);
    assert_eq!(e.cycle().unwrap(), 1_000_000);
    assert_eq!(e.cycle().unwrap(), 2_000_000);
}

#[test]
fn timestamps_survive_counter_wrap() {
    let clock = StepClock::new(u32::MAX - 400_000, 1_000_000);
    let mut e = engine_with_clock(clock, ModeTargets::default());
    e.beat().unwrap();
    assert_eq!(e.beat().unwrap(), 1_000_000);
    assert!((e.cur_bpm() - 60.0).abs() < 1e-3);
}

#[test]
fn bias_corrects_each_interval() {
    let mut e = engine(1_000_000);
    e.set_bias(-864);
    e.beat().unwrap();
    assert_eq!(e.beat().unwrap(), 999_000);
    assert!((e.cur_bpm() - 60_000_000.0 / 999_000.0).abs() < 1e-3);
}

#[test]
fn derived_queries_are_zero_until_established() {
    let mut e = engine(1_000_000);
    assert_eq!(e.avg_bpm(), 0.0);
    assert_eq!(e.cur_bpm(), 0.0);
    assert_eq!(e.delta(), 0.0);
    e.beat().unwrap();
    assert_eq!(e.cur_bpm(), 0.0);
    e.beat().unwrap();
    // tick known, tock not yet
    assert_eq!(e.delta(), 0.0);
    e.beat().unwrap();
    assert_eq!(e.delta(), 1.0);
}

#[test]
fn set_beat_duration_overwrites_all_three() {
    let mut e = engine(1);
    e.set_beat_duration(5000);
    assert_eq!(e.beat_duration(), 5000);
    assert_eq!(e.tick_avg_us(), 5000);
    assert_eq!(e.tock_avg_us(), 5000);
    assert!((e.avg_bpm() - 12_000.0).abs() < 1e-2);
}

#[rstest]
#[case(1_000_000, 864, 1_001_000)]
#[case(1_000_000, -864, 999_000)]
#[case(1_000_000, 0, 1_000_000)]
#[case(1_001_000, -864, 999_999)]
#[case(500_000, 1, 500_001)]
#[case(400_000, 1, 400_000)]
fn incr_beat_duration_single_step(#[case] start: i64, #[case] tenths: i32, #[case] want: i64) {
    let mut e = engine(1);
    e.set_beat_duration(start);
    assert_eq!(e.incr_beat_duration(tenths), want);
    assert_eq!(e.tick_avg_us(), want);
    assert_eq!(e.tock_avg_us(), want);
}

#[test]
fn large_increment_is_split_into_bounded_steps() {
    let mut e = engine(1);
    e.set_beat_duration(1_000_000);
    // cap at this uspb is i32::MAX / 1_000_000 = 2147 tenths per step
    let split = e.incr_beat_duration(10_000);
    let linear = 1_000_000 + 1_000_000 * 10_000 / 864_000;
    let compounded = (1_000_000f64 * (10_000f64 / 864_000f64).exp()) as i64;
    assert!(split >= linear - 5, "{split} < {linear}");
    assert!(split <= compounded + 5, "{split} > {compounded}");
}

#[rstest]
#[case(i64::MAX / 2 + 1, 5_000_000)]
#[case(i64::MAX, 5_000_000)]
#[case(-5, 0)]
fn set_beat_duration_clamps_to_the_interval_range(#[case] us: i64, #[case] want: i64) {
    let mut e = engine(1);
    e.set_beat_duration(us);
    assert_eq!(e.beat_duration(), want);
    assert_eq!(e.tick_avg_us(), want);
    assert_eq!(e.tock_avg_us(), want);
}

#[test]
fn huge_increment_stops_at_the_longest_interval() {
    let mut e = engine_with_clock(AlternatingClock::new(900_000, 1_100_000), small_targets());
    e.set_run_mode(RunMode::Running);
    e.set_beat_duration(1_000_000);
    assert_eq!(e.incr_beat_duration(50_000_000), 5_000_000);
    assert!((e.avg_bpm() - 12.0).abs() < 1e-4);

    e.beat().unwrap();
    assert_eq!(e.cycle().unwrap(), 10_000_000);

    assert_eq!(e.incr_beat_duration(-50_000_000), 0);
    assert_eq!(e.avg_bpm(), 0.0);
}

#[test]
fn tgt_setters_take_effect() {
    let mut e = engine(1_000_000);
    e.set_tgt_settle(1);
    e.set_tgt_scale(7);
    e.set_tgt_smoothing(9);
    assert_eq!((e.tgt_settle(), e.tgt_scale(), e.tgt_smoothing()), (1, 7, 9));
    e.beat().unwrap();
    e.beat().unwrap();
    e.beat().unwrap();
    assert_eq!(e.run_mode(), RunMode::Scaling);
}
