#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Arbitrary text must parse or fail cleanly, and a parsed config must validate or fail cleanly.
    if let Ok(cfg) = toml::from_str::<bendulum_config::Config>(data) {
        let _ = cfg.blocking_us();
        if cfg.validate().is_ok() {
            assert!(bendulum_config::parse_hms(&cfg.display.start).is_ok());
        }
    }
    let parsed: eyre::Result<u32> = bendulum_config::parse_hms(data);
    if let Ok(secs) = parsed {
        assert!(secs < 86_400);
    }
});
