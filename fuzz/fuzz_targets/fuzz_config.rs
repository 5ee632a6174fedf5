#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse or validation errors are fine; panics are not.
    let Ok(cfg) = pour_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        // A validated config must always yield an importable pump map.
        let _ = pour_config::check_pump_map(&cfg.pumps);
        let _ = cfg.unmapped_ingredients();
    }
});
