//! Fuzz target: `AppConfig::from_json`.
//!
//! Invariants checked:
//! - No panics on arbitrary input
//! - Every accepted document yields a configuration that validates
//!
//! cargo fuzz run fuzz_config_json

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensortag::config::AppConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = AppConfig::from_json(text) {
        assert!(config.validate().is_ok());
        assert!(config.periodic_period_ms > 0);
        assert!(config.bus_timeout_ms > 0);
    }
});
