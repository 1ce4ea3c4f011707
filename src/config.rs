//! Application configuration parameters
//!
//! All tunable timing parameters for the SensorTag core.  Defaults match the
//! shipped firmware; the simulator can override them from a JSON document.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::selftest::SelfTestBitmap;

/// Capacity of the application event queue.
pub const EVENT_QUEUE_DEPTH: usize = 16;

/// Core application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    // --- Timers ---
    /// One-shot periodic timer period (milliseconds)
    pub periodic_period_ms: u32,
    /// Free-running user periodic timer period (milliseconds)
    pub user_periodic_period_ms: u32,

    // --- Bus ---
    /// Maximum time to wait for the bus lock (milliseconds)
    pub bus_timeout_ms: u32,

    // --- Indicators ---
    /// On time of a single LED blink (milliseconds)
    pub blink_duration_ms: u32,
    /// Number of blinks signalling the boot self-test outcome
    pub test_indication_blinks: u8,

    // --- Self test ---
    /// Bits of the power-on self test to run
    pub self_test_map: u8,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            periodic_period_ms: 1000,
            user_periodic_period_ms: 500,
            bus_timeout_ms: 2500,
            blink_duration_ms: 5,
            test_indication_blinks: 5,
            self_test_map: SelfTestBitmap::TEST_MAP.bits(),
        }
    }
}

impl AppConfig {
    /// Parse a (possibly partial) JSON override document and validate it.
    /// Missing fields keep their default value.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|e| {
            log::warn!("Config: rejected JSON: {e}");
            ConfigError::Parse
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.periodic_period_ms == 0 {
            return Err(ConfigError::Invalid("periodic_period_ms"));
        }
        if self.user_periodic_period_ms == 0 {
            return Err(ConfigError::Invalid("user_periodic_period_ms"));
        }
        if self.bus_timeout_ms == 0 {
            return Err(ConfigError::Invalid("bus_timeout_ms"));
        }
        Ok(())
    }

    pub fn bus_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.bus_timeout_ms))
    }

    pub fn self_test_mask(&self) -> SelfTestBitmap {
        SelfTestBitmap::from_bits(self.self_test_map)
    }
}
