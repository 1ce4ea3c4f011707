//! Power-on self-test aggregation.
//!
//! Each bit of the mask names one part.  The aggregator asks the driver
//! that claims the bit to run its identity check, once, in ascending bit
//! order.  A failing or unclaimed bit stays clear and never stops the
//! remaining checks.

use core::fmt;

use log::{info, warn};

use crate::bus::{BusArbiter, BusTransport};
use crate::sensors::SensorRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SelfTestBitmap(u8);

impl SelfTestBitmap {
    pub const EMPTY: Self = Self(0);
    pub const IR_TEMP: Self = Self(0x01);
    pub const HUMIDITY: Self = Self(0x02);
    pub const LIGHT: Self = Self(0x04);
    pub const PRESSURE: Self = Self(0x08);
    pub const MPU: Self = Self(0x10);
    pub const MAG: Self = Self(0x20);
    pub const FLASH: Self = Self(0x40);
    /// Everything the boot test covers.
    pub const TEST_MAP: Self = Self(0x7F);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Single-bit members, lowest first.
    pub fn iter(self) -> impl Iterator<Item = Self> {
        (0..8)
            .map(|i| Self(1 << i))
            .filter(move |bit| self.contains(*bit))
    }
}

impl fmt::Display for SelfTestBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Runs the per-part checks and caches the last result.
#[derive(Debug, Default)]
pub struct SelfTestAggregator {
    last: SelfTestBitmap,
}

impl SelfTestAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run<T: BusTransport>(
        &mut self,
        mask: SelfTestBitmap,
        sensors: &mut SensorRegistry<T>,
        bus: &BusArbiter<T>,
    ) -> SelfTestBitmap {
        let mut passed = SelfTestBitmap::EMPTY;
        for bit in mask.iter() {
            let Some(driver) = sensors.self_test_owner(bit) else {
                warn!("Self-test: no test registered for bit {}", bit);
                continue;
            };
            if driver.self_test(bit, bus) {
                passed.insert(bit);
            } else {
                warn!("Self-test: {} failed bit {}", driver.name(), bit);
            }
        }
        info!("Self-test: mask={} passed={}", mask, passed);
        self.last = passed;
        passed
    }

    /// Result of the most recent run.
    pub fn last_result(&self) -> SelfTestBitmap {
        self.last
    }
}
