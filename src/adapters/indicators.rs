//! In-memory indicator adapter.
//!
//! Tracks LED and buzzer state and counts blinks so the simulator and
//! tests can observe what the board would show.  Blinks complete
//! immediately; on hardware they are timed pulses.

use log::debug;

use crate::app::ports::{IndicatorPort, Led};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimIndicators {
    led1: bool,
    led2: bool,
    buzzer: bool,
    blinks: [u32; 2],
}

impl SimIndicators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn led(&self, led: Led) -> bool {
        match led {
            Led::Led1 => self.led1,
            Led::Led2 => self.led2,
        }
    }

    pub fn buzzer(&self) -> bool {
        self.buzzer
    }

    /// Total blinks shown on `led` since construction.
    pub fn blinks(&self, led: Led) -> u32 {
        self.blinks[Self::slot(led)]
    }

    fn slot(led: Led) -> usize {
        match led {
            Led::Led1 => 0,
            Led::Led2 => 1,
        }
    }
}

impl IndicatorPort for SimIndicators {
    fn set_led(&mut self, led: Led, on: bool) {
        match led {
            Led::Led1 => self.led1 = on,
            Led::Led2 => self.led2 = on,
        }
        debug!("Indicators: {led:?} {}", if on { "on" } else { "off" });
    }

    fn set_buzzer(&mut self, on: bool) {
        self.buzzer = on;
        debug!("Indicators: buzzer {}", if on { "on" } else { "off" });
    }

    fn blink(&mut self, led: Led, count: u8, duration_ms: u32) {
        let slot = Self::slot(led);
        self.blinks[slot] = self.blinks[slot].saturating_add(u32::from(count));
        debug!("Indicators: {led:?} blink x{count} ({duration_ms} ms)");
    }
}
