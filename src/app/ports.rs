//! Port traits: the hexagonal boundary between the application core and
//! its collaborators.
//!
//! ```text
//!   Scheduler (domain) ──▶ Port trait ──▶ Adapter (stack, LEDs, clock, log)
//! ```
//!
//! The radio stack, the indicator hardware and the time base are all
//! external.  The [`Scheduler`](super::scheduler::Scheduler) reaches them
//! only through these traits, so the core runs unchanged against the
//! simulator adapters and the test mocks.

use crate::sensors::{ParamId, ServiceId};

/// Largest characteristic value the core reads or writes.
pub const CHAR_VALUE_MAX: usize = 20;

/// Characteristic value as stored in the attribute table.
pub type CharValue = heapless::Vec<u8, CHAR_VALUE_MAX>;

// ───────────────────────────────────────────────────────────────
// Stack port (driven adapter: domain → protocol stack)
// ───────────────────────────────────────────────────────────────

/// Calls the core makes into the protocol stack.
pub trait StackPort {
    /// Replace the advertising payload (at most 31 bytes).
    fn set_advertising_payload(&mut self, payload: &[u8]);

    /// Update a characteristic value and notify subscribers.
    fn set_characteristic_value(&mut self, service: ServiceId, param: ParamId, value: &[u8]);

    /// Current value of a characteristic, as last written by a client or
    /// by the core.
    fn characteristic_value(&self, service: ServiceId, param: ParamId) -> Option<CharValue>;

    /// Allow or forbid advertising while connected.
    fn set_advertising_enabled(&mut self, enabled: bool);

    /// The device's 6-byte public address.
    fn public_address(&self) -> [u8; 6];

    /// Publish the system ID characteristic.
    fn set_system_id(&mut self, id: [u8; 8]);

    /// Show a short status line (display or log, adapter's choice).
    fn report_status(&mut self, status: &str);
}

// ───────────────────────────────────────────────────────────────
// Indicator port (driven adapter: domain → LEDs / buzzer)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Led {
    /// Red.
    Led1,
    /// Green.
    Led2,
}

pub trait IndicatorPort {
    fn set_led(&mut self, led: Led, on: bool);

    fn set_buzzer(&mut self, on: bool);

    /// Blink `led` `count` times with `duration_ms` on time.
    fn blink(&mut self, led: Led, count: u8, duration_ms: u32);

    /// LEDs and buzzer off.
    fn all_off(&mut self) {
        self.set_led(Led::Led1, false);
        self.set_led(Led::Led2, false);
        self.set_buzzer(false);
    }
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond time base.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The core emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}
