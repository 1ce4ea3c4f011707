//! Outbound application events.
//!
//! The [`Scheduler`](super::scheduler::Scheduler) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other side
//! decide what to do with them.

use crate::error::BusError;
use crate::fsm::ConnectionState;
use crate::selftest::SelfTestBitmap;
use crate::sensors::{SensorSnapshot, ServiceId};

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Boot finished; carries the power-on self-test result.
    Booted { self_test: SelfTestBitmap },

    /// The stack reported a new connection state.
    LinkStateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// Periodic task ran while connected.
    Telemetry(SensorSnapshot),

    /// The advertising payload was rebuilt.
    AdvertisingRefreshed { key_state: u8 },

    /// A driver skipped its work this cycle.
    SensorDegraded { service: ServiceId, error: BusError },

    /// Messages were lost on a full queue since the last report.
    EventsDropped(u32),
}
