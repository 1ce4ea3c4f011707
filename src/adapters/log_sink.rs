//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade.  On the host simulator that is `env_logger` on stderr.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Booted { self_test } => {
                info!("BOOT  | self_test={self_test}");
            }
            AppEvent::LinkStateChanged { from, to } => {
                info!("LINK  | {from:?} -> {to:?}");
            }
            AppEvent::Telemetry(s) => {
                info!(
                    "TELEM | keys=0b{:03b} | acc=[{}, {}, {}] | T={:.1}\u{00b0}C | \
                     RH={:.1}% | light={:.1}lx",
                    s.key_state,
                    s.acc_raw[0],
                    s.acc_raw[1],
                    s.acc_raw[2],
                    s.temperature_c,
                    s.humidity_rh,
                    s.light_lux,
                );
            }
            AppEvent::AdvertisingRefreshed { key_state } => {
                info!("ADV   | refreshed, keys=0b{key_state:03b}");
            }
            AppEvent::SensorDegraded { service, error } => {
                warn!("SENSE | {service:?} skipped: {error}");
            }
            AppEvent::EventsDropped(count) => {
                warn!("QUEUE | {count} message(s) dropped");
            }
        }
    }
}
