//! GPIO edge dispatch.
//!
//! Runs in interrupt context: it only updates the key bitmap atomically and
//! posts to the event hub.  Keys are active-low, the reed relay and the
//! motion interrupt are active-high.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::events::{EventFlag, EventSender};
use crate::sensors::keys::{KEY_LEFT, KEY_RELAY, KEY_RIGHT};

/// Board IO identifiers of the wired inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PinId {
    KeyLeft = 0,
    Relay = 3,
    KeyRight = 4,
    MotionInt = 7,
}

impl PinId {
    pub fn from_ioid(ioid: u8) -> Option<Self> {
        match ioid {
            0 => Some(Self::KeyLeft),
            3 => Some(Self::Relay),
            4 => Some(Self::KeyRight),
            7 => Some(Self::MotionInt),
            _ => None,
        }
    }
}

pub struct GpioDispatcher {
    events: EventSender,
    keys: AtomicU8,
}

impl GpioDispatcher {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            keys: AtomicU8::new(0),
        }
    }

    /// Current key bitmap.
    pub fn keys(&self) -> u8 {
        self.keys.load(Ordering::Acquire)
    }

    /// Edge callback for `pin` now reading `level`.  Returns `false` if the
    /// resulting message was dropped on a full queue.
    pub fn on_pin_edge(&self, pin: PinId, level: bool) -> bool {
        match pin {
            PinId::KeyLeft => self.update_key(KEY_LEFT, !level),
            PinId::KeyRight => self.update_key(KEY_RIGHT, !level),
            PinId::Relay => self.update_key(KEY_RELAY, level),
            PinId::MotionInt => {
                if level {
                    self.events.set_flag(EventFlag::MotionWake);
                }
                true
            }
        }
    }

    fn update_key(&self, mask: u8, pressed: bool) -> bool {
        let keys = if pressed {
            self.keys.fetch_or(mask, Ordering::AcqRel) | mask
        } else {
            self.keys.fetch_and(!mask, Ordering::AcqRel) & !mask
        };
        self.events.keys_changed(keys)
    }
}
