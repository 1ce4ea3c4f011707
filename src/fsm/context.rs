//! Blackboard shared by the link state handlers.
//!
//! Handlers read the public address and the reconnection latch, and write
//! their side-effect requests into [`LinkEffects`].  The scheduler takes the
//! record after each notification and applies it through the ports.

/// Side effects requested by one state entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkEffects {
    /// System ID to publish in the device information service.
    pub system_id: Option<[u8; 8]>,
    /// Status line to report.
    pub status: Option<&'static str>,
    /// Arm the one-shot periodic timer if it is not already running.
    pub arm_periodic: bool,
    /// Rebuild the advertising payload with the key state cleared.
    pub refresh_advert: bool,
    /// Turn both LEDs and the buzzer off.
    pub indicators_off: bool,
    /// Allow advertising while connected.
    pub enable_advertising: bool,
    /// Reset every registered sensor driver.
    pub reset_sensors: bool,
    /// Latch LED1 on as the persistent error indicator.
    pub error_indicator: bool,
}

impl LinkEffects {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinkContext {
    /// Public device address as reported by the stack.
    pub public_address: [u8; 6],
    /// Set by the first connection of this boot.
    pub reconnect_enabled: bool,
    /// Requests written by the last entry action.
    pub effects: LinkEffects,
}

impl LinkContext {
    pub fn new(public_address: [u8; 6]) -> Self {
        Self {
            public_address,
            ..Self::default()
        }
    }

    /// Hand the pending requests to the caller and reset the record.
    pub fn take_effects(&mut self) -> LinkEffects {
        core::mem::take(&mut self.effects)
    }
}

/// Derive the 8-byte system ID from the 6-byte public address: the low
/// three bytes, two zero pad bytes, then the high three bytes in order.
pub fn system_id_from_address(addr: &[u8; 6]) -> [u8; 8] {
    [addr[0], addr[1], addr[2], 0x00, 0x00, addr[3], addr[4], addr[5]]
}
