//! Simple keys service: two push buttons and the reed relay.
//!
//! The GPIO dispatcher posts the debounced bitmap; this driver publishes it
//! on the DATA characteristic and keeps it for the advertising payload.

use log::debug;

use super::{DriverCtx, ParamId, RawSample, SensorDriver, SensorSnapshot, ServiceId};
use crate::bus::{BusArbiter, BusTransport};
use crate::error::BusError;

pub const KEY_LEFT: u8 = 0x01;
pub const KEY_RIGHT: u8 = 0x02;
pub const KEY_RELAY: u8 = 0x04;

#[derive(Debug, Default)]
pub struct KeysService {
    state: u8,
    changes: u32,
}

impl KeysService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> u8 {
        self.state
    }

    pub fn changes(&self) -> u32 {
        self.changes
    }
}

impl<T: BusTransport> SensorDriver<T> for KeysService {
    fn service(&self) -> ServiceId {
        ServiceId::Keys
    }

    fn name(&self) -> &'static str {
        "keys"
    }

    fn init(&mut self, _ctx: &mut DriverCtx<'_, T>) -> bool {
        true
    }

    fn reset(&mut self, ctx: &mut DriverCtx<'_, T>) {
        self.state = 0;
        ctx.publish(ServiceId::Keys, ParamId::Data, &[0]);
    }

    fn read(&mut self, _bus: &BusArbiter<T>) -> Result<RawSample, BusError> {
        Ok(RawSample::from_slice(&[self.state]).unwrap_or_default())
    }

    fn process_char_change(
        &mut self,
        _param: ParamId,
        _ctx: &mut DriverCtx<'_, T>,
    ) -> Result<(), BusError> {
        Ok(())
    }

    fn on_interrupt(&mut self, keys: u8, ctx: &mut DriverCtx<'_, T>) -> Result<(), BusError> {
        let keys = keys & (KEY_LEFT | KEY_RIGHT | KEY_RELAY);
        if keys == self.state {
            return Ok(());
        }
        debug!("Keys: 0x{:02X} -> 0x{:02X}", self.state, keys);
        self.state = keys;
        self.changes = self.changes.wrapping_add(1);
        ctx.publish(ServiceId::Keys, ParamId::Data, &[keys]);
        Ok(())
    }

    fn update_snapshot(&self, snapshot: &mut SensorSnapshot) {
        snapshot.key_state = self.state;
    }
}
