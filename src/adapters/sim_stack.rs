//! In-memory protocol stack adapter.
//!
//! Holds the GATT characteristic table, the advertising payload and the
//! device identity.  Clones share one table so a simulated peer can write
//! characteristics while the scheduler owns the port.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};

use crate::app::ports::{CharValue, StackPort};
use crate::sensors::{ParamId, ServiceId};

#[derive(Debug, Default)]
struct StackState {
    chars: HashMap<(ServiceId, ParamId), CharValue>,
    advert: Vec<u8>,
    advertising: bool,
    system_id: Option<[u8; 8]>,
    status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SimStack {
    address: [u8; 6],
    state: Arc<Mutex<StackState>>,
}

impl SimStack {
    pub fn new(address: [u8; 6]) -> Self {
        Self {
            address,
            state: Arc::default(),
        }
    }

    /// A peer writes `value` to a characteristic.  The caller still has to
    /// post the matching `CharChange` message.
    pub fn client_write(&self, service: ServiceId, param: ParamId, value: &[u8]) {
        let stored = CharValue::from_slice(value).unwrap_or_default();
        self.lock().chars.insert((service, param), stored);
    }

    pub fn advertising_payload(&self) -> Vec<u8> {
        self.lock().advert.clone()
    }

    pub fn is_advertising(&self) -> bool {
        self.lock().advertising
    }

    pub fn system_id(&self) -> Option<[u8; 8]> {
        self.lock().system_id
    }

    pub fn status(&self) -> Option<String> {
        self.lock().status.clone()
    }

    fn lock(&self) -> MutexGuard<'_, StackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StackPort for SimStack {
    fn set_advertising_payload(&mut self, payload: &[u8]) {
        debug!("Stack: advert {payload:02X?}");
        self.lock().advert = payload.to_vec();
    }

    fn set_characteristic_value(&mut self, service: ServiceId, param: ParamId, value: &[u8]) {
        let stored = CharValue::from_slice(value).unwrap_or_default();
        self.lock().chars.insert((service, param), stored);
    }

    fn characteristic_value(&self, service: ServiceId, param: ParamId) -> Option<CharValue> {
        self.lock().chars.get(&(service, param)).cloned()
    }

    fn set_advertising_enabled(&mut self, enabled: bool) {
        info!("Stack: advertising {}", if enabled { "enabled" } else { "disabled" });
        self.lock().advertising = enabled;
    }

    fn public_address(&self) -> [u8; 6] {
        self.address
    }

    fn set_system_id(&mut self, id: [u8; 8]) {
        info!("Stack: system id {id:02X?}");
        self.lock().system_id = Some(id);
    }

    fn report_status(&mut self, status: &str) {
        info!("Stack: status \"{status}\"");
        self.lock().status = Some(status.to_owned());
    }
}
