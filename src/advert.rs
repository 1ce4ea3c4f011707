//! Advertising payload builder.
//!
//! ```text
//!  off  len type  value
//!   0   02  01    06                       flags: general discoverable, no BR/EDR
//!   3   03  02    80 AA                    16-bit service UUID (movement)
//!   7   0C  FF    0D 00 03 00 KK           TI company ID, device, key ID, key state
//!  14                 XX XX YY YY ZZ ZZ    accelerometer X/Y/Z, little-endian
//! ```
//!
//! The payload always carries the latest snapshot values; no byte is reused
//! for debugging counters.

use crate::sensors::SensorSnapshot;

/// Maximum legacy advertising payload.
pub const ADV_MAX: usize = 31;
/// Offset of the key-state byte.
pub const KEY_STATE_OFFSET: usize = 13;
/// Offset of the accelerometer block.
pub const ACC_OFFSET: usize = 14;

const AD_TYPE_FLAGS: u8 = 0x01;
const AD_TYPE_16BIT_MORE: u8 = 0x02;
const AD_TYPE_MANUFACTURER: u8 = 0xFF;
const FLAGS_GENERAL_NO_BREDR: u8 = 0x06;
const MOVEMENT_SERVICE_UUID: u16 = 0xAA80;
const COMPANY_ID_TI: u16 = 0x000D;
const DEVICE_ID_SENSORTAG: u8 = 0x03;
const KEY_ID: u8 = 0x00;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertPayload {
    bytes: heapless::Vec<u8, ADV_MAX>,
}

impl AdvertPayload {
    pub fn build(snapshot: &SensorSnapshot) -> Self {
        let uuid = MOVEMENT_SERVICE_UUID.to_le_bytes();
        let company = COMPANY_ID_TI.to_le_bytes();
        let [x, y, z] = snapshot.acc_raw.map(i16::to_le_bytes);

        let layout = [
            0x02,
            AD_TYPE_FLAGS,
            FLAGS_GENERAL_NO_BREDR,
            0x03,
            AD_TYPE_16BIT_MORE,
            uuid[0],
            uuid[1],
            0x0C,
            AD_TYPE_MANUFACTURER,
            company[0],
            company[1],
            DEVICE_ID_SENSORTAG,
            KEY_ID,
            snapshot.key_state,
            x[0],
            x[1],
            y[0],
            y[1],
            z[0],
            z[1],
        ];

        let mut bytes = heapless::Vec::new();
        // 20 bytes always fit in 31.
        let _ = bytes.extend_from_slice(&layout);
        Self { bytes }
    }

    /// Same payload with the key state replaced.
    pub fn with_key_state(mut self, key_state: u8) -> Self {
        self.bytes[KEY_STATE_OFFSET] = key_state;
        self
    }

    pub fn key_state(&self) -> u8 {
        self.bytes[KEY_STATE_OFFSET]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
