//! OPT3001 ambient light sensor (bus 0, address 0x45).
//!
//! Registers are big-endian on the wire.  A result is only fetched once the
//! conversion-ready flag in the configuration register is set.

use log::{debug, warn};

use super::{Cadence, DriverCtx, ParamId, RawSample, SensorDriver, SensorSnapshot, ServiceId};
use crate::bus::{BusArbiter, BusIndex, BusTransport};
use crate::codec::{fill_error_data, opt_lux};
use crate::error::BusError;
use crate::selftest::SelfTestBitmap;

pub const BUS: BusIndex = BusIndex::Bus0;
pub const ADDRESS: u8 = 0x45;

pub const REG_RESULT: u8 = 0x00;
pub const REG_CONFIG: u8 = 0x01;
pub const REG_MANUFACTURER_ID: u8 = 0x7E;
pub const REG_DEVICE_ID: u8 = 0x7F;

pub const MANUFACTURER_ID: u16 = 0x5449;
pub const DEVICE_ID: u16 = 0x3001;

/// Automatic full-scale, 800 ms conversion, continuous mode.
pub const CONFIG_ENABLE: [u8; 2] = [0xC4, 0x10];
/// Same, shut down.
pub const CONFIG_DISABLE: [u8; 2] = [0xC0, 0x10];
/// Conversion-ready flag, second byte of the config register.
const CONVERSION_READY: u8 = 0x80;

pub const DATA_LEN: usize = 2;

#[derive(Debug, Default)]
pub struct OpticalSensor {
    enabled: bool,
    cadence: Cadence,
    lux: f32,
}

impl OpticalSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn configure<T: BusTransport>(bus: &BusArbiter<T>, config: &[u8; 2]) -> Result<(), BusError> {
        bus.acquire(BUS, ADDRESS)?.write_reg(REG_CONFIG, config)
    }
}

impl<T: BusTransport> SensorDriver<T> for OpticalSensor {
    fn service(&self) -> ServiceId {
        ServiceId::Optical
    }

    fn name(&self) -> &'static str {
        "optical"
    }

    fn self_test_bits(&self) -> SelfTestBitmap {
        SelfTestBitmap::LIGHT
    }

    fn init(&mut self, ctx: &mut DriverCtx<'_, T>) -> bool {
        Self::configure(ctx.bus, &CONFIG_DISABLE).is_ok()
    }

    fn reset(&mut self, ctx: &mut DriverCtx<'_, T>) {
        self.enabled = false;
        self.cadence = Cadence::new();
        ctx.publish(ServiceId::Optical, ParamId::Data, &[0; DATA_LEN]);
        ctx.publish(ServiceId::Optical, ParamId::Config, &[0]);
        let _ = SensorDriver::<T>::init(self, ctx);
    }

    fn self_test(&mut self, bit: SelfTestBitmap, bus: &BusArbiter<T>) -> bool {
        if bit != SelfTestBitmap::LIGHT {
            return false;
        }
        let Ok(mut lock) = bus.acquire(BUS, ADDRESS) else {
            return false;
        };
        let mut manufacturer = [0u8; 2];
        let mut device = [0u8; 2];
        lock.read_reg(REG_MANUFACTURER_ID, &mut manufacturer).is_ok()
            && lock.read_reg(REG_DEVICE_ID, &mut device).is_ok()
            && u16::from_be_bytes(manufacturer) == MANUFACTURER_ID
            && u16::from_be_bytes(device) == DEVICE_ID
    }

    fn read(&mut self, bus: &BusArbiter<T>) -> Result<RawSample, BusError> {
        let mut lock = bus.acquire(BUS, ADDRESS)?;
        let mut config = [0u8; 2];
        lock.read_reg(REG_CONFIG, &mut config)?;
        if config[1] & CONVERSION_READY == 0 {
            return Ok(RawSample::new());
        }
        let mut result = [0u8; DATA_LEN];
        lock.read_reg(REG_RESULT, &mut result)?;
        let raw = u16::from_be_bytes(result);
        Ok(RawSample::from_slice(&raw.to_le_bytes()).unwrap_or_default())
    }

    fn process_char_change(
        &mut self,
        param: ParamId,
        ctx: &mut DriverCtx<'_, T>,
    ) -> Result<(), BusError> {
        let Some(value) = ctx.written(ServiceId::Optical, param) else {
            return Ok(());
        };
        match (param, value.first().copied()) {
            (ParamId::Config, Some(0x01)) => {
                Self::configure(ctx.bus, &CONFIG_ENABLE)?;
                debug!("Optical: enabled");
                self.enabled = true;
                self.cadence.restart(ctx.now_ms);
            }
            (ParamId::Config, Some(0x00)) => {
                self.enabled = false;
                ctx.publish(ServiceId::Optical, ParamId::Data, &[0; DATA_LEN]);
                Self::configure(ctx.bus, &CONFIG_DISABLE)?;
                debug!("Optical: disabled");
            }
            (ParamId::Period, Some(units)) => self.cadence.set_period_units(units),
            _ => {}
        }
        Ok(())
    }

    fn process_event(&mut self, ctx: &mut DriverCtx<'_, T>) -> Result<(), BusError> {
        if !self.enabled || !self.cadence.poll(ctx.now_ms) {
            return Ok(());
        }
        match SensorDriver::<T>::read(self, ctx.bus) {
            Ok(sample) if sample.is_empty() => Ok(()),
            Ok(sample) => {
                self.lux = opt_lux(u16::from_le_bytes([sample[0], sample[1]]));
                ctx.publish(ServiceId::Optical, ParamId::Data, &sample);
                Ok(())
            }
            Err(e) => {
                warn!("Optical: read failed ({e})");
                let mut data = [0u8; DATA_LEN];
                fill_error_data(&mut data);
                ctx.publish(ServiceId::Optical, ParamId::Data, &data);
                Err(e)
            }
        }
    }

    fn update_snapshot(&self, snapshot: &mut SensorSnapshot) {
        snapshot.light_lux = self.lux;
    }
}
