//! HDC1000 humidity and temperature sensor (bus 0, address 0x43).
//!
//! Temperature and humidity are converted in sequence and read back as two
//! big-endian words.  The characteristic carries them little-endian:
//! `[temp_lo, temp_hi, hum_lo, hum_hi]`.
//!
//! A sample takes two cycles: pointing at the temperature register starts
//! the conversion, and the result is fetched on the first cycle at least
//! [`CONVERSION_MS`] later.  The part NACKs reads while converting.

use log::{debug, warn};

use super::{Cadence, DriverCtx, ParamId, RawSample, SensorDriver, SensorSnapshot, ServiceId};
use crate::bus::{BusArbiter, BusIndex, BusLock, BusTransport};
use crate::codec::{fill_error_data, hdc_humidity_rh, hdc_temperature_c, swap_bytes_16};
use crate::error::BusError;
use crate::selftest::SelfTestBitmap;

pub const BUS: BusIndex = BusIndex::Bus0;
pub const ADDRESS: u8 = 0x43;

pub const REG_TEMPERATURE: u8 = 0x00;
pub const REG_CONFIG: u8 = 0x02;
pub const REG_MANUFACTURER_ID: u8 = 0xFE;
pub const REG_DEVICE_ID: u8 = 0xFF;

pub const MANUFACTURER_ID: u16 = 0x5449;
pub const DEVICE_ID: u16 = 0x1000;

/// Acquire temperature and humidity in sequence, 14-bit resolution.
const CONFIG_SEQUENTIAL: [u8; 2] = [0x10, 0x00];

pub const DATA_LEN: usize = 4;

/// Worst-case 14-bit temperature plus humidity conversion time.
pub const CONVERSION_MS: u64 = 15;

#[derive(Debug, Default)]
pub struct HumiditySensor {
    enabled: bool,
    cadence: Cadence,
    /// Start time of the conversion in flight.
    converting_since: Option<u64>,
    temperature_c: f32,
    humidity_rh: f32,
}

impl HumiditySensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn start_conversion<T: BusTransport>(bus: &BusArbiter<T>) -> Result<(), BusError> {
        bus.acquire(BUS, ADDRESS)?.write_single(REG_TEMPERATURE)
    }

    fn publish_error<T: BusTransport>(ctx: &mut DriverCtx<'_, T>) {
        let mut data = [0u8; DATA_LEN];
        fill_error_data(&mut data);
        ctx.publish(ServiceId::Humidity, ParamId::Data, &data);
    }

    fn read_id<T: BusTransport>(lock: &mut BusLock<'_, T>, reg: u8) -> Result<u16, BusError> {
        let mut buf = [0u8; 2];
        lock.read_reg(reg, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }
}

impl<T: BusTransport> SensorDriver<T> for HumiditySensor {
    fn service(&self) -> ServiceId {
        ServiceId::Humidity
    }

    fn name(&self) -> &'static str {
        "humidity"
    }

    fn self_test_bits(&self) -> SelfTestBitmap {
        SelfTestBitmap::HUMIDITY
    }

    fn init(&mut self, ctx: &mut DriverCtx<'_, T>) -> bool {
        let configured = ctx
            .bus
            .acquire(BUS, ADDRESS)
            .and_then(|mut lock| lock.write_reg(REG_CONFIG, &CONFIG_SEQUENTIAL));
        configured.is_ok()
    }

    fn reset(&mut self, ctx: &mut DriverCtx<'_, T>) {
        self.enabled = false;
        self.cadence = Cadence::new();
        self.converting_since = None;
        ctx.publish(ServiceId::Humidity, ParamId::Data, &[0; DATA_LEN]);
        ctx.publish(ServiceId::Humidity, ParamId::Config, &[0]);
        let _ = SensorDriver::<T>::init(self, ctx);
    }

    fn self_test(&mut self, bit: SelfTestBitmap, bus: &BusArbiter<T>) -> bool {
        if bit != SelfTestBitmap::HUMIDITY {
            return false;
        }
        let Ok(mut lock) = bus.acquire(BUS, ADDRESS) else {
            return false;
        };
        matches!(Self::read_id(&mut lock, REG_MANUFACTURER_ID), Ok(MANUFACTURER_ID))
            && matches!(Self::read_id(&mut lock, REG_DEVICE_ID), Ok(DEVICE_ID))
    }

    /// Fetch the result of a finished conversion.
    fn read(&mut self, bus: &BusArbiter<T>) -> Result<RawSample, BusError> {
        let mut buf = [0u8; DATA_LEN];
        bus.acquire(BUS, ADDRESS)?.read(&mut buf)?;
        swap_bytes_16(&mut buf);
        Ok(RawSample::from_slice(&buf).unwrap_or_default())
    }

    fn process_char_change(
        &mut self,
        param: ParamId,
        ctx: &mut DriverCtx<'_, T>,
    ) -> Result<(), BusError> {
        let Some(value) = ctx.written(ServiceId::Humidity, param) else {
            return Ok(());
        };
        match (param, value.first().copied()) {
            (ParamId::Config, Some(0x01)) => {
                debug!("Humidity: enabled");
                self.enabled = true;
                self.cadence.restart(ctx.now_ms);
            }
            (ParamId::Config, Some(0x00)) => {
                debug!("Humidity: disabled");
                self.enabled = false;
                self.converting_since = None;
                ctx.publish(ServiceId::Humidity, ParamId::Data, &[0; DATA_LEN]);
            }
            (ParamId::Period, Some(units)) => self.cadence.set_period_units(units),
            _ => {}
        }
        Ok(())
    }

    fn process_event(&mut self, ctx: &mut DriverCtx<'_, T>) -> Result<(), BusError> {
        if !self.enabled {
            return Ok(());
        }
        let Some(started) = self.converting_since else {
            if !self.cadence.poll(ctx.now_ms) {
                return Ok(());
            }
            if let Err(e) = Self::start_conversion(ctx.bus) {
                warn!("Humidity: trigger failed ({e})");
                Self::publish_error(ctx);
                return Err(e);
            }
            self.converting_since = Some(ctx.now_ms);
            return Ok(());
        };
        if ctx.now_ms < started.saturating_add(CONVERSION_MS) {
            return Ok(());
        }
        self.converting_since = None;
        match SensorDriver::<T>::read(self, ctx.bus) {
            Ok(sample) => {
                let temp = u16::from_le_bytes([sample[0], sample[1]]);
                let hum = u16::from_le_bytes([sample[2], sample[3]]);
                self.temperature_c = hdc_temperature_c(temp);
                self.humidity_rh = hdc_humidity_rh(hum);
                ctx.publish(ServiceId::Humidity, ParamId::Data, &sample);
                Ok(())
            }
            Err(e) => {
                warn!("Humidity: read failed ({e})");
                Self::publish_error(ctx);
                Err(e)
            }
        }
    }

    fn update_snapshot(&self, snapshot: &mut SensorSnapshot) {
        snapshot.temperature_c = self.temperature_c;
        snapshot.humidity_rh = self.humidity_rh;
    }
}
