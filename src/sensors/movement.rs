//! MPU9250 movement sensor (bus 1): gyro and accelerometer at 0x68, the
//! AK8963 magnetometer at 0x0C behind the MPU's bypass switch.
//!
//! Characteristic layout, 18 bytes little-endian:
//!
//! ```text
//!  0      6      12     18
//!  ├ gyro ┼ acc  ┼ mag  ┤
//!   x y z  x y z  x y z
//! ```
//!
//! Config characteristic: byte 0 is the axis bitmap (gyro 0x07, acc 0x38,
//! mag 0x40, wake-on-motion 0x80), byte 1 the accelerometer range.

use log::{debug, warn};

use super::{Cadence, DriverCtx, ParamId, RawSample, SensorDriver, SensorSnapshot, ServiceId};
use crate::bus::{BusArbiter, BusIndex, BusTransport};
use crate::codec::{AccRange, fill_error_data, swap_bytes_16, u8_pair_to_i16};
use crate::error::BusError;
use crate::selftest::SelfTestBitmap;

pub const BUS: BusIndex = BusIndex::Bus1;
pub const ADDRESS: u8 = 0x68;
pub const MAG_ADDRESS: u8 = 0x0C;

pub const REG_ACCEL_CONFIG: u8 = 0x1C;
pub const REG_INT_PIN_CFG: u8 = 0x37;
pub const REG_INT_ENABLE: u8 = 0x38;
pub const REG_INT_STATUS: u8 = 0x3A;
pub const REG_ACCEL_XOUT_H: u8 = 0x3B;
pub const REG_PWR_MGMT_1: u8 = 0x6B;
pub const REG_PWR_MGMT_2: u8 = 0x6C;
pub const REG_WHO_AM_I: u8 = 0x75;
pub const WHO_AM_I: u8 = 0x71;

pub const MAG_REG_WHO_AM_I: u8 = 0x00;
pub const MAG_REG_XOUT_L: u8 = 0x03;
pub const MAG_WHO_AM_I: u8 = 0x48;

const BYPASS_EN: u8 = 0x02;
const WOM_EN: u8 = 0x40;
const CLOCK_AUTO: u8 = 0x01;
const ALL_AXES_ON: u8 = 0x00;
const ALL_AXES_OFF: u8 = 0x3F;

pub const AXES_GYRO: u8 = 0x07;
pub const AXES_ACC: u8 = 0x38;
pub const AXES_MAG: u8 = 0x40;
pub const WAKE_ON_MOTION: u8 = 0x80;

pub const DATA_LEN: usize = 18;
/// Accel (6), temperature (2), gyro (6), big-endian.
const BURST_LEN: usize = 14;

#[derive(Debug, Default)]
pub struct MovementSensor {
    axes: u8,
    wake_on_motion: bool,
    range: AccRange,
    cadence: Cadence,
    acc_raw: [i16; 3],
    motion_wakes: u32,
}

impl MovementSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axes(&self) -> u8 {
        self.axes
    }

    pub fn range(&self) -> AccRange {
        self.range
    }

    pub fn motion_wakes(&self) -> u32 {
        self.motion_wakes
    }

    fn enable_bypass<T: BusTransport>(bus: &BusArbiter<T>) -> Result<(), BusError> {
        bus.acquire(BUS, ADDRESS)?.write_reg(REG_INT_PIN_CFG, &[BYPASS_EN])
    }

    fn apply_config<T: BusTransport>(&self, bus: &BusArbiter<T>) -> Result<(), BusError> {
        let mut lock = bus.acquire(BUS, ADDRESS)?;
        lock.write_reg(REG_ACCEL_CONFIG, &[(self.range as u8) << 3])?;
        let power = if self.axes == 0 { ALL_AXES_OFF } else { ALL_AXES_ON };
        lock.write_reg(REG_PWR_MGMT_2, &[power])?;
        let int_enable = if self.wake_on_motion { WOM_EN } else { 0 };
        lock.write_reg(REG_INT_ENABLE, &[int_enable])
    }

    fn sample<T: BusTransport>(&mut self, ctx: &mut DriverCtx<'_, T>) -> Result<(), BusError> {
        match SensorDriver::<T>::read(self, ctx.bus) {
            Ok(sample) => {
                self.acc_raw = [
                    u8_pair_to_i16(sample[6], sample[7]),
                    u8_pair_to_i16(sample[8], sample[9]),
                    u8_pair_to_i16(sample[10], sample[11]),
                ];
                ctx.publish(ServiceId::Movement, ParamId::Data, &sample);
                Ok(())
            }
            Err(e) => {
                warn!("Movement: read failed ({e})");
                let mut data = [0u8; DATA_LEN];
                fill_error_data(&mut data);
                ctx.publish(ServiceId::Movement, ParamId::Data, &data);
                Err(e)
            }
        }
    }
}

impl<T: BusTransport> SensorDriver<T> for MovementSensor {
    fn service(&self) -> ServiceId {
        ServiceId::Movement
    }

    fn name(&self) -> &'static str {
        "movement"
    }

    fn self_test_bits(&self) -> SelfTestBitmap {
        SelfTestBitmap::MPU.union(SelfTestBitmap::MAG)
    }

    fn init(&mut self, ctx: &mut DriverCtx<'_, T>) -> bool {
        let powered = ctx
            .bus
            .acquire(BUS, ADDRESS)
            .and_then(|mut lock| lock.write_reg(REG_PWR_MGMT_1, &[CLOCK_AUTO]));
        powered.is_ok() && Self::enable_bypass(ctx.bus).is_ok() && self.apply_config(ctx.bus).is_ok()
    }

    fn reset(&mut self, ctx: &mut DriverCtx<'_, T>) {
        self.axes = 0;
        self.wake_on_motion = false;
        self.cadence = Cadence::new();
        ctx.publish(ServiceId::Movement, ParamId::Data, &[0; DATA_LEN]);
        ctx.publish(ServiceId::Movement, ParamId::Config, &[0, self.range as u8]);
        let _ = SensorDriver::<T>::init(self, ctx);
    }

    fn self_test(&mut self, bit: SelfTestBitmap, bus: &BusArbiter<T>) -> bool {
        let mut id = [0u8; 1];
        if bit == SelfTestBitmap::MPU {
            let Ok(mut lock) = bus.acquire(BUS, ADDRESS) else {
                return false;
            };
            lock.read_reg(REG_WHO_AM_I, &mut id).is_ok() && id[0] == WHO_AM_I
        } else if bit == SelfTestBitmap::MAG {
            if Self::enable_bypass(bus).is_err() {
                return false;
            }
            let Ok(mut lock) = bus.acquire(BUS, MAG_ADDRESS) else {
                return false;
            };
            lock.read_reg(MAG_REG_WHO_AM_I, &mut id).is_ok() && id[0] == MAG_WHO_AM_I
        } else {
            false
        }
    }

    fn read(&mut self, bus: &BusArbiter<T>) -> Result<RawSample, BusError> {
        let mut burst = [0u8; BURST_LEN];
        bus.acquire(BUS, ADDRESS)?
            .read_reg(REG_ACCEL_XOUT_H, &mut burst)?;

        let mut data = [0u8; DATA_LEN];
        data[0..6].copy_from_slice(&burst[8..14]);
        data[6..12].copy_from_slice(&burst[0..6]);
        swap_bytes_16(&mut data[0..12]);

        if self.axes & AXES_MAG != 0 {
            // Magnetometer registers are already little-endian.
            bus.acquire(BUS, MAG_ADDRESS)?
                .read_reg(MAG_REG_XOUT_L, &mut data[12..18])?;
        }
        Ok(RawSample::from_slice(&data).unwrap_or_default())
    }

    fn process_char_change(
        &mut self,
        param: ParamId,
        ctx: &mut DriverCtx<'_, T>,
    ) -> Result<(), BusError> {
        let Some(value) = ctx.written(ServiceId::Movement, param) else {
            return Ok(());
        };
        match param {
            ParamId::Config => {
                let bits = value.first().copied().unwrap_or(0);
                self.axes = bits & (AXES_GYRO | AXES_ACC | AXES_MAG);
                self.wake_on_motion = bits & WAKE_ON_MOTION != 0;
                if let Some(range) = value.get(1) {
                    self.range = AccRange::from_bits(*range);
                }
                debug!(
                    "Movement: axes=0x{:02X} wom={} range={}g",
                    self.axes,
                    self.wake_on_motion,
                    self.range.full_scale_g()
                );
                if self.axes == 0 {
                    ctx.publish(ServiceId::Movement, ParamId::Data, &[0; DATA_LEN]);
                } else {
                    self.cadence.restart(ctx.now_ms);
                }
                self.apply_config(ctx.bus)
            }
            ParamId::Period => {
                if let Some(units) = value.first() {
                    self.cadence.set_period_units(*units);
                }
                Ok(())
            }
            ParamId::Data => Ok(()),
        }
    }

    fn process_event(&mut self, ctx: &mut DriverCtx<'_, T>) -> Result<(), BusError> {
        if self.axes == 0 || !self.cadence.poll(ctx.now_ms) {
            return Ok(());
        }
        self.sample(ctx)
    }

    /// Wake-on-motion: acknowledge the interrupt and sample immediately.
    fn on_interrupt(&mut self, _payload: u8, ctx: &mut DriverCtx<'_, T>) -> Result<(), BusError> {
        self.motion_wakes = self.motion_wakes.wrapping_add(1);
        let mut status = [0u8; 1];
        ctx.bus
            .acquire(BUS, ADDRESS)?
            .read_reg(REG_INT_STATUS, &mut status)?;
        debug!("Movement: motion wake, status=0x{:02X}", status[0]);
        if self.axes == 0 {
            return Ok(());
        }
        self.cadence.restart(ctx.now_ms);
        self.cadence.poll(ctx.now_ms);
        self.sample(ctx)
    }

    fn update_snapshot(&self, snapshot: &mut SensorSnapshot) {
        snapshot.acc_raw = self.acc_raw;
    }
}
