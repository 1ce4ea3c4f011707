//! Sensor subsystem: the driver capability trait and the [`SensorRegistry`]
//! that dispatches by [`ServiceId`].
//!
//! Each driver backs one GATT service.  The scheduler reaches drivers only
//! through the registry: characteristic writes are routed by service ID,
//! every driver is polled once per wake cycle, and the registry aggregates
//! the latest readings into a [`SensorSnapshot`] for the advertising
//! payload.

pub mod humidity;
pub mod io;
pub mod keys;
pub mod movement;
pub mod optical;

use crate::app::ports::{CharValue, IndicatorPort, StackPort};
use crate::bus::{BusArbiter, BusTransport};
use crate::error::BusError;
use crate::selftest::SelfTestBitmap;

/// Largest sample any driver produces (movement: gyro, acc, mag).
pub const RAW_SAMPLE_MAX: usize = 18;

/// Sample bytes in characteristic (little-endian) layout.
pub type RawSample = heapless::Vec<u8, RAW_SAMPLE_MAX>;

// ───────────────────────────────────────────────────────────────
// Identifiers
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServiceId {
    Temperature = 0,
    Humidity = 1,
    Barometer = 2,
    Movement = 3,
    Optical = 4,
    Io = 5,
    Keys = 6,
}

impl ServiceId {
    pub const COUNT: usize = 7;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Temperature,
        Self::Humidity,
        Self::Barometer,
        Self::Movement,
        Self::Optical,
        Self::Io,
        Self::Keys,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }
}

/// Characteristic within a sensor service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ParamId {
    Data = 0,
    Config = 1,
    Period = 2,
}

impl ParamId {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Data),
            1 => Some(Self::Config),
            2 => Some(Self::Period),
            _ => None,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Snapshot
// ───────────────────────────────────────────────────────────────

/// Latest converted readings across all drivers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSnapshot {
    pub key_state: u8,
    /// Raw accelerometer counts X, Y, Z.
    pub acc_raw: [i16; 3],
    pub temperature_c: f32,
    pub humidity_rh: f32,
    pub light_lux: f32,
}

// ───────────────────────────────────────────────────────────────
// Driver capability
// ───────────────────────────────────────────────────────────────

/// Everything a driver may touch while handling an event.
pub struct DriverCtx<'a, T: BusTransport> {
    pub bus: &'a BusArbiter<T>,
    pub stack: &'a mut dyn StackPort,
    pub indicators: &'a mut dyn IndicatorPort,
    pub now_ms: u64,
    /// Cached result of the last self-test run.
    pub self_test: SelfTestBitmap,
}

impl<T: BusTransport> DriverCtx<'_, T> {
    /// Value a client last wrote to one of this service's characteristics.
    pub fn written(&self, service: ServiceId, param: ParamId) -> Option<CharValue> {
        self.stack.characteristic_value(service, param)
    }

    pub fn publish(&mut self, service: ServiceId, param: ParamId, value: &[u8]) {
        self.stack.set_characteristic_value(service, param, value);
    }
}

pub trait SensorDriver<T: BusTransport> {
    fn service(&self) -> ServiceId;

    fn name(&self) -> &'static str;

    /// Self-test bits this driver answers for.
    fn self_test_bits(&self) -> SelfTestBitmap {
        SelfTestBitmap::EMPTY
    }

    /// Bring the part to a known, powered-down configuration.
    fn init(&mut self, ctx: &mut DriverCtx<'_, T>) -> bool;

    /// Drop back to the post-boot state and clear published values.
    fn reset(&mut self, ctx: &mut DriverCtx<'_, T>);

    /// Run the identity check behind one bit of [`Self::self_test_bits`].
    fn self_test(&mut self, _bit: SelfTestBitmap, _bus: &BusArbiter<T>) -> bool {
        false
    }

    /// Fetch one sample.  An empty sample means no new data yet.
    fn read(&mut self, bus: &BusArbiter<T>) -> Result<RawSample, BusError>;

    /// A client wrote characteristic `param` of this service.
    fn process_char_change(
        &mut self,
        param: ParamId,
        ctx: &mut DriverCtx<'_, T>,
    ) -> Result<(), BusError>;

    /// Per-cycle poll for new data.
    fn process_event(&mut self, _ctx: &mut DriverCtx<'_, T>) -> Result<(), BusError> {
        Ok(())
    }

    /// Interrupt delivered to this driver (key bitmap, motion wake).
    fn on_interrupt(&mut self, _payload: u8, _ctx: &mut DriverCtx<'_, T>) -> Result<(), BusError> {
        Ok(())
    }

    /// Contribute this driver's latest readings.
    fn update_snapshot(&self, _snapshot: &mut SensorSnapshot) {}
}

// ───────────────────────────────────────────────────────────────
// Sampling cadence
// ───────────────────────────────────────────────────────────────

/// Sampling period as set through the PERIOD characteristic (10 ms units).
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    period_ms: u64,
    next_due_ms: u64,
}

impl Cadence {
    pub const DEFAULT_PERIOD_MS: u64 = 1000;
    pub const MIN_PERIOD_MS: u64 = 100;

    pub const fn new() -> Self {
        Self {
            period_ms: Self::DEFAULT_PERIOD_MS,
            next_due_ms: 0,
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn set_period_units(&mut self, units: u8) {
        self.period_ms = (u64::from(units) * 10).max(Self::MIN_PERIOD_MS);
    }

    /// Make the next poll due immediately.
    pub fn restart(&mut self, now_ms: u64) {
        self.next_due_ms = now_ms;
    }

    pub fn poll(&mut self, now_ms: u64) -> bool {
        if now_ms < self.next_due_ms {
            return false;
        }
        self.next_due_ms = now_ms.saturating_add(self.period_ms);
        true
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Registry
// ───────────────────────────────────────────────────────────────

pub type DriverBox<T> = Box<dyn SensorDriver<T>>;

/// Dispatch table indexed by [`ServiceId`].
pub struct SensorRegistry<T: BusTransport> {
    slots: [Option<DriverBox<T>>; ServiceId::COUNT],
}

impl<T: BusTransport> SensorRegistry<T> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Install a driver in its service slot, returning any previous one.
    pub fn register(&mut self, driver: DriverBox<T>) -> Option<DriverBox<T>> {
        let slot = driver.service() as usize;
        self.slots[slot].replace(driver)
    }

    pub fn get_mut(&mut self, service: ServiceId) -> Option<&mut dyn SensorDriver<T>> {
        match &mut self.slots[service as usize] {
            Some(driver) => Some(driver.as_mut()),
            None => None,
        }
    }

    pub fn contains(&self, service: ServiceId) -> bool {
        self.slots[service as usize].is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DriverBox<T>> {
        self.slots.iter_mut().flatten()
    }

    /// The driver answering for self-test `bit`, if any.
    pub fn self_test_owner(&mut self, bit: SelfTestBitmap) -> Option<&mut DriverBox<T>> {
        self.iter_mut()
            .find(|d| d.self_test_bits().contains(bit))
    }

    /// Initialise every driver; returns how many came up.
    pub fn init_all(&mut self, ctx: &mut DriverCtx<'_, T>) -> usize {
        let mut ok = 0;
        for driver in self.iter_mut() {
            if driver.init(ctx) {
                ok += 1;
            } else {
                log::warn!("Sensors: {} failed to initialise", driver.name());
            }
        }
        ok
    }

    pub fn reset_all(&mut self, ctx: &mut DriverCtx<'_, T>) {
        for driver in self.iter_mut() {
            driver.reset(ctx);
        }
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        let mut snap = SensorSnapshot::default();
        for driver in self.slots.iter().flatten() {
            driver.update_snapshot(&mut snap);
        }
        snap
    }
}

impl<T: BusTransport> Default for SensorRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
