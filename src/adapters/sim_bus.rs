//! Simulated two-bus I2C transport.
//!
//! Devices are register files keyed by `(bus, address)`.  A write sets the
//! register pointer from its first byte and stores the rest; a read streams
//! from the pointer.  Registers are one or two bytes wide, matching the
//! part being modelled.  The latest opens, closes and transfers are kept in
//! a fixed ring so tests can check that no transaction crossed a bus switch
//! while a long simulation run stays bounded.
//!
//! Clones share the same simulated bus; keep one as an inspection handle
//! after moving the other into the arbiter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use heapless::HistoryBuffer;

use crate::bus::{BusIndex, BusTransport};
use crate::sensors::{humidity, movement, optical};

/// Number of bus operations retained; older entries are overwritten.
pub const BUS_LOG_DEPTH: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    Open(BusIndex),
    Close,
    Write { bus: BusIndex, address: u8, len: usize },
    Read { bus: BusIndex, address: u8, len: usize },
}

#[derive(Debug)]
pub struct SimBusError(ErrorKind);

impl embedded_hal::i2c::Error for SimBusError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

#[derive(Debug, Clone)]
struct SimDevice {
    width: usize,
    bytes: Vec<u8>,
    pointer: usize,
    /// Bits the part raises by itself on every read: (byte offset, mask).
    status: Option<(usize, u8)>,
}

impl SimDevice {
    fn new(width: usize) -> Self {
        Self {
            width,
            bytes: vec![0; 256 * width],
            pointer: 0,
            status: None,
        }
    }

    fn write(&mut self, data: &[u8]) {
        let Some((reg, payload)) = data.split_first() else {
            return;
        };
        self.pointer = usize::from(*reg) * self.width;
        for (i, byte) in payload.iter().enumerate() {
            let at = (self.pointer + i) % self.bytes.len();
            self.bytes[at] = *byte;
        }
    }

    fn read(&mut self, buf: &mut [u8]) {
        if let Some((offset, mask)) = self.status {
            self.bytes[offset] |= mask;
        }
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.bytes[(self.pointer + i) % self.bytes.len()];
        }
    }
}

#[derive(Debug, Default)]
struct SimBusState {
    current: Option<BusIndex>,
    devices: HashMap<(BusIndex, u8), SimDevice>,
    log: HistoryBuffer<BusOp, BUS_LOG_DEPTH>,
    fail_transfers: bool,
    fail_open: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SimI2c {
    state: Arc<Mutex<SimBusState>>,
}

impl SimI2c {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus populated with the humidity, optical and movement parts,
    /// answering their identity registers and holding plausible samples.
    pub fn sensortag() -> Self {
        let sim = Self::new();

        // HDC1000: 21.9 °C, 50 %RH
        sim.add_device(humidity::BUS, humidity::ADDRESS, 2);
        sim.set_registers(humidity::BUS, humidity::ADDRESS, humidity::REG_TEMPERATURE, &[
            0x60, 0x00, 0x80, 0x00,
        ]);
        sim.set_registers(humidity::BUS, humidity::ADDRESS, humidity::REG_MANUFACTURER_ID, &[
            0x54, 0x49, 0x10, 0x00,
        ]);

        // OPT3001: 40 lux, conversions always complete
        sim.add_device(optical::BUS, optical::ADDRESS, 2);
        sim.set_registers(optical::BUS, optical::ADDRESS, optical::REG_RESULT, &[0x23, 0xE8]);
        sim.set_registers(optical::BUS, optical::ADDRESS, optical::REG_MANUFACTURER_ID, &[
            0x54, 0x49, 0x30, 0x01,
        ]);
        sim.set_status_bits(optical::BUS, optical::ADDRESS, optical::REG_CONFIG, 1, 0x80);

        // MPU9250: 1 g on Z at 2 g range, small gyro drift
        sim.add_device(movement::BUS, movement::ADDRESS, 1);
        sim.set_registers(movement::BUS, movement::ADDRESS, movement::REG_WHO_AM_I, &[
            movement::WHO_AM_I,
        ]);
        sim.set_registers(movement::BUS, movement::ADDRESS, movement::REG_ACCEL_XOUT_H, &[
            0x01, 0x00, 0xFF, 0x00, 0x40, 0x00, // acc x, y, z
            0x00, 0x00, // temperature
            0x00, 0x10, 0xFF, 0xF0, 0x00, 0x00, // gyro x, y, z
        ]);
        sim.set_registers(movement::BUS, movement::ADDRESS, movement::REG_INT_STATUS, &[0x40]);

        // AK8963 behind the bypass switch
        sim.add_device(movement::BUS, movement::MAG_ADDRESS, 1);
        sim.set_registers(movement::BUS, movement::MAG_ADDRESS, movement::MAG_REG_WHO_AM_I, &[
            movement::MAG_WHO_AM_I,
        ]);
        sim.set_registers(movement::BUS, movement::MAG_ADDRESS, movement::MAG_REG_XOUT_L, &[
            0x10, 0x00, 0x20, 0x00, 0x30, 0x00,
        ]);

        sim
    }

    pub fn add_device(&self, bus: BusIndex, address: u8, register_width: usize) {
        self.lock()
            .devices
            .insert((bus, address), SimDevice::new(register_width.max(1)));
    }

    pub fn remove_device(&self, bus: BusIndex, address: u8) {
        self.lock().devices.remove(&(bus, address));
    }

    /// Store `bytes` starting at register `reg`.
    pub fn set_registers(&self, bus: BusIndex, address: u8, reg: u8, bytes: &[u8]) {
        if let Some(dev) = self.lock().devices.get_mut(&(bus, address)) {
            let start = usize::from(reg) * dev.width;
            for (i, b) in bytes.iter().enumerate() {
                let at = (start + i) % dev.bytes.len();
                dev.bytes[at] = *b;
            }
        }
    }

    /// Raise `mask` in byte `byte` of register `reg` whenever the device is
    /// read.
    pub fn set_status_bits(&self, bus: BusIndex, address: u8, reg: u8, byte: usize, mask: u8) {
        if let Some(dev) = self.lock().devices.get_mut(&(bus, address)) {
            dev.status = Some((usize::from(reg) * dev.width + byte, mask));
        }
    }

    pub fn registers(&self, bus: BusIndex, address: u8, reg: u8, len: usize) -> Vec<u8> {
        self.lock()
            .devices
            .get(&(bus, address))
            .map(|dev| {
                let start = usize::from(reg) * dev.width;
                (0..len)
                    .map(|i| dev.bytes[(start + i) % dev.bytes.len()])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Retained operations, oldest first.
    pub fn log(&self) -> Vec<BusOp> {
        self.lock().log.oldest_ordered().copied().collect()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    pub fn set_fail_transfers(&self, fail: bool) {
        self.lock().fail_transfers = fail;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    fn lock(&self) -> MutexGuard<'_, SimBusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ErrorType for SimI2c {
    type Error = SimBusError;
}

impl I2c for SimI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if state.fail_transfers {
            return Err(SimBusError(ErrorKind::Bus));
        }
        let Some(bus) = state.current else {
            return Err(SimBusError(ErrorKind::Other));
        };

        let mut ops = Vec::with_capacity(operations.len());
        {
            let Some(dev) = state.devices.get_mut(&(bus, address)) else {
                return Err(SimBusError(ErrorKind::NoAcknowledge(
                    NoAcknowledgeSource::Address,
                )));
            };
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(data) => {
                        dev.write(data);
                        ops.push(BusOp::Write {
                            bus,
                            address,
                            len: data.len(),
                        });
                    }
                    Operation::Read(buf) => {
                        dev.read(buf);
                        ops.push(BusOp::Read {
                            bus,
                            address,
                            len: buf.len(),
                        });
                    }
                }
            }
        }
        for op in ops {
            state.log.write(op);
        }
        Ok(())
    }
}

impl BusTransport for SimI2c {
    fn open(&mut self, bus: BusIndex) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if state.fail_open {
            return Err(SimBusError(ErrorKind::Other));
        }
        state.current = Some(bus);
        state.log.write(BusOp::Open(bus));
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.lock();
        state.current = None;
        state.log.write(BusOp::Close);
    }
}
