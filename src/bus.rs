//! Bus arbiter: one lock over two physical I2C buses.
//!
//! ```text
//!   driver A ──┐                          ┌── bus 0 (humidity, optical)
//!   driver B ──┼──▶ acquire(bus, addr) ──▶│
//!   driver C ──┘    BusLock (guard)       └── bus 1 (movement, magnetometer)
//! ```
//!
//! Both buses share one controller, so switching bus index closes the
//! transport and reopens it with the other pin mapping.  That only ever
//! happens while the caller holds the lock, so no transaction can straddle a
//! switch.  Transfer primitives live on [`BusLock`]; code without a lock
//! cannot touch the bus.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use log::{debug, info, warn};

use crate::error::BusError;

/// Default acquisition timeout.
pub const DEFAULT_BUS_TIMEOUT: Duration = Duration::from_millis(2500);

/// Largest register payload accepted by [`BusLock::write_reg`].
pub const MAX_REG_WRITE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BusIndex {
    Bus0 = 0,
    Bus1 = 1,
}

/// An I2C controller whose pin mapping can be switched between buses.
pub trait BusTransport: I2c {
    /// Bring the controller up on `bus`.
    fn open(&mut self, bus: BusIndex) -> Result<(), Self::Error>;
    /// Release the controller pins.
    fn close(&mut self);
}

struct BusState<T> {
    transport: T,
    current: Option<BusIndex>,
    held: bool,
    reconfigurations: u32,
}

// ═══════════════════════════════════════════════════════════════════════════
//  Arbiter
// ═══════════════════════════════════════════════════════════════════════════

pub struct BusArbiter<T> {
    state: Mutex<BusState<T>>,
    released: Condvar,
    timeout: Duration,
}

impl<T: BusTransport> BusArbiter<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self {
            state: Mutex::new(BusState {
                transport,
                current: None,
                held: false,
                reconfigurations: 0,
            }),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Open the transport on bus 0.  Failure here is fatal at boot.
    pub fn open(&self) -> Result<(), BusError> {
        let mut state = self.lock_state();
        if state.current.is_some() {
            return Ok(());
        }
        state.transport.open(BusIndex::Bus0).map_err(|e| {
            warn!("Bus: open failed ({})", e.kind());
            BusError::Init
        })?;
        state.current = Some(BusIndex::Bus0);
        info!("Bus: transport open on {:?}", BusIndex::Bus0);
        Ok(())
    }

    /// Acquire with the configured timeout.
    pub fn acquire(&self, bus: BusIndex, address: u8) -> Result<BusLock<'_, T>, BusError> {
        self.acquire_timeout(bus, address, self.timeout)
    }

    pub fn acquire_timeout(
        &self,
        bus: BusIndex,
        address: u8,
        timeout: Duration,
    ) -> Result<BusLock<'_, T>, BusError> {
        let guard = self.lock_state();
        let (mut state, _) = self
            .released
            .wait_timeout_while(guard, timeout, |s| s.held)
            .unwrap_or_else(PoisonError::into_inner);

        if state.held {
            warn!("Bus: lock for 0x{address:02X} on {bus:?} timed out");
            return Err(BusError::Timeout);
        }
        state.held = true;

        if state.current != Some(bus) {
            if state.current.take().is_some() {
                state.transport.close();
            }
            if let Err(e) = state.transport.open(bus) {
                warn!("Bus: reopen on {bus:?} failed ({})", e.kind());
                state.held = false;
                drop(state);
                self.released.notify_one();
                return Err(BusError::Init);
            }
            state.current = Some(bus);
            state.reconfigurations += 1;
            debug!("Bus: switched to {bus:?}");
        }

        Ok(BusLock {
            arbiter: self,
            bus,
            address,
        })
    }

    /// Close and reopen the transport on the current bus.
    pub fn reset(&self) -> Result<(), BusError> {
        let bus = self.current_bus().unwrap_or(BusIndex::Bus0);
        let lock = self.acquire(bus, 0)?;
        let mut state = self.lock_state();
        state.transport.close();
        let reopened = state.transport.open(bus);
        state.current = reopened.is_ok().then_some(bus);
        drop(state);
        drop(lock);
        reopened.map_err(|_| BusError::Init)
    }

    pub fn current_bus(&self) -> Option<BusIndex> {
        self.lock_state().current
    }

    /// Number of bus switches performed since construction.
    pub fn reconfigurations(&self) -> u32 {
        self.lock_state().reconfigurations
    }

    pub fn is_held(&self) -> bool {
        self.lock_state().held
    }

    fn release(&self) {
        self.lock_state().held = false;
        self.released.notify_one();
    }

    fn transfer<R>(
        &self,
        f: impl FnOnce(&mut T) -> Result<R, T::Error>,
    ) -> Result<R, BusError> {
        let mut state = self.lock_state();
        f(&mut state.transport).map_err(|e| BusError::Transfer(e.kind()))
    }

    fn lock_state(&self) -> MutexGuard<'_, BusState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Lock token
// ═══════════════════════════════════════════════════════════════════════════

/// Exclusive ownership of the bus for one device.  Dropping it releases the
/// bus.
pub struct BusLock<'a, T: BusTransport> {
    arbiter: &'a BusArbiter<T>,
    bus: BusIndex,
    address: u8,
}

impl<T: BusTransport> BusLock<'_, T> {
    pub fn bus(&self) -> BusIndex {
        self.bus
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), BusError> {
        let address = self.address;
        self.arbiter.transfer(|t| t.write(address, data))
    }

    pub fn write_single(&mut self, byte: u8) -> Result<(), BusError> {
        self.write(&[byte])
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        let address = self.address;
        self.arbiter.transfer(|t| t.read(address, buf))
    }

    pub fn write_read(&mut self, wdata: &[u8], rdata: &mut [u8]) -> Result<(), BusError> {
        let address = self.address;
        self.arbiter.transfer(|t| t.write_read(address, wdata, rdata))
    }

    /// Read `buf.len()` bytes starting at register `reg`.
    pub fn read_reg(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        self.write_read(&[reg], buf)
    }

    /// Write `data` starting at register `reg`.
    pub fn write_reg(&mut self, reg: u8, data: &[u8]) -> Result<(), BusError> {
        let mut frame: heapless::Vec<u8, { MAX_REG_WRITE + 1 }> = heapless::Vec::new();
        if frame.push(reg).is_err() || frame.extend_from_slice(data).is_err() {
            return Err(BusError::Transfer(ErrorKind::Overrun));
        }
        self.write(&frame)
    }
}

impl<T: BusTransport> Drop for BusLock<'_, T> {
    fn drop(&mut self) {
        self.arbiter.release();
    }
}
