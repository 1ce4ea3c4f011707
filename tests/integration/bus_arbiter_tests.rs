//! Bus arbiter integration tests against the simulated two-bus transport.
//!
//! The operation log of [`SimI2c`] is the ground truth: every transfer must
//! sit between an `Open` of its own bus and the next `Close`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use sensortag::adapters::sim_bus::{BusOp, SimI2c};
use sensortag::bus::{BusArbiter, BusIndex};
use sensortag::error::BusError;
use sensortag::sensors::{humidity, movement};

fn arbiter(timeout_ms: u64) -> (Arc<BusArbiter<SimI2c>>, SimI2c) {
    let sim = SimI2c::sensortag();
    let bus = Arc::new(BusArbiter::new(
        sim.clone(),
        Duration::from_millis(timeout_ms),
    ));
    bus.open().unwrap();
    (bus, sim)
}

/// Panics if any transfer in `log` ran on a bus other than the open one.
fn assert_no_straddle(log: &[BusOp]) {
    let mut open = None;
    for op in log {
        match *op {
            BusOp::Open(bus) => {
                assert!(open.is_none(), "opened {bus:?} while {open:?} still open");
                open = Some(bus);
            }
            BusOp::Close => open = None,
            BusOp::Write { bus, .. } | BusOp::Read { bus, .. } => {
                assert_eq!(open, Some(bus), "transfer on {bus:?} while {open:?} open");
            }
        }
    }
}

#[test]
fn switching_reconfigures_exactly_once() {
    let (bus, sim) = arbiter(100);
    assert_eq!(bus.current_bus(), Some(BusIndex::Bus0));

    let mut id = [0u8; 1];
    bus.acquire(movement::BUS, movement::ADDRESS)
        .unwrap()
        .read_reg(movement::REG_WHO_AM_I, &mut id)
        .unwrap();
    assert_eq!(id[0], movement::WHO_AM_I);
    assert_eq!(bus.reconfigurations(), 1);

    // Same bus again: no switch.
    bus.acquire(movement::BUS, movement::MAG_ADDRESS).unwrap();
    assert_eq!(bus.reconfigurations(), 1);
    assert_eq!(bus.current_bus(), Some(BusIndex::Bus1));

    let opens = sim
        .log()
        .iter()
        .filter(|op| matches!(op, BusOp::Open(_)))
        .count();
    assert_eq!(opens, 2);
}

#[test]
fn lock_is_released_on_drop() {
    let (bus, _sim) = arbiter(10);
    {
        let _lock = bus.acquire(BusIndex::Bus0, humidity::ADDRESS).unwrap();
        assert!(bus.is_held());
    }
    assert!(!bus.is_held());
    assert!(bus.acquire(BusIndex::Bus0, humidity::ADDRESS).is_ok());
}

#[test]
fn second_acquirer_times_out_while_held() {
    let (bus, _sim) = arbiter(20);
    let _held = bus.acquire(BusIndex::Bus0, humidity::ADDRESS).unwrap();

    let contender = bus.clone();
    let result = thread::spawn(move || {
        contender
            .acquire(BusIndex::Bus1, movement::ADDRESS)
            .map(|_| ())
    })
    .join()
    .unwrap();
    assert_eq!(result, Err(BusError::Timeout));
    assert_eq!(bus.current_bus(), Some(BusIndex::Bus0));
}

#[test]
fn waiter_proceeds_once_released() {
    let (bus, _sim) = arbiter(2_000);
    let held = bus.acquire(BusIndex::Bus0, humidity::ADDRESS).unwrap();

    let contender = bus.clone();
    let waiter = thread::spawn(move || {
        contender
            .acquire(BusIndex::Bus1, movement::ADDRESS)
            .map(|lock| lock.bus())
    });
    thread::sleep(Duration::from_millis(20));
    drop(held);
    assert_eq!(waiter.join().unwrap(), Ok(BusIndex::Bus1));
}

#[test]
fn concurrent_drivers_never_straddle_a_switch() {
    let (bus, sim) = arbiter(2_000);
    let in_flight = Arc::new(AtomicBool::new(false));

    let workers: Vec<_> = [
        (humidity::BUS, humidity::ADDRESS, humidity::REG_TEMPERATURE, 4),
        (movement::BUS, movement::ADDRESS, movement::REG_ACCEL_XOUT_H, 6),
    ]
    .into_iter()
    .map(|(index, address, reg, len)| {
        let bus = bus.clone();
        let in_flight = in_flight.clone();
        thread::spawn(move || {
            let mut buf = vec![0u8; len];
            for _ in 0..50 {
                let mut lock = bus.acquire(index, address).unwrap();
                assert!(!in_flight.swap(true, Ordering::SeqCst), "two holders");
                lock.read_reg(reg, &mut buf).unwrap();
                in_flight.store(false, Ordering::SeqCst);
            }
        })
    })
    .collect();

    for w in workers {
        w.join().unwrap();
    }

    let log = sim.log();
    assert_no_straddle(&log);
    let transfers = log
        .iter()
        .filter(|op| matches!(op, BusOp::Read { .. }))
        .count();
    assert_eq!(transfers, 100);
}

#[test]
fn failed_reopen_releases_the_lock() {
    let (bus, sim) = arbiter(10);
    sim.set_fail_open(true);
    assert!(matches!(
        bus.acquire(BusIndex::Bus1, movement::ADDRESS),
        Err(BusError::Init)
    ));
    assert!(!bus.is_held());

    sim.set_fail_open(false);
    assert!(bus.acquire(BusIndex::Bus1, movement::ADDRESS).is_ok());
}

#[test]
fn transfer_errors_carry_the_kind() {
    let (bus, sim) = arbiter(10);
    sim.set_fail_transfers(true);
    let mut buf = [0u8; 2];
    let err = bus
        .acquire(BusIndex::Bus0, humidity::ADDRESS)
        .unwrap()
        .read(&mut buf)
        .unwrap_err();
    assert!(matches!(err, BusError::Transfer(_)));
}
