//! Fuzz target: arbitrary message streams through the scheduler.
//!
//! Each input byte triple becomes one producer action (queued message,
//! stack message, flag or characteristic write) against a booted scheduler
//! on the simulated bus.
//!
//! Invariants checked:
//! - No panics for any message sequence, state code or characteristic value
//! - With nothing dropped, the scheduler ends in the last reported state
//!
//! cargo fuzz run fuzz_event_stream

#![no_main]

use std::sync::Arc;
use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use sensortag::adapters::indicators::SimIndicators;
use sensortag::adapters::log_sink::LogEventSink;
use sensortag::adapters::sim_bus::SimI2c;
use sensortag::adapters::sim_stack::SimStack;
use sensortag::adapters::time::SystemClock;
use sensortag::app::scheduler::{Ports, Scheduler};
use sensortag::bus::BusArbiter;
use sensortag::config::AppConfig;
use sensortag::events::{AppEventKind, EventFlag, StackMessage};
use sensortag::fsm::ConnectionState;
use sensortag::sensors::humidity::HumiditySensor;
use sensortag::sensors::io::IoService;
use sensortag::sensors::keys::KeysService;
use sensortag::sensors::movement::MovementSensor;
use sensortag::sensors::optical::OpticalSensor;
use sensortag::sensors::{ParamId, SensorRegistry, ServiceId};

fuzz_target!(|data: &[u8]| {
    let mut registry = SensorRegistry::new();
    registry.register(Box::new(HumiditySensor::new()));
    registry.register(Box::new(OpticalSensor::new()));
    registry.register(Box::new(MovementSensor::new()));
    registry.register(Box::new(IoService::new()));
    registry.register(Box::new(KeysService::new()));

    let bus = Arc::new(BusArbiter::new(SimI2c::sensortag(), Duration::from_millis(5)));
    let peer = SimStack::new([0; 6]);
    let mut sched = Scheduler::new(AppConfig::default(), bus, registry, Ports {
        stack: peer.clone(),
        indicators: SimIndicators::new(),
        clock: SystemClock::new(),
        sink: LogEventSink::new(),
    });
    if sched.boot().is_err() {
        return;
    }

    let hub = sched.hub().clone();
    let mut last_state = ConnectionState::Init;
    for chunk in data.chunks_exact(3) {
        let (op, a, b) = (chunk[0], chunk[1], chunk[2]);
        match op % 6 {
            0 => {
                if let Some(state) = ConnectionState::from_code(a) {
                    last_state = state;
                }
                hub.enqueue(AppEventKind::StateChange, a, 0);
            }
            1 => {
                if let (Some(service), Some(param)) =
                    (ServiceId::from_code(a % 8), ParamId::from_code(b % 4))
                {
                    peer.client_write(service, param, &[b, a]);
                }
                hub.enqueue(AppEventKind::CharChange, a % 8, b % 4);
            }
            2 => {
                hub.enqueue(AppEventKind::KeyChange, 0, a);
            }
            3 => {
                let msg = if a & 1 == 0 {
                    StackMessage::Gatt {
                        conn_handle: u16::from(b),
                        method: a,
                    }
                } else {
                    StackMessage::Other {
                        service_class: a,
                        event: b,
                    }
                };
                hub.post_stack_message(msg);
            }
            4 => {
                let flag = match a % 3 {
                    0 => EventFlag::Periodic,
                    1 => EventFlag::UserPeriodic,
                    _ => EventFlag::MotionWake,
                };
                hub.set_flag(flag);
            }
            _ => sched.run_cycle(),
        }
    }
    sched.run_cycle();
    while hub.pending() > 0 {
        sched.run_cycle();
    }

    if hub.dropped() == 0 {
        assert_eq!(sched.state(), last_state);
    }
});
