//! Integration tests for the scheduler → FSM → drivers → stack pipeline.
//!
//! Every test drives the scheduler with `run_cycle` so nothing blocks; the
//! wake signal is checked separately where it matters.

use sensortag::adapters::sim_bus::{BusOp, SimI2c};
use sensortag::advert::{ACC_OFFSET, KEY_STATE_OFFSET};
use sensortag::app::events::AppEvent;
use sensortag::app::ports::Led;
use sensortag::bus::BusIndex;
use sensortag::config::{AppConfig, EVENT_QUEUE_DEPTH};
use sensortag::error::{BusError, Error};
use sensortag::events::{AppEventKind, EventFlag, StackMessage};
use sensortag::fsm::ConnectionState;
use sensortag::fsm::context::system_id_from_address;
use sensortag::selftest::SelfTestBitmap;
use sensortag::sensors::keys::KEY_LEFT;
use sensortag::sensors::{ParamId, ServiceId, humidity, movement};

use crate::mock_hw::{ADDRESS, IndicatorCall, booted, harness, harness_with};

const DETECTED: SelfTestBitmap = SelfTestBitmap::HUMIDITY
    .union(SelfTestBitmap::LIGHT)
    .union(SelfTestBitmap::MPU)
    .union(SelfTestBitmap::MAG);

fn enter(h: &mut crate::mock_hw::Harness, state: ConnectionState) {
    h.sched.sender().state_changed(state);
    h.sched.run_cycle();
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn boot_self_tests_and_queues_sensor_enables() {
    let mut h = harness();
    let result = h.sched.boot().unwrap();

    assert_eq!(result, DETECTED);
    assert_eq!(h.sched.self_test_result(), DETECTED);
    // Default map asks for parts this board lacks, so the red LED reports.
    assert!(h.sched.ports().indicators.calls.contains(&IndicatorCall::Blink {
        led: Led::Led1,
        count: 5,
        duration_ms: 5,
    }));

    let stack = &h.sched.ports().stack;
    assert_eq!(stack.value(ServiceId::Humidity, ParamId::Config), Some(&[0x01][..]));
    assert_eq!(stack.value(ServiceId::Movement, ParamId::Config), Some(&[0x7E, 0x01][..]));
    assert_eq!(h.sched.hub().pending(), 2);
    assert!(h.sched.timers().user_periodic().is_active());
    assert!(!h.sched.timers().periodic().is_active());
    assert!(matches!(
        h.sched.ports().sink.events.first(),
        Some(AppEvent::Booted { self_test }) if *self_test == DETECTED
    ));
}

#[test]
fn full_pass_blinks_green() {
    let config = AppConfig {
        self_test_map: DETECTED.bits(),
        ..AppConfig::default()
    };
    let mut h = harness_with(config, SimI2c::sensortag());
    h.sched.boot().unwrap();
    assert_eq!(h.sched.ports().indicators.blinks(Led::Led2), 5);
    assert_eq!(h.sched.ports().indicators.blinks(Led::Led1), 0);
}

#[test]
fn missing_part_clears_its_bit_and_blinks_red() {
    let sim = SimI2c::sensortag();
    sim.remove_device(humidity::BUS, humidity::ADDRESS);
    let config = AppConfig {
        self_test_map: DETECTED.bits(),
        ..AppConfig::default()
    };
    let mut h = harness_with(config, sim);
    let result = h.sched.boot().unwrap();

    assert!(!result.contains(SelfTestBitmap::HUMIDITY));
    assert!(result.contains(SelfTestBitmap::LIGHT));
    assert!(result.contains(SelfTestBitmap::MPU));
    assert_eq!(h.sched.ports().indicators.blinks(Led::Led1), 5);
    assert_eq!(h.sched.ports().indicators.blinks(Led::Led2), 0);
}

#[test]
fn boot_fails_without_bus() {
    let sim = SimI2c::sensortag();
    sim.set_fail_open(true);
    let mut h = harness_with(AppConfig::default(), sim);
    assert_eq!(h.sched.boot(), Err(Error::Init("bus open")));
}

#[test]
fn boot_enables_are_applied_on_first_cycle() {
    let mut h = booted();
    h.clock.advance(humidity::CONVERSION_MS);
    h.sched.run_cycle();

    // 4 g range lands in ACCEL_CONFIG bits 4:3.
    assert_eq!(
        h.sim.registers(movement::BUS, movement::ADDRESS, movement::REG_ACCEL_CONFIG, 1),
        vec![0x08]
    );
    let stack = &h.sched.ports().stack;
    assert_eq!(
        stack.value(ServiceId::Humidity, ParamId::Data),
        Some(&[0x00, 0x60, 0x00, 0x80][..])
    );
    let movement = stack.value(ServiceId::Movement, ParamId::Data).unwrap();
    assert_eq!(movement.len(), movement::DATA_LEN);
    assert_eq!(h.sched.snapshot().acc_raw, [0x0100, -256, 0x4000]);
    assert_eq!(h.sched.stats().app_messages, 2);
}

#[test]
fn humidity_waits_for_conversion_before_reading() {
    let mut h = booted();
    assert_ne!(
        h.sched.ports().stack.value(ServiceId::Humidity, ParamId::Data),
        Some(&[0x00, 0x60, 0x00, 0x80][..])
    );
    let humidity_ops: Vec<BusOp> = h
        .sim
        .log()
        .into_iter()
        .filter(|op| match op {
            BusOp::Write { address, .. } | BusOp::Read { address, .. } => {
                *address == humidity::ADDRESS
            }
            _ => false,
        })
        .collect();
    assert!(matches!(humidity_ops.last(), Some(BusOp::Write { len: 1, .. })));

    h.clock.advance(humidity::CONVERSION_MS - 1);
    h.sched.run_cycle();
    assert_ne!(
        h.sched.ports().stack.value(ServiceId::Humidity, ParamId::Data),
        Some(&[0x00, 0x60, 0x00, 0x80][..])
    );

    h.clock.advance(1);
    h.sched.run_cycle();
    assert_eq!(
        h.sched.ports().stack.value(ServiceId::Humidity, ParamId::Data),
        Some(&[0x00, 0x60, 0x00, 0x80][..])
    );
    assert!((h.sched.snapshot().humidity_rh - 50.0).abs() < 0.01);
}

// ── Link state ────────────────────────────────────────────────

#[test]
fn started_publishes_identity() {
    let mut h = booted();
    enter(&mut h, ConnectionState::Started);

    let stack = &h.sched.ports().stack;
    assert_eq!(stack.system_id, Some(system_id_from_address(&ADDRESS)));
    assert_eq!(
        stack.system_id,
        Some([0x11, 0x22, 0x33, 0x00, 0x00, 0x44, 0x55, 0x66])
    );
    assert_eq!(stack.statuses, vec!["Initialized".to_owned()]);
    assert_eq!(h.sched.state(), ConnectionState::Started);
}

#[test]
fn advertising_arms_periodic_and_sets_payload() {
    let mut h = booted();
    enter(&mut h, ConnectionState::Advertising);

    assert!(h.sched.timers().periodic().is_active());
    let advert = h.sched.ports().stack.last_advert().unwrap();
    assert_eq!(advert.len(), 20);
    assert_eq!(advert[KEY_STATE_OFFSET], 0);
    assert_eq!(&advert[ACC_OFFSET..], &[0x00, 0x01, 0x00, 0xFF, 0x00, 0x40]);
}

#[test]
fn first_connection_enables_advertising_once() {
    let mut h = booted();
    enter(&mut h, ConnectionState::Advertising);
    enter(&mut h, ConnectionState::Connected);
    enter(&mut h, ConnectionState::Advertising);
    enter(&mut h, ConnectionState::Connected);

    assert_eq!(h.sched.ports().stack.advertising, vec![true]);
    let ind = &h.sched.ports().indicators;
    assert!(!ind.led_on(Led::Led1));
    assert!(ind.calls.contains(&IndicatorCall::Buzzer(false)));
}

#[test]
fn waiting_resets_sensors() {
    let mut h = booted();
    enter(&mut h, ConnectionState::Connected);
    enter(&mut h, ConnectionState::Waiting);

    let stack = &h.sched.ports().stack;
    assert_eq!(
        stack.value(ServiceId::Movement, ParamId::Data),
        Some(&[0u8; movement::DATA_LEN][..])
    );
    assert_eq!(stack.value(ServiceId::Humidity, ParamId::Config), Some(&[0u8][..]));
    assert_eq!(stack.value(ServiceId::Keys, ParamId::Data), Some(&[0u8][..]));
}

#[test]
fn error_state_latches_red_led() {
    let mut h = booted();
    enter(&mut h, ConnectionState::Error);
    assert!(h.sched.ports().indicators.led_on(Led::Led1));
}

#[test]
fn unknown_state_code_is_ignored() {
    let mut h = booted();
    h.sched.hub().enqueue(AppEventKind::StateChange, 42, 0);
    h.sched.run_cycle();
    assert_eq!(h.sched.state(), ConnectionState::Init);
    assert_eq!(h.sched.stats().unknown_messages, 1);
}

#[test]
fn state_changes_reach_the_sink() {
    let mut h = booted();
    enter(&mut h, ConnectionState::Started);
    enter(&mut h, ConnectionState::Advertising);
    let sink = &h.sched.ports().sink;
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::LinkStateChanged { .. })),
        2
    );
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AppEvent::LinkStateChanged {
            from: ConnectionState::Started,
            to: ConnectionState::Advertising
        }
    )));
}

// ── Timers ────────────────────────────────────────────────────

#[test]
fn periodic_refreshes_advert_and_rearms() {
    let mut h = booted();
    enter(&mut h, ConnectionState::Advertising);
    let refreshes = h.sched.stats().advert_refreshes;

    let now = h.clock.advance(1000);
    h.sched.timers().service(now);
    assert!(h.sched.hub().flags().is_set(EventFlag::Periodic));
    h.sched.run_cycle();

    assert_eq!(h.sched.stats().advert_refreshes, refreshes + 1);
    assert!(h.sched.timers().periodic().is_active());
    let ind = &h.sched.ports().indicators;
    assert_eq!(ind.blinks(Led::Led2), 1);
    // Five from boot plus ten while advertising.
    assert_eq!(ind.blinks(Led::Led1), 15);
}

#[test]
fn periodic_while_connected_emits_telemetry() {
    let mut h = booted();
    enter(&mut h, ConnectionState::Connected);

    let now = h.clock.advance(1000);
    h.sched.timers().service(now);
    h.sched.run_cycle();

    assert_eq!(h.sched.stats().periodic_tasks, 1);
    assert!(h.sched.timers().periodic().is_active());
    let telemetry = h
        .sched
        .ports()
        .sink
        .count(|e| matches!(e, AppEvent::Telemetry(_)));
    assert_eq!(telemetry, 1);
}

#[test]
fn periodic_lapses_outside_link_states() {
    let mut h = booted();
    enter(&mut h, ConnectionState::Advertising);
    enter(&mut h, ConnectionState::Waiting);

    let now = h.clock.advance(1000);
    h.sched.timers().service(now);
    h.sched.run_cycle();

    assert!(!h.sched.timers().periodic().is_active());
    assert_eq!(h.sched.stats().periodic_tasks, 0);
}

#[test]
fn periodic_takes_precedence_over_user_periodic() {
    let mut h = booted();
    enter(&mut h, ConnectionState::Connected);
    h.sched.hub().set_flag(EventFlag::Periodic);
    h.sched.hub().set_flag(EventFlag::UserPeriodic);

    h.sched.run_cycle();
    assert_eq!(h.sched.stats().periodic_tasks, 1);
    assert_eq!(h.sched.stats().user_periodic, 0);
    assert!(h.sched.hub().wake_pending());

    h.sched.run_cycle();
    assert_eq!(h.sched.stats().user_periodic, 1);
}

// ── Stack messages ────────────────────────────────────────────

#[test]
fn one_stack_message_per_cycle() {
    let mut h = booted();
    let tx = h.sched.sender();
    tx.post_stack_message(StackMessage::Gatt {
        conn_handle: 1,
        method: 0x12,
    });
    tx.post_stack_message(StackMessage::Other {
        service_class: 3,
        event: 1,
    });

    h.sched.run_cycle();
    assert_eq!(h.sched.stats().stack_messages, 1);
    assert_eq!(h.sched.stats().gatt_messages, 1);
    assert!(h.sched.hub().wake_pending());

    h.sched.run_cycle();
    assert_eq!(h.sched.stats().stack_messages, 2);
    assert_eq!(h.sched.stats().gatt_messages, 1);
}

#[test]
fn run_once_consumes_the_wake() {
    let mut h = booted();
    h.sched.sender().state_changed(ConnectionState::Started);
    h.sched.run_once();
    assert_eq!(h.sched.stats().wakes, 1);
    assert_eq!(h.sched.state(), ConnectionState::Started);
    assert!(!h.sched.hub().wake_pending());
}

// ── Characteristic writes ─────────────────────────────────────

#[test]
fn char_write_enables_optical() {
    let mut h = booted();
    h.sched
        .ports_mut()
        .stack
        .client_write(ServiceId::Optical, ParamId::Config, &[0x01]);
    h.sched
        .sender()
        .characteristic_written(ServiceId::Optical.code(), ParamId::Config.code());
    h.sched.run_cycle();

    let data = h.sched.ports().stack.value(ServiceId::Optical, ParamId::Data);
    assert_eq!(data, Some(&[0xE8, 0x23][..]));
    assert!((h.sched.snapshot().light_lux - 40.0).abs() < 0.01);
}

#[test]
fn write_to_unknown_characteristic_is_counted() {
    let mut h = booted();
    h.sched
        .sender()
        .characteristic_written(ServiceId::Optical.code(), 9);
    h.sched.run_cycle();
    assert_eq!(h.sched.stats().unknown_messages, 1);
}

#[test]
fn write_to_missing_driver_is_ignored() {
    let mut h = booted();
    h.sched
        .sender()
        .characteristic_written(ServiceId::Barometer.code(), ParamId::Config.code());
    h.sched.run_cycle();
    assert_eq!(h.sched.stats().unknown_messages, 0);
    assert_eq!(h.sched.stats().degraded_reads, 0);
}

// ── Keys and motion ───────────────────────────────────────────

#[test]
fn key_change_publishes_and_refreshes_advert() {
    let mut h = booted();
    enter(&mut h, ConnectionState::Advertising);
    let adverts = h.sched.ports().stack.adverts.len();

    h.sched.sender().keys_changed(KEY_LEFT);
    h.sched.run_cycle();

    let stack = &h.sched.ports().stack;
    assert_eq!(stack.value(ServiceId::Keys, ParamId::Data), Some(&[KEY_LEFT][..]));
    assert_eq!(stack.adverts.len(), adverts + 1);
    assert_eq!(stack.last_advert().unwrap()[KEY_STATE_OFFSET], KEY_LEFT);
}

#[test]
fn key_change_while_connected_leaves_advert() {
    let mut h = booted();
    enter(&mut h, ConnectionState::Connected);
    h.sched.sender().keys_changed(KEY_LEFT);
    h.sched.run_cycle();
    assert!(h.sched.ports().stack.adverts.is_empty());
    assert_eq!(h.sched.snapshot().key_state, KEY_LEFT);
}

#[test]
fn motion_wake_samples_movement() {
    let mut h = booted();
    h.sched
        .ports_mut()
        .stack
        .client_write(ServiceId::Movement, ParamId::Data, &[]);
    h.sched.hub().set_flag(EventFlag::MotionWake);
    h.sched.run_cycle();

    assert_eq!(h.sched.stats().motion_wakes, 1);
    let data = h.sched.ports().stack.value(ServiceId::Movement, ParamId::Data);
    assert_eq!(data.map(<[u8]>::len), Some(movement::DATA_LEN));
}

// ── Degradation ───────────────────────────────────────────────

#[test]
fn dropped_messages_are_reported_once() {
    let mut h = booted();
    for _ in 0..EVENT_QUEUE_DEPTH + 2 {
        h.sched.sender().keys_changed(0);
    }
    h.sched.run_cycle();
    h.sched.run_cycle();

    let sink = &h.sched.ports().sink;
    assert_eq!(sink.count(|e| matches!(e, AppEvent::EventsDropped(2))), 1);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::EventsDropped(_))), 1);
}

#[test]
fn held_bus_degrades_sampling_without_blocking() {
    let config = AppConfig {
        bus_timeout_ms: 20,
        ..AppConfig::default()
    };
    let mut h = harness_with(config, SimI2c::sensortag());
    h.sched.boot().unwrap();
    h.sched.run_cycle();

    let bus = h.sched.bus().clone();
    let _held = bus.acquire(BusIndex::Bus0, humidity::ADDRESS).unwrap();
    h.clock.advance(1000);
    h.sched.run_cycle();

    let sink = &h.sched.ports().sink;
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AppEvent::SensorDegraded {
            service: ServiceId::Humidity,
            error: BusError::Timeout
        }
    )));
    assert_eq!(
        h.sched.ports().stack.value(ServiceId::Humidity, ParamId::Data),
        Some(&[0xCC; humidity::DATA_LEN][..])
    );
}

#[test]
fn transfer_errors_publish_error_data() {
    let mut h = booted();
    h.sim.set_fail_transfers(true);
    h.clock.advance(1000);
    h.sched.run_cycle();

    assert!(h.sched.stats().degraded_reads >= 2);
    assert_eq!(
        h.sched.ports().stack.value(ServiceId::Movement, ParamId::Data),
        Some(&[0xCC; movement::DATA_LEN][..])
    );
}

#[test]
fn transfer_error_resets_the_transport() {
    let mut h = booted();
    h.sim.set_fail_transfers(true);
    h.sim.clear_log();
    let switches_before = h.sched.bus().reconfigurations();
    h.clock.advance(1000);
    h.sched.run_cycle();

    let resets = h.sched.stats().bus_resets;
    assert!(resets >= 1);
    // A reset reopens without counting as a bus switch.
    let switches = h.sched.bus().reconfigurations() - switches_before;
    let opens = h
        .sim
        .log()
        .iter()
        .filter(|op| matches!(op, BusOp::Open(_)))
        .count() as u64;
    assert_eq!(opens, u64::from(switches) + resets);
    assert!(h.sched.bus().current_bus().is_some());
    assert!(!h.sched.bus().is_held());
}

#[test]
fn sampling_recovers_once_transfers_succeed() {
    let mut h = booted();
    h.sim.set_fail_transfers(true);
    h.clock.advance(1000);
    h.sched.run_cycle();
    let degraded = h.sched.stats().degraded_reads;

    h.sim.set_fail_transfers(false);
    h.clock.advance(1000);
    h.sched.run_cycle();

    assert_eq!(h.sched.stats().degraded_reads, degraded);
    let data = h.sched.ports().stack.value(ServiceId::Movement, ParamId::Data).unwrap();
    assert_ne!(data, &[0xCC; movement::DATA_LEN][..]);
}
