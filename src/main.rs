//! SensorTag host simulator: main entry point
//!
//! Runs the unmodified application core against simulated adapters and a
//! scripted peer so the whole event path can be watched in the log.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  ticker thread ── TimerSet::service ──┐                        │
//! │  peer thread ──── EventSender ────────┼──▶ EventHub            │
//! │                   GpioDispatcher ─────┘        │               │
//! │                   SimStack (client writes)     ▼               │
//! │  main thread ─────────────────────────── Scheduler::run        │
//! │                                           │    │    │          │
//! │                         SimI2c ◀─ BusArbiter  SimStack LogSink │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `sensortag-sim [config.json]`.  `RUST_LOG` selects verbosity.
#![deny(unused_must_use)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::info;

use sensortag::adapters::indicators::SimIndicators;
use sensortag::adapters::log_sink::LogEventSink;
use sensortag::adapters::sim_bus::SimI2c;
use sensortag::adapters::sim_stack::SimStack;
use sensortag::adapters::time::SystemClock;
use sensortag::app::ports::Clock;
use sensortag::app::scheduler::{Ports, Scheduler};
use sensortag::bus::BusArbiter;
use sensortag::config::AppConfig;
use sensortag::events::{EventSender, StackMessage};
use sensortag::fsm::ConnectionState;
use sensortag::gpio::{GpioDispatcher, PinId};
use sensortag::sensors::humidity::HumiditySensor;
use sensortag::sensors::io::IoService;
use sensortag::sensors::keys::KeysService;
use sensortag::sensors::movement::MovementSensor;
use sensortag::sensors::optical::OpticalSensor;
use sensortag::sensors::{ParamId, SensorRegistry, ServiceId};

const PUBLIC_ADDRESS: [u8; 6] = [0xB0, 0xB4, 0x48, 0xC9, 0x1A, 0x04];
const TICK: Duration = Duration::from_millis(10);

fn load_config() -> Result<AppConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(AppConfig::default());
    };
    let text =
        std::fs::read_to_string(&path).with_context(|| format!("reading config {path}"))?;
    AppConfig::from_json(&text).with_context(|| format!("loading config {path}"))
}

fn build_registry() -> SensorRegistry<SimI2c> {
    let mut registry = SensorRegistry::new();
    registry.register(Box::new(HumiditySensor::new()));
    registry.register(Box::new(OpticalSensor::new()));
    registry.register(Box::new(MovementSensor::new()));
    registry.register(Box::new(IoService::new()));
    registry.register(Box::new(KeysService::new()));
    registry
}

/// Scripted peer: walks the link through its states, writes
/// characteristics and toggles inputs.
fn run_peer(events: EventSender, stack: SimStack, gpio: GpioDispatcher) {
    let pause = |ms| thread::sleep(Duration::from_millis(ms));

    pause(50);
    events.state_changed(ConnectionState::Started);
    events.state_changed(ConnectionState::Advertising);

    pause(2_500);
    gpio.on_pin_edge(PinId::KeyLeft, false);
    pause(300);
    gpio.on_pin_edge(PinId::KeyLeft, true);

    pause(1_000);
    events.state_changed(ConnectionState::Connected);
    events.post_stack_message(StackMessage::Gatt {
        conn_handle: 0,
        method: 0x12,
    });

    stack.client_write(ServiceId::Optical, ParamId::Period, &[50]);
    events.characteristic_written(ServiceId::Optical.code(), ParamId::Period.code());
    stack.client_write(ServiceId::Optical, ParamId::Config, &[0x01]);
    events.characteristic_written(ServiceId::Optical.code(), ParamId::Config.code());

    pause(3_000);
    gpio.on_pin_edge(PinId::MotionInt, true);
    events.post_stack_message(StackMessage::Other {
        service_class: 0x03,
        event: 0x01,
    });

    pause(3_000);
    events.state_changed(ConnectionState::Waiting);
    pause(200);
    events.state_changed(ConnectionState::Advertising);
    info!("Peer: script complete");
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("SensorTag simulator v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    let bus = Arc::new(BusArbiter::new(SimI2c::sensortag(), config.bus_timeout()));
    let stack = SimStack::new(PUBLIC_ADDRESS);
    let clock = SystemClock::new();

    let mut sched = Scheduler::new(config, bus, build_registry(), Ports {
        stack: stack.clone(),
        indicators: SimIndicators::new(),
        clock,
        sink: LogEventSink::new(),
    });
    let self_test = sched.boot().context("boot")?;
    info!("Main: boot complete, self-test {self_test}");

    let timers = sched.timers();
    thread::Builder::new()
        .name("ticker".into())
        .spawn(move || {
            loop {
                timers.service(clock.now_ms());
                thread::sleep(TICK);
            }
        })
        .context("spawning ticker")?;

    let events = sched.sender();
    let gpio = GpioDispatcher::new(events.clone());
    thread::Builder::new()
        .name("peer".into())
        .spawn(move || run_peer(events, stack, gpio))
        .context("spawning peer")?;

    sched.run()
}
