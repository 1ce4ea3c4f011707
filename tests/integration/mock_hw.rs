//! Mock adapters for integration tests.
//!
//! Record every port call so tests can assert on the full history without
//! a radio stack, LEDs or a wall clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sensortag::adapters::sim_bus::SimI2c;
use sensortag::app::events::AppEvent;
use sensortag::app::ports::{CharValue, Clock, EventSink, IndicatorPort, Led, StackPort};
use sensortag::app::scheduler::{Ports, Scheduler};
use sensortag::bus::BusArbiter;
use sensortag::config::AppConfig;
use sensortag::sensors::humidity::HumiditySensor;
use sensortag::sensors::io::IoService;
use sensortag::sensors::keys::KeysService;
use sensortag::sensors::movement::MovementSensor;
use sensortag::sensors::optical::OpticalSensor;
use sensortag::sensors::{ParamId, SensorRegistry, ServiceId};

pub const ADDRESS: [u8; 6] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

// ── Recording stack ───────────────────────────────────────────

#[derive(Default)]
pub struct RecordingStack {
    pub chars: HashMap<(ServiceId, ParamId), CharValue>,
    pub adverts: Vec<Vec<u8>>,
    pub advertising: Vec<bool>,
    pub system_id: Option<[u8; 8]>,
    pub statuses: Vec<String>,
}

#[allow(dead_code)]
impl RecordingStack {
    pub fn value(&self, service: ServiceId, param: ParamId) -> Option<&[u8]> {
        self.chars.get(&(service, param)).map(|v| v.as_slice())
    }

    pub fn client_write(&mut self, service: ServiceId, param: ParamId, value: &[u8]) {
        self.chars
            .insert((service, param), CharValue::from_slice(value).unwrap());
    }

    pub fn last_advert(&self) -> Option<&[u8]> {
        self.adverts.last().map(Vec::as_slice)
    }
}

impl StackPort for RecordingStack {
    fn set_advertising_payload(&mut self, payload: &[u8]) {
        self.adverts.push(payload.to_vec());
    }

    fn set_characteristic_value(&mut self, service: ServiceId, param: ParamId, value: &[u8]) {
        self.chars
            .insert((service, param), CharValue::from_slice(value).unwrap());
    }

    fn characteristic_value(&self, service: ServiceId, param: ParamId) -> Option<CharValue> {
        self.chars.get(&(service, param)).cloned()
    }

    fn set_advertising_enabled(&mut self, enabled: bool) {
        self.advertising.push(enabled);
    }

    fn public_address(&self) -> [u8; 6] {
        ADDRESS
    }

    fn set_system_id(&mut self, id: [u8; 8]) {
        self.system_id = Some(id);
    }

    fn report_status(&mut self, status: &str) {
        self.statuses.push(status.to_owned());
    }
}

// ── Recording indicators ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorCall {
    SetLed { led: Led, on: bool },
    Buzzer(bool),
    Blink { led: Led, count: u8, duration_ms: u32 },
}

#[derive(Default)]
pub struct RecordingIndicators {
    pub calls: Vec<IndicatorCall>,
}

#[allow(dead_code)]
impl RecordingIndicators {
    pub fn blinks(&self, led: Led) -> u32 {
        self.calls
            .iter()
            .filter_map(|c| match c {
                IndicatorCall::Blink { led: l, count, .. } if *l == led => Some(u32::from(*count)),
                _ => None,
            })
            .sum()
    }

    pub fn led_on(&self, led: Led) -> bool {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                IndicatorCall::SetLed { led: l, on } if *l == led => Some(*on),
                _ => None,
            })
            .unwrap_or(false)
    }
}

impl IndicatorPort for RecordingIndicators {
    fn set_led(&mut self, led: Led, on: bool) {
        self.calls.push(IndicatorCall::SetLed { led, on });
    }

    fn set_buzzer(&mut self, on: bool) {
        self.calls.push(IndicatorCall::Buzzer(on));
    }

    fn blink(&mut self, led: Led, count: u8, duration_ms: u32) {
        self.calls.push(IndicatorCall::Blink {
            led,
            count,
            duration_ms,
        });
    }
}

// ── Manual clock ──────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

#[allow(dead_code)]
impl ManualClock {
    pub fn advance(&self, ms: u64) -> u64 {
        self.0.fetch_add(ms, Ordering::SeqCst) + ms
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Recording sink ────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Harness ───────────────────────────────────────────────────

pub type TestScheduler =
    Scheduler<SimI2c, RecordingStack, RecordingIndicators, ManualClock, RecordingSink>;

pub struct Harness {
    pub sched: TestScheduler,
    pub sim: SimI2c,
    pub clock: ManualClock,
}

pub fn full_registry() -> SensorRegistry<SimI2c> {
    let mut registry = SensorRegistry::new();
    registry.register(Box::new(HumiditySensor::new()));
    registry.register(Box::new(OpticalSensor::new()));
    registry.register(Box::new(MovementSensor::new()));
    registry.register(Box::new(IoService::new()));
    registry.register(Box::new(KeysService::new()));
    registry
}

#[allow(dead_code)]
pub fn harness_with(config: AppConfig, sim: SimI2c) -> Harness {
    let clock = ManualClock::default();
    let bus = Arc::new(BusArbiter::new(
        sim.clone(),
        Duration::from_millis(u64::from(config.bus_timeout_ms)),
    ));
    let sched = Scheduler::new(config, bus, full_registry(), Ports {
        stack: RecordingStack::default(),
        indicators: RecordingIndicators::default(),
        clock: clock.clone(),
        sink: RecordingSink::default(),
    });
    Harness { sched, sim, clock }
}

#[allow(dead_code)]
pub fn harness() -> Harness {
    harness_with(AppConfig::default(), SimI2c::sensortag())
}

/// Booted scheduler with the boot-time enables already applied.
#[allow(dead_code)]
pub fn booted() -> Harness {
    let mut h = harness();
    h.sched.boot().unwrap();
    h.sched.run_cycle();
    h
}
