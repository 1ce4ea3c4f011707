//! Cooperative scheduler, the application's single consumer context.
//!
//! [`Scheduler`] owns the link state machine, the sensor registry and the
//! handles to the event hub, timers and bus arbiter.  It blocks in exactly
//! one place, the wake signal; everything else is a bounded walk over what
//! producers left behind.
//!
//! ```text
//!            ┌──────────── wait(wake) ◀────────────┐
//!            ▼                                      │
//!   1 stack message ─▶ 2 drain app queue ─▶ 3 poll drivers
//!                          │  StateChange ─▶ LinkFsm ─▶ LinkEffects
//!                          │  CharChange  ─▶ registry[service]
//!                          │  KeyChange   ─▶ keys driver
//!                          ▼
//!   4 PERIODIC? re-arm, periodic task / advert refresh
//!     else USER_PERIODIC? clear
//!   5 MOTION_WAKE? movement driver
//! ```

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::advert::AdvertPayload;
use crate::bus::{BusArbiter, BusTransport};
use crate::config::AppConfig;
use crate::error::{BusError, Error, Result};
use crate::events::{AppEventKind, AppMessage, EventFlag, EventHub, EventSender, StackMessage};
use crate::fsm::context::{LinkContext, LinkEffects};
use crate::fsm::{ConnectionState, LinkFsm};
use crate::selftest::{SelfTestAggregator, SelfTestBitmap};
use crate::sensors::{DriverCtx, ParamId, SensorRegistry, SensorSnapshot, ServiceId};
use crate::timers::TimerSet;

use super::events::AppEvent;
use super::ports::{Clock, EventSink, IndicatorPort, Led, StackPort};

/// Humidity sensor CONF value written at boot.
const START_HUMIDITY_CONFIG: [u8; 1] = [0x01];
/// Movement CONF written at boot: gyro Y and Z, accelerometer and
/// magnetometer on (gyro X off, no wake-on-motion), 4 g range.
const START_MOVEMENT_CONFIG: [u8; 2] = [0x7E, 0x01];
/// LED1 blinks while advertising.
const ADVERTISING_BLINKS: u8 = 10;

// ───────────────────────────────────────────────────────────────
// Ports bundle
// ───────────────────────────────────────────────────────────────

/// The adapters the scheduler drives.
pub struct Ports<S, I, C, E> {
    pub stack: S,
    pub indicators: I,
    pub clock: C,
    pub sink: E,
}

// ───────────────────────────────────────────────────────────────
// Statistics
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub wakes: u64,
    pub cycles: u64,
    pub stack_messages: u64,
    pub gatt_messages: u64,
    pub app_messages: u64,
    pub unknown_messages: u64,
    pub periodic_tasks: u64,
    pub advert_refreshes: u64,
    pub user_periodic: u64,
    pub motion_wakes: u64,
    pub degraded_reads: u64,
    pub bus_resets: u64,
}

// ───────────────────────────────────────────────────────────────
// Scheduler
// ───────────────────────────────────────────────────────────────

pub struct Scheduler<T: BusTransport, S, I, C, E> {
    config: AppConfig,
    hub: Arc<EventHub>,
    timers: Arc<TimerSet>,
    bus: Arc<BusArbiter<T>>,
    sensors: SensorRegistry<T>,
    fsm: LinkFsm,
    link: LinkContext,
    self_test: SelfTestAggregator,
    ports: Ports<S, I, C, E>,
    stats: SchedulerStats,
    reported_drops: u32,
}

fn driver_ctx<'a, T: BusTransport>(
    bus: &'a BusArbiter<T>,
    stack: &'a mut dyn StackPort,
    indicators: &'a mut dyn IndicatorPort,
    now_ms: u64,
    self_test: SelfTestBitmap,
) -> DriverCtx<'a, T> {
    DriverCtx {
        bus,
        stack,
        indicators,
        now_ms,
        self_test,
    }
}

impl<T, S, I, C, E> Scheduler<T, S, I, C, E>
where
    T: BusTransport,
    S: StackPort,
    I: IndicatorPort,
    C: Clock,
    E: EventSink,
{
    pub fn new(
        config: AppConfig,
        bus: Arc<BusArbiter<T>>,
        sensors: SensorRegistry<T>,
        ports: Ports<S, I, C, E>,
    ) -> Self {
        let hub = Arc::new(EventHub::new());
        let timers = Arc::new(TimerSet::new(&config, hub.clone()));
        Self {
            config,
            hub,
            timers,
            bus,
            sensors,
            fsm: LinkFsm::default(),
            link: LinkContext::default(),
            self_test: SelfTestAggregator::new(),
            ports,
            stats: SchedulerStats::default(),
            reported_drops: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Open the bus, self-test, initialise drivers, start the user timer
    /// and queue the initial sensor enables.
    pub fn boot(&mut self) -> Result<SelfTestBitmap> {
        self.bus.open().map_err(|e| {
            error!("Boot: bus unavailable ({e})");
            Error::Init("bus open")
        })?;

        let mask = self.config.self_test_mask();
        let result = self.self_test.run(mask, &mut self.sensors, &self.bus);
        let led = if result == mask { Led::Led2 } else { Led::Led1 };
        self.ports.indicators.blink(
            led,
            self.config.test_indication_blinks,
            self.config.blink_duration_ms,
        );

        let now = self.ports.clock.now_ms();
        let mut ctx = driver_ctx(
            &self.bus,
            &mut self.ports.stack,
            &mut self.ports.indicators,
            now,
            result,
        );
        let up = self.sensors.init_all(&mut ctx);
        info!("Boot: {}/{} drivers up, self-test {}", up, self.sensors.len(), result);

        self.timers.user_periodic().start(now);

        self.ports.stack.set_characteristic_value(
            ServiceId::Humidity,
            ParamId::Config,
            &START_HUMIDITY_CONFIG,
        );
        self.hub.enqueue(
            AppEventKind::CharChange,
            ServiceId::Humidity.code(),
            ParamId::Config.code(),
        );
        self.ports.stack.set_characteristic_value(
            ServiceId::Movement,
            ParamId::Config,
            &START_MOVEMENT_CONFIG,
        );
        self.hub.enqueue(
            AppEventKind::CharChange,
            ServiceId::Movement.code(),
            ParamId::Config.code(),
        );

        self.ports.sink.emit(&AppEvent::Booted { self_test: result });
        Ok(result)
    }

    /// Serve events forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.run_once();
        }
    }

    /// Block for one wake, then run one cycle.
    pub fn run_once(&mut self) {
        self.hub.wait();
        self.stats.wakes += 1;
        self.run_cycle();
    }

    /// One full cycle without blocking.
    pub fn run_cycle(&mut self) {
        self.stats.cycles += 1;
        let now = self.ports.clock.now_ms();

        if let Some(msg) = self.hub.next_stack_message() {
            self.handle_stack_message(msg);
        }

        while let Some(msg) = self.hub.next_message() {
            self.handle_app_message(msg, now);
        }
        self.report_drops();

        self.poll_drivers(now);

        if self.hub.take_flag(EventFlag::Periodic) {
            self.on_periodic(now);
        } else if self.hub.take_flag(EventFlag::UserPeriodic) {
            self.stats.user_periodic += 1;
        }

        if self.hub.take_flag(EventFlag::MotionWake) {
            self.stats.motion_wakes += 1;
            self.interrupt_driver(ServiceId::Movement, 0, now);
        }

        // Work left for a later cycle must not wait for an unrelated wake.
        if self.hub.flags().bits() != 0 || self.hub.has_stack_messages() {
            self.hub.wake();
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.fsm.current()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn self_test_result(&self) -> SelfTestBitmap {
        self.self_test.last_result()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn sender(&self) -> EventSender {
        EventSender::new(self.hub.clone())
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    pub fn timers(&self) -> Arc<TimerSet> {
        self.timers.clone()
    }

    pub fn bus(&self) -> &Arc<BusArbiter<T>> {
        &self.bus
    }

    pub fn sensors(&self) -> &SensorRegistry<T> {
        &self.sensors
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        self.sensors.snapshot()
    }

    pub fn ports(&self) -> &Ports<S, I, C, E> {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut Ports<S, I, C, E> {
        &mut self.ports
    }

    // ── Stack / queue handling ────────────────────────────────

    fn handle_stack_message(&mut self, msg: StackMessage) {
        self.stats.stack_messages += 1;
        match msg {
            StackMessage::Gatt {
                conn_handle,
                method,
            } => {
                self.stats.gatt_messages += 1;
                debug!("Stack: GATT 0x{method:02X} on conn {conn_handle} released");
            }
            StackMessage::Other {
                service_class,
                event,
            } => {
                debug!("Stack: discarded class {service_class} event {event}");
            }
        }
    }

    fn handle_app_message(&mut self, msg: AppMessage, now: u64) {
        self.stats.app_messages += 1;
        match msg.event() {
            AppEventKind::StateChange => match ConnectionState::from_code(msg.service_id()) {
                Some(state) => self.on_state_change(state, now),
                None => {
                    warn!("Events: unknown connection state {}", msg.service_id());
                    self.stats.unknown_messages += 1;
                }
            },
            AppEventKind::CharChange => {
                match (
                    ServiceId::from_code(msg.service_id()),
                    ParamId::from_code(msg.param_id()),
                ) {
                    (Some(service), Some(param)) => self.char_change(service, param, now),
                    _ => {
                        warn!(
                            "Events: write to unknown characteristic {}/{}",
                            msg.service_id(),
                            msg.param_id()
                        );
                        self.stats.unknown_messages += 1;
                    }
                }
            }
            AppEventKind::KeyChange => {
                self.interrupt_driver(ServiceId::Keys, msg.param_id(), now);
                if self.fsm.current() == ConnectionState::Advertising {
                    self.refresh_advert(None);
                }
            }
        }
    }

    fn char_change(&mut self, service: ServiceId, param: ParamId, now: u64) {
        let mut ctx = driver_ctx(
            &self.bus,
            &mut self.ports.stack,
            &mut self.ports.indicators,
            now,
            self.self_test.last_result(),
        );
        let Some(driver) = self.sensors.get_mut(service) else {
            debug!("Events: no driver for {service:?}");
            return;
        };
        if let Err(e) = driver.process_char_change(param, &mut ctx) {
            self.degraded(service, e);
        }
    }

    fn interrupt_driver(&mut self, service: ServiceId, payload: u8, now: u64) {
        let mut ctx = driver_ctx(
            &self.bus,
            &mut self.ports.stack,
            &mut self.ports.indicators,
            now,
            self.self_test.last_result(),
        );
        let Some(driver) = self.sensors.get_mut(service) else {
            return;
        };
        if let Err(e) = driver.on_interrupt(payload, &mut ctx) {
            self.degraded(service, e);
        }
    }

    fn poll_drivers(&mut self, now: u64) {
        let mut failures: heapless::Vec<(ServiceId, BusError), { ServiceId::COUNT }> =
            heapless::Vec::new();
        let mut ctx = driver_ctx(
            &self.bus,
            &mut self.ports.stack,
            &mut self.ports.indicators,
            now,
            self.self_test.last_result(),
        );
        for driver in self.sensors.iter_mut() {
            if let Err(e) = driver.process_event(&mut ctx) {
                let _ = failures.push((driver.service(), e));
            }
        }
        for (service, e) in failures {
            self.degraded(service, e);
        }
    }

    fn degraded(&mut self, service: ServiceId, error: BusError) {
        self.stats.degraded_reads += 1;
        self.ports
            .sink
            .emit(&AppEvent::SensorDegraded { service, error });
        if matches!(error, BusError::Transfer(_)) {
            self.recover_bus();
        }
    }

    /// Cycle the transport after a failed transfer so a wedged controller
    /// does not poison every later read.
    fn recover_bus(&mut self) {
        self.stats.bus_resets += 1;
        match self.bus.reset() {
            Ok(()) => info!("Bus: transport reset after transfer error"),
            Err(e) => warn!("Bus: reset failed ({e}), next acquire reopens"),
        }
    }

    fn report_drops(&mut self) {
        let dropped = self.hub.dropped();
        if dropped != self.reported_drops {
            let lost = dropped.wrapping_sub(self.reported_drops);
            warn!("Events: {lost} message(s) dropped on a full queue");
            self.ports.sink.emit(&AppEvent::EventsDropped(lost));
            self.reported_drops = dropped;
        }
    }

    // ── Link state ────────────────────────────────────────────

    fn on_state_change(&mut self, state: ConnectionState, now: u64) {
        let from = self.fsm.current();
        self.link.public_address = self.ports.stack.public_address();
        self.fsm.notify(state, &mut self.link);
        let effects = self.link.take_effects();
        self.apply_link_effects(&effects, now);
        self.ports
            .sink
            .emit(&AppEvent::LinkStateChanged { from, to: state });
    }

    fn apply_link_effects(&mut self, fx: &LinkEffects, now: u64) {
        if let Some(id) = fx.system_id {
            self.ports.stack.set_system_id(id);
        }
        if let Some(status) = fx.status {
            self.ports.stack.report_status(status);
        }
        if fx.arm_periodic && !self.timers.periodic().is_active() {
            self.timers.periodic().start(now);
        }
        if fx.refresh_advert {
            self.refresh_advert(Some(0));
        }
        if fx.indicators_off {
            self.ports.indicators.all_off();
        }
        if fx.enable_advertising {
            self.ports.stack.set_advertising_enabled(true);
        }
        if fx.reset_sensors {
            let mut ctx = driver_ctx(
                &self.bus,
                &mut self.ports.stack,
                &mut self.ports.indicators,
                now,
                self.self_test.last_result(),
            );
            self.sensors.reset_all(&mut ctx);
        }
        if fx.error_indicator {
            self.ports.indicators.set_led(Led::Led1, true);
        }
    }

    // ── Timers ────────────────────────────────────────────────

    fn on_periodic(&mut self, now: u64) {
        let state = self.fsm.current();
        if matches!(
            state,
            ConnectionState::Connected | ConnectionState::Advertising
        ) {
            self.timers.periodic().start(now);
        }

        match state {
            ConnectionState::Connected => {
                self.stats.periodic_tasks += 1;
                let snapshot = self.sensors.snapshot();
                self.ports.sink.emit(&AppEvent::Telemetry(snapshot));
            }
            ConnectionState::Advertising => {
                let blink = self.config.blink_duration_ms;
                self.ports.indicators.blink(Led::Led2, 1, blink);
                self.ports
                    .indicators
                    .blink(Led::Led1, ADVERTISING_BLINKS, blink);
                self.refresh_advert(None);
            }
            _ => {}
        }
    }

    /// Rebuild the advertising payload from the current snapshot, optionally
    /// overriding the key state.
    fn refresh_advert(&mut self, key_state: Option<u8>) {
        let mut payload = AdvertPayload::build(&self.sensors.snapshot());
        if let Some(keys) = key_state {
            payload = payload.with_key_state(keys);
        }
        self.ports.stack.set_advertising_payload(payload.as_bytes());
        self.stats.advert_refreshes += 1;
        self.ports.sink.emit(&AppEvent::AdvertisingRefreshed {
            key_state: payload.key_state(),
        });
    }
}
