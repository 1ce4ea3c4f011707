//! SensorTag application core.
//!
//! Event-driven firmware logic for a multi-sensor BLE peripheral:
//! a single cooperative scheduler consumes messages produced by the
//! protocol stack, GPIO edges and software timers; sensor drivers share a
//! two-bus I2C arbiter; the connection state machine drives advertising.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │   SimI2c        SimStack      SimIndicators   SystemClock    │
//! │   (BusTransport)(StackPort)   (IndicatorPort) (Clock)        │
//! │                                LogEventSink (EventSink)      │
//! │  ──────────────── Port Trait Boundary ───────────────────    │
//! │   GpioDispatcher ─┐                                          │
//! │   TimerSet ───────┼─▶ EventHub ─▶ Scheduler ─▶ LinkFsm       │
//! │   EventSender ────┘                  │                       │
//! │                                      ▼                       │
//! │                 SensorRegistry ─▶ BusArbiter                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

pub mod adapters;
pub mod advert;
pub mod app;
pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod fsm;
pub mod gpio;
pub mod selftest;
pub mod sensors;
pub mod timers;

pub use error::{BusError, ConfigError, Error, Result};
