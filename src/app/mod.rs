//! Application core.
//!
//! The [`scheduler`] drives everything else: it drains the event hub,
//! steps the link state machine and dispatches work to sensor drivers.
//! All interaction with the radio stack, indicators, time and telemetry
//! happens through the **port traits** in [`ports`], so the core runs
//! unchanged against the host simulator or a test harness.

pub mod events;
pub mod ports;
pub mod scheduler;
