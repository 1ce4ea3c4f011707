//! Interrupt-driven event system.
//!
//! Events are produced by:
//! - Stack callbacks (connection state changes, characteristic writes)
//! - GPIO interrupts (keys, relay, wake-on-motion)
//! - Timer expiry (periodic and user periodic flags)
//!
//! and consumed by exactly one context, the scheduler.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐
//! │ Stack cb    │────▶│  App queue   │──┐
//! │ GPIO ISR    │────▶│  (FIFO, 16)  │  │    ┌─────────────┐
//! └─────────────┘     └──────────────┘  ├──▶ │ WakeSignal  │──▶ Scheduler
//! ┌─────────────┐     ┌──────────────┐  │    └─────────────┘
//! │ Timer tick  │────▶│  EventFlags  │──┤
//! └─────────────┘     └──────────────┘  │
//! ┌─────────────┐     ┌──────────────┐  │
//! │ Stack task  │────▶│  StackInbox  │──┘
//! └─────────────┘     └──────────────┘
//! ```
//!
//! Producers never block: a full queue drops the message and bumps a
//! counter the scheduler reports.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use crate::config::EVENT_QUEUE_DEPTH;
use crate::fsm::ConnectionState;

/// Capacity of the raw stack message inbox.
pub const STACK_INBOX_DEPTH: usize = 4;

// ═══════════════════════════════════════════════════════════════════════════
//  Application messages
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AppEventKind {
    /// `service_id` carries the connection state code.
    StateChange = 0x01,
    /// `service_id`/`param_id` name the written characteristic.
    CharChange = 0x02,
    /// `param_id` carries the key bitmap.
    KeyChange = 0x04,
}

/// One queued application message.  Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppMessage {
    event: AppEventKind,
    service_id: u8,
    param_id: u8,
}

impl AppMessage {
    pub const fn new(event: AppEventKind, service_id: u8, param_id: u8) -> Self {
        Self {
            event,
            service_id,
            param_id,
        }
    }

    pub fn event(&self) -> AppEventKind {
        self.event
    }

    pub fn service_id(&self) -> u8 {
        self.service_id
    }

    pub fn param_id(&self) -> u8 {
        self.param_id
    }
}

/// Raw message from the protocol stack task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackMessage {
    /// GATT server message; released after inspection.
    Gatt { conn_handle: u16, method: u8 },
    /// Any other stack service class; discarded unread.
    Other { service_class: u8, event: u8 },
}

// ═══════════════════════════════════════════════════════════════════════════
//  Event flags
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EventFlag {
    Periodic = 0x0004,
    UserPeriodic = 0x0010,
    MotionWake = 0x0020,
}

impl EventFlag {
    pub const fn mask(self) -> u16 {
        self as u16
    }
}

/// Bitset set from interrupt context and cleared by the scheduler.
#[derive(Debug, Default)]
pub struct EventFlags(AtomicU16);

impl EventFlags {
    pub const fn new() -> Self {
        Self(AtomicU16::new(0))
    }

    pub fn set(&self, flag: EventFlag) {
        self.0.fetch_or(flag.mask(), Ordering::Release);
    }

    /// Clear `flag`, returning whether it was set.
    pub fn take(&self, flag: EventFlag) -> bool {
        self.0.fetch_and(!flag.mask(), Ordering::AcqRel) & flag.mask() != 0
    }

    pub fn is_set(&self, flag: EventFlag) -> bool {
        self.0.load(Ordering::Acquire) & flag.mask() != 0
    }

    pub fn bits(&self) -> u16 {
        self.0.load(Ordering::Acquire)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Wake signal
// ═══════════════════════════════════════════════════════════════════════════

/// Binary wake-up signal for the scheduler.  Repeated signals before the
/// scheduler runs collapse into one wake.
pub struct WakeSignal(Signal<CriticalSectionRawMutex, ()>);

impl WakeSignal {
    pub const fn new() -> Self {
        Self(Signal::new())
    }

    pub fn wake(&self) {
        self.0.signal(());
    }

    /// Block the calling context until woken.
    pub fn wait(&self) {
        futures_lite::future::block_on(self.0.wait());
    }

    pub fn is_pending(&self) -> bool {
        self.0.signaled()
    }
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Event hub
// ═══════════════════════════════════════════════════════════════════════════

/// Every producer-facing queue plus the shared wake signal.
pub struct EventHub {
    queue: Channel<CriticalSectionRawMutex, AppMessage, EVENT_QUEUE_DEPTH>,
    stack: Channel<CriticalSectionRawMutex, StackMessage, STACK_INBOX_DEPTH>,
    flags: EventFlags,
    wake: WakeSignal,
    dropped: AtomicU32,
}

impl EventHub {
    pub const fn new() -> Self {
        Self {
            queue: Channel::new(),
            stack: Channel::new(),
            flags: EventFlags::new(),
            wake: WakeSignal::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Append a message and wake the scheduler.  Never blocks; returns
    /// `false` when the queue is full and the message was dropped.
    pub fn enqueue(&self, event: AppEventKind, service_id: u8, param_id: u8) -> bool {
        let msg = AppMessage::new(event, service_id, param_id);
        if self.queue.try_send(msg).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.wake.wake();
        true
    }

    pub fn post_stack_message(&self, msg: StackMessage) -> bool {
        if self.stack.try_send(msg).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.wake.wake();
        true
    }

    pub fn set_flag(&self, flag: EventFlag) {
        self.flags.set(flag);
        self.wake.wake();
    }

    pub fn take_flag(&self, flag: EventFlag) -> bool {
        self.flags.take(flag)
    }

    pub fn flags(&self) -> &EventFlags {
        &self.flags
    }

    /// Block until any producer signals.
    pub fn wait(&self) {
        self.wake.wait();
    }

    pub fn wake_pending(&self) -> bool {
        self.wake.is_pending()
    }

    /// Signal the scheduler without posting anything.
    pub fn wake(&self) {
        self.wake.wake();
    }

    pub fn next_stack_message(&self) -> Option<StackMessage> {
        self.stack.try_receive().ok()
    }

    pub fn has_stack_messages(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn next_message(&self) -> Option<AppMessage> {
        self.queue.try_receive().ok()
    }

    /// Yield every queued message in arrival order.
    pub fn drain(&self) -> impl Iterator<Item = AppMessage> + '_ {
        core::iter::from_fn(|| self.next_message())
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Total messages dropped on a full queue or inbox.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Producer handle
// ═══════════════════════════════════════════════════════════════════════════

/// Cloneable producer handle held by stack callbacks and GPIO handlers.
#[derive(Clone)]
pub struct EventSender {
    hub: Arc<EventHub>,
}

impl EventSender {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self { hub }
    }

    pub fn enqueue(&self, event: AppEventKind, service_id: u8, param_id: u8) -> bool {
        self.hub.enqueue(event, service_id, param_id)
    }

    /// Stack callback: the peripheral role changed state.
    pub fn state_changed(&self, state: ConnectionState) -> bool {
        self.enqueue(AppEventKind::StateChange, state.code(), 0)
    }

    /// Stack callback: a client wrote a characteristic.
    pub fn characteristic_written(&self, service_id: u8, param_id: u8) -> bool {
        self.enqueue(AppEventKind::CharChange, service_id, param_id)
    }

    pub fn keys_changed(&self, keys: u8) -> bool {
        self.enqueue(AppEventKind::KeyChange, 0, keys)
    }

    pub fn post_stack_message(&self, msg: StackMessage) -> bool {
        self.hub.post_stack_message(msg)
    }

    pub fn set_flag(&self, flag: EventFlag) {
        self.hub.set_flag(flag);
    }
}
