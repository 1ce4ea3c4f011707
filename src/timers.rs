//! Software timers that raise event flags.
//!
//! ```text
//!   tick context                       scheduler
//!   ────────────                       ─────────
//!   TimerSet::service(now) ──▶ EventFlags |= bit ──▶ wake
//!                                       ▲
//!   one-shot: stops after firing        │ start() re-arms
//!   free-running: re-arms itself        │
//! ```
//!
//! Timers hold only atomics so the tick context and the scheduler can share
//! one `TimerSet` without a lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::config::AppConfig;
use crate::events::{EventFlag, EventHub};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    OneShot,
    FreeRunning,
}

#[derive(Debug)]
pub struct SoftTimer {
    name: &'static str,
    kind: TimerKind,
    period_ms: u64,
    flag: EventFlag,
    active: AtomicBool,
    deadline_ms: AtomicU64,
}

impl SoftTimer {
    pub fn new(name: &'static str, kind: TimerKind, period_ms: u64, flag: EventFlag) -> Self {
        Self {
            name,
            kind,
            period_ms,
            flag,
            active: AtomicBool::new(false),
            deadline_ms: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Arm the timer to expire one period after `now_ms`.
    pub fn start(&self, now_ms: u64) {
        self.deadline_ms
            .store(now_ms.saturating_add(self.period_ms), Ordering::Relaxed);
        self.active.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Fire if due.  Returns whether the flag was raised.
    fn service(&self, now_ms: u64, hub: &EventHub) -> bool {
        if !self.is_active() {
            return false;
        }
        let deadline = self.deadline_ms.load(Ordering::Relaxed);
        if now_ms < deadline {
            return false;
        }

        match self.kind {
            TimerKind::OneShot => self.active.store(false, Ordering::Release),
            TimerKind::FreeRunning => {
                // Skip missed periods instead of firing a burst.
                let mut next = deadline.saturating_add(self.period_ms);
                if next <= now_ms {
                    next = now_ms.saturating_add(self.period_ms);
                }
                self.deadline_ms.store(next, Ordering::Relaxed);
            }
        }
        hub.set_flag(self.flag);
        true
    }
}

/// The two application timers.
pub struct TimerSet {
    periodic: SoftTimer,
    user_periodic: SoftTimer,
    hub: Arc<EventHub>,
}

impl TimerSet {
    pub fn new(config: &AppConfig, hub: Arc<EventHub>) -> Self {
        Self {
            periodic: SoftTimer::new(
                "periodic",
                TimerKind::OneShot,
                u64::from(config.periodic_period_ms),
                EventFlag::Periodic,
            ),
            user_periodic: SoftTimer::new(
                "user-periodic",
                TimerKind::FreeRunning,
                u64::from(config.user_periodic_period_ms),
                EventFlag::UserPeriodic,
            ),
            hub,
        }
    }

    pub fn periodic(&self) -> &SoftTimer {
        &self.periodic
    }

    pub fn user_periodic(&self) -> &SoftTimer {
        &self.user_periodic
    }

    /// Evaluate expiry of every timer.  Call from the tick context.
    pub fn service(&self, now_ms: u64) -> usize {
        [&self.periodic, &self.user_periodic]
            .into_iter()
            .filter(|t| t.service(now_ms, &self.hub))
            .count()
    }
}
