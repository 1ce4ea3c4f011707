//! Function-pointer state machine for the peripheral link.
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │  StateTable                                        │
//! │  ┌──────────────────────┬──────────────────────┐   │
//! │  │ ConnectionState      │ on_enter             │   │
//! │  ├──────────────────────┼──────────────────────┤   │
//! │  │ Init                 │ -                    │   │
//! │  │ Started              │ fn(ctx)              │   │
//! │  │ Advertising          │ fn(ctx)              │   │
//! │  │ Connected            │ fn(ctx)              │   │
//! │  │ ConnectedAdvertising │ -                    │   │
//! │  │ Waiting              │ fn(ctx)              │   │
//! │  │ WaitingAfterTimeout  │ fn(ctx)              │   │
//! │  │ Error                │ fn(ctx)              │   │
//! │  └──────────────────────┴──────────────────────┘   │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! Unlike a ticked machine, this one never decides its own transitions:
//! the stack reports the new state and [`LinkFsm::notify`] runs that
//! state's `on_enter`.  Handlers only write requests into
//! [`LinkContext::effects`]; the scheduler applies them through its ports.

pub mod context;
pub mod states;

use context::LinkContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Peripheral role state, numbered as the stack reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Init = 0,
    Started = 1,
    Advertising = 2,
    Connected = 3,
    ConnectedAdvertising = 4,
    Waiting = 5,
    WaitingAfterTimeout = 6,
    Error = 7,
}

impl ConnectionState {
    pub const COUNT: usize = 8;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Init,
        Self::Started,
        Self::Advertising,
        Self::Connected,
        Self::ConnectedAdvertising,
        Self::Waiting,
        Self::WaitingAfterTimeout,
        Self::Error,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }
}

// ---------------------------------------------------------------------------
// Table types
// ---------------------------------------------------------------------------

/// Signature for `on_enter` actions.
pub type StateActionFn = fn(&mut LinkContext);

/// One row of the state table.
pub struct StateDescriptor {
    pub id: ConnectionState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct LinkFsm {
    table: [StateDescriptor; ConnectionState::COUNT],
    current: usize,
    transitions: u32,
}

impl LinkFsm {
    pub fn new(table: [StateDescriptor; ConnectionState::COUNT]) -> Self {
        debug_assert!(
            table.iter().enumerate().all(|(i, d)| d.id as usize == i),
            "state table out of order"
        );
        Self {
            table,
            current: ConnectionState::Init as usize,
            transitions: 0,
        }
    }

    /// Apply a stack-reported state and run its entry action.
    pub fn notify(&mut self, next: ConnectionState, ctx: &mut LinkContext) {
        let next_idx = next as usize;
        info!(
            "Link: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );
        self.current = next_idx;
        self.transitions = self.transitions.wrapping_add(1);

        if let Some(enter) = self.table[next_idx].on_enter {
            enter(ctx);
        }
    }

    pub fn current(&self) -> ConnectionState {
        self.table[self.current].id
    }

    pub fn current_name(&self) -> &'static str {
        self.table[self.current].name
    }

    /// Number of notifications handled since boot.
    pub fn transitions(&self) -> u32 {
        self.transitions
    }
}

impl Default for LinkFsm {
    fn default() -> Self {
        Self::new(states::build_state_table())
    }
}
