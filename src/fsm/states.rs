//! Entry actions and table builder for the link state machine.
//!
//! ```text
//!  Init ──▶ Started ──▶ Advertising ◀──▶ Connected ◀──▶ ConnectedAdvertising
//!                           │                │
//!                           ▼                ▼
//!                   Waiting / WaitingAfterTimeout
//!
//!  any ──▶ Error (sensors reset, LED1 latched on)
//! ```
//!
//! Transitions are the stack's business; these handlers only request side
//! effects.

use super::context::{LinkContext, system_id_from_address};
use super::{ConnectionState, StateDescriptor};
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table() -> [StateDescriptor; ConnectionState::COUNT] {
    [
        StateDescriptor {
            id: ConnectionState::Init,
            name: "Init",
            on_enter: None,
        },
        StateDescriptor {
            id: ConnectionState::Started,
            name: "Started",
            on_enter: Some(started_enter),
        },
        StateDescriptor {
            id: ConnectionState::Advertising,
            name: "Advertising",
            on_enter: Some(advertising_enter),
        },
        StateDescriptor {
            id: ConnectionState::Connected,
            name: "Connected",
            on_enter: Some(connected_enter),
        },
        StateDescriptor {
            id: ConnectionState::ConnectedAdvertising,
            name: "ConnectedAdvertising",
            on_enter: None,
        },
        StateDescriptor {
            id: ConnectionState::Waiting,
            name: "Waiting",
            on_enter: Some(waiting_enter),
        },
        StateDescriptor {
            id: ConnectionState::WaitingAfterTimeout,
            name: "WaitingAfterTimeout",
            on_enter: Some(waiting_enter),
        },
        StateDescriptor {
            id: ConnectionState::Error,
            name: "Error",
            on_enter: Some(error_enter),
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Entry actions
// ═══════════════════════════════════════════════════════════════════════════

fn started_enter(ctx: &mut LinkContext) {
    ctx.effects.system_id = Some(system_id_from_address(&ctx.public_address));
    ctx.effects.status = Some("Initialized");
}

fn advertising_enter(ctx: &mut LinkContext) {
    ctx.effects.arm_periodic = true;
    ctx.effects.refresh_advert = true;
}

fn connected_enter(ctx: &mut LinkContext) {
    ctx.effects.arm_periodic = true;
    ctx.effects.indicators_off = true;

    // Reconnection windows are opened once per boot.
    if !ctx.reconnect_enabled {
        ctx.reconnect_enabled = true;
        ctx.effects.enable_advertising = true;
        info!("Link: advertising enabled while connected");
    }
}

fn waiting_enter(ctx: &mut LinkContext) {
    ctx.effects.reset_sensors = true;
}

fn error_enter(ctx: &mut LinkContext) {
    warn!("Link: stack reported error");
    ctx.effects.reset_sensors = true;
    ctx.effects.error_indicator = true;
}
