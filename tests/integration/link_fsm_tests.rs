//! Link state machine walked through a full connection lifecycle.

use sensortag::fsm::context::{LinkContext, LinkEffects, system_id_from_address};
use sensortag::fsm::states::build_state_table;
use sensortag::fsm::{ConnectionState, LinkFsm};

const ADDR: [u8; 6] = [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5];

struct Walk {
    fsm: LinkFsm,
    ctx: LinkContext,
}

impl Walk {
    fn new() -> Self {
        Self {
            fsm: LinkFsm::new(build_state_table()),
            ctx: LinkContext::new(ADDR),
        }
    }

    fn go(&mut self, state: ConnectionState) -> LinkEffects {
        self.fsm.notify(state, &mut self.ctx);
        assert_eq!(self.fsm.current(), state);
        self.ctx.take_effects()
    }
}

#[test]
fn lifecycle_requests_expected_effects() {
    let mut w = Walk::new();
    assert_eq!(w.fsm.current(), ConnectionState::Init);

    let fx = w.go(ConnectionState::Started);
    assert_eq!(fx.system_id, Some(system_id_from_address(&ADDR)));
    assert_eq!(fx.status, Some("Initialized"));

    let fx = w.go(ConnectionState::Advertising);
    assert!(fx.arm_periodic && fx.refresh_advert);
    assert!(!fx.reset_sensors);

    let fx = w.go(ConnectionState::Connected);
    assert!(fx.arm_periodic && fx.indicators_off && fx.enable_advertising);

    assert!(w.go(ConnectionState::ConnectedAdvertising).is_empty());

    let fx = w.go(ConnectionState::WaitingAfterTimeout);
    assert_eq!(fx, LinkEffects {
        reset_sensors: true,
        ..LinkEffects::default()
    });

    let fx = w.go(ConnectionState::Waiting);
    assert!(fx.reset_sensors && !fx.error_indicator);

    let fx = w.go(ConnectionState::Error);
    assert!(fx.reset_sensors && fx.error_indicator);

    assert!(w.go(ConnectionState::Init).is_empty());
    assert_eq!(w.fsm.transitions(), 8);
}

#[test]
fn reconnection_latch_fires_once_per_boot() {
    let mut w = Walk::new();
    let enabled: Vec<bool> = (0..3)
        .map(|_| {
            w.go(ConnectionState::Advertising);
            w.go(ConnectionState::Connected).enable_advertising
        })
        .collect();
    assert_eq!(enabled, vec![true, false, false]);
    assert!(w.ctx.reconnect_enabled);
}

#[test]
fn reentering_a_state_reruns_its_action() {
    let mut w = Walk::new();
    assert!(w.go(ConnectionState::Advertising).refresh_advert);
    assert!(w.go(ConnectionState::Advertising).refresh_advert);
    assert_eq!(w.fsm.current_name(), "Advertising");
}

#[test]
fn every_state_has_a_named_row() {
    let mut w = Walk::new();
    for state in ConnectionState::ALL {
        w.go(state);
        assert!(!w.fsm.current_name().is_empty());
        assert_eq!(ConnectionState::from_code(state.code()), Some(state));
    }
    assert_eq!(ConnectionState::from_code(8), None);
}
