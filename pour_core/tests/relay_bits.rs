use std::time::Duration;

use pour_core::mocks::{MockBus, MockHandle};
use pour_core::{ALL_OFF, PourError, RelayDriver, SharedBus};
use pour_traits::DeviceMap;
use proptest::prelude::*;
use rstest::rstest;

fn relay_on(mock: MockBus) -> (RelayDriver, MockHandle) {
    let dev = mock.handle();
    let bus = SharedBus::new(Box::new(mock), DeviceMap::default(), Duration::from_millis(50));
    (RelayDriver::new(bus), dev)
}

proptest! {
    #[test]
    fn set_pump_preserves_every_other_bit(
        initial in any::<u8>(),
        ops in prop::collection::vec((1u8..=8, any::<bool>()), 1..40),
    ) {
        let (relay, dev) = relay_on(MockBus::new());
        dev.poke_relay(initial);
        for (pump, on) in ops {
            let before = dev.relay_register();
            let written = relay.set_pump(pump, on).unwrap();
            let bit = 1u8 << (pump - 1);
            prop_assert_eq!(written & !bit, before & !bit);
            prop_assert_eq!(written & bit == 0, on);
            prop_assert_eq!(dev.relay_register(), written);
        }
    }
}

#[rstest]
fn setting_a_running_pump_again_writes_the_same_value() {
    let (relay, dev) = relay_on(MockBus::new());
    relay.set_pump(2, true).unwrap();
    relay.set_pump(2, true).unwrap();
    assert_eq!(dev.relay_writes(), vec![0xFD, 0xFD]);
}

#[rstest]
fn unreadable_register_falls_back_to_last_known() {
    let (relay, dev) = relay_on(MockBus::new());
    relay.set_pump(1, true).unwrap();
    dev.set_relay_read_fails(true);
    // Someone else scribbled on the board; the driver cannot see it.
    dev.poke_relay(0x00);
    let written = relay.set_pump(3, true).unwrap();
    assert_eq!(written, 0xFA);
    assert_eq!(relay.last_known(), 0xFA);
}

#[rstest]
fn all_off_does_not_need_a_readable_register() {
    let (relay, dev) = relay_on(MockBus::new());
    dev.poke_relay(0x00);
    dev.set_relay_read_fails(true);
    relay.all_off().unwrap();
    assert_eq!(dev.relay_register(), ALL_OFF);
}

#[rstest]
fn read_state_reports_unreadable_as_none() {
    let (relay, dev) = relay_on(MockBus::new());
    assert_eq!(relay.read_state(), Some(ALL_OFF));
    dev.set_relay_offline(true);
    assert_eq!(relay.read_state(), None);
}

#[rstest]
#[case(0)]
#[case(9)]
fn invalid_pump_touches_nothing(#[case] pump: u8) {
    let (relay, dev) = relay_on(MockBus::new());
    assert_eq!(relay.set_pump(pump, true), Err(PourError::InvalidPump(pump)));
    assert!(dev.relay_writes().is_empty());
}
