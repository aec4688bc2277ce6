//! CEC-to-IR translation tables.
//!
//! `KEY_ACTIONS` maps remote keys to IR codes and send styles;
//! `COMMAND_RULES` maps CEC opcodes (plus an operand check) to amplifier
//! intents. Anything absent from both tables is ignored by the dispatcher.

use crate::cec::{Opcode, UserControl, POWER_STATUS_STANDBY};
use crate::ir::Directive;

// IR code names in the amplifier's lircd remote profile.
pub const VOLUME_UP: &str = "KEY_VOLUMEUP";
pub const VOLUME_DOWN: &str = "KEY_VOLUMEDOWN";
pub const MUTE: &str = "KEY_MUTE";
pub const POWER_ON: &str = "KEY_POWER";
pub const POWER_OFF: &str = "KEY_POWER2";

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// How a remote key is replayed as IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// One `SEND_ONCE` when the key is released.
    Fire(&'static str),
    /// `SEND_START` on press, `SEND_STOP` on release.
    StartStop(&'static str),
}

impl Action {
    /// The IR directive for a press (`released == false`) or release, if any.
    pub fn directive(self, released: bool) -> Option<(Directive, &'static str)> {
        match (self, released) {
            (Action::StartStop(code), false) => Some((Directive::Start, code)),
            (Action::StartStop(code), true) => Some((Directive::Stop, code)),
            (Action::Fire(code), true) => Some((Directive::Once, code)),
            // Firing on press would repeat while the key is held.
            (Action::Fire(_), false) => None,
        }
    }
}

pub static KEY_ACTIONS: &[(UserControl, Action)] = &[
    (UserControl::VolumeUp, Action::StartStop(VOLUME_UP)),
    (UserControl::VolumeDown, Action::StartStop(VOLUME_DOWN)),
    (UserControl::Mute, Action::Fire(MUTE)),
];

pub fn key_action(code: u8) -> Option<Action> {
    let key = UserControl::from_u8(code)?;
    KEY_ACTIONS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|&(_, action)| action)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    AmplifierOff,
    AmplifierOn,
    /// Recognised, deliberately left alone.
    Ignore,
}

pub struct CommandRule {
    pub opcode: Opcode,
    /// Operand check; the rule applies only when it returns `true`.
    pub applies: fn(&[u8]) -> bool,
    pub intent: Intent,
}

fn always(_: &[u8]) -> bool {
    true
}

fn reports_standby(params: &[u8]) -> bool {
    params.first() == Some(&POWER_STATUS_STANDBY)
}

pub static COMMAND_RULES: &[CommandRule] = &[
    CommandRule { opcode: Opcode::Standby, applies: always, intent: Intent::AmplifierOff },
    CommandRule {
        opcode: Opcode::ReportPowerStatus,
        applies: reports_standby,
        intent: Intent::AmplifierOff,
    },
    // Powers on even without the physical-address operand, which CEC reads as
    // a request to leave system audio mode.
    CommandRule {
        opcode: Opcode::SystemAudioModeRequest,
        applies: always,
        intent: Intent::AmplifierOn,
    },
    CommandRule { opcode: Opcode::ActiveSource, applies: always, intent: Intent::Ignore },
    CommandRule { opcode: Opcode::RoutingChange, applies: always, intent: Intent::Ignore },
    CommandRule { opcode: Opcode::VendorCommand, applies: always, intent: Intent::Ignore },
    CommandRule {
        opcode: Opcode::RequestShortAudioDescriptor,
        applies: always,
        intent: Intent::Ignore,
    },
];

/// The intent of a received command, or `None` when no rule applies.
pub fn command_intent(opcode: u8, params: &[u8]) -> Option<Intent> {
    let opcode = Opcode::from_u8(opcode)?;
    COMMAND_RULES
        .iter()
        .find(|rule| rule.opcode == opcode && (rule.applies)(params))
        .map(|rule| rule.intent)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_key_appears_once() {
        for (i, (key, _)) in KEY_ACTIONS.iter().enumerate() {
            assert!(!KEY_ACTIONS[..i].iter().any(|(k, _)| k == key), "{key:?} listed twice");
        }
    }

    #[test]
    fn power_key_has_no_action() {
        assert_eq!(key_action(0x40), None);
    }

    #[test]
    fn volume_keys_start_and_stop() {
        let action = key_action(0x42).unwrap();
        assert_eq!(action.directive(false), Some((Directive::Start, VOLUME_DOWN)));
        assert_eq!(action.directive(true), Some((Directive::Stop, VOLUME_DOWN)));
    }

    #[test]
    fn mute_fires_on_release_only() {
        let action = key_action(0x43).unwrap();
        assert_eq!(action.directive(false), None);
        assert_eq!(action.directive(true), Some((Directive::Once, MUTE)));
    }

    #[test]
    fn report_power_status_needs_standby_operand() {
        assert_eq!(command_intent(0x90, &[0x01]), Some(Intent::AmplifierOff));
        assert_eq!(command_intent(0x90, &[0x00]), None);
        assert_eq!(command_intent(0x90, &[]), None);
    }

    #[test]
    fn placeholder_opcodes_are_ignored_explicitly() {
        for opcode in [0x82, 0x80, 0x89, 0xA4] {
            assert_eq!(command_intent(opcode, &[]), Some(Intent::Ignore));
        }
    }

    #[test]
    fn audio_mode_request_powers_on_regardless_of_operand() {
        assert_eq!(command_intent(0x70, &[]), Some(Intent::AmplifierOn));
        assert_eq!(command_intent(0x70, &[0x30, 0x00]), Some(Intent::AmplifierOn));
    }

    #[test]
    fn standby_and_audio_mode_request() {
        assert_eq!(command_intent(0x36, &[]), Some(Intent::AmplifierOff));
        assert_eq!(command_intent(0x70, &[0x10, 0x00]), Some(Intent::AmplifierOn));
    }
}
