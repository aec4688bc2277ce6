//! CEC wire-code conversions.
//!
//! Maps raw CEC bytes (opcodes from the second byte of a frame, UI command
//! codes from the operand of `<User Control Pressed>`) to the typed enums used
//! by the dispatcher. Only the codes this bridge reacts to, or reports on, have
//! variants; everything else converts to `None` and is dropped by the caller.

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

/// CEC opcodes recognised by the bridge (HDMI-CEC 1.4, table 8 onwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Standby,
    RoutingChange,
    ActiveSource,
    UserControlPressed,
    UserControlReleased,
    SystemAudioModeRequest,
    SetSystemAudioMode,
    VendorCommand,
    ReportPowerStatus,
    RequestShortAudioDescriptor,
}

impl Opcode {
    /// Returns the opcode for a raw frame byte, or `None` for opcodes the
    /// bridge does not know.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x36 => Some(Opcode::Standby),
            0x80 => Some(Opcode::RoutingChange),
            0x82 => Some(Opcode::ActiveSource),
            0x44 => Some(Opcode::UserControlPressed),
            0x45 => Some(Opcode::UserControlReleased),
            0x70 => Some(Opcode::SystemAudioModeRequest),
            0x72 => Some(Opcode::SetSystemAudioMode),
            0x89 => Some(Opcode::VendorCommand),
            0x90 => Some(Opcode::ReportPowerStatus),
            0xA4 => Some(Opcode::RequestShortAudioDescriptor),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::Standby => 0x36,
            Opcode::RoutingChange => 0x80,
            Opcode::ActiveSource => 0x82,
            Opcode::UserControlPressed => 0x44,
            Opcode::UserControlReleased => 0x45,
            Opcode::SystemAudioModeRequest => 0x70,
            Opcode::SetSystemAudioMode => 0x72,
            Opcode::VendorCommand => 0x89,
            Opcode::ReportPowerStatus => 0x90,
            Opcode::RequestShortAudioDescriptor => 0xA4,
        }
    }
}

/// `<Report Power Status>` operand: device is in standby.
pub const POWER_STATUS_STANDBY: u8 = 0x01;

// ---------------------------------------------------------------------------
// User control (remote key) codes
// ---------------------------------------------------------------------------

/// UI command codes carried by `<User Control Pressed>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserControl {
    Power,
    VolumeUp,
    VolumeDown,
    Mute,
}

impl UserControl {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x40 => Some(UserControl::Power),
            0x41 => Some(UserControl::VolumeUp),
            0x42 => Some(UserControl::VolumeDown),
            0x43 => Some(UserControl::Mute),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Logical addresses
// ---------------------------------------------------------------------------

/// A 4-bit CEC logical address (0 = TV, 5 = audio system, 15 = broadcast).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogicalAddress(u8);

impl LogicalAddress {
    pub const BROADCAST: LogicalAddress = LogicalAddress(0xF);

    /// Masks `raw` to its low nibble.
    pub fn new(raw: u8) -> Self {
        LogicalAddress(raw & 0x0F)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }
}

/// Formats a frame the way CEC traffic logs conventionally do: `5f:72:01`.
pub fn format_frame(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_opcodes_convert_both_ways() {
        for byte in 0u8..=255 {
            if let Some(op) = Opcode::from_u8(byte) {
                assert_eq!(op.as_u8(), byte);
            }
        }
    }

    #[test]
    fn standby_and_audio_mode_request_are_known() {
        assert_eq!(Opcode::from_u8(0x36), Some(Opcode::Standby));
        assert_eq!(Opcode::from_u8(0x70), Some(Opcode::SystemAudioModeRequest));
        assert_eq!(Opcode::from_u8(0x90), Some(Opcode::ReportPowerStatus));
    }

    #[test]
    fn unknown_opcode_is_none() {
        // <Give Device Vendor ID> is answered by the kernel, never by us.
        assert_eq!(Opcode::from_u8(0x8C), None);
        assert_eq!(Opcode::from_u8(0x00), None);
    }

    #[test]
    fn volume_keys_are_known() {
        assert_eq!(UserControl::from_u8(0x41), Some(UserControl::VolumeUp));
        assert_eq!(UserControl::from_u8(0x42), Some(UserControl::VolumeDown));
        assert_eq!(UserControl::from_u8(0x43), Some(UserControl::Mute));
        assert_eq!(UserControl::from_u8(0x01), None);
    }

    #[test]
    fn logical_address_is_masked_to_nibble() {
        assert_eq!(LogicalAddress::new(0xF5), LogicalAddress::new(5));
        assert_eq!(LogicalAddress::BROADCAST.as_u8(), 15);
    }

    #[test]
    fn frame_formatting_uses_colon_separated_hex() {
        assert_eq!(format_frame(&[0x5F, 0x72, 0x01]), "5f:72:01");
        assert_eq!(format_frame(&[]), "");
    }
}
