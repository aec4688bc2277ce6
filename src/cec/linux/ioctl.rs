//! Kernel CEC ABI (`include/uapi/linux/cec.h`).
//!
//! Struct layouts mirror the C definitions field for field; only the ioctls
//! and constants this bridge uses are declared.

pub const CEC_MAX_MSG_SIZE: usize = 16;
pub const CEC_MAX_LOG_ADDRS: usize = 4;

pub const CEC_LOG_ADDR_INVALID: u8 = 0xff;
pub const CEC_PHYS_ADDR_INVALID: u16 = 0xffff;
pub const CEC_VENDOR_ID_NONE: u32 = 0xffff_ffff;

// Capabilities
pub const CEC_CAP_LOG_ADDRS: u32 = 1 << 1;
pub const CEC_CAP_TRANSMIT: u32 = 1 << 2;

// Modes
pub const CEC_MODE_INITIATOR: u32 = 0x1;
pub const CEC_MODE_FOLLOWER: u32 = 0x1 << 4;

// Transmit status
pub const CEC_TX_STATUS_OK: u8 = 1 << 0;

// Event types
pub const CEC_EVENT_STATE_CHANGE: u32 = 1;
pub const CEC_EVENT_LOST_MSGS: u32 = 2;

// CEC versions
pub const CEC_OP_CEC_VERSION_1_4: u8 = 5;

// Logical address types
pub const CEC_LOG_ADDR_TYPE_TUNER: u8 = 2;
pub const CEC_LOG_ADDR_TYPE_AUDIOSYSTEM: u8 = 4;

// Primary device types
pub const CEC_OP_PRIM_DEVTYPE_TUNER: u8 = 3;
pub const CEC_OP_PRIM_DEVTYPE_AUDIOSYSTEM: u8 = 5;

// All device types (CEC 2.0 bitmask)
pub const CEC_OP_ALL_DEVTYPE_TUNER: u8 = 0x20;
pub const CEC_OP_ALL_DEVTYPE_AUDIOSYSTEM: u8 = 0x08;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct CecCaps {
    pub driver: [u8; 32],
    pub name: [u8; 32],
    pub available_log_addrs: u32,
    pub capabilities: u32,
    pub version: u32,
}

impl CecCaps {
    pub fn driver_name(&self) -> String {
        c_string(&self.driver)
    }

    pub fn adapter_name(&self) -> String {
        c_string(&self.name)
    }
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct CecLogAddrs {
    pub log_addr: [u8; CEC_MAX_LOG_ADDRS],
    pub log_addr_mask: u16,
    pub cec_version: u8,
    pub num_log_addrs: u8,
    pub vendor_id: u32,
    pub flags: u32,
    pub osd_name: [u8; 15],
    pub primary_device_type: [u8; CEC_MAX_LOG_ADDRS],
    pub log_addr_type: [u8; CEC_MAX_LOG_ADDRS],
    pub all_device_types: [u8; CEC_MAX_LOG_ADDRS],
    pub features: [[u8; 12]; CEC_MAX_LOG_ADDRS],
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct CecMsg {
    pub tx_ts: u64,
    pub rx_ts: u64,
    pub len: u32,
    pub timeout: u32,
    pub sequence: u32,
    pub flags: u32,
    pub msg: [u8; CEC_MAX_MSG_SIZE],
    pub reply: u8,
    pub rx_status: u8,
    pub tx_status: u8,
    pub tx_arb_lost_cnt: u8,
    pub tx_nack_cnt: u8,
    pub tx_low_drive_cnt: u8,
    pub tx_error_cnt: u8,
}

impl CecMsg {
    /// Builds an outgoing message from a complete frame (header included).
    pub fn with_frame(frame: &[u8]) -> Self {
        let mut msg = CecMsg::default();
        let len = frame.len().min(CEC_MAX_MSG_SIZE);
        msg.msg[..len].copy_from_slice(&frame[..len]);
        msg.len = len as u32;
        msg
    }

    pub fn frame(&self) -> &[u8] {
        let len = (self.len as usize).min(CEC_MAX_MSG_SIZE);
        &self.msg[..len]
    }
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct CecEvent {
    pub ts: u64,
    pub event: u32,
    pub flags: u32,
    /// Union of `cec_event_state_change`, `cec_event_lost_msgs` and `raw[16]`.
    pub raw: [u32; 16],
}

impl CecEvent {
    /// `state_change.phys_addr`.
    pub fn phys_addr(&self) -> u16 {
        let b = self.raw[0].to_ne_bytes();
        u16::from_ne_bytes([b[0], b[1]])
    }

    /// `lost_msgs.lost_msgs`.
    pub fn lost_msgs(&self) -> u32 {
        self.raw[0]
    }
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

nix::ioctl_readwrite!(cec_adap_g_caps, b'a', 0, CecCaps);
nix::ioctl_readwrite!(cec_adap_s_log_addrs, b'a', 4, CecLogAddrs);
nix::ioctl_readwrite!(cec_transmit, b'a', 5, CecMsg);
nix::ioctl_readwrite!(cec_receive, b'a', 6, CecMsg);
nix::ioctl_readwrite!(cec_dqevent, b'a', 7, CecEvent);
nix::ioctl_write_ptr!(cec_s_mode, b'a', 9, u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_sizes_match_kernel_abi() {
        assert_eq!(std::mem::size_of::<CecCaps>(), 76);
        assert_eq!(std::mem::size_of::<CecLogAddrs>(), 92);
        assert_eq!(std::mem::size_of::<CecMsg>(), 56);
        assert_eq!(std::mem::size_of::<CecEvent>(), 80);
    }

    #[test]
    fn message_frame_is_truncated_to_len() {
        let msg = CecMsg::with_frame(&[0x5F, 0x72, 0x01]);
        assert_eq!(msg.len, 3);
        assert_eq!(msg.frame(), &[0x5F, 0x72, 0x01]);
    }

    #[test]
    fn c_string_stops_at_nul() {
        let mut buf = [0u8; 32];
        buf[..5].copy_from_slice(b"pulse");
        assert_eq!(c_string(&buf), "pulse");
    }
}
