//! CEC adapter session.
//!
//! Defines the event types delivered by a CEC adapter, the `CecAdapter` trait
//! the dispatcher talks to, and the session configuration used to register
//! this process on the bus. The concrete backend lives in a child module:
//!
//! - Linux: kernel CEC framework (`/dev/cecN`) via `linux::LinuxCecAdapter`.
//!
//! Other targets compile, but `discover_and_open` reports the adapter as
//! unavailable.

mod codes;
#[cfg(target_os = "linux")]
mod linux;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::logging::LogMask;

pub use codes::{format_frame, LogicalAddress, Opcode, UserControl, POWER_STATUS_STANDBY};

/// OSD name announced on the bus.
pub const DEVICE_NAME: &str = "cec-lirc";

/// Longest OSD name the CEC protocol can carry (`<Set OSD Name>` operand).
const MAX_OSD_NAME_LEN: usize = 14;

/// A CEC adapter can hold at most four logical addresses.
const MAX_DEVICE_TYPES: usize = 4;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CecError {
    #[error("CEC configuration rejected: {0}")]
    InvalidConfig(String),

    #[error("no CEC adapters found")]
    NoAdapter,

    #[error("could not open CEC adapter {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CEC adapter {op} failed: {source}")]
    Io {
        op: &'static str,
        source: std::io::Error,
    },

    #[error("CEC adapter unsupported: {0}")]
    Unsupported(String),

    #[error("CEC adapter is not open")]
    Closed,

    #[cfg_attr(target_os = "linux", allow(dead_code))]
    #[error("CEC adapters are not supported on this platform")]
    Unavailable,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Severity of a message produced by the adapter backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Error,
    Warning,
    Notice,
    Traffic,
    Debug,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Notice => "NOTICE",
            LogLevel::Traffic => "TRAFFIC",
            LogLevel::Debug => "DEBUG",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub level: LogLevel,
    pub message: String,
}

/// A remote-control key event.
///
/// `duration` is zero when the key goes down and holds the time the key was
/// held when it is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub code: u8,
    pub duration: Duration,
}

impl KeyPress {
    pub fn pressed(code: u8) -> Self {
        Self { code, duration: Duration::ZERO }
    }

    pub fn released(code: u8, held: Duration) -> Self {
        Self { code, duration: held.max(Duration::from_millis(1)) }
    }

    pub fn is_release(&self) -> bool {
        !self.duration.is_zero()
    }
}

/// A CEC frame addressed to (or broadcast past) this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CecCommand {
    pub initiator: LogicalAddress,
    pub destination: LogicalAddress,
    pub opcode: u8,
    pub parameters: Vec<u8>,
}

impl CecCommand {
    /// Decodes a raw frame. Returns `None` for polling messages (header only).
    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        let (&header, rest) = frame.split_first()?;
        let (&opcode, parameters) = rest.split_first()?;
        Some(Self {
            initiator: LogicalAddress::new(header >> 4),
            destination: LogicalAddress::new(header),
            opcode,
            parameters: parameters.to_vec(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    /// The adapter went away (unplugged, driver unloaded).
    ConnectionLost,
}

/// Everything an adapter reports to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CecEvent {
    Log(LogMessage),
    Key(KeyPress),
    Command(CecCommand),
    Alert(Alert),
}

impl CecEvent {
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        CecEvent::Log(LogMessage { level, message: message.into() })
    }
}

// ---------------------------------------------------------------------------
// Adapter trait
// ---------------------------------------------------------------------------

/// An open connection to a CEC adapter.
pub trait CecAdapter {
    /// Starts delivering events. `callback` is invoked from a thread owned by
    /// the adapter, so it must only hand the event off.
    fn start(&mut self, callback: Box<dyn Fn(CecEvent) + Send + Sync>) -> Result<(), CecError>;

    /// Announces (or withdraws) this device as the active system audio device.
    fn set_audio_enabled(&mut self, enabled: bool) -> Result<(), CecError>;

    /// Stops event delivery and releases the adapter. Idempotent.
    fn close(&mut self) -> Result<(), CecError>;
}

// ---------------------------------------------------------------------------
// Session configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    AudioSystem,
    Tuner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CecVersion {
    V1_4,
}

/// Identity and verbosity of this process on the CEC bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub device_name: String,
    pub cec_version: CecVersion,
    pub device_types: Vec<DeviceType>,
    pub log_mask: LogMask,
}

impl SessionConfig {
    /// Builds the fixed session identity. Registers as a tuner as well when
    /// built with the `tuner` feature.
    pub fn configure(log_mask: LogMask) -> Self {
        let mut device_types = vec![DeviceType::AudioSystem];
        if cfg!(feature = "tuner") {
            device_types.push(DeviceType::Tuner);
        }
        Self {
            device_name: DEVICE_NAME.to_owned(),
            cec_version: CecVersion::V1_4,
            device_types,
            log_mask,
        }
    }

    /// Checks the configuration against what an adapter can register.
    pub fn initialize(&self) -> Result<(), CecError> {
        let name = &self.device_name;
        if name.is_empty() || name.len() > MAX_OSD_NAME_LEN {
            return Err(CecError::InvalidConfig(format!(
                "device name {name:?} must be 1..={MAX_OSD_NAME_LEN} bytes"
            )));
        }
        if !name.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
            return Err(CecError::InvalidConfig(format!(
                "device name {name:?} must be printable ASCII"
            )));
        }
        if self.device_types.is_empty() || self.device_types.len() > MAX_DEVICE_TYPES {
            return Err(CecError::InvalidConfig(format!(
                "{} device types requested, expected 1..={MAX_DEVICE_TYPES}",
                self.device_types.len()
            )));
        }
        for (i, ty) in self.device_types.iter().enumerate() {
            if self.device_types[..i].contains(ty) {
                return Err(CecError::InvalidConfig(format!("device type {ty:?} listed twice")));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Opens the first CEC adapter found and registers `config` on it.
#[cfg(target_os = "linux")]
pub fn discover_and_open(config: &SessionConfig) -> Result<Box<dyn CecAdapter + Send>, CecError> {
    linux::discover_and_open(config)
}

#[cfg(not(target_os = "linux"))]
pub fn discover_and_open(_config: &SessionConfig) -> Result<Box<dyn CecAdapter + Send>, CecError> {
    Err(CecError::Unavailable)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
