//! Logging setup.
//!
//! Two separate outputs:
//! - Diagnostics of this program go through the `log` facade to `env_logger`
//!   (stderr). The default level follows the CLI verbosity; `RUST_LOG`
//!   overrides it.
//! - Messages produced by the CEC adapter are echoed to stdout with a local
//!   timestamp, gated by a `LogMask` of CEC severities.

use std::io::Write;
use std::ops::BitOr;

use chrono::{DateTime, Local};

use crate::cec::{LogLevel, LogMessage};

// ---------------------------------------------------------------------------
// Verbosity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    /// CEC severities echoed at this verbosity.
    pub fn log_mask(self) -> LogMask {
        match self {
            Verbosity::Quiet => LogMask::NONE,
            Verbosity::Normal => LogMask::DEFAULT,
            Verbosity::Verbose => LogMask::ALL,
        }
    }

    /// Default `env_logger` filter at this verbosity.
    fn filter(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
        }
    }
}

/// Installs the stderr logger. Call once, before anything logs.
pub fn init(verbosity: Verbosity) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(verbosity.filter()))
        .init();
}

// ---------------------------------------------------------------------------
// CEC log mask
// ---------------------------------------------------------------------------

/// Set of CEC log severities to echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogMask(u8);

impl LogMask {
    pub const NONE: LogMask = LogMask(0);
    pub const ERROR: LogMask = LogMask(1 << 0);
    pub const WARNING: LogMask = LogMask(1 << 1);
    pub const NOTICE: LogMask = LogMask(1 << 2);
    pub const TRAFFIC: LogMask = LogMask(1 << 3);
    pub const DEBUG: LogMask = LogMask(1 << 4);
    pub const ALL: LogMask = LogMask(0x1f);
    pub const DEFAULT: LogMask = LogMask(Self::ERROR.0 | Self::WARNING.0 | Self::NOTICE.0);

    pub fn of(level: LogLevel) -> LogMask {
        match level {
            LogLevel::Error => LogMask::ERROR,
            LogLevel::Warning => LogMask::WARNING,
            LogLevel::Notice => LogMask::NOTICE,
            LogLevel::Traffic => LogMask::TRAFFIC,
            LogLevel::Debug => LogMask::DEBUG,
        }
    }

    pub fn contains(self, level: LogLevel) -> bool {
        self.0 & LogMask::of(level).0 != 0
    }
}

impl BitOr for LogMask {
    type Output = LogMask;

    fn bitor(self, rhs: LogMask) -> LogMask {
        LogMask(self.0 | rhs.0)
    }
}

// ---------------------------------------------------------------------------
// CEC log echo
// ---------------------------------------------------------------------------

/// Writes CEC adapter messages as `HH:MM:SS.mmm [LEVEL]   message` lines.
pub struct LogEcho<W: Write> {
    mask: LogMask,
    out: W,
}

impl<W: Write> LogEcho<W> {
    pub fn new(mask: LogMask, out: W) -> Self {
        Self { mask, out }
    }

    /// Echoes `message` if its severity is in the mask. Write errors are
    /// dropped; a closed stdout must not take the bridge down.
    pub fn echo(&mut self, message: &LogMessage) {
        self.echo_at(message, Local::now());
    }

    fn echo_at(&mut self, message: &LogMessage, at: DateTime<Local>) {
        if !self.mask.contains(message.level) {
            return;
        }
        let _ = writeln!(
            self.out,
            "{} [{:<7}] {}",
            at.format("%H:%M:%S%.3f"),
            message.level.label(),
            message.message
        );
        let _ = self.out.flush();
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(level: LogLevel, text: &str) -> LogMessage {
        LogMessage { level, message: text.into() }
    }

    fn lines(echo: LogEcho<Vec<u8>>) -> Vec<String> {
        String::from_utf8(echo.into_inner())
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn default_mask_skips_traffic_and_debug() {
        assert!(LogMask::DEFAULT.contains(LogLevel::Error));
        assert!(LogMask::DEFAULT.contains(LogLevel::Notice));
        assert!(!LogMask::DEFAULT.contains(LogLevel::Traffic));
        assert!(!LogMask::DEFAULT.contains(LogLevel::Debug));
    }

    #[test]
    fn all_and_none_masks() {
        for level in [
            LogLevel::Error,
            LogLevel::Warning,
            LogLevel::Notice,
            LogLevel::Traffic,
            LogLevel::Debug,
        ] {
            assert!(LogMask::ALL.contains(level));
            assert!(!LogMask::NONE.contains(level));
        }
    }

    #[test]
    fn masks_combine() {
        let mask = LogMask::ERROR | LogMask::TRAFFIC;
        assert!(mask.contains(LogLevel::Traffic));
        assert!(!mask.contains(LogLevel::Warning));
    }

    #[test]
    fn verbosity_selects_mask() {
        assert_eq!(Verbosity::Quiet.log_mask(), LogMask::NONE);
        assert_eq!(Verbosity::Normal.log_mask(), LogMask::DEFAULT);
        assert_eq!(Verbosity::Verbose.log_mask(), LogMask::ALL);
    }

    #[test]
    fn excluded_severity_writes_nothing() {
        let mut echo = LogEcho::new(LogMask::ERROR, Vec::new());
        echo.echo(&message(LogLevel::Traffic, "<< 05:44:41"));
        assert!(lines(echo).is_empty());
    }

    #[test]
    fn included_severity_writes_one_timestamped_line() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 21, 7, 5).unwrap()
            + chrono::Duration::milliseconds(42);
        let mut echo = LogEcho::new(LogMask::ALL, Vec::new());
        echo.echo_at(&message(LogLevel::Notice, "physical address 1.0.0.0"), at);

        let lines = lines(echo);
        assert_eq!(lines, vec!["21:07:05.042 [NOTICE ] physical address 1.0.0.0"]);
    }

    #[test]
    fn live_timestamp_has_millisecond_precision() {
        let mut echo = LogEcho::new(LogMask::ALL, Vec::new());
        echo.echo(&message(LogLevel::Error, "boom"));

        let lines = lines(echo);
        assert_eq!(lines.len(), 1);
        let (stamp, rest) = lines[0].split_once(' ').unwrap();
        assert_eq!(stamp.len(), "HH:MM:SS.mmm".len());
        assert_eq!(stamp.as_bytes()[8], b'.');
        assert!(rest.ends_with("boom"));
    }
}
