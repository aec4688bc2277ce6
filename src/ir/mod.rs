//! IR sender.
//!
//! Sends named IR codes for one remote profile through a `Transport` (the
//! lircd socket in production). Three directives cover both send styles:
//! `Once` for single-shot actions, `Start`/`Stop` for keys that repeat while
//! held. Transient transport errors are retried under a bounded
//! `RetryPolicy`; everything else fails the single command, is reported once,
//! and never escalates.

mod lirc;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use thiserror::Error;

pub use lirc::LircTransport;

/// lircd's command socket.
pub const LIRCD_SOCKET: &str = "/var/run/lirc/lircd";

/// lircd remote profile of the amplifier.
pub const REMOTE: &str = "amplifier";

// ---------------------------------------------------------------------------
// Directives
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Send the code once.
    Once,
    /// Start repeating the code until `Stop`.
    Start,
    /// Stop a repeat started with `Start`.
    Stop,
}

impl Directive {
    pub fn keyword(self) -> &'static str {
        match self {
            Directive::Once => "SEND_ONCE",
            Directive::Start => "SEND_START",
            Directive::Stop => "SEND_STOP",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("lircd socket: {0}")]
    Io(#[from] io::Error),

    #[error("lircd rejected the command: {0}")]
    Rejected(String),

    #[error("malformed lircd reply: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether the same command may succeed if sent again right away.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum IrError {
    #[error("could not connect to lircd at {}: {source}", path.display())]
    Connect { path: PathBuf, source: io::Error },

    #[error("{directive} {code} failed: {source}")]
    Send {
        directive: Directive,
        code: String,
        source: TransportError,
    },

    #[error("{directive} {code} failed: lircd still busy after {attempts} attempts")]
    Exhausted {
        directive: Directive,
        code: String,
        attempts: u32,
    },
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// One request/response exchange with the IR daemon.
pub trait Transport {
    /// Runs a single command line (without trailing newline).
    fn execute(&mut self, command: &str) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// How transient transport errors are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(160),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failed`-th failed attempt (1-based): doubles each
    /// time, capped at `max_backoff`.
    pub fn backoff(&self, failed: u32) -> Duration {
        let factor = 1u32.checked_shl(failed.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Anything that can send IR codes for the amplifier.
pub trait IrSink {
    fn send(&mut self, directive: Directive, code: &str) -> Result<(), IrError>;
}

/// Sends codes for one remote profile over a `Transport`.
pub struct IrSender<T: Transport> {
    transport: T,
    remote: String,
    policy: RetryPolicy,
}

impl IrSender<LircTransport> {
    /// Connects to lircd at `path`.
    pub fn connect(path: &str, remote: &str, policy: RetryPolicy) -> Result<Self, IrError> {
        let transport = LircTransport::connect(path).map_err(|source| IrError::Connect {
            path: PathBuf::from(path),
            source,
        })?;
        log::info!("ir: connected to lircd at {path}, remote {remote:?}");
        Ok(Self::new(transport, remote, policy))
    }
}

impl<T: Transport> IrSender<T> {
    pub fn new(transport: T, remote: &str, policy: RetryPolicy) -> Self {
        Self { transport, remote: remote.to_owned(), policy }
    }

    fn try_send(&mut self, directive: Directive, code: &str) -> Result<(), IrError> {
        let command = format!("{} {} {}", directive.keyword(), self.remote, code);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.execute(&command) {
                Ok(()) => {
                    log::debug!("ir: {command}");
                    return Ok(());
                }
                Err(e) if e.is_transient() => {
                    if attempt >= self.policy.max_attempts {
                        return Err(IrError::Exhausted {
                            directive,
                            code: code.to_owned(),
                            attempts: attempt,
                        });
                    }
                    let delay = self.policy.backoff(attempt);
                    log::debug!("ir: {command}: {e}, retrying in {delay:?}");
                    thread::sleep(delay);
                }
                Err(source) => {
                    return Err(IrError::Send { directive, code: code.to_owned(), source });
                }
            }
        }
    }
}

impl<T: Transport> IrSink for IrSender<T> {
    /// Sends `code`, logging one error line on failure.
    fn send(&mut self, directive: Directive, code: &str) -> Result<(), IrError> {
        let result = self.try_send(directive, code);
        if let Err(e) = &result {
            log::error!("ir: {e}");
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
