//! Press/release tracking for `<User Control Pressed>` / `<User Control Released>`.
//!
//! TVs repeat `<User Control Pressed>` roughly every 450 ms while a key is
//! held and send a single `<User Control Released>` at the end, which does not
//! name the key. `KeyTracker` collapses that stream into one press event and
//! one release event carrying the hold time. If neither a repeat nor a release
//! arrives within `RELEASE_TIMEOUT`, the key is released on the sender's
//! behalf so a start/stop IR pair can never be left running.

use std::time::{Duration, Instant};

use crate::cec::KeyPress;

/// Hold timeout after the last press or repeat.
pub const RELEASE_TIMEOUT: Duration = Duration::from_millis(500);

struct HeldKey {
    code: u8,
    since: Instant,
    last_seen: Instant,
}

#[derive(Default)]
pub struct KeyTracker {
    held: Option<HeldKey>,
}

impl KeyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles `<User Control Pressed>` for `code` received at `now`.
    pub fn press(&mut self, code: u8, now: Instant) -> Vec<KeyPress> {
        if let Some(held) = self.held.as_mut() {
            if held.code == code {
                held.last_seen = now;
                return Vec::new();
            }
        }
        let mut events: Vec<KeyPress> = self.release(now).into_iter().collect();
        self.held = Some(HeldKey { code, since: now, last_seen: now });
        events.push(KeyPress::pressed(code));
        events
    }

    /// Handles `<User Control Released>`.
    pub fn release(&mut self, now: Instant) -> Option<KeyPress> {
        let held = self.held.take()?;
        Some(KeyPress::released(held.code, now.saturating_duration_since(held.since)))
    }

    /// Releases the held key if it timed out.
    pub fn expire(&mut self, now: Instant) -> Option<KeyPress> {
        let deadline = self.deadline()?;
        if now >= deadline { self.release(now) } else { None }
    }

    /// When the held key will time out, if one is held.
    pub fn deadline(&self) -> Option<Instant> {
        self.held.as_ref().map(|h| h.last_seen + RELEASE_TIMEOUT)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
