//! Event dispatcher.
//!
//! `Bridge` is the single owner of everything the handlers touch: the CEC
//! adapter, the IR sink, the CEC log echo and the local audio-enabled flag.
//! `Bridge::run` drains the event channel on a thread of its own, one
//! `CecEvent` at a time, so no handler ever runs concurrently with another or
//! with shutdown, and a slow IR send never holds up signal handling.

mod actions;

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::UnboundedReceiver;

use crate::cec::{Alert, CecAdapter, CecCommand, CecError, CecEvent, KeyPress};
use crate::ir::{Directive, IrSink};
use crate::logging::LogEcho;

use actions::Intent;

/// What the bridge last told the amplifier and the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioState {
    /// Nothing sent yet, or the last power code failed to go out; the
    /// amplifier could be in either state.
    Unknown,
    Enabled,
    Disabled,
}

/// Work queued for the dispatcher thread.
#[derive(Debug)]
pub enum Dispatch {
    Event(CecEvent),
    /// Wakes the dispatcher so it notices the stop flag.
    Stop,
}

pub struct Bridge {
    adapter: Box<dyn CecAdapter>,
    ir: Box<dyn IrSink>,
    echo: LogEcho<Box<dyn Write>>,
    audio: AudioState,
}

impl Bridge {
    pub fn new(
        adapter: Box<dyn CecAdapter>,
        ir: Box<dyn IrSink>,
        echo: LogEcho<Box<dyn Write>>,
    ) -> Self {
        Self { adapter, ir, echo, audio: AudioState::Unknown }
    }

    pub fn handle(&mut self, event: CecEvent) {
        match event {
            CecEvent::Log(message) => self.echo.echo(&message),
            CecEvent::Key(key) => self.on_key(key),
            CecEvent::Command(command) => self.on_command(&command),
            CecEvent::Alert(alert) => self.on_alert(alert),
        }
    }

    /// Handles events until `Stop` arrives or every sender is gone, then
    /// closes the adapter. Events still queued once `stopping` is set are
    /// dropped. Blocks; must not run inside the async runtime.
    pub fn run(
        mut self,
        mut queue: UnboundedReceiver<Dispatch>,
        stopping: &AtomicBool,
    ) -> Result<(), CecError> {
        while let Some(Dispatch::Event(event)) = queue.blocking_recv() {
            if stopping.load(Ordering::Acquire) {
                break;
            }
            self.handle(event);
        }
        self.shutdown()
    }

    /// Closes the adapter. Events still queued are never dispatched.
    pub fn shutdown(mut self) -> Result<(), CecError> {
        self.adapter.close()
    }

    #[cfg(test)]
    fn audio_state(&self) -> AudioState {
        self.audio
    }

    fn on_key(&mut self, key: KeyPress) {
        let Some(action) = actions::key_action(key.code) else {
            return;
        };
        if let Some((directive, code)) = action.directive(key.is_release()) {
            // Failures are reported by the sink; the next key starts fresh.
            let _ = self.ir.send(directive, code);
        }
    }

    fn on_command(&mut self, command: &CecCommand) {
        match actions::command_intent(command.opcode, &command.parameters) {
            Some(Intent::AmplifierOff) => self.switch_amplifier(false),
            Some(Intent::AmplifierOn) => self.switch_amplifier(true),
            Some(Intent::Ignore) => log::debug!(
                "bridge: opcode {:#04x} ({:x} -> {:x}) not handled",
                command.opcode,
                command.initiator.as_u8(),
                command.destination.as_u8()
            ),
            None => {}
        }
    }

    fn switch_amplifier(&mut self, on: bool) {
        let target = if on { AudioState::Enabled } else { AudioState::Disabled };
        if self.audio == target {
            log::debug!("bridge: amplifier already {target:?}, power toggle suppressed");
            return;
        }

        let code = if on { actions::POWER_ON } else { actions::POWER_OFF };
        let sent = self.ir.send(Directive::Once, code).is_ok();

        if let Err(e) = self.adapter.set_audio_enabled(on) {
            log::warn!("bridge: could not set system audio mode: {e}");
        }

        // The bus follows the request either way; the amplifier only if the
        // code went out, so the next request of this kind is not suppressed.
        if sent {
            self.audio = target;
            log::info!("bridge: amplifier {}", if on { "on" } else { "off" });
        } else {
            self.audio = AudioState::Unknown;
        }
    }

    fn on_alert(&mut self, alert: Alert) {
        match alert {
            Alert::ConnectionLost => log::error!("bridge: connection to the CEC adapter lost"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
