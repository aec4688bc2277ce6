//! cec-lirc -- HDMI-CEC to LIRC bridge for IR-only amplifiers.
//!
//! Entry point, daemon lifecycle, and signal handling.
//!
//! Startup order: signal handlers, session configuration, lircd connection,
//! CEC adapter. Any failure there exits with status 1. After that, the CEC
//! reader thread feeds events through a channel to the dispatcher thread,
//! which hands them to the `Bridge` one at a time. The async runtime only
//! waits for SIGINT or SIGTERM, then stops the dispatcher and waits for it to
//! close the adapter.

mod args;
mod bridge;
mod cec;
mod error;
mod ir;
mod logging;

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;

use args::Args;
use bridge::{Bridge, Dispatch};
use cec::{CecEvent, SessionConfig};
use error::BridgeError;
use ir::{IrSender, RetryPolicy};
use logging::{LogEcho, Verbosity};

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbosity());
    log::info!("cec-lirc v{}", env!("CARGO_PKG_VERSION"));

    match run(args.verbosity()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(verbosity: Verbosity) -> Result<(), BridgeError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(BridgeError::Runtime)?;
    runtime.block_on(serve(verbosity))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

async fn serve(verbosity: Verbosity) -> Result<(), BridgeError> {
    let mut shutdown = Shutdown::install()?;

    let config = SessionConfig::configure(verbosity.log_mask());
    config.initialize()?;

    let sender = IrSender::connect(ir::LIRCD_SOCKET, ir::REMOTE, RetryPolicy::default())?;
    let mut adapter = cec::discover_and_open(&config)?;

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let stop_tx = event_tx.clone();
    adapter.start(Box::new(move |event: CecEvent| {
        // The receiver only goes away during shutdown.
        let _ = event_tx.send(Dispatch::Event(event));
    }))?;

    let stopping = Arc::new(AtomicBool::new(false));
    let log_mask = config.log_mask;
    let dispatcher = {
        let stopping = Arc::clone(&stopping);
        thread::Builder::new()
            .name("cec-lirc-dispatch".into())
            .spawn(move || {
                let echo = LogEcho::new(log_mask, Box::new(io::stdout()) as Box<dyn Write>);
                Bridge::new(adapter, Box::new(sender), echo).run(event_rx, &stopping)
            })
            .map_err(BridgeError::Dispatcher)?
    };
    log::info!("cec-lirc: bridging CEC to lircd remote {:?}", ir::REMOTE);

    let name = shutdown.recv().await;
    log::info!("cec-lirc: {name} received, shutting down");
    stopping.store(true, Ordering::Release);
    let _ = stop_tx.send(Dispatch::Stop);

    // An IR send in flight finishes before the adapter is closed.
    match tokio::task::spawn_blocking(move || dispatcher.join()).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => log::warn!("cec-lirc: closing the CEC adapter failed: {e}"),
        Ok(Err(_)) | Err(_) => log::error!("cec-lirc: dispatcher thread panicked"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// SIGINT / SIGTERM listener.
struct Shutdown {
    interrupt: Signal,
    terminate: Signal,
}

impl Shutdown {
    fn install() -> Result<Self, BridgeError> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).map_err(BridgeError::Signal)?,
            terminate: signal(SignalKind::terminate()).map_err(BridgeError::Signal)?,
        })
    }

    /// Resolves with the signal's name once either signal arrives.
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}
