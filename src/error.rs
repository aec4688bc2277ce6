//! Top-level error type. Any of these ends the process with status 1.

use std::io;

use thiserror::Error;

use crate::cec::CecError;
use crate::ir::IrError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("could not install signal handlers: {0}")]
    Signal(#[source] io::Error),

    #[error("could not start the event loop: {0}")]
    Runtime(#[source] io::Error),

    #[error("could not start the dispatcher thread: {0}")]
    Dispatcher(#[source] io::Error),

    #[error(transparent)]
    Cec(#[from] CecError),

    #[error(transparent)]
    Ir(#[from] IrError),
}
