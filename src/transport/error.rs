//! Transport-level failures

use std::time::Duration;

use adb_shared::codec::CodecError;
use thiserror::Error;

/// Errors raised while talking to the ADB server
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Server refused {request:?}: {message}")]
    Refused { request: String, message: String },

    #[error("Timed out connecting to ADB server at {0}")]
    ConnectTimeout(String),

    #[error("No output within {0:?}")]
    OutputTimeout(Duration),

    #[error("Server closed connection")]
    Closed,

    #[error("Refusing to pass {0:?} to the device shell")]
    UnsafeArgument(String),
}
