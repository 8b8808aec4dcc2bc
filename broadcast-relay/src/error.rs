use std::{io, time::Duration};

use thiserror::Error;

/// Why a session stopped being able to read from its peer.
///
/// A clean disconnect is not an error: it surfaces as the end of the
/// message stream instead.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),
    #[error("unsupported frame: {0}")]
    Unsupported(&'static str),
    #[error("line longer than {0} bytes")]
    TooLong(usize),
}

/// Why a broadcast write to one peer failed.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),
    #[error("write timed out after {0:?}")]
    TimedOut(Duration),
    #[error("connection closed")]
    Closed,
}
