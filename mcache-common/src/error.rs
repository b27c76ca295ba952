//! # Error Taxonomy
//!
//! Errors surfaced by configuration loading and by the transport connection.
//! Liveness probes never return these; a failed probe is reported as `false`.

use std::io;

use thiserror::Error;

/// Result alias used across the client crates.
pub type McResult<T> = Result<T, McError>;

/// Errors produced by the memcached client transport.
#[derive(Debug, Error)]
pub enum McError {
    /// Read/write failure on the underlying stream, including deadline
    /// expiry and end-of-stream.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The connection was closed and can no longer be used.
    #[error("connection closed")]
    Closed,

    /// The configuration snapshot failed validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The configuration snapshot could not be decoded.
    #[error("config decode error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McError {
    /// Returns true when the error is an expired read or write deadline.
    ///
    /// Depending on the platform a socket timeout surfaces as either
    /// `WouldBlock` or `TimedOut`.
    pub fn is_timeout(&self) -> bool {
        match self {
            McError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Returns true when the peer closed the stream before the expected data arrived.
    pub fn is_eof(&self) -> bool {
        matches!(self, McError::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof)
    }
}
