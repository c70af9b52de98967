//! Session-fatal error taxonomy.
//!
//! Per-request problems (rate limiting, oversized payloads, decode failures)
//! are answered on the wire and never become errors of this type; the ones
//! here all end the session.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Socket read or write failed.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// The peer broke framing, e.g. closed inside a length prefix or payload.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The staging file could not be created or written.
    #[error("staging failed: {0}")]
    Staging(#[source] io::Error),
}
