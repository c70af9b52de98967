//! Per-connection session subsystem.
//!
//! # State Machine
//! ```text
//! connect ── no slot ──▶ SERVER_BUSY, close (counter untouched)
//!    │
//!    ▼
//! AWAITING_REQUEST ◀──────────────────────────────┐
//!    ├─ idle deadline ───────────▶ TIMEOUT, close │
//!    ├─ over ceiling / registry full ─▶ BUSY, close
//!    ├─ rate limited ─▶ RATE_LIMIT_EXCEEDED, cooldown ─┤
//!    ├─ quit ─▶ forget identity, close            │
//!    ▼                                            │
//! RECEIVING_PAYLOAD ─ stall / EOF / IO error ─▶ close
//!    ▼                                            │
//! DECODING ─▶ RESPONDING ─────────────────────────┘
//! ```
//!
//! # Design Decisions
//! - One task per connection; every wait is an await point
//! - The rate limiter runs before the request is read, so a limited request
//!   stays queued on the socket and is served after the cooldown
//! - Oversized payloads are drained and answered with FAILURE, keeping the
//!   framing intact for the next request

pub mod handler;
pub mod staging;
pub mod state;

use std::path::PathBuf;
use std::time::Duration;

use crate::config::ServerConfig;

pub use handler::serve_connection;
pub use staging::PendingPayload;
pub use state::{SessionEnd, SessionState};

/// Limits read by a session at the top of every request cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLimits {
    /// Longest wait for a request, or for progress inside one.
    pub idle_timeout: Duration,
    /// Largest payload that is staged and decoded.
    pub max_payload_size: u64,
    /// Read buffer size while streaming a payload.
    pub chunk_size: usize,
    /// Where staging files are created.
    pub staging_dir: PathBuf,
}

impl SessionLimits {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            idle_timeout: Duration::from_secs(config.sessions.idle_timeout_secs),
            max_payload_size: config.transfer.max_payload_size,
            chunk_size: config.transfer.chunk_size,
            staging_dir: config.transfer.staging_dir(),
        }
    }
}
