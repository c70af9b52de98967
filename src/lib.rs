//! QR decoding gateway.
//!
//! A TCP service that accepts length-prefixed image uploads, decodes them
//! with an external QR reader and answers with a status code plus the
//! decoded text.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::Listener ──▶ session task ─────────────▶ decode::Decoder
//!                                      │   ▲                       (external)
//!                                      ▼   │
//!                               security::{AdmissionController, RateLimiter}
//!
//!     Cross-cutting: config (file + CLI + hot reload), observability
//!     (tracing, Prometheus), lifecycle (startup, signals, drain)
//! ```

pub mod config;
pub mod decode;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod security;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use lifecycle::Shutdown;
pub use server::{Server, ServiceState};
