//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, stdout + append-only file)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log file (operator audit of admissions, timeouts, rate limits, transfers)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Every session runs inside a `session` span carrying its id and peer
//! - Metrics are cheap (atomic increments) and off by default

pub mod logging;
pub mod metrics;
