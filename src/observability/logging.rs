//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Write human-readable events to stdout
//! - Append the same events to the configured log file
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Log level from config, overridable with `RUST_LOG`
//! - The file layer has ANSI colors off so the log stays plain text

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &ObservabilityConfig) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("qr_gateway={}", config.log_level)));

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    Ok(())
}
