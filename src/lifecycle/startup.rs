//! Startup orchestration.
//!
//! Order: configuration, logging, metrics, config watcher, decoder, listener,
//! signal handling, then the accept loop. Any error before the accept loop
//! starts is fatal.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::watcher::ConfigWatcher;
use crate::config::{load_config, Args, ConfigError};
use crate::decode::CommandDecoder;
use crate::lifecycle::signals::shutdown_on_signal;
use crate::lifecycle::Shutdown;
use crate::net::{Listener, ListenerError};
use crate::observability::{logging, metrics};
use crate::server::Server;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("log file: {0}")]
    Logging(#[source] std::io::Error),

    #[error("metrics address {address:?}: {source}")]
    MetricsAddress {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("config watcher: {0}")]
    Watcher(#[from] notify::Error),

    #[error("listener: {0}")]
    Listener(#[from] ListenerError),

    #[error("server: {0}")]
    Server(#[source] std::io::Error),
}

/// Start the gateway and run until a termination signal has been handled.
pub async fn run(args: Args) -> Result<(), StartupError> {
    let overrides = args.overrides();
    let config = load_config(args.config.as_deref(), &overrides)?;

    logging::init_logging(&config.observability).map_err(StartupError::Logging)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "qr-gateway starting");

    if config.observability.metrics_enabled {
        let address = &config.observability.metrics_address;
        let addr: SocketAddr = address.parse().map_err(|source| StartupError::MetricsAddress {
            address: address.clone(),
            source,
        })?;
        metrics::init_metrics(addr)?;
    }

    // The watcher must outlive the server; dropping it stops notifications.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, overrides);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let decoder = CommandDecoder::from_config(&config.decoder);
    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    tokio::spawn(shutdown_on_signal(shutdown));

    Server::new(config, decoder)
        .run(listener, config_updates, shutdown_rx)
        .await
        .map_err(StartupError::Server)?;

    tracing::info!("Shutdown complete");
    Ok(())
}
