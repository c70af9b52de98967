//! Command-line options for the gateway binary.

use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::ServerConfig;

/// CLI argument structure.
#[derive(Parser, Debug, Clone)]
#[command(name = "qr-gateway")]
#[command(about = "Decodes QR code images submitted over TCP", long_about = None)]
pub struct Args {
    /// TOML configuration file; watched for changes while running.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// TCP port to listen on.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Requests allowed per identity and the window length in seconds.
    #[arg(long, num_args = 2, value_names = ["MSGS", "SECS"])]
    pub rate: Option<Vec<u64>>,

    /// Maximum concurrent sessions.
    #[arg(long)]
    pub max_users: Option<usize>,

    /// Idle timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Largest accepted payload in bytes.
    #[arg(long)]
    pub max_payload_size: Option<u64>,

    /// Append-only log file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Args {
    pub fn overrides(&self) -> ConfigOverrides {
        let (max_requests, window_secs) = match self.rate.as_deref() {
            Some([msgs, secs]) => (Some(*msgs), Some(*secs)),
            _ => (None, None),
        };
        ConfigOverrides {
            port: self.port,
            max_requests,
            window_secs,
            max_users: self.max_users,
            idle_timeout_secs: self.timeout,
            max_payload_size: self.max_payload_size,
            log_file: self.log_file.clone(),
        }
    }
}

/// Values given on the command line, which win over the config file.
///
/// Kept apart from [`Args`] so the config watcher can re-apply them on reload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub max_requests: Option<u64>,
    pub window_secs: Option<u64>,
    pub max_users: Option<usize>,
    pub idle_timeout_secs: Option<u64>,
    pub max_payload_size: Option<u64>,
    pub log_file: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(max_requests) = self.max_requests {
            config.rate_limit.max_requests = u32::try_from(max_requests).unwrap_or(u32::MAX);
        }
        if let Some(window_secs) = self.window_secs {
            config.rate_limit.window_secs = window_secs;
        }
        if let Some(max_users) = self.max_users {
            config.sessions.max_users = max_users;
        }
        if let Some(idle) = self.idle_timeout_secs {
            config.sessions.idle_timeout_secs = idle;
        }
        if let Some(max_payload_size) = self.max_payload_size {
            config.transfer.max_payload_size = max_payload_size;
        }
        if let Some(log_file) = &self.log_file {
            config.observability.log_file = Some(log_file.clone());
        }
    }
}
