//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::security::RatePolicy;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, allowed ports).
    pub listener: ListenerConfig,

    /// Per-identity rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Session admission and idle handling.
    pub sessions: SessionConfig,

    /// Payload transfer limits and staging.
    pub transfer: TransferConfig,

    /// External decoder invocation.
    pub decoder: DecoderConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host or IP to bind (e.g., "0.0.0.0").
    pub bind_host: String,

    /// TCP port.
    pub port: u16,

    /// Ports the listener may use.
    pub port_range: PortRange,
}

impl ListenerConfig {
    /// `host:port` form accepted by the socket API.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 2012,
            port_range: PortRange::default(),
        }
    }
}

/// Inclusive port range.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            min: 2000,
            max: 3000,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per identity per window.
    pub max_requests: u32,

    /// Window length in seconds; also the cooldown after a limit hit.
    pub window_secs: u64,

    /// Maximum number of identities tracked at once.
    pub registry_capacity: usize,
}

impl RateLimitConfig {
    pub fn policy(&self) -> RatePolicy {
        RatePolicy {
            max_requests: self.max_requests,
            window: Duration::from_secs(self.window_secs),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 3,
            window_secs: 60,
            registry_capacity: 256,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum concurrently admitted sessions.
    pub max_users: usize,

    /// Seconds without a request before the session is timed out.
    pub idle_timeout_secs: u64,

    /// Seconds to wait for sessions to finish on shutdown.
    pub drain_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_users: 3,
            idle_timeout_secs: 80,
            drain_timeout_secs: 10,
        }
    }
}

/// Transfer configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    /// Largest accepted payload in bytes.
    pub max_payload_size: u64,

    /// Read buffer size while streaming a payload to disk.
    pub chunk_size: usize,

    /// Directory for staged payloads (system temp dir when unset).
    pub staging_dir: Option<PathBuf>,
}

impl TransferConfig {
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1_000_000,
            chunk_size: 100_000,
            staging_dir: None,
        }
    }
}

/// External decoder configuration.
///
/// The staged file path is appended after `args`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DecoderConfig {
    /// Program to execute.
    pub program: String,

    /// Arguments placed before the payload path.
    pub args: Vec<String>,

    /// Marker in the program's output that precedes the decoded text.
    pub result_marker: String,

    /// Seconds before the decoder process is killed.
    pub timeout_secs: u64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            program: "java".to_string(),
            args: vec![
                "-cp".to_string(),
                "javase.jar:core.jar".to_string(),
                "com.google.zxing.client.j2se.CommandLineRunner".to_string(),
            ],
            result_marker: "Parsed result:".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Append-only log file, in addition to stdout.
    pub log_file: Option<PathBuf>,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: Some(PathBuf::from("server_log.txt")),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
