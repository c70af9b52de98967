//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML), optional
//!     → loader.rs (parse & deserialize)
//!     → cli.rs (command-line overrides)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config, re-applies overrides
//!     → validation.rs validates
//!     → server swaps rate policy, session limits and admission ceiling
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The listen port is fixed for the process lifetime

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use cli::{Args, ConfigOverrides};
pub use loader::{load_config, ConfigError};
pub use schema::{
    DecoderConfig, ListenerConfig, ObservabilityConfig, PortRange, RateLimitConfig, ServerConfig,
    SessionConfig, TransferConfig,
};
