//! Decoding service boundary.
//!
//! # Data Flow
//! ```text
//! Session (DECODING)
//!     → Decoder::decode(staged file path)
//!         → command.rs (external program, bounded by a timeout)
//!     ← Some(text) | None | DecodeError
//! ```
//!
//! # Design Decisions
//! - Sessions are generic over `Decoder` so tests substitute a fake
//! - "No result" and errors both become a FAILURE response; only the log
//!   and metrics distinguish them

pub mod command;

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

pub use command::CommandDecoder;

/// Errors raised by a decoder. None of them end the session.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The decoder process could not be started.
    #[error("failed to start decoder: {0}")]
    Spawn(#[source] std::io::Error),

    /// The decoder did not finish in time and was killed.
    #[error("decoder timed out after {0:?}")]
    Timeout(Duration),

    /// Reading the staged payload failed.
    #[error("decoder I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a staged payload into decoded text.
pub trait Decoder: Send + Sync + 'static {
    /// Decode the file at `payload`. `Ok(None)` means the input held nothing
    /// decodable.
    fn decode(
        &self,
        payload: &Path,
    ) -> impl Future<Output = Result<Option<String>, DecodeError>> + Send;
}
