//! Wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Client → Server:
//!     [u64 LE length L][L bytes payload]
//!     L == 1 && payload == b"q"  → termination signal
//!
//! Server → Client:
//!     [i32 LE outcome code]
//!     code == SUCCESS            → [u64 LE length M][M bytes UTF-8 text]
//! ```
//!
//! # Design Decisions
//! - Byte order is fixed to little-endian instead of host order
//! - Every read loops until the declared length is satisfied
//! - A clean close is only reported before the first byte of a request

pub mod codec;
pub mod outcome;

pub use codec::{
    read_request, read_response, write_image, write_quit, write_response, CodecError,
    ImageHeader, Request, Response,
};
pub use outcome::OutcomeCode;
