//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop)
//!     → connection.rs (session id, peer identity)
//!     → Hand off to a session task
//! ```

pub mod connection;
pub mod listener;

pub use connection::{PeerIdentity, SessionId};
pub use listener::{Listener, ListenerError};
