//! Session states and termination reasons.

use std::fmt;

use crate::error::SessionError;
use crate::protocol::CodecError;

/// Where a session is in its request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next request, bounded by the idle timeout.
    AwaitingRequest,
    /// Streaming a payload into the staging file.
    ReceivingPayload,
    /// Waiting on the decoder.
    Decoding,
    /// Writing the response.
    Responding,
    /// Terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::AwaitingRequest => "awaiting_request",
            SessionState::ReceivingPayload => "receiving_payload",
            SessionState::Decoding => "decoding",
            SessionState::Responding => "responding",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The client sent the termination signal.
    Quit,
    /// No request within the idle timeout; TIMEOUT was sent.
    Timeout,
    /// No admission slot, or the ceiling was lowered below the live count;
    /// SERVER_BUSY was sent.
    Busy,
    /// The client registry had no room for this identity; SERVER_BUSY was sent.
    RegistryFull,
    /// The peer closed the connection between requests.
    PeerClosed,
    /// Connection or protocol failure.
    Failed(SessionError),
}

impl SessionEnd {
    /// Label used in logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            SessionEnd::Quit => "quit",
            SessionEnd::Timeout => "timeout",
            SessionEnd::Busy => "busy",
            SessionEnd::RegistryFull => "registry_full",
            SessionEnd::PeerClosed => "peer_closed",
            SessionEnd::Failed(SessionError::Connection(_)) => "connection_error",
            SessionEnd::Failed(SessionError::Protocol(_)) => "protocol_violation",
            SessionEnd::Failed(SessionError::Staging(_)) => "staging_error",
        }
    }
}

impl From<SessionError> for SessionEnd {
    fn from(error: SessionError) -> Self {
        SessionEnd::Failed(error)
    }
}

impl From<CodecError> for SessionEnd {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::Closed => SessionEnd::PeerClosed,
            CodecError::Io(e) => SessionEnd::Failed(SessionError::Connection(e)),
            other => SessionEnd::Failed(SessionError::Protocol(other.to_string())),
        }
    }
}

impl From<std::io::Error> for SessionEnd {
    fn from(error: std::io::Error) -> Self {
        SessionEnd::Failed(SessionError::Connection(error))
    }
}
