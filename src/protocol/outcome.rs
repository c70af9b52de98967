//! Outcome codes carried in every server response.

use std::fmt;

use crate::protocol::codec::CodecError;

/// Four-byte signed code that opens every response.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeCode {
    /// Decoded text follows.
    Success = 0,
    /// The request was processed but produced no result.
    Failure = 1,
    /// The session was idle too long and is being closed.
    Timeout = 2,
    /// The identity sent too many requests in the current window.
    RateLimitExceeded = 3,
    /// The server has no free session slot.
    ServerBusy = 4,
}

impl OutcomeCode {
    /// Raw wire value.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeCode::Success => "success",
            OutcomeCode::Failure => "failure",
            OutcomeCode::Timeout => "timeout",
            OutcomeCode::RateLimitExceeded => "rate_limit_exceeded",
            OutcomeCode::ServerBusy => "server_busy",
        }
    }
}

impl TryFrom<i32> for OutcomeCode {
    type Error = CodecError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OutcomeCode::Success),
            1 => Ok(OutcomeCode::Failure),
            2 => Ok(OutcomeCode::Timeout),
            3 => Ok(OutcomeCode::RateLimitExceeded),
            4 => Ok(OutcomeCode::ServerBusy),
            other => Err(CodecError::UnknownOutcome(other)),
        }
    }
}

impl fmt::Display for OutcomeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_are_stable() {
        assert_eq!(OutcomeCode::Success.as_i32(), 0);
        assert_eq!(OutcomeCode::Failure.as_i32(), 1);
        assert_eq!(OutcomeCode::Timeout.as_i32(), 2);
        assert_eq!(OutcomeCode::RateLimitExceeded.as_i32(), 3);
        assert_eq!(OutcomeCode::ServerBusy.as_i32(), 4);
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(matches!(
            OutcomeCode::try_from(7),
            Err(CodecError::UnknownOutcome(7))
        ));
        assert_eq!(OutcomeCode::try_from(3).unwrap(), OutcomeCode::RateLimitExceeded);
    }
}
