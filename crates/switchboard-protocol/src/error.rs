//! Error types for the protocol layer.
//!
//! Each crate in the workspace defines its own error enum. A
//! `ProtocolError` always means a problem turning bytes into commands (or
//! back), never a networking or conversation-state problem.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Bytes could not be decoded into a message (bad UTF-8, bad length
    /// field). The offending line is skipped.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The inbound stream lost its framing (oversized line or payload).
    /// Nothing after this point can be trusted.
    #[error("stream out of sync: {0}")]
    Desync(String),

    /// The message decoded but violates the protocol, e.g. a parameter
    /// containing whitespace, or a verb missing a required field.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A verb arrived without a parameter it must carry.
    #[error("{verb} is missing parameter {index}")]
    MissingParam { verb: String, index: usize },

    /// The transaction token is not a number.
    #[error("bad transaction id {0:?}")]
    BadTransactionId(String),

    /// The command channel's transport is gone.
    #[error("command channel closed")]
    ChannelClosed,
}

impl ProtocolError {
    /// Returns `true` when the connection must be dropped rather than
    /// decoded further.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Desync(_) | Self::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fatal_only_for_lost_framing_and_closed_channel() {
        assert!(ProtocolError::Desync("x".into()).is_fatal());
        assert!(ProtocolError::ChannelClosed.is_fatal());
        assert!(!ProtocolError::Decode("x".into()).is_fatal());
        assert!(!ProtocolError::BadTransactionId("x".into()).is_fatal());
    }
}
