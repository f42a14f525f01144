//! Unified error type for the switchboard engine.

use switchboard_conversation::ConversationError;
use switchboard_protocol::ProtocolError;
use switchboard_session::RecorderError;
use switchboard_transport::TransportError;

/// Any error the engine can return, one variant per layer.
///
/// Applications built on the facade only handle this type. Each layer's
/// own error converts into it with `?` thanks to the `#[from]` variants.
#[derive(Debug, thiserror::Error)]
pub enum SwitchboardError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A command could not be framed, or a line could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The activity recorder could not be set up.
    #[error(transparent)]
    Recorder(#[from] RecorderError),

    /// A conversation-level error (unreachable switchboard, unknown id).
    #[error(transparent)]
    Conversation(#[from] ConversationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_protocol::ConversationId;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let sb_err: SwitchboardError = err.into();
        assert!(matches!(sb_err, SwitchboardError::Transport(_)));
        assert!(sb_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let sb_err: SwitchboardError = err.into();
        assert!(matches!(sb_err, SwitchboardError::Protocol(_)));
    }

    #[test]
    fn test_from_recorder_error() {
        let err = RecorderError::Rejected("full".into());
        let sb_err: SwitchboardError = err.into();
        assert!(matches!(sb_err, SwitchboardError::Recorder(_)));
    }

    #[test]
    fn test_from_conversation_error() {
        let err = ConversationError::NotFound(ConversationId(1));
        let sb_err: SwitchboardError = err.into();
        assert!(matches!(sb_err, SwitchboardError::Conversation(_)));
    }
}
