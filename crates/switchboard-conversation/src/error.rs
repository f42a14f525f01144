//! Error types for the conversation layer.

use switchboard_protocol::{ConversationId, ProtocolError};

/// Errors that can occur during conversation operations.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    /// Framing or channel failure while sending a command.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The switchboard could not be reached.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The conversation has no transport right now (closed or released).
    #[error("conversation {0} is not connected")]
    NotConnected(ConversationId),

    /// Answering an invitation needs the auth token the server sent with it.
    #[error("conversation {0} has no auth token to answer with")]
    MissingAuthToken(ConversationId),

    /// No conversation with this id is being tracked.
    #[error("conversation {0} not found")]
    NotFound(ConversationId),

    /// The conversation's actor has stopped.
    #[error("conversation {0} is unavailable")]
    Unavailable(ConversationId),
}
