//! Conversation parameters and lifecycle status.

use std::fmt;

use serde::{Deserialize, Serialize};
use switchboard_protocol::ConversationId;
use switchboard_session::Presence;

// ---------------------------------------------------------------------------
// ConversationParams
// ---------------------------------------------------------------------------

/// Everything a conversation needs to know about itself at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationParams {
    /// Assigned by the owning session, never changed.
    pub cid: ConversationId,

    /// Switchboard server address.
    pub host: String,
    pub port: u16,

    /// Our own account.
    pub account: String,

    /// Switchboard session id, sent with `USR` and `ANS`.
    pub session_id: String,

    /// Token the server handed us with an incoming invitation. Only
    /// needed to `ANS`wer it.
    pub auth_token: Option<String>,

    /// Presence written into records of messages we send.
    pub presence: Presence,
}

impl ConversationParams {
    /// Parameters for a conversation on `host:port` as `account`.
    pub fn new(
        cid: ConversationId,
        host: impl Into<String>,
        port: u16,
        account: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            cid,
            host: host.into(),
            port,
            account: account.into(),
            session_id: session_id.into(),
            auth_token: None,
            presence: Presence::default(),
        }
    }

    /// Sets the auth token for answering an invitation.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Sets the presence recorded for sent messages.
    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }
}

// ---------------------------------------------------------------------------
// ConversationStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a conversation.
///
/// ```text
/// Pending → Connected → Established → Closed
///              ▲                        │
///              └──────── reconnect ─────┘   (failed reconnect → Error)
/// ```
///
/// - **Pending**: created, no transport yet.
/// - **Connected**: transport open, presentation not yet accepted.
///   Invitations are queued.
/// - **Established**: the server accepted our `USR` or `ANS`.
///   Invitations go straight out.
/// - **Closed**: the transport was released (last member left, the
///   connection dropped, or the conversation was closed).
/// - **Error**: a reconnect could not reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationStatus {
    Pending,
    Connected,
    Established,
    Closed,
    Error,
}

impl ConversationStatus {
    /// Returns `true` if a transport is open.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Connected | Self::Established)
    }

    /// Returns `true` if the conversation has no transport and won't get
    /// one without a reconnect.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Connected => write!(f, "Connected"),
            Self::Established => write!(f, "Established"),
            Self::Closed => write!(f, "Closed"),
            Self::Error => write!(f, "Error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_open() {
        assert!(!ConversationStatus::Pending.is_open());
        assert!(ConversationStatus::Connected.is_open());
        assert!(ConversationStatus::Established.is_open());
        assert!(!ConversationStatus::Closed.is_open());
        assert!(!ConversationStatus::Error.is_open());
    }

    #[test]
    fn test_status_is_finished() {
        assert!(ConversationStatus::Closed.is_finished());
        assert!(ConversationStatus::Error.is_finished());
        assert!(!ConversationStatus::Established.is_finished());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConversationStatus::Established.to_string(), "Established");
    }

    #[test]
    fn test_params_builder_defaults() {
        let params = ConversationParams::new(ConversationId(1), "10.0.0.1", 1863, "me@example.com", "s1");
        assert_eq!(params.auth_token, None);
        assert_eq!(params.presence, Presence::Online);

        let params = params.with_auth_token("tok").with_presence(Presence::Away);
        assert_eq!(params.auth_token.as_deref(), Some("tok"));
        assert_eq!(params.presence, Presence::Away);
    }
}
