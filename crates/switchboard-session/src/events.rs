//! Conversation events and the sink they are published to.
//!
//! Events are the only thing a conversation tells the outside world about
//! its state. They are plain data (serializable with serde) so the
//! application can forward them to a UI thread, a log, or over a socket.

use serde::{Deserialize, Serialize};
use switchboard_protocol::{ChatMessage, ConversationId};
use tokio::sync::mpsc;

/// Something that happened in a conversation.
///
/// Serialized as an internally tagged object:
///
/// ```json
/// { "type": "contact_joined", "cid": 42, "account": "bob@example.com" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The conversation is ready to chat. Emitted once per conversation.
    ConversationStarted { cid: ConversationId },

    /// A third participant arrived: this is now a group chat.
    GroupStarted { cid: ConversationId },

    /// Participants dropped back to two: no longer a group chat.
    GroupEnded { cid: ConversationId },

    /// `account` joined.
    ContactJoined { cid: ConversationId, account: String },

    /// `account` left.
    ContactLeft { cid: ConversationId, account: String },

    /// The first text or nudge arrived, with the members present at the
    /// time. Lets the UI open a window only once there's something to show.
    FirstAction {
        cid: ConversationId,
        members: Vec<String>,
    },

    /// A text, typing notification or nudge from `account`.
    MessageReceived {
        cid: ConversationId,
        account: String,
        message: ChatMessage,
    },

    /// The server acknowledged a sent message.
    MessageSendSucceeded {
        cid: ConversationId,
        message: ChatMessage,
    },

    /// The server refused a sent message.
    MessageSendFailed {
        cid: ConversationId,
        message: ChatMessage,
    },

    /// The conversation lost (or released) its connection.
    ConversationClosed { cid: ConversationId },
}

impl SessionEvent {
    /// The conversation this event belongs to.
    pub fn cid(&self) -> ConversationId {
        match self {
            Self::ConversationStarted { cid }
            | Self::GroupStarted { cid }
            | Self::GroupEnded { cid }
            | Self::ContactJoined { cid, .. }
            | Self::ContactLeft { cid, .. }
            | Self::FirstAction { cid, .. }
            | Self::MessageReceived { cid, .. }
            | Self::MessageSendSucceeded { cid, .. }
            | Self::MessageSendFailed { cid, .. }
            | Self::ConversationClosed { cid } => *cid,
        }
    }
}

/// Receives events from conversations.
///
/// `emit` is synchronous and must not block: it is called from inside a
/// conversation's event loop.
pub trait EventSink: Send + Sync + 'static {
    /// Publishes one event.
    fn emit(&self, event: SessionEvent);
}

impl EventSink for mpsc::UnboundedSender<SessionEvent> {
    fn emit(&self, event: SessionEvent) {
        if let Err(mpsc::error::SendError(event)) = self.send(event) {
            tracing::debug!(cid = %event.cid(), "event dropped, no receiver");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = SessionEvent::ContactJoined {
            cid: ConversationId(42),
            account: "bob@example.com".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "contact_joined",
                "cid": 42,
                "account": "bob@example.com",
            })
        );
    }

    #[test]
    fn test_event_deserializes_from_tagged_object() {
        let event: SessionEvent =
            serde_json::from_str(r#"{"type":"group_ended","cid":3}"#).unwrap();
        assert_eq!(event, SessionEvent::GroupEnded { cid: ConversationId(3) });
    }

    #[test]
    fn test_cid_returns_owning_conversation() {
        let event = SessionEvent::FirstAction {
            cid: ConversationId(9),
            members: vec![],
        };
        assert_eq!(event.cid(), ConversationId(9));
    }

    #[test]
    fn test_unbounded_sender_sink_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.emit(SessionEvent::ConversationClosed { cid: ConversationId(1) });
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::ConversationClosed { cid: ConversationId(1) }
        );
    }

    #[test]
    fn test_unbounded_sender_sink_without_receiver_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel::<SessionEvent>();
        drop(rx);
        tx.emit(SessionEvent::GroupStarted { cid: ConversationId(1) });
    }
}
