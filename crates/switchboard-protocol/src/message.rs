//! Chat messages: the MIME documents carried inside `MSG` payloads.
//!
//! Every `MSG` payload is a small MIME document. The `Content-Type` header
//! decides what kind of chat traffic it is:
//!
//! | Kind | Content-Type | Extra header | Body |
//! |------|--------------|--------------|------|
//! | Text | `text/plain; charset=UTF-8` | | the text |
//! | Typing | `text/x-msmsgscontrol` | `TypingUser` | empty |
//! | Nudge | `text/x-msnmsgr-datacast` | | `ID: 1` |
//! | P2P | `application/x-msnmsgrp2p` | `P2P-Dest` | binary |
//!
//! The kind also decides which recipient marker ([`AckMode`]) a send uses,
//! and therefore whether the server will acknowledge it.

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, ProtocolMessage, Verb};

const MIME_VERSION: &str = "MIME-Version: 1.0";
const TEXT_TYPE: &str = "text/plain";
const TYPING_TYPE: &str = "text/x-msmsgscontrol";
const DATACAST_TYPE: &str = "text/x-msnmsgr-datacast";
const P2P_TYPE: &str = "application/x-msnmsgrp2p";
const NUDGE_BODY: &str = "ID: 1";

// ---------------------------------------------------------------------------
// MessageKind / AckMode
// ---------------------------------------------------------------------------

/// What a chat message is, decided by its content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A plain text message typed by a user.
    Text,
    /// "User is typing" notification.
    Typing,
    /// A nudge (shakes the peer's window).
    Nudge,
    /// Peer-to-peer side channel data (file transfers, display pictures).
    P2p,
    /// Any other content type, kept verbatim.
    Unknown(String),
}

/// Recipient marker of an outbound `MSG`, which selects the
/// acknowledgement the server sends back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckMode {
    /// `U`: no acknowledgement at all.
    Unacknowledged,
    /// `N`: only failures are reported (`NAK`).
    NakOnly,
    /// `A`: both `ACK` and `NAK`.
    Full,
    /// `D`: data message, acknowledged like `A`, used for P2P traffic.
    Data,
}

impl AckMode {
    /// The single-letter marker placed after `MSG <tid>`.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Unacknowledged => "U",
            Self::NakOnly => "N",
            Self::Full => "A",
            Self::Data => "D",
        }
    }

    /// Returns `true` if a send with this marker goes into the pending
    /// map to wait for its `ACK`/`NAK`.
    pub fn is_tracked(self) -> bool {
        matches!(self, Self::Full)
    }
}

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

/// One chat message, either received from or about to be sent to the
/// switchboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub kind: MessageKind,
    /// The sender. For outbound messages this is our own account.
    pub account: String,
    /// Raw body bytes (UTF-8 for text, binary for P2P).
    pub body: Vec<u8>,
    /// Destination account of a P2P message.
    pub dest: Option<String>,
}

impl ChatMessage {
    /// A text message.
    pub fn text(account: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            account: account.into(),
            body: body.into().into_bytes(),
            dest: None,
        }
    }

    /// A typing notification from `account`.
    pub fn typing(account: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Typing,
            account: account.into(),
            body: Vec::new(),
            dest: None,
        }
    }

    /// A nudge from `account`.
    pub fn nudge(account: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Nudge,
            account: account.into(),
            body: NUDGE_BODY.as_bytes().to_vec(),
            dest: None,
        }
    }

    /// A P2P data message from `account` to `dest`.
    pub fn p2p(
        account: impl Into<String>,
        dest: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            kind: MessageKind::P2p,
            account: account.into(),
            body,
            dest: Some(dest.into()),
        }
    }

    /// The body as text, replacing invalid UTF-8.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Which recipient marker a send of this message uses.
    pub fn ack_mode(&self) -> AckMode {
        match self.kind {
            MessageKind::Text | MessageKind::Nudge => AckMode::Full,
            MessageKind::Typing => AckMode::Unacknowledged,
            MessageKind::P2p => AckMode::Data,
            MessageKind::Unknown(_) => AckMode::NakOnly,
        }
    }

    /// Serializes the message into a `MSG` payload.
    pub fn format(&self) -> Vec<u8> {
        let mut head = String::from(MIME_VERSION);
        head.push_str("\r\n");

        match &self.kind {
            MessageKind::Text => {
                head.push_str("Content-Type: text/plain; charset=UTF-8\r\n");
            }
            MessageKind::Typing => {
                head.push_str(&format!(
                    "Content-Type: {TYPING_TYPE}\r\nTypingUser: {}\r\n",
                    self.account
                ));
            }
            MessageKind::Nudge => {
                head.push_str(&format!("Content-Type: {DATACAST_TYPE}\r\n"));
            }
            MessageKind::P2p => {
                head.push_str(&format!("Content-Type: {P2P_TYPE}\r\n"));
                if let Some(dest) = &self.dest {
                    head.push_str(&format!("P2P-Dest: {dest}\r\n"));
                }
            }
            MessageKind::Unknown(content_type) => {
                head.push_str(&format!("Content-Type: {content_type}\r\n"));
            }
        }
        head.push_str("\r\n");

        let mut payload = head.into_bytes();
        payload.extend_from_slice(&self.body);
        payload
    }

    /// Parses an inbound `MSG` into a chat message.
    ///
    /// The sender account is the `MSG` line's second field.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if `msg` is not a `MSG`,
    /// has no payload, or the payload has no header/body separator.
    pub fn parse(msg: &ProtocolMessage) -> Result<Self, ProtocolError> {
        if msg.verb != Verb::Msg {
            return Err(ProtocolError::InvalidMessage(format!(
                "expected MSG, got {}",
                msg.verb
            )));
        }
        let payload = msg.payload.as_deref().ok_or_else(|| {
            ProtocolError::InvalidMessage("MSG without payload".into())
        })?;

        let split = payload
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .ok_or_else(|| {
                ProtocolError::InvalidMessage(
                    "MSG payload has no header terminator".into(),
                )
            })?;
        let head = String::from_utf8_lossy(&payload[..split]);
        let body = payload[split + 4..].to_vec();

        let header = |name: &str| {
            head.split("\r\n").find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case(name)
                    .then(|| value.trim().to_string())
            })
        };

        let content_type = header("Content-Type").unwrap_or_default();
        let base_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        let kind = match base_type.as_str() {
            TEXT_TYPE => MessageKind::Text,
            TYPING_TYPE => MessageKind::Typing,
            DATACAST_TYPE
                if String::from_utf8_lossy(&body).trim() == NUDGE_BODY =>
            {
                MessageKind::Nudge
            }
            P2P_TYPE => MessageKind::P2p,
            _ => MessageKind::Unknown(content_type.clone()),
        };

        Ok(Self {
            kind,
            account: msg.tid.clone(),
            body,
            dest: header("P2P-Dest"),
        })
    }
}
