//! Core protocol types for the switchboard wire format.
//!
//! Everything here is what travels "on the wire" between a client and a
//! switchboard server, in decoded form:
//!
//! ```text
//! VERB TID PARAM PARAM ...\r\n[payload]
//! ```
//!
//! Inbound lines become [`ProtocolMessage`]s; outbound requests are built
//! as [`Command`]s and framed by the codec together with a
//! [`TransactionId`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifies one conversation within a session.
///
/// Newtype over `u64` so a conversation id can't be confused with a
/// transaction id or any other number. Assigned by the owning session and
/// never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub u64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// Per-channel sequence number that correlates a command with its reply.
///
/// Printed as the bare number, because that is exactly how it appears on
/// the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TransactionId(pub u32);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Verb
// ---------------------------------------------------------------------------

/// The command verb of a protocol line.
///
/// The switchboard speaks a small fixed vocabulary. Anything else the
/// server sends (numeric error codes, newer verbs) decodes to
/// [`Verb::Unknown`] so the dispatcher can log and drop it without the
/// decoder failing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Session setup: `USR` (outbound presentation, inbound `OK`).
    Usr,
    /// Roster announcement for an invitee joining an existing chat.
    Iro,
    /// A participant joined.
    Joi,
    /// Invite (outbound), or the server's `RINGING` reply.
    Cal,
    /// Answer an invitation (outbound), or the server's `OK`.
    Ans,
    /// A participant left.
    Bye,
    /// A chat message. Carries a payload.
    Msg,
    /// Positive acknowledgement of a sent message.
    Ack,
    /// Negative acknowledgement of a sent message.
    Nak,
    /// Anything outside the vocabulary, kept verbatim.
    Unknown(String),
}

impl Verb {
    /// Maps a wire token to a verb. Never fails.
    pub fn parse(token: &str) -> Self {
        match token {
            "USR" => Self::Usr,
            "IRO" => Self::Iro,
            "JOI" => Self::Joi,
            "CAL" => Self::Cal,
            "ANS" => Self::Ans,
            "BYE" => Self::Bye,
            "MSG" => Self::Msg,
            "ACK" => Self::Ack,
            "NAK" => Self::Nak,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The wire token for this verb.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Usr => "USR",
            Self::Iro => "IRO",
            Self::Joi => "JOI",
            Self::Cal => "CAL",
            Self::Ans => "ANS",
            Self::Bye => "BYE",
            Self::Msg => "MSG",
            Self::Ack => "ACK",
            Self::Nak => "NAK",
            Self::Unknown(token) => token,
        }
    }

    /// Returns `true` if lines with this verb end in a payload length and
    /// are followed by that many bytes.
    pub fn carries_payload(&self) -> bool {
        matches!(self, Self::Msg)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ProtocolMessage
// ---------------------------------------------------------------------------

/// A decoded protocol line (plus payload, for payload verbs).
///
/// The second field of every line is kept as a raw string in `tid`: most
/// verbs put a transaction id there, but `JOI`, `BYE` and inbound `MSG`
/// put an account in that slot instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    pub verb: Verb,
    pub tid: String,
    pub params: Vec<String>,
    pub payload: Option<Vec<u8>>,
}

impl ProtocolMessage {
    /// Builds a message without payload.
    pub fn new<I, S>(verb: Verb, tid: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            verb,
            tid: tid.into(),
            params: params.into_iter().map(Into::into).collect(),
            payload: None,
        }
    }

    /// Attaches a payload.
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Returns parameter `index`, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Returns parameter `index` or a [`ProtocolError::MissingParam`].
    pub fn require_param(&self, index: usize) -> Result<&str, ProtocolError> {
        self.param(index).ok_or_else(|| ProtocolError::MissingParam {
            verb: self.verb.to_string(),
            index,
        })
    }

    /// Returns `true` if parameter `index` equals `value`.
    pub fn param_is(&self, index: usize, value: &str) -> bool {
        self.param(index) == Some(value)
    }

    /// Parses the transaction token as a [`TransactionId`].
    pub fn transaction_id(&self) -> Result<TransactionId, ProtocolError> {
        self.tid
            .parse()
            .map(TransactionId)
            .map_err(|_| ProtocolError::BadTransactionId(self.tid.clone()))
    }
}

impl fmt::Display for ProtocolMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb, self.tid)?;
        for param in &self.params {
            write!(f, " {param}")?;
        }
        if let Some(payload) = &self.payload {
            write!(f, " [{} bytes]", payload.len())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// An outbound command, before the channel assigns it a transaction id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: Verb,
    pub params: Vec<String>,
    pub payload: Option<Vec<u8>>,
}

impl Command {
    /// `CAL <account>`: invite a contact into the conversation.
    pub fn invite(account: &str) -> Self {
        Self {
            verb: Verb::Cal,
            params: vec![account.to_string()],
            payload: None,
        }
    }

    /// `ANS <account> <auth> <session>`: accept an invitation.
    pub fn answer(account: &str, auth_token: &str, session_id: &str) -> Self {
        Self {
            verb: Verb::Ans,
            params: vec![
                account.to_string(),
                auth_token.to_string(),
                session_id.to_string(),
            ],
            payload: None,
        }
    }

    /// `USR <account> <session>`: present ourselves to the switchboard.
    pub fn presentation(account: &str, session_id: &str) -> Self {
        Self {
            verb: Verb::Usr,
            params: vec![account.to_string(), session_id.to_string()],
            payload: None,
        }
    }

    /// `MSG <marker>` plus payload. The codec appends the length.
    pub fn message(marker: &str, payload: Vec<u8>) -> Self {
        Self {
            verb: Verb::Msg,
            params: vec![marker.to_string()],
            payload: Some(payload),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&ConversationId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_conversation_id_display() {
        assert_eq!(ConversationId(7).to_string(), "C-7");
    }

    #[test]
    fn test_transaction_id_display_is_wire_number() {
        assert_eq!(TransactionId(12).to_string(), "12");
    }

    #[test]
    fn test_verb_parse_known_tokens() {
        for (token, verb) in [
            ("USR", Verb::Usr),
            ("IRO", Verb::Iro),
            ("JOI", Verb::Joi),
            ("ANS", Verb::Ans),
            ("BYE", Verb::Bye),
            ("MSG", Verb::Msg),
            ("ACK", Verb::Ack),
            ("NAK", Verb::Nak),
        ] {
            assert_eq!(Verb::parse(token), verb);
            assert_eq!(verb.as_str(), token);
        }
    }

    #[test]
    fn test_verb_parse_unknown_is_kept_verbatim() {
        let verb = Verb::parse("217");
        assert_eq!(verb, Verb::Unknown("217".into()));
        assert_eq!(verb.to_string(), "217");
    }

    #[test]
    fn test_only_msg_carries_payload() {
        assert!(Verb::Msg.carries_payload());
        assert!(!Verb::Joi.carries_payload());
        assert!(!Verb::Unknown("UBX".into()).carries_payload());
    }

    #[test]
    fn test_param_is_and_require_param() {
        let msg = ProtocolMessage::new(Verb::Usr, "1", ["OK", "alice@example.com"]);
        assert!(msg.param_is(0, "OK"));
        assert!(!msg.param_is(1, "OK"));
        assert!(!msg.param_is(5, "OK"));
        assert_eq!(msg.require_param(1).unwrap(), "alice@example.com");
        assert!(matches!(
            msg.require_param(4),
            Err(ProtocolError::MissingParam { index: 4, .. })
        ));
    }

    #[test]
    fn test_transaction_id_parses_numeric_token() {
        let msg = ProtocolMessage::new(Verb::Ack, "9", Vec::<String>::new());
        assert_eq!(msg.transaction_id().unwrap(), TransactionId(9));
    }

    #[test]
    fn test_transaction_id_rejects_account_token() {
        let msg = ProtocolMessage::new(Verb::Ack, "bob@example.com", Vec::<String>::new());
        assert!(matches!(
            msg.transaction_id(),
            Err(ProtocolError::BadTransactionId(_))
        ));
    }

    #[test]
    fn test_command_constructors_place_params_in_wire_order() {
        let ans = Command::answer("me@example.com", "auth", "sess");
        assert_eq!(ans.verb, Verb::Ans);
        assert_eq!(ans.params, vec!["me@example.com", "auth", "sess"]);

        let usr = Command::presentation("me@example.com", "sess");
        assert_eq!(usr.params, vec!["me@example.com", "sess"]);

        let cal = Command::invite("bob@example.com");
        assert_eq!(cal.params, vec!["bob@example.com"]);
    }

    #[test]
    fn test_protocol_message_display() {
        let msg = ProtocolMessage::new(Verb::Msg, "bob@example.com", ["Bob"])
            .with_payload(b"hello".to_vec());
        assert_eq!(msg.to_string(), "MSG bob@example.com Bob [5 bytes]");
    }
}
