//! Switchboard wire protocol.
//!
//! This crate defines the "language" a client speaks with a switchboard
//! server, and the pipe it speaks it over:
//!
//! - **Types** ([`Verb`], [`ProtocolMessage`], [`Command`],
//!   [`TransactionId`], [`ConversationId`]): decoded protocol lines.
//! - **Codec** ([`Codec`] trait, [`SwitchboardCodec`]): CRLF line framing
//!   with length-prefixed payloads.
//! - **Chat messages** ([`ChatMessage`], [`MessageKind`], [`AckMode`]):
//!   the MIME documents carried by `MSG`.
//! - **Command channel** ([`CommandChannel`], [`Inbound`]): a framed
//!   full-duplex pipe over one transport connection.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (ProtocolMessage) → Conversation (state)
//! ```
//!
//! Nothing here knows about members, acknowledgements or events. That is
//! the conversation layer's job.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod channel;
mod codec;
mod error;
mod message;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use channel::{ChannelPeer, CommandChannel, Inbound};
pub use codec::{Codec, MAX_LINE_LEN, MAX_PAYLOAD_LEN, SwitchboardCodec};
pub use error::ProtocolError;
pub use message::{AckMode, ChatMessage, MessageKind};
pub use types::{Command, ConversationId, ProtocolMessage, TransactionId, Verb};
