//! Switchboard conversations.
//!
//! This crate is the heart of the engine: one state machine per chat,
//! driven by its own Tokio task.
//!
//! - **[`Conversation`]**: the synchronous state machine. Interprets
//!   inbound protocol messages, tracks members and acknowledgements,
//!   queues what can't be sent yet, and publishes events and records.
//! - **[`ConversationHandle`]**: cloneable handle to a running
//!   conversation actor (see [`spawn_conversation`]).
//! - **[`ConversationManager`]**: creates conversations (outbound with
//!   [`open`](ConversationManager::open), inbound with
//!   [`accept`](ConversationManager::accept)) and tracks them by id.
//!
//! # How it fits in the stack
//!
//! ```text
//! Facade (above)              ← SessionBuilder wires a manager together
//!     ↕
//! Conversation Layer (this)   ← members, acks, queues, reconnects
//!     ↕
//! Session Layer / Protocol    ← events, recorder, registry / command channel
//! ```

mod actor;
mod config;
mod conversation;
mod error;
mod manager;

pub use actor::{ConversationHandle, spawn_conversation};
pub use config::{ConversationParams, ConversationStatus};
pub use conversation::{Conversation, ConversationInfo, Input};
pub use error::ConversationError;
pub use manager::ConversationManager;
