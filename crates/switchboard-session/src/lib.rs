//! Session-wide facilities shared by every conversation of one account.
//!
//! A conversation never talks to a UI or a database directly. Instead it
//! publishes to three collaborators owned by the session:
//!
//! 1. **Events** ([`SessionEvent`], [`EventSink`]): what happened in a
//!    conversation, for whoever drives the UI.
//! 2. **Activity recording** ([`Recorder`], [`RecordStore`],
//!    [`JsonLinesStore`]): message traffic, appended to a store off the
//!    async runtime.
//! 3. **Peer session registry** ([`PeerRegistry`]): which conversations
//!    carry peer-to-peer traffic, and the route into each of them.
//!
//! # How it fits in the stack
//!
//! ```text
//! Conversation Layer (above)  ← emits events, records, registers routes
//!     ↕
//! Session Layer (this crate)  ← fans those out to the application
//!     ↕
//! Protocol Layer (below)      ← provides ConversationId, ChatMessage
//! ```

mod error;
mod events;
mod recorder;
mod registry;

pub use error::RecorderError;
pub use events::{EventSink, SessionEvent};
pub use recorder::{
    ActivityKind, ActivityRecord, DEFAULT_SYNC_EVERY, JsonLinesStore, Presence,
    RecordStore, Recorder,
};
pub use registry::{PeerInput, PeerPayload, PeerRegistry, PeerRoute};
