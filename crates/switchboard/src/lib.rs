//! # Switchboard
//!
//! Client-side conversation engine for MSN-style switchboard servers.
//!
//! A switchboard is the server that relays one chat between its
//! participants. This crate drives the client side of those chats: it
//! connects, presents or answers, invites, tracks who is in the room,
//! sends messages and matches them with their `ACK`/`NAK`, and routes
//! peer-to-peer payloads to and from a separate P2P layer. Everything it
//! learns is published as [`SessionEvent`](switchboard_session::SessionEvent)s.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use switchboard::prelude::*;
//!
//! # async fn run() -> Result<(), SwitchboardError> {
//! switchboard::init_tracing();
//!
//! let mut session = Session::builder("me@example.com").build()?;
//! let chat = session
//!     .open("127.0.0.1", 1863, "17262740.1050826919.32308", "bob@example.com")
//!     .await?;
//! chat.send_message(ChatMessage::text("me@example.com", "hi bob"))?;
//!
//! while let Some(event) = session.next_event().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod session;

pub use config::{RecorderConfig, SessionConfig};
pub use error::SwitchboardError;
pub use session::{Session, SessionBuilder};

/// Installs a `tracing` subscriber that prints to stderr.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Calling this
/// more than once is harmless: only the first subscriber is installed.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Convenient re-exports for applications.
///
/// ```rust
/// use switchboard::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{RecorderConfig, Session, SessionBuilder, SessionConfig, SwitchboardError};
    pub use switchboard_conversation::{
        ConversationHandle, ConversationInfo, ConversationStatus,
    };
    pub use switchboard_protocol::{ChatMessage, ConversationId, MessageKind};
    pub use switchboard_session::{
        ActivityKind, ActivityRecord, PeerInput, PeerPayload, PeerRegistry, Presence,
        SessionEvent,
    };
    pub use switchboard_transport::{ProxyConfig, TransportConfig};
}
