//! `Session` builder and wiring.
//!
//! This is the entry point for running the conversations of one account.
//! It ties together all the layers: transport → protocol → session →
//! conversation.
//!
//! ```text
//!  SessionConfig ──build()──▶ Session
//!                              ├─ ConversationManager<AnyConnector>
//!                              │    └─ one actor per conversation
//!                              ├─ Recorder ──▶ JsonLinesStore (blocking pool)
//!                              ├─ PeerRegistry ──▶ PeerInput receiver
//!                              └─ SessionEvent receiver
//! ```

use std::sync::Arc;

use switchboard_conversation::{
    ConversationHandle, ConversationInfo, ConversationManager,
};
use switchboard_protocol::ConversationId;
use switchboard_session::{
    JsonLinesStore, PeerInput, PeerRegistry, Presence, Recorder, SessionEvent,
};
use switchboard_transport::{AnyConnector, TransportConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{RecorderConfig, SessionConfig, SwitchboardError};

// ---------------------------------------------------------------------------
// SessionBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a [`Session`].
///
/// # Example
///
/// ```rust,ignore
/// use switchboard::prelude::*;
///
/// let mut session = Session::builder("me@example.com")
///     .presence(Presence::Busy)
///     .record_to("activity.jsonl")
///     .build()?;
///
/// let chat = session.open("207.46.108.38", 1863, "17262740.1050826919.32308", "bob@example.com").await?;
/// chat.send_message(ChatMessage::text("me@example.com", "hi"))?;
/// ```
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    /// Creates a builder with default settings for `account`.
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            config: SessionConfig::for_account(account),
        }
    }

    /// Starts from a complete configuration, e.g. one read from a file.
    pub fn from_config(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Sets the presence recorded for sent messages.
    pub fn presence(mut self, presence: Presence) -> Self {
        self.config.presence = presence;
        self
    }

    /// Sets how switchboard servers are reached.
    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.config.transport = transport;
        self
    }

    /// Records message activity to a JSON-lines file at `path`.
    pub fn record_to(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config.recorder.path = Some(path.into());
        self
    }

    /// Builds the session.
    ///
    /// Must be called from inside a Tokio runtime: the recorder worker is
    /// started on the blocking pool.
    ///
    /// # Errors
    /// - [`SwitchboardError::Transport`] if the configured transport is
    ///   not compiled in.
    /// - [`SwitchboardError::Recorder`] if the record file can't be opened.
    pub fn build(self) -> Result<Session, SwitchboardError> {
        let SessionConfig {
            account,
            presence,
            transport,
            recorder,
        } = self.config;

        let connector = AnyConnector::from_config(&transport)?;
        let (recorder, recorder_task) = start_recorder(&recorder)?;
        let (registry, peer_input) = PeerRegistry::new();
        let (events_tx, events) = mpsc::unbounded_channel();

        let manager = ConversationManager::new(
            account.clone(),
            connector,
            Arc::new(events_tx),
            recorder,
            registry,
        )
        .with_presence(presence);

        tracing::info!(
            %account,
            tunnelled = transport.is_tunnelled(),
            recording = recorder_task.is_some(),
            "session ready"
        );

        Ok(Session {
            account,
            manager,
            events,
            peer_input: Some(peer_input),
            recorder_task,
        })
    }
}

/// Opens the configured store, or returns a disabled recorder.
fn start_recorder(
    config: &RecorderConfig,
) -> Result<(Recorder, Option<JoinHandle<()>>), SwitchboardError> {
    let Some(path) = &config.path else {
        return Ok((Recorder::disabled(), None));
    };
    let store = JsonLinesStore::open(path)?.with_sync_every(config.sync_every);
    let (recorder, task) = Recorder::spawn(store);
    tracing::debug!(path = %path.display(), "activity recorder started");
    Ok((recorder, Some(task)))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The conversations of one signed-in account.
///
/// Owns the [`ConversationManager`] and the receiving ends of everything
/// the conversations publish: [`SessionEvent`]s for the UI and
/// [`PeerInput`] for the peer-to-peer layer.
pub struct Session {
    account: String,
    manager: ConversationManager<AnyConnector>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    peer_input: Option<mpsc::UnboundedReceiver<PeerInput>>,
    recorder_task: Option<JoinHandle<()>>,
}

impl Session {
    /// Creates a new builder.
    pub fn builder(account: impl Into<String>) -> SessionBuilder {
        SessionBuilder::new(account)
    }

    /// Our own account.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Starts a conversation with `invitee` on the switchboard the
    /// notification server assigned (`XFR` reply).
    ///
    /// # Errors
    /// [`SwitchboardError::Conversation`] if the switchboard can't be
    /// reached.
    pub async fn open(
        &mut self,
        host: &str,
        port: u16,
        session_id: &str,
        invitee: &str,
    ) -> Result<ConversationHandle, SwitchboardError> {
        Ok(self.manager.open(host, port, session_id, invitee).await?)
    }

    /// Joins a conversation we were invited to (`RNG`).
    ///
    /// # Errors
    /// [`SwitchboardError::Conversation`] if the switchboard can't be
    /// reached.
    pub async fn accept(
        &mut self,
        host: &str,
        port: u16,
        session_id: &str,
        auth_token: &str,
    ) -> Result<ConversationHandle, SwitchboardError> {
        Ok(self
            .manager
            .accept(host, port, session_id, auth_token)
            .await?)
    }

    /// Looks up a conversation's handle.
    pub fn conversation(&self, cid: ConversationId) -> Option<ConversationHandle> {
        self.manager.get(cid)
    }

    /// Ids of every tracked conversation.
    pub fn conversations(&self) -> Vec<ConversationId> {
        self.manager.ids()
    }

    /// Requests a snapshot of one conversation.
    ///
    /// # Errors
    /// [`SwitchboardError::Conversation`] for an unknown id.
    pub async fn info(
        &self,
        cid: ConversationId,
    ) -> Result<ConversationInfo, SwitchboardError> {
        Ok(self.manager.info(cid).await?)
    }

    /// Closes a conversation.
    ///
    /// # Errors
    /// [`SwitchboardError::Conversation`] for an unknown id.
    pub fn close(&mut self, cid: ConversationId) -> Result<(), SwitchboardError> {
        Ok(self.manager.close(cid)?)
    }

    /// Forgets conversations whose actor has stopped.
    pub fn prune(&mut self) -> Vec<ConversationId> {
        self.manager.prune()
    }

    /// Waits for the next event from any conversation.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Returns the next event if one is already waiting.
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// Hands over the peer-registry notifications. Only the first call
    /// returns `Some`.
    pub fn take_peer_input(&mut self) -> Option<mpsc::UnboundedReceiver<PeerInput>> {
        self.peer_input.take()
    }

    /// The shared peer registry, for forwarding payloads into
    /// conversations.
    pub fn registry(&self) -> &PeerRegistry {
        self.manager.registry()
    }

    /// Closes every conversation and waits for the recorder to flush.
    pub async fn shutdown(self) {
        let Session {
            account,
            manager,
            recorder_task,
            ..
        } = self;

        // Dropping the manager quits every actor; each actor drops its
        // recorder clone on the way out, which lets the worker finish.
        drop(manager);
        if let Some(task) = recorder_task {
            if let Err(e) = task.await {
                tracing::warn!(%account, error = %e, "recorder worker failed");
            }
        }
        tracing::info!(%account, "session shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_default_is_unrecorded() {
        let mut session = Session::builder("me@example.com").build().unwrap();

        assert_eq!(session.account(), "me@example.com");
        assert!(session.conversations().is_empty());
        assert!(session.try_next_event().is_none());
        assert!(session.take_peer_input().is_some());
        assert!(session.take_peer_input().is_none());
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_build_unopenable_record_file_fails() {
        let dir = std::env::temp_dir().join(format!("sb-missing-{}", std::process::id()));
        let path = dir.join("nested").join("activity.jsonl");

        let result = Session::builder("me@example.com").record_to(path).build();

        assert!(matches!(result, Err(SwitchboardError::Recorder(_))));
    }

    #[tokio::test]
    async fn test_close_unknown_conversation_fails() {
        let mut session = Session::builder("me@example.com").build().unwrap();
        assert!(matches!(
            session.close(ConversationId(9)),
            Err(SwitchboardError::Conversation(_))
        ));
    }
}
