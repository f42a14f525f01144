//! Conversation manager: creates, tracks, and tears down conversations.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use switchboard_protocol::{CommandChannel, ConversationId};
use switchboard_session::{EventSink, PeerRegistry, Presence, Recorder};
use switchboard_transport::Connector;
use tokio::task::JoinHandle;

use crate::actor::spawn_conversation;
use crate::{Conversation, ConversationError, ConversationHandle, ConversationInfo, ConversationParams};

/// A tracked conversation: its handle plus the task running it.
struct Entry {
    handle: ConversationHandle,
    task: JoinHandle<()>,
}

/// Owns every conversation of one account.
///
/// This is the entry point for conversation operations from higher
/// layers. It hands out [`ConversationHandle`]s and guarantees each
/// [`ConversationId`] is unique among the conversations it tracks.
pub struct ConversationManager<K: Connector> {
    account: String,
    presence: Presence,
    connector: Arc<K>,
    events: Arc<dyn EventSink>,
    recorder: Recorder,
    registry: PeerRegistry,
    conversations: HashMap<ConversationId, Entry>,
}

impl<K: Connector> ConversationManager<K> {
    /// Creates an empty manager for `account`.
    pub fn new(
        account: impl Into<String>,
        connector: K,
        events: Arc<dyn EventSink>,
        recorder: Recorder,
        registry: PeerRegistry,
    ) -> Self {
        Self {
            account: account.into(),
            presence: Presence::default(),
            connector: Arc::new(connector),
            events,
            recorder,
            registry,
            conversations: HashMap::new(),
        }
    }

    /// Sets the presence recorded for messages sent from now on.
    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }

    /// Starts an outbound conversation with `invitee`.
    ///
    /// Connects to the switchboard the notification server assigned,
    /// presents ourselves, and queues the invitation until the
    /// presentation is accepted.
    ///
    /// # Errors
    /// [`ConversationError::Connect`] if the switchboard can't be reached.
    pub async fn open(
        &mut self,
        host: &str,
        port: u16,
        session_id: &str,
        invitee: &str,
    ) -> Result<ConversationHandle, ConversationError> {
        let params = self.params(host, port, session_id);
        let mut conversation = self.connect(params).await?;
        conversation.send_presentation()?;
        conversation.invite(invitee)?;
        Ok(self.track(conversation))
    }

    /// Joins a conversation we were invited to.
    ///
    /// # Errors
    /// [`ConversationError::Connect`] if the switchboard can't be reached.
    pub async fn accept(
        &mut self,
        host: &str,
        port: u16,
        session_id: &str,
        auth_token: &str,
    ) -> Result<ConversationHandle, ConversationError> {
        let params = self
            .params(host, port, session_id)
            .with_auth_token(auth_token);
        let mut conversation = self.connect(params).await?;
        conversation.answer()?;
        Ok(self.track(conversation))
    }

    /// Looks up a conversation's handle.
    pub fn get(&self, cid: ConversationId) -> Option<ConversationHandle> {
        self.conversations.get(&cid).map(|e| e.handle.clone())
    }

    /// Requests a snapshot of one conversation.
    ///
    /// # Errors
    /// [`ConversationError::NotFound`] for an unknown id.
    pub async fn info(&self, cid: ConversationId) -> Result<ConversationInfo, ConversationError> {
        let entry = self
            .conversations
            .get(&cid)
            .ok_or(ConversationError::NotFound(cid))?;
        entry.handle.info().await
    }

    /// Closes a conversation and stops tracking it.
    ///
    /// # Errors
    /// [`ConversationError::NotFound`] for an unknown id.
    pub fn close(&mut self, cid: ConversationId) -> Result<(), ConversationError> {
        let entry = self
            .conversations
            .remove(&cid)
            .ok_or(ConversationError::NotFound(cid))?;
        // An actor that already stopped has nothing left to close.
        let _ = entry.handle.quit();
        tracing::info!(%cid, "conversation removed");
        Ok(())
    }

    /// Closes every conversation.
    pub fn close_all(&mut self) {
        for (cid, entry) in self.conversations.drain() {
            let _ = entry.handle.quit();
            tracing::debug!(%cid, "conversation removed");
        }
    }

    /// Forgets conversations whose actor has stopped. Returns their ids.
    pub fn prune(&mut self) -> Vec<ConversationId> {
        let finished: Vec<ConversationId> = self
            .conversations
            .iter()
            .filter(|(_, e)| e.task.is_finished())
            .map(|(cid, _)| *cid)
            .collect();
        for cid in &finished {
            self.conversations.remove(cid);
        }
        finished
    }

    /// Number of tracked conversations.
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Returns `true` if no conversation is tracked.
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Ids of every tracked conversation.
    pub fn ids(&self) -> Vec<ConversationId> {
        self.conversations.keys().copied().collect()
    }

    /// The shared peer registry.
    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    fn params(&self, host: &str, port: u16, session_id: &str) -> ConversationParams {
        ConversationParams::new(self.next_cid(), host, port, self.account.clone(), session_id)
            .with_presence(self.presence)
    }

    /// Connects and builds a conversation on the new channel.
    async fn connect(&self, params: ConversationParams) -> Result<Conversation, ConversationError> {
        let conn = self
            .connector
            .connect(&params.host, params.port)
            .await
            .map_err(|e| ConversationError::Connect {
                addr: format!("{}:{}", params.host, params.port),
                source: Box::new(e),
            })?;

        let mut conversation = Conversation::new(
            params,
            self.events.clone(),
            self.recorder.clone(),
            self.registry.clone(),
        );
        conversation.attach(CommandChannel::open(conn));
        Ok(conversation)
    }

    fn track(&mut self, conversation: Conversation) -> ConversationHandle {
        let cid = conversation.cid();
        let (handle, task) = spawn_conversation(conversation, self.connector.clone());
        self.conversations.insert(
            cid,
            Entry {
                handle: handle.clone(),
                task,
            },
        );
        tracing::info!(%cid, total = self.conversations.len(), "conversation created");
        handle
    }

    /// Picks a random id not used by any tracked conversation.
    fn next_cid(&self) -> ConversationId {
        let mut rng = rand::rng();
        loop {
            let cid = ConversationId(rng.random());
            if !self.conversations.contains_key(&cid) {
                return cid;
            }
        }
    }
}

impl<K: Connector> Drop for ConversationManager<K> {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_session::SessionEvent;
    use switchboard_transport::TcpConnector;
    use tokio::sync::mpsc;

    fn manager() -> (
        ConversationManager<TcpConnector>,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (registry, _input) = PeerRegistry::new();
        let manager = ConversationManager::new(
            "me@example.com",
            TcpConnector,
            Arc::new(events_tx),
            Recorder::disabled(),
            registry,
        );
        (manager, events)
    }

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_next_cid_is_unique_among_tracked() {
        let (manager, _events) = manager();
        let a = manager.next_cid();
        let b = manager.next_cid();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_open_unreachable_switchboard_fails() {
        let (mut manager, _events) = manager();
        let port = closed_port();

        let result = manager.open("127.0.0.1", port, "s1", "bob@example.com").await;

        assert!(matches!(result, Err(ConversationError::Connect { .. })));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_close_unknown_cid_is_not_found() {
        let (mut manager, _events) = manager();
        assert!(matches!(
            manager.close(ConversationId(5)),
            Err(ConversationError::NotFound(_))
        ));
        assert!(matches!(
            manager.info(ConversationId(5)).await,
            Err(ConversationError::NotFound(_))
        ));
    }
}
