//! Conversation actor: one Tokio task per conversation.
//!
//! The actor owns its [`Conversation`] outright. The outside world talks to
//! it through a [`ConversationHandle`], which just wraps the sending half
//! of the actor's command channel. No locks, no shared mutable state.
//!
//! ```text
//!  ConversationHandle ──ConversationCommand──┐
//!  CommandChannel     ──Inbound─────────────┤──▶ actor loop ──▶ Conversation
//!  PeerRegistry       ──PeerPayload─────────┘
//! ```
//!
//! Each source is handled in the order it was produced. The queues are
//! unbounded, so no command is ever dropped for lack of space.

use std::sync::Arc;

use switchboard_protocol::{ChatMessage, CommandChannel, ConversationId};
use switchboard_transport::Connector;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{Conversation, ConversationError, ConversationInfo};

/// Requests a [`ConversationHandle`] sends to its actor.
#[derive(Debug)]
pub(crate) enum ConversationCommand {
    /// Send (or queue) a chat message.
    Send(ChatMessage),
    /// Invite a contact.
    Invite(String),
    /// Answer the invitation this conversation was created for.
    Answer,
    /// Present ourselves to the switchboard.
    SendPresentation,
    /// Drop the current transport and connect to a new switchboard.
    Reconnect {
        host: String,
        port: u16,
        session_id: String,
    },
    /// Reply with a snapshot.
    Info { reply: oneshot::Sender<ConversationInfo> },
    /// Close and stop the actor.
    Quit,
}

// ---------------------------------------------------------------------------
// ConversationHandle
// ---------------------------------------------------------------------------

/// Handle to a running conversation actor.
///
/// Cheap to clone. Every method except [`info`](Self::info) is
/// fire-and-forget: it only fails if the actor has already stopped.
#[derive(Debug, Clone)]
pub struct ConversationHandle {
    cid: ConversationId,
    sender: mpsc::UnboundedSender<ConversationCommand>,
}

impl ConversationHandle {
    /// The conversation's id.
    pub fn cid(&self) -> ConversationId {
        self.cid
    }

    /// Returns `true` once the actor has stopped.
    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }

    /// Sends `message`, or queues it until someone has joined.
    pub fn send_message(&self, message: ChatMessage) -> Result<(), ConversationError> {
        self.submit(ConversationCommand::Send(message))
    }

    /// Invites `account` into the conversation.
    pub fn invite(&self, account: impl Into<String>) -> Result<(), ConversationError> {
        self.submit(ConversationCommand::Invite(account.into()))
    }

    /// Answers the invitation the conversation was created for.
    pub fn answer(&self) -> Result<(), ConversationError> {
        self.submit(ConversationCommand::Answer)
    }

    /// Sends our presentation (`USR`).
    pub fn send_presentation(&self) -> Result<(), ConversationError> {
        self.submit(ConversationCommand::SendPresentation)
    }

    /// Moves the conversation to the switchboard at `host:port`.
    pub fn reconnect(
        &self,
        host: impl Into<String>,
        port: u16,
        session_id: impl Into<String>,
    ) -> Result<(), ConversationError> {
        self.submit(ConversationCommand::Reconnect {
            host: host.into(),
            port,
            session_id: session_id.into(),
        })
    }

    /// Requests a snapshot of the conversation.
    pub async fn info(&self) -> Result<ConversationInfo, ConversationError> {
        let (reply, rx) = oneshot::channel();
        self.submit(ConversationCommand::Info { reply })?;
        rx.await.map_err(|_| ConversationError::Unavailable(self.cid))
    }

    /// Closes the conversation and stops the actor.
    pub fn quit(&self) -> Result<(), ConversationError> {
        self.submit(ConversationCommand::Quit)
    }

    fn submit(&self, command: ConversationCommand) -> Result<(), ConversationError> {
        self.sender
            .send(command)
            .map_err(|_| ConversationError::Unavailable(self.cid))
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// The task-side state: the conversation plus what it needs to reconnect.
struct ConversationActor<K: Connector> {
    conversation: Conversation,
    connector: Arc<K>,
    commands: mpsc::UnboundedReceiver<ConversationCommand>,
}

impl<K: Connector> ConversationActor<K> {
    /// Runs until [`ConversationCommand::Quit`] or until every handle is
    /// dropped. A closed conversation keeps running so it can reconnect.
    async fn run(mut self) {
        let cid = self.conversation.cid();
        tracing::info!(%cid, "conversation actor started");

        loop {
            tokio::select! {
                input = self.conversation.next_input() => {
                    self.conversation.handle_input(input);
                }
                command = self.commands.recv() => match command {
                    Some(ConversationCommand::Quit) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
            }
        }

        self.conversation.close();
        tracing::info!(%cid, "conversation actor stopped");
    }

    async fn handle_command(&mut self, command: ConversationCommand) {
        let cid = self.conversation.cid();
        let result = match command {
            ConversationCommand::Send(message) => self.conversation.send(message),
            ConversationCommand::Invite(account) => self.conversation.invite(&account),
            ConversationCommand::Answer => self.conversation.answer(),
            ConversationCommand::SendPresentation => self.conversation.send_presentation(),
            ConversationCommand::Reconnect {
                host,
                port,
                session_id,
            } => self.reconnect(host, port, session_id).await,
            ConversationCommand::Info { reply } => {
                let _ = reply.send(self.conversation.info());
                Ok(())
            }
            // Handled by the loop.
            ConversationCommand::Quit => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!(%cid, error = %e, "conversation command failed");
        }
    }

    async fn reconnect(
        &mut self,
        host: String,
        port: u16,
        session_id: String,
    ) -> Result<(), ConversationError> {
        tracing::info!(cid = %self.conversation.cid(), %host, port, "reconnecting");
        self.conversation.release();

        match self.connector.connect(&host, port).await {
            Ok(conn) => {
                let channel = CommandChannel::open(conn);
                self.conversation.reconnected(channel, host, port, session_id)
            }
            Err(e) => {
                let error = ConversationError::Connect {
                    addr: format!("{host}:{port}"),
                    source: Box::new(e),
                };
                self.conversation.connect_failed(&error);
                Ok(())
            }
        }
    }
}

/// Spawns an actor for `conversation` and returns its handle and task.
///
/// Must be called from inside a Tokio runtime.
pub fn spawn_conversation<K: Connector>(
    conversation: Conversation,
    connector: Arc<K>,
) -> (ConversationHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cid = conversation.cid();

    let actor = ConversationActor {
        conversation,
        connector,
        commands: rx,
    };
    let task = tokio::spawn(actor.run());

    (ConversationHandle { cid, sender: tx }, task)
}
