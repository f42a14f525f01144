//! The conversation state machine.
//!
//! A [`Conversation`] owns everything about one switchboard chat: its
//! command channel, its members, the messages waiting for the chat to
//! become ready, and the sent messages waiting for an `ACK`/`NAK`.
//!
//! It is deliberately synchronous: every handler takes `&mut self`, runs to
//! completion and returns. The only `async` piece is
//! [`next_input`](Conversation::next_input), which waits for the next
//! inbound message or peer payload. The actor in [`crate::actor`] drives a
//! conversation from a Tokio task; tests drive it directly.
//!
//! # Flags
//!
//! - `started`: "conversation started" has been announced. One-way.
//! - `ready`: someone joined on the *current* connection, so messages can
//!   be sent. Reset whenever the transport is released.
//! - `first_action`: the first text or nudge has arrived. One-way.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use switchboard_protocol::{
    ChatMessage, Command, CommandChannel, ConversationId, Inbound, MessageKind,
    ProtocolError, ProtocolMessage, TransactionId, Verb,
};
use switchboard_session::{
    EventSink, PeerPayload, PeerRegistry, PeerRoute, Presence, Recorder, SessionEvent,
};
use tokio::sync::mpsc;

use crate::{ConversationError, ConversationParams, ConversationStatus};

/// One unit of work for [`Conversation::handle_input`].
#[derive(Debug)]
pub enum Input {
    /// Something arrived on the command channel.
    Wire(Inbound),
    /// The peer manager wants a payload sent into this conversation.
    Peer(PeerPayload),
}

/// A point-in-time snapshot of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationInfo {
    pub cid: ConversationId,
    pub status: ConversationStatus,
    pub host: String,
    pub port: u16,
    pub members: Vec<String>,
    pub last_member: Option<String>,
    pub started: bool,
    pub ready: bool,
    pub first_action: bool,
    /// Messages waiting for the conversation to become ready.
    pub queued_messages: usize,
    /// Invitations waiting for the presentation to be accepted.
    pub queued_invites: usize,
    /// Sent messages waiting for an `ACK`/`NAK`.
    pub awaiting_ack: usize,
}

/// State machine for one switchboard conversation.
pub struct Conversation {
    cid: ConversationId,
    host: String,
    port: u16,
    account: String,
    session_id: String,
    auth_token: Option<String>,
    presence: Presence,

    status: ConversationStatus,
    started: bool,
    ready: bool,
    first_action: bool,

    /// Other participants, in join order. Never holds duplicates.
    members: Vec<String>,
    /// Whoever left last when the conversation emptied.
    last_member: Option<String>,

    pending_messages: Vec<ChatMessage>,
    pending_invites: Vec<String>,
    sent_messages: HashMap<TransactionId, ChatMessage>,

    channel: Option<CommandChannel>,

    events: Arc<dyn EventSink>,
    recorder: Recorder,
    registry: PeerRegistry,
    peer_route: PeerRoute,
    peer_input: mpsc::UnboundedReceiver<PeerPayload>,
}

impl Conversation {
    /// Creates a conversation in [`ConversationStatus::Pending`].
    pub fn new(
        params: ConversationParams,
        events: Arc<dyn EventSink>,
        recorder: Recorder,
        registry: PeerRegistry,
    ) -> Self {
        let (peer_route, peer_input) = mpsc::unbounded_channel();
        Self {
            cid: params.cid,
            host: params.host,
            port: params.port,
            account: params.account,
            session_id: params.session_id,
            auth_token: params.auth_token,
            presence: params.presence,
            status: ConversationStatus::Pending,
            started: false,
            ready: false,
            first_action: false,
            members: Vec::new(),
            last_member: None,
            pending_messages: Vec::new(),
            pending_invites: Vec::new(),
            sent_messages: HashMap::new(),
            channel: None,
            events,
            recorder,
            registry,
            peer_route,
            peer_input,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn cid(&self) -> ConversationId {
        self.cid
    }

    pub fn status(&self) -> ConversationStatus {
        self.status
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn last_member(&self) -> Option<&str> {
        self.last_member.as_deref()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn first_action(&self) -> bool {
        self.first_action
    }

    /// Number of sent messages still waiting for an `ACK`/`NAK`.
    pub fn awaiting_ack(&self) -> usize {
        self.sent_messages.len()
    }

    /// Returns a snapshot of the conversation.
    pub fn info(&self) -> ConversationInfo {
        ConversationInfo {
            cid: self.cid,
            status: self.status,
            host: self.host.clone(),
            port: self.port,
            members: self.members.clone(),
            last_member: self.last_member.clone(),
            started: self.started,
            ready: self.ready,
            first_action: self.first_action,
            queued_messages: self.pending_messages.len(),
            queued_invites: self.pending_invites.len(),
            awaiting_ack: self.sent_messages.len(),
        }
    }

    // -----------------------------------------------------------------------
    // Transport lifecycle
    // -----------------------------------------------------------------------

    /// Puts `channel` under this conversation. Status becomes `Connected`
    /// and the conversation waits for a join before sending messages.
    pub fn attach(&mut self, channel: CommandChannel) {
        if let Some(mut old) = self.channel.replace(channel) {
            old.release();
        }
        self.status = ConversationStatus::Connected;
        self.ready = false;
        tracing::info!(cid = %self.cid, host = %self.host, port = self.port, "conversation connected");
    }

    /// Lets go of the transport, if any. Status is left alone.
    pub fn release(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.release();
        }
        self.ready = false;
    }

    /// Resumes on a fresh connection to `host:port`.
    ///
    /// Presents ourselves again, then re-invites: the last member when
    /// nobody is left, otherwise every member (latest first). Members are
    /// re-added as their joins come in.
    ///
    /// # Errors
    /// Returns an error if the presentation or an invitation can't be
    /// written to the new channel.
    pub fn reconnected(
        &mut self,
        channel: CommandChannel,
        host: impl Into<String>,
        port: u16,
        session_id: impl Into<String>,
    ) -> Result<(), ConversationError> {
        self.host = host.into();
        self.port = port;
        self.session_id = session_id.into();
        self.attach(channel);
        self.send_presentation()?;

        if self.members.is_empty() {
            if let Some(account) = self.last_member.take() {
                tracing::info!(cid = %self.cid, %account, "reinviting last member");
                self.invite(&account)?;
            }
        } else {
            tracing::info!(cid = %self.cid, members = ?self.members, "reinviting members");
            while let Some(account) = self.members.pop() {
                self.invite(&account)?;
            }
        }
        Ok(())
    }

    /// Records a failed reconnect: status `Error`, conversation closed.
    pub fn connect_failed(&mut self, error: &ConversationError) {
        tracing::warn!(cid = %self.cid, %error, "reconnect failed");
        self.release();
        self.shut_down(ConversationStatus::Error);
    }

    /// Closes the conversation for good (user request or manager close).
    pub fn close(&mut self) {
        self.release();
        if !self.status.is_finished() {
            self.shut_down(ConversationStatus::Closed);
        }
    }

    /// Common teardown for every way a conversation closes.
    fn shut_down(&mut self, status: ConversationStatus) {
        self.status = status;
        if !self.sent_messages.is_empty() {
            tracing::warn!(
                cid = %self.cid,
                dropped = self.sent_messages.len(),
                "closing with unacknowledged messages"
            );
            self.sent_messages.clear();
        }
        self.registry.unregister(self.cid);
        self.events.emit(SessionEvent::ConversationClosed { cid: self.cid });
        tracing::info!(cid = %self.cid, %status, "conversation closed");
    }

    // -----------------------------------------------------------------------
    // Input
    // -----------------------------------------------------------------------

    /// Waits for the next inbound message or peer payload.
    ///
    /// Cancel-safe. Without a channel, only peer payloads can arrive.
    pub async fn next_input(&mut self) -> Input {
        let Self {
            channel,
            peer_input,
            ..
        } = self;
        let wire = async move {
            match channel.as_mut() {
                Some(channel) => channel.recv().await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            inbound = wire => Input::Wire(inbound),
            Some(payload) = peer_input.recv() => Input::Peer(payload),
        }
    }

    /// Processes one input. Failures are logged; the conversation carries on.
    pub fn handle_input(&mut self, input: Input) {
        match input {
            Input::Wire(Inbound::Message(msg)) => self.handle_message(msg),
            Input::Wire(Inbound::Closed) => self.on_channel_closed(),
            Input::Peer(payload) => {
                if let Err(e) = self.send_peer(payload) {
                    tracing::warn!(cid = %self.cid, error = %e, "failed to send peer payload");
                }
            }
        }
    }

    /// Dispatches one inbound protocol message to its handler.
    pub fn handle_message(&mut self, msg: ProtocolMessage) {
        let result = match &msg.verb {
            Verb::Usr => self.on_usr(&msg),
            Verb::Iro => self.on_iro(&msg),
            Verb::Joi => self.on_join(&msg),
            Verb::Ans => self.on_answer(&msg),
            Verb::Bye => self.on_bye(&msg),
            Verb::Msg => self.on_message(&msg),
            Verb::Ack => self.on_ack(&msg),
            Verb::Nak => self.on_nak(&msg),
            Verb::Cal => {
                tracing::debug!(cid = %self.cid, params = ?msg.params, "invitation ringing");
                Ok(())
            }
            Verb::Unknown(_) => {
                tracing::warn!(cid = %self.cid, "unknown command: {msg}");
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::warn!(cid = %self.cid, error = %e, "dropping {}", msg.verb);
        }
    }

    fn on_channel_closed(&mut self) {
        tracing::info!(cid = %self.cid, "switchboard connection lost");
        self.release();
        if !self.status.is_finished() {
            self.shut_down(ConversationStatus::Closed);
        }
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    /// `USR <tid> OK ...`: presentation accepted.
    fn on_usr(&mut self, msg: &ProtocolMessage) -> Result<(), ConversationError> {
        if !msg.param_is(0, "OK") {
            return Ok(());
        }
        self.status = ConversationStatus::Established;
        tracing::info!(cid = %self.cid, "conversation established");

        // An invite leaves the queue only once its CAL is written.
        while let Some(account) = self.pending_invites.first() {
            let command = Command::invite(account);
            self.transmit(&command)?;
            self.pending_invites.remove(0);
        }
        Ok(())
    }

    /// `IRO <tid> <n> <total> <account> <nick> ...`: roster entry.
    fn on_iro(&mut self, msg: &ProtocolMessage) -> Result<(), ConversationError> {
        let account = msg.require_param(2)?.to_string();
        self.member_joined(account);
        Ok(())
    }

    /// `JOI <account> <nick> ...`: someone joined.
    fn on_join(&mut self, msg: &ProtocolMessage) -> Result<(), ConversationError> {
        let account = msg.tid.trim();
        if account.is_empty() {
            return Err(ProtocolError::MissingParam {
                verb: msg.verb.to_string(),
                index: 0,
            }
            .into());
        }
        self.member_joined(account.to_string());
        Ok(())
    }

    /// `ANS <tid> OK`: our answer was accepted.
    fn on_answer(&mut self, msg: &ProtocolMessage) -> Result<(), ConversationError> {
        if msg.param_is(0, "OK") {
            self.status = ConversationStatus::Established;
            tracing::info!(cid = %self.cid, "invitation answered");
            self.mark_ready();
        }
        Ok(())
    }

    /// `BYE <account>`: someone left.
    fn on_bye(&mut self, msg: &ProtocolMessage) -> Result<(), ConversationError> {
        let account = msg.tid.trim().to_string();
        let Some(index) = self.members.iter().position(|m| *m == account) else {
            return Err(ProtocolError::InvalidMessage(format!(
                "BYE from non-member {account}"
            ))
            .into());
        };

        self.events.emit(SessionEvent::ContactLeft {
            cid: self.cid,
            account: account.clone(),
        });
        self.members.remove(index);
        tracing::info!(cid = %self.cid, %account, members = self.members.len(), "contact left");

        match self.members.len() {
            1 => self.events.emit(SessionEvent::GroupEnded { cid: self.cid }),
            0 => {
                self.last_member = Some(account);
                self.release();
                self.shut_down(ConversationStatus::Closed);
            }
            _ => {}
        }
        Ok(())
    }

    /// `MSG <account> <nick>` + payload: chat traffic.
    fn on_message(&mut self, msg: &ProtocolMessage) -> Result<(), ConversationError> {
        let message = ChatMessage::parse(msg)?;

        if matches!(message.kind, MessageKind::Text | MessageKind::Nudge) && !self.first_action {
            self.first_action = true;
            self.events.emit(SessionEvent::FirstAction {
                cid: self.cid,
                members: self.members.clone(),
            });
        }

        match message.kind.clone() {
            MessageKind::Text | MessageKind::Typing | MessageKind::Nudge => {
                self.recorder.record_received(&self.account, &message);
                self.events.emit(SessionEvent::MessageReceived {
                    cid: self.cid,
                    account: message.account.clone(),
                    message,
                });
            }
            MessageKind::P2p => {
                let for_us = message.dest.as_deref() == Some(self.account.as_str());
                match (for_us, self.members.as_slice()) {
                    (true, [peer]) => {
                        let peer = peer.clone();
                        self.registry.deliver(self.cid, peer, message);
                    }
                    _ => {
                        tracing::debug!(
                            cid = %self.cid,
                            dest = ?message.dest,
                            members = self.members.len(),
                            "P2P message not routable, dropped"
                        );
                    }
                }
            }
            MessageKind::Unknown(content_type) => {
                tracing::debug!(cid = %self.cid, %content_type, "unhandled message type");
            }
        }
        Ok(())
    }

    /// `ACK <tid>`: a sent message was delivered.
    fn on_ack(&mut self, msg: &ProtocolMessage) -> Result<(), ConversationError> {
        let tid = msg.transaction_id()?;
        if let Some(message) = self.sent_messages.remove(&tid) {
            self.events.emit(SessionEvent::MessageSendSucceeded {
                cid: self.cid,
                message,
            });
        }
        Ok(())
    }

    /// `NAK <tid>`: a sent message was refused.
    fn on_nak(&mut self, msg: &ProtocolMessage) -> Result<(), ConversationError> {
        let tid = msg.transaction_id()?;
        if let Some(message) = self.sent_messages.remove(&tid) {
            tracing::warn!(cid = %self.cid, %tid, "message refused by server");
            self.recorder
                .record_sent(&self.account, self.presence, &self.members, &message, true);
            self.events.emit(SessionEvent::MessageSendFailed {
                cid: self.cid,
                message,
            });
        }
        Ok(())
    }

    /// Shared by `IRO` and `JOI`.
    fn member_joined(&mut self, account: String) {
        self.mark_ready();

        if self.members.contains(&account) {
            tracing::debug!(cid = %self.cid, %account, "already a member, join ignored");
            return;
        }

        self.events.emit(SessionEvent::ContactJoined {
            cid: self.cid,
            account: account.clone(),
        });

        if self.members.len() == 1 {
            self.events.emit(SessionEvent::GroupStarted { cid: self.cid });
        } else {
            self.registry.register(self.cid, self.peer_route.clone());
        }

        self.members.push(account);
        tracing::info!(cid = %self.cid, members = self.members.len(), "contact joined");
    }

    /// Announces "started" once and flushes queued messages on the first
    /// join of each connection.
    fn mark_ready(&mut self) {
        if !self.started {
            self.started = true;
            self.events.emit(SessionEvent::ConversationStarted { cid: self.cid });
        }
        if self.ready {
            return;
        }
        self.ready = true;

        for message in std::mem::take(&mut self.pending_messages) {
            if let Err(e) = self.send(message) {
                tracing::warn!(cid = %self.cid, error = %e, "failed to flush queued message");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Outbound operations
    // -----------------------------------------------------------------------

    /// Invites `account`. Queued until the presentation is accepted.
    ///
    /// # Errors
    /// Returns an error if the `CAL` can't be written.
    pub fn invite(&mut self, account: &str) -> Result<(), ConversationError> {
        if self.status != ConversationStatus::Established {
            tracing::debug!(cid = %self.cid, account, "invitation queued");
            self.pending_invites.push(account.to_string());
            return Ok(());
        }
        self.transmit(&Command::invite(account))?;
        Ok(())
    }

    /// Answers the invitation this conversation was created for.
    ///
    /// # Errors
    /// [`ConversationError::MissingAuthToken`] without an auth token, or
    /// an error if the `ANS` can't be written.
    pub fn answer(&mut self) -> Result<(), ConversationError> {
        let token = self
            .auth_token
            .clone()
            .ok_or(ConversationError::MissingAuthToken(self.cid))?;
        let command = Command::answer(&self.account, &token, &self.session_id);
        self.transmit(&command)?;
        Ok(())
    }

    /// Presents ourselves to the switchboard (`USR`).
    ///
    /// # Errors
    /// Returns an error if the `USR` can't be written.
    pub fn send_presentation(&mut self) -> Result<(), ConversationError> {
        let command = Command::presentation(&self.account, &self.session_id);
        self.transmit(&command)?;
        Ok(())
    }

    /// Sends `message`, or queues it until someone has joined.
    ///
    /// Acknowledged kinds are tracked under their transaction id. The sent
    /// message is recorded once per current member.
    ///
    /// # Errors
    /// Returns an error if the `MSG` can't be written.
    pub fn send(&mut self, message: ChatMessage) -> Result<(), ConversationError> {
        if !self.ready {
            tracing::debug!(cid = %self.cid, "conversation not ready, message queued");
            self.pending_messages.push(message);
            return Ok(());
        }

        let mode = message.ack_mode();
        let tid = self.transmit(&Command::message(mode.marker(), message.format()))?;
        self.recorder
            .record_sent(&self.account, self.presence, &self.members, &message, false);
        if mode.is_tracked() {
            self.sent_messages.insert(tid, message);
        }
        Ok(())
    }

    /// Sends a payload from the peer manager as a P2P message.
    ///
    /// # Errors
    /// Same as [`send`](Self::send).
    pub fn send_peer(&mut self, payload: PeerPayload) -> Result<(), ConversationError> {
        let message = ChatMessage::p2p(self.account.clone(), payload.account, payload.payload);
        self.send(message)
    }

    fn transmit(&mut self, command: &Command) -> Result<TransactionId, ConversationError> {
        let channel = self
            .channel
            .as_mut()
            .ok_or(ConversationError::NotConnected(self.cid))?;
        Ok(channel.send(command)?)
    }
}

// =========================================================================
// Tests
// =========================================================================
