//! The command channel: a framed, full-duplex pipe to one switchboard.
//!
//! A [`CommandChannel`] owns one transport connection through a background
//! "pump" task:
//!
//! ```text
//!  CommandChannel::send ──frames──▶ pump ──bytes──▶ Connection
//!  CommandChannel::recv ◀─Inbound── pump ◀─bytes─── Connection
//! ```
//!
//! `send` encodes a command in the caller's task and hands the finished
//! frame to the pump, so the bytes of two commands can never interleave
//! on the socket. The pump decodes inbound bytes with the codec, buffering
//! partial frames, and yields [`Inbound::Message`]s until the connection
//! goes away or its framing is lost, at which point it yields a single
//! [`Inbound::Closed`].
//!
//! Both directions are unbounded channels: a slow reader never makes a
//! `send` wait, and no command is ever dropped while the channel is open.

use switchboard_transport::{Connection, ConnectionId};
use tokio::sync::mpsc;

use crate::{Codec, Command, ProtocolError, ProtocolMessage, SwitchboardCodec, TransactionId};

/// One item read from a command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A decoded message from the server.
    Message(ProtocolMessage),
    /// The connection is gone. Every later `recv` yields this again.
    Closed,
}

// ---------------------------------------------------------------------------
// CommandChannel
// ---------------------------------------------------------------------------

/// A framed command pipe to a switchboard server.
///
/// Transaction ids start at 1 and every successfully queued command
/// consumes one, so a conversation can read [`next_tid`](Self::next_tid)
/// before a send to learn which id the reply will carry.
pub struct CommandChannel<D: Codec = SwitchboardCodec> {
    codec: D,
    next_tid: u32,
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    connection_id: Option<ConnectionId>,
    closed: bool,
}

impl CommandChannel {
    /// Starts a channel over `conn` with the switchboard codec.
    ///
    /// Must be called from inside a Tokio runtime (it spawns the pump).
    pub fn open<C: Connection>(conn: C) -> Self {
        Self::with_codec(conn, SwitchboardCodec)
    }

    /// Creates a channel with no transport behind it.
    ///
    /// The returned [`ChannelPeer`] plays the server: it sees every frame
    /// the channel sends and can inject inbound messages or close the
    /// channel. Useful for tests and for embedding the protocol engine
    /// over a transport this crate doesn't know about.
    pub fn detached() -> (Self, ChannelPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let channel = Self {
            codec: SwitchboardCodec,
            next_tid: 1,
            outbound: Some(out_tx),
            inbound: in_rx,
            connection_id: None,
            closed: false,
        };
        let peer = ChannelPeer {
            codec: SwitchboardCodec,
            frames: out_rx,
            inbound: in_tx,
        };
        (channel, peer)
    }
}

impl<D: Codec> CommandChannel<D> {
    /// Starts a channel over `conn` with a custom codec.
    pub fn with_codec<C: Connection>(conn: C, codec: D) -> Self {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let connection_id = conn.id();

        tokio::spawn(pump(conn, codec.clone(), out_rx, in_tx));

        Self {
            codec,
            next_tid: 1,
            outbound: Some(out_tx),
            inbound: in_rx,
            connection_id: Some(connection_id),
            closed: false,
        }
    }

    /// The transaction id the next [`send`](Self::send) will use.
    pub fn next_tid(&self) -> TransactionId {
        TransactionId(self.next_tid)
    }

    /// Id of the underlying transport connection (`None` when detached).
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    /// Returns `true` once the channel has been released or has yielded
    /// [`Inbound::Closed`].
    pub fn is_closed(&self) -> bool {
        self.closed || self.outbound.is_none()
    }

    /// Encodes `command` with a fresh transaction id and queues it.
    ///
    /// Fire-and-forget: the reply (if any) arrives later through
    /// [`recv`](Self::recv). The id is only consumed when the command was
    /// actually queued.
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidMessage`] if the command can't be framed.
    /// - [`ProtocolError::ChannelClosed`] if the transport is gone.
    pub fn send(&mut self, command: &Command) -> Result<TransactionId, ProtocolError> {
        let tid = self.next_tid();
        let frame = self.codec.encode(tid, command)?;

        let outbound = self.outbound.as_ref().ok_or(ProtocolError::ChannelClosed)?;
        outbound
            .send(frame)
            .map_err(|_| ProtocolError::ChannelClosed)?;

        tracing::debug!(
            conn = ?self.connection_id,
            tid = %tid,
            verb = %command.verb,
            params = ?command.params,
            ">>> command"
        );
        self.next_tid += 1;
        Ok(tid)
    }

    /// Waits for the next inbound item.
    ///
    /// Cancel-safe, so it can sit in a `tokio::select!` arm.
    pub async fn recv(&mut self) -> Inbound {
        if self.closed {
            return Inbound::Closed;
        }
        match self.inbound.recv().await {
            Some(Inbound::Message(msg)) => {
                tracing::debug!(conn = ?self.connection_id, "<<< {msg}");
                Inbound::Message(msg)
            }
            Some(Inbound::Closed) | None => {
                self.closed = true;
                Inbound::Closed
            }
        }
    }

    /// Lets go of the transport. The pump closes the connection once it
    /// has written everything queued before this call.
    pub fn release(&mut self) {
        if self.outbound.take().is_some() {
            tracing::debug!(conn = ?self.connection_id, "command channel released");
        }
        self.closed = true;
    }
}

// ---------------------------------------------------------------------------
// Pump task
// ---------------------------------------------------------------------------

/// Moves frames between the channel and the connection until either side
/// goes away.
async fn pump<C: Connection, D: Codec>(
    conn: C,
    codec: D,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    inbound: mpsc::UnboundedSender<Inbound>,
) {
    let conn_id = conn.id();
    let mut buf = Vec::new();

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = conn.send(&frame).await {
                        tracing::warn!(conn = %conn_id, error = %e, "send failed");
                        break;
                    }
                }
                None => {
                    tracing::debug!(conn = %conn_id, "channel dropped, closing connection");
                    break;
                }
            },

            chunk = conn.recv() => match chunk {
                Ok(Some(bytes)) => {
                    buf.extend_from_slice(&bytes);
                    if let Err(e) = drain_frames(&codec, &mut buf, &inbound, conn_id) {
                        tracing::warn!(conn = %conn_id, error = %e, "closing connection");
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!(conn = %conn_id, "connection closed by server");
                    break;
                }
                Err(e) => {
                    tracing::warn!(conn = %conn_id, error = %e, "receive failed");
                    break;
                }
            },
        }
    }

    if let Err(e) = conn.close().await {
        tracing::debug!(conn = %conn_id, error = %e, "close failed");
    }
    let _ = inbound.send(Inbound::Closed);
}

/// Decodes every complete frame in `buf`, skipping the undecodable ones.
///
/// Stops with the error once the codec reports the framing as lost.
fn drain_frames<D: Codec>(
    codec: &D,
    buf: &mut Vec<u8>,
    inbound: &mpsc::UnboundedSender<Inbound>,
    conn_id: ConnectionId,
) -> Result<(), ProtocolError> {
    loop {
        match codec.decode(buf) {
            Ok(Some(msg)) => {
                let _ = inbound.send(Inbound::Message(msg));
            }
            Ok(None) => return Ok(()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(conn = %conn_id, error = %e, "dropping undecodable input");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelPeer
// ---------------------------------------------------------------------------

/// The far end of a [`CommandChannel::detached`] channel.
pub struct ChannelPeer<D: Codec = SwitchboardCodec> {
    codec: D,
    frames: mpsc::UnboundedReceiver<Vec<u8>>,
    inbound: mpsc::UnboundedSender<Inbound>,
}

impl<D: Codec> ChannelPeer<D> {
    /// Injects a message as if the server had sent it. Returns `false` if
    /// the channel is gone.
    pub fn deliver(&self, msg: ProtocolMessage) -> bool {
        self.inbound.send(Inbound::Message(msg)).is_ok()
    }

    /// Closes the channel as if the connection had dropped.
    pub fn close(&self) {
        let _ = self.inbound.send(Inbound::Closed);
    }

    /// Takes the next command the channel sent, if one is waiting.
    pub fn try_next_command(&mut self) -> Option<ProtocolMessage> {
        let frame = self.frames.try_recv().ok()?;
        self.decode_frame(frame)
    }

    /// Takes every command sent so far.
    pub fn sent_commands(&mut self) -> Vec<ProtocolMessage> {
        std::iter::from_fn(|| self.try_next_command()).collect()
    }

    /// Waits for the next command. `None` once the channel is released
    /// or dropped.
    pub async fn next_command(&mut self) -> Option<ProtocolMessage> {
        loop {
            let frame = self.frames.recv().await?;
            if let Some(msg) = self.decode_frame(frame) {
                return Some(msg);
            }
        }
    }

    fn decode_frame(&self, mut frame: Vec<u8>) -> Option<ProtocolMessage> {
        match self.codec.decode(&mut frame) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "peer could not decode frame");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Verb;

    #[tokio::test]
    async fn test_send_assigns_increasing_tids_from_one() {
        let (mut channel, mut peer) = CommandChannel::detached();

        assert_eq!(channel.next_tid(), TransactionId(1));
        let first = channel.send(&Command::presentation("me@example.com", "s1")).unwrap();
        let second = channel.send(&Command::invite("bob@example.com")).unwrap();

        assert_eq!(first, TransactionId(1));
        assert_eq!(second, TransactionId(2));
        assert_eq!(channel.next_tid(), TransactionId(3));

        let sent = peer.sent_commands();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].verb, Verb::Usr);
        assert_eq!(sent[0].tid, "1");
        assert_eq!(sent[1].verb, Verb::Cal);
        assert_eq!(sent[1].params, vec!["bob@example.com"]);
    }

    #[tokio::test]
    async fn test_send_invalid_command_keeps_tid() {
        let (mut channel, mut peer) = CommandChannel::detached();

        let result = channel.send(&Command::invite("has space"));
        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
        assert_eq!(channel.next_tid(), TransactionId(1));
        assert!(peer.try_next_command().is_none());
    }

    #[tokio::test]
    async fn test_recv_yields_delivered_messages_in_order() {
        let (mut channel, peer) = CommandChannel::detached();

        peer.deliver(ProtocolMessage::new(Verb::Joi, "bob@example.com", ["Bob"]));
        peer.deliver(ProtocolMessage::new(Verb::Ack, "1", Vec::<String>::new()));

        let Inbound::Message(first) = channel.recv().await else {
            panic!("expected a message");
        };
        let Inbound::Message(second) = channel.recv().await else {
            panic!("expected a message");
        };
        assert_eq!(first.verb, Verb::Joi);
        assert_eq!(second.verb, Verb::Ack);
    }

    #[tokio::test]
    async fn test_recv_after_close_keeps_returning_closed() {
        let (mut channel, peer) = CommandChannel::detached();

        peer.close();
        assert_eq!(channel.recv().await, Inbound::Closed);
        assert_eq!(channel.recv().await, Inbound::Closed);
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_release_rejects_further_sends() {
        let (mut channel, mut peer) = CommandChannel::detached();

        channel.release();
        assert!(channel.is_closed());
        assert!(matches!(
            channel.send(&Command::invite("bob@example.com")),
            Err(ProtocolError::ChannelClosed)
        ));
        assert!(peer.next_command().await.is_none());
    }

    #[tokio::test]
    async fn test_peer_sees_message_payload() {
        let (mut channel, mut peer) = CommandChannel::detached();

        channel.send(&Command::message("A", b"hello".to_vec())).unwrap();

        let sent = peer.next_command().await.unwrap();
        assert_eq!(sent.verb, Verb::Msg);
        assert_eq!(sent.params, vec!["A"]);
        assert_eq!(sent.payload.as_deref(), Some(&b"hello"[..]));
    }
}
