//! Codec trait and the switchboard line codec.
//!
//! A "codec" (coder/decoder) converts between protocol values and raw
//! bytes. The command channel doesn't care HOW commands are framed; it
//! just needs something that implements [`Codec`].
//!
//! The switchboard format is line based:
//!
//! ```text
//! USR 1 alice@example.com 1234.5678\r\n        ← plain command
//! MSG 2 A 89\r\n<89 bytes of MIME payload>       ← payload command
//! ```
//!
//! For payload verbs the last field of the line is the payload length.
//! It is stripped from the decoded parameters, since the payload itself
//! carries it.

use crate::{Command, ProtocolError, ProtocolMessage, TransactionId, Verb};

/// Longest line accepted before the buffer is considered garbage.
pub const MAX_LINE_LEN: usize = 16 * 1024;

/// Largest payload accepted in a single command.
pub const MAX_PAYLOAD_LEN: usize = 1024 * 1024;

/// Encodes commands to bytes and decodes inbound bytes to messages.
///
/// ## Trait bounds
///
/// - `Send + Sync` → the codec is shared between a conversation task and
///   the channel's pump task.
/// - `Clone` → each side of the channel keeps its own copy.
/// - `'static` → no borrowed data, so it can live inside spawned tasks.
pub trait Codec: Send + Sync + Clone + 'static {
    /// Frames `command` with transaction id `tid`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if a parameter would break
    /// the framing (contains whitespace or is empty).
    fn encode(
        &self,
        tid: TransactionId,
        command: &Command,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Takes one complete message off the front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` holds only a partial frame; nothing is
    /// consumed in that case. On a [`ProtocolError::Decode`] the offending
    /// line has already been consumed, so the caller can log and call
    /// `decode` again.
    ///
    /// # Errors
    /// - [`ProtocolError::Decode`] for a malformed line.
    /// - [`ProtocolError::Desync`] when frame boundaries can no longer be
    ///   found. `buf` is left untouched and the connection must be dropped.
    fn decode(
        &self,
        buf: &mut Vec<u8>,
    ) -> Result<Option<ProtocolMessage>, ProtocolError>;
}

// ---------------------------------------------------------------------------
// SwitchboardCodec
// ---------------------------------------------------------------------------

/// The [`Codec`] for the switchboard's CRLF-terminated line format.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwitchboardCodec;

impl Codec for SwitchboardCodec {
    fn encode(
        &self,
        tid: TransactionId,
        command: &Command,
    ) -> Result<Vec<u8>, ProtocolError> {
        for param in &command.params {
            if param.is_empty()
                || param.bytes().any(|b| b.is_ascii_whitespace())
            {
                return Err(ProtocolError::InvalidMessage(format!(
                    "{} parameter {param:?} would break framing",
                    command.verb
                )));
            }
        }

        let mut line = format!("{} {}", command.verb, tid);
        for param in &command.params {
            line.push(' ');
            line.push_str(param);
        }

        let payload = command.payload.as_deref();
        if command.verb.carries_payload() {
            let len = payload.map_or(0, <[u8]>::len);
            line.push_str(&format!(" {len}"));
        }
        line.push_str("\r\n");

        let mut frame = line.into_bytes();
        if let Some(payload) = payload {
            frame.extend_from_slice(payload);
        }
        Ok(frame)
    }

    fn decode(
        &self,
        buf: &mut Vec<u8>,
    ) -> Result<Option<ProtocolMessage>, ProtocolError> {
        let Some(line_end) = find_crlf(buf) else {
            if buf.len() > MAX_LINE_LEN {
                return Err(ProtocolError::Desync(format!(
                    "no line terminator within {MAX_LINE_LEN} bytes"
                )));
            }
            return Ok(None);
        };
        let frame_start = line_end + 2;

        // Parse the line into owned fields first so we are free to drain
        // the buffer afterwards.
        let fields = match std::str::from_utf8(&buf[..line_end]) {
            Ok(line) => line
                .split(' ')
                .filter(|field| !field.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>(),
            Err(e) => {
                buf.drain(..frame_start);
                return Err(ProtocolError::Decode(format!(
                    "line is not UTF-8: {e}"
                )));
            }
        };

        let mut fields = fields.into_iter();
        let Some(verb) = fields.next().map(|v| Verb::parse(&v)) else {
            buf.drain(..frame_start);
            return Err(ProtocolError::Decode("empty line".into()));
        };
        let tid = fields.next().unwrap_or_default();
        let mut params: Vec<String> = fields.collect();

        if !verb.carries_payload() {
            buf.drain(..frame_start);
            return Ok(Some(ProtocolMessage {
                verb,
                tid,
                params,
                payload: None,
            }));
        }

        let len = match params.pop().map(|l| l.parse::<usize>()) {
            Some(Ok(len)) if len <= MAX_PAYLOAD_LEN => len,
            Some(Ok(len)) => {
                // Skipping only the line would decode the payload as commands.
                return Err(ProtocolError::Desync(format!(
                    "{verb} payload of {len} bytes exceeds limit"
                )));
            }
            Some(Err(_)) | None => {
                buf.drain(..frame_start);
                return Err(ProtocolError::Decode(format!(
                    "{verb} without a payload length"
                )));
            }
        };

        let frame_end = frame_start + len;
        if buf.len() < frame_end {
            // Payload still in flight: leave the whole frame in place.
            return Ok(None);
        }

        let payload = buf[frame_start..frame_end].to_vec();
        buf.drain(..frame_end);
        Ok(Some(ProtocolMessage {
            verb,
            tid,
            params,
            payload: Some(payload),
        }))
    }
}

/// Position of the first `\r\n` in `buf`.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
