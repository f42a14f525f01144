//! Activity recorder: fire-and-forget logging of conversation traffic.
//!
//! Conversations call [`Recorder::record`] (or one of the message helpers)
//! from their event loop. The record goes onto an unbounded channel and a
//! worker on Tokio's blocking pool appends it to a [`RecordStore`]:
//!
//! ```text
//! conversation ──record──▶ mpsc ──▶ worker (spawn_blocking) ──▶ RecordStore
//! ```
//!
//! File I/O therefore never stalls a conversation, and a failing store only
//! produces a warning in the log.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use switchboard_protocol::{ChatMessage, MessageKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::RecorderError;

/// Records written between two `fsync`s of a [`JsonLinesStore`].
pub const DEFAULT_SYNC_EVERY: usize = 20;

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

/// Presence status attached to a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    #[default]
    Online,
    Busy,
    Away,
    Idle,
    Offline,
}

/// What kind of activity a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    #[serde(rename = "nick change")]
    NickChange,
    #[serde(rename = "status change")]
    StatusChange,
    #[serde(rename = "message change")]
    MessageChange,
    #[serde(rename = "image change")]
    ImageChange,
    #[serde(rename = "message")]
    Message,
    #[serde(rename = "message-error")]
    MessageError,
}

impl ActivityKind {
    /// The name stored with each record.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NickChange => "nick change",
            Self::StatusChange => "status change",
            Self::MessageChange => "message change",
            Self::ImageChange => "image change",
            Self::Message => "message",
            Self::MessageError => "message-error",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub kind: ActivityKind,
    /// Presence of `src` when the activity happened.
    pub status: Presence,
    /// Activity content (message text, new nick, ...).
    pub payload: String,
    pub src: String,
    pub dest: Option<String>,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

impl ActivityRecord {
    /// Builds a record stamped with the current time.
    pub fn now(
        kind: ActivityKind,
        status: Presence,
        payload: impl Into<String>,
        src: impl Into<String>,
        dest: Option<String>,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self {
            kind,
            status,
            payload: payload.into(),
            src: src.into(),
            dest,
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

/// Where records end up.
///
/// Called only from the recorder's blocking worker, so implementations
/// may do blocking I/O freely.
pub trait RecordStore: Send + 'static {
    /// Appends one record.
    ///
    /// # Errors
    /// Any error is logged by the worker; the next record is still offered.
    fn append(&mut self, record: &ActivityRecord) -> Result<(), RecorderError>;

    /// Makes everything appended so far durable. Called once when the
    /// recorder shuts down.
    ///
    /// # Errors
    /// Logged by the worker.
    fn sync(&mut self) -> Result<(), RecorderError> {
        Ok(())
    }
}

/// An append-only file of JSON objects, one record per line.
///
/// Every record is flushed to the OS as soon as it is written; the file is
/// `fsync`ed every `sync_every` records and on shutdown.
pub struct JsonLinesStore {
    writer: BufWriter<File>,
    sync_every: usize,
    unsynced: usize,
}

impl JsonLinesStore {
    /// Opens (creating if needed) `path` for appending.
    ///
    /// # Errors
    /// Returns [`RecorderError::Io`] if the file can't be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            writer: BufWriter::new(file),
            sync_every: DEFAULT_SYNC_EVERY,
            unsynced: 0,
        })
    }

    /// Sets how many records are written between two `fsync`s. Zero is
    /// treated as one.
    pub fn with_sync_every(mut self, sync_every: usize) -> Self {
        self.sync_every = sync_every.max(1);
        self
    }
}

impl RecordStore for JsonLinesStore {
    fn append(&mut self, record: &ActivityRecord) -> Result<(), RecorderError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        self.unsynced += 1;
        if self.unsynced >= self.sync_every {
            self.sync()?;
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<(), RecorderError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.unsynced = 0;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Recorder handle
// ---------------------------------------------------------------------------

/// Cheap, cloneable handle for submitting records.
///
/// The worker stops once every clone is dropped.
#[derive(Debug, Clone)]
pub struct Recorder {
    tx: Option<mpsc::UnboundedSender<ActivityRecord>>,
}

impl Recorder {
    /// Starts a worker on the blocking pool that appends to `store`.
    ///
    /// The returned handle finishes after the last `Recorder` clone is
    /// dropped and the store has been synced.
    pub fn spawn<S: RecordStore>(store: S) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::task::spawn_blocking(move || run_worker(store, rx));
        (Self { tx: Some(tx) }, worker)
    }

    /// A recorder whose records are read straight from a channel instead
    /// of going to a store.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ActivityRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A recorder that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Submits one record. Never blocks, never fails.
    pub fn record(
        &self,
        kind: ActivityKind,
        status: Presence,
        payload: impl Into<String>,
        src: impl Into<String>,
        dest: Option<String>,
    ) {
        let Some(tx) = &self.tx else {
            return;
        };
        let record = ActivityRecord::now(kind, status, payload, src, dest);
        if tx.send(record).is_err() {
            tracing::debug!("recorder worker gone, record dropped");
        }
    }

    /// Records a message we sent: one record per member, from `own`.
    ///
    /// With `failed` set the records are [`ActivityKind::MessageError`].
    /// Typing notifications and P2P data are not recorded.
    pub fn record_sent(
        &self,
        own: &str,
        status: Presence,
        members: &[String],
        message: &ChatMessage,
        failed: bool,
    ) {
        if !is_recordable(message) {
            return;
        }
        let kind = if failed {
            ActivityKind::MessageError
        } else {
            ActivityKind::Message
        };
        let payload = match message.kind {
            MessageKind::Nudge => "you just sent a nudge!".to_string(),
            _ => message.body_text(),
        };
        for member in members {
            self.record(kind, status, payload.clone(), own, Some(member.clone()));
        }
    }

    /// Records a message a contact sent to `own`.
    ///
    /// The contact's presence isn't known at this layer, so it's recorded
    /// as [`Presence::Offline`].
    pub fn record_received(&self, own: &str, message: &ChatMessage) {
        if !is_recordable(message) {
            return;
        }
        let payload = match message.kind {
            MessageKind::Nudge => format!("{} just sent you a nudge!", message.account),
            _ => message.body_text(),
        };
        self.record(
            ActivityKind::Message,
            Presence::Offline,
            payload,
            message.account.clone(),
            Some(own.to_string()),
        );
    }
}

fn is_recordable(message: &ChatMessage) -> bool {
    matches!(message.kind, MessageKind::Text | MessageKind::Nudge)
}

/// Worker body: drain the channel into the store until every sender is gone.
fn run_worker<S: RecordStore>(
    mut store: S,
    mut rx: mpsc::UnboundedReceiver<ActivityRecord>,
) {
    tracing::debug!("recorder worker started");
    while let Some(record) = rx.blocking_recv() {
        if let Err(e) = store.append(&record) {
            tracing::warn!(kind = %record.kind, error = %e, "failed to store record");
        }
    }
    if let Err(e) = store.sync() {
        tracing::warn!(error = %e, "failed to sync recorder store");
    }
    tracing::debug!("recorder worker stopped");
}
