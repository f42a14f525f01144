//! Error types for the session layer.

/// Errors from the activity recorder's storage backend.
///
/// These never reach a conversation: the recorder worker logs them and
/// moves on to the next record.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// The backing file could not be opened, written or synced.
    #[error("recorder I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be serialized.
    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The store refused the record for its own reasons.
    #[error("store rejected record: {0}")]
    Rejected(String),
}
