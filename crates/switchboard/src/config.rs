//! Session configuration.
//!
//! Plain structs with serde derives, so a session can be described in a
//! JSON (or any serde format) file. Every field has a default, and a
//! config file only needs the fields it wants to change.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use switchboard_session::{DEFAULT_SYNC_EVERY, Presence};
use switchboard_transport::TransportConfig;

/// Where (and whether) message activity is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// JSON-lines file to append records to. `None` disables recording.
    pub path: Option<PathBuf>,

    /// `fsync` the file every this many records.
    pub sync_every: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            path: None,
            sync_every: DEFAULT_SYNC_EVERY,
        }
    }
}

/// Everything needed to run the conversations of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Our own account, as presented to every switchboard.
    pub account: String,

    /// Presence written into records of messages we send.
    pub presence: Presence,

    /// How switchboard servers are reached.
    pub transport: TransportConfig,

    pub recorder: RecorderConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            presence: Presence::Online,
            transport: TransportConfig::default(),
            recorder: RecorderConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Default settings for `account`.
    pub fn for_account(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default_is_direct_and_unrecorded() {
        let config = SessionConfig::for_account("me@example.com");
        assert_eq!(config.account, "me@example.com");
        assert!(!config.transport.is_tunnelled());
        assert_eq!(config.recorder.path, None);
        assert_eq!(config.recorder.sync_every, DEFAULT_SYNC_EVERY);
    }

    #[test]
    fn test_session_config_partial_json_fills_defaults() {
        let json = r#"{
            "account": "me@example.com",
            "presence": "away",
            "transport": { "use_http": true },
            "recorder": { "path": "/tmp/activity.jsonl" }
        }"#;

        let config: SessionConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.presence, Presence::Away);
        assert!(config.transport.is_tunnelled());
        assert_eq!(config.transport.gateway, TransportConfig::default().gateway);
        assert_eq!(
            config.recorder.path,
            Some(PathBuf::from("/tmp/activity.jsonl"))
        );
        assert_eq!(config.recorder.sync_every, DEFAULT_SYNC_EVERY);
    }
}
