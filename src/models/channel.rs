//! Channel binding model.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted association between a chat channel and a working directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChannelBinding {
    /// Chat channel identifier.
    pub channel_id: String,
    /// Directory the assistant runs in.
    pub directory: PathBuf,
    /// Conversation to resume on the next session, if any.
    pub conversation_id: Option<String>,
    /// Start sessions with every tool pre-authorized.
    pub auto_grant: bool,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}
