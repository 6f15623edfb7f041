//! Conversation directory entry.

use serde::{Deserialize, Serialize};

/// A single entry in the conversation directory (the sidebar list).
///
/// Directory entries are server-supplied summaries; the list order is
/// server-determined (most-recent-first) and preserved as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Server-assigned stable identifier.
    pub conversation_id: String,
    /// First user message of the conversation, if any.
    #[serde(default)]
    pub preview: Option<String>,
    /// Timestamp of last activity (server format).
    pub last_updated: String,
    /// Number of messages stored server-side.
    #[serde(default)]
    pub message_count: u32,
}

impl ConversationSummary {
    /// Text shown for this entry, substituting a placeholder when the
    /// conversation has no user message yet.
    pub fn display_preview(&self) -> &str {
        self.preview
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or("New conversation")
    }
}
