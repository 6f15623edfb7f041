//! Backend gateway trait.
//!
//! Defines the interface the session controller uses to reach the
//! task-dispatch backend, decoupling session logic from the HTTP transport.

use super::directory::ConversationSummary;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A file the user attaches to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingAttachment {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// A downloadable artifact returned with an assistant reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub filename: String,
    pub mime_type: String,
    /// Base64-encoded body.
    pub content: String,
}

/// Successful response to a send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReply {
    /// Raw assistant reply body (may contain escape sequences and markers).
    pub response: String,
    /// The conversation this exchange was stored under. For a send with no
    /// conversation id, this is the identifier the backend minted.
    pub conversation_id: String,
    /// Present when the reply carries a generated artifact.
    #[serde(default)]
    pub file: Option<FilePayload>,
}

impl From<FilePayload> for super::message::AttachedFile {
    fn from(file: FilePayload) -> Self {
        Self {
            filename: file.filename,
            mime_type: file.mime_type,
            content: file.content,
            is_image: false,
        }
    }
}

/// One row of server-side conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

/// An abstract gateway to the task-dispatch backend.
///
/// Every operation either resolves with data or fails with a classified
/// [`ClientError`](crate::error::ClientError): `Transport` for connectivity
/// failures, `Rejected` for structured backend errors. Client-side
/// precondition skips never reach the gateway.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Sends a message (and any attachments) into a conversation.
    ///
    /// Passing `None` for `conversation_id` asks the backend to mint a new
    /// conversation.
    async fn send_message(
        &self,
        text: &str,
        conversation_id: Option<&str>,
        attachments: &[OutgoingAttachment],
    ) -> Result<SendReply>;

    /// Fetches up to `limit` history rows for a conversation, oldest first.
    async fn get_history(&self, conversation_id: &str, limit: u32) -> Result<Vec<HistoryEntry>>;

    /// Lists the caller's conversations, most recently updated first.
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>>;

    /// Deletes (archives) a conversation.
    async fn delete_conversation(&self, conversation_id: &str) -> Result<()>;
}
