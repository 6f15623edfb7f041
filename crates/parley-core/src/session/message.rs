//! Conversation message types.
//!
//! This module contains types for representing messages in the active
//! conversation, including roles, attached artifacts, and the normalization
//! applied to raw backend reply bodies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marker the backend embeds in a reply body when the attached file is a
/// rendered image rather than a plain document.
pub const IMAGE_READY_MARKER: &str = "[IMAGE_READY]";

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message authored by the user.
    User,
    /// Message authored by the AI assistant.
    Assistant,
    /// Inline failure notice (a send that did not complete).
    Error,
}

impl MessageRole {
    /// Maps a backend history row's author field onto a role.
    ///
    /// The backend only persists `user` and `assistant` rows, so anything
    /// unrecognized is treated as assistant output.
    pub fn from_author(author: &str) -> Self {
        match author {
            "user" => Self::User,
            "error" => Self::Error,
            _ => Self::Assistant,
        }
    }
}

/// A downloadable artifact carried by an assistant reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFile {
    pub filename: String,
    pub mime_type: String,
    /// Base64-encoded file body, exactly as received from the backend.
    pub content: String,
    /// True when the reply body carried the image-ready marker.
    #[serde(default)]
    pub is_image: bool,
}

/// A single message in the active conversation.
///
/// Messages are created once and never mutated; they are destroyed only when
/// the owning conversation is cleared or replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Process-local identifier. The prefix encodes provenance (`user-`,
    /// `ai-`, `hist-`, `err-`); this is not a server identity.
    pub id: String,
    /// The role of the message sender.
    pub role: MessageRole,
    /// The content of the message.
    pub content: String,
    /// Present only on assistant replies carrying a downloadable artifact.
    pub attached_file: Option<AttachedFile>,
    /// Display-formatted time of creation.
    pub timestamp: String,
}

impl Message {
    fn new(prefix: &str, role: MessageRole, content: String) -> Self {
        Self {
            id: format!("{prefix}-{}", Uuid::new_v4()),
            role,
            content,
            attached_file: None,
            timestamp: display_timestamp(),
        }
    }

    /// Creates a user-authored message for the optimistic append.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", MessageRole::User, content.into())
    }

    /// Creates an assistant message from a raw backend reply body.
    ///
    /// Escaped newline and quote sequences are unescaped, and the image-ready
    /// marker is stripped from the displayed content (it survives as
    /// `is_image` on the attachment).
    pub fn assistant(raw: &str, mut attached_file: Option<AttachedFile>) -> Self {
        let (content, image_ready) = normalize_reply(raw);
        if let Some(file) = attached_file.as_mut() {
            file.is_image = image_ready;
        }
        let mut message = Self::new("ai", MessageRole::Assistant, content);
        message.attached_file = attached_file;
        message
    }

    /// Creates an inline error message from a failed send.
    pub fn error(content: impl Into<String>) -> Self {
        Self::new("err", MessageRole::Error, content.into())
    }

    /// Creates a message re-hydrated from server-side history.
    pub fn from_history(role: MessageRole, content: impl Into<String>, timestamp: String) -> Self {
        Self {
            id: format!("hist-{}", Uuid::new_v4()),
            role,
            content: content.into(),
            attached_file: None,
            timestamp,
        }
    }
}

fn display_timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Unescapes `\n` / `\"` sequences and detects the image-ready marker.
///
/// Reply bodies pass through two JSON layers on the backend (worker to master
/// controller, master controller to gateway), so literal escape sequences can
/// survive into the final string.
fn normalize_reply(raw: &str) -> (String, bool) {
    let mut content = raw.replace("\\n", "\n").replace("\\\"", "\"");
    let image_ready = content.contains(IMAGE_READY_MARKER);
    if image_ready {
        content = content.replace(IMAGE_READY_MARKER, "").trim().to_string();
    }
    (content, image_ready)
}
