//! Session state store.
//!
//! `SessionState` is the single in-memory source of truth for the active
//! conversation. Fields are private and every mutation goes through a
//! `pub(crate)` transition used by the controller; the presentation layer
//! only ever sees an atomic [`SessionSnapshot`].

use super::directory::ConversationSummary;
use super::message::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Atomic observer view of the session.
///
/// Taken under a single lock acquisition, so `messages` and
/// `active_conversation_id` always describe the same conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub active_conversation_id: Option<String>,
    pub conversations: Vec<ConversationSummary>,
    pub is_loading: bool,
    pub has_started_chat: bool,
    pub deleting_ids: HashSet<String>,
}

/// The mutable session store owned by the controller.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Messages of the active conversation only.
    messages: Vec<Message>,
    /// `None` means "new, unsaved conversation".
    active_conversation_id: Option<String>,
    /// Directory of known conversations, scoped to the current identity.
    conversations: Vec<ConversationSummary>,
    /// True exactly while a send is in flight.
    is_loading: bool,
    /// True once at least one message exists in the active conversation.
    has_started_chat: bool,
    /// Conversations currently in the marked-for-deletion transient state.
    deleting_ids: HashSet<String>,
    /// Current identity, if any. The directory is scoped to it.
    identity: Option<String>,
    /// Bumped on every wholesale replacement of `messages`. In-flight sends
    /// capture it before dispatch and discard their result if it moved.
    generation: u64,
}

impl SessionState {
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            messages: self.messages.clone(),
            active_conversation_id: self.active_conversation_id.clone(),
            conversations: self.conversations.clone(),
            is_loading: self.is_loading,
            has_started_chat: self.has_started_chat,
            deleting_ids: self.deleting_ids.clone(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn active_conversation_id(&self) -> Option<&str> {
        self.active_conversation_id.as_deref()
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Optimistic append at the start of a send. Returns the generation the
    /// send must re-validate against when its reply arrives.
    pub(crate) fn begin_send(&mut self, user_message: Message) -> u64 {
        debug_assert!(!self.is_loading);
        self.messages.push(user_message);
        self.has_started_chat = true;
        self.is_loading = true;
        self.generation
    }

    /// Appends the reconciled assistant or error message, unless the active
    /// conversation was replaced while the send was in flight.
    pub(crate) fn finish_send(&mut self, sent_at_generation: u64, outcome: Option<Message>) {
        if self.generation == sent_at_generation
            && let Some(message) = outcome
        {
            self.messages.push(message);
        }
        self.is_loading = false;
    }

    /// Adopts a backend-minted conversation identifier after a send.
    pub(crate) fn adopt_conversation_id(&mut self, conversation_id: String) -> bool {
        if self.active_conversation_id.as_deref() == Some(conversation_id.as_str()) {
            return false;
        }
        self.active_conversation_id = Some(conversation_id);
        true
    }

    /// Wholesale replacement of the active conversation with loaded history.
    pub(crate) fn replace_conversation(&mut self, conversation_id: String, messages: Vec<Message>) {
        self.has_started_chat = !messages.is_empty();
        self.messages = messages;
        self.active_conversation_id = Some(conversation_id);
        self.generation += 1;
    }

    /// Resets to a new, unsaved conversation. Pure local transition.
    pub(crate) fn reset_active_conversation(&mut self) {
        self.messages.clear();
        self.active_conversation_id = None;
        self.has_started_chat = false;
        self.generation += 1;
    }

    /// Wholesale replacement of the directory.
    pub(crate) fn replace_directory(&mut self, conversations: Vec<ConversationSummary>) {
        self.conversations = conversations;
    }

    pub(crate) fn mark_deleting(&mut self, conversation_id: &str) {
        self.deleting_ids.insert(conversation_id.to_string());
    }

    /// Rollback edge: MarkedForDeletion back to Active.
    pub(crate) fn unmark_deleting(&mut self, conversation_id: &str) {
        self.deleting_ids.remove(conversation_id);
    }

    /// Final deletion step: drops the directory entry, clears the transient
    /// marker, and resets the active conversation if it was the one deleted.
    pub(crate) fn complete_deletion(&mut self, conversation_id: &str) {
        self.conversations
            .retain(|c| c.conversation_id != conversation_id);
        self.deleting_ids.remove(conversation_id);
        if self.active_conversation_id.as_deref() == Some(conversation_id) {
            self.reset_active_conversation();
        }
    }

    /// Replaces the current identity. Any change of identity invalidates the
    /// directory (it is identity-scoped); the active conversation is not
    /// touched. Returns whether the identity actually changed.
    pub(crate) fn set_identity(&mut self, identity: Option<String>) -> bool {
        if self.identity == identity {
            return false;
        }
        self.identity = identity;
        self.conversations.clear();
        true
    }
}
