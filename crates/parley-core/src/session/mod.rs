//! Session domain module.
//!
//! Contains the session state store, message and directory models, the
//! backend gateway boundary, and the controller that mediates every state
//! transition.
//!
//! # Module Structure
//!
//! - `message`: active-conversation message types (`Message`, `MessageRole`,
//!   `AttachedFile`)
//! - `directory`: conversation directory entries (`ConversationSummary`)
//! - `state`: the session state store and its atomic snapshot
//! - `gateway`: the `BackendGateway` trait and wire DTOs
//! - `controller`: the session controller (`SessionController`)

mod controller;
mod directory;
mod gateway;
mod message;
mod state;

pub use controller::{
    DEFAULT_HISTORY_LIMIT, DEFAULT_REMOVAL_DELAY, SendOutcome, SessionController,
};
pub use directory::ConversationSummary;
pub use gateway::{BackendGateway, FilePayload, HistoryEntry, OutgoingAttachment, SendReply};
pub use message::{AttachedFile, IMAGE_READY_MARKER, Message, MessageRole};
pub use state::{SessionSnapshot, SessionState};
