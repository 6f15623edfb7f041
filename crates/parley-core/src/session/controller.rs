//! Session controller.
//!
//! `SessionController` owns the [`SessionState`] store and drives the
//! asynchronous protocol against the [`BackendGateway`]: the send lifecycle
//! (optimistic append, dispatch, reconciliation), history loads, directory
//! synchronization, and the two-phase deletion state machine.
//!
//! Concurrency model: all mutations happen through this controller, with
//! suspension points only at gateway calls. The only enforced mutual
//! exclusion is on `send` (at most one in flight, via the loading flag).
//! `load_conversation`, `refresh`, and `remove` may interleave freely with a
//! pending send; a send whose conversation was replaced while it was in
//! flight discards its reply instead of appending it to the wrong
//! conversation (see [`SessionState::finish_send`]).

use super::gateway::{BackendGateway, OutgoingAttachment};
use super::message::{Message, MessageRole};
use super::state::{SessionSnapshot, SessionState};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Page size for history loads.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Delay between a confirmed deletion and the entry's removal from the
/// directory, matching the presentation layer's fade-out transition.
pub const DEFAULT_REMOVAL_DELAY: Duration = Duration::from_millis(350);

/// Result of a `send` call.
///
/// A skipped send is a client-side precondition miss (empty input or a send
/// already in flight), silently dropped rather than surfaced as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The send protocol ran to completion (the reply may still have been an
    /// error message).
    Sent,
    /// Precondition not met; no state was changed.
    Skipped,
}

/// Owns the session state and mediates every transition on it.
pub struct SessionController<G: BackendGateway> {
    gateway: Arc<G>,
    state: Arc<RwLock<SessionState>>,
    removal_delay: Duration,
}

impl<G: BackendGateway> SessionController<G> {
    /// Creates a controller over the given gateway with an empty session.
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            state: Arc::new(RwLock::new(SessionState::default())),
            removal_delay: DEFAULT_REMOVAL_DELAY,
        }
    }

    /// Overrides the visual-transition delay applied before a deleted entry
    /// is removed from the directory. Tests set this to zero.
    pub fn with_removal_delay(mut self, delay: Duration) -> Self {
        self.removal_delay = delay;
        self
    }

    /// Returns an atomic view of the session for the presentation layer.
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.read().await.snapshot()
    }

    /// Sends a message into the active conversation.
    ///
    /// The user message is appended before the network call begins; the
    /// assistant (or inline error) message is appended strictly after. At
    /// most one send is in flight at a time; a second call while loading is
    /// skipped. Success or failure, a directory refresh is requested so
    /// previews and timestamps stay eventually consistent.
    pub async fn send(&self, text: &str, attachments: &[OutgoingAttachment]) -> SendOutcome {
        if text.trim().is_empty() && attachments.is_empty() {
            tracing::debug!("send skipped: empty input");
            return SendOutcome::Skipped;
        }

        let (generation, conversation_id) = {
            let mut state = self.state.write().await;
            if state.is_loading() {
                tracing::debug!("send skipped: another send is in flight");
                return SendOutcome::Skipped;
            }
            let generation = state.begin_send(Message::user(text));
            (
                generation,
                state.active_conversation_id().map(str::to_string),
            )
        };

        let result = self
            .gateway
            .send_message(text, conversation_id.as_deref(), attachments)
            .await;

        {
            let mut state = self.state.write().await;
            match result {
                Ok(reply) => {
                    let message =
                        Message::assistant(&reply.response, reply.file.map(Into::into));
                    // Only adopt the minted id if this is still the same
                    // conversation the send targeted.
                    if state.generation() == generation
                        && state.adopt_conversation_id(reply.conversation_id.clone())
                    {
                        tracing::info!(conversation_id = %reply.conversation_id, "adopted new conversation");
                    }
                    state.finish_send(generation, Some(message));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "send failed");
                    state.finish_send(generation, Some(Message::error(err.user_message())));
                }
            }
        }

        self.refresh_quietly().await;
        SendOutcome::Sent
    }

    /// Loads full history for a conversation and makes it active.
    ///
    /// This is an atomic replace, never a merge: on success `messages` is
    /// replaced wholesale; on failure the prior state is left untouched and
    /// the error is returned to the caller.
    pub async fn load_conversation(&self, conversation_id: &str) -> Result<()> {
        let entries = self
            .gateway
            .get_history(conversation_id, DEFAULT_HISTORY_LIMIT)
            .await?;

        // The backend can persist a message twice (gateway and master
        // controller both store it); collapse consecutive duplicates.
        let mut messages: Vec<Message> = Vec::with_capacity(entries.len());
        let mut last: Option<(MessageRole, String)> = None;
        for entry in entries {
            let role = MessageRole::from_author(&entry.role);
            let normalized = entry.content.trim().to_string();
            if last.as_ref() == Some(&(role, normalized.clone())) {
                continue;
            }
            messages.push(Message::from_history(role, entry.content, entry.timestamp));
            last = Some((role, normalized));
        }

        let mut state = self.state.write().await;
        state.replace_conversation(conversation_id.to_string(), messages);
        Ok(())
    }

    /// Clears the session to a new, unsaved conversation. No network call;
    /// the next send with no active id makes the backend mint a new one.
    pub async fn start_new_conversation(&self) {
        self.state.write().await.reset_active_conversation();
    }

    /// Replaces the directory with the server's conversation list.
    ///
    /// No-op when no identity is present. The identity is re-checked after
    /// the fetch so a sign-out during the request cannot resurrect a stale
    /// directory.
    pub async fn refresh(&self) -> Result<()> {
        if self.state.read().await.identity().is_none() {
            tracing::debug!("refresh skipped: no identity");
            return Ok(());
        }

        let conversations = self.gateway.list_conversations().await?;

        let mut state = self.state.write().await;
        if state.identity().is_some() {
            state.replace_directory(conversations);
        }
        Ok(())
    }

    /// Deletes a conversation through the two-phase lifecycle.
    ///
    /// The entry is marked for deletion immediately (for UI feedback), then
    /// the delete request is dispatched. On failure the marker is rolled back
    /// before the error is returned. On success the entry is removed after
    /// the configured visual delay; deleting the active conversation also
    /// resets the session, as `start_new_conversation` would.
    pub async fn remove(&self, conversation_id: &str) -> Result<()> {
        self.state.write().await.mark_deleting(conversation_id);

        if let Err(err) = self.gateway.delete_conversation(conversation_id).await {
            tracing::warn!(conversation_id, error = %err, "delete failed, rolling back");
            self.state.write().await.unmark_deleting(conversation_id);
            return Err(err);
        }

        if !self.removal_delay.is_zero() {
            tokio::time::sleep(self.removal_delay).await;
        }

        self.state.write().await.complete_deletion(conversation_id);
        self.refresh_quietly().await;
        Ok(())
    }

    /// Feeds an identity transition into the session.
    ///
    /// Identity becoming present triggers a directory refresh; identity
    /// becoming absent clears the directory. The active conversation is not
    /// identity-scoped and is left alone.
    pub async fn set_identity(&self, identity: Option<String>) {
        let refresh_needed = {
            let mut state = self.state.write().await;
            let changed = state.set_identity(identity);
            changed && state.identity().is_some()
        };
        if refresh_needed {
            self.refresh_quietly().await;
        }
    }

    /// Directory refresh where failure must not disturb the caller: the
    /// stale-but-consistent list is kept and the error is only logged.
    async fn refresh_quietly(&self) {
        if let Err(err) = self.refresh().await {
            tracing::warn!(error = %err, "directory refresh failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::session::directory::ConversationSummary;
    use crate::session::gateway::{FilePayload, HistoryEntry, SendReply};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn summary(id: &str) -> ConversationSummary {
        ConversationSummary {
            conversation_id: id.to_string(),
            preview: Some(format!("preview {id}")),
            last_updated: "2026-01-01T00:00:00".to_string(),
            message_count: 2,
        }
    }

    fn reply(text: &str, conversation_id: &str) -> SendReply {
        SendReply {
            response: text.to_string(),
            conversation_id: conversation_id.to_string(),
            file: None,
        }
    }

    /// Scriptable in-memory gateway.
    struct MockGateway {
        send_results: Mutex<VecDeque<Result<SendReply>>>,
        history: Mutex<HashMap<String, Result<Vec<HistoryEntry>>>>,
        list_result: Mutex<Result<Vec<ConversationSummary>>>,
        delete_failures: Mutex<HashMap<String, ClientError>>,
        list_calls: AtomicUsize,
        /// When set, `send_message` blocks until the notify fires.
        send_gate: Option<Notify>,
    }

    impl MockGateway {
        fn new() -> Self {
            Self {
                send_results: Mutex::new(VecDeque::new()),
                history: Mutex::new(HashMap::new()),
                list_result: Mutex::new(Ok(Vec::new())),
                delete_failures: Mutex::new(HashMap::new()),
                list_calls: AtomicUsize::new(0),
                send_gate: None,
            }
        }

        fn gated() -> Self {
            Self {
                send_gate: Some(Notify::new()),
                ..Self::new()
            }
        }

        fn queue_reply(&self, r: Result<SendReply>) {
            self.send_results.lock().unwrap().push_back(r);
        }

        fn set_list(&self, r: Result<Vec<ConversationSummary>>) {
            *self.list_result.lock().unwrap() = r;
        }

        fn set_history(&self, id: &str, r: Result<Vec<HistoryEntry>>) {
            self.history.lock().unwrap().insert(id.to_string(), r);
        }

        fn fail_delete(&self, id: &str, err: ClientError) {
            self.delete_failures.lock().unwrap().insert(id.to_string(), err);
        }
    }

    #[async_trait]
    impl BackendGateway for MockGateway {
        async fn send_message(
            &self,
            _text: &str,
            _conversation_id: Option<&str>,
            _attachments: &[OutgoingAttachment],
        ) -> Result<SendReply> {
            if let Some(gate) = &self.send_gate {
                gate.notified().await;
            }
            self.send_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ClientError::internal("no scripted reply")))
        }

        async fn get_history(&self, conversation_id: &str, _limit: u32) -> Result<Vec<HistoryEntry>> {
            self.history
                .lock()
                .unwrap()
                .get(conversation_id)
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.list_result.lock().unwrap().clone()
        }

        async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
            match self.delete_failures.lock().unwrap().get(conversation_id) {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    fn controller(gateway: Arc<MockGateway>) -> SessionController<MockGateway> {
        SessionController::new(gateway).with_removal_delay(Duration::ZERO)
    }

    async fn signed_in_controller(gateway: Arc<MockGateway>) -> SessionController<MockGateway> {
        let c = controller(gateway);
        c.set_identity(Some("alice".to_string())).await;
        c
    }

    #[tokio::test]
    async fn test_send_round_trip_on_new_conversation() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_reply(Ok(reply("Hello!", "c1")));
        gateway.set_list(Ok(vec![summary("c1")]));
        let controller = signed_in_controller(gateway).await;
        controller.start_new_conversation().await;

        let outcome = controller.send("Hi!", &[]).await;

        assert_eq!(outcome, SendOutcome::Sent);
        let snap = controller.snapshot().await;
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.messages[0].role, MessageRole::User);
        assert_eq!(snap.messages[0].content, "Hi!");
        assert_eq!(snap.messages[1].role, MessageRole::Assistant);
        assert_eq!(snap.messages[1].content, "Hello!");
        assert_eq!(snap.active_conversation_id.as_deref(), Some("c1"));
        assert!(!snap.is_loading);
        assert!(snap.has_started_chat);
        assert_eq!(snap.conversations.len(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_appends_error_message() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_reply(Err(ClientError::transport("Network error")));
        let controller = signed_in_controller(gateway).await;

        controller.send("Hi!", &[]).await;

        let snap = controller.snapshot().await;
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.messages[1].role, MessageRole::Error);
        assert!(snap.messages[1].content.contains("Network error"));
        assert!(!snap.is_loading);
    }

    #[tokio::test]
    async fn test_empty_send_is_skipped() {
        let gateway = Arc::new(MockGateway::new());
        let controller = signed_in_controller(gateway).await;

        assert_eq!(controller.send("   ", &[]).await, SendOutcome::Skipped);
        assert!(controller.snapshot().await.messages.is_empty());
    }

    #[tokio::test]
    async fn test_second_send_while_in_flight_is_skipped() {
        let gateway = Arc::new(MockGateway::gated());
        gateway.queue_reply(Ok(reply("Hello!", "c1")));
        let controller = Arc::new(signed_in_controller(gateway.clone()).await);

        let first = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.send("first", &[]).await })
        };
        // Let the first send reach the gateway and suspend.
        tokio::task::yield_now().await;
        while !controller.snapshot().await.is_loading {
            tokio::task::yield_now().await;
        }

        assert_eq!(controller.send("second", &[]).await, SendOutcome::Skipped);

        gateway.send_gate.as_ref().unwrap().notify_one();
        assert_eq!(first.await.unwrap(), SendOutcome::Sent);

        // Exactly one user message and one reply.
        let snap = controller.snapshot().await;
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.messages[0].content, "first");
    }

    #[tokio::test]
    async fn test_stale_send_reply_is_discarded_after_switch() {
        let gateway = Arc::new(MockGateway::gated());
        gateway.queue_reply(Ok(reply("late reply", "c1")));
        gateway.set_history(
            "c2",
            Ok(vec![HistoryEntry {
                role: "user".to_string(),
                content: "older question".to_string(),
                timestamp: "2026-01-01T00:00:00".to_string(),
            }]),
        );
        let controller = Arc::new(signed_in_controller(gateway.clone()).await);

        let send = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.send("Hi!", &[]).await })
        };
        while !controller.snapshot().await.is_loading {
            tokio::task::yield_now().await;
        }

        // User opens another conversation while the send is pending.
        controller.load_conversation("c2").await.unwrap();

        gateway.send_gate.as_ref().unwrap().notify_one();
        send.await.unwrap();

        let snap = controller.snapshot().await;
        assert_eq!(snap.active_conversation_id.as_deref(), Some("c2"));
        assert_eq!(snap.messages.len(), 1);
        assert_eq!(snap.messages[0].content, "older question");
        assert!(!snap.is_loading);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_list(Ok(vec![summary("c1"), summary("c2")]));
        let controller = signed_in_controller(gateway).await;

        controller.refresh().await.unwrap();
        let first = controller.snapshot().await.conversations;
        controller.refresh().await.unwrap();
        let second = controller.snapshot().await.conversations;

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_without_identity_is_noop() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_list(Ok(vec![summary("c1")]));
        let controller = controller(gateway.clone());

        controller.refresh().await.unwrap();

        assert_eq!(gateway.list_calls.load(Ordering::SeqCst), 0);
        assert!(controller.snapshot().await.conversations.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_stale_directory() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_list(Ok(vec![summary("c1")]));
        let controller = signed_in_controller(gateway.clone()).await;
        controller.refresh().await.unwrap();

        gateway.set_list(Err(ClientError::transport("offline")));
        assert!(controller.refresh().await.is_err());

        assert_eq!(controller.snapshot().await.conversations.len(), 1);
    }

    #[tokio::test]
    async fn test_deletion_rollback_on_failure() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_list(Ok(vec![summary("c1")]));
        gateway.fail_delete("c1", ClientError::rejected(500, "nope"));
        let controller = signed_in_controller(gateway).await;
        controller.refresh().await.unwrap();

        let result = controller.remove("c1").await;

        assert!(result.is_err());
        let snap = controller.snapshot().await;
        assert!(snap.deleting_ids.is_empty());
        assert_eq!(snap.conversations.len(), 1);
    }

    #[tokio::test]
    async fn test_deletion_of_active_conversation_resets_session() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_list(Ok(vec![summary("c1"), summary("c2")]));
        gateway.set_history(
            "c1",
            Ok(vec![HistoryEntry {
                role: "user".to_string(),
                content: "hello".to_string(),
                timestamp: "2026-01-01T00:00:00".to_string(),
            }]),
        );
        let controller = signed_in_controller(gateway.clone()).await;
        controller.refresh().await.unwrap();
        controller.load_conversation("c1").await.unwrap();

        gateway.set_list(Ok(vec![summary("c2")]));
        controller.remove("c1").await.unwrap();

        let snap = controller.snapshot().await;
        assert!(snap.deleting_ids.is_empty());
        assert!(snap.conversations.iter().all(|c| c.conversation_id != "c1"));
        assert!(snap.messages.is_empty());
        assert_eq!(snap.active_conversation_id, None);
        assert!(!snap.has_started_chat);
    }

    #[tokio::test]
    async fn test_load_conversation_dedups_consecutive_duplicates() {
        let gateway = Arc::new(MockGateway::new());
        let row = |role: &str, content: &str| HistoryEntry {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: "2026-01-01T00:00:00".to_string(),
        };
        gateway.set_history(
            "c1",
            Ok(vec![
                row("user", "hello"),
                row("user", "hello "),
                row("assistant", "hi there"),
            ]),
        );
        let controller = signed_in_controller(gateway).await;

        controller.load_conversation("c1").await.unwrap();

        let snap = controller.snapshot().await;
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.messages[0].role, MessageRole::User);
        assert_eq!(snap.messages[1].role, MessageRole::Assistant);
        assert!(snap.has_started_chat);
    }

    #[tokio::test]
    async fn test_load_conversation_failure_leaves_state_untouched() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_reply(Ok(reply("Hello!", "c1")));
        gateway.set_history("c2", Err(ClientError::transport("offline")));
        let controller = signed_in_controller(gateway).await;
        controller.send("Hi!", &[]).await;

        assert!(controller.load_conversation("c2").await.is_err());

        let snap = controller.snapshot().await;
        assert_eq!(snap.active_conversation_id.as_deref(), Some("c1"));
        assert_eq!(snap.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_identity_absent_clears_directory_only() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_reply(Ok(reply("Hello!", "c1")));
        gateway.set_list(Ok(vec![summary("c1")]));
        let controller = signed_in_controller(gateway).await;
        controller.send("Hi!", &[]).await;
        assert_eq!(controller.snapshot().await.conversations.len(), 1);

        controller.set_identity(None).await;

        let snap = controller.snapshot().await;
        assert!(snap.conversations.is_empty());
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.active_conversation_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_identity_present_triggers_directory_refresh() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_list(Ok(vec![summary("c1")]));
        let controller = controller(gateway.clone());

        controller.set_identity(Some("alice".to_string())).await;

        assert_eq!(gateway.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(controller.snapshot().await.conversations.len(), 1);
    }

    #[tokio::test]
    async fn test_send_carries_attached_file_into_message() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_reply(Ok(SendReply {
            response: "[IMAGE_READY] Rendered your chart".to_string(),
            conversation_id: "c1".to_string(),
            file: Some(FilePayload {
                filename: "chart.png".to_string(),
                mime_type: "image/png".to_string(),
                content: "aGVsbG8=".to_string(),
            }),
        }));
        let controller = signed_in_controller(gateway).await;

        controller.send("draw a chart", &[]).await;

        let snap = controller.snapshot().await;
        let file = snap.messages[1].attached_file.as_ref().unwrap();
        assert_eq!(file.filename, "chart.png");
        assert!(file.is_image);
        assert_eq!(snap.messages[1].content, "Rendered your chart");
    }
}
