//! HTTP implementation of the backend gateway.
//!
//! Talks to the task-dispatch backend's REST API:
//!
//! - `POST   /api/tasks/message` (multipart form)
//! - `GET    /api/tasks/history/{conversation_id}?limit=N`
//! - `GET    /api/tasks/conversations`
//! - `DELETE /api/tasks/conversations/{conversation_id}`
//!
//! Failures are classified into `ClientError::Transport` (connectivity, no
//! structured body) and `ClientError::Rejected` (non-success status; the
//! backend puts its message in a JSON `detail` field).

use crate::config::GatewayConfig;
use async_trait::async_trait;
use parley_core::error::{ClientError, Result};
use parley_core::session::{
    BackendGateway, ConversationSummary, HistoryEntry, OutgoingAttachment, SendReply,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Sends wait on the whole dispatch pipeline (master controller plus a
/// worker), so they get a much longer timeout than reads.
const SEND_TIMEOUT: Duration = Duration::from_secs(180);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway to the task-dispatch backend over HTTP.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    server_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    messages: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
struct ConversationsResponse {
    conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

impl HttpGateway {
    /// Creates a gateway from resolved configuration.
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            client: Client::new(),
            server_url: config.server_url.trim_end_matches('/').to_string(),
            token: config.token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    /// Converts a non-success response into a `Rejected` error.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::rejected(
            status.as_u16(),
            rejection_message(status, &body),
        ))
    }
}

/// Extracts the backend's `detail` message from an error body, falling back
/// to the raw body and then to the status line.
fn rejection_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.detail;
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    format!(
        "Server error ({})",
        status.canonical_reason().unwrap_or("unknown status")
    )
}

#[async_trait]
impl BackendGateway for HttpGateway {
    async fn send_message(
        &self,
        text: &str,
        conversation_id: Option<&str>,
        attachments: &[OutgoingAttachment],
    ) -> Result<SendReply> {
        let mut form = Form::new().text("message", text.to_string());
        if let Some(id) = conversation_id {
            form = form.text("conversation_id", id.to_string());
        }
        for attachment in attachments {
            let part = Part::bytes(attachment.bytes.clone())
                .file_name(attachment.filename.clone())
                .mime_str(&attachment.mime_type)
                .map_err(|e| {
                    ClientError::internal(format!(
                        "invalid MIME type '{}': {}",
                        attachment.mime_type, e
                    ))
                })?;
            form = form.part("files", part);
        }

        tracing::debug!(?conversation_id, attachments = attachments.len(), "sending message");
        let request = self
            .client
            .post(self.url("/api/tasks/message"))
            .multipart(form)
            .timeout(SEND_TIMEOUT);
        let response = Self::check(self.authorize(request).send().await?).await?;
        Ok(response.json::<SendReply>().await?)
    }

    async fn get_history(&self, conversation_id: &str, limit: u32) -> Result<Vec<HistoryEntry>> {
        let request = self
            .client
            .get(self.url(&format!("/api/tasks/history/{conversation_id}")))
            .query(&[("limit", limit)])
            .timeout(READ_TIMEOUT);
        let response = Self::check(self.authorize(request).send().await?).await?;
        Ok(response.json::<HistoryResponse>().await?.messages)
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let request = self
            .client
            .get(self.url("/api/tasks/conversations"))
            .timeout(READ_TIMEOUT);
        let response = Self::check(self.authorize(request).send().await?).await?;
        Ok(response.json::<ConversationsResponse>().await?.conversations)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let request = self
            .client
            .delete(self.url(&format!("/api/tasks/conversations/{conversation_id}")))
            .timeout(READ_TIMEOUT);
        Self::check(self.authorize(request).send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_message_prefers_detail_field() {
        let msg = rejection_message(
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"detail": "Master controller is not responding"}"#,
        );
        assert_eq!(msg, "Master controller is not responding");
    }

    #[test]
    fn test_rejection_message_falls_back_to_raw_body() {
        let msg = rejection_message(StatusCode::BAD_GATEWAY, "upstream exploded");
        assert_eq!(msg, "upstream exploded");
    }

    #[test]
    fn test_rejection_message_falls_back_to_status() {
        let msg = rejection_message(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(msg, "Server error (Service Unavailable)");
    }

    #[test]
    fn test_url_strips_trailing_slash() {
        let gateway = HttpGateway::new(GatewayConfig::new("http://localhost:8000/", None));
        assert_eq!(
            gateway.url("/api/tasks/conversations"),
            "http://localhost:8000/api/tasks/conversations"
        );
    }
}
