//! Error types for the Parley client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the whole client.
///
/// Gateway implementations classify every failed backend call into one of
/// these variants; the session controller only ever inspects the variant,
/// never the underlying transport error.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ClientError {
    /// Network/connectivity failure with no structured body from the server.
    #[error("Network error: {message}")]
    Transport { message: String },

    /// The backend answered with a non-success status and a structured
    /// error message.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A response arrived but could not be decoded into the expected shape.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Configuration error (missing server URL, unreadable config file).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Creates a Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a Rejected error
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a Transport error
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Check if this is a Rejected error
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Human-readable text suitable for rendering inline in a conversation.
    ///
    /// This is what ends up in the body of an error-role [`Message`] when a
    /// send fails.
    ///
    /// [`Message`]: crate::session::Message
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport { message } => format!("Network error: {message}"),
            Self::Rejected { message, .. } => message.clone(),
            Self::Decode(message) => format!("Unexpected server response: {message}"),
            Self::Config(message) => format!("Configuration error: {message}"),
            Self::Internal(message) => message.clone(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// A type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_for_transport() {
        let err = ClientError::transport("connection refused");
        assert_eq!(err.user_message(), "Network error: connection refused");
        assert!(err.is_transport());
    }

    #[test]
    fn test_user_message_for_rejected_is_detail_only() {
        let err = ClientError::rejected(503, "Master controller is not responding");
        assert_eq!(err.user_message(), "Master controller is not responding");
        assert!(err.is_rejected());
    }
}
