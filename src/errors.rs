//! Error types for localchat
//!
//! One crate-wide error enum covers provider, session and streaming
//! failures. Every variant maps to a short user-facing message so callers
//! can render a failure in place of the assistant turn.

use thiserror::Error;

/// Main error type for the chat core
#[derive(Error, Debug)]
pub enum ChatError {
    /// Backend could not be reached (connection refused, DNS, TLS, dropped socket)
    #[error("Provider unavailable at {endpoint}: {reason}")]
    ProviderUnavailable { endpoint: String, reason: String },

    /// Backend rejected the credential (HTTP 401/403)
    #[error("Provider rejected credential: {0}")]
    ProviderAuthError(String),

    /// Backend answered with a non-success status that is not an auth failure
    #[error("Provider returned HTTP {status}: {body}")]
    ProviderRejected { status: u16, body: String },

    /// Backend reported an error object inside an open stream
    #[error("Provider reported an error mid-stream: {0}")]
    ProviderStreamError(String),

    /// Model absent from the provider inventory
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Session id unknown to the store
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session already has a generation in flight
    #[error("Session {0} already has an active generation")]
    SessionBusy(String),

    /// Session has no model selected
    #[error("No model selected for session {0}")]
    NoModelSelected(String),

    /// No chunk arrived within the idle window, or the connection took too long
    #[error("Stream timed out after {duration_ms}ms without data")]
    StreamTimeout { duration_ms: u64 },

    /// Backend violated its own wire protocol
    #[error("Malformed provider response: {0}")]
    MalformedProviderResponse(String),

    /// Stream state machine received an event it has no edge for
    #[error("Invalid stream transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    /// Attachment payload could not be decoded
    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

impl ChatError {
    /// Classify a transport-level reqwest failure.
    ///
    /// Timeouts become `StreamTimeout`, everything else that never produced
    /// an HTTP status is treated as an unreachable backend.
    pub fn from_transport(endpoint: &str, err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            return ChatError::StreamTimeout {
                duration_ms: timeout_ms,
            };
        }
        ChatError::ProviderUnavailable {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ChatError::ProviderAuthError(if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                body
            }),
            _ => ChatError::ProviderRejected { status, body },
        }
    }

    /// Stable snake_case label for logs and error events
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::ProviderUnavailable { .. } => "provider_unavailable",
            ChatError::ProviderAuthError(_) => "provider_auth_error",
            ChatError::ProviderRejected { .. } => "provider_rejected",
            ChatError::ProviderStreamError(_) => "provider_stream_error",
            ChatError::ModelNotFound(_) => "model_not_found",
            ChatError::SessionNotFound(_) => "session_not_found",
            ChatError::SessionBusy(_) => "session_busy",
            ChatError::NoModelSelected(_) => "no_model_selected",
            ChatError::StreamTimeout { .. } => "stream_timeout",
            ChatError::MalformedProviderResponse(_) => "malformed_provider_response",
            ChatError::InvalidTransition { .. } => "invalid_transition",
            ChatError::InvalidAttachment(_) => "invalid_attachment",
            ChatError::Config(_) => "config",
            ChatError::Http(_) => "http",
            ChatError::Serialization(_) => "serialization",
            ChatError::Io(_) => "io",
        }
    }

    /// Short human-readable message for display in the conversation
    pub fn user_message(&self) -> String {
        match self {
            ChatError::ProviderUnavailable { endpoint, .. } => {
                format!("Could not reach the model server at {}. Is it running?", endpoint)
            }
            ChatError::ProviderAuthError(_) => {
                "The provider rejected the API key. Check your credentials.".to_string()
            }
            ChatError::ProviderRejected { status, body } => {
                if body.is_empty() {
                    format!("The provider refused the request (HTTP {}).", status)
                } else {
                    format!("The provider refused the request (HTTP {}): {}", status, body)
                }
            }
            ChatError::ProviderStreamError(reason) => {
                format!("The model failed while answering: {}", reason)
            }
            ChatError::ModelNotFound(model) => {
                format!("Model '{}' is not available on this provider.", model)
            }
            ChatError::SessionNotFound(_) => "This chat no longer exists.".to_string(),
            ChatError::SessionBusy(_) => {
                "A response is still being generated. Stop it or wait for it to finish."
                    .to_string()
            }
            ChatError::NoModelSelected(_) => "Select a model before sending a message.".to_string(),
            ChatError::StreamTimeout { duration_ms } => format!(
                "The model stopped responding ({}s without output).",
                duration_ms / 1000
            ),
            ChatError::MalformedProviderResponse(_) => {
                "The provider sent a response that could not be understood.".to_string()
            }
            other => other.to_string(),
        }
    }
}
