//! Session records
//!
//! A session is an isolated conversation: its own history, system prompt
//! and provider settings. Sessions are owned exclusively by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::config::{
    Config, DEFAULT_LOCAL_CONTEXT, DEFAULT_LOCAL_MAX_TOKENS, DEFAULT_REMOTE_CONTEXT,
    DEFAULT_REMOTE_MAX_TOKENS,
};
use crate::errors::{ChatError, Result};
use crate::providers::ProviderKind;
use crate::types::Message;

/// Title new sessions start with; replaced by the first user message
pub const DEFAULT_TITLE: &str = "New Chat";

/// Characters of the first user message kept as the title
pub const TITLE_LENGTH: usize = 50;

/// Opaque session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ChatError::SessionNotFound(s.to_string()))
    }
}

/// Per-session provider and generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub provider: ProviderKind,

    /// Endpoint override; the configured URL for `provider` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Credential override (remote only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub max_context_tokens: usize,
    pub max_response_tokens: usize,
    pub temperature: f32,
    pub low_resource_mode: bool,
}

impl SessionSettings {
    /// Defaults for a provider kind, taking model and generation knobs from config
    pub fn for_provider(provider: ProviderKind, config: &Config) -> Self {
        let (max_context_tokens, max_response_tokens) = match provider {
            ProviderKind::Local => (DEFAULT_LOCAL_CONTEXT, DEFAULT_LOCAL_MAX_TOKENS),
            ProviderKind::Remote => (DEFAULT_REMOTE_CONTEXT, DEFAULT_REMOTE_MAX_TOKENS),
        };

        let model = if provider == config.defaults.provider {
            config.defaults.model.clone()
        } else {
            None
        };

        Self {
            provider,
            base_url: None,
            api_key: None,
            model,
            max_context_tokens,
            max_response_tokens,
            temperature: config.defaults.temperature,
            low_resource_mode: config.defaults.low_resource_mode,
        }
    }

    /// Settings for the configured default provider
    pub fn from_config(config: &Config) -> Self {
        Self::for_provider(config.defaults.provider, config)
    }
}

/// One conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,

    /// Append-only apart from a full clear
    pub messages: Vec<Message>,

    pub system_prompt: String,
    pub settings: SessionSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(title: impl Into<String>, system_prompt: impl Into<String>, settings: SessionSettings) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            title: title.into(),
            messages: Vec::new(),
            system_prompt: system_prompt.into(),
            settings,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            title: self.title.clone(),
            message_count: self.messages.len(),
            provider: self.settings.provider,
            model: self.settings.model.clone(),
            updated_at: self.updated_at,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Append one message, deriving the title from the first user turn
    pub(crate) fn push(&mut self, message: Message) {
        if message.role == crate::types::Role::User && self.title == DEFAULT_TITLE {
            self.title = title_from(&message.content);
        }
        self.messages.push(message);
    }
}

/// Title derived from message text
pub fn title_from(content: &str) -> String {
    let trimmed = content.trim();
    let mut title: String = trimmed.chars().take(TITLE_LENGTH).collect();
    if trimmed.chars().count() > TITLE_LENGTH {
        title.push_str("...");
    }
    title
}

/// Listing row
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub message_count: usize,
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub title: Option<String>,
    pub system_prompt: Option<String>,
    pub settings: Option<SessionSettings>,
    pub model: Option<String>,
}

impl SessionUpdate {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(prompt.into()),
            ..Default::default()
        }
    }

    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Default::default()
        }
    }

    pub fn settings(settings: SessionSettings) -> Self {
        Self {
            settings: Some(settings),
            ..Default::default()
        }
    }

    pub(crate) fn apply(self, session: &mut Session) {
        if let Some(title) = self.title {
            session.title = title;
        }
        if let Some(prompt) = self.system_prompt {
            session.system_prompt = prompt;
        }
        if let Some(settings) = self.settings {
            session.settings = settings;
        }
        // Applied after `settings` so a combined update keeps the explicit model
        if let Some(model) = self.model {
            session.settings.model = Some(model);
        }
        session.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_truncation() {
        assert_eq!(title_from("  Hello there  "), "Hello there");
        let long = "a".repeat(60);
        let title = title_from(&long);
        assert_eq!(title, format!("{}...", "a".repeat(50)));
        assert_eq!(title_from(&"é".repeat(50)), "é".repeat(50));
    }

    #[test]
    fn test_settings_per_provider() {
        let mut config = Config::default();
        config.defaults.model = Some("llama3.1:8b".to_string());

        let local = SessionSettings::for_provider(ProviderKind::Local, &config);
        assert_eq!(local.max_context_tokens, 4096);
        assert_eq!(local.max_response_tokens, 800);
        assert_eq!(local.model.as_deref(), Some("llama3.1:8b"));

        let remote = SessionSettings::for_provider(ProviderKind::Remote, &config);
        assert_eq!(remote.max_context_tokens, 8192);
        assert_eq!(remote.max_response_tokens, 2048);
        assert!(remote.model.is_none());
    }

    #[test]
    fn test_session_id_parse() {
        let id = SessionId::new();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
        assert!(matches!(
            "nope".parse::<SessionId>(),
            Err(ChatError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_auto_title_only_once() {
        let mut session = Session::new(DEFAULT_TITLE, "sys", SessionSettings::from_config(&Config::default()));
        session.push(Message::assistant("greeting"));
        assert_eq!(session.title, DEFAULT_TITLE);
        session.push(Message::user("First question"));
        session.push(Message::user("Second question"));
        assert_eq!(session.title, "First question");
    }

    #[test]
    fn test_update_applies_model_after_settings() {
        let config = Config::default();
        let mut session = Session::new("t", "sys", SessionSettings::from_config(&config));
        let update = SessionUpdate {
            settings: Some(SessionSettings::for_provider(ProviderKind::Remote, &config)),
            model: Some("gpt-4o".to_string()),
            ..Default::default()
        };
        update.apply(&mut session);
        assert_eq!(session.settings.provider, ProviderKind::Remote);
        assert_eq!(session.settings.model.as_deref(), Some("gpt-4o"));
    }
}
