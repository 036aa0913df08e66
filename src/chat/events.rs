//! Events delivered to the caller of a send request
//!
//! Per request: zero or more `{"token": ...}` events, then exactly one of
//! `{"content": ...}` or `{"error": ...}`. A cancelled request simply ends
//! after the tokens already delivered.

use serde::Serialize;

use crate::errors::ChatError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatEvent {
    Token { token: String },
    Done { content: String },
    Error { error: String, kind: &'static str },
}

impl ChatEvent {
    pub fn token(text: impl Into<String>) -> Self {
        ChatEvent::Token { token: text.into() }
    }

    pub fn done(content: impl Into<String>) -> Self {
        ChatEvent::Done {
            content: content.into(),
        }
    }
}

impl From<&ChatError> for ChatEvent {
    fn from(error: &ChatError) -> Self {
        ChatEvent::Error {
            error: error.user_message(),
            kind: error.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shapes() {
        assert_eq!(
            serde_json::to_string(&ChatEvent::token("Hel")).unwrap(),
            r#"{"token":"Hel"}"#
        );
        assert_eq!(
            serde_json::to_string(&ChatEvent::done("Hello")).unwrap(),
            r#"{"content":"Hello"}"#
        );

        let err = ChatEvent::from(&ChatError::ProviderUnavailable {
            endpoint: "http://localhost:11434".into(),
            reason: "connection refused".into(),
        });
        let json: serde_json::Value = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "provider_unavailable");
        assert!(json["error"].as_str().unwrap().contains("localhost:11434"));
    }
}
