//! Message types for chat history
//!
//! Defines the conversation turns stored in a session and sent to a
//! provider. Messages are immutable once appended to a session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt (only ever produced by the window builder)
    System,

    /// Human turn
    User,

    /// Model turn
    Assistant,
}

impl Role {
    /// Wire name shared by both backend protocols
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File attached to a user turn, carried inline as a data URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Original file name
    pub name: String,

    /// Media type (e.g. "image/png", "text/plain")
    pub media_type: String,

    /// `data:<media-type>;base64,<payload>`
    pub data_url: String,
}

impl Attachment {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, data_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            data_url: data_url.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    pub fn is_pdf(&self) -> bool {
        self.media_type == "application/pdf" || self.name.to_lowercase().ends_with(".pdf")
    }

    /// Base64 payload with the data URI prefix stripped
    pub fn base64_payload(&self) -> &str {
        match self.data_url.split_once(',') {
            Some((_, payload)) => payload,
            None => &self.data_url,
        }
    }
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attach files to this turn
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn has_images(&self) -> bool {
        self.attachments.iter().any(Attachment::is_image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        let msg = Message::assistant("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_attachments_deserialize_default() {
        let msg: Message = serde_json::from_str(r#"{"role":"user","content":"x"}"#).unwrap();
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn test_base64_payload() {
        let att = Attachment::new("a.png", "image/png", "data:image/png;base64,AAAA");
        assert_eq!(att.base64_payload(), "AAAA");
        assert!(att.is_image());

        let bare = Attachment::new("a.txt", "text/plain", "aGk=");
        assert_eq!(bare.base64_payload(), "aGk=");
        assert!(!bare.is_image());
    }

    #[test]
    fn test_pdf_detection() {
        assert!(Attachment::new("doc.PDF", "application/octet-stream", "").is_pdf());
        assert!(Attachment::new("doc", "application/pdf", "").is_pdf());
        assert!(!Attachment::new("notes.md", "text/markdown", "").is_pdf());
    }
}
