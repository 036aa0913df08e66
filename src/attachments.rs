//! Attachment expansion for outbound user turns
//!
//! Images stay attached so each adapter can send them in its native form.
//! Other files are decoded and inlined into the message text as
//! `[Content of NAME]` blocks. The persisted history keeps the original
//! attachments untouched.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;

use crate::errors::{ChatError, Result};
use crate::types::{Attachment, Message};

/// Media type guessed from a file extension
pub fn media_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        _ => "text/plain",
    }
}

/// Wrap raw bytes as a data URI attachment
pub fn from_bytes(name: impl Into<String>, media_type: &str, bytes: &[u8]) -> Attachment {
    let data_url = format!("data:{};base64,{}", media_type, STANDARD.encode(bytes));
    Attachment::new(name, media_type, data_url)
}

/// Read a local file into an attachment
pub fn from_path(path: &Path) -> Result<Attachment> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(from_bytes(name, media_type_for(path), &bytes))
}

/// Decode the base64 payload of a data URI
pub fn decode(attachment: &Attachment) -> Result<Vec<u8>> {
    STANDARD
        .decode(attachment.base64_payload().trim())
        .map_err(|e| ChatError::InvalidAttachment(format!("{}: {}", attachment.name, e)))
}

/// Text block describing a non-image attachment
pub fn inline_text(attachment: &Attachment) -> String {
    if attachment.is_pdf() {
        return format!(
            "[Attached PDF: {} (text extraction is not supported)]",
            attachment.name
        );
    }

    match decode(attachment) {
        Ok(bytes) => format!(
            "[Content of {}]\n{}",
            attachment.name,
            String::from_utf8_lossy(&bytes)
        ),
        Err(e) => {
            tracing::warn!(file = %attachment.name, error = %e, "Could not read attachment");
            format!("[Attached file: {} could not be read]", attachment.name)
        }
    }
}

/// Build the user turn sent to the provider.
///
/// `content` may already carry search augmentation; the result keeps only
/// image attachments.
pub fn outbound_user_turn(content: &str, attachments: &[Attachment]) -> Message {
    let (images, files): (Vec<&Attachment>, Vec<&Attachment>) =
        attachments.iter().partition(|a| a.is_image());

    let mut text = content.to_string();
    if !files.is_empty() {
        let blocks: Vec<String> = files.into_iter().map(inline_text).collect();
        text.push_str("\n\n");
        text.push_str(&blocks.join("\n\n"));
    }

    Message::user(text).with_attachments(images.into_iter().cloned().collect())
}
