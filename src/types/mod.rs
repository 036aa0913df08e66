//! Type definitions module
//!
//! Core conversation types shared by the session store, the window
//! builder and the provider adapters.

pub mod messages;

// Re-export commonly used types
pub use messages::{Attachment, Message, Role};
