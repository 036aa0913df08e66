//! Context management module
//!
//! Token estimation and sliding-window history selection.

pub mod counter;
pub mod window;

// Re-export commonly used types
pub use counter::TokenCounter;
pub use window::{ContextWindow, WindowBuilder, DEFAULT_MAX_HISTORY_MESSAGES};
