//! Session management
//!
//! - `types`: session records, settings and partial updates
//! - `store`: shared in-memory store with per-session serialized mutation

pub mod store;
pub mod types;

// Re-export key types
pub use store::SessionStore;
pub use types::{
    Session, SessionId, SessionSettings, SessionSummary, SessionUpdate, DEFAULT_TITLE,
};
