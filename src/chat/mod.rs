//! Chat orchestration
//!
//! Per-session, cancellable streaming requests with exactly-once delivery
//! of tokens to the caller.

pub mod events;
pub mod handle;
pub mod orchestrator;
pub mod state;

// Re-export commonly used types
pub use events::ChatEvent;
pub use handle::{ActiveGuard, ActiveStreams, RelayLog, StreamHandle};
pub use orchestrator::{ChatOrchestrator, ChatStream, SendRequest, DEFAULT_EVENT_BUFFER};
pub use state::{StreamEvent, StreamState};
