//! localchat - streaming chat for local and OpenAI-compatible models
//!
//! Conversations live in an in-memory session store. Each send request
//! builds a token-bounded history window, streams the reply from the
//! session's provider and persists the exchange once the request ends.
//!
//! # Architecture
//!
//! - **Core**: sessions, history window, provider adapters, stream normalization
//! - **Orchestration**: per-session cancellable generations
//! - **Extras**: web search grounding, attachments, terminal REPL

// Core
pub mod errors;
pub mod types;
pub mod context;
pub mod streaming;
pub mod providers;
pub mod models;
pub mod session;

// Re-export commonly used types
pub use errors::{ChatError, Result};

// Orchestration
pub mod chat;
pub use chat::{ChatEvent, ChatOrchestrator, ChatStream, SendRequest};

// Request enrichment
pub mod attachments;
pub mod search;

// Interface layer
pub mod cli;
pub mod config;
pub mod repl;
