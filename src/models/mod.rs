//! Model metadata module
//!
//! Normalized descriptors for models listed by any provider.

pub mod types;

// Re-export key types for convenience
pub use types::{format_size, ModelDescriptor};
