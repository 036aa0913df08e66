//! Streaming primitives
//!
//! Incremental framing, cancellation and the normalized chunk stream that
//! every provider adapter produces.

pub mod cancel;
pub mod normalize;
pub mod parser;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use normalize::{normalize, ByteStream, ChunkStream, StreamChunk, WireDecoder, WireEvent};
pub use parser::{LineParser, SseParser, MAX_BUFFER_SIZE};
