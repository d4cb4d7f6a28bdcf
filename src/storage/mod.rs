//! Storage subsystem — chunk index + chunked record store + chunk backends.

pub mod binary;
pub mod chunk;
pub mod chunked;
pub mod index;
pub mod text;
pub mod writer;

pub use binary::BinaryChunkStore;
pub use chunk::ChunkStore;
pub use chunked::{ChunkedStore, Range};
pub use index::ChunkIndex;
pub use text::TextChunkStore;
