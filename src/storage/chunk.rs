//! Per-chunk backend contract.
//!
//! A chunk store owns one sequential file holding the records of a single
//! chunk, addressed by 1-based local key (the record's position within the
//! file). The outer [`ChunkedStore`](crate::storage::chunked::ChunkedStore)
//! is generic over this trait, so the physical format is chosen by type
//! parameter at construction: see [`TextChunkStore`](super::TextChunkStore)
//! and [`BinaryChunkStore`](super::BinaryChunkStore).

use std::path::Path;

use crate::error::Result;

/// One sequential store over a single chunk file.
///
/// `put` must leave every appended record visible to readers that open the
/// same path independently (flush to the OS per append); `durable`
/// additionally forces the data to disk before `put` returns.
pub trait ChunkStore: Sized {
    /// Owned iterator over the chunk's records in local-key order.
    type Iter: Iterator<Item = Result<Vec<u8>>>;

    /// Open the chunk file at `path`, creating it if absent. Counts the
    /// records already present.
    fn open(path: &Path, durable: bool) -> Result<Self>;

    /// Append one record.
    fn put(&mut self, value: &[u8]) -> Result<()>;

    /// Read the record at `local_key` (1-based). `None` if the key lies
    /// outside the records currently held.
    fn get(&self, local_key: u64) -> Result<Option<Vec<u8>>>;

    /// Fresh reader over all records, independent of the write handle.
    fn iter(&self) -> Result<Self::Iter>;

    /// Number of records currently held.
    fn num_keys(&self) -> u64;

    /// Flush and release the file handle.
    fn close(self) -> Result<()>;

    /// Wipe this chunk's backing file.
    fn destroy(self) -> Result<()>;
}
