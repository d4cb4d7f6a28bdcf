//! Chunk index — maps logical keys to chunk numbers and tracks which
//! chunks physically exist.
//!
//! The index lives in memory but is **persistent**: chunk files are named
//! after the first logical key they hold (`1`, `1001`, …), so on startup
//! the index is rebuilt by listing the storage directory. No separate
//! index file is written.

use std::collections::BTreeSet;

use tracing::warn;

use crate::error::{Result, StoreError};

/// In-memory bookkeeping for all chunks of one store.
///
/// Chunk numbers are 1-based: chunk `n` owns the keys
/// `[(n-1)*chunk_size + 1, n*chunk_size]`.
#[derive(Debug)]
pub struct ChunkIndex {
    chunk_size: u64,
    /// Chunk numbers that physically exist, ascending.
    chunks: BTreeSet<u64>,
    /// The chunk currently open for writing, if any.
    active: Option<u64>,
}

impl ChunkIndex {
    pub fn new(chunk_size: u64) -> Self {
        ChunkIndex {
            chunk_size,
            chunks: BTreeSet::new(),
            active: None,
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Chunk number owning `key`.
    pub fn chunk_for(&self, key: u64) -> Result<u64> {
        if key == 0 {
            return Err(StoreError::InvalidKey(key));
        }
        Ok(key.div_ceil(self.chunk_size))
    }

    /// First logical key held by `chunk`.
    pub fn first_key_of(&self, chunk: u64) -> u64 {
        (chunk - 1) * self.chunk_size + 1
    }

    /// Last logical key `chunk` can hold. May exceed the actual record
    /// count while the chunk is partial.
    pub fn last_key_of(&self, chunk: u64) -> u64 {
        chunk * self.chunk_size
    }

    /// Register a chunk as physically existing.
    pub fn insert(&mut self, chunk: u64) {
        self.chunks.insert(chunk);
    }

    pub fn contains(&self, chunk: u64) -> bool {
        self.chunks.contains(&chunk)
    }

    /// Highest existing chunk number.
    pub fn latest(&self) -> Option<u64> {
        self.chunks.last().copied()
    }

    /// Existing chunk numbers in ascending order.
    pub fn chunks(&self) -> impl Iterator<Item = u64> + '_ {
        self.chunks.iter().copied()
    }

    /// Number of chunks that physically exist.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn active(&self) -> Option<u64> {
        self.active
    }

    pub fn set_active(&mut self, chunk: Option<u64>) {
        self.active = chunk;
    }

    /// Rebuild the chunk set from a directory listing of chunk file names.
    /// Each name is the decimal first key of its chunk; names that do not
    /// parse or do not sit on a chunk boundary are skipped.
    pub fn rebuild(&mut self, file_names: impl Iterator<Item = String>) {
        self.chunks.clear();
        self.active = None;
        for name in file_names {
            let Ok(first_key) = name.parse::<u64>() else {
                warn!(name = %name, "ignoring non-numeric file in storage dir");
                continue;
            };
            if first_key == 0 || (first_key - 1) % self.chunk_size != 0 {
                warn!(
                    name = %name,
                    chunk_size = self.chunk_size,
                    "ignoring chunk file not aligned to a chunk boundary"
                );
                continue;
            }
            self.chunks.insert((first_key - 1) / self.chunk_size + 1);
        }
    }

    /// Forget all chunks and the active cursor.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.active = None;
    }
}
