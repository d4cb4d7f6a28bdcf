//! Chunked record store — one logical ordered key space over many
//! fixed-size chunk files.
//!
//! ```text
//! append(value) ──→ ChunkedStore ──→ active chunk file ("1", "1001", …)
//!                        │
//!                        ├─ get(key)        → transient chunk handle
//!                        ├─ get_range(s, e) → lazy Range iterator
//!                        └─ ChunkIndex      (in-memory, rebuilt on open)
//! ```
//!
//! Keys are dense 1-based integers assigned in append order. Chunk `n`
//! holds keys `[(n-1)*chunk_size + 1, n*chunk_size]`; only the
//! highest-numbered chunk may be partially filled while it is the active
//! (writable) chunk. Chunk files are named after their first key, so the
//! index is rebuilt by listing the storage directory on open.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::{Result, StoreError};
use crate::storage::chunk::ChunkStore;
use crate::storage::index::ChunkIndex;

/// The chunk-indexed record store. Generic over the per-chunk backend,
/// chosen at construction: `ChunkedStore::<TextChunkStore>::open(…)`.
///
/// Single-owner: all mutation goes through `&mut self`, and callers that
/// need to share the store across tasks serialize access themselves (see
/// [`spawn_writer`](crate::storage::writer::spawn_writer)).
pub struct ChunkedStore<C: ChunkStore> {
    dir: PathBuf,
    durable: bool,
    index: ChunkIndex,
    /// Handle of the chunk currently accepting appends.
    active: Option<C>,
    /// Total record count, maintained incrementally. Recomputed once on
    /// open from per-chunk counts, never by full record iteration.
    num_keys: u64,
    closed: bool,
}

impl<C: ChunkStore> ChunkedStore<C> {
    /// Open (or create) a chunked store rooted at `dir`.
    ///
    /// Existing chunk files are discovered by listing the directory; the
    /// latest chunk becomes the active one and `num_keys` is recomputed as
    /// `(chunks - 1) * chunk_size + records(latest)`. Every chunk except
    /// the last is full by construction.
    pub fn open(dir: &Path, chunk_size: u64, durable: bool) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StoreError::Config("chunk_size must be > 0".into()));
        }
        fs::create_dir_all(dir)
            .map_err(|e| StoreError::Storage(format!("Cannot create storage dir: {e}")))?;

        let mut index = ChunkIndex::new(chunk_size);
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        index.rebuild(names.into_iter());

        let mut store = ChunkedStore {
            dir: dir.to_path_buf(),
            durable,
            index,
            active: None,
            num_keys: 0,
            closed: false,
        };
        if let Some(latest) = store.index.latest() {
            let chunk = C::open(&store.chunk_path(latest), durable)?;
            store.num_keys = (store.index.len() as u64 - 1) * chunk_size + chunk.num_keys();
            store.index.set_active(Some(latest));
            store.active = Some(chunk);
            info!(
                dir = ?dir,
                chunks = store.index.len(),
                records = store.num_keys,
                "opened chunked store"
            );
        }
        Ok(store)
    }

    /// Open a chunked store from a validated [`StorageConfig`].
    pub fn from_config(cfg: &StorageConfig) -> Result<Self> {
        Self::open(&cfg.base_path, cfg.chunk_size, cfg.ensure_durability)
    }

    /// Append one record under the next key, returning the key assigned.
    pub fn append(&mut self, value: &[u8]) -> Result<u64> {
        let key = self.num_keys + 1;
        self.put(key, value)?;
        Ok(key)
    }

    /// Append one record under an explicitly supplied key. Keys must arrive
    /// in strictly increasing, gap-free order: `key` has to be exactly
    /// `num_keys() + 1`, anything else fails with `OutOfOrderKey`.
    pub fn put(&mut self, key: u64, value: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if key == 0 {
            return Err(StoreError::InvalidKey(key));
        }
        let expected = self.num_keys + 1;
        if key != expected {
            return Err(StoreError::OutOfOrderKey { expected, got: key });
        }

        let chunk = self.index.chunk_for(key)?;
        if self.index.active() != Some(chunk) || self.active.is_none() {
            // The active chunk is full (or none exists yet): close it and
            // move the write cursor to the chunk owning `key`.
            if let Some(prev) = self.active.take() {
                prev.close()?;
            }
            let path = self.chunk_path(chunk);
            if !self.index.contains(chunk) {
                debug!(chunk, path = ?path, "creating chunk");
            }
            let store = C::open(&path, self.durable)?;
            self.index.insert(chunk);
            self.index.set_active(Some(chunk));
            self.active = Some(store);
        }

        let Some(active) = self.active.as_mut() else {
            return Err(StoreError::Storage("active chunk missing".into()));
        };
        active.put(value).map_err(|e| StoreError::WriteFailure {
            chunk,
            reason: e.to_string(),
        })?;
        self.num_keys += 1;
        Ok(())
    }

    /// Retrieve the record stored under `key`. The owning chunk is opened
    /// transiently and released before returning, so reads never grow the
    /// set of open file handles past the active chunk plus one.
    pub fn get(&self, key: u64) -> Result<Vec<u8>> {
        self.ensure_open()?;
        if key < 1 || key > self.num_keys {
            return Err(StoreError::KeyNotFound {
                key,
                num_keys: self.num_keys,
            });
        }
        let chunk = self.index.chunk_for(key)?;
        let local_key = key - self.index.first_key_of(chunk) + 1;
        let store = C::open(&self.chunk_path(chunk), self.durable)?;
        let value = store.get(local_key)?;
        store.close()?;
        value.ok_or(StoreError::KeyNotFound {
            key,
            num_keys: self.num_keys,
        })
    }

    /// Lazy scan of the keys in `[start, end]`, in increasing key order,
    /// stitched across chunk boundaries. The returned iterator opens one
    /// chunk at a time and is not restartable; call again to re-scan.
    pub fn get_range(&self, start: u64, end: u64) -> Result<Range<C>> {
        self.ensure_open()?;
        if start < 1 || start > end || end > self.num_keys {
            return Err(StoreError::InvalidRange { start, end });
        }
        Ok(Range::new(
            self.dir.clone(),
            self.index.chunk_size(),
            self.durable,
            start,
            end,
        ))
    }

    /// Lazy scan of the full key space `1..=num_keys()`. Each call returns
    /// a fresh, independent sequence.
    pub fn iter(&self) -> Result<Range<C>> {
        self.ensure_open()?;
        Ok(Range::new(
            self.dir.clone(),
            self.index.chunk_size(),
            self.durable,
            1,
            self.num_keys,
        ))
    }

    /// Total record count. Constant time: this is a maintained counter,
    /// not a scan.
    pub fn num_keys(&self) -> u64 {
        self.num_keys
    }

    /// Number of chunk files backing the store.
    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }

    /// Records per chunk.
    pub fn chunk_size(&self) -> u64 {
        self.index.chunk_size()
    }

    /// Storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete every chunk file and return the store to its initial empty
    /// state. Also clears the closed flag, so a reset store accepts writes
    /// as on first use. Idempotent.
    pub fn reset(&mut self) -> Result<()> {
        let active_chunk = self.index.active();
        if let Some(active) = self.active.take() {
            active.destroy()?;
        }
        for chunk in self.index.chunks().collect::<Vec<_>>() {
            if Some(chunk) == active_chunk {
                continue;
            }
            match fs::remove_file(self.chunk_path(chunk)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.index.clear();
        self.num_keys = 0;
        self.closed = false;
        info!(dir = ?self.dir, "store reset");
        Ok(())
    }

    /// Flush and release the active chunk handle without deleting data.
    /// Idempotent. After closing, operations that touch storage fail with
    /// `StoreClosed`; `num_keys()` still answers, `reset()` wipes and
    /// revives the store, and `open()` on the same directory is the way to
    /// pick existing data back up.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if let Some(active) = self.active.take() {
            active.close()?;
        }
        self.index.set_active(None);
        self.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StoreError::StoreClosed);
        }
        Ok(())
    }

    fn chunk_path(&self, chunk: u64) -> PathBuf {
        self.dir.join(self.index.first_key_of(chunk).to_string())
    }
}

/// Lazy cross-chunk scan over `[next_key, end]`. Owns its own chunk
/// handles: one chunk reader is open at any moment, opened on demand and
/// dropped once its last key has been produced.
pub struct Range<C: ChunkStore> {
    dir: PathBuf,
    index: ChunkIndex,
    durable: bool,
    next_key: u64,
    end: u64,
    /// Reader over the chunk being drained, plus the last key it can hold.
    current: Option<(C::Iter, u64)>,
}

impl<C: ChunkStore> Range<C> {
    fn new(dir: PathBuf, chunk_size: u64, durable: bool, start: u64, end: u64) -> Self {
        Range {
            dir,
            index: ChunkIndex::new(chunk_size),
            durable,
            next_key: start,
            end,
            current: None,
        }
    }

    /// Open the chunk owning `next_key` and skip the records before it.
    fn open_chunk(&mut self) -> Result<()> {
        let chunk = self.index.chunk_for(self.next_key)?;
        let first_key = self.index.first_key_of(chunk);
        let last_key = self.index.last_key_of(chunk);
        let store = C::open(&self.dir.join(first_key.to_string()), self.durable)?;
        let mut iter = store.iter()?;
        store.close()?;
        for skipped in first_key..self.next_key {
            match iter.next() {
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(StoreError::Storage(format!(
                        "chunk {chunk} ended at key {skipped} before requested key {}",
                        self.next_key
                    )))
                }
            }
        }
        self.current = Some((iter, last_key));
        Ok(())
    }
}

impl<C: ChunkStore> Iterator for Range<C> {
    type Item = Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_key > self.end {
            return None;
        }
        if self.current.is_none() {
            if let Err(e) = self.open_chunk() {
                self.next_key = self.end + 1;
                return Some(Err(e));
            }
        }
        let (item, chunk_last_key) = match self.current.as_mut() {
            Some((iter, last_key)) => (iter.next(), *last_key),
            None => return None,
        };
        match item {
            Some(Ok(value)) => {
                let key = self.next_key;
                self.next_key += 1;
                if key == chunk_last_key {
                    self.current = None;
                }
                Some(Ok((key, value)))
            }
            Some(Err(e)) => {
                self.next_key = self.end + 1;
                Some(Err(e))
            }
            None => {
                let e = StoreError::Storage(format!(
                    "chunk ended before requested key {}",
                    self.next_key
                ));
                self.next_key = self.end + 1;
                Some(Err(e))
            }
        }
    }
}
