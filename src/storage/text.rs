//! Line-based chunk store — one record per newline-terminated line.
//!
//! The simplest physical format: local key `n` is line `n` of the file.
//! Values must be newline-free UTF-8; anything else would corrupt the
//! line addressing and is rejected at `put` time.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{Result, StoreError};
use crate::storage::chunk::ChunkStore;

pub struct TextChunkStore {
    path: PathBuf,
    writer: BufWriter<File>,
    num_keys: u64,
    durable: bool,
}

impl TextChunkStore {
    fn open_reader(&self) -> Result<BufReader<File>> {
        Ok(BufReader::new(File::open(&self.path)?))
    }
}

impl ChunkStore for TextChunkStore {
    type Iter = TextChunkIter;

    fn open(path: &Path, durable: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StoreError::Storage(format!("open chunk {path:?}: {e}")))?;

        // Count the records already present.
        let num_keys = BufReader::new(File::open(path)?).lines().count() as u64;
        trace!(path = ?path, records = num_keys, "opened text chunk");

        Ok(TextChunkStore {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            num_keys,
            durable,
        })
    }

    fn put(&mut self, value: &[u8]) -> Result<()> {
        let line = std::str::from_utf8(value)
            .map_err(|_| StoreError::Storage("text chunk values must be UTF-8".into()))?;
        if line.contains('\n') || line.ends_with('\r') {
            return Err(StoreError::Storage(
                "text chunk values must not contain the record separator".into(),
            ));
        }

        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        if self.durable {
            self.writer.get_ref().sync_data()?;
        }
        self.num_keys += 1;
        Ok(())
    }

    fn get(&self, local_key: u64) -> Result<Option<Vec<u8>>> {
        if local_key == 0 || local_key > self.num_keys {
            return Ok(None);
        }
        let reader = self.open_reader()?;
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if i as u64 + 1 == local_key {
                return Ok(Some(line.into_bytes()));
            }
        }
        Ok(None)
    }

    fn iter(&self) -> Result<Self::Iter> {
        Ok(TextChunkIter {
            lines: self.open_reader()?.lines(),
        })
    }

    fn num_keys(&self) -> u64 {
        self.num_keys
    }

    fn close(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn destroy(mut self) -> Result<()> {
        self.writer.flush()?;
        drop(self.writer);
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

pub struct TextChunkIter {
    lines: Lines<BufReader<File>>,
}

impl Iterator for TextChunkIter {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lines.next()? {
            Ok(line) => Some(Ok(line.into_bytes())),
            Err(e) => Some(Err(e.into())),
        }
    }
}
