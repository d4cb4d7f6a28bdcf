//! Length-prefixed binary chunk store.
//!
//! ## File Layout
//!
//! ```text
//! [Record: repeated]
//!   magic    : [u8;4]  = b"CREC"
//!   data_len : u32     (LE)
//!   data     : data_len bytes
//! ```
//!
//! Local key `n` is the `n`-th record from the start of the file. On open
//! the file is walked to count records; a torn trailing record (from an
//! interrupted append) is truncated away.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{trace, warn};

use crate::error::{Result, StoreError};
use crate::storage::chunk::ChunkStore;

pub const RECORD_MAGIC: &[u8; 4] = b"CREC";
pub const RECORD_HEADER_SIZE: u64 = 4 + 4;

/// Read one record header. `Ok(None)` at a clean end of file.
fn read_header(reader: &mut BufReader<File>) -> Result<Option<u32>> {
    let mut magic = [0u8; 4];
    match reader.read_exact(&mut magic) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    if &magic != RECORD_MAGIC {
        return Err(StoreError::Storage("bad record magic in chunk file".into()));
    }
    match reader.read_u32::<LittleEndian>() {
        Ok(len) => Ok(Some(len)),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub struct BinaryChunkStore {
    path: PathBuf,
    writer: BufWriter<File>,
    num_keys: u64,
    durable: bool,
}

impl BinaryChunkStore {
    fn open_reader(&self) -> Result<BufReader<File>> {
        Ok(BufReader::new(File::open(&self.path)?))
    }
}

impl ChunkStore for BinaryChunkStore {
    type Iter = BinaryChunkIter;

    fn open(path: &Path, durable: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StoreError::Storage(format!("open chunk {path:?}: {e}")))?;
        let file_len = file.metadata()?.len();

        // Walk the record stream to count records. Anything after the last
        // complete record is a torn append and gets truncated.
        let mut reader = BufReader::new(File::open(path)?);
        let mut num_keys = 0u64;
        let mut good_offset = 0u64;
        loop {
            let len = match read_header(&mut reader) {
                Ok(Some(len)) => len as u64,
                Ok(None) | Err(StoreError::Storage(_)) => break,
                Err(e) => return Err(e),
            };
            let record_end = good_offset + RECORD_HEADER_SIZE + len;
            if record_end > file_len {
                break;
            }
            reader.seek_relative(len as i64)?;
            num_keys += 1;
            good_offset = record_end;
        }
        if good_offset < file_len {
            warn!(
                path = ?path,
                new_size = good_offset,
                old_size = file_len,
                "torn record detected: truncating chunk"
            );
            file.set_len(good_offset)?;
        }
        trace!(path = ?path, records = num_keys, "opened binary chunk");

        Ok(BinaryChunkStore {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            num_keys,
            durable,
        })
    }

    fn put(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(RECORD_MAGIC)?;
        self.writer.write_u32::<LittleEndian>(value.len() as u32)?;
        self.writer.write_all(value)?;
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
        let mut reader = self.open_reader()?;
        let mut record = 0u64;
        while let Some(len) = read_header(&mut reader)? {
            record += 1;
            if record == local_key {
                let mut data = vec![0u8; len as usize];
                reader.read_exact(&mut data)?;
                return Ok(Some(data));
            }
            reader.seek_relative(len as i64)?;
        }
        Ok(None)
    }

    fn iter(&self) -> Result<Self::Iter> {
        Ok(BinaryChunkIter {
            reader: self.open_reader()?,
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

pub struct BinaryChunkIter {
    reader: BufReader<File>,
}

impl Iterator for BinaryChunkIter {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = match read_header(&mut self.reader) {
            Ok(Some(len)) => len as usize,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };
        let mut data = vec![0u8; len];
        match self.reader.read_exact(&mut data) {
            Ok(()) => Some(Ok(data)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => None,
            Err(e) => Some(Err(e.into())),
        }
    }
}
