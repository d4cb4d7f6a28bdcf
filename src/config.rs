use crate::error::{Result, StoreError};
use serde::Deserialize;
use std::path::PathBuf;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
}

/// Storage parameters for the chunked record store.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Base directory where chunk files are stored.
    pub base_path: PathBuf,
    /// Number of records held by each chunk file. Once data has been
    /// written, this value must not change across restarts.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Sync every append to disk before acknowledging it.
    #[serde(default = "default_durability")]
    pub ensure_durability: bool,
    /// Bounded channel capacity for the async writer queue.
    #[serde(default = "default_writer_queue")]
    pub writer_queue_size: usize,
}

fn default_chunk_size() -> u64 { 1000 }
fn default_durability() -> bool { true }
fn default_writer_queue() -> usize { 256 }

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("Cannot read config file: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| StoreError::Config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.storage.chunk_size == 0 {
            return Err(StoreError::Config("chunk_size must be > 0".into()));
        }
        if self.storage.writer_queue_size == 0 {
            return Err(StoreError::Config("writer_queue_size must be > 0".into()));
        }
        Ok(())
    }
}
