use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chunk storage error: {0}")]
    Storage(String),

    #[error("Invalid key {0}: keys are positive 1-based integers")]
    InvalidKey(u64),

    #[error("Out-of-order key {got}: next expected key is {expected}")]
    OutOfOrderKey { expected: u64, got: u64 },

    #[error("Key {key} not found: store holds {num_keys} records")]
    KeyNotFound { key: u64, num_keys: u64 },

    #[error("Invalid range [{start}, {end}]")]
    InvalidRange { start: u64, end: u64 },

    #[error("Append to chunk {chunk} failed: {reason}")]
    WriteFailure { chunk: u64, reason: String },

    #[error("Store is closed")]
    StoreClosed,

    #[error("Codec error: {0}")]
    Codec(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
