use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FerryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock acquisition timed out after {timeout_ms}ms")]
    LockTimeout { timeout_ms: u64 },

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl FerryError {
    /// Whether this error reports a missing endpoint or record
    pub fn is_not_found(&self) -> bool {
        matches!(self, FerryError::NotFound(_))
    }

    /// Whether this error was caused by a caller-supplied argument
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, FerryError::InvalidArgument(_))
    }
}

pub type Result<T> = std::result::Result<T, FerryError>;
