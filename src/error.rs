use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CofferError {
    #[error("Corrupt header: bad magic tag")]
    CorruptHeader,

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u8),

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Archive is read-only")]
    ReadOnly,

    #[error("Archive is closed")]
    Closed,

    #[error("Lock acquisition timed out after {0:?}")]
    LockTimeout(Duration),

    #[error("Entry name too long: {0} bytes (max 65535)")]
    NameTooLong(usize),

    #[error("Cipher error: {0}")]
    Crypto(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CofferError>;
