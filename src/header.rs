//! Archive header codec.
//!
//! The header is a fixed 16-byte record at offset 0:
//!
//! ```text
//! [0..3)   magic "COF"
//! [3..4)   format version (u8, currently 1)
//! [4..8)   archive flags (u32 LE, bit 0 = encrypted)
//! [8..12)  index position (u32 LE, 0 = no index yet / empty archive)
//! [12..16) reserved
//! ```
//!
//! It is rewritten in place after every successful mutating operation so the
//! on-disk index location always matches the in-memory state.

use crate::error::{CofferError, Result};

pub const MAGIC: [u8; 3] = *b"COF";
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 16;

/// Archive flag bit: entry payloads and the index are encrypted.
pub const FLAG_ENCRYPTED: u32 = 1 << 0;

/// Archive header (offset 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Archive-wide flag bits.
    pub flags: u32,

    /// Byte offset of the index block; 0 means the archive holds no index.
    pub index_position: u32,
}

impl Header {
    /// Create a header for a freshly-created, empty archive.
    pub fn new(encrypted: bool) -> Self {
        Header {
            flags: if encrypted { FLAG_ENCRYPTED } else { 0 },
            index_position: 0,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Serialize to the fixed 16-byte on-disk layout.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..3].copy_from_slice(&MAGIC);
        bytes[3] = VERSION;
        bytes[4..8].copy_from_slice(&self.flags.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.index_position.to_le_bytes());
        bytes
    }

    /// Deserialize and validate the 16-byte header record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CofferError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Insufficient bytes for header",
            )));
        }

        if bytes[0..3] != MAGIC {
            return Err(CofferError::CorruptHeader);
        }

        let version = bytes[3];
        if version != VERSION {
            return Err(CofferError::UnsupportedVersion(version));
        }

        let flags = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let index_position = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

        Ok(Header {
            flags,
            index_position,
        })
    }
}
