//! Index block codec.
//!
//! The index is the serialized directory of all entries (soft-deleted ones
//! included) and occupies `[index_position, EOF)`. It always passes through
//! the transform pipeline with compression on and the all-zero identifier as
//! the IV, so an encrypted archive also has an encrypted directory.
//!
//! Record layout (little-endian):
//!
//! ```text
//! count: u32
//! count x {
//!     id:           16 bytes
//!     name:         u16 length + UTF-8 bytes
//!     size:         u32
//!     size_on_disk: u32
//!     position:     u32
//!     flags:        u32
//! }
//! ```

use crate::entry::{Entry, EntryFlags};
use crate::error::{CofferError, Result};
use crate::io::ArchiveFile;
use crate::transform::{self, ZERO_ID};
use uuid::Uuid;

/// Read and decode the index block at `index_position`.
pub fn read(
    file: &mut ArchiveFile,
    index_position: u32,
    password: Option<&[u8]>,
) -> Result<Vec<Entry>> {
    let stored = file.read_to_end_from(index_position as u64)?;
    let plain = transform::decode(&ZERO_ID, true, password, &stored)?;
    deserialize(&plain)
}

/// Encode and write the index block at `position`.
///
/// Returns the number of bytes written on disk; the caller needs it to
/// truncate the file to the new end-of-index offset.
pub fn write(
    file: &mut ArchiveFile,
    position: u32,
    password: Option<&[u8]>,
    entries: &[Entry],
) -> Result<u32> {
    let plain = serialize(entries)?;
    let stored = transform::encode(&ZERO_ID, true, password, &plain)?;
    file.write_at(position as u64, &stored)?;
    Ok(stored.len() as u32)
}

fn serialize(entries: &[Entry]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(4 + entries.len() * 48);
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());

    for entry in entries {
        let name = entry.name.as_bytes();
        if name.len() > u16::MAX as usize {
            return Err(CofferError::NameTooLong(name.len()));
        }

        out.extend_from_slice(entry.id.as_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&entry.size.to_le_bytes());
        out.extend_from_slice(&entry.size_on_disk.to_le_bytes());
        out.extend_from_slice(&entry.position.to_le_bytes());
        out.extend_from_slice(&entry.flags.bits().to_le_bytes());
    }

    Ok(out)
}

fn deserialize(bytes: &[u8]) -> Result<Vec<Entry>> {
    let mut reader = SliceReader { bytes, pos: 0 };

    let count = reader.read_u32()?;
    let mut entries = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let mut id = [0u8; 16];
        id.copy_from_slice(reader.take(16)?);

        let name_len = reader.read_u16()? as usize;
        let name = std::str::from_utf8(reader.take(name_len)?)
            .map_err(|_| truncated("entry name is not valid UTF-8"))?
            .to_string();

        entries.push(Entry {
            id: Uuid::from_bytes(id),
            name,
            size: reader.read_u32()?,
            size_on_disk: reader.read_u32()?,
            position: reader.read_u32()?,
            flags: EntryFlags::from_bits(reader.read_u32()?),
        });
    }

    Ok(entries)
}

fn truncated(msg: &str) -> CofferError {
    CofferError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        msg.to_string(),
    ))
}

struct SliceReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.bytes.len() - self.pos < len {
            return Err(truncated("Insufficient bytes for index record"));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}
