//! Disk I/O for archive files.

use crate::error::Result;
use crate::header::Header;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Disk-backed archive storage.
///
/// All access is positioned: callers pass absolute byte offsets and the
/// wrapper seeks before every read/write, so no cursor state leaks between
/// operations.
pub struct ArchiveFile {
    file: File,
    path: PathBuf,
}

impl ArchiveFile {
    /// Create a new archive file holding only the header.
    ///
    /// Fails with `AlreadyExists` if the path is occupied.
    pub fn create<P: AsRef<Path>>(path: P, header: &Header) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        file.write_all(&header.to_bytes())?;
        file.sync_all()?;

        Ok(ArchiveFile {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Open an existing archive file.
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(&path)?;

        Ok(ArchiveFile {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Read the header at offset 0.
    pub fn read_header(&mut self) -> Result<Header> {
        let bytes = self.read_at(0, crate::header::HEADER_LEN)?;
        Header::from_bytes(&bytes)
    }

    /// Rewrite the header at offset 0 in place.
    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        self.write_at(0, &header.to_bytes())
    }

    /// Read exactly `len` bytes starting at `offset`.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Read everything from `offset` to end-of-file.
    pub fn read_to_end_from(&mut self, offset: u64) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = Vec::new();
        self.file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Write `data` starting at `offset`.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Current file length in bytes.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Truncate (or extend) the file to exactly `len` bytes.
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    /// Flush all writes to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
