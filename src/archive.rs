//! Archive controller.
//!
//! `Archive` owns the open file handle, the in-memory entry list and the
//! instance lock, and keeps the on-disk structure consistent with memory
//! after every mutation: data write first, then the index block, then the
//! header. There is no write-ahead log; crash windows between those writes
//! are documented in the crate docs rather than recovered.

use crate::entry::{self, Entry, EntryFlags};
use crate::error::{CofferError, Result};
use crate::header::{Header, HEADER_LEN};
use crate::index;
use crate::io::ArchiveFile;
use crate::transform;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Default wait for the instance lock before a call fails with `LockTimeout`.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Construction parameters for [`Archive::create`] and [`Archive::open`].
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Password for entry and index encryption; `None` stores plaintext.
    pub password: Option<Vec<u8>>,

    /// Open without write access; all mutating calls fail with `ReadOnly`.
    pub read_only: bool,

    /// Maximum wait for lock acquisition.
    pub lock_timeout: Duration,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        ArchiveOptions {
            password: None,
            read_only: false,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl ArchiveOptions {
    pub fn with_password(password: impl Into<Vec<u8>>) -> Self {
        ArchiveOptions {
            password: Some(password.into()),
            ..Default::default()
        }
    }

    pub fn read_only() -> Self {
        ArchiveOptions {
            read_only: true,
            ..Default::default()
        }
    }
}

/// Mutable state guarded by the instance lock.
///
/// The file sits in its own `Mutex` so `load` can perform the physical read
/// while holding the outer lock in shared mode.
struct Shared {
    header: Header,
    entries: Vec<Entry>,
    file: Option<Mutex<ArchiveFile>>,
}

/// A single-file archive of named, independently transformed entries.
///
/// All operations take `&self`; the instance lock serializes mutation
/// (`add`/`delete`/`pack`/`dispose`/`delete_archive`) while `load` and
/// `exists` run concurrently under the shared mode. One lock per instance:
/// multiple archives in one process never contend with each other.
pub struct Archive {
    shared: RwLock<Shared>,
    password: Option<Vec<u8>>,
    read_only: bool,
    lock_timeout: Duration,
    path: PathBuf,
}

impl Archive {
    /// Create a new archive file. Fails if `path` already exists.
    pub fn create<P: AsRef<Path>>(path: P, options: ArchiveOptions) -> Result<Self> {
        if options.read_only {
            return Err(CofferError::ReadOnly);
        }

        let header = Header::new(options.password.is_some());
        let file = ArchiveFile::create(&path, &header)?;
        tracing::info!(path = %path.as_ref().display(), encrypted = header.is_encrypted(), "Created archive");

        Ok(Archive {
            shared: RwLock::new(Shared {
                header,
                entries: Vec::new(),
                file: Some(Mutex::new(file)),
            }),
            password: options.password,
            read_only: false,
            lock_timeout: options.lock_timeout,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Open an existing archive file, reading header and index into memory.
    pub fn open<P: AsRef<Path>>(path: P, options: ArchiveOptions) -> Result<Self> {
        let mut file = ArchiveFile::open(&path, options.read_only)?;
        let header = file.read_header()?;

        if header.is_encrypted() && options.password.is_none() {
            tracing::warn!(
                path = %path.as_ref().display(),
                "Archive is flagged encrypted but no password was supplied; index read will likely fail"
            );
        }

        let entries = if header.index_position == 0 {
            Vec::new()
        } else {
            index::read(&mut file, header.index_position, options.password.as_deref())?
        };

        tracing::debug!(
            path = %path.as_ref().display(),
            entries = entries.len(),
            index_position = header.index_position,
            "Opened archive"
        );

        Ok(Archive {
            shared: RwLock::new(Shared {
                header,
                entries,
                file: Some(Mutex::new(file)),
            }),
            password: options.password,
            read_only: options.read_only,
            lock_timeout: options.lock_timeout,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Store `data` under `name`, soft-deleting any live entry with the same
    /// name. Returns the record appended to the index.
    pub fn add(&self, name: &str, data: &[u8], flags: EntryFlags) -> Result<Entry> {
        let mut guard = self.write_lock()?;
        let shared = &mut *guard;
        if self.read_only {
            return Err(CofferError::ReadOnly);
        }
        let file = shared.file.as_mut().ok_or(CofferError::Closed)?.get_mut();

        // Replacement semantics: the old entries stay in place, flagged.
        for i in entry::find_all_by_name(&shared.entries, name) {
            shared.entries[i].flags.insert(EntryFlags::DELETED);
        }

        let mut flags = flags;
        flags.remove(EntryFlags::DELETED);

        // Deleted entries still occupy their space until a pack, so the
        // insert position runs over the whole current collection.
        let position = entry::insert_position(&shared.entries);
        let id = Uuid::new_v4();
        let stored = transform::encode(
            id.as_bytes(),
            flags.contains(EntryFlags::COMPRESSED),
            self.password.as_deref(),
            data,
        )?;
        file.write_at(position as u64, &stored)?;

        let new_entry = Entry {
            id,
            name: name.to_string(),
            size: data.len() as u32,
            size_on_disk: stored.len() as u32,
            position,
            flags,
        };
        shared.entries.push(new_entry.clone());

        flush(file, &mut shared.header, &shared.entries, self.password.as_deref())?;
        tracing::debug!(
            name,
            size = new_entry.size,
            size_on_disk = new_entry.size_on_disk,
            position,
            "Added entry"
        );

        Ok(new_entry)
    }

    /// Soft-delete every live entry with the given name.
    ///
    /// Returns whether anything changed; no match is a no-op, not an error.
    pub fn delete(&self, name: &str) -> Result<bool> {
        self.delete_matching(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Soft-delete every live entry with the given id.
    pub fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        self.delete_matching(|e| e.id == id)
    }

    fn delete_matching(&self, matches: impl Fn(&Entry) -> bool) -> Result<bool> {
        let mut guard = self.write_lock()?;
        let shared = &mut *guard;
        if self.read_only {
            return Err(CofferError::ReadOnly);
        }
        let file = shared.file.as_mut().ok_or(CofferError::Closed)?.get_mut();

        let mut changed = false;
        for e in shared.entries.iter_mut() {
            if !e.is_deleted() && matches(e) {
                e.flags.insert(EntryFlags::DELETED);
                tracing::debug!(name = %e.name, id = %e.id, "Soft-deleted entry");
                changed = true;
            }
        }

        if changed {
            flush(file, &mut shared.header, &shared.entries, self.password.as_deref())?;
        }

        Ok(changed)
    }

    /// Load and reverse-transform the live entry with the given name.
    pub fn load(&self, name: &str) -> Result<Vec<u8>> {
        let guard = self.read_lock()?;
        let entry = entry::find_by_name(&guard.entries, name)
            .ok_or_else(|| CofferError::NotFound(name.to_string()))?
            .clone();
        self.read_entry(&guard, &entry)
    }

    /// Load and reverse-transform the live entry with the given id.
    pub fn load_by_id(&self, id: Uuid) -> Result<Vec<u8>> {
        let guard = self.read_lock()?;
        let entry = entry::find_by_id(&guard.entries, id)
            .ok_or_else(|| CofferError::NotFound(id.to_string()))?
            .clone();
        self.read_entry(&guard, &entry)
    }

    fn read_entry(&self, shared: &Shared, entry: &Entry) -> Result<Vec<u8>> {
        let file = shared.file.as_ref().ok_or(CofferError::Closed)?;

        // The on-disk size is authoritative for the physical read; the
        // logical size only describes the plaintext that comes back out.
        let stored = file
            .lock()
            .read_at(entry.position as u64, entry.size_on_disk as usize)?;

        transform::decode(
            entry.id.as_bytes(),
            entry.is_compressed(),
            self.password.as_deref(),
            &stored,
        )
    }

    /// Whether a live entry with the given name exists. In-memory only.
    pub fn exists(&self, name: &str) -> Result<bool> {
        let guard = self.read_lock()?;
        if guard.file.is_none() {
            return Err(CofferError::Closed);
        }
        Ok(entry::find_by_name(&guard.entries, name).is_some())
    }

    /// Whether a live entry with the given id exists. In-memory only.
    pub fn exists_by_id(&self, id: Uuid) -> Result<bool> {
        let guard = self.read_lock()?;
        if guard.file.is_none() {
            return Err(CofferError::Closed);
        }
        Ok(entry::find_by_id(&guard.entries, id).is_some())
    }

    /// Compact the archive in place, dropping soft-deleted entries and
    /// reclaiming their space. Returns whether anything moved.
    ///
    /// Surviving blocks are shifted left in ascending position order, each
    /// one read fully into memory before it is written. An entry's new end
    /// offset never exceeds the next survivor's old start offset, so the
    /// potentially-overlapping in-place move never clobbers unread bytes.
    pub fn pack(&self) -> Result<bool> {
        let mut guard = self.write_lock()?;
        let shared = &mut *guard;
        if self.read_only {
            return Err(CofferError::ReadOnly);
        }
        let file = shared.file.as_mut().ok_or(CofferError::Closed)?.get_mut();

        entry::sort_by_position(&mut shared.entries);
        if !shared.entries.iter().any(Entry::is_deleted) {
            return Ok(false);
        }

        let reclaimed: u64 = shared
            .entries
            .iter()
            .filter(|e| e.is_deleted())
            .map(|e| e.size_on_disk as u64)
            .sum();

        let mut packed = Vec::with_capacity(shared.entries.len());
        let mut position = HEADER_LEN as u32;
        for e in shared.entries.iter().filter(|e| !e.is_deleted()) {
            let mut moved = e.clone();
            moved.position = position;
            if moved.position != e.position {
                let block = file.read_at(e.position as u64, e.size_on_disk as usize)?;
                file.write_at(moved.position as u64, &block)?;
            }
            position += moved.size_on_disk;
            packed.push(moved);
        }

        let survivors = packed.len();
        shared.entries = packed;
        flush(file, &mut shared.header, &shared.entries, self.password.as_deref())?;

        tracing::info!(survivors, reclaimed_bytes = reclaimed, "Packed archive");
        Ok(true)
    }

    /// Release the file handle. Idempotent; every later operation fails
    /// with `Closed`.
    pub fn dispose(&self) -> Result<()> {
        let mut guard = self.write_lock()?;
        if guard.file.take().is_some() {
            tracing::debug!(path = %self.path.display(), "Closed archive");
        }
        Ok(())
    }

    /// Dispose, then remove the backing file entirely.
    pub fn delete_archive(&self) -> Result<()> {
        let mut guard = self.write_lock()?;
        if self.read_only {
            return Err(CofferError::ReadOnly);
        }
        if guard.file.take().is_none() {
            return Err(CofferError::Closed);
        }

        std::fs::remove_file(&self.path)?;
        tracing::info!(path = %self.path.display(), "Deleted archive");
        Ok(())
    }

    /// Snapshot of the current entry list, soft-deleted entries included.
    pub fn entries(&self) -> Result<Vec<Entry>> {
        let guard = self.read_lock()?;
        if guard.file.is_none() {
            return Err(CofferError::Closed);
        }
        Ok(guard.entries.clone())
    }

    /// Entry and byte counts, including how much a pack would reclaim.
    pub fn stats(&self) -> Result<ArchiveStats> {
        let guard = self.read_lock()?;
        if guard.file.is_none() {
            return Err(CofferError::Closed);
        }

        let live_entries = guard.entries.iter().filter(|e| !e.is_deleted()).count();
        let reclaimable_bytes = guard
            .entries
            .iter()
            .filter(|e| e.is_deleted())
            .map(|e| e.size_on_disk as u64)
            .sum();

        Ok(ArchiveStats {
            total_entries: guard.entries.len(),
            live_entries,
            data_bytes: (entry::insert_position(&guard.entries) - HEADER_LEN as u32) as u64,
            reclaimable_bytes,
            index_position: guard.header.index_position,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn read_lock(&self) -> Result<RwLockReadGuard<'_, Shared>> {
        self.shared
            .try_read_for(self.lock_timeout)
            .ok_or(CofferError::LockTimeout(self.lock_timeout))
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, Shared>> {
        self.shared
            .try_write_for(self.lock_timeout)
            .ok_or(CofferError::LockTimeout(self.lock_timeout))
    }
}

/// Rewrite the trailing index block and the header after a mutation.
///
/// Order matters: the index goes out before the header so a crash in between
/// leaves at worst a stale `index_position`, never a header pointing into
/// unwritten bytes. Truncation happens right after the index write because
/// the index is read as `[index_position, EOF)`.
fn flush(
    file: &mut ArchiveFile,
    header: &mut Header,
    entries: &[Entry],
    password: Option<&[u8]>,
) -> Result<()> {
    let index_position = entry::insert_position(entries);
    let written = index::write(file, index_position, password, entries)?;
    file.truncate(index_position as u64 + written as u64)?;

    header.index_position = index_position;
    file.write_header(header)?;
    file.sync()
}

/// Archive statistics.
#[derive(Debug, Clone)]
pub struct ArchiveStats {
    pub total_entries: usize,
    pub live_entries: usize,
    pub data_bytes: u64,
    pub reclaimable_bytes: u64,
    pub index_position: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_archive(dir: &TempDir, options: ArchiveOptions) -> Archive {
        Archive::create(dir.path().join("test.cof"), options).unwrap()
    }

    #[test]
    fn test_add_and_load() {
        let dir = TempDir::new().unwrap();
        let archive = temp_archive(&dir, ArchiveOptions::default());

        archive.add("hello.txt", b"Hello, World!", EntryFlags::NONE).unwrap();
        assert_eq!(archive.load("hello.txt").unwrap(), b"Hello, World!");
        assert!(archive.exists("hello.txt").unwrap());
    }

    #[test]
    fn test_load_missing_entry() {
        let dir = TempDir::new().unwrap();
        let archive = temp_archive(&dir, ArchiveOptions::default());

        assert!(matches!(
            archive.load("nope"),
            Err(CofferError::NotFound(_))
        ));
        assert!(!archive.exists("nope").unwrap());
    }

    #[test]
    fn test_create_refuses_existing_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.cof");

        Archive::create(&path, ArchiveOptions::default()).unwrap();
        assert!(Archive::create(&path, ArchiveOptions::default()).is_err());
    }

    #[test]
    fn test_uncompressed_entry_is_stored_verbatim() {
        let dir = TempDir::new().unwrap();
        let archive = temp_archive(&dir, ArchiveOptions::default());

        let entry = archive.add("raw.bin", &[7u8; 800], EntryFlags::NONE).unwrap();
        assert_eq!(entry.size, 800);
        assert_eq!(entry.size_on_disk, 800);
        assert_eq!(entry.position, HEADER_LEN as u32);
    }

    #[test]
    fn test_name_replacement_soft_deletes_old_entry() {
        let dir = TempDir::new().unwrap();
        let archive = temp_archive(&dir, ArchiveOptions::default());

        archive.add("a.txt", b"old", EntryFlags::NONE).unwrap();
        archive.add("A.TXT", b"new", EntryFlags::NONE).unwrap();

        assert_eq!(archive.load("a.txt").unwrap(), b"new");
        let entries = archive.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_deleted());
        assert!(!entries[1].is_deleted());
    }

    #[test]
    fn test_delete_is_soft_and_idempotent() {
        let dir = TempDir::new().unwrap();
        let archive = temp_archive(&dir, ArchiveOptions::default());

        archive.add("a.txt", b"data", EntryFlags::NONE).unwrap();
        assert!(archive.delete("a.txt").unwrap());
        assert!(!archive.exists("a.txt").unwrap());
        assert!(matches!(archive.load("a.txt"), Err(CofferError::NotFound(_))));

        // Second delete matches nothing: no-op, not an error.
        assert!(!archive.delete("a.txt").unwrap());

        // The entry still occupies its index slot and disk space.
        let stats = archive.stats().unwrap();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.live_entries, 0);
        assert_eq!(stats.reclaimable_bytes, 4);
    }

    #[test]
    fn test_delete_by_id() {
        let dir = TempDir::new().unwrap();
        let archive = temp_archive(&dir, ArchiveOptions::default());

        let entry = archive.add("a.txt", b"data", EntryFlags::NONE).unwrap();
        assert!(archive.exists_by_id(entry.id).unwrap());
        assert!(archive.delete_by_id(entry.id).unwrap());
        assert!(!archive.exists_by_id(entry.id).unwrap());
    }

    #[test]
    fn test_dispose_is_idempotent_and_closes() {
        let dir = TempDir::new().unwrap();
        let archive = temp_archive(&dir, ArchiveOptions::default());
        archive.add("a.txt", b"data", EntryFlags::NONE).unwrap();

        archive.dispose().unwrap();
        archive.dispose().unwrap();

        assert!(matches!(archive.load("a.txt"), Err(CofferError::Closed)));
        assert!(matches!(archive.exists("a.txt"), Err(CofferError::Closed)));
        assert!(matches!(
            archive.add("b.txt", b"x", EntryFlags::NONE),
            Err(CofferError::Closed)
        ));
        assert!(matches!(archive.pack(), Err(CofferError::Closed)));
    }

    #[test]
    fn test_delete_archive_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.cof");
        let archive = Archive::create(&path, ArchiveOptions::default()).unwrap();

        archive.delete_archive().unwrap();
        assert!(!path.exists());
        assert!(matches!(archive.delete_archive(), Err(CofferError::Closed)));
    }

    #[test]
    fn test_stats() {
        let dir = TempDir::new().unwrap();
        let archive = temp_archive(&dir, ArchiveOptions::default());

        archive.add("a", &[1u8; 100], EntryFlags::NONE).unwrap();
        archive.add("b", &[2u8; 50], EntryFlags::NONE).unwrap();
        archive.delete("a").unwrap();

        let stats = archive.stats().unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.live_entries, 1);
        assert_eq!(stats.data_bytes, 150);
        assert_eq!(stats.reclaimable_bytes, 100);
        assert_eq!(stats.index_position, 16 + 150);
    }
}
