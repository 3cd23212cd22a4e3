//! Entry records and pure helpers over the in-memory entry list.
//!
//! An entry describes one stored item: its 128-bit identifier (also the IV
//! for its encryption), lookup name, logical size, stored size, absolute
//! position in the data region and flag bits. Soft-deleted entries stay in
//! the list and keep their disk space until a pack.

use crate::header::HEADER_LEN;
use std::ops::BitOr;
use uuid::Uuid;

/// Per-entry flag bits, stored as a u32 in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFlags(u32);

impl EntryFlags {
    pub const NONE: EntryFlags = EntryFlags(0);

    /// Entry is soft-deleted: invisible to lookups, space not yet reclaimed.
    pub const DELETED: EntryFlags = EntryFlags(1 << 0);

    /// Entry payload passed through the gzip transform.
    pub const COMPRESSED: EntryFlags = EntryFlags(1 << 1);

    /// Reconstruct from stored bits. Unknown bits are preserved round-trip.
    pub fn from_bits(bits: u32) -> Self {
        EntryFlags(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: EntryFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: EntryFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: EntryFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for EntryFlags {
    type Output = EntryFlags;

    fn bitor(self, rhs: EntryFlags) -> EntryFlags {
        EntryFlags(self.0 | rhs.0)
    }
}

/// One stored item in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Unique identifier, generated at creation; doubles as the cipher IV.
    pub id: Uuid,

    /// Lookup key; matched case-insensitively and not enforced unique.
    pub name: String,

    /// Logical byte length before any transform.
    pub size: u32,

    /// Stored byte length after compression/encryption. Authoritative for
    /// how many bytes the entry occupies in the data region.
    pub size_on_disk: u32,

    /// Absolute byte offset where the stored bytes begin.
    pub position: u32,

    /// Flag bits.
    pub flags: EntryFlags,
}

impl Entry {
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(EntryFlags::DELETED)
    }

    pub fn is_compressed(&self) -> bool {
        self.flags.contains(EntryFlags::COMPRESSED)
    }
}

fn name_matches(entry: &Entry, name: &str) -> bool {
    entry.name.eq_ignore_ascii_case(name)
}

/// First live (non-deleted) entry with the given id.
pub fn find_by_id(entries: &[Entry], id: Uuid) -> Option<&Entry> {
    entries.iter().find(|e| !e.is_deleted() && e.id == id)
}

/// First live entry with the given name (case-insensitive).
pub fn find_by_name<'a>(entries: &'a [Entry], name: &str) -> Option<&'a Entry> {
    entries
        .iter()
        .find(|e| !e.is_deleted() && name_matches(e, name))
}

/// Indices of every entry with the given id, deleted ones included.
pub fn find_all_by_id(entries: &[Entry], id: Uuid) -> Vec<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.id == id)
        .map(|(i, _)| i)
        .collect()
}

/// Indices of every entry with the given name, deleted ones included.
/// Soft-delete can legitimately leave several deleted entries sharing a name.
pub fn find_all_by_name(entries: &[Entry], name: &str) -> Vec<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, e)| name_matches(e, name))
        .map(|(i, _)| i)
        .collect()
}

/// Offset where the next stored block (or the index) begins.
///
/// Deleted entries still occupy their space, so the sum runs over the whole
/// collection. With the tiling invariant intact this equals the end of the
/// data region.
pub fn insert_position(entries: &[Entry]) -> u32 {
    HEADER_LEN as u32 + entries.iter().map(|e| e.size_on_disk).sum::<u32>()
}

/// Stable ascending sort by position. Restores the tiling invariant's
/// ordering precondition before any position-dependent computation.
pub fn sort_by_position(entries: &mut [Entry]) {
    entries.sort_by_key(|e| e.position);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, size_on_disk: u32, position: u32, flags: EntryFlags) -> Entry {
        Entry {
            id: Uuid::new_v4(),
            name: name.to_string(),
            size: size_on_disk,
            size_on_disk,
            position,
            flags,
        }
    }

    #[test]
    fn test_flags_bit_ops() {
        let mut flags = EntryFlags::NONE;
        assert!(!flags.contains(EntryFlags::DELETED));

        flags.insert(EntryFlags::DELETED);
        flags.insert(EntryFlags::COMPRESSED);
        assert!(flags.contains(EntryFlags::DELETED | EntryFlags::COMPRESSED));

        flags.remove(EntryFlags::DELETED);
        assert!(!flags.contains(EntryFlags::DELETED));
        assert!(flags.contains(EntryFlags::COMPRESSED));
    }

    #[test]
    fn test_flags_preserve_unknown_bits() {
        let flags = EntryFlags::from_bits(0x8000_0002);
        assert!(flags.contains(EntryFlags::COMPRESSED));
        assert_eq!(flags.bits(), 0x8000_0002);
    }

    #[test]
    fn test_find_by_name_is_case_insensitive() {
        let entries = vec![entry("Notes.TXT", 10, 16, EntryFlags::NONE)];
        assert!(find_by_name(&entries, "notes.txt").is_some());
        assert!(find_by_name(&entries, "NOTES.TXT").is_some());
        assert!(find_by_name(&entries, "other.txt").is_none());
    }

    #[test]
    fn test_find_skips_deleted() {
        let dead = entry("a", 10, 16, EntryFlags::DELETED);
        let id = dead.id;
        let entries = vec![dead, entry("a", 20, 26, EntryFlags::NONE)];

        let found = find_by_name(&entries, "a").unwrap();
        assert_eq!(found.size_on_disk, 20);
        assert!(find_by_id(&entries, id).is_none());
    }

    #[test]
    fn test_find_all_includes_deleted() {
        let entries = vec![
            entry("a", 10, 16, EntryFlags::DELETED),
            entry("b", 5, 26, EntryFlags::NONE),
            entry("A", 20, 31, EntryFlags::NONE),
        ];
        assert_eq!(find_all_by_name(&entries, "a"), vec![0, 2]);
    }

    #[test]
    fn test_insert_position_counts_deleted_space() {
        let entries = vec![
            entry("a", 100, 16, EntryFlags::DELETED),
            entry("b", 50, 116, EntryFlags::NONE),
        ];
        assert_eq!(insert_position(&entries), 16 + 100 + 50);
        assert_eq!(insert_position(&[]), 16);
    }

    #[test]
    fn test_sort_by_position() {
        let mut entries = vec![
            entry("c", 5, 120, EntryFlags::NONE),
            entry("a", 4, 16, EntryFlags::NONE),
            entry("b", 100, 20, EntryFlags::NONE),
        ];
        sort_by_position(&mut entries);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }
}
