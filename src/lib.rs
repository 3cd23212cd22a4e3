//! Coffer Archive Format
//!
//! A single-file archive engine that multiplexes many named,
//! independently-compressed and independently-encrypted byte blobs inside
//! one flat file, with a trailing index, soft-delete and in-place
//! compaction.
//!
//! ## Features
//!
//! - **Per-entry transforms**: gzip compression and AES-256-CBC encryption,
//!   chosen independently for each entry
//! - **Soft delete**: entries are flagged, their space reclaimed later by
//!   [`Archive::pack`]
//! - **In-place compaction** with overlap-safe block moves
//! - **Reader/writer locking** per instance with a configurable timeout
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use coffer::{Archive, ArchiveOptions, EntryFlags};
//!
//! let archive = Archive::create("assets.cof", ArchiveOptions::with_password("secret"))?;
//! archive.add("readme.txt", b"hello", EntryFlags::COMPRESSED)?;
//! assert_eq!(archive.load("readme.txt")?, b"hello");
//!
//! archive.delete("readme.txt")?;
//! archive.pack()?; // reclaim the deleted entry's space
//! # Ok::<(), coffer::CofferError>(())
//! ```
//!
//! ## Archive layout
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ [0 .. 16)            Header                 │
//! │  - magic "COF", version, flags              │
//! │  - index position (0 = empty archive)       │
//! ├─────────────────────────────────────────────┤
//! │ [16 .. index)        Data region            │
//! │  - stored entry blocks, tiled with no gaps, │
//! │    ascending position order                 │
//! ├─────────────────────────────────────────────┤
//! │ [index .. EOF)       Index block            │
//! │  - count + fixed-layout entry records,      │
//! │    always gzip-wrapped, encrypted when the  │
//! │    archive has a password                   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Durability is flush-after-mutation, not transactional: every mutating
//! operation rewrites data, then index, then header. A crash between those
//! writes leaves orphaned data bytes or a stale index position; neither is
//! recovered automatically.

pub mod archive;
pub mod entry;
pub mod error;
pub mod header;
pub mod index;
pub mod io;
pub mod transform;

// Re-export commonly used types
pub use archive::{Archive, ArchiveOptions, ArchiveStats, DEFAULT_LOCK_TIMEOUT};
pub use entry::{Entry, EntryFlags};
pub use error::{CofferError, Result};
pub use header::{Header, HEADER_LEN, MAGIC, VERSION};
pub use io::ArchiveFile;
