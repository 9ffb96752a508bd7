//! Persisted layout of the global resource table.
//!
//! ```text
//!   +0   pad          u32
//!   +4   lock         u32    table spinlock
//!   +8   entry_count  u64
//!   +16  entry[0]     { tag_lo, tag_hi, phys_addr, size }   32 bytes each
//!   ...
//! ```
//!
//! Word order and endianness are those of the native accessors; the table is
//! only ever read by images of the same family.

use memoffset::offset_of;
use static_assertions::const_assert_eq;

#[repr(C)]
pub(crate) struct TableHeader {
    pub pad: u32,
    pub lock: u32,
    pub entry_count: u64,
}

#[repr(C)]
pub(crate) struct EntryLayout {
    pub tag_lo: u64,
    pub tag_hi: u64,
    pub phys_addr: u64,
    pub size: u64,
}

pub const HEADER_SIZE: u64 = core::mem::size_of::<TableHeader>() as u64;
pub const ENTRY_SIZE: u64 = core::mem::size_of::<EntryLayout>() as u64;

const_assert_eq!(HEADER_SIZE, 16);
const_assert_eq!(ENTRY_SIZE, 32);
const_assert_eq!(table_size(128), 4112);

/// Bytes taken by a table of `capacity` entries.
pub const fn table_size(capacity: u64) -> u64 {
    HEADER_SIZE + capacity * ENTRY_SIZE
}

pub(crate) mod header {
    use super::*;

    pub const LOCK: u64 = offset_of!(TableHeader, lock) as u64;
    pub const ENTRY_COUNT: u64 = offset_of!(TableHeader, entry_count) as u64;
}

pub(crate) mod entry {
    use super::*;

    pub const TAG_LO: u64 = offset_of!(EntryLayout, tag_lo) as u64;
    pub const TAG_HI: u64 = offset_of!(EntryLayout, tag_hi) as u64;
    pub const PHYS_ADDR: u64 = offset_of!(EntryLayout, phys_addr) as u64;
    pub const SIZE: u64 = offset_of!(EntryLayout, size) as u64;
}

/// Physical address of entry `index` in the table at `base`.
pub(crate) const fn entry_addr(base: u64, index: u64) -> u64 {
    base + HEADER_SIZE + index * ENTRY_SIZE
}
