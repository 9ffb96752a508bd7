//! In-memory layout of the bootmem descriptor.
//!
//! These structs are never instantiated; they exist so field offsets and
//! sizes come from the compiler instead of hand-counted constants. All access
//! goes through [`PhysMem`](gres_hwinit::PhysMem) at `base + OFFSET`.
//!
//! ```text
//! descriptor                       named block array          free block
//! ┌──────────────────────────┐     ┌──────────────────────┐   ┌──────────┐
//! │ lock | flags             │     │ base_addr            │   │ next     │
//! │ head_addr ───────────────┼──┐  │ size (0 = unused)    │   │ size     │
//! │ major | minor            │  │  │ name[NAME_LEN]       │   │ ...      │
//! │ app_data_addr/size       │  │  ├──────────────────────┤   └──────────┘
//! │ num_blocks | name_len    │  └─►│ ...                  │
//! │ named_block_array_addr ──┼────►└──────────────────────┘
//! └──────────────────────────┘
//! ```

use memoffset::offset_of;
use static_assertions::const_assert_eq;

/// Descriptor major version with named block support.
pub const MAJOR_VERSION: u32 = 3;
/// Descriptor minor version written by [`BootMem::format`](crate::BootMem::format).
pub const MINOR_VERSION: u32 = 0;

/// Every allocation is a multiple of, and aligned to, this many bytes.
pub const ALIGNMENT_SIZE: u64 = 16;

/// Bytes reserved for a block name, terminating NUL included.
pub const NAME_LEN: usize = 128;

/// Named block descriptors created by `format`.
pub const NUM_NAMED_BLOCKS: u32 = 64;

/// Largest alignment a caller may request.
pub const MAX_ALIGNMENT: u64 = 1 << 48;

#[repr(C)]
pub(crate) struct BootmemDesc {
    pub lock: u32,
    pub flags: u32,
    pub head_addr: u64,
    pub major_version: u32,
    pub minor_version: u32,
    pub app_data_addr: u64,
    pub app_data_size: u64,
    pub named_block_num_blocks: u32,
    pub named_block_name_len: u32,
    pub named_block_array_addr: u64,
}

#[repr(C)]
pub(crate) struct NamedBlockDesc {
    pub base_addr: u64,
    pub size: u64,
    pub name: [u8; NAME_LEN],
}

#[repr(C)]
pub(crate) struct FreeBlockHeader {
    pub next: u64,
    pub size: u64,
}

const_assert_eq!(core::mem::size_of::<BootmemDesc>(), 56);
const_assert_eq!(core::mem::size_of::<NamedBlockDesc>(), 16 + NAME_LEN);
const_assert_eq!(core::mem::size_of::<FreeBlockHeader>() as u64, ALIGNMENT_SIZE);

/// Bytes occupied by the descriptor itself.
pub const DESC_SIZE: u64 = core::mem::size_of::<BootmemDesc>() as u64;
pub(crate) const NAMED_DESC_SIZE: u64 = core::mem::size_of::<NamedBlockDesc>() as u64;

pub(crate) mod desc {
    use super::*;

    pub const LOCK: u64 = offset_of!(BootmemDesc, lock) as u64;
    pub const FLAGS: u64 = offset_of!(BootmemDesc, flags) as u64;
    pub const HEAD_ADDR: u64 = offset_of!(BootmemDesc, head_addr) as u64;
    pub const MAJOR_VERSION: u64 = offset_of!(BootmemDesc, major_version) as u64;
    pub const MINOR_VERSION: u64 = offset_of!(BootmemDesc, minor_version) as u64;
    pub const NUM_BLOCKS: u64 = offset_of!(BootmemDesc, named_block_num_blocks) as u64;
    pub const NAME_LEN: u64 = offset_of!(BootmemDesc, named_block_name_len) as u64;
    pub const ARRAY_ADDR: u64 = offset_of!(BootmemDesc, named_block_array_addr) as u64;
}

pub(crate) mod named {
    use super::*;

    pub const BASE_ADDR: u64 = offset_of!(NamedBlockDesc, base_addr) as u64;
    pub const SIZE: u64 = offset_of!(NamedBlockDesc, size) as u64;
    pub const NAME: u64 = offset_of!(NamedBlockDesc, name) as u64;
}

pub(crate) mod free {
    use super::*;

    pub const NEXT: u64 = offset_of!(FreeBlockHeader, next) as u64;
    pub const SIZE: u64 = offset_of!(FreeBlockHeader, size) as u64;
}
