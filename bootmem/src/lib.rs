//! Boot Memory Allocator
//!
//! The physical memory pool every firmware image on the machine allocates
//! from. The allocator keeps all of its state in the pool's own DRAM (a
//! descriptor at a well-known address, a free list threaded through the free
//! blocks, an array of named block descriptors), so an image that boots later
//! on another core, or the OS that follows, picks up exactly where the
//! previous one left off.
//!
//! # Layers
//!
//! ```text
//!   named blocks     find / alloc / alloc_once / free by name
//!        │
//!   phy allocator    first-fit-from-top over an address-ordered free list
//!        │
//!   descriptor       lock word, version, free list head, named array
//! ```
//!
//! # Locking
//!
//! One spinlock word inside the descriptor serializes every operation.
//! Each entry point takes [`BootmemFlags`]; callers that already hold the
//! lock (see [`BootMem::lock`]) pass [`BootmemFlags::NO_LOCKING`] to nest.
//!
//! # Usage
//!
//! ```ignore
//! use gres_bootmem::{BootMem, BootmemFlags};
//!
//! // First image: lay out the descriptor over the pool
//! let bootmem = BootMem::format(&mem, DESC_ADDR, POOL_BASE, POOL_SIZE)?;
//!
//! // Later images: adopt it
//! let bootmem = BootMem::attach(&mem, DESC_ADDR)?;
//!
//! let addr = bootmem.alloc_named(4096, 128, "my-table", BootmemFlags::empty())?;
//! ```

#![no_std]

pub mod error;
pub mod layout;
mod named;
mod phy;

use bitflags::bitflags;
use gres_hwinit::{align_down, align_up, PhysMem, SharedSpinGuard, SharedSpinLock};
use log::{debug, error};

pub use error::{BootmemError, Result};
pub use layout::{ALIGNMENT_SIZE, DESC_SIZE, MAJOR_VERSION, MINOR_VERSION, NAME_LEN, NUM_NAMED_BLOCKS};
pub use named::NamedBlock;

use layout::desc;

bitflags! {
    /// Modifiers accepted by every allocator entry point.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BootmemFlags: u32 {
        /// Caller already holds the descriptor lock.
        const NO_LOCKING = 1 << 1;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ALLOCATOR HANDLE
// ═══════════════════════════════════════════════════════════════════════════

/// Handle on a bootmem descriptor in shared physical memory.
///
/// The handle holds no state of its own beyond the descriptor address, so any
/// number of handles (one per image) may refer to the same descriptor.
pub struct BootMem<'a, M: PhysMem + ?Sized> {
    mem: &'a M,
    desc_addr: u64,
}

impl<'a, M: PhysMem + ?Sized> BootMem<'a, M> {
    /// Lay out a fresh descriptor at `desc_addr` managing
    /// `[pool_base, pool_base + pool_size)`.
    ///
    /// This is what the first-stage loader does once per power cycle. The
    /// named block array is carved out of the pool itself. The descriptor
    /// must not lie inside the pool.
    pub fn format(mem: &'a M, desc_addr: u64, pool_base: u64, pool_size: u64) -> Result<Self> {
        let base = align_up(pool_base, ALIGNMENT_SIZE);
        let end = align_down(pool_base.saturating_add(pool_size), ALIGNMENT_SIZE);

        if base == 0 || end <= base || desc_addr % 8 != 0 {
            return Err(BootmemError::InvalidParameter);
        }
        if desc_addr < end && desc_addr + DESC_SIZE > base {
            error!("[BOOTMEM] descriptor {:#x} overlaps pool {:#x}..{:#x}", desc_addr, base, end);
            return Err(BootmemError::InvalidParameter);
        }

        mem.zero(desc_addr, DESC_SIZE);
        mem.write_u32(desc_addr + desc::FLAGS, 0);
        mem.write_u32(desc_addr + desc::MAJOR_VERSION, MAJOR_VERSION);
        mem.write_u32(desc_addr + desc::MINOR_VERSION, MINOR_VERSION);
        mem.write_u64(desc_addr + desc::HEAD_ADDR, 0);

        let bootmem = Self { mem, desc_addr };
        bootmem.phy_free(base, end - base, BootmemFlags::NO_LOCKING)?;

        let array_size = NUM_NAMED_BLOCKS as u64 * layout::NAMED_DESC_SIZE;
        let array = bootmem.phy_alloc(array_size, 0, 0, ALIGNMENT_SIZE, BootmemFlags::NO_LOCKING)?;
        mem.zero(array, array_size);
        mem.write_u32(desc_addr + desc::NUM_BLOCKS, NUM_NAMED_BLOCKS);
        mem.write_u32(desc_addr + desc::NAME_LEN, NAME_LEN as u32);
        mem.write_u64(desc_addr + desc::ARRAY_ADDR, array);
        mem.write_barrier();

        debug!(
            "[BOOTMEM] formatted desc {:#x}: pool {:#x}..{:#x}, named array {:#x}",
            desc_addr, base, end, array
        );
        Ok(bootmem)
    }

    /// Adopt the descriptor another image already formatted.
    pub fn attach(mem: &'a M, desc_addr: u64) -> Result<Self> {
        let bootmem = Self { mem, desc_addr };
        bootmem.check_version()?;
        Ok(bootmem)
    }

    /// Physical address of the descriptor.
    pub fn desc_addr(&self) -> u64 {
        self.desc_addr
    }

    /// The memory the descriptor lives in.
    pub fn mem(&self) -> &'a M {
        self.mem
    }

    /// Descriptor version as `(major, minor)`.
    pub fn version(&self) -> (u32, u32) {
        (
            self.mem.read_u32(self.desc_addr + desc::MAJOR_VERSION),
            self.mem.read_u32(self.desc_addr + desc::MINOR_VERSION),
        )
    }

    fn check_version(&self) -> Result<()> {
        let (major, minor) = self.version();
        if major != MAJOR_VERSION {
            error!(
                "[BOOTMEM] descriptor {:#x} version {}.{} unsupported, need {}.x",
                self.desc_addr, major, minor, MAJOR_VERSION
            );
            return Err(BootmemError::BadVersion);
        }
        let name_len = self.mem.read_u32(self.desc_addr + desc::NAME_LEN);
        if name_len as usize != NAME_LEN {
            error!("[BOOTMEM] named block name length {} != {}", name_len, NAME_LEN);
            return Err(BootmemError::LayoutMismatch);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // LOCKING
    // ─────────────────────────────────────────────────────────────────────

    fn lock_word(&self) -> SharedSpinLock<'a, M> {
        SharedSpinLock::new(self.mem, self.desc_addr + desc::LOCK)
    }

    /// Take the descriptor lock for a sequence of `NO_LOCKING` calls.
    pub fn lock(&self) -> SharedSpinGuard<'a, M> {
        self.lock_word().lock()
    }

    /// Is the descriptor lock held by anyone?
    pub fn is_locked(&self) -> bool {
        self.lock_word().is_locked()
    }

    fn lock_unless(&self, flags: BootmemFlags) -> Option<SharedSpinGuard<'a, M>> {
        if flags.contains(BootmemFlags::NO_LOCKING) {
            None
        } else {
            Some(self.lock())
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // CONVENIENCE ALLOCATION
    // ─────────────────────────────────────────────────────────────────────

    /// Allocate `size` bytes anywhere in the pool.
    pub fn alloc(&self, size: u64, alignment: u64) -> Result<u64> {
        self.phy_alloc(size, 0, 0, alignment, BootmemFlags::empty())
    }

    /// Allocate `size` bytes inside `[min_addr, max_addr]`.
    pub fn alloc_range(&self, size: u64, alignment: u64, min_addr: u64, max_addr: u64) -> Result<u64> {
        self.phy_alloc(size, min_addr, max_addr, alignment, BootmemFlags::empty())
    }

    /// Allocate exactly at `address`.
    pub fn alloc_address(&self, size: u64, address: u64, alignment: u64) -> Result<u64> {
        self.phy_alloc(size, address, address + size, alignment, BootmemFlags::empty())
    }

    /// Allocate a named block anywhere in the pool.
    pub fn alloc_named(&self, size: u64, alignment: u64, name: &str, flags: BootmemFlags) -> Result<u64> {
        self.alloc_named_block(size, 0, 0, alignment, name, flags)
    }

    /// Free memory obtained from one of the unnamed allocation calls.
    pub fn free(&self, addr: u64, size: u64) -> Result<()> {
        self.phy_free(addr, size, BootmemFlags::empty())
    }
}
