//! Range Tracker
//!
//! Hands out indices from a fixed pool of numeric elements (hardware queue
//! numbers, port indices, pin numbers) to owners that share nothing but DRAM.
//! The tracker is a flat array of words in physical memory:
//!
//! ```text
//!   addr + 0         element count N
//!   addr + 8 * (i+1) owner of element i, or AVAILABLE
//! ```
//!
//! The tracker takes no lock of its own. Callers that share it across images
//! serialize access externally; the global resource table does this with its
//! table lock.
//!
//! # Usage
//!
//! ```ignore
//! use gres_range::RangeTracker;
//!
//! let range = RangeTracker::init(&mem, addr, 16)?;
//! let base = range.alloc(owner, 4, 1)?;
//! range.free_with_base(base, 4)?;
//! ```

#![no_std]

pub mod error;

use core::fmt;

use gres_hwinit::PhysMem;
use log::{debug, info, trace};

pub use error::{RangeError, Result};

/// Owner word of an element nobody holds.
pub const AVAILABLE: u64 = (-88i64) as u64;

/// Bytes needed for a tracker of `elements` elements, `None` if that
/// does not fit in a `u64`.
pub const fn memory_size(elements: u64) -> Option<u64> {
    match elements.checked_add(1) {
        Some(words) => words.checked_mul(8),
        None => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TRACKER HANDLE
// ═══════════════════════════════════════════════════════════════════════════

/// Handle on a range tracker at a physical address.
pub struct RangeTracker<'a, M: PhysMem + ?Sized> {
    mem: &'a M,
    addr: u64,
}

impl<'a, M: PhysMem + ?Sized> RangeTracker<'a, M> {
    /// Format `[addr, addr + memory_size(elements))` as an empty tracker.
    pub fn init(mem: &'a M, addr: u64, elements: u64) -> Result<Self> {
        if elements == 0 {
            return Err(RangeError::InvalidCount);
        }

        mem.write_u64(addr, elements);
        for i in 0..elements {
            mem.write_u64(Self::slot_addr(addr, i), AVAILABLE);
        }
        mem.write_barrier();

        debug!("[RANGE] init {:#x}: {} elements", addr, elements);
        Ok(Self { mem, addr })
    }

    /// Adopt a tracker that was initialized earlier, possibly by another image.
    pub const fn at(mem: &'a M, addr: u64) -> Self {
        Self { mem, addr }
    }

    /// Physical address of the tracker.
    pub fn addr(&self) -> u64 {
        self.addr
    }

    /// Number of elements tracked.
    pub fn count(&self) -> u64 {
        self.mem.read_u64(self.addr)
    }

    fn slot_addr(addr: u64, index: u64) -> u64 {
        addr + 8 * (index + 1)
    }

    fn owner_at(&self, index: u64) -> u64 {
        self.mem.read_u64(Self::slot_addr(self.addr, index))
    }

    fn set_owner(&self, index: u64, owner: u64) {
        self.mem.write_u64(Self::slot_addr(self.addr, index), owner);
    }

    fn block_is_free(&self, base: u64, n: u64) -> bool {
        (base..base + n).all(|i| self.owner_at(i) == AVAILABLE)
    }

    fn claim(&self, base: u64, n: u64, owner: u64) {
        for i in base..base + n {
            self.set_owner(i, owner);
        }
        self.mem.write_barrier();
    }

    fn check_block(&self, base: u64, n: u64) -> Result<()> {
        if n == 0 {
            return Err(RangeError::InvalidCount);
        }
        match base.checked_add(n) {
            Some(end) if end <= self.count() => Ok(()),
            _ => Err(RangeError::OutOfRange),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // ALLOCATION
    // ─────────────────────────────────────────────────────────────────────

    /// Claim the lowest free block of `n` elements whose base is a multiple
    /// of `align`.
    pub fn alloc(&self, owner: u64, n: u64, align: u64) -> Result<u64> {
        self.alloc_ordered(owner, n, align, false)
    }

    /// Like [`alloc`](Self::alloc), scanning from the top when `reverse`.
    pub fn alloc_ordered(&self, owner: u64, n: u64, align: u64, reverse: bool) -> Result<u64> {
        if owner == AVAILABLE {
            return Err(RangeError::InvalidOwner);
        }
        if align == 0 {
            return Err(RangeError::InvalidAlignment);
        }
        let count = self.count();
        if n == 0 || n > count {
            return Err(RangeError::InvalidCount);
        }

        let last = (count - n) / align * align;
        let base = if reverse {
            let mut candidates = (0..=last / align).rev().map(|k| k * align);
            candidates.find(|&b| self.block_is_free(b, n))
        } else {
            let mut candidates = (0..=last).step_by(align as usize);
            candidates.find(|&b| self.block_is_free(b, n))
        };

        let base = base.ok_or(RangeError::Exhausted)?;
        self.claim(base, n, owner);
        trace!("[RANGE] {:#x}: {} elements at {} for owner {:#x}", self.addr, n, base, owner);
        Ok(base)
    }

    /// Claim `out.len()` free elements anywhere, lowest first, writing
    /// their indices to `out`. Nothing is claimed unless all of them fit.
    pub fn alloc_non_contiguous(&self, owner: u64, out: &mut [u64]) -> Result<()> {
        if owner == AVAILABLE {
            return Err(RangeError::InvalidOwner);
        }
        if out.is_empty() || out.len() as u64 > self.count() {
            return Err(RangeError::InvalidCount);
        }

        let mut free = (0..self.count()).filter(|&i| self.owner_at(i) == AVAILABLE);
        for slot in out.iter_mut() {
            *slot = free.next().ok_or(RangeError::Exhausted)?;
        }

        for &index in out.iter() {
            self.set_owner(index, owner);
        }
        self.mem.write_barrier();
        Ok(())
    }

    /// Claim exactly `[base, base + n)`.
    pub fn reserve(&self, owner: u64, base: u64, n: u64) -> Result<()> {
        if owner == AVAILABLE {
            return Err(RangeError::InvalidOwner);
        }
        self.check_block(base, n)?;
        if !self.block_is_free(base, n) {
            debug!("[RANGE] {:#x}: {}..{} already allocated", self.addr, base, base + n);
            return Err(RangeError::AlreadyAllocated);
        }

        self.claim(base, n, owner);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // RELEASE
    // ─────────────────────────────────────────────────────────────────────

    /// Release `[base, base + n)` whatever its owner.
    pub fn free_with_base(&self, base: u64, n: u64) -> Result<()> {
        self.check_block(base, n)?;
        self.claim(base, n, AVAILABLE);
        Ok(())
    }

    /// Release every element held by `owner`, returns how many were freed.
    pub fn free_with_owner(&self, owner: u64) -> Result<u64> {
        if owner == AVAILABLE {
            return Err(RangeError::InvalidOwner);
        }

        let mut freed = 0;
        for i in 0..self.count() {
            if self.owner_at(i) == owner {
                self.set_owner(i, AVAILABLE);
                freed += 1;
            }
        }
        self.mem.write_barrier();
        Ok(freed)
    }

    /// Release the single elements listed in `bases`. Nothing is released
    /// if any index is out of range.
    pub fn free_multiple(&self, bases: &[u64]) -> Result<()> {
        let count = self.count();
        if bases.iter().any(|&b| b >= count) {
            return Err(RangeError::OutOfRange);
        }

        for &base in bases {
            self.set_owner(base, AVAILABLE);
        }
        self.mem.write_barrier();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // INSPECTION
    // ─────────────────────────────────────────────────────────────────────

    /// Owner of element `base`, `None` if it is free.
    pub fn get_owner(&self, base: u64) -> Result<Option<u64>> {
        if base >= self.count() {
            return Err(RangeError::OutOfRange);
        }
        let owner = self.owner_at(base);
        Ok((owner != AVAILABLE).then_some(owner))
    }

    /// Number of free elements.
    pub fn available(&self) -> u64 {
        (0..self.count())
            .filter(|&i| self.owner_at(i) == AVAILABLE)
            .count() as u64
    }

    /// Log the tracker as runs of equally owned elements.
    pub fn show(&self) {
        let count = self.count();
        info!("[RANGE] {:#x}: {} elements, {} free", self.addr, count, self.available());

        let mut start = 0;
        while start < count {
            let owner = self.owner_at(start);
            let mut end = start + 1;
            while end < count && self.owner_at(end) == owner {
                end += 1;
            }
            if owner == AVAILABLE {
                info!("[RANGE]   {:>5}..{:<5} free", start, end);
            } else {
                info!("[RANGE]   {:>5}..{:<5} owner {:#x}", start, end, owner);
            }
            start = end;
        }
    }
}

impl<M: PhysMem + ?Sized> fmt::Debug for RangeTracker<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeTracker")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("count", &self.count())
            .finish()
    }
}
