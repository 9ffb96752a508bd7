//! Free-list allocator over physical memory.
//!
//! Free blocks are kept in ascending address order, each starting with a
//! `{next, size}` header. Allocation takes the highest eligible block and
//! carves the request from its top end, splitting off head and tail room as
//! new free blocks. Freeing re-inserts in order and coalesces neighbours.

use gres_hwinit::{align_up, PhysMem};
use log::{debug, error, info, trace};

use crate::layout::{desc, free, ALIGNMENT_SIZE, MAX_ALIGNMENT};
use crate::{BootMem, BootmemError, BootmemFlags, Result};

impl<M: PhysMem + ?Sized> BootMem<'_, M> {
    fn head(&self) -> u64 {
        self.mem.read_u64(self.desc_addr + desc::HEAD_ADDR)
    }

    fn set_head(&self, addr: u64) {
        self.mem.write_u64(self.desc_addr + desc::HEAD_ADDR, addr);
    }

    fn block_next(&self, addr: u64) -> u64 {
        self.mem.read_u64(addr + free::NEXT)
    }

    fn block_size(&self, addr: u64) -> u64 {
        self.mem.read_u64(addr + free::SIZE)
    }

    fn set_block(&self, addr: u64, next: u64, size: u64) {
        self.mem.write_u64(addr + free::NEXT, next);
        self.mem.write_u64(addr + free::SIZE, size);
    }

    /// Allocate `req_size` bytes with the base inside `[address_min, address_max]`.
    ///
    /// - The size is rounded up to [`ALIGNMENT_SIZE`].
    /// - The alignment is rounded up to a power of two no smaller than
    ///   [`ALIGNMENT_SIZE`].
    /// - `address_min != 0, address_max == 0` requests exactly `address_min`.
    /// - `address_min == 0, address_max == 0` means anywhere.
    pub fn phy_alloc(
        &self,
        req_size: u64,
        address_min: u64,
        address_max: u64,
        alignment: u64,
        flags: BootmemFlags,
    ) -> Result<u64> {
        trace!(
            "[BOOTMEM] alloc req {:#x} min {:#x} max {:#x} align {:#x}",
            req_size, address_min, address_max, alignment
        );

        if req_size == 0 || alignment > MAX_ALIGNMENT {
            return Err(BootmemError::InvalidParameter);
        }
        let req_size = req_size
            .checked_add(ALIGNMENT_SIZE - 1)
            .ok_or(BootmemError::InvalidParameter)?
            & !(ALIGNMENT_SIZE - 1);
        let align = alignment.max(1).next_power_of_two().max(ALIGNMENT_SIZE);
        let align_mask = !(align - 1);

        let address_min = address_min
            .checked_add(align - 1)
            .ok_or(BootmemError::InvalidParameter)?
            & align_mask;
        let address_max = match (address_min, address_max) {
            (0, 0) => u64::MAX,
            (min, 0) => min.checked_add(req_size).ok_or(BootmemError::InvalidParameter)?,
            (_, max) => max,
        };
        match address_max.checked_sub(address_min) {
            Some(span) if span >= req_size => {}
            _ => return Err(BootmemError::InvalidParameter),
        }

        let _guard = self.lock_unless(flags);

        // (block, previous block, block size) of the best fit so far
        let mut target: Option<(u64, u64, u64)> = None;
        let mut prev = 0;
        let mut ent = self.head();
        while ent != 0 && ent < address_max {
            let ent_size = self.block_size(ent);
            let next = self.block_next(ent);

            if ent_size < ALIGNMENT_SIZE || (next != 0 && ent > next) {
                error!("[BOOTMEM] bad free list entry {:#x}, next {:#x}", ent, next);
                return Err(BootmemError::CorruptFreeList);
            }

            let free_start = (ent + align - 1) & align_mask;
            let free_end = (ent + ent_size) & align_mask;

            let eligible = free_start + req_size <= free_end
                && free_end >= address_min
                && free_start <= address_max
                && free_end - address_min >= req_size
                && address_max - free_start >= req_size;
            if eligible {
                // Keep going: the highest block that fits wins
                target = Some((ent, prev, ent_size));
            }

            prev = ent;
            ent = next;
        }

        let Some((mut ent, mut prev, mut ent_size)) = target else {
            debug!("[BOOTMEM] no free block for {:#x} bytes", req_size);
            return Err(BootmemError::OutOfMemory);
        };

        let usable_max = address_max.min(ent + ent_size);
        let desired = (usable_max - req_size) & align_mask;

        // Head room becomes its own free block
        if desired > ent {
            let new_ent = desired;
            let new_size = ent_size - (desired - ent);
            self.set_block(new_ent, self.block_next(ent), new_size);

            ent_size -= new_size;
            self.set_block(ent, new_ent, ent_size);

            prev = ent;
            ent = new_ent;
            ent_size = new_size;
        }

        // Tail room too
        if desired + req_size < ent + ent_size {
            let new_ent = ent + req_size;
            let new_size = ent_size - req_size;
            self.set_block(new_ent, self.block_next(ent), new_size);

            ent_size -= new_size;
            self.set_block(ent, new_ent, ent_size);
        }

        debug_assert_eq!(desired, ent);
        debug_assert_eq!(ent_size, req_size);

        let after = self.block_next(ent);
        if prev != 0 {
            self.mem.write_u64(prev + free::NEXT, after);
        } else {
            self.set_head(after);
        }

        debug!("[BOOTMEM] allocated {:#x} bytes at {:#x}", req_size, desired);
        Ok(desired)
    }

    /// Return `[addr, addr + size)` to the free list.
    ///
    /// The size is rounded up the same way [`phy_alloc`](Self::phy_alloc)
    /// rounded it. Adjacent free blocks are merged.
    pub fn phy_free(&self, addr: u64, size: u64, flags: BootmemFlags) -> Result<()> {
        if addr == 0 || size == 0 || addr % ALIGNMENT_SIZE != 0 {
            return Err(BootmemError::InvalidParameter);
        }
        let size = align_up(size, ALIGNMENT_SIZE);
        let end = addr.checked_add(size).ok_or(BootmemError::InvalidParameter)?;

        let _guard = self.lock_unless(flags);

        let head = self.head();
        if head == 0 || addr <= head {
            if head != 0 && end > head {
                return Err(self.overlap(addr, size));
            }
            if end == head {
                self.set_block(addr, self.block_next(head), self.block_size(head) + size);
            } else {
                self.set_block(addr, head, size);
            }
            self.set_head(addr);
            return Ok(());
        }

        let mut prev = 0;
        let mut cur = head;
        while cur != 0 && addr > cur {
            prev = cur;
            cur = self.block_next(cur);
        }

        let prev_end = prev + self.block_size(prev);
        if prev_end > addr || (cur != 0 && end > cur) {
            return Err(self.overlap(addr, size));
        }

        if prev_end == addr {
            // Grow the previous block, and swallow the next one if we now touch it
            let mut merged = self.block_size(prev) + size;
            let mut next = cur;
            if cur != 0 && end == cur {
                merged += self.block_size(cur);
                next = self.block_next(cur);
            }
            self.set_block(prev, next, merged);
        } else if cur != 0 && end == cur {
            self.set_block(addr, self.block_next(cur), self.block_size(cur) + size);
            self.mem.write_u64(prev + free::NEXT, addr);
        } else {
            self.set_block(addr, cur, size);
            self.mem.write_u64(prev + free::NEXT, addr);
        }

        Ok(())
    }

    fn overlap(&self, addr: u64, size: u64) -> BootmemError {
        error!("[BOOTMEM] free of {:#x}+{:#x} overlaps free memory", addr, size);
        BootmemError::OverlappingFree
    }

    /// Total size of free blocks no smaller than `min_block_size`.
    pub fn available_mem(&self, min_block_size: u64) -> u64 {
        let _guard = self.lock();
        let mut total = 0;
        let mut ent = self.head();
        while ent != 0 {
            let size = self.block_size(ent);
            if size >= min_block_size {
                total += size;
            }
            ent = self.block_next(ent);
        }
        total
    }

    /// Number of blocks on the free list.
    pub fn free_block_count(&self) -> usize {
        let _guard = self.lock();
        let mut count = 0;
        let mut ent = self.head();
        while ent != 0 {
            count += 1;
            ent = self.block_next(ent);
        }
        count
    }

    /// Log the free list.
    pub fn print_free_list(&self) {
        let _guard = self.lock();
        info!("[BOOTMEM] free list, descriptor {:#x}, head {:#x}", self.desc_addr, self.head());
        let mut ent = self.head();
        while ent != 0 {
            let next = self.block_next(ent);
            info!(
                "[BOOTMEM]   block {:#010x} size {:#010x} next {:#010x}",
                ent,
                self.block_size(ent),
                next
            );
            ent = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gres_hwinit::HostMemory;

    const DESC: u64 = 0x1000;
    const POOL: u64 = 0x10_0000;
    const POOL_SIZE: u64 = 0x10_0000;

    fn fixture() -> HostMemory {
        HostMemory::new(DESC, POOL + POOL_SIZE - DESC)
    }

    #[test]
    fn test_allocates_from_top() {
        let mem = fixture();
        let bootmem = BootMem::format(&mem, DESC, POOL, POOL_SIZE).unwrap();
        let a = bootmem.alloc(0x100, 16).unwrap();
        let b = bootmem.alloc(0x100, 16).unwrap();
        assert!(b < a);
        assert_eq!(a + 0x100, POOL + POOL_SIZE - named_array_size());
    }

    fn named_array_size() -> u64 {
        crate::NUM_NAMED_BLOCKS as u64 * crate::layout::NAMED_DESC_SIZE
    }

    #[test]
    fn test_rounds_size_and_alignment() {
        let mem = fixture();
        let bootmem = BootMem::format(&mem, DESC, POOL, POOL_SIZE).unwrap();
        let before = bootmem.available_mem(0);
        let a = bootmem.alloc(1, 100).unwrap();
        assert_eq!(a % 128, 0);
        // Only the rounded-up granule leaves the free list; alignment slack stays free
        assert_eq!(bootmem.available_mem(0), before - 16);
    }

    #[test]
    fn test_exact_address() {
        let mem = fixture();
        let bootmem = BootMem::format(&mem, DESC, POOL, POOL_SIZE).unwrap();
        let a = bootmem.alloc_address(0x200, POOL + 0x1000, 16).unwrap();
        assert_eq!(a, POOL + 0x1000);
        assert_eq!(
            bootmem.alloc_address(0x10, POOL + 0x1100, 16),
            Err(BootmemError::OutOfMemory)
        );
    }

    #[test]
    fn test_free_coalesces() {
        let mem = fixture();
        let bootmem = BootMem::format(&mem, DESC, POOL, POOL_SIZE).unwrap();
        let total = bootmem.available_mem(0);
        assert_eq!(bootmem.free_block_count(), 1);

        let a = bootmem.alloc_address(0x100, POOL + 0x1000, 16).unwrap();
        let b = bootmem.alloc_address(0x100, POOL + 0x1100, 16).unwrap();
        let c = bootmem.alloc_address(0x100, POOL + 0x1200, 16).unwrap();
        assert_eq!(bootmem.free_block_count(), 2);

        // b is bracketed by allocations: stands alone
        bootmem.free(b, 0x100).unwrap();
        assert_eq!(bootmem.free_block_count(), 3);

        // a bridges the low block and b
        bootmem.free(a, 0x100).unwrap();
        assert_eq!(bootmem.free_block_count(), 2);

        bootmem.free(c, 0x100).unwrap();
        assert_eq!(bootmem.free_block_count(), 1);
        assert_eq!(bootmem.available_mem(0), total);
    }

    #[test]
    fn test_double_free_rejected() {
        let mem = fixture();
        let bootmem = BootMem::format(&mem, DESC, POOL, POOL_SIZE).unwrap();
        let a = bootmem.alloc(0x100, 16).unwrap();
        bootmem.free(a, 0x100).unwrap();
        assert_eq!(bootmem.free(a, 0x100), Err(BootmemError::OverlappingFree));
    }

    #[test]
    fn test_exhaustion() {
        let mem = fixture();
        let bootmem = BootMem::format(&mem, DESC, POOL, POOL_SIZE).unwrap();
        assert_eq!(bootmem.alloc(POOL_SIZE, 16), Err(BootmemError::OutOfMemory));
        assert_eq!(bootmem.alloc(0, 16), Err(BootmemError::InvalidParameter));
    }

    #[test]
    fn test_range_limits() {
        let mem = fixture();
        let bootmem = BootMem::format(&mem, DESC, POOL, POOL_SIZE).unwrap();
        let a = bootmem.alloc_range(0x100, 16, POOL, POOL + 0x8000).unwrap();
        assert!(a >= POOL && a + 0x100 <= POOL + 0x8000);
    }
}
