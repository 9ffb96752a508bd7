//! Named blocks.
//!
//! A named block is an allocation recorded in the descriptor's named block
//! array under a string name, so that an unrelated image can find it again.
//! This is how shared structures are published: the first image to need one
//! allocates it by name, everyone after looks it up.

use gres_hwinit::{read_bytes, write_bytes, PhysMem};
use log::{debug, error, info};

use crate::layout::{desc, named, ALIGNMENT_SIZE, NAMED_DESC_SIZE, NAME_LEN};
use crate::{BootMem, BootmemError, BootmemFlags, Result};

/// A named block as recorded in the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedBlock {
    /// Physical address of the block.
    pub base_addr: u64,
    /// Size in bytes (rounded up to the allocation granule).
    pub size: u64,
    /// Physical address of the named block descriptor.
    pub desc_addr: u64,
}

impl<M: PhysMem + ?Sized> BootMem<'_, M> {
    fn named_array(&self) -> (u64, u32) {
        (
            self.mem.read_u64(self.desc_addr + desc::ARRAY_ADDR),
            self.mem.read_u32(self.desc_addr + desc::NUM_BLOCKS),
        )
    }

    fn named_slot(&self, index: u32) -> u64 {
        let (array, _) = self.named_array();
        array + index as u64 * NAMED_DESC_SIZE
    }

    fn slot_matches(&self, slot: u64, name: &[u8]) -> bool {
        let mut stored = [0u8; NAME_LEN];
        read_bytes(self.mem, slot + named::NAME, &mut stored);
        let len = stored.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        &stored[..len] == name
    }

    fn read_named(&self, slot: u64) -> NamedBlock {
        NamedBlock {
            base_addr: self.mem.read_u64(slot + named::BASE_ADDR),
            size: self.mem.read_u64(slot + named::SIZE),
            desc_addr: slot,
        }
    }

    /// Look up a named block.
    pub fn find_named_block(&self, name: &str, flags: BootmemFlags) -> Option<NamedBlock> {
        let _guard = self.lock_unless(flags);

        let (_, num_blocks) = self.named_array();
        (0..num_blocks)
            .map(|i| self.named_slot(i))
            .find(|&slot| self.mem.read_u64(slot + named::SIZE) != 0 && self.slot_matches(slot, name.as_bytes()))
            .map(|slot| self.read_named(slot))
    }

    /// Allocate a block and record it under `name`.
    ///
    /// Fails with [`BootmemError::AlreadyExists`] if the name is taken; use
    /// [`alloc_named_range_once`](Self::alloc_named_range_once) to share.
    pub fn alloc_named_block(
        &self,
        size: u64,
        min_addr: u64,
        max_addr: u64,
        alignment: u64,
        name: &str,
        flags: BootmemFlags,
    ) -> Result<u64> {
        // Keep room for the terminating NUL
        if name.is_empty() || name.len() >= NAME_LEN {
            return Err(BootmemError::NameTooLong);
        }

        let _guard = self.lock_unless(flags);

        if self.find_named_block(name, BootmemFlags::NO_LOCKING).is_some() {
            debug!("[BOOTMEM] named block '{}' already exists", name);
            return Err(BootmemError::AlreadyExists);
        }

        let (_, num_blocks) = self.named_array();
        let slot = (0..num_blocks)
            .map(|i| self.named_slot(i))
            .find(|&slot| self.mem.read_u64(slot + named::SIZE) == 0)
            .ok_or_else(|| {
                error!("[BOOTMEM] no free named block descriptor for '{}'", name);
                BootmemError::NoFreeDescriptor
            })?;

        let size = size
            .checked_add(ALIGNMENT_SIZE - 1)
            .ok_or(BootmemError::InvalidParameter)?
            & !(ALIGNMENT_SIZE - 1);
        let addr = self.phy_alloc(size, min_addr, max_addr, alignment, BootmemFlags::NO_LOCKING)?;

        self.mem.write_u64(slot + named::BASE_ADDR, addr);
        write_bytes(self.mem, slot + named::NAME, NAME_LEN, name.as_bytes());
        // Size last: a non-zero size is what marks the slot in use
        self.mem.write_barrier();
        self.mem.write_u64(slot + named::SIZE, size);

        debug!("[BOOTMEM] named block '{}' at {:#x} size {:#x}", name, addr, size);
        Ok(addr)
    }

    /// Return the block recorded under `name`, allocating it if absent.
    ///
    /// The descriptor lock is held across the lookup, the allocation and
    /// `init`, so across all racing images `init` runs exactly once. Without
    /// an initializer the new block is zero-filled.
    pub fn alloc_named_range_once(
        &self,
        size: u64,
        min_addr: u64,
        max_addr: u64,
        alignment: u64,
        name: &str,
        init: Option<&dyn Fn(u64)>,
    ) -> Result<u64> {
        let _guard = self.lock();

        if let Some(block) = self.find_named_block(name, BootmemFlags::NO_LOCKING) {
            return Ok(block.base_addr);
        }

        let addr = self.alloc_named_block(size, min_addr, max_addr, alignment, name, BootmemFlags::NO_LOCKING)?;
        match init {
            Some(init) => init(addr),
            None => self.mem.zero(addr, size),
        }
        self.mem.write_barrier();
        Ok(addr)
    }

    /// Release the block recorded under `name` and its descriptor.
    pub fn free_named_block(&self, name: &str, flags: BootmemFlags) -> Result<()> {
        let _guard = self.lock_unless(flags);

        let block = self
            .find_named_block(name, BootmemFlags::NO_LOCKING)
            .ok_or(BootmemError::NotFound)?;
        self.phy_free(block.base_addr, block.size, BootmemFlags::NO_LOCKING)?;

        self.mem.write_u64(block.desc_addr + named::SIZE, 0);
        self.mem.write_u64(block.desc_addr + named::BASE_ADDR, 0);
        write_bytes(self.mem, block.desc_addr + named::NAME, NAME_LEN, &[]);
        Ok(())
    }

    /// Number of named blocks in use.
    pub fn named_block_count(&self) -> usize {
        let _guard = self.lock();
        let (_, num_blocks) = self.named_array();
        (0..num_blocks)
            .filter(|&i| self.mem.read_u64(self.named_slot(i) + named::SIZE) != 0)
            .count()
    }

    /// Log every named block.
    pub fn print_named(&self) {
        let _guard = self.lock();
        let (array, num_blocks) = self.named_array();
        info!("[BOOTMEM] named blocks, array {:#x}, {} descriptors", array, num_blocks);

        for i in 0..num_blocks {
            let slot = self.named_slot(i);
            let block = self.read_named(slot);
            if block.size == 0 {
                continue;
            }
            let mut name = [0u8; NAME_LEN];
            read_bytes(self.mem, slot + named::NAME, &mut name);
            let len = name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
            info!(
                "[BOOTMEM]   '{}' base {:#010x} size {:#010x}",
                core::str::from_utf8(&name[..len]).unwrap_or("<non-utf8>"),
                block.base_addr,
                block.size
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use gres_hwinit::HostMemory;

    const DESC: u64 = 0x1000;
    const POOL: u64 = 0x10_0000;
    const POOL_SIZE: u64 = 0x10_0000;

    fn fixture() -> HostMemory {
        HostMemory::new(DESC, POOL + POOL_SIZE - DESC)
    }

    #[test]
    fn test_named_alloc_and_find() {
        let mem = fixture();
        let bootmem = BootMem::format(&mem, DESC, POOL, POOL_SIZE).unwrap();

        assert!(bootmem.find_named_block("cvmx-global-resources", BootmemFlags::empty()).is_none());
        let addr = bootmem
            .alloc_named(4112, 128, "cvmx-global-resources", BootmemFlags::empty())
            .unwrap();
        assert_eq!(addr % 128, 0);

        let block = bootmem
            .find_named_block("cvmx-global-resources", BootmemFlags::empty())
            .unwrap();
        assert_eq!(block.base_addr, addr);
        assert_eq!(block.size, 4112);
        assert!(bootmem.find_named_block("cvmx-global", BootmemFlags::empty()).is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mem = fixture();
        let bootmem = BootMem::format(&mem, DESC, POOL, POOL_SIZE).unwrap();
        bootmem.alloc_named(64, 16, "dup", BootmemFlags::empty()).unwrap();
        assert_eq!(
            bootmem.alloc_named(64, 16, "dup", BootmemFlags::empty()),
            Err(BootmemError::AlreadyExists)
        );
        assert_eq!(bootmem.named_block_count(), 1);
    }

    #[test]
    fn test_name_length_limit() {
        let mem = fixture();
        let bootmem = BootMem::format(&mem, DESC, POOL, POOL_SIZE).unwrap();
        let bytes = [b'x'; NAME_LEN];
        let long = core::str::from_utf8(&bytes).unwrap();
        assert_eq!(
            bootmem.alloc_named(64, 16, long, BootmemFlags::empty()),
            Err(BootmemError::NameTooLong)
        );
        let longest = &long[..NAME_LEN - 1];
        bootmem.alloc_named(64, 16, longest, BootmemFlags::empty()).unwrap();
        assert!(bootmem.find_named_block(longest, BootmemFlags::empty()).is_some());
    }

    #[test]
    fn test_range_once_runs_init_once() {
        let mem = fixture();
        let bootmem = BootMem::format(&mem, DESC, POOL, POOL_SIZE).unwrap();
        let calls = Cell::new(0);
        let init = |addr: u64| {
            calls.set(calls.get() + 1);
            mem.write_u64(addr, 0x1234);
        };

        let a = bootmem.alloc_named_range_once(8, 0, 0, 8, "cvmx_app_id", Some(&init)).unwrap();
        let b = bootmem.alloc_named_range_once(8, 0, 0, 8, "cvmx_app_id", Some(&init)).unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.get(), 1);
        assert_eq!(mem.read_u64(a), 0x1234);
    }

    #[test]
    fn test_range_once_zero_fills() {
        let mem = fixture();
        let bootmem = BootMem::format(&mem, DESC, POOL, POOL_SIZE).unwrap();
        let scratch = bootmem.alloc(64, 16).unwrap();
        for i in 0..8 {
            mem.write_u64(scratch + i * 8, u64::MAX);
        }
        bootmem.free(scratch, 64).unwrap();

        let addr = bootmem.alloc_named_range_once(64, 0, 0, 16, "zeroed", None).unwrap();
        assert!((0..8).all(|i| mem.read_u64(addr + i * 8) == 0));
    }

    #[test]
    fn test_free_named_block() {
        let mem = fixture();
        let bootmem = BootMem::format(&mem, DESC, POOL, POOL_SIZE).unwrap();
        let before = bootmem.available_mem(0);

        bootmem.alloc_named(0x400, 16, "scratch", BootmemFlags::empty()).unwrap();
        bootmem.free_named_block("scratch", BootmemFlags::empty()).unwrap();

        assert_eq!(bootmem.available_mem(0), before);
        assert!(bootmem.find_named_block("scratch", BootmemFlags::empty()).is_none());
        assert_eq!(
            bootmem.free_named_block("scratch", BootmemFlags::empty()),
            Err(BootmemError::NotFound)
        );
    }

    #[test]
    fn test_nested_calls_under_held_lock() {
        let mem = fixture();
        let bootmem = BootMem::format(&mem, DESC, POOL, POOL_SIZE).unwrap();

        let guard = bootmem.lock();
        assert!(bootmem.is_locked());
        let addr = bootmem
            .alloc_named(64, 16, "nested", BootmemFlags::NO_LOCKING)
            .unwrap();
        let found = bootmem.find_named_block("nested", BootmemFlags::NO_LOCKING).unwrap();
        drop(guard);

        assert_eq!(found.base_addr, addr);
        assert!(!bootmem.is_locked());
    }
}
