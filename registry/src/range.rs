//! Named range resources.
//!
//! A range resource is a table entry whose memory holds a range tracker, so
//! images can share pools of small integers (queue numbers, port indices)
//! by tag. Every tracker operation runs under the table lock; the tracker
//! itself has none.

use gres_hwinit::PhysMem;
use gres_range::{memory_size, RangeError, RangeTracker};
use log::{debug, error};

use crate::{Locking, RegistryContext, RegistryError, Result, Tag};

impl<'a, M: PhysMem + ?Sized> RegistryContext<'a, M> {
    /// Create a range resource of `elements` elements under `tag`.
    ///
    /// If the tag already exists its tracker is left as is, whatever size it
    /// was created with.
    pub fn create_range_resource(&self, tag: Tag, elements: u64) -> Result<()> {
        let size = match memory_size(elements) {
            Some(size) if elements != 0 => size,
            _ => {
                error!("[GRES] range '{}': invalid element count {}", tag, elements);
                return Err(RangeError::InvalidCount.into());
            }
        };

        let _guard = self.lock_table()?;
        let created = self.create_if_absent(tag, size, Locking::NoLock)?;
        if created.newly_created {
            RangeTracker::init(self.mem(), created.addr, elements)?;
            debug!("[GRES] range '{}': {} elements at {:#x}", tag, elements, created.addr);
        }
        Ok(())
    }

    fn range_addr(&self, tag: Tag) -> Result<u64> {
        self.get(tag, Locking::Lock).map_err(|e| {
            if e == RegistryError::NotFound {
                error!("[GRES] range resource '{}' does not exist", tag);
            }
            e
        })
    }

    /// `None` when the tag does not exist, for the free paths.
    fn range_addr_if_present(&self, tag: Tag) -> Result<Option<u64>> {
        match self.get(tag, Locking::Lock) {
            Ok(addr) => Ok(Some(addr)),
            Err(RegistryError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // The lookup and the tracker call below take the table lock separately.
    // Entries are never removed, so the address resolved by the lookup
    // stays valid; the tracker state is only read under the second hold.

    /// Claim `n` contiguous elements from the range, base a multiple of
    /// `align`, lowest first.
    pub fn allocate_range(&self, tag: Tag, owner: u64, n: u64, align: u64) -> Result<u64> {
        let addr = self.range_addr(tag)?;
        let _guard = self.lock_table()?;
        Ok(RangeTracker::at(self.mem(), addr).alloc(owner, n, align)?)
    }

    /// Claim the highest free element.
    pub fn allocate_reverse(&self, tag: Tag, owner: u64) -> Result<u64> {
        let addr = self.range_addr(tag)?;
        let _guard = self.lock_table()?;
        Ok(RangeTracker::at(self.mem(), addr).alloc_ordered(owner, 1, 1, true)?)
    }

    /// Claim `out.len()` elements anywhere in the range.
    pub fn allocate_many(&self, tag: Tag, owner: u64, out: &mut [u64]) -> Result<()> {
        let addr = self.range_addr(tag)?;
        let _guard = self.lock_table()?;
        Ok(RangeTracker::at(self.mem(), addr).alloc_non_contiguous(owner, out)?)
    }

    /// Claim exactly `[base, base + n)`.
    pub fn reserve_range(&self, tag: Tag, owner: u64, base: u64, n: u64) -> Result<()> {
        let addr = self.range_addr(tag)?;
        let _guard = self.lock_table()?;
        Ok(RangeTracker::at(self.mem(), addr).reserve(owner, base, n)?)
    }

    /// Release `[base, base + n)`. A missing tag has nothing to free.
    pub fn free_range_by_base(&self, tag: Tag, base: u64, n: u64) -> Result<()> {
        let Some(addr) = self.range_addr_if_present(tag)? else {
            return Ok(());
        };
        let _guard = self.lock_table()?;
        Ok(RangeTracker::at(self.mem(), addr).free_with_base(base, n)?)
    }

    /// Release the single elements in `bases`. A missing tag has nothing
    /// to free.
    pub fn free_range_multiple(&self, tag: Tag, bases: &[u64]) -> Result<()> {
        let Some(addr) = self.range_addr_if_present(tag)? else {
            return Ok(());
        };
        let _guard = self.lock_table()?;
        Ok(RangeTracker::at(self.mem(), addr).free_multiple(bases)?)
    }

    /// Release everything `owner` holds in the range, returns the count.
    pub fn free_range_with_owner(&self, tag: Tag, owner: u64) -> Result<u64> {
        let Some(addr) = self.range_addr_if_present(tag)? else {
            return Ok(0);
        };
        let _guard = self.lock_table()?;
        Ok(RangeTracker::at(self.mem(), addr).free_with_owner(owner)?)
    }

    /// Owner of element `index`, `None` if free.
    pub fn range_owner(&self, tag: Tag, index: u64) -> Result<Option<u64>> {
        let addr = self.range_addr(tag)?;
        let _guard = self.lock_table()?;
        Ok(RangeTracker::at(self.mem(), addr).get_owner(index)?)
    }

    /// Log the range's allocations.
    pub fn show_range(&self, tag: Tag) -> Result<()> {
        let addr = self.range_addr(tag)?;
        let _guard = self.lock_table()?;
        RangeTracker::at(self.mem(), addr).show();
        Ok(())
    }
}
