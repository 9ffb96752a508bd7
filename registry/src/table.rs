//! The global resource table.
//!
//! One table per shared DRAM, published as a named boot memory block. The
//! first image that touches it allocates and zeroes it; every later image
//! (including the kernel it hands off to) adopts the published block and
//! must never zero it again.

use core::sync::atomic::{AtomicU64, Ordering};

use gres_bootmem::{BootMem, BootmemFlags};
use gres_hwinit::{PhysMem, SharedSpinGuard, SharedSpinLock};
use log::{debug, error, info};
use spin::Once;

use crate::layout::{entry, entry_addr, header};
use crate::{RegistryConfig, RegistryError, Result, Tag};

/// Whether an operation takes the table lock itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locking {
    /// Take and release the table lock around the operation.
    Lock,
    /// The caller already holds the table lock (see
    /// [`RegistryContext::lock_table`]).
    NoLock,
}

/// A table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceEntry {
    pub tag: Tag,
    pub phys_addr: u64,
    pub size: u64,
}

/// Outcome of [`RegistryContext::create_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Created {
    /// Physical address of the resource.
    pub addr: u64,
    /// `false` if another caller had already created it.
    pub newly_created: bool,
}

// ═══════════════════════════════════════════════════════════════════════════
// REGISTRY CONTEXT
// ═══════════════════════════════════════════════════════════════════════════

/// One image's view of the global resource table.
///
/// Holds what that image caches: the table base once resolved and the
/// application id once allocated. Several contexts over the same memory
/// behave like several images sharing DRAM.
pub struct RegistryContext<'a, M: PhysMem + ?Sized> {
    bootmem: BootMem<'a, M>,
    config: RegistryConfig,
    /// Table base, 0 until resolved.
    base: AtomicU64,
    pub(crate) app_id: AtomicU64,
    pub(crate) app_id_once: Once<()>,
}

impl<'a, M: PhysMem + ?Sized> RegistryContext<'a, M> {
    pub fn new(bootmem: BootMem<'a, M>, config: RegistryConfig) -> Self {
        Self {
            bootmem,
            config,
            base: AtomicU64::new(0),
            app_id: AtomicU64::new(0),
            app_id_once: Once::new(),
        }
    }

    /// Context with the [`RegistryConfig::OCTEON`] layout.
    pub fn with_defaults(bootmem: BootMem<'a, M>) -> Self {
        Self::new(bootmem, RegistryConfig::default())
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn bootmem(&self) -> &BootMem<'a, M> {
        &self.bootmem
    }

    pub(crate) fn mem(&self) -> &'a M {
        self.bootmem.mem()
    }

    /// Cached table base, `None` before the first table operation.
    pub fn table_addr(&self) -> Option<u64> {
        match self.base.load(Ordering::Acquire) {
            0 => None,
            base => Some(base),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // INITIALIZATION
    // ─────────────────────────────────────────────────────────────────────

    /// Resolve the table, creating it if no image has yet.
    ///
    /// Runs implicitly before every table operation; calling it up front
    /// only moves the cost.
    pub fn init(&self) -> Result<u64> {
        let cached = self.base.load(Ordering::Acquire);
        if cached != 0 {
            return Ok(cached);
        }

        let size = self.config.table_size();
        let name = self.config.table_block_name;

        // The bootmem lock makes find-or-create atomic across images
        let guard = self.bootmem.lock();
        let base = match self.bootmem.find_named_block(name, BootmemFlags::NO_LOCKING) {
            Some(block) if block.size < size => {
                error!(
                    "[GRES] published table '{}' is {:#x} bytes, need {:#x}",
                    name, block.size, size
                );
                return Err(RegistryError::LayoutMismatch);
            }
            Some(block) => {
                debug!("[GRES] adopting table at {:#x}", block.base_addr);
                block.base_addr
            }
            None => {
                let base = self
                    .bootmem
                    .alloc_named(size, self.config.alloc_align, name, BootmemFlags::NO_LOCKING)
                    .map_err(|e| {
                        error!("[GRES] failed to allocate table ({:#x} bytes): {}", size, e);
                        RegistryError::Bootmem(e)
                    })?;
                self.mem().zero(base, size);
                self.mem().write_barrier();
                debug!("[GRES] created table at {:#x}, {} slots", base, self.config.capacity);
                base
            }
        };
        drop(guard);

        self.base.store(base, Ordering::Release);
        Ok(base)
    }

    // ─────────────────────────────────────────────────────────────────────
    // LOCKING
    // ─────────────────────────────────────────────────────────────────────

    fn lock_word(&self, base: u64) -> SharedSpinLock<'a, M> {
        SharedSpinLock::new(self.mem(), base + header::LOCK)
    }

    /// Hold the table lock across several [`Locking::NoLock`] calls.
    pub fn lock_table(&self) -> Result<SharedSpinGuard<'a, M>> {
        let base = self.init()?;
        Ok(self.lock_word(base).lock())
    }

    fn lock_unless(&self, base: u64, locking: Locking) -> Option<SharedSpinGuard<'a, M>> {
        match locking {
            Locking::Lock => Some(self.lock_word(base).lock()),
            Locking::NoLock => None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // ENTRIES
    // ─────────────────────────────────────────────────────────────────────

    fn stored_count(&self, base: u64) -> u64 {
        self.mem()
            .read_u64(base + header::ENTRY_COUNT)
            .min(self.config.capacity)
    }

    fn read_entry(&self, base: u64, index: u64) -> ResourceEntry {
        let at = entry_addr(base, index);
        ResourceEntry {
            tag: Tag::new(
                self.mem().read_u64(at + entry::TAG_LO),
                self.mem().read_u64(at + entry::TAG_HI),
            ),
            phys_addr: self.mem().read_u64(at + entry::PHYS_ADDR),
            size: self.mem().read_u64(at + entry::SIZE),
        }
    }

    fn find(&self, base: u64, tag: Tag) -> Option<ResourceEntry> {
        (0..self.stored_count(base))
            .map(|i| self.read_entry(base, i))
            .find(|e| e.tag == tag)
    }

    /// The entry carrying `tag`.
    pub fn entry(&self, tag: Tag, locking: Locking) -> Result<ResourceEntry> {
        let base = self.init()?;
        let _guard = self.lock_unless(base, locking);
        self.find(base, tag).ok_or(RegistryError::NotFound)
    }

    /// Physical address of the resource carrying `tag`.
    pub fn get(&self, tag: Tag, locking: Locking) -> Result<u64> {
        self.entry(tag, locking).map(|e| e.phys_addr)
    }

    /// Return the resource carrying `tag`, allocating `size` bytes for it if
    /// there is none.
    ///
    /// Lookup and insert happen under one hold of the table lock, so racing
    /// creators all get the same address and exactly one of them sees
    /// `newly_created`. An existing entry is returned whatever its size.
    pub fn create_if_absent(&self, tag: Tag, size: u64, locking: Locking) -> Result<Created> {
        let base = self.init()?;
        let _guard = self.lock_unless(base, locking);

        if let Some(existing) = self.find(base, tag) {
            return Ok(Created {
                addr: existing.phys_addr,
                newly_created: false,
            });
        }

        let count = self.stored_count(base);
        if count >= self.config.capacity {
            error!(
                "[GRES] table full ({} entries), cannot add '{}'",
                self.config.capacity, tag
            );
            return Err(RegistryError::CapacityExceeded);
        }

        let addr = self.bootmem.alloc(size, self.config.alloc_align).map_err(|e| {
            error!("[GRES] failed to allocate {:#x} bytes for '{}': {}", size, tag, e);
            RegistryError::AllocationFailed
        })?;

        let at = entry_addr(base, count);
        self.mem().write_u64(at + entry::TAG_LO, tag.lo);
        self.mem().write_u64(at + entry::TAG_HI, tag.hi);
        self.mem().write_u64(at + entry::PHYS_ADDR, addr);
        self.mem().write_u64(at + entry::SIZE, size);
        self.mem().write_barrier();
        self.mem().write_u64(base + header::ENTRY_COUNT, count + 1);
        self.mem().write_barrier();

        debug!("[GRES] '{}' -> {:#x} ({:#x} bytes), slot {}", tag, addr, size, count);
        Ok(Created {
            addr,
            newly_created: true,
        })
    }

    /// Entries in use.
    pub fn entry_count(&self, locking: Locking) -> Result<u64> {
        let base = self.init()?;
        let _guard = self.lock_unless(base, locking);
        Ok(self.stored_count(base))
    }

    /// Log every entry.
    pub fn show(&self, locking: Locking) -> Result<()> {
        let base = self.init()?;
        let _guard = self.lock_unless(base, locking);
        let count = self.stored_count(base);

        info!(
            "[GRES] table at {:#x}: {}/{} entries",
            base, count, self.config.capacity
        );
        for i in 0..count {
            let e = self.read_entry(base, i);
            info!(
                "[GRES]   {:>3} {:<16} {:#018x}:{:#018x} addr {:#012x} size {:#x}",
                i, e.tag, e.tag.lo, e.tag.hi, e.phys_addr, e.size
            );
        }
        Ok(())
    }
}

impl<M: PhysMem + ?Sized> core::fmt::Debug for RegistryContext<'_, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegistryContext")
            .field("table", &self.table_addr())
            .field("app_id", &self.app_id.load(Ordering::Relaxed))
            .finish()
    }
}
