//! Synchronization Primitives
//!
//! Spinlocks over a single word of shared physical memory.
//!
//! # Design Notes
//!
//! The lock word lives inside the structure it protects (the bootmem
//! descriptor, the global resource table), so every firmware image mapping
//! that memory contends on the same bit. There is no OS and no scheduler to
//! park on: acquisition spins until the word is claimed.
//!
//! ```text
//!   lock:    loop { CAS(word, 0 -> 1) }         acquire
//!   unlock:  SYNCW; word = 0; SYNCW             release
//! ```
//!
//! The first SYNCW makes the critical section's stores visible before the
//! word reads free; the second pushes the release store out before anything
//! the caller does next.

use core::fmt;

use crate::phys::PhysMem;

// ═══════════════════════════════════════════════════════════════════════════
// SHARED SPINLOCK
// ═══════════════════════════════════════════════════════════════════════════

/// Lock word value when free.
pub const UNLOCKED: u32 = 0;

/// Lock word value when held.
pub const LOCKED: u32 = 1;

/// A spinlock whose state is one `u32` at a physical address.
///
/// Not recursive and not owned: whoever holds the guard may release it, and
/// [`force_unlock`](Self::force_unlock) releases it from anywhere.
pub struct SharedSpinLock<'a, M: PhysMem + ?Sized> {
    mem: &'a M,
    addr: u64,
}

impl<'a, M: PhysMem + ?Sized> SharedSpinLock<'a, M> {
    /// Wrap the lock word at `addr`. The word must be 4-byte aligned.
    pub const fn new(mem: &'a M, addr: u64) -> Self {
        Self { mem, addr }
    }

    /// Physical address of the lock word.
    pub fn addr(&self) -> u64 {
        self.addr
    }

    /// Acquire the lock, returns a guard that releases on drop.
    pub fn lock(&self) -> SharedSpinGuard<'a, M> {
        while self
            .mem
            .compare_exchange_u32(self.addr, UNLOCKED, LOCKED)
            .is_err()
        {
            // Spin on plain reads until the word looks free, then retry the claim
            while self.mem.read_u32(self.addr) != UNLOCKED {
                core::hint::spin_loop();
            }
        }

        SharedSpinGuard {
            mem: self.mem,
            addr: self.addr,
        }
    }

    /// Try to acquire the lock without spinning.
    pub fn try_lock(&self) -> Option<SharedSpinGuard<'a, M>> {
        self.mem
            .compare_exchange_u32(self.addr, UNLOCKED, LOCKED)
            .ok()
            .map(|_| SharedSpinGuard {
                mem: self.mem,
                addr: self.addr,
            })
    }

    /// Check if the lock is currently held (by anyone).
    pub fn is_locked(&self) -> bool {
        self.mem.read_u32(self.addr) != UNLOCKED
    }

    /// Release the lock without a guard.
    ///
    /// # Safety
    /// The caller must know the holder has finished its critical section,
    /// e.g. the lock was taken by an image that has since been reset.
    pub unsafe fn force_unlock(&self) {
        release(self.mem, self.addr);
    }
}

impl<M: PhysMem + ?Sized> fmt::Debug for SharedSpinLock<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSpinLock")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Guard returned by [`SharedSpinLock::lock`].
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SharedSpinGuard<'a, M: PhysMem + ?Sized> {
    mem: &'a M,
    addr: u64,
}

impl<M: PhysMem + ?Sized> SharedSpinGuard<'_, M> {
    /// Physical address of the held lock word.
    pub fn addr(&self) -> u64 {
        self.addr
    }
}

impl<M: PhysMem + ?Sized> Drop for SharedSpinGuard<'_, M> {
    fn drop(&mut self) {
        release(self.mem, self.addr);
    }
}

fn release<M: PhysMem + ?Sized>(mem: &M, addr: u64) {
    mem.write_barrier();
    mem.write_u32(addr, UNLOCKED);
    mem.write_barrier();
}
