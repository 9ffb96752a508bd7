//! Physical Memory Access
//!
//! Everything that lives in shared DRAM (the bootmem descriptor, the global
//! resource table, range trackers) is reached through this accessor rather
//! than through Rust references. The structures are shared with other
//! firmware images that may not map them at all, so only fixed-size word
//! accesses at physical addresses are allowed.
//!
//! # Addressing
//!
//! ```text
//!   63  62                                    0
//!  ┌───┬──────────────────────────────────────┐
//!  │ 1 │        physical address              │   uncached window
//!  └───┴──────────────────────────────────────┘
//! ```
//!
//! Setting bit 63 selects the uncached window, so every image observes the
//! same bytes without explicit cache maintenance. Implementations accept both
//! the windowed and the bare form of an address.

use crate::cpu::barriers;

// ═══════════════════════════════════════════════════════════════════════════
// ADDRESS WINDOW
// ═══════════════════════════════════════════════════════════════════════════

/// Bit selecting the uncached physical window.
pub const UNCACHED_WINDOW: u64 = 1 << 63;

/// Cache line size of the shared-memory coherence domain.
pub const CACHE_LINE_SIZE: u64 = 128;

/// Address of `addr` inside the uncached window.
#[inline]
pub const fn uncached(addr: u64) -> u64 {
    addr | UNCACHED_WINDOW
}

/// Strip the window selector, leaving the bare physical address.
#[inline]
pub const fn physical(addr: u64) -> u64 {
    addr & !UNCACHED_WINDOW
}

/// Align a value up to the given power-of-two alignment.
#[inline]
pub const fn align_up(val: u64, align: u64) -> u64 {
    (val + align - 1) & !(align - 1)
}

/// Align a value down to the given power-of-two alignment.
#[inline]
pub const fn align_down(val: u64, align: u64) -> u64 {
    val & !(align - 1)
}

// ═══════════════════════════════════════════════════════════════════════════
// ACCESSOR
// ═══════════════════════════════════════════════════════════════════════════

/// Word accessor over physical memory.
///
/// All accesses must be naturally aligned. Byte order is the native order of
/// the running image; the shared structures are not a cross-platform format.
pub trait PhysMem: Sync {
    /// Read a 32-bit word.
    fn read_u32(&self, addr: u64) -> u32;

    /// Read a 64-bit word.
    fn read_u64(&self, addr: u64) -> u64;

    /// Write a 32-bit word.
    fn write_u32(&self, addr: u64, val: u32);

    /// Write a 64-bit word.
    fn write_u64(&self, addr: u64, val: u64);

    /// Atomically replace `current` with `new` at `addr`.
    ///
    /// This is the load-linked/store-conditional pair spinlocks are built on.
    /// Returns the previous value, `Ok` if the store happened.
    fn compare_exchange_u32(&self, addr: u64, current: u32, new: u32) -> Result<u32, u32>;

    /// Atomically add `delta` to the 64-bit word at `addr`.
    ///
    /// Sequentially consistent. Returns the value before the add.
    fn fetch_add_u64(&self, addr: u64, delta: u64) -> u64;

    /// Order all earlier stores before all later ones (SYNCW).
    fn write_barrier(&self) {
        barriers::write_barrier();
    }

    /// Fill `len` bytes at `addr` with zero, one 64-bit word at a time.
    ///
    /// `addr` must be 8-byte aligned; a trailing partial word is rounded up.
    fn zero(&self, addr: u64, len: u64) {
        let mut offset = 0;
        while offset < len {
            self.write_u64(addr + offset, 0);
            offset += 8;
        }
    }
}

impl<M: PhysMem + ?Sized> PhysMem for &M {
    fn read_u32(&self, addr: u64) -> u32 {
        (**self).read_u32(addr)
    }

    fn read_u64(&self, addr: u64) -> u64 {
        (**self).read_u64(addr)
    }

    fn write_u32(&self, addr: u64, val: u32) {
        (**self).write_u32(addr, val)
    }

    fn write_u64(&self, addr: u64, val: u64) {
        (**self).write_u64(addr, val)
    }

    fn compare_exchange_u32(&self, addr: u64, current: u32, new: u32) -> Result<u32, u32> {
        (**self).compare_exchange_u32(addr, current, new)
    }

    fn fetch_add_u64(&self, addr: u64, delta: u64) -> u64 {
        (**self).fetch_add_u64(addr, delta)
    }

    fn write_barrier(&self) {
        (**self).write_barrier()
    }

    fn zero(&self, addr: u64, len: u64) {
        (**self).zero(addr, len)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// BYTE STRINGS IN PHYSICAL MEMORY
// ═══════════════════════════════════════════════════════════════════════════

/// Store `bytes` at `addr`, NUL padded to `field_len` bytes.
///
/// `addr` and `field_len` must be multiples of 8. Bytes beyond `field_len`
/// are dropped.
pub fn write_bytes<M: PhysMem + ?Sized>(mem: &M, addr: u64, field_len: usize, bytes: &[u8]) {
    let mut word_off = 0;
    while word_off < field_len {
        let mut chunk = [0u8; 8];
        for (i, slot) in chunk.iter_mut().enumerate() {
            if let Some(&b) = bytes.get(word_off + i) {
                *slot = b;
            }
        }
        mem.write_u64(addr + word_off as u64, u64::from_ne_bytes(chunk));
        word_off += 8;
    }
}

/// Load `out.len()` bytes stored by [`write_bytes`] at `addr`.
///
/// `addr` and `out.len()` must be multiples of 8.
pub fn read_bytes<M: PhysMem + ?Sized>(mem: &M, addr: u64, out: &mut [u8]) {
    for (i, chunk) in out.chunks_mut(8).enumerate() {
        let word = mem.read_u64(addr + (i as u64) * 8).to_ne_bytes();
        chunk.copy_from_slice(&word[..chunk.len()]);
    }
}
