//! Host-backed physical memory.
//!
//! A window of "physical" memory kept in a heap allocation of atomic words.
//! Every image (thread) handed a reference sees the same bytes, which is all
//! the shared structures need. Used by hosted tools and by the test suites.

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::phys::{physical, PhysMem};

/// Physical memory window `[base, base + size)` backed by host memory.
pub struct HostMemory {
    base: u64,
    words: Box<[AtomicU64]>,
}

impl HostMemory {
    /// Create a zero-filled window.
    ///
    /// `base` must be 8-byte aligned and non-zero (address 0 is never a
    /// valid allocation); `size` is rounded up to whole words.
    pub fn new(base: u64, size: u64) -> Self {
        assert!(base != 0 && base % 8 == 0, "window base {:#x} must be non-zero and 8-byte aligned", base);
        let count = ((size + 7) / 8) as usize;
        let words: Vec<AtomicU64> = (0..count).map(|_| AtomicU64::new(0)).collect();
        log::debug!("[HOST] physical window {:#x}..{:#x}", base, base + (count as u64) * 8);
        Self {
            base,
            words: words.into_boxed_slice(),
        }
    }

    /// First address of the window.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Size of the window in bytes.
    pub fn size(&self) -> u64 {
        (self.words.len() as u64) * 8
    }

    /// Is `addr` (windowed or bare) inside this memory?
    pub fn contains(&self, addr: u64) -> bool {
        let addr = physical(addr);
        addr >= self.base && addr < self.base + self.size()
    }

    /// The word holding `addr`. Out-of-window access is a bus error.
    fn word(&self, addr: u64) -> &AtomicU64 {
        let addr = physical(addr);
        match addr.checked_sub(self.base).map(|off| (off / 8) as usize) {
            Some(index) if index < self.words.len() => &self.words[index],
            _ => panic!("bus error: physical access at {:#x} outside {:#x}+{:#x}", addr, self.base, self.size()),
        }
    }

    /// Bit position of the 32-bit half at `addr` inside its word.
    fn half_shift(addr: u64) -> u32 {
        let upper = physical(addr) & 4 != 0;
        if cfg!(target_endian = "little") == upper {
            32
        } else {
            0
        }
    }
}

impl PhysMem for HostMemory {
    fn read_u32(&self, addr: u64) -> u32 {
        debug_assert_eq!(addr % 4, 0, "misaligned u32 read at {:#x}", addr);
        (self.word(addr).load(Ordering::SeqCst) >> Self::half_shift(addr)) as u32
    }

    fn read_u64(&self, addr: u64) -> u64 {
        debug_assert_eq!(addr % 8, 0, "misaligned u64 read at {:#x}", addr);
        self.word(addr).load(Ordering::SeqCst)
    }

    fn write_u32(&self, addr: u64, val: u32) {
        debug_assert_eq!(addr % 4, 0, "misaligned u32 write at {:#x}", addr);
        let shift = Self::half_shift(addr);
        let mask = 0xFFFF_FFFFu64 << shift;
        let _ = self.word(addr).fetch_update(Ordering::SeqCst, Ordering::SeqCst, |old| {
            Some((old & !mask) | ((val as u64) << shift))
        });
    }

    fn write_u64(&self, addr: u64, val: u64) {
        debug_assert_eq!(addr % 8, 0, "misaligned u64 write at {:#x}", addr);
        self.word(addr).store(val, Ordering::SeqCst);
    }

    fn compare_exchange_u32(&self, addr: u64, current: u32, new: u32) -> Result<u32, u32> {
        debug_assert_eq!(addr % 4, 0, "misaligned u32 cas at {:#x}", addr);
        let shift = Self::half_shift(addr);
        let mask = 0xFFFF_FFFFu64 << shift;
        let word = self.word(addr);
        let mut old = word.load(Ordering::Acquire);
        loop {
            let seen = (old >> shift) as u32;
            if seen != current {
                return Err(seen);
            }
            let next = (old & !mask) | ((new as u64) << shift);
            match word.compare_exchange_weak(old, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(seen),
                // Either half changed under us; re-check ours.
                Err(actual) => old = actual,
            }
        }
    }

    fn fetch_add_u64(&self, addr: u64, delta: u64) -> u64 {
        debug_assert_eq!(addr % 8, 0, "misaligned u64 add at {:#x}", addr);
        self.word(addr).fetch_add(delta, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phys::{read_bytes, uncached, write_bytes};

    const BASE: u64 = 0x0010_0000;

    fn window(size: u64) -> HostMemory {
        let _ = env_logger::builder().is_test(true).try_init();
        HostMemory::new(BASE, size)
    }

    #[test]
    fn test_halves_are_independent() {
        let mem = window(64);
        mem.write_u32(BASE, 0x1111_1111);
        mem.write_u32(BASE + 4, 0x2222_2222);
        assert_eq!(mem.read_u32(BASE), 0x1111_1111);
        assert_eq!(mem.read_u32(BASE + 4), 0x2222_2222);

        mem.write_u32(BASE + 4, 0);
        assert_eq!(mem.read_u32(BASE), 0x1111_1111);
        assert_eq!(mem.read_u32(BASE + 4), 0);
    }

    #[test]
    fn test_u32_matches_native_layout() {
        let mem = window(64);
        mem.write_u64(BASE, u64::from_ne_bytes([1, 0, 0, 0, 2, 0, 0, 0]));
        assert_eq!(mem.read_u32(BASE), u32::from_ne_bytes([1, 0, 0, 0]));
        assert_eq!(mem.read_u32(BASE + 4), u32::from_ne_bytes([2, 0, 0, 0]));
    }

    #[test]
    fn test_uncached_alias() {
        let mem = window(64);
        mem.write_u64(uncached(BASE + 8), 0xdead_beef);
        assert_eq!(mem.read_u64(BASE + 8), 0xdead_beef);
        assert!(mem.contains(uncached(BASE + 56)));
        assert!(!mem.contains(BASE + 64));
    }

    #[test]
    fn test_compare_exchange() {
        let mem = window(64);
        mem.write_u32(BASE, 0xAAAA_AAAA);
        assert_eq!(mem.compare_exchange_u32(BASE + 4, 0, 1), Ok(0));
        assert_eq!(mem.compare_exchange_u32(BASE + 4, 0, 1), Err(1));
        assert_eq!(mem.read_u32(BASE), 0xAAAA_AAAA);
    }

    #[test]
    fn test_fetch_add() {
        let mem = window(64);
        assert_eq!(mem.fetch_add_u64(BASE + 16, 1), 0);
        assert_eq!(mem.fetch_add_u64(BASE + 16, 1), 1);
        assert_eq!(mem.read_u64(BASE + 16), 2);
    }

    #[test]
    fn test_byte_strings() {
        let mem = window(64);
        write_bytes(&mem, BASE, 16, b"cvmx_app_id");
        let mut out = [0u8; 16];
        read_bytes(&mem, BASE, &mut out);
        assert_eq!(&out[..11], b"cvmx_app_id");
        assert!(out[11..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zero_fill() {
        let mem = window(64);
        for i in 0..8 {
            mem.write_u64(BASE + i * 8, u64::MAX);
        }
        mem.zero(BASE + 8, 20);
        assert_eq!(mem.read_u64(BASE), u64::MAX);
        assert_eq!(mem.read_u64(BASE + 8), 0);
        assert_eq!(mem.read_u64(BASE + 24), 0);
        assert_eq!(mem.read_u64(BASE + 32), u64::MAX);
    }

    #[test]
    #[should_panic(expected = "bus error")]
    fn test_out_of_window_is_bus_error() {
        let mem = window(64);
        mem.read_u64(BASE + 64);
    }
}
