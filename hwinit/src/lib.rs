//! Hardware Access Layer
//!
//! The lowest layer of the shared-memory resource stack. Nothing here knows
//! about resources or allocators; it only knows how to touch physical memory
//! that several independent firmware images share.
//!
//! # Architecture
//!
//! ```text
//!   gres-registry  ─┐
//!   gres-range     ─┼──►  PhysMem (read/write/CAS/fetch_add)  ──►  DRAM
//!   gres-bootmem   ─┘        SharedSpinLock (lock word in DRAM)
//! ```
//!
//! # What This Crate Does
//!
//! - Word accessor trait over physical addresses (uncached window)
//! - Store barrier (SYNCW equivalent)
//! - Spinlocks whose state lives in shared memory
//! - Host-backed physical memory (`host` feature) for tools and tests
//!
//! # What This Crate Does NOT Do
//!
//! - Allocation of any kind
//! - Cache maintenance (all shared state goes through the uncached window)

#![no_std]

pub mod cpu;
pub mod phys;
pub mod sync;

#[cfg(any(test, feature = "host"))]
pub mod host;

// ═══════════════════════════════════════════════════════════════════════════
// RE-EXPORTS
// ═══════════════════════════════════════════════════════════════════════════

pub use cpu::barriers;
pub use phys::{
    align_down, align_up, physical, read_bytes, uncached, write_bytes, PhysMem, CACHE_LINE_SIZE,
    UNCACHED_WINDOW,
};
pub use sync::{SharedSpinGuard, SharedSpinLock};

#[cfg(any(test, feature = "host"))]
pub use host::HostMemory;
