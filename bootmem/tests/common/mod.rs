//! Shared fixtures: one host-backed DRAM window with a formatted bootmem
//! descriptor, standing in for the memory every image on the board shares.

#![allow(dead_code)]

use gres_bootmem::BootMem;
use gres_hwinit::HostMemory;

pub const DESC_ADDR: u64 = 0x0000_1000;
pub const POOL_BASE: u64 = 0x0010_0000;
pub const POOL_SIZE: u64 = 0x0040_0000;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// DRAM covering the descriptor and the pool.
pub fn dram() -> HostMemory {
    init_logging();
    HostMemory::new(DESC_ADDR, POOL_BASE + POOL_SIZE - DESC_ADDR)
}

/// What the first-stage loader leaves behind.
pub fn formatted(mem: &HostMemory) -> BootMem<'_, HostMemory> {
    BootMem::format(mem, DESC_ADDR, POOL_BASE, POOL_SIZE).expect("format bootmem")
}
