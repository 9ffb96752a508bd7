//! Shared fixtures: one host-backed DRAM window with a formatted bootmem
//! descriptor. Each context handed out plays one firmware image.

#![allow(dead_code)]

use gres_bootmem::BootMem;
use gres_hwinit::HostMemory;
use gres_registry::{RegistryConfig, RegistryContext, Tag};

pub const DESC_ADDR: u64 = 0x0000_1000;
pub const POOL_BASE: u64 = 0x0010_0000;
pub const POOL_SIZE: u64 = 0x0040_0000;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// DRAM as the first-stage loader leaves it: bootmem formatted, no table.
pub fn dram() -> HostMemory {
    init_logging();
    let mem = HostMemory::new(DESC_ADDR, POOL_BASE + POOL_SIZE - DESC_ADDR);
    BootMem::format(&mem, DESC_ADDR, POOL_BASE, POOL_SIZE).expect("format bootmem");
    mem
}

/// A new image attaching to `mem`.
pub fn image(mem: &HostMemory) -> RegistryContext<'_, HostMemory> {
    image_with(mem, RegistryConfig::default())
}

pub fn image_with(mem: &HostMemory, config: RegistryConfig) -> RegistryContext<'_, HostMemory> {
    let bootmem = BootMem::attach(mem, DESC_ADDR).expect("attach bootmem");
    RegistryContext::new(bootmem, config)
}

pub fn tag(name: &str) -> Tag {
    Tag::from_ascii(name).expect("ascii tag")
}
