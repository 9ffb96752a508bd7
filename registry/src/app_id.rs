//! Application ids.
//!
//! A counter in its own named block hands every image (and every kernel
//! they boot) a distinct id. The first id is 1, so 0 never names anyone.

use core::sync::atomic::Ordering;

use gres_hwinit::PhysMem;
use log::debug;

use crate::{RegistryContext, Result};

impl<'a, M: PhysMem + ?Sized> RegistryContext<'a, M> {
    /// Take the next id from the shared counter and cache it.
    pub fn allocate_app_id(&self) -> Result<u64> {
        let zero = |addr: u64| self.mem().write_u64(addr, 0);
        let counter = self.bootmem().alloc_named_range_once(
            8,
            0,
            0,
            8,
            self.config().app_id_block_name,
            Some(&zero),
        )?;

        let id = self.mem().fetch_add_u64(counter, 1) + 1;
        self.app_id.store(id, Ordering::Release);
        debug!("[GRES] app id {}", id);
        Ok(id)
    }

    /// This context's id, allocated on first use.
    pub fn get_app_id(&self) -> Result<u64> {
        let cached = self.app_id.load(Ordering::Acquire);
        if cached != 0 {
            return Ok(cached);
        }

        self.app_id_once
            .try_call_once(|| self.allocate_app_id().map(|_| ()))?;
        Ok(self.app_id.load(Ordering::Acquire))
    }
}
