//! Registry configuration.
//!
//! Every image sharing the table must be built with the same values, since
//! they decide the persisted layout and the names other images look up.

use gres_hwinit::CACHE_LINE_SIZE;

use crate::layout::table_size;

/// Table geometry and the boot memory names it is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Entry slots in the table
    pub capacity: u64,
    /// Named block holding the table
    pub table_block_name: &'static str,
    /// Named block holding the application id counter
    pub app_id_block_name: &'static str,
    /// Alignment of the table and of every resource allocated for an entry
    pub alloc_align: u64,
}

impl RegistryConfig {
    /// Layout used by Octeon firmware and the kernels it boots.
    pub const OCTEON: Self = Self {
        capacity: 128,
        table_block_name: "cvmx-global-resources",
        app_id_block_name: "cvmx_app_id",
        alloc_align: CACHE_LINE_SIZE,
    };

    /// Bytes the table occupies.
    pub const fn table_size(&self) -> u64 {
        table_size(self.capacity)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::OCTEON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_octeon_layout() {
        let config = RegistryConfig::default();
        assert_eq!(config, RegistryConfig::OCTEON);
        assert_eq!(config.table_size(), 4112);
        assert_eq!(config.alloc_align, 128);
    }
}
