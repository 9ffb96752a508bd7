//! Error types for global resource operations

use core::fmt;

use gres_bootmem::BootmemError;
use gres_range::RangeError;

/// Result type for global resource operations
pub type Result<T> = core::result::Result<T, RegistryError>;

/// Errors that can occur during global resource operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// No entry carries the tag
    NotFound,

    /// Every table slot is in use
    CapacityExceeded,

    /// Boot memory could not supply the resource
    AllocationFailed,

    /// The published table is smaller than this image expects
    LayoutMismatch,

    /// Boot memory allocator failure
    Bootmem(BootmemError),

    /// Range tracker failure
    Range(RangeError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "Global resource not found"),
            Self::CapacityExceeded => write!(f, "Global resource table full"),
            Self::AllocationFailed => write!(f, "Failed to allocate global resource"),
            Self::LayoutMismatch => write!(f, "Global resource table layout mismatch"),
            Self::Bootmem(e) => write!(f, "Boot memory: {}", e),
            Self::Range(e) => write!(f, "Range: {}", e),
        }
    }
}

impl From<BootmemError> for RegistryError {
    fn from(e: BootmemError) -> Self {
        Self::Bootmem(e)
    }
}

impl From<RangeError> for RegistryError {
    fn from(e: RangeError) -> Self {
        Self::Range(e)
    }
}
