//! Error types for boot memory operations

use core::fmt;

/// Result type for boot memory operations
pub type Result<T> = core::result::Result<T, BootmemError>;

/// Errors that can occur during boot memory operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootmemError {
    /// Descriptor version does not support named blocks
    BadVersion,

    /// Descriptor was formatted with a different named block layout
    LayoutMismatch,

    /// Size, alignment or address constraints are inconsistent
    InvalidParameter,

    /// No free block satisfies the request
    OutOfMemory,

    /// Free list is not in ascending order or holds an undersized block
    CorruptFreeList,

    /// Freed range overlaps a block that is already free
    OverlappingFree,

    /// Named block not found
    NotFound,

    /// A named block with this name already exists
    AlreadyExists,

    /// Every named block descriptor is in use
    NoFreeDescriptor,

    /// Name does not fit in a named block descriptor
    NameTooLong,
}

impl fmt::Display for BootmemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadVersion => write!(f, "Unsupported bootmem descriptor version"),
            Self::LayoutMismatch => write!(f, "Bootmem named block layout mismatch"),
            Self::InvalidParameter => write!(f, "Invalid allocation parameters"),
            Self::OutOfMemory => write!(f, "No free block large enough"),
            Self::CorruptFreeList => write!(f, "Bootmem free list is corrupt"),
            Self::OverlappingFree => write!(f, "Freed range overlaps free memory"),
            Self::NotFound => write!(f, "Named block not found"),
            Self::AlreadyExists => write!(f, "Named block already exists"),
            Self::NoFreeDescriptor => write!(f, "No free named block descriptor"),
            Self::NameTooLong => write!(f, "Named block name too long"),
        }
    }
}
