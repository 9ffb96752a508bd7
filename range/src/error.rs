//! Error types for range tracker operations

use core::fmt;

/// Result type for range tracker operations
pub type Result<T> = core::result::Result<T, RangeError>;

/// Errors that can occur during range tracker operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    /// Element count is zero or larger than the tracker
    InvalidCount,

    /// Alignment is zero
    InvalidAlignment,

    /// Owner collides with the free-element marker
    InvalidOwner,

    /// Index lies outside the tracker
    OutOfRange,

    /// No free block satisfies the request
    Exhausted,

    /// An element in the requested block is already owned
    AlreadyAllocated,
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCount => write!(f, "Invalid element count"),
            Self::InvalidAlignment => write!(f, "Invalid alignment"),
            Self::InvalidOwner => write!(f, "Owner value is reserved"),
            Self::OutOfRange => write!(f, "Index out of range"),
            Self::Exhausted => write!(f, "No free elements"),
            Self::AlreadyAllocated => write!(f, "Element already allocated"),
        }
    }
}
