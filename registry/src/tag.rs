//! Resource tags.
//!
//! A tag is 128 opaque bits. By convention it carries up to 16 ASCII bytes
//! packed big-endian, first eight in `lo`, last eight in `hi`, so the table
//! stays readable in a memory dump. The table itself only compares bits.

use core::fmt;

/// Bytes a tag can carry.
pub const TAG_LEN: usize = 16;

/// 128-bit resource identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    pub lo: u64,
    pub hi: u64,
}

impl Tag {
    pub const fn new(lo: u64, hi: u64) -> Self {
        Self { lo, hi }
    }

    /// Pack an ASCII name of at most [`TAG_LEN`] bytes, NUL padded.
    ///
    /// Returns `None` for longer or non-ASCII names.
    pub const fn from_ascii(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.len() > TAG_LEN {
            return None;
        }

        let mut packed = [0u8; TAG_LEN];
        let mut i = 0;
        while i < bytes.len() {
            if !bytes[i].is_ascii() {
                return None;
            }
            packed[i] = bytes[i];
            i += 1;
        }

        let mut lo = 0u64;
        let mut hi = 0u64;
        let mut i = 0;
        while i < 8 {
            lo = (lo << 8) | packed[i] as u64;
            hi = (hi << 8) | packed[i + 8] as u64;
            i += 1;
        }
        Some(Self { lo, hi })
    }

    /// Unpack the bytes, trailing NULs trimmed.
    pub fn to_ascii(&self) -> TagName {
        let mut bytes = [0u8; TAG_LEN];
        bytes[..8].copy_from_slice(&self.lo.to_be_bytes());
        bytes[8..].copy_from_slice(&self.hi.to_be_bytes());
        let len = bytes.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
        TagName { bytes, len }
    }
}

/// Decoded bytes of a [`Tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagName {
    bytes: [u8; TAG_LEN],
    len: usize,
}

impl TagName {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// The name as text, if every byte is ASCII.
    pub fn as_str(&self) -> Option<&str> {
        let bytes = self.as_bytes();
        if bytes.is_ascii() {
            core::str::from_utf8(bytes).ok()
        } else {
            None
        }
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.as_bytes() {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_ascii(), f)
    }
}
