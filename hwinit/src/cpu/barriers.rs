//! Memory barriers.
//!
//! Portable stand-in for the MIPS `SYNCW` instruction.

use core::sync::atomic::{fence, Ordering};

/// Store barrier (SYNCW): earlier stores become visible before later ones.
#[inline]
pub fn write_barrier() {
    fence(Ordering::Release);
}
