//! Global Resource Table
//!
//! A tagged directory of shared resources for firmware images that have
//! nothing in common but DRAM. Images on different cores, and the kernels
//! they boot, look resources up by a 128-bit [`Tag`] and get back the
//! physical address of memory someone allocated for it.
//!
//! # Architecture
//!
//! ```text
//!   RegistryContext ──► table (named bootmem block "cvmx-global-resources")
//!        │                 lock | count | {tag, addr, size} x capacity
//!        │                                        │
//!        │                                        ▼
//!        ├──► range resources      entry memory formatted as a RangeTracker
//!        └──► app id counter       named bootmem block "cvmx_app_id"
//! ```
//!
//! # Locking
//!
//! Two locks, both words in shared memory:
//! - the bootmem descriptor lock, held while the table is found or created
//! - the table lock, held for every lookup, insert and range operation
//!
//! Table operations take a [`Locking`] argument; pass [`Locking::NoLock`]
//! while holding the guard from [`RegistryContext::lock_table`].
//!
//! # Usage
//!
//! ```ignore
//! use gres_registry::{RegistryContext, Tag};
//!
//! let ctx = RegistryContext::with_defaults(BootMem::attach(&mem, DESC_ADDR)?);
//!
//! const QUEUES: Tag = match Tag::from_ascii("cvm_pko_queues") {
//!     Some(tag) => tag,
//!     None => panic!(),
//! };
//! ctx.create_range_resource(QUEUES, 256)?;
//! let queue = ctx.allocate_range(QUEUES, ctx.get_app_id()?, 1, 1)?;
//! ```

#![no_std]

mod app_id;
pub mod config;
pub mod error;
pub mod layout;
mod range;
pub mod table;
pub mod tag;

pub use config::RegistryConfig;
pub use error::{RegistryError, Result};
pub use table::{Created, Locking, RegistryContext, ResourceEntry};
pub use tag::{Tag, TagName, TAG_LEN};

pub use gres_range::AVAILABLE;
