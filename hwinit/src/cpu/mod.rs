//! CPU Management
//!
//! # Modules
//!
//! - `barriers` - Memory barriers

pub mod barriers;
