//! # deep-core
//!
//! Core types for deep-pixel image data.
//!
//! This crate provides the foundational types used by the deep-rs engine:
//!
//! - [`BaseType`], [`TypeDesc`] - Channel storage types
//! - [`DeepSpec`] - Header-level description of a deep image
//! - [`Error`], [`Result`] - Error handling for descriptor and image-level
//!   operations
//!
//! ## Crate Structure
//!
//! `deep-core` has no internal dependencies; the container and algorithm
//! crate (`deep-data`) builds on it:
//!
//! ```text
//! deep-core (this crate)
//!    ^
//!    |
//!    +-- deep-data (DeepData container, compositing algorithms)
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod format;
pub mod spec;

// Re-exports for convenience
pub use error::*;
pub use format::*;
pub use spec::*;

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```
/// use deep_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::format::{BaseType, TypeDesc};
    pub use crate::spec::DeepSpec;
}
