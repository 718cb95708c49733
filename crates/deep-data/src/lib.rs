//! # deep-data
//!
//! Deep-pixel sample storage and depth-compositing algorithms.
//!
//! Deep images store a variable number of depth samples per pixel, each
//! a fixed-size record of channel values (color, alpha, Z / Zback depth
//! interval, IDs). This crate provides the container ([`DeepData`],
//! backed by a single lazily allocated flat buffer with per-pixel
//! capacity bookkeeping) and the algorithms deep compositing is built
//! from: depth splitting, sorting, overlap merging, pixel merging,
//! occlusion culling, and opaque-depth queries.
//!
//! # Modules
//!
//! - [`layout`] - Sample record layout and semantic channel roles
//! - [`table`] - Per-pixel sample counts, capacities, and cumulative offsets
//! - [`store`] - Flat byte storage and typed value conversion
//! - [`deepdata`] - The [`DeepData`] container and its algorithms
//! - [`ops`] - Whole-image operations (merge, holdout, tidy, stats)
//!
//! # Quick start
//!
//! ```
//! use deep_data::DeepData;
//! use deep_core::TypeDesc;
//!
//! let mut dd = DeepData::new(1, &[TypeDesc::FLOAT; 4], &["Z", "Zback", "A", "C"]);
//! dd.set_samples(0, 2);
//! for (s, (z, zback, a)) in [(2.0, 3.0, 0.5), (1.0, 2.0, 0.25)].iter().enumerate() {
//!     dd.set_deep_value(0, 0, s, *z);
//!     dd.set_deep_value(0, 1, s, *zback);
//!     dd.set_deep_value(0, 2, s, *a);
//! }
//! dd.sort(0);
//! assert_eq!(dd.deep_value(0, 0, 0), 1.0);
//! ```

#![warn(missing_docs)]

pub mod deepdata;
pub mod layout;
pub mod ops;
pub mod store;
pub mod table;

pub use deepdata::{DeepData, PixelChunksMut};
pub use layout::{ChannelLayout, ChannelRole};
pub use ops::{deep_holdout, deep_holdout_at, deep_merge, deep_stats, deep_tidy, DeepStats};
pub use store::SampleStore;
pub use table::PixelTable;

/// Convenient re-exports for typical use.
pub mod prelude {
    pub use crate::deepdata::DeepData;
    pub use crate::layout::ChannelRole;
    pub use crate::ops::{deep_holdout, deep_holdout_at, deep_merge, deep_stats, deep_tidy, DeepStats};
    pub use deep_core::{BaseType, DeepSpec, TypeDesc};
}
