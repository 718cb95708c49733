//! Whole-image deep operations.
//!
//! Convenience operations that apply the per-pixel algorithms of
//! [`DeepData`] across an entire image.
//!
//! # Operations
//!
//! - [`deep_merge`] - Merge two deep images together
//! - [`deep_holdout`] - Cut a deep image against a holdout deep image
//! - [`deep_holdout_at`] - Cut a deep image at a fixed depth
//! - [`deep_tidy`] - Sort, merge overlaps, and cull occluded samples
//! - [`deep_stats`] - Sample-count and depth-range statistics
//!
//! # Example
//!
//! ```
//! use deep_data::{DeepData, ops};
//! use deep_core::TypeDesc;
//!
//! let names = ["R", "G", "B", "A", "Z"];
//! let a = DeepData::new(16, &[TypeDesc::FLOAT; 5], &names);
//! let b = DeepData::new(16, &[TypeDesc::FLOAT; 5], &names);
//! let merged = ops::deep_merge(&a, &b).unwrap();
//! let stats = ops::deep_stats(&merged);
//! assert_eq!(stats.total_samples, 0);
//! ```

use deep_core::{Error, Result};
use rayon::prelude::*;

use crate::deepdata::DeepData;

/// Merges two deep images into a new one.
///
/// The result takes its channel layout from `a` and covers the larger
/// pixel count of the two inputs; each pixel is the correctly
/// composited union of both inputs' samples (see
/// [`DeepData::merge_deep_pixels`]).
///
/// # Errors
///
/// Returns [`Error::ChannelMismatch`] when the inputs disagree on
/// channel count.
pub fn deep_merge(a: &DeepData, b: &DeepData) -> Result<DeepData> {
    if a.channels() != b.channels() {
        return Err(Error::channel_mismatch(a.channels(), b.channels()));
    }
    let npixels = a.pixels().max(b.pixels());
    let channelnames: Vec<&str> = (0..a.channels()).map(|c| a.channelname(c)).collect();
    let mut dst = DeepData::new(npixels, a.all_channeltypes(), &channelnames);

    for pixel in 0..npixels {
        dst.copy_deep_pixel(pixel, a, pixel);
    }
    for pixel in 0..npixels {
        dst.merge_deep_pixels(pixel, b, pixel);
    }
    Ok(dst)
}

/// Cuts `deep` against a holdout: for every pixel, samples at or beyond
/// the depth where `holdout` becomes fully opaque are removed. Used to
/// carve room for another element in a deep composite.
pub fn deep_holdout(deep: &mut DeepData, holdout: &DeepData) {
    let Some(zchan) = deep.z_channel() else {
        return;
    };
    let npixels = deep.pixels().min(holdout.pixels());
    for pixel in 0..npixels {
        let opaque = holdout.opaque_z(pixel);
        if opaque >= f32::MAX {
            continue;
        }
        erase_from_depth(deep, pixel, zchan, opaque);
    }
}

/// Cuts every pixel of `deep` at a fixed depth: samples with
/// `Z >= depth` are removed.
pub fn deep_holdout_at(deep: &mut DeepData, depth: f32) {
    let Some(zchan) = deep.z_channel() else {
        return;
    };
    for pixel in 0..deep.pixels() {
        erase_from_depth(deep, pixel, zchan, depth);
    }
}

fn erase_from_depth(deep: &mut DeepData, pixel: usize, zchan: usize, depth: f32) {
    // Back to front so surviving indices stay stable.
    for s in (0..deep.samples(pixel) as usize).rev() {
        if deep.deep_value(pixel, zchan, s) >= depth {
            deep.erase_samples(pixel, s, 1);
        }
    }
}

/// Tidies every pixel: sort by depth, collapse coincident samples, and
/// drop everything hidden behind the first opaque sample. A cleanup pass
/// for after heavy deep manipulation.
pub fn deep_tidy(deep: &mut DeepData) {
    for pixel in 0..deep.pixels() {
        deep.sort(pixel);
        deep.merge_overlaps(pixel);
        deep.occlusion_cull(pixel);
    }
}

/// Statistics about a deep image.
#[derive(Debug, Clone)]
pub struct DeepStats {
    /// Total number of samples across all pixels.
    pub total_samples: u64,
    /// Maximum samples in any single pixel.
    pub max_samples_per_pixel: u32,
    /// Average samples per pixel.
    pub avg_samples_per_pixel: f64,
    /// Number of pixels with zero samples.
    pub empty_pixels: u64,
    /// Number of pixels with more than one sample.
    pub multi_sample_pixels: u64,
    /// Minimum Z depth over all samples.
    pub min_z: f32,
    /// Maximum Z depth over all samples.
    pub max_z: f32,
}

impl Default for DeepStats {
    fn default() -> Self {
        Self {
            total_samples: 0,
            max_samples_per_pixel: 0,
            avg_samples_per_pixel: 0.0,
            empty_pixels: 0,
            multi_sample_pixels: 0,
            min_z: f32::INFINITY,
            max_z: f32::NEG_INFINITY,
        }
    }
}

impl DeepStats {
    fn combine(mut self, other: DeepStats) -> DeepStats {
        self.total_samples += other.total_samples;
        self.max_samples_per_pixel = self.max_samples_per_pixel.max(other.max_samples_per_pixel);
        self.empty_pixels += other.empty_pixels;
        self.multi_sample_pixels += other.multi_sample_pixels;
        self.min_z = self.min_z.min(other.min_z);
        self.max_z = self.max_z.max(other.max_z);
        self
    }
}

/// Computes statistics about a deep image. Read-only, so the per-pixel
/// scan parallelizes over pixels.
pub fn deep_stats(deep: &DeepData) -> DeepStats {
    let npixels = deep.pixels();
    let zchan = deep.z_channel();

    let mut stats = (0..npixels)
        .into_par_iter()
        .fold(DeepStats::default, |mut acc, pixel| {
            let nsamples = deep.samples(pixel);
            acc.total_samples += nsamples as u64;
            acc.max_samples_per_pixel = acc.max_samples_per_pixel.max(nsamples);
            if nsamples == 0 {
                acc.empty_pixels += 1;
            } else if nsamples > 1 {
                acc.multi_sample_pixels += 1;
            }
            if let Some(zchan) = zchan {
                for s in 0..nsamples as usize {
                    let z = deep.deep_value(pixel, zchan, s);
                    acc.min_z = acc.min_z.min(z);
                    acc.max_z = acc.max_z.max(z);
                }
            }
            acc
        })
        .reduce(DeepStats::default, DeepStats::combine);

    if npixels > 0 {
        stats.avg_samples_per_pixel = stats.total_samples as f64 / npixels as f64;
    }
    if stats.min_z == f32::INFINITY {
        stats.min_z = 0.0;
    }
    if stats.max_z == f32::NEG_INFINITY {
        stats.max_z = 0.0;
    }
    stats
}
