//! Deep image descriptor.
//!
//! [`DeepSpec`] is the header-level description a format reader hands to
//! the deep-pixel engine: image dimensions plus the channel list. It is
//! deliberately minimal (just what is needed to size and type a
//! `DeepData` container) and carries no pixel data itself.
//!
//! # Usage
//!
//! ```rust
//! use deep_core::{DeepSpec, TypeDesc};
//!
//! let spec = DeepSpec::new(1920, 1080, &["R", "G", "B", "A", "Z"]);
//! assert_eq!(spec.image_pixels(), 1920 * 1080);
//! assert_eq!(spec.nchannels, 5);
//! // All channels default to float unless per-channel formats are given.
//! assert!(spec.channelformats.is_empty());
//! assert_eq!(spec.format, TypeDesc::FLOAT);
//! ```

use crate::error::{Error, Result};
use crate::format::TypeDesc;

/// Header-level description of a deep image: dimensions and channel list.
#[derive(Debug, Clone, PartialEq)]
pub struct DeepSpec {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Image depth for volumetric data; 0 or 1 for ordinary 2D images.
    pub depth: u32,
    /// Number of channels per sample.
    pub nchannels: usize,
    /// Default channel type, used when `channelformats` is empty.
    pub format: TypeDesc,
    /// Per-channel types. Empty means "every channel is `format`".
    pub channelformats: Vec<TypeDesc>,
    /// Channel names, in channel order.
    pub channel_names: Vec<String>,
}

impl DeepSpec {
    /// Creates a spec with the given dimensions and channel names, all
    /// channels typed as 32-bit float.
    pub fn new(width: u32, height: u32, channel_names: &[&str]) -> Self {
        Self {
            width,
            height,
            depth: 1,
            nchannels: channel_names.len(),
            format: TypeDesc::FLOAT,
            channelformats: Vec::new(),
            channel_names: channel_names.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Creates a spec with explicit per-channel types.
    pub fn with_formats(
        width: u32,
        height: u32,
        channelformats: &[TypeDesc],
        channel_names: &[&str],
    ) -> Self {
        Self {
            width,
            height,
            depth: 1,
            nchannels: channel_names.len(),
            format: channelformats.first().copied().unwrap_or(TypeDesc::FLOAT),
            channelformats: channelformats.to_vec(),
            channel_names: channel_names.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Total number of pixels described by this spec.
    #[inline]
    pub fn image_pixels(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth.max(1) as u64
    }

    /// The resolved per-channel type list: `channelformats` if supplied
    /// (and matching `nchannels`), otherwise `format` replicated.
    pub fn resolved_channelformats(&self) -> Vec<TypeDesc> {
        if self.channelformats.len() == self.nchannels {
            self.channelformats.clone()
        } else {
            vec![self.format; self.nchannels]
        }
    }

    /// Checks internal consistency: channel names must match `nchannels`,
    /// and per-channel formats, when present, must too.
    pub fn validate(&self) -> Result<()> {
        if self.channel_names.len() != self.nchannels {
            return Err(Error::InvalidSpec {
                reason: format!(
                    "{} channel names for {} channels",
                    self.channel_names.len(),
                    self.nchannels
                ),
            });
        }
        if !self.channelformats.is_empty() && self.channelformats.len() != self.nchannels {
            return Err(Error::InvalidSpec {
                reason: format!(
                    "{} channel formats for {} channels",
                    self.channelformats.len(),
                    self.nchannels
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_pixels() {
        let spec = DeepSpec::new(640, 480, &["R", "G", "B", "A", "Z"]);
        assert_eq!(spec.image_pixels(), 640 * 480);

        let mut vol = spec.clone();
        vol.depth = 4;
        assert_eq!(vol.image_pixels(), 640 * 480 * 4);

        // depth 0 is treated as 1
        let mut flat = spec;
        flat.depth = 0;
        assert_eq!(flat.image_pixels(), 640 * 480);
    }

    #[test]
    fn test_resolved_channelformats() {
        let spec = DeepSpec::new(4, 4, &["A", "Z"]);
        assert_eq!(spec.resolved_channelformats(), vec![TypeDesc::FLOAT; 2]);

        let spec = DeepSpec::with_formats(
            4,
            4,
            &[TypeDesc::HALF, TypeDesc::FLOAT],
            &["A", "Z"],
        );
        assert_eq!(
            spec.resolved_channelformats(),
            vec![TypeDesc::HALF, TypeDesc::FLOAT]
        );
    }

    #[test]
    fn test_validate() {
        let mut spec = DeepSpec::new(4, 4, &["A", "Z"]);
        assert!(spec.validate().is_ok());

        spec.nchannels = 3;
        assert!(spec.validate().is_err());
    }
}
