//! Error types for deep-pixel operations.
//!
//! The deep-data container itself is deliberately permissive: invalid
//! pixel/channel/sample indices yield a zero value, `None`, or `false`
//! rather than an error, so partial or corrupt deep data degrades
//! gracefully inside a render instead of aborting it. This enum covers
//! the places where a hard answer is wanted: descriptor validation and
//! whole-image operations that combine two deep images.

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from deep-pixel descriptor validation and image-level operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Channel count mismatch between two deep images.
    ///
    /// Returned when combining deep images whose sample records have
    /// different channel counts.
    #[error("channel mismatch: expected {expected}, got {got}")]
    ChannelMismatch {
        /// Expected channel count
        expected: usize,
        /// Actual channel count
        got: usize,
    },

    /// A [`DeepSpec`](crate::DeepSpec) is internally inconsistent.
    #[error("invalid deep spec: {reason}")]
    InvalidSpec {
        /// What is inconsistent
        reason: String,
    },

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates an [`Error::ChannelMismatch`] error.
    #[inline]
    pub fn channel_mismatch(expected: usize, got: usize) -> Self {
        Self::ChannelMismatch { expected, got }
    }

    /// Creates an [`Error::Other`] error.
    #[inline]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_mismatch_message() {
        let err = Error::channel_mismatch(5, 4);
        let msg = err.to_string();
        assert!(msg.contains('5'));
        assert!(msg.contains('4'));
    }
}
