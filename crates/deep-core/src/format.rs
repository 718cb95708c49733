//! Channel storage types.
//!
//! Deep images store each channel in one of a fixed set of scalar storage
//! types. [`BaseType`] enumerates them; [`TypeDesc`] is the thin wrapper
//! that the rest of the engine passes around (one descriptor per channel).
//!
//! # Usage
//!
//! ```rust
//! use deep_core::{BaseType, TypeDesc};
//!
//! let z = TypeDesc::FLOAT;
//! assert_eq!(z.size(), 4);
//! assert!(z.basetype.is_float());
//!
//! let id = TypeDesc::UINT32; // e.g. an object-ID channel
//! assert!(!id.basetype.is_float());
//! ```

/// Scalar storage type of one channel datum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BaseType {
    /// 8-bit unsigned integer.
    UInt8,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit unsigned integer.
    UInt16,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit unsigned integer.
    UInt32,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit unsigned integer.
    UInt64,
    /// 64-bit signed integer.
    Int64,
    /// 16-bit half-precision IEEE 754 float.
    Half,
    /// 32-bit single-precision IEEE 754 float.
    #[default]
    Float,
    /// 64-bit double-precision IEEE 754 float.
    Double,
}

impl BaseType {
    /// Size in bytes of one datum of this type.
    #[inline]
    pub const fn size(&self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::UInt16 | Self::Int16 | Self::Half => 2,
            Self::UInt32 | Self::Int32 | Self::Float => 4,
            Self::UInt64 | Self::Int64 | Self::Double => 8,
        }
    }

    /// Whether this is a floating-point type.
    #[inline]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Half | Self::Float | Self::Double)
    }

    /// Whether this is an unsigned integer type.
    #[inline]
    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    /// Short name for display.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::UInt8 => "uint8",
            Self::Int8 => "int8",
            Self::UInt16 => "uint16",
            Self::Int16 => "int16",
            Self::UInt32 => "uint32",
            Self::Int32 => "int32",
            Self::UInt64 => "uint64",
            Self::Int64 => "int64",
            Self::Half => "half",
            Self::Float => "float",
            Self::Double => "double",
        }
    }
}

impl std::fmt::Display for BaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-channel type descriptor.
///
/// Deep channels are always scalar, so this is a thin wrapper over
/// [`BaseType`]; it exists so channel type lists read the same way they
/// do in image headers (`TypeDesc::FLOAT`, `TypeDesc::HALF`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeDesc {
    /// Scalar storage type.
    pub basetype: BaseType,
}

impl TypeDesc {
    /// 32-bit float.
    pub const FLOAT: TypeDesc = TypeDesc { basetype: BaseType::Float };
    /// 16-bit half float.
    pub const HALF: TypeDesc = TypeDesc { basetype: BaseType::Half };
    /// 64-bit double float.
    pub const DOUBLE: TypeDesc = TypeDesc { basetype: BaseType::Double };
    /// 32-bit unsigned integer.
    pub const UINT32: TypeDesc = TypeDesc { basetype: BaseType::UInt32 };
    /// 32-bit signed integer.
    pub const INT32: TypeDesc = TypeDesc { basetype: BaseType::Int32 };
    /// 16-bit unsigned integer.
    pub const UINT16: TypeDesc = TypeDesc { basetype: BaseType::UInt16 };
    /// 8-bit unsigned integer.
    pub const UINT8: TypeDesc = TypeDesc { basetype: BaseType::UInt8 };

    /// Creates a descriptor from a base type.
    #[inline]
    pub const fn new(basetype: BaseType) -> Self {
        Self { basetype }
    }

    /// Size in bytes of one datum.
    #[inline]
    pub const fn size(&self) -> usize {
        self.basetype.size()
    }
}

impl From<BaseType> for TypeDesc {
    fn from(basetype: BaseType) -> Self {
        Self { basetype }
    }
}

impl std::fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.basetype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(TypeDesc::UINT8.size(), 1);
        assert_eq!(TypeDesc::HALF.size(), 2);
        assert_eq!(TypeDesc::FLOAT.size(), 4);
        assert_eq!(TypeDesc::UINT32.size(), 4);
        assert_eq!(TypeDesc::DOUBLE.size(), 8);
        assert_eq!(BaseType::Int64.size(), 8);
    }

    #[test]
    fn test_classification() {
        assert!(BaseType::Half.is_float());
        assert!(BaseType::Double.is_float());
        assert!(!BaseType::UInt32.is_float());
        assert!(BaseType::UInt64.is_unsigned());
        assert!(!BaseType::Int16.is_unsigned());
    }

    #[test]
    fn test_default_is_float() {
        assert_eq!(TypeDesc::default(), TypeDesc::FLOAT);
    }
}
