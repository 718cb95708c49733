//! Flat sample byte storage and typed value conversion.
//!
//! All samples of all pixels live in one contiguous byte buffer,
//! allocated lazily once total capacity is known. The store itself is
//! untyped; [`read_f32`]/[`write_f32`] and the uint variants convert a
//! single channel datum between its storage type and the caller's
//! requested type. Conversion is a plain numeric cast (integer to float
//! is exact within float's range, float to uint truncates): deep
//! integer channels hold things like object IDs and sample flags, not
//! normalized color.

use deep_core::BaseType;
use half::f16;

/// The shared flat byte buffer holding every pixel's samples.
#[derive(Debug, Clone, Default)]
pub struct SampleStore {
    data: Vec<u8>,
    allocated: bool,
}

impl SampleStore {
    /// Whether the buffer has been allocated.
    #[inline]
    pub fn allocated(&self) -> bool {
        self.allocated
    }

    /// One-time allocation of `nbytes`, zero-filled.
    pub(crate) fn allocate(&mut self, nbytes: usize) {
        debug_assert!(!self.allocated);
        self.data = vec![0u8; nbytes];
        self.allocated = true;
    }

    /// Total buffer length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The whole buffer.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The whole buffer, mutable.
    #[inline]
    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Inserts `nbytes` zeroed bytes at `offset`, shifting the tail
    /// forward. Used when a pixel's capacity grows after allocation.
    pub(crate) fn insert_gap(&mut self, offset: usize, nbytes: usize) {
        let old_len = self.data.len();
        self.data.resize(old_len + nbytes, 0);
        if offset < old_len {
            self.data.copy_within(offset..old_len, offset + nbytes);
            self.data[offset..offset + nbytes].fill(0);
        }
    }
}

/// Reads the datum of type `ty` at `offset` as f32.
pub(crate) fn read_f32(data: &[u8], offset: usize, ty: BaseType) -> f32 {
    match ty {
        BaseType::Float => {
            f32::from_ne_bytes(data[offset..offset + 4].try_into().unwrap_or([0; 4]))
        }
        BaseType::Half => {
            f16::from_ne_bytes(data[offset..offset + 2].try_into().unwrap_or([0; 2])).to_f32()
        }
        BaseType::Double => {
            f64::from_ne_bytes(data[offset..offset + 8].try_into().unwrap_or([0; 8])) as f32
        }
        BaseType::UInt8 => data[offset] as f32,
        BaseType::Int8 => (data[offset] as i8) as f32,
        BaseType::UInt16 => {
            u16::from_ne_bytes(data[offset..offset + 2].try_into().unwrap_or([0; 2])) as f32
        }
        BaseType::Int16 => {
            i16::from_ne_bytes(data[offset..offset + 2].try_into().unwrap_or([0; 2])) as f32
        }
        BaseType::UInt32 => {
            u32::from_ne_bytes(data[offset..offset + 4].try_into().unwrap_or([0; 4])) as f32
        }
        BaseType::Int32 => {
            i32::from_ne_bytes(data[offset..offset + 4].try_into().unwrap_or([0; 4])) as f32
        }
        BaseType::UInt64 => {
            u64::from_ne_bytes(data[offset..offset + 8].try_into().unwrap_or([0; 8])) as f32
        }
        BaseType::Int64 => {
            i64::from_ne_bytes(data[offset..offset + 8].try_into().unwrap_or([0; 8])) as f32
        }
    }
}

/// Writes `value` as the datum of type `ty` at `offset`.
pub(crate) fn write_f32(data: &mut [u8], offset: usize, ty: BaseType, value: f32) {
    match ty {
        BaseType::Float => data[offset..offset + 4].copy_from_slice(&value.to_ne_bytes()),
        BaseType::Half => {
            data[offset..offset + 2].copy_from_slice(&f16::from_f32(value).to_ne_bytes())
        }
        BaseType::Double => {
            data[offset..offset + 8].copy_from_slice(&(value as f64).to_ne_bytes())
        }
        BaseType::UInt8 => data[offset] = value as u8,
        BaseType::Int8 => data[offset] = (value as i8) as u8,
        BaseType::UInt16 => {
            data[offset..offset + 2].copy_from_slice(&(value as u16).to_ne_bytes())
        }
        BaseType::Int16 => {
            data[offset..offset + 2].copy_from_slice(&(value as i16).to_ne_bytes())
        }
        BaseType::UInt32 => {
            data[offset..offset + 4].copy_from_slice(&(value as u32).to_ne_bytes())
        }
        BaseType::Int32 => {
            data[offset..offset + 4].copy_from_slice(&(value as i32).to_ne_bytes())
        }
        BaseType::UInt64 => {
            data[offset..offset + 8].copy_from_slice(&(value as u64).to_ne_bytes())
        }
        BaseType::Int64 => {
            data[offset..offset + 8].copy_from_slice(&(value as i64).to_ne_bytes())
        }
    }
}

/// Reads the datum of type `ty` at `offset` as u32.
pub(crate) fn read_u32(data: &[u8], offset: usize, ty: BaseType) -> u32 {
    match ty {
        BaseType::UInt32 => {
            u32::from_ne_bytes(data[offset..offset + 4].try_into().unwrap_or([0; 4]))
        }
        BaseType::UInt8 => data[offset] as u32,
        BaseType::Int8 => (data[offset] as i8) as u32,
        BaseType::UInt16 => {
            u16::from_ne_bytes(data[offset..offset + 2].try_into().unwrap_or([0; 2])) as u32
        }
        BaseType::Int16 => {
            i16::from_ne_bytes(data[offset..offset + 2].try_into().unwrap_or([0; 2])) as u32
        }
        BaseType::Int32 => {
            i32::from_ne_bytes(data[offset..offset + 4].try_into().unwrap_or([0; 4])) as u32
        }
        BaseType::UInt64 => {
            u64::from_ne_bytes(data[offset..offset + 8].try_into().unwrap_or([0; 8])) as u32
        }
        BaseType::Int64 => {
            i64::from_ne_bytes(data[offset..offset + 8].try_into().unwrap_or([0; 8])) as u32
        }
        BaseType::Float => {
            f32::from_ne_bytes(data[offset..offset + 4].try_into().unwrap_or([0; 4])) as u32
        }
        BaseType::Half => {
            f16::from_ne_bytes(data[offset..offset + 2].try_into().unwrap_or([0; 2])).to_f32()
                as u32
        }
        BaseType::Double => {
            f64::from_ne_bytes(data[offset..offset + 8].try_into().unwrap_or([0; 8])) as u32
        }
    }
}

/// Writes `value` as the datum of type `ty` at `offset`.
pub(crate) fn write_u32(data: &mut [u8], offset: usize, ty: BaseType, value: u32) {
    match ty {
        BaseType::UInt32 => {
            data[offset..offset + 4].copy_from_slice(&value.to_ne_bytes())
        }
        BaseType::UInt8 => data[offset] = value as u8,
        BaseType::Int8 => data[offset] = (value as i8) as u8,
        BaseType::UInt16 => {
            data[offset..offset + 2].copy_from_slice(&(value as u16).to_ne_bytes())
        }
        BaseType::Int16 => {
            data[offset..offset + 2].copy_from_slice(&(value as i16).to_ne_bytes())
        }
        BaseType::Int32 => {
            data[offset..offset + 4].copy_from_slice(&(value as i32).to_ne_bytes())
        }
        BaseType::UInt64 => {
            data[offset..offset + 8].copy_from_slice(&(value as u64).to_ne_bytes())
        }
        BaseType::Int64 => {
            data[offset..offset + 8].copy_from_slice(&(value as i64).to_ne_bytes())
        }
        BaseType::Float => {
            data[offset..offset + 4].copy_from_slice(&(value as f32).to_ne_bytes())
        }
        BaseType::Half => {
            data[offset..offset + 2]
                .copy_from_slice(&f16::from_f32(value as f32).to_ne_bytes())
        }
        BaseType::Double => {
            data[offset..offset + 8].copy_from_slice(&(value as f64).to_ne_bytes())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_lifecycle() {
        let mut store = SampleStore::default();
        assert!(!store.allocated());
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);

        // Allocation is zero-filled.
        store.allocate(16);
        assert!(store.allocated());
        assert!(!store.is_empty());
        assert_eq!(store.len(), 16);
        assert!(store.data().iter().all(|&b| b == 0));

        // A zero-byte buffer (no channels or no capacity) still counts
        // as allocated.
        let mut empty = SampleStore::default();
        empty.allocate(0);
        assert!(empty.allocated());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_insert_gap_shifts_tail() {
        let mut store = SampleStore::default();
        store.allocate(8);
        store.data_mut().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        store.insert_gap(4, 4);
        assert_eq!(store.data(), &[1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8]);
    }

    #[test]
    fn test_insert_gap_at_end() {
        let mut store = SampleStore::default();
        store.allocate(4);
        store.data_mut().copy_from_slice(&[1, 2, 3, 4]);
        store.insert_gap(4, 2);
        assert_eq!(store.data(), &[1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn test_float_roundtrip_all_types() {
        let mut buf = [0u8; 8];
        for ty in [
            BaseType::Float,
            BaseType::Half,
            BaseType::Double,
            BaseType::UInt8,
            BaseType::UInt16,
            BaseType::UInt32,
            BaseType::Int16,
            BaseType::Int32,
        ] {
            write_f32(&mut buf, 0, ty, 42.0);
            assert_eq!(read_f32(&buf, 0, ty), 42.0, "{:?}", ty);
        }
    }

    #[test]
    fn test_uint_conversion() {
        let mut buf = [0u8; 8];
        write_u32(&mut buf, 0, BaseType::UInt32, 0xDEADBEEF);
        assert_eq!(read_u32(&buf, 0, BaseType::UInt32), 0xDEADBEEF);

        // Through the float path, large u32 values lose precision;
        // through the uint path they must not.
        write_f32(&mut buf, 0, BaseType::Float, 3.9);
        assert_eq!(read_u32(&buf, 0, BaseType::Float), 3); // truncating
    }
}
