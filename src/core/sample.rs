//! Sample types: selectors, array samples, and content keys.
//!
//! A sample is a single time slice of a property's data. Content keys
//! identify a sample by what it contains rather than where it lives, which
//! is what makes write-side deduplication possible.

use crate::util::{Chrono, DataType, Dimensions};
use std::io::Read;
use std::sync::Arc;

/// Sample selector for reading property samples.
#[derive(Clone, Copy, Debug)]
pub enum SampleSelector {
    /// Select by exact index.
    Index(usize),
    /// Select by time - floor (largest index with time <= t).
    TimeFloor(Chrono),
    /// Select by time - ceil (smallest index with time >= t).
    TimeCeil(Chrono),
    /// Select by time - nearest, ties toward the earlier index.
    TimeNear(Chrono),
}

impl SampleSelector {
    /// Selector for index 0 (first/static sample).
    pub const fn first() -> Self {
        Self::Index(0)
    }

    pub const fn index(i: usize) -> Self {
        Self::Index(i)
    }

    pub const fn time_floor(t: Chrono) -> Self {
        Self::TimeFloor(t)
    }

    pub const fn time_ceil(t: Chrono) -> Self {
        Self::TimeCeil(t)
    }

    pub const fn time_near(t: Chrono) -> Self {
        Self::TimeNear(t)
    }
}

impl Default for SampleSelector {
    fn default() -> Self {
        Self::Index(0)
    }
}

impl From<usize> for SampleSelector {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<Chrono> for SampleSelector {
    fn from(time: Chrono) -> Self {
        Self::TimeNear(time)
    }
}

/// 128-bit content digest.
pub type SampleDigest = [u8; 16];

/// Content-based identity of one sample.
///
/// The digest is murmur3-x64-128 (seed 0) over the POD tag, the extent,
/// the dimension sizes as little-endian u64s, and the payload bytes.
/// Non-cryptographic: a digest collision silently dedups distinct
/// payloads, which is an accepted trade for hashing speed.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Debug)]
pub struct SampleKey {
    /// 128-bit digest of the typed content.
    pub digest: SampleDigest,
    /// Payload size in bytes.
    pub num_bytes: u64,
}

impl SampleKey {
    /// Compute the key for a typed payload.
    pub fn compute(data_type: DataType, dimensions: &Dimensions, payload: &[u8]) -> Self {
        let mut prefix = Vec::with_capacity(2 + dimensions.rank() * 8);
        prefix.push(data_type.pod as u8);
        prefix.push(data_type.extent);
        for d in dimensions.sizes() {
            prefix.extend_from_slice(&d.to_le_bytes());
        }

        let mut source = prefix.as_slice().chain(payload);
        // Reading from in-memory slices cannot fail.
        let digest = murmur3::murmur3_x64_128(&mut source, 0).unwrap_or(0);

        Self {
            digest: digest.to_le_bytes(),
            num_bytes: payload.len() as u64,
        }
    }

    /// Reconstruct from a stored digest and payload size.
    pub fn from_digest(digest: SampleDigest, num_bytes: u64) -> Self {
        Self { digest, num_bytes }
    }

    /// True when the digest is all zeros (no key recorded).
    pub fn is_empty(&self) -> bool {
        self.digest == [0u8; 16]
    }
}

/// One array sample: payload plus its shape and element type.
///
/// The payload is behind an `Arc` so cache hits and `set_from_previous`
/// share bytes instead of copying them.
#[derive(Clone, Debug)]
pub struct ArraySample {
    /// Raw little-endian payload.
    pub data: Arc<Vec<u8>>,
    /// Shape of the sample.
    pub dimensions: Dimensions,
    /// Element type.
    pub data_type: DataType,
}

impl ArraySample {
    /// Create a sample from owned bytes.
    pub fn new(data: Vec<u8>, dimensions: Dimensions, data_type: DataType) -> Self {
        Self {
            data: Arc::new(data),
            dimensions,
            data_type,
        }
    }

    /// Number of elements (product of dimensions).
    pub fn num_elements(&self) -> u64 {
        self.dimensions.flat_count()
    }

    /// Payload size in bytes.
    pub fn num_bytes(&self) -> usize {
        self.data.len()
    }

    /// Compute this sample's content key.
    pub fn key(&self) -> SampleKey {
        SampleKey::compute(self.data_type, &self.dimensions, &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_selector() {
        let sel = SampleSelector::index(5);
        assert!(matches!(sel, SampleSelector::Index(5)));

        let sel: SampleSelector = 3.into();
        assert!(matches!(sel, SampleSelector::Index(3)));

        let sel: SampleSelector = 1.5.into();
        assert!(matches!(sel, SampleSelector::TimeNear(t) if (t - 1.5).abs() < 1e-10));
    }

    #[test]
    fn test_sample_key_identical_content() {
        let a = SampleKey::compute(DataType::FLOAT32, &Dimensions::d1(2), &[0, 0, 128, 63, 0, 0, 0, 64]);
        let b = SampleKey::compute(DataType::FLOAT32, &Dimensions::d1(2), &[0, 0, 128, 63, 0, 0, 0, 64]);
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_sample_key_type_matters() {
        let payload = [1u8, 2, 3, 4];
        let as_f32 = SampleKey::compute(DataType::FLOAT32, &Dimensions::d1(1), &payload);
        let as_i32 = SampleKey::compute(DataType::INT32, &Dimensions::d1(1), &payload);
        assert_ne!(as_f32, as_i32);
    }

    #[test]
    fn test_sample_key_dimensions_matter() {
        let payload = [0u8; 8];
        let flat = SampleKey::compute(DataType::UINT8, &Dimensions::d1(8), &payload);
        let grid = SampleKey::compute(DataType::UINT8, &Dimensions::d2(2, 4), &payload);
        assert_ne!(flat, grid);
    }

    #[test]
    fn test_array_sample() {
        let s = ArraySample::new(vec![0u8; 24], Dimensions::d1(2), DataType::VEC3F);
        assert_eq!(s.num_elements(), 2);
        assert_eq!(s.num_bytes(), 24);
        assert_eq!(s.key(), s.key());
    }
}
