//! DataType - combines POD type with extent (dimensionality).

use super::PodType;
use std::fmt;

/// DataType describes how one element of a sample is stored.
///
/// It combines a [`PodType`] with an extent (dimensionality).
/// For example, a 3-float vector would be Float32 with extent 3.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataType {
    /// The base plain old data type
    pub pod: PodType,
    /// Number of POD elements (1 for scalar, 3 for a 3-vector, etc.)
    pub extent: u8,
}

impl DataType {
    /// Create a new DataType with given POD and extent.
    #[inline]
    pub const fn new(pod: PodType, extent: u8) -> Self {
        Self { pod, extent }
    }

    /// Create a scalar DataType (extent = 1).
    #[inline]
    pub const fn scalar(pod: PodType) -> Self {
        Self { pod, extent: 1 }
    }

    /// Returns the total size in bytes for one element.
    #[inline]
    pub const fn num_bytes(&self) -> usize {
        self.pod.num_bytes() * self.extent as usize
    }

    /// Returns true if this is a valid (known) type.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        !matches!(self.pod, PodType::Unknown) && self.extent > 0
    }

    /// Unknown/invalid DataType.
    pub const UNKNOWN: Self = Self::new(PodType::Unknown, 0);

    // === Common predefined types ===

    pub const BOOL: Self = Self::scalar(PodType::Boolean);
    pub const UINT8: Self = Self::scalar(PodType::Uint8);
    pub const INT8: Self = Self::scalar(PodType::Int8);
    pub const UINT16: Self = Self::scalar(PodType::Uint16);
    pub const INT16: Self = Self::scalar(PodType::Int16);
    pub const UINT32: Self = Self::scalar(PodType::Uint32);
    pub const INT32: Self = Self::scalar(PodType::Int32);
    pub const UINT64: Self = Self::scalar(PodType::Uint64);
    pub const INT64: Self = Self::scalar(PodType::Int64);
    pub const FLOAT16: Self = Self::scalar(PodType::Float16);
    pub const FLOAT32: Self = Self::scalar(PodType::Float32);
    pub const FLOAT64: Self = Self::scalar(PodType::Float64);
    pub const STRING: Self = Self::scalar(PodType::String);

    // Vectors
    pub const VEC2F: Self = Self::new(PodType::Float32, 2);
    pub const VEC3F: Self = Self::new(PodType::Float32, 3);
    pub const VEC4F: Self = Self::new(PodType::Float32, 4);
    pub const VEC2D: Self = Self::new(PodType::Float64, 2);
    pub const VEC3D: Self = Self::new(PodType::Float64, 3);
    pub const VEC4D: Self = Self::new(PodType::Float64, 4);
    pub const VEC2I: Self = Self::new(PodType::Int32, 2);
    pub const VEC3I: Self = Self::new(PodType::Int32, 3);

    // Matrices, stored as extent = rows * cols
    pub const MAT33F: Self = Self::new(PodType::Float32, 9);
    pub const MAT44F: Self = Self::new(PodType::Float32, 16);
    pub const MAT33D: Self = Self::new(PodType::Float64, 9);
    pub const MAT44D: Self = Self::new(PodType::Float64, 16);

    // Bounding box (min + max = 2 * vec3)
    pub const BOX3F: Self = Self::new(PodType::Float32, 6);
    pub const BOX3D: Self = Self::new(PodType::Float64, 6);
}

impl Default for DataType {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extent == 1 {
            write!(f, "{}", self.pod.name())
        } else {
            write!(f, "{}[{}]", self.pod.name(), self.extent)
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl PartialOrd for DataType {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DataType {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.pod.cmp(&other.pod) {
            std::cmp::Ordering::Equal => self.extent.cmp(&other.extent),
            ord => ord,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_sizes() {
        assert_eq!(DataType::BOOL.num_bytes(), 1);
        assert_eq!(DataType::INT32.num_bytes(), 4);
        assert_eq!(DataType::FLOAT32.num_bytes(), 4);
        assert_eq!(DataType::VEC3F.num_bytes(), 12);
        assert_eq!(DataType::MAT44F.num_bytes(), 64);
        assert_eq!(DataType::BOX3D.num_bytes(), 48);
    }

    #[test]
    fn test_data_type_display() {
        assert_eq!(format!("{}", DataType::FLOAT32), "float32_t");
        assert_eq!(format!("{}", DataType::VEC3F), "float32_t[3]");
        assert_eq!(format!("{}", DataType::MAT44F), "float32_t[16]");
    }

    #[test]
    fn test_data_type_validity() {
        assert!(DataType::FLOAT32.is_valid());
        assert!(DataType::VEC3F.is_valid());
        assert!(!DataType::UNKNOWN.is_valid());
        assert!(!DataType::new(PodType::Float32, 0).is_valid());
    }
}
