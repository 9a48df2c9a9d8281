//! Multi-dimensional array shape support.

use smallvec::SmallVec;

/// Dimensions of a multi-dimensional array sample.
///
/// Rank 0 means scalar, rank 1 a flat array, rank 2 and up grids and
/// volumes. Sizes are stored as u64 to match the on-disk encoding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Dimensions {
    /// Size of each dimension. Empty means scalar (rank 0).
    dims: SmallVec<[u64; 4]>,
}

impl Dimensions {
    /// Create scalar dimensions (rank 0).
    pub fn scalar() -> Self {
        Self { dims: SmallVec::new() }
    }

    /// Create 1D dimensions.
    pub fn d1(size: u64) -> Self {
        Self { dims: smallvec::smallvec![size] }
    }

    /// Create 2D dimensions.
    pub fn d2(width: u64, height: u64) -> Self {
        Self { dims: smallvec::smallvec![width, height] }
    }

    /// Create 3D dimensions.
    pub fn d3(width: u64, height: u64, depth: u64) -> Self {
        Self { dims: smallvec::smallvec![width, height, depth] }
    }

    /// Create from a slice of sizes.
    pub fn from_slice(sizes: &[u64]) -> Self {
        Self { dims: SmallVec::from_slice(sizes) }
    }

    /// Get the rank (number of dimensions).
    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Get the size of a specific dimension, or None if out of range.
    pub fn size(&self, dim: usize) -> Option<u64> {
        self.dims.get(dim).copied()
    }

    /// Get all dimension sizes as a slice.
    pub fn sizes(&self) -> &[u64] {
        &self.dims
    }

    /// Total number of elements (product of all dimensions, 1 for rank 0).
    pub fn flat_count(&self) -> u64 {
        if self.dims.is_empty() {
            1
        } else {
            self.dims.iter().product()
        }
    }

    /// Check if this represents a scalar (rank 0).
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Add a new dimension at the end.
    pub fn push(&mut self, size: u64) {
        self.dims.push(size);
    }
}

impl From<u64> for Dimensions {
    fn from(size: u64) -> Self {
        Self::d1(size)
    }
}

impl From<(u64, u64)> for Dimensions {
    fn from((w, h): (u64, u64)) -> Self {
        Self::d2(w, h)
    }
}

impl From<(u64, u64, u64)> for Dimensions {
    fn from((w, h, d): (u64, u64, u64)) -> Self {
        Self::d3(w, h, d)
    }
}

impl From<Vec<u64>> for Dimensions {
    fn from(v: Vec<u64>) -> Self {
        Self { dims: SmallVec::from_vec(v) }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.dims.is_empty() {
            write!(f, "[]")
        } else {
            write!(f, "[")?;
            for (i, s) in self.dims.iter().enumerate() {
                if i > 0 {
                    write!(f, " x ")?;
                }
                write!(f, "{}", s)?;
            }
            write!(f, "]")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar() {
        let d = Dimensions::scalar();
        assert_eq!(d.rank(), 0);
        assert!(d.is_scalar());
        assert_eq!(d.flat_count(), 1);
    }

    #[test]
    fn test_1d() {
        let d = Dimensions::d1(10);
        assert_eq!(d.rank(), 1);
        assert_eq!(d.size(0), Some(10));
        assert_eq!(d.flat_count(), 10);
    }

    #[test]
    fn test_2d() {
        let d = Dimensions::d2(640, 480);
        assert_eq!(d.rank(), 2);
        assert_eq!(d.size(0), Some(640));
        assert_eq!(d.size(1), Some(480));
        assert_eq!(d.flat_count(), 640 * 480);
        assert_eq!(format!("{}", d), "[640 x 480]");
    }

    #[test]
    fn test_from_conversions() {
        let d1: Dimensions = 100u64.into();
        assert_eq!(d1.rank(), 1);

        let d2: Dimensions = (800u64, 600u64).into();
        assert_eq!(d2.rank(), 2);

        let d3: Dimensions = (10u64, 20u64, 30u64).into();
        assert_eq!(d3.rank(), 3);
    }
}
