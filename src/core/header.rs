//! Headers for objects and properties.

use super::MetaData;
use crate::util::DataType;

/// Header information for an object in the hierarchy.
#[derive(Clone, Debug, Default)]
pub struct ObjectHeader {
    /// Name of this object (not full path).
    pub name: String,
    /// Full path from root (e.g., "/parent/child").
    pub full_name: String,
    /// Metadata describing the object.
    pub meta_data: MetaData,
}

impl ObjectHeader {
    /// Create a new object header.
    pub fn new(name: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            meta_data: MetaData::new(),
        }
    }

    /// Create with metadata.
    pub fn with_meta_data(
        name: impl Into<String>,
        full_name: impl Into<String>,
        meta_data: MetaData,
    ) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            meta_data,
        }
    }
}

/// Header information for a property.
///
/// On the read side the sample bookkeeping (count, first/last changed) is
/// decoded straight from the property-headers block, so constancy never
/// requires rescanning samples.
#[derive(Clone, Debug)]
pub struct PropertyHeader {
    /// Name of this property.
    pub name: String,
    /// Property type.
    pub property_type: PropertyType,
    /// Data type (POD + extent). Unknown for compounds.
    pub data_type: DataType,
    /// Time sampling index into the archive table (0 = identity).
    pub time_sampling_index: u32,
    /// Metadata.
    pub meta_data: MetaData,
    /// Number of samples written.
    pub num_samples: u32,
    /// Index of the first sample that differs from sample 0.
    /// 0 means no sample ever changed.
    pub first_changed_index: u32,
    /// Index of the last sample that differs from its successor run.
    pub last_changed_index: u32,
    /// Array property whose every sample has rank <= 1 and a fixed
    /// element count, so it can also be read scalar-style.
    pub is_scalar_like: bool,
}

impl PropertyHeader {
    /// Create a scalar property header.
    pub fn scalar(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            property_type: PropertyType::Scalar,
            data_type,
            time_sampling_index: 0,
            meta_data: MetaData::new(),
            num_samples: 0,
            first_changed_index: 0,
            last_changed_index: 0,
            is_scalar_like: false,
        }
    }

    /// Create an array property header.
    pub fn array(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            property_type: PropertyType::Array,
            ..Self::scalar(name, data_type)
        }
    }

    /// Create a compound property header.
    pub fn compound(name: impl Into<String>) -> Self {
        Self {
            property_type: PropertyType::Compound,
            ..Self::scalar(name, DataType::UNKNOWN)
        }
    }

    /// Set time sampling index.
    pub fn with_time_sampling(mut self, index: u32) -> Self {
        self.time_sampling_index = index;
        self
    }

    /// Set metadata.
    pub fn with_meta_data(mut self, meta_data: MetaData) -> Self {
        self.meta_data = meta_data;
        self
    }

    /// Check if this is a scalar property.
    pub fn is_scalar(&self) -> bool {
        self.property_type == PropertyType::Scalar
    }

    /// Check if this is an array property.
    pub fn is_array(&self) -> bool {
        self.property_type == PropertyType::Array
    }

    /// Check if this is a compound property.
    pub fn is_compound(&self) -> bool {
        self.property_type == PropertyType::Compound
    }

    /// True when every written sample has identical content.
    pub fn is_constant(&self) -> bool {
        self.first_changed_index == 0 && self.last_changed_index == 0
    }

    /// Get the interpretation from metadata (e.g., "point", "vector").
    pub fn interpretation(&self) -> Option<&str> {
        self.meta_data.interpretation()
    }
}

/// Type of property.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// Single fixed-size value per sample.
    #[default]
    Scalar,
    /// Variable-size array of values per sample.
    Array,
    /// Container for other properties.
    Compound,
}
