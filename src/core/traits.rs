//! Reader traits - the seam between the container backend and the API.
//!
//! Lookup conventions: by-name lookups return `Ok(None)` when the name does
//! not exist; an `Err` always means corrupt data or failed I/O. Out-of-range
//! indices are contract violations and fail loudly with
//! `ChildOutOfBounds` / `SampleOutOfBounds`.

use crate::core::{
    ArraySample, MetaData, ObjectHeader, PropertyHeader, SampleDigest, SampleSelector,
    TimeSampling,
};
use crate::util::{Chrono, Dimensions, Error, Result};
use std::sync::Arc;

/// Reader interface for an archive.
pub trait ArchiveReader: Send + Sync {
    /// Archive name (normally the file path).
    fn name(&self) -> &str;

    /// Container format version this archive was written with.
    fn version(&self) -> u16;

    /// Library version stamp from the archive root.
    fn library_version(&self) -> i32;

    /// Number of time samplings in the archive table.
    fn num_time_samplings(&self) -> usize;

    /// Get a time sampling by index.
    fn time_sampling(&self, index: usize) -> Option<Arc<TimeSampling>>;

    /// Largest sample count of any property using the given time sampling.
    fn max_samples_for_time_sampling(&self, index: usize) -> Option<usize>;

    /// Archive-level metadata (application, write date, description).
    fn archive_metadata(&self) -> &MetaData;

    /// Materialize the root object.
    fn root(&self) -> Result<Arc<dyn ObjectReader>>;
}

/// Reader interface for an object in the hierarchy.
pub trait ObjectReader: Send + Sync {
    /// Get the object header.
    fn header(&self) -> &ObjectHeader;

    /// Number of child objects.
    fn num_children(&self) -> usize;

    /// Header of the child at the given index, if in range.
    fn child_header(&self, index: usize) -> Option<&ObjectHeader>;

    /// Materialize a child by index. Out-of-range is a contract violation.
    fn child(&self, index: usize) -> Result<Arc<dyn ObjectReader>>;

    /// Materialize a child by name. `Ok(None)` when no such child.
    fn child_by_name(&self, name: &str) -> Result<Option<Arc<dyn ObjectReader>>>;

    /// Materialize the object's properties compound.
    fn properties(&self) -> Result<Arc<dyn CompoundPropertyReader>>;

    /// Aggregated hash over this object's property data, as stored.
    fn properties_hash(&self) -> Option<SampleDigest>;

    /// Aggregated hash over this object's child subtree, as stored.
    fn children_hash(&self) -> Option<SampleDigest>;

    /// Object name (convenience).
    fn name(&self) -> &str {
        &self.header().name
    }

    /// Full path (convenience).
    fn full_name(&self) -> &str {
        &self.header().full_name
    }

    /// Metadata (convenience).
    fn meta_data(&self) -> &MetaData {
        &self.header().meta_data
    }
}

/// Base reader interface for any property.
pub trait PropertyReader: Send + Sync {
    /// Get the property header.
    fn header(&self) -> &PropertyHeader;

    fn is_scalar(&self) -> bool {
        self.header().is_scalar()
    }

    fn is_array(&self) -> bool {
        self.header().is_array()
    }

    fn is_compound(&self) -> bool {
        self.header().is_compound()
    }

    fn name(&self) -> &str {
        &self.header().name
    }

    /// Try to cast to scalar property reader.
    fn as_scalar(&self) -> Option<&dyn ScalarPropertyReader> {
        None
    }

    /// Try to cast to array property reader.
    fn as_array(&self) -> Option<&dyn ArrayPropertyReader> {
        None
    }

    /// Try to cast to compound property reader.
    fn as_compound(&self) -> Option<&dyn CompoundPropertyReader> {
        None
    }
}

/// Shared selector logic for sampled properties.
pub trait SampledPropertyReader: PropertyReader {
    /// Number of samples written for this property.
    fn num_samples(&self) -> usize;

    /// Time sampling shared from the archive table.
    fn time_sampling(&self) -> &TimeSampling;

    /// All samples identical, as recorded at write time.
    fn is_constant(&self) -> bool {
        self.header().is_constant()
    }

    /// Time of the sample at the given index.
    fn sample_time(&self, index: usize) -> Chrono {
        self.time_sampling().time_at(index)
    }

    /// Resolve a selector to a concrete sample index.
    fn resolve(&self, selector: SampleSelector) -> Result<usize> {
        let count = self.num_samples();
        let index = match selector {
            SampleSelector::Index(i) => i,
            SampleSelector::TimeFloor(t) => self.time_sampling().floor_index(t, count).0,
            SampleSelector::TimeCeil(t) => self.time_sampling().ceil_index(t, count).0,
            SampleSelector::TimeNear(t) => self.time_sampling().nearest_index(t, count).0,
        };
        if index >= count {
            return Err(Error::SampleOutOfBounds { index, count });
        }
        Ok(index)
    }
}

/// Reader for scalar properties (single fixed-size value per sample).
pub trait ScalarPropertyReader: SampledPropertyReader {
    /// Read a sample into the provided buffer. The buffer length must
    /// equal the stored payload size, `header().data_type.num_bytes()`
    /// for fixed-size types.
    fn read_sample_into(&self, selector: SampleSelector, out: &mut [u8]) -> Result<()>;

    /// Read a sample as owned bytes.
    fn read_sample(&self, selector: SampleSelector) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.header().data_type.num_bytes()];
        self.read_sample_into(selector, &mut buf)?;
        Ok(buf)
    }

    /// Read a sample as a typed value.
    fn read_typed<T: bytemuck::Pod + Default>(&self, selector: SampleSelector) -> Result<T>
    where
        Self: Sized,
    {
        let mut value = T::default();
        self.read_sample_into(selector, bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }
}

/// Reader for array properties (variable-size payload per sample).
pub trait ArrayPropertyReader: SampledPropertyReader {
    /// Content key stored with a sample, without reading the payload.
    fn sample_key(&self, index: usize) -> Result<SampleDigest>;

    /// Dimensions of a sample.
    fn sample_dimensions(&self, index: usize) -> Result<Dimensions>;

    /// Read a full sample (payload shared with the read cache).
    fn read_sample(&self, selector: SampleSelector) -> Result<ArraySample>;

    /// Read a sample as a typed Vec.
    fn read_typed<T: bytemuck::Pod>(&self, selector: SampleSelector) -> Result<Vec<T>>
    where
        Self: Sized,
    {
        let sample = self.read_sample(selector)?;
        let slice: &[T] = bytemuck::try_cast_slice(&sample.data)
            .map_err(|_| Error::invalid("payload does not cast to requested element type"))?;
        Ok(slice.to_vec())
    }

    /// Read a sample as a string array (null-separated UTF-8).
    fn read_strings(&self, selector: SampleSelector) -> Result<Vec<String>> {
        let sample = self.read_sample(selector)?;
        let mut strings = Vec::new();
        for chunk in sample.data.split(|&b| b == 0) {
            if !chunk.is_empty() {
                strings.push(String::from_utf8(chunk.to_vec())?);
            }
        }
        Ok(strings)
    }
}

/// Reader for compound properties (containers of sub-properties).
pub trait CompoundPropertyReader: PropertyReader {
    /// Number of sub-properties.
    fn num_properties(&self) -> usize;

    /// Header of the sub-property at the given index, if in range.
    fn property_header(&self, index: usize) -> Option<&PropertyHeader>;

    /// Materialize a sub-property by index. Out-of-range is a contract
    /// violation.
    fn property(&self, index: usize) -> Result<Box<dyn PropertyReader + '_>>;

    /// Materialize a sub-property by name. `Ok(None)` when no such property.
    fn property_by_name(&self, name: &str) -> Result<Option<Box<dyn PropertyReader + '_>>>;

    /// Check if a sub-property exists.
    fn has_property(&self, name: &str) -> bool {
        (0..self.num_properties())
            .any(|i| self.property_header(i).is_some_and(|h| h.name == name))
    }

    /// Sub-property names in stored order.
    fn property_names(&self) -> Vec<String> {
        (0..self.num_properties())
            .filter_map(|i| self.property_header(i).map(|h| h.name.clone()))
            .collect()
    }
}
