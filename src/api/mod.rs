//! High-level archive API.
//!
//! This module provides the main entry points for reading and writing
//! scene archives:
//! - [`IArchive`] / [`OArchive`] - Archive (file) access
//! - [`IObject`] / [`OObject`] - Hierarchical scene objects
//! - [`ICompoundProperty`] / [`OProperty`] - Property access
//!
//! ## Example
//!
//! ```ignore
//! use scenevault::api::IArchive;
//!
//! let archive = IArchive::open("scene.svlt")?;
//! println!("Root has {} children", archive.root()?.num_children());
//! ```

use std::path::Path;
use std::sync::Arc;

use crate::core::{
    ArchiveReader, ArrayPropertyReader, ArraySample, CompoundPropertyReader, MetaData,
    ObjectHeader, ObjectReader, PropertyHeader, PropertyReader, SampleDigest, SampleSelector,
    ScalarPropertyReader, TimeSampling,
};
use crate::util::{Chrono, DataType, Dimensions, Error, Result};
use crate::vault::{ReadStream, VaultArchiveReader};

pub use crate::vault::{OArchive, OObject, OProperty};

// ============================================================================
// Archives
// ============================================================================

/// Input archive for reading scene files.
///
/// This is the main entry point for reading archives. The default [`open`]
/// maps the file into memory; [`open_with_streams`] reads through a pool of
/// file handles instead, and [`from_streams`] takes caller-owned streams.
///
/// [`open`]: IArchive::open
/// [`open_with_streams`]: IArchive::open_with_streams
/// [`from_streams`]: IArchive::from_streams
pub struct IArchive {
    reader: Box<dyn ArchiveReader>,
}

impl IArchive {
    /// Open an archive file for reading, memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = VaultArchiveReader::open(path)?;
        Ok(Self { reader: Box::new(reader) })
    }

    /// Open an archive for reading through `num_streams` pooled file handles.
    pub fn open_with_streams<P: AsRef<Path>>(path: P, num_streams: usize) -> Result<Self> {
        let reader = VaultArchiveReader::open_with_streams(path, num_streams)?;
        Ok(Self { reader: Box::new(reader) })
    }

    /// Open an archive backed by caller-owned streams.
    pub fn from_streams(sources: Vec<Box<dyn ReadStream>>) -> Result<Self> {
        let reader = VaultArchiveReader::from_streams(sources)?;
        Ok(Self { reader: Box::new(reader) })
    }

    /// Archive name (normally the file path).
    pub fn name(&self) -> &str {
        self.reader.name()
    }

    /// Container format version this archive was written with.
    pub fn version(&self) -> u16 {
        self.reader.version()
    }

    /// Library version stamp from the archive root.
    ///
    /// Encoded as major * 10000 + minor * 100 + patch.
    pub fn library_version(&self) -> i32 {
        self.reader.library_version()
    }

    /// Number of time samplings in the archive table.
    pub fn num_time_samplings(&self) -> usize {
        self.reader.num_time_samplings()
    }

    /// Get a time sampling by index. Index 0 is always identity.
    pub fn time_sampling(&self, index: usize) -> Option<Arc<TimeSampling>> {
        self.reader.time_sampling(index)
    }

    /// Largest sample count of any property using the given time sampling.
    pub fn max_samples_for_time_sampling(&self, index: usize) -> Option<usize> {
        self.reader.max_samples_for_time_sampling(index)
    }

    /// Raw archive-level metadata.
    pub fn archive_metadata(&self) -> &MetaData {
        self.reader.archive_metadata()
    }

    /// Application name recorded at write time, if any.
    pub fn application(&self) -> Option<&str> {
        self.reader.archive_metadata().get(MetaData::APPLICATION_KEY)
    }

    /// Date the archive was written, if recorded.
    pub fn date_written(&self) -> Option<&str> {
        self.reader.archive_metadata().get(MetaData::DATE_KEY)
    }

    /// User description recorded at write time, if any.
    pub fn description(&self) -> Option<&str> {
        self.reader.archive_metadata().get(MetaData::DESCRIPTION_KEY)
    }

    /// Materialize the root object.
    pub fn root(&self) -> Result<IObject> {
        Ok(IObject::new(self.reader.root()?))
    }

    /// Find an object by its full path, e.g. "/rig/body".
    ///
    /// Returns `Ok(None)` when no object lives at that path.
    pub fn find_object(&self, path: &str) -> Result<Option<IObject>> {
        let mut current = self.reader.root()?;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            match current.child_by_name(part)? {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }
        Ok(Some(IObject::new(current)))
    }

    /// Check if an object exists at the given path.
    pub fn has_object(&self, path: &str) -> bool {
        matches!(self.find_object(path), Ok(Some(_)))
    }
}

// ============================================================================
// Objects
// ============================================================================

/// Input object for reading the scene hierarchy.
///
/// Cheap to clone; children materialized through the same archive converge
/// on shared instances.
#[derive(Clone)]
pub struct IObject {
    reader: Arc<dyn ObjectReader>,
}

impl IObject {
    fn new(reader: Arc<dyn ObjectReader>) -> Self {
        Self { reader }
    }

    /// Get the object header.
    pub fn header(&self) -> &ObjectHeader {
        self.reader.header()
    }

    /// Object name (not the full path).
    pub fn name(&self) -> &str {
        self.reader.name()
    }

    /// Full path from root, e.g. "/rig/body".
    pub fn full_name(&self) -> &str {
        self.reader.full_name()
    }

    /// Root objects have an empty name and path "/".
    pub fn is_root(&self) -> bool {
        self.reader.name().is_empty()
    }

    /// Object metadata.
    pub fn meta_data(&self) -> &MetaData {
        self.reader.meta_data()
    }

    /// Number of child objects.
    pub fn num_children(&self) -> usize {
        self.reader.num_children()
    }

    /// Header of the child at the given index, if in range.
    pub fn child_header(&self, index: usize) -> Option<&ObjectHeader> {
        self.reader.child_header(index)
    }

    /// Materialize a child by index. Out-of-range is a contract violation.
    pub fn child(&self, index: usize) -> Result<IObject> {
        Ok(IObject::new(self.reader.child(index)?))
    }

    /// Materialize a child by name. `Ok(None)` when no such child.
    pub fn child_by_name(&self, name: &str) -> Result<Option<IObject>> {
        Ok(self.reader.child_by_name(name)?.map(IObject::new))
    }

    /// Iterate over all children, stopping at the first read error.
    pub fn children(&self) -> impl Iterator<Item = Result<IObject>> + '_ {
        (0..self.num_children()).map(move |i| self.child(i))
    }

    /// Materialize the object's properties compound.
    pub fn properties(&self) -> Result<ICompoundProperty<'static>> {
        Ok(ICompoundProperty {
            reader: CompoundRef::Shared(self.reader.properties()?),
        })
    }

    /// Aggregated hash over this object's property data, as stored.
    ///
    /// None for the synthetic root and for degenerate object groups.
    pub fn properties_hash(&self) -> Option<SampleDigest> {
        self.reader.properties_hash()
    }

    /// Aggregated hash over this object's child subtree, as stored.
    pub fn children_hash(&self) -> Option<SampleDigest> {
        self.reader.children_hash()
    }
}

// ============================================================================
// Properties
// ============================================================================

enum CompoundRef<'a> {
    Shared(Arc<dyn CompoundPropertyReader>),
    Borrowed(&'a dyn CompoundPropertyReader),
}

impl<'a> CompoundRef<'a> {
    fn as_ref(&self) -> &dyn CompoundPropertyReader {
        match self {
            Self::Shared(r) => r.as_ref(),
            Self::Borrowed(r) => *r,
        }
    }
}

/// Compound property: a named container of sub-properties.
///
/// Obtained from [`IObject::properties`] (owned) or by descending through
/// [`IProperty::as_compound`] (borrowed from the parent wrapper).
pub struct ICompoundProperty<'a> {
    reader: CompoundRef<'a>,
}

impl<'a> ICompoundProperty<'a> {
    /// Get the property header.
    pub fn header(&self) -> &PropertyHeader {
        self.reader.as_ref().header()
    }

    /// Compound name. The object-level compound is named ".props".
    pub fn name(&self) -> &str {
        self.reader.as_ref().name()
    }

    /// Number of sub-properties.
    pub fn num_properties(&self) -> usize {
        self.reader.as_ref().num_properties()
    }

    /// Header of the sub-property at the given index, if in range.
    pub fn property_header(&self, index: usize) -> Option<&PropertyHeader> {
        self.reader.as_ref().property_header(index)
    }

    /// Check if a sub-property exists.
    pub fn has_property(&self, name: &str) -> bool {
        self.reader.as_ref().has_property(name)
    }

    /// Sub-property names in stored order.
    pub fn property_names(&self) -> Vec<String> {
        self.reader.as_ref().property_names()
    }

    /// Materialize a sub-property by index. Out-of-range is a contract
    /// violation.
    pub fn property(&self, index: usize) -> Result<IProperty<'_>> {
        Ok(IProperty {
            reader: self.reader.as_ref().property(index)?,
        })
    }

    /// Materialize a sub-property by name. `Ok(None)` when no such property.
    pub fn property_by_name(&self, name: &str) -> Result<Option<IProperty<'_>>> {
        Ok(self
            .reader
            .as_ref()
            .property_by_name(name)?
            .map(|reader| IProperty { reader }))
    }

    /// Materialize a scalar sub-property by name.
    ///
    /// `Ok(None)` when absent; `Err` when present but not scalar.
    pub fn scalar_by_name(&self, name: &str) -> Result<Option<IScalarProperty<'_>>> {
        match self.property_by_name(name)? {
            None => Ok(None),
            Some(prop) if prop.is_scalar() => Ok(Some(IScalarProperty { inner: prop })),
            Some(prop) => Err(Error::TypeMismatch {
                expected: "scalar property".into(),
                actual: format!("{} is not scalar", prop.name()),
            }),
        }
    }

    /// Materialize an array sub-property by name.
    ///
    /// `Ok(None)` when absent; `Err` when present but not an array.
    pub fn array_by_name(&self, name: &str) -> Result<Option<IArrayProperty<'_>>> {
        match self.property_by_name(name)? {
            None => Ok(None),
            Some(prop) if prop.is_array() => Ok(Some(IArrayProperty { inner: prop })),
            Some(prop) => Err(Error::TypeMismatch {
                expected: "array property".into(),
                actual: format!("{} is not an array", prop.name()),
            }),
        }
    }
}

/// A sub-property of unknown kind.
///
/// Use [`as_scalar`](Self::as_scalar) / [`as_array`](Self::as_array) /
/// [`as_compound`](Self::as_compound) to narrow.
pub struct IProperty<'a> {
    reader: Box<dyn PropertyReader + 'a>,
}

impl<'a> IProperty<'a> {
    /// Get the property header.
    pub fn header(&self) -> &PropertyHeader {
        self.reader.header()
    }

    /// Property name.
    pub fn name(&self) -> &str {
        self.reader.name()
    }

    pub fn is_scalar(&self) -> bool {
        self.reader.is_scalar()
    }

    pub fn is_array(&self) -> bool {
        self.reader.is_array()
    }

    pub fn is_compound(&self) -> bool {
        self.reader.is_compound()
    }

    /// Narrow to a scalar property view.
    pub fn as_scalar(&self) -> Option<ScalarView<'_>> {
        self.reader.as_scalar().map(|reader| ScalarView { reader })
    }

    /// Narrow to an array property view.
    pub fn as_array(&self) -> Option<ArrayView<'_>> {
        self.reader.as_array().map(|reader| ArrayView { reader })
    }

    /// Narrow to a compound property view.
    pub fn as_compound(&self) -> Option<ICompoundProperty<'_>> {
        self.reader.as_compound().map(|reader| ICompoundProperty {
            reader: CompoundRef::Borrowed(reader),
        })
    }
}

/// Scalar property wrapper that owns its reader.
pub struct IScalarProperty<'a> {
    inner: IProperty<'a>,
}

impl<'a> IScalarProperty<'a> {
    fn view(&self) -> ScalarView<'_> {
        // The kind was checked at construction.
        ScalarView {
            reader: self.inner.reader.as_scalar().unwrap_or_else(|| {
                unreachable!("scalar wrapper over non-scalar reader")
            }),
        }
    }

    /// Get the property header.
    pub fn header(&self) -> &PropertyHeader {
        self.inner.header()
    }

    /// Number of samples written for this property.
    pub fn num_samples(&self) -> usize {
        self.view().num_samples()
    }

    /// All samples identical, as recorded at write time.
    pub fn is_constant(&self) -> bool {
        self.view().is_constant()
    }

    /// Time of the sample at the given index.
    pub fn sample_time(&self, index: usize) -> Chrono {
        self.view().sample_time(index)
    }

    /// Read a sample into the provided buffer.
    pub fn read_sample_into(&self, selector: SampleSelector, out: &mut [u8]) -> Result<()> {
        self.view().read_sample_into(selector, out)
    }

    /// Read a sample as owned bytes.
    pub fn read_sample(&self, selector: SampleSelector) -> Result<Vec<u8>> {
        self.view().read_sample(selector)
    }

    /// Read a sample as a typed value.
    pub fn read_typed<T: bytemuck::Pod + Default>(&self, selector: SampleSelector) -> Result<T> {
        self.view().read_typed(selector)
    }
}

/// Array property wrapper that owns its reader.
pub struct IArrayProperty<'a> {
    inner: IProperty<'a>,
}

impl<'a> IArrayProperty<'a> {
    fn view(&self) -> ArrayView<'_> {
        ArrayView {
            reader: self.inner.reader.as_array().unwrap_or_else(|| {
                unreachable!("array wrapper over non-array reader")
            }),
        }
    }

    /// Get the property header.
    pub fn header(&self) -> &PropertyHeader {
        self.inner.header()
    }

    /// Number of samples written for this property.
    pub fn num_samples(&self) -> usize {
        self.view().num_samples()
    }

    /// All samples identical, as recorded at write time.
    pub fn is_constant(&self) -> bool {
        self.view().is_constant()
    }

    /// Time of the sample at the given index.
    pub fn sample_time(&self, index: usize) -> Chrono {
        self.view().sample_time(index)
    }

    /// Content key stored with a sample, without reading the payload.
    pub fn sample_key(&self, index: usize) -> Result<SampleDigest> {
        self.view().sample_key(index)
    }

    /// Dimensions of a sample.
    pub fn sample_dimensions(&self, index: usize) -> Result<Dimensions> {
        self.view().sample_dimensions(index)
    }

    /// Read a full sample (payload shared with the read cache).
    pub fn read_sample(&self, selector: SampleSelector) -> Result<ArraySample> {
        self.view().read_sample(selector)
    }

    /// Read a sample as a typed Vec.
    pub fn read_typed<T: bytemuck::Pod>(&self, selector: SampleSelector) -> Result<Vec<T>> {
        self.view().read_typed(selector)
    }

    /// Read a sample as a string array.
    pub fn read_strings(&self, selector: SampleSelector) -> Result<Vec<String>> {
        self.view().read_strings(selector)
    }
}

/// Borrowed view over a scalar property reader.
pub struct ScalarView<'a> {
    reader: &'a dyn ScalarPropertyReader,
}

impl<'a> ScalarView<'a> {
    /// Get the property header.
    pub fn header(&self) -> &PropertyHeader {
        self.reader.header()
    }

    /// Data type of each sample.
    pub fn data_type(&self) -> DataType {
        self.reader.header().data_type
    }

    /// Number of samples written for this property.
    pub fn num_samples(&self) -> usize {
        self.reader.num_samples()
    }

    /// Time sampling shared from the archive table.
    pub fn time_sampling(&self) -> &TimeSampling {
        self.reader.time_sampling()
    }

    /// All samples identical, as recorded at write time.
    pub fn is_constant(&self) -> bool {
        self.reader.is_constant()
    }

    /// Time of the sample at the given index.
    pub fn sample_time(&self, index: usize) -> Chrono {
        self.reader.sample_time(index)
    }

    /// Resolve a selector to a concrete sample index.
    pub fn resolve(&self, selector: SampleSelector) -> Result<usize> {
        self.reader.resolve(selector)
    }

    /// Read a sample into the provided buffer.
    pub fn read_sample_into(&self, selector: SampleSelector, out: &mut [u8]) -> Result<()> {
        self.reader.read_sample_into(selector, out)
    }

    /// Read a sample as owned bytes.
    pub fn read_sample(&self, selector: SampleSelector) -> Result<Vec<u8>> {
        self.reader.read_sample(selector)
    }

    /// Read a sample as a typed value.
    pub fn read_typed<T: bytemuck::Pod + Default>(&self, selector: SampleSelector) -> Result<T> {
        let mut value = T::default();
        self.reader
            .read_sample_into(selector, bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }
}

/// Borrowed view over an array property reader.
pub struct ArrayView<'a> {
    reader: &'a dyn ArrayPropertyReader,
}

impl<'a> ArrayView<'a> {
    /// Get the property header.
    pub fn header(&self) -> &PropertyHeader {
        self.reader.header()
    }

    /// Data type of each array element.
    pub fn data_type(&self) -> DataType {
        self.reader.header().data_type
    }

    /// Number of samples written for this property.
    pub fn num_samples(&self) -> usize {
        self.reader.num_samples()
    }

    /// Time sampling shared from the archive table.
    pub fn time_sampling(&self) -> &TimeSampling {
        self.reader.time_sampling()
    }

    /// All samples identical, as recorded at write time.
    pub fn is_constant(&self) -> bool {
        self.reader.is_constant()
    }

    /// Time of the sample at the given index.
    pub fn sample_time(&self, index: usize) -> Chrono {
        self.reader.sample_time(index)
    }

    /// Resolve a selector to a concrete sample index.
    pub fn resolve(&self, selector: SampleSelector) -> Result<usize> {
        self.reader.resolve(selector)
    }

    /// Content key stored with a sample, without reading the payload.
    pub fn sample_key(&self, index: usize) -> Result<SampleDigest> {
        self.reader.sample_key(index)
    }

    /// Dimensions of a sample.
    pub fn sample_dimensions(&self, index: usize) -> Result<Dimensions> {
        self.reader.sample_dimensions(index)
    }

    /// Read a full sample (payload shared with the read cache).
    pub fn read_sample(&self, selector: SampleSelector) -> Result<ArraySample> {
        self.reader.read_sample(selector)
    }

    /// Read a sample as a typed Vec.
    pub fn read_typed<T: bytemuck::Pod>(&self, selector: SampleSelector) -> Result<Vec<T>> {
        let sample = self.reader.read_sample(selector)?;
        let slice: &[T] = bytemuck::try_cast_slice(&sample.data)
            .map_err(|_| Error::invalid("payload does not cast to requested element type"))?;
        Ok(slice.to_vec())
    }

    /// Read a sample as a string array (null-separated UTF-8).
    pub fn read_strings(&self, selector: SampleSelector) -> Result<Vec<String>> {
        self.reader.read_strings(selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn write_scene(path: &std::path::Path) {
        let mut archive = OArchive::create(path).unwrap();
        archive.set_application("api tests").unwrap();
        archive.set_description("two joints and a skin").unwrap();
        let ts = archive.add_time_sampling(TimeSampling::uniform(1.0 / 24.0, 0.0));

        let mut root = OObject::new("");
        let rig = root.add_child(OObject::new("rig")).unwrap();
        let body = rig.add_child(OObject::new("body")).unwrap();

        let mut heat = OProperty::scalar("heat", DataType::FLOAT32).with_time_sampling(ts);
        heat.add_scalar_pod(&36.5f32).unwrap();
        heat.add_scalar_pod(&37.0f32).unwrap();
        body.add_property(heat).unwrap();

        let points = body.add_array("points", DataType::VEC3F).unwrap();
        points.add_array_pod(&[0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0]).unwrap();

        let detail = body.add_compound("detail").unwrap();
        let visible = detail.get_or_create_scalar("visible", DataType::BOOL).unwrap();
        visible.add_scalar_sample(&[1u8]).unwrap();

        archive.write_archive(&mut root).unwrap();
    }

    #[test]
    fn find_object_walks_full_paths() {
        let file = NamedTempFile::new().unwrap();
        write_scene(file.path());

        let archive = IArchive::open(file.path()).unwrap();
        assert_eq!(archive.application(), Some("api tests"));
        assert_eq!(archive.description(), Some("two joints and a skin"));
        assert!(archive.date_written().is_none());

        let body = archive.find_object("/rig/body").unwrap().unwrap();
        assert_eq!(body.full_name(), "/rig/body");
        assert!(archive.has_object("rig"));
        assert!(archive.has_object("/"));
        assert!(!archive.has_object("/rig/tail"));
        assert!(archive.find_object("/ghost").unwrap().is_none());
    }

    #[test]
    fn properties_narrow_to_their_kind() {
        let file = NamedTempFile::new().unwrap();
        write_scene(file.path());

        let archive = IArchive::open(file.path()).unwrap();
        let body = archive.find_object("/rig/body").unwrap().unwrap();
        let props = body.properties().unwrap();
        assert_eq!(props.num_properties(), 3);
        assert!(props.has_property("detail"));

        let heat = props.scalar_by_name("heat").unwrap().unwrap();
        assert_eq!(heat.num_samples(), 2);
        assert!(!heat.is_constant());
        let v: f32 = heat.read_typed(SampleSelector::Index(1)).unwrap();
        assert_eq!(v, 37.0);
        assert!((heat.sample_time(1) - 1.0 / 24.0).abs() < 1e-12);

        let points = props.array_by_name("points").unwrap().unwrap();
        assert_eq!(points.num_samples(), 1);
        assert_eq!(points.sample_dimensions(0).unwrap(), Dimensions::d1(2));
        let data: Vec<f32> = points.read_typed(SampleSelector::Index(0)).unwrap();
        assert_eq!(data, vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

        // Wrong-kind narrowing is a type error, not a lookup miss.
        assert!(props.scalar_by_name("points").is_err());
        assert!(props.array_by_name("missing").unwrap().is_none());
    }

    #[test]
    fn nested_compounds_descend_through_views() {
        let file = NamedTempFile::new().unwrap();
        write_scene(file.path());

        let archive = IArchive::open(file.path()).unwrap();
        let body = archive.find_object("/rig/body").unwrap().unwrap();
        let props = body.properties().unwrap();

        let detail = props.property_by_name("detail").unwrap().unwrap();
        assert!(detail.is_compound());
        let detail = detail.as_compound().unwrap();
        assert_eq!(detail.property_names(), vec!["visible".to_string()]);

        let visible = detail.scalar_by_name("visible").unwrap().unwrap();
        let flag: u8 = visible.read_typed(SampleSelector::Index(0)).unwrap();
        assert_eq!(flag, 1);
    }

    #[test]
    fn root_object_is_marked_as_root() {
        let file = NamedTempFile::new().unwrap();
        write_scene(file.path());

        let archive = IArchive::open(file.path()).unwrap();
        let root = archive.root().unwrap();
        assert!(root.is_root());
        assert_eq!(root.full_name(), "/");
        assert_eq!(root.num_children(), 1);
        assert_eq!(root.child_header(0).map(|h| h.name.as_str()), Some("rig"));
        let rig = root.child(0).unwrap();
        assert!(!rig.is_root());
        assert_eq!(rig.children().count(), 1);
    }
}
