//! Core reader traits backed by the vault container.
//!
//! Child objects and property compounds are materialized lazily. Each
//! object keeps weak handles to children it already built, so racing
//! readers converge on one instance per child.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use super::format::{ARCHIVE_FORMAT_VERSION, KEY_PREFIX_SIZE};
use super::read_util::{
    read_indexed_metadata, read_object_headers, read_property_headers,
    read_time_samplings_and_max,
};
use super::reader::{IData, IGroup, VaultArchive};
use crate::core::{
    ArchiveReader, ArrayPropertyReader, ArraySample, CompoundPropertyReader, MetaData,
    ObjectHeader, ObjectReader, PropertyHeader, PropertyReader, PropertyType, ReadSampleCache,
    ReadSampleKey, SampleDigest, SampleSelector, SampledPropertyReader, ScalarPropertyReader,
    TimeSampling,
};
use super::pool::ReadStream;
use crate::util::{Dimensions, Error, Result};

/// State shared by every reader materialized from one archive.
struct ArchiveContext {
    indexed_metadata: Vec<MetaData>,
    time_samplings: Vec<Arc<TimeSampling>>,
    cache: ReadSampleCache,
}

impl ArchiveContext {
    fn time_sampling(&self, index: u32) -> Result<Arc<TimeSampling>> {
        self.time_samplings
            .get(index as usize)
            .cloned()
            .ok_or_else(|| {
                Error::invalid(format!("time sampling index {index} outside archive table"))
            })
    }
}

// ============================================================================
// Archive
// ============================================================================

/// Archive reader backed by a vault container.
pub struct VaultArchiveReader {
    name: String,
    version: u16,
    library_version: i32,
    max_samples: Vec<u32>,
    archive_metadata: MetaData,
    ctx: Arc<ArchiveContext>,
    root: Arc<ObjectData>,
}

impl VaultArchiveReader {
    /// Open an archive file through a memory map.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path.to_string_lossy().to_string();
        Self::init(name, VaultArchive::open(path)?)
    }

    /// Open an archive file through a pool of buffered file streams.
    pub fn open_with_streams(path: impl AsRef<Path>, num_streams: usize) -> Result<Self> {
        let path = path.as_ref();
        let name = path.to_string_lossy().to_string();
        Self::init(name, VaultArchive::open_with_streams(path, num_streams)?)
    }

    /// Read an archive from caller-supplied seekable sources.
    pub fn from_streams(sources: Vec<Box<dyn ReadStream>>) -> Result<Self> {
        Self::init(String::new(), VaultArchive::from_streams(sources)?)
    }

    fn init(name: String, vault: VaultArchive) -> Result<Self> {
        let version = vault.version();
        let root_group = vault.root().clone();
        let num_children = root_group.num_children();

        // Root layout: format version, library version, root object,
        // archive metadata, time samplings, indexed metadata.
        if num_children < 6 {
            return Err(Error::invalid("archive root group has too few children"));
        }
        if !root_group.is_child_data(0)?
            || !root_group.is_child_data(1)?
            || !root_group.is_child_group(2)?
            || !root_group.is_child_data(3)?
            || !root_group.is_child_data(4)?
            || !root_group.is_child_data(5)?
        {
            return Err(Error::invalid("archive root group has wrong child kinds"));
        }

        let format_version = read_i32_block(&root_group.data(0)?)?;
        if !(0..=ARCHIVE_FORMAT_VERSION).contains(&format_version) {
            return Err(Error::invalid(format!(
                "unsupported archive format version {format_version}"
            )));
        }
        let library_version = read_i32_block(&root_group.data(1)?)?;

        let archive_metadata = {
            let meta_data = root_group.data(3)?;
            if meta_data.is_empty() {
                MetaData::new()
            } else {
                MetaData::parse(&meta_data.read_string()?)
            }
        };

        let (time_samplings, max_samples) =
            read_time_samplings_and_max(&root_group.data(4)?)?;
        let indexed_metadata = read_indexed_metadata(&root_group.data(5)?)?;

        let ctx = Arc::new(ArchiveContext {
            indexed_metadata,
            time_samplings: time_samplings.into_iter().map(Arc::new).collect(),
            cache: ReadSampleCache::default(),
        });

        let root = ObjectData::new(
            root_group.group(2)?,
            ObjectHeader::new("", "/"),
            ctx.clone(),
        )?;

        tracing::debug!(name = %name, library_version, "archive opened");

        Ok(Self {
            name,
            version,
            library_version,
            max_samples,
            archive_metadata,
            ctx,
            root,
        })
    }

    /// Interned metadata entries decoded from the archive.
    pub fn indexed_metadata(&self) -> &[MetaData] {
        &self.ctx.indexed_metadata
    }
}

impl ArchiveReader for VaultArchiveReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u16 {
        self.version
    }

    fn library_version(&self) -> i32 {
        self.library_version
    }

    fn num_time_samplings(&self) -> usize {
        self.ctx.time_samplings.len()
    }

    fn time_sampling(&self, index: usize) -> Option<Arc<TimeSampling>> {
        self.ctx.time_samplings.get(index).cloned()
    }

    fn max_samples_for_time_sampling(&self, index: usize) -> Option<usize> {
        self.max_samples.get(index).map(|&v| v as usize)
    }

    fn archive_metadata(&self) -> &MetaData {
        &self.archive_metadata
    }

    fn root(&self) -> Result<Arc<dyn ObjectReader>> {
        Ok(self.root.clone())
    }
}

/// Build a name lookup table over decoded headers. Duplicate names in
/// a damaged archive resolve to the first occurrence.
fn name_index<'a>(names: impl Iterator<Item = &'a str>) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (index, name) in names.enumerate() {
        map.entry(name.to_string()).or_insert(index);
    }
    map
}

/// Read a single little-endian i32 data block.
fn read_i32_block(data: &IData) -> Result<i32> {
    if data.size() != 4 {
        return Err(Error::invalid("version block has wrong size"));
    }
    let bytes = data.read_all()?;
    Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

// ============================================================================
// Objects
// ============================================================================

/// One materialized object.
///
/// Group layout: child 0 is the properties compound, children 1..=n are
/// the child objects, the last child is the child-headers block.
struct ObjectData {
    header: ObjectHeader,
    group: IGroup,
    child_headers: Vec<ObjectHeader>,
    child_index: HashMap<String, usize>,
    properties_hash: Option<SampleDigest>,
    children_hash: Option<SampleDigest>,
    ctx: Arc<ArchiveContext>,
    children: Mutex<Vec<Weak<ObjectData>>>,
    properties: OnceLock<Arc<CompoundData>>,
}

impl ObjectData {
    fn new(group: IGroup, header: ObjectHeader, ctx: Arc<ArchiveContext>) -> Result<Arc<Self>> {
        let num_children = group.num_children();

        let (child_headers, properties_hash, children_hash) = if num_children == 0 {
            (Vec::new(), None, None)
        } else {
            if num_children < 2 || !group.is_child_data(num_children - 1)? {
                return Err(Error::invalid(format!(
                    "object group for {} is malformed",
                    header.full_name
                )));
            }
            let headers_data = group.data(num_children - 1)?;
            let (headers, props_hash, kids_hash) =
                read_object_headers(&headers_data, &header.full_name, &ctx.indexed_metadata)?;
            if headers.len() as u64 + 2 != num_children {
                return Err(Error::invalid(format!(
                    "object group for {} declares {} children but holds {}",
                    header.full_name,
                    headers.len(),
                    num_children.saturating_sub(2)
                )));
            }
            (headers, Some(props_hash), Some(kids_hash))
        };

        let slots = child_headers.len();
        let child_index = name_index(child_headers.iter().map(|h| h.name.as_str()));
        Ok(Arc::new(Self {
            header,
            group,
            child_headers,
            child_index,
            properties_hash,
            children_hash,
            ctx,
            children: Mutex::new(vec![Weak::new(); slots]),
            properties: OnceLock::new(),
        }))
    }

    fn materialize_child(&self, index: usize) -> Result<Arc<ObjectData>> {
        let mut slots = self.children.lock();
        if let Some(existing) = slots[index].upgrade() {
            return Ok(existing);
        }
        let child_group = self.group.group(index as u64 + 1)?;
        let child = ObjectData::new(
            child_group,
            self.child_headers[index].clone(),
            self.ctx.clone(),
        )?;
        slots[index] = Arc::downgrade(&child);
        Ok(child)
    }

    fn compound(&self) -> Result<Arc<CompoundData>> {
        if let Some(props) = self.properties.get() {
            return Ok(props.clone());
        }
        let built = if self.group.is_empty() {
            Arc::new(CompoundData::empty(self.ctx.clone()))
        } else {
            let props_group = self.group.group(0)?;
            Arc::new(CompoundData::from_group(
                props_group,
                PropertyHeader::compound(".props"),
                self.ctx.clone(),
            )?)
        };
        // Another thread may have won the race; either value is the same.
        Ok(self.properties.get_or_init(|| built).clone())
    }
}

impl ObjectReader for ObjectData {
    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn num_children(&self) -> usize {
        self.child_headers.len()
    }

    fn child_header(&self, index: usize) -> Option<&ObjectHeader> {
        self.child_headers.get(index)
    }

    fn child(&self, index: usize) -> Result<Arc<dyn ObjectReader>> {
        if index >= self.child_headers.len() {
            return Err(Error::ChildOutOfBounds {
                index,
                count: self.child_headers.len(),
            });
        }
        Ok(self.materialize_child(index)?)
    }

    fn child_by_name(&self, name: &str) -> Result<Option<Arc<dyn ObjectReader>>> {
        match self.child_index.get(name) {
            Some(&index) => Ok(Some(self.materialize_child(index)?)),
            None => Ok(None),
        }
    }

    fn properties(&self) -> Result<Arc<dyn CompoundPropertyReader>> {
        Ok(self.compound()?)
    }

    fn properties_hash(&self) -> Option<SampleDigest> {
        self.properties_hash
    }

    fn children_hash(&self) -> Option<SampleDigest> {
        self.children_hash
    }
}

// ============================================================================
// Compound properties
// ============================================================================

/// One materialized compound.
///
/// Group layout: children 0..n are the sub-property groups, the last
/// child is the property-headers block.
struct CompoundData {
    header: PropertyHeader,
    group: Option<IGroup>,
    sub_headers: Vec<PropertyHeader>,
    sub_index: HashMap<String, usize>,
    ctx: Arc<ArchiveContext>,
}

impl CompoundData {
    fn empty(ctx: Arc<ArchiveContext>) -> Self {
        Self {
            header: PropertyHeader::compound(".props"),
            group: None,
            sub_headers: Vec::new(),
            sub_index: HashMap::new(),
            ctx,
        }
    }

    fn from_group(group: IGroup, header: PropertyHeader, ctx: Arc<ArchiveContext>) -> Result<Self> {
        let num_children = group.num_children();
        let sub_headers = if num_children == 0 {
            Vec::new()
        } else {
            if !group.is_child_data(num_children - 1)? {
                return Err(Error::invalid(format!(
                    "compound {} is missing its headers block",
                    header.name
                )));
            }
            let headers_data = group.data(num_children - 1)?;
            let headers = read_property_headers(&headers_data, &ctx.indexed_metadata)?;
            if headers.len() as u64 + 1 != num_children {
                return Err(Error::invalid(format!(
                    "compound {} declares {} properties but holds {}",
                    header.name,
                    headers.len(),
                    num_children - 1
                )));
            }
            headers
        };

        let sub_index = name_index(sub_headers.iter().map(|h| h.name.as_str()));
        Ok(Self {
            header,
            group: Some(group),
            sub_headers,
            sub_index,
            ctx,
        })
    }
}

impl PropertyReader for CompoundData {
    fn header(&self) -> &PropertyHeader {
        &self.header
    }

    fn as_compound(&self) -> Option<&dyn CompoundPropertyReader> {
        Some(self)
    }
}

impl CompoundPropertyReader for CompoundData {
    fn num_properties(&self) -> usize {
        self.sub_headers.len()
    }

    fn property_header(&self, index: usize) -> Option<&PropertyHeader> {
        self.sub_headers.get(index)
    }

    fn property(&self, index: usize) -> Result<Box<dyn PropertyReader + '_>> {
        let header = self
            .sub_headers
            .get(index)
            .ok_or(Error::ChildOutOfBounds {
                index,
                count: self.sub_headers.len(),
            })?
            .clone();
        let group = self
            .group
            .as_ref()
            .ok_or_else(|| Error::invalid("compound has no backing group"))?;
        let prop_group = group.group(index as u64)?;

        match header.property_type {
            PropertyType::Compound => Ok(Box::new(CompoundData::from_group(
                prop_group,
                header,
                self.ctx.clone(),
            )?)),
            PropertyType::Scalar => Ok(Box::new(ScalarData::new(
                header,
                prop_group,
                self.ctx.clone(),
            )?)),
            PropertyType::Array => Ok(Box::new(ArrayData::new(
                header,
                prop_group,
                self.ctx.clone(),
            )?)),
        }
    }

    fn property_by_name(&self, name: &str) -> Result<Option<Box<dyn PropertyReader + '_>>> {
        match self.sub_index.get(name) {
            Some(&index) => Ok(Some(self.property(index)?)),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Scalar properties
// ============================================================================

/// Scalar property reader: one keyed data child per sample.
struct ScalarData {
    header: PropertyHeader,
    group: IGroup,
    time_sampling: Arc<TimeSampling>,
    ctx: Arc<ArchiveContext>,
}

impl ScalarData {
    fn new(header: PropertyHeader, group: IGroup, ctx: Arc<ArchiveContext>) -> Result<Self> {
        let time_sampling = ctx.time_sampling(header.time_sampling_index)?;
        Ok(Self {
            header,
            group,
            time_sampling,
            ctx,
        })
    }
}

impl PropertyReader for ScalarData {
    fn header(&self) -> &PropertyHeader {
        &self.header
    }

    fn as_scalar(&self) -> Option<&dyn ScalarPropertyReader> {
        Some(self)
    }
}

impl SampledPropertyReader for ScalarData {
    fn num_samples(&self) -> usize {
        self.header.num_samples as usize
    }

    fn time_sampling(&self) -> &TimeSampling {
        &self.time_sampling
    }
}

impl ScalarPropertyReader for ScalarData {
    fn read_sample_into(&self, selector: SampleSelector, out: &mut [u8]) -> Result<()> {
        let index = self.resolve(selector)?;
        let data = self.group.data(index as u64)?;
        read_keyed_payload_into(&data, &self.ctx.cache, out)?;
        Ok(())
    }
}

// ============================================================================
// Array properties
// ============================================================================

/// Array property reader: (keyed data, dimensions data) child pairs.
struct ArrayData {
    header: PropertyHeader,
    group: IGroup,
    time_sampling: Arc<TimeSampling>,
    ctx: Arc<ArchiveContext>,
}

impl ArrayData {
    fn new(header: PropertyHeader, group: IGroup, ctx: Arc<ArchiveContext>) -> Result<Self> {
        let time_sampling = ctx.time_sampling(header.time_sampling_index)?;
        Ok(Self {
            header,
            group,
            time_sampling,
            ctx,
        })
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let count = self.num_samples();
        if index >= count {
            return Err(Error::SampleOutOfBounds { index, count });
        }
        Ok(())
    }

    /// Dimensions for a sample: read the dims block, or reconstruct a
    /// rank-1 shape from the payload size when the sentinel was stored.
    fn dimensions_at(&self, index: usize, payload_bytes: u64) -> Result<Dimensions> {
        let dims_index = index as u64 * 2 + 1;
        if self.group.is_empty_child_data(dims_index)? {
            let elem_bytes = self.header.data_type.num_bytes().max(1) as u64;
            return Ok(Dimensions::d1(payload_bytes / elem_bytes));
        }
        let dims_data = self.group.data(dims_index)?;
        let bytes = dims_data.read_all()?;
        if bytes.len() % 8 != 0 {
            return Err(Error::invalid("dimensions block size not a multiple of 8"));
        }
        let sizes: Vec<u64> = bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect();
        Ok(Dimensions::from_slice(&sizes))
    }
}

impl PropertyReader for ArrayData {
    fn header(&self) -> &PropertyHeader {
        &self.header
    }

    fn as_array(&self) -> Option<&dyn ArrayPropertyReader> {
        Some(self)
    }
}

impl SampledPropertyReader for ArrayData {
    fn num_samples(&self) -> usize {
        self.header.num_samples as usize
    }

    fn time_sampling(&self) -> &TimeSampling {
        &self.time_sampling
    }
}

impl ArrayPropertyReader for ArrayData {
    fn sample_key(&self, index: usize) -> Result<SampleDigest> {
        self.check_index(index)?;
        let data = self.group.data(index as u64 * 2)?;
        if data.size() < KEY_PREFIX_SIZE as u64 {
            return Err(Error::invalid("sample block missing key prefix"));
        }
        let mut digest = [0u8; 16];
        let read = data.read_range(0, &mut digest)?;
        if read != KEY_PREFIX_SIZE {
            return Err(Error::invalid("sample key prefix truncated"));
        }
        Ok(digest)
    }

    fn sample_dimensions(&self, index: usize) -> Result<Dimensions> {
        self.check_index(index)?;
        let data = self.group.data(index as u64 * 2)?;
        let payload_bytes = data.size().saturating_sub(KEY_PREFIX_SIZE as u64);
        self.dimensions_at(index, payload_bytes)
    }

    fn read_sample(&self, selector: SampleSelector) -> Result<ArraySample> {
        let index = self.resolve(selector)?;
        let data = self.group.data(index as u64 * 2)?;
        let payload_bytes = data.size().saturating_sub(KEY_PREFIX_SIZE as u64);
        let dimensions = self.dimensions_at(index, payload_bytes)?;
        let payload = read_keyed_payload(&data, &self.ctx.cache)?;
        Ok(ArraySample {
            data: payload,
            dimensions,
            data_type: self.header.data_type,
        })
    }
}

// ============================================================================
// Keyed payload access
// ============================================================================

/// Read a keyed block's payload through the sample cache, keyed by the
/// block's file position so deduplicated samples share one entry.
fn read_keyed_payload(data: &IData, cache: &ReadSampleCache) -> Result<Arc<Vec<u8>>> {
    if data.size() < KEY_PREFIX_SIZE as u64 {
        return Err(Error::invalid("sample block missing key prefix"));
    }
    let key = ReadSampleKey::new(data.pos());
    if let Some(cached) = cache.get(&key) {
        return Ok(cached);
    }
    let payload_len = (data.size() - KEY_PREFIX_SIZE as u64) as usize;
    let mut buf = vec![0u8; payload_len];
    let read = data.read_range(KEY_PREFIX_SIZE as u64, &mut buf)?;
    if read != payload_len {
        return Err(Error::invalid("sample payload truncated"));
    }
    Ok(cache.insert(key, buf))
}

/// Copy a keyed block's payload into a caller buffer. The buffer must
/// match the stored payload exactly.
fn read_keyed_payload_into(data: &IData, cache: &ReadSampleCache, out: &mut [u8]) -> Result<()> {
    let payload = read_keyed_payload(data, cache)?;
    if out.len() != payload.len() {
        return Err(Error::TypeMismatch {
            expected: format!("{}-byte sample payload", payload.len()),
            actual: format!("{}-byte buffer", out.len()),
        });
    }
    out.copy_from_slice(&payload);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SampleSelector;
    use crate::util::DataType;
    use crate::vault::writer::{OArchive, OObject, OProperty};
    use tempfile::NamedTempFile;

    fn write_sample_archive(path: &std::path::Path) {
        let mut archive = OArchive::create(path).unwrap();
        archive.set_application("archive_impl tests").unwrap();
        let ts = crate::core::TimeSampling::uniform(0.5, 0.0);
        let ts_index = archive.add_time_sampling(ts);

        let mut root = OObject::new("");
        let body = root.add_child(OObject::new("body")).unwrap();

        let mut temp =
            OProperty::scalar("temperature", DataType::FLOAT64).with_time_sampling(ts_index);
        temp.add_scalar_pod(&20.0f64).unwrap();
        temp.add_scalar_pod(&21.5f64).unwrap();
        temp.add_scalar_pod(&21.5f64).unwrap();
        body.add_property(temp).unwrap();

        let points = body.add_array("points", DataType::VEC3F).unwrap();
        points.add_array_pod(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        points.set_from_previous().unwrap();

        let nested = body.add_compound("detail").unwrap();
        let flag = nested.get_or_create_scalar("visible", DataType::BOOL).unwrap();
        flag.add_scalar_sample(&[1u8]).unwrap();

        archive.write_archive(&mut root).unwrap();
    }

    #[test]
    fn archive_reads_back_its_tree() {
        let file = NamedTempFile::new().unwrap();
        write_sample_archive(file.path());

        let archive = VaultArchiveReader::open(file.path()).unwrap();
        assert_eq!(
            archive.archive_metadata().get(MetaData::APPLICATION_KEY),
            Some("archive_impl tests")
        );
        assert_eq!(archive.num_time_samplings(), 2);
        assert_eq!(archive.max_samples_for_time_sampling(1), Some(3));

        let root = archive.root().unwrap();
        assert_eq!(root.num_children(), 1);
        let body = root.child_by_name("body").unwrap().unwrap();
        assert_eq!(body.full_name(), "/body");
        assert!(body.properties_hash().is_some());

        let props = body.properties().unwrap();
        assert_eq!(props.num_properties(), 3);
        assert!(props.has_property("temperature"));
        assert!(root.child_by_name("missing").unwrap().is_none());
    }

    #[test]
    fn scalar_samples_read_back_with_time_resolution() {
        let file = NamedTempFile::new().unwrap();
        write_sample_archive(file.path());

        let archive = VaultArchiveReader::open(file.path()).unwrap();
        let body = archive.root().unwrap().child(0).unwrap();
        let props = body.properties().unwrap();
        let prop = props.property_by_name("temperature").unwrap().unwrap();
        let scalar = prop.as_scalar().unwrap();

        assert_eq!(scalar.num_samples(), 3);
        assert!(!scalar.is_constant());
        let first: f64 = {
            let mut buf = [0u8; 8];
            scalar
                .read_sample_into(SampleSelector::Index(0), &mut buf)
                .unwrap();
            f64::from_le_bytes(buf)
        };
        assert_eq!(first, 20.0);

        // Uniform sampling at 0.5s: time 1.0 is sample index 2.
        let mut buf = [0u8; 8];
        scalar
            .read_sample_into(SampleSelector::TimeNear(1.0), &mut buf)
            .unwrap();
        assert_eq!(f64::from_le_bytes(buf), 21.5);

        assert!(matches!(
            scalar.resolve(SampleSelector::Index(3)),
            Err(Error::SampleOutOfBounds { index: 3, count: 3 })
        ));
    }

    #[test]
    fn array_samples_share_the_deduplicated_block() {
        let file = NamedTempFile::new().unwrap();
        write_sample_archive(file.path());

        let archive = VaultArchiveReader::open(file.path()).unwrap();
        let body = archive.root().unwrap().child(0).unwrap();
        let props = body.properties().unwrap();
        let prop = props.property_by_name("points").unwrap().unwrap();
        let array = prop.as_array().unwrap();

        assert_eq!(array.num_samples(), 2);
        assert!(array.is_constant());
        assert_eq!(array.sample_key(0).unwrap(), array.sample_key(1).unwrap());

        let a = array.read_sample(SampleSelector::Index(0)).unwrap();
        let b = array.read_sample(SampleSelector::Index(1)).unwrap();
        assert_eq!(a.dimensions, Dimensions::d1(2));
        assert!(Arc::ptr_eq(&a.data, &b.data));

        let raw: &[f32] = bytemuck::cast_slice(&a.data);
        assert_eq!(raw, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn nested_compound_resolves_by_name() {
        let file = NamedTempFile::new().unwrap();
        write_sample_archive(file.path());

        let archive = VaultArchiveReader::open(file.path()).unwrap();
        let body = archive.root().unwrap().child(0).unwrap();
        let props = body.properties().unwrap();
        let detail = props.property_by_name("detail").unwrap().unwrap();
        let compound = detail.as_compound().unwrap();
        assert_eq!(compound.property_names(), vec!["visible".to_string()]);

        let flag = compound.property_by_name("visible").unwrap().unwrap();
        let scalar = flag.as_scalar().unwrap();
        let mut buf = [0u8; 1];
        scalar
            .read_sample_into(SampleSelector::first(), &mut buf)
            .unwrap();
        assert_eq!(buf[0], 1);
    }

    #[test]
    fn scalar_read_requires_exact_buffer_size() {
        let file = NamedTempFile::new().unwrap();
        write_sample_archive(file.path());

        let archive = VaultArchiveReader::open(file.path()).unwrap();
        let body = archive.root().unwrap().child(0).unwrap();
        let props = body.properties().unwrap();
        let prop = props.property_by_name("temperature").unwrap().unwrap();
        let scalar = prop.as_scalar().unwrap();

        let mut short = [0u8; 4];
        assert!(matches!(
            scalar.read_sample_into(SampleSelector::Index(0), &mut short),
            Err(Error::TypeMismatch { .. })
        ));
        let mut long = [0u8; 16];
        assert!(matches!(
            scalar.read_sample_into(SampleSelector::Index(0), &mut long),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn acyclic_sampling_reports_stored_time_capacity() {
        let file = NamedTempFile::new().unwrap();
        {
            let mut archive = OArchive::create(file.path()).unwrap();
            let ts = crate::core::TimeSampling::acyclic(vec![0.0, 0.25, 0.75]);
            let ts_index = archive.add_time_sampling(ts);

            let mut root = OObject::new("");
            let mut prop =
                OProperty::scalar("v", DataType::INT32).with_time_sampling(ts_index);
            prop.add_scalar_pod(&1i32).unwrap();
            prop.add_scalar_pod(&2i32).unwrap();
            root.add_property(prop).unwrap();
            archive.write_archive(&mut root).unwrap();
        }

        let archive = VaultArchiveReader::open(file.path()).unwrap();
        let ts = archive.time_sampling(1).unwrap();
        assert!(ts.kind.is_acyclic());
        // Two samples were written; acyclic table records advertise
        // the full stored-time capacity.
        assert_eq!(archive.max_samples_for_time_sampling(1), Some(3));
    }

    #[test]
    fn lazy_children_converge_on_one_instance() {
        let file = NamedTempFile::new().unwrap();
        write_sample_archive(file.path());

        let archive = VaultArchiveReader::open(file.path()).unwrap();
        let root = archive.root().unwrap();
        let a = root.child(0).unwrap();
        let b = root.child_by_name("body").unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn out_of_range_child_is_a_contract_error() {
        let file = NamedTempFile::new().unwrap();
        write_sample_archive(file.path());

        let archive = VaultArchiveReader::open(file.path()).unwrap();
        let root = archive.root().unwrap();
        assert!(matches!(
            root.child(5),
            Err(Error::ChildOutOfBounds { index: 5, count: 1 })
        ));
        let props = root.child(0).unwrap().properties().unwrap();
        assert!(matches!(
            props.property(9),
            Err(Error::ChildOutOfBounds { index: 9, count: 3 })
        ));
    }
}
