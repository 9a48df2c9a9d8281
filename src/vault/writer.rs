//! Vault container writer.
//!
//! Archives are assembled in memory as a tree of [`OObject`] and
//! [`OProperty`] nodes, then serialized bottom-up in one pass by
//! [`OArchive::write_archive`]. Sample payloads are content-addressed:
//! each carries a 16-byte key prefix, and identical payloads are stored
//! once per archive.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};

use super::format::*;
use super::read_util::{
    ALL_SAME_BIT, EXTENT_SHIFT, HAS_CHANGED_BIT, HAS_TSIDX_BIT, INLINE_META_INDEX,
    MAX_INDEXED_META_BYTES, MAX_INDEXED_META_ENTRIES, META_SHIFT, POD_SHIFT, SIZE_HINT_SHIFT,
};
use crate::core::{
    MetaData, SampleDigest, SampleKey, TimeSampling, TimeSamplingKind, WrittenSampleMap,
    ACYCLIC_NUM_SAMPLES, ACYCLIC_TIME_PER_CYCLE,
};
use crate::util::{Chrono, DataType, Dimensions, Error, Result};

/// Sink an archive can be written to.
pub trait WriteStream: Write + Seek + Send {}

impl<T: Write + Seek + Send> WriteStream for T {}

/// Buffered output stream with position tracking.
pub struct OStream {
    writer: BufWriter<Box<dyn WriteStream>>,
    pos: u64,
}

impl OStream {
    /// Create a new output stream for the given file path.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::from_stream(Box::new(file)))
    }

    /// Wrap an arbitrary seekable sink.
    pub fn from_stream(sink: Box<dyn WriteStream>) -> Self {
        Self {
            writer: BufWriter::with_capacity(2 * 1024 * 1024, sink),
            pos: 0,
        }
    }

    /// Current write position.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Write bytes and advance position.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    /// Write a u32 value (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(value)?;
        self.pos += 4;
        Ok(())
    }

    /// Write a u16 value (little-endian).
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.writer.write_u16::<LittleEndian>(value)?;
        self.pos += 2;
        Ok(())
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.pos += 1;
        Ok(())
    }

    /// Write an i32 value (little-endian).
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.writer.write_i32::<LittleEndian>(value)?;
        self.pos += 4;
        Ok(())
    }

    /// Seek to a position and return the new position.
    pub fn seek(&mut self, pos: u64) -> Result<u64> {
        self.writer.flush()?;
        let new_pos = self.writer.seek(SeekFrom::Start(pos))?;
        self.pos = new_pos;
        Ok(new_pos)
    }

    /// Seek to end and return the position.
    pub fn seek_end(&mut self) -> Result<u64> {
        self.writer.flush()?;
        let new_pos = self.writer.seek(SeekFrom::End(0))?;
        self.pos = new_pos;
        Ok(new_pos)
    }

    /// Flush buffered bytes to the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

// ============================================================================
// OArchive
// ============================================================================

/// Vault archive writer.
pub struct OArchive {
    name: String,
    stream: OStream,
    frozen: bool,
    time_samplings: Vec<TimeSampling>,
    max_samples: Vec<u32>,
    indexed_metadata: Vec<MetaData>,
    metadata_map: HashMap<String, usize>,
    archive_metadata: MetaData,
    written_samples: WrittenSampleMap,
}

impl OArchive {
    /// Create a new vault file for writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let name = path.as_ref().to_string_lossy().to_string();
        let stream = OStream::create(&path)?;
        Self::from_parts(name, stream)
    }

    /// Write an archive into an arbitrary seekable sink.
    pub fn from_stream(sink: Box<dyn WriteStream>) -> Result<Self> {
        Self::from_parts(String::new(), OStream::from_stream(sink))
    }

    fn from_parts(name: String, mut stream: OStream) -> Result<Self> {
        // Header: magic, frozen flag, version, root position placeholder.
        stream.write_bytes(VAULT_MAGIC)?;
        stream.write_u8(NOT_FROZEN_FLAG)?;
        stream.write_u16(CURRENT_VERSION)?;
        stream.write_u64(0)?;

        Ok(Self {
            name,
            stream,
            frozen: false,
            // Index 0 is always the identity sampling.
            time_samplings: vec![TimeSampling::identity()],
            max_samples: vec![0],
            // Index 0 is always empty metadata.
            indexed_metadata: vec![MetaData::new()],
            metadata_map: HashMap::new(),
            archive_metadata: MetaData::new(),
            written_samples: WrittenSampleMap::new(),
        })
    }

    /// Archive name (path it was created at, empty for stream sinks).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Turn sample deduplication on or off.
    pub fn set_dedup_enabled(&mut self, enabled: bool) {
        self.written_samples.set_enabled(enabled);
    }

    /// Whether sample deduplication is enabled.
    pub fn is_dedup_enabled(&self) -> bool {
        self.written_samples.is_enabled()
    }

    /// Number of sample writes served from an already-written block.
    pub fn dedup_hits(&self) -> usize {
        self.written_samples.hits()
    }

    /// Replace the archive metadata wholesale.
    pub fn set_archive_metadata(&mut self, md: MetaData) {
        self.archive_metadata = md;
    }

    /// Record the writing application's name in the archive metadata.
    pub fn set_application(&mut self, name: &str) -> Result<()> {
        self.archive_metadata.set(MetaData::APPLICATION_KEY, name)
    }

    /// Record the write date in the archive metadata.
    pub fn set_date_written(&mut self, date: &str) -> Result<()> {
        self.archive_metadata.set(MetaData::DATE_KEY, date)
    }

    /// Record a free-form description in the archive metadata.
    pub fn set_description(&mut self, desc: &str) -> Result<()> {
        self.archive_metadata.set(MetaData::DESCRIPTION_KEY, desc)
    }

    /// Add a time sampling and return its table index.
    ///
    /// An equivalent sampling already in the table is reused.
    pub fn add_time_sampling(&mut self, ts: TimeSampling) -> u32 {
        for (i, existing) in self.time_samplings.iter().enumerate() {
            if *existing == ts {
                return i as u32;
            }
        }
        let index = self.time_samplings.len() as u32;
        self.time_samplings.push(ts);
        self.max_samples.push(0);
        index
    }

    /// Number of time samplings in the table.
    pub fn num_time_samplings(&self) -> usize {
        self.time_samplings.len()
    }

    /// Look up a time sampling by table index.
    pub fn time_sampling(&self, index: usize) -> Option<&TimeSampling> {
        self.time_samplings.get(index)
    }

    fn update_max_samples(&mut self, ts_index: u32, num_samples: u32) {
        if let Some(max) = self.max_samples.get_mut(ts_index as usize) {
            *max = (*max).max(num_samples);
        }
    }

    /// Intern metadata and return its table index.
    ///
    /// Returns [`INLINE_META_INDEX`] when the entry does not fit the
    /// indexed table, in which case the caller serializes it inline.
    pub fn add_indexed_metadata(&mut self, md: &MetaData) -> u8 {
        let serialized = md.serialize();
        if serialized.is_empty() {
            return 0;
        }
        if let Some(&idx) = self.metadata_map.get(&serialized) {
            return idx as u8;
        }
        if self.indexed_metadata.len() > MAX_INDEXED_META_ENTRIES
            || serialized.len() > MAX_INDEXED_META_BYTES
        {
            return INLINE_META_INDEX as u8;
        }
        let idx = self.indexed_metadata.len();
        self.indexed_metadata.push(md.clone());
        self.metadata_map.insert(serialized, idx);
        idx as u8
    }

    /// Whether the archive has been finalized.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Write a raw data block and return its position.
    pub fn write_data(&mut self, data: &[u8]) -> Result<u64> {
        if self.frozen {
            return Err(Error::Frozen);
        }
        if data.is_empty() {
            return Ok(0);
        }
        let pos = self.stream.pos();
        self.stream.write_u64(data.len() as u64)?;
        self.stream.write_bytes(data)?;
        Ok(pos)
    }

    /// Write a sample payload with its 16-byte key prefix, deduplicating
    /// against previously written samples.
    pub fn write_keyed_data(&mut self, payload: &[u8], key: &SampleKey) -> Result<u64> {
        if self.frozen {
            return Err(Error::Frozen);
        }
        if let Some(existing) = self.written_samples.find(key) {
            return Ok(existing);
        }
        let pos = self.stream.pos();
        self.stream
            .write_u64((KEY_PREFIX_SIZE + payload.len()) as u64)?;
        self.stream.write_bytes(&key.digest)?;
        self.stream.write_bytes(payload)?;
        self.written_samples.record(*key, pos);
        Ok(pos)
    }

    /// Write a group of child references and return its position.
    pub fn write_group(&mut self, children: &[u64]) -> Result<u64> {
        if self.frozen {
            return Err(Error::Frozen);
        }
        if children.is_empty() {
            return Ok(0);
        }
        let pos = self.stream.pos();
        self.stream.write_u64(children.len() as u64)?;
        for &child in children {
            self.stream.write_u64(child)?;
        }
        Ok(pos)
    }

    /// Serialize the whole object tree and finalize the archive.
    ///
    /// The tree is sealed first, so further mutation of `root` fails
    /// with [`Error::Sealed`]. After this call the archive is frozen.
    pub fn write_archive(&mut self, root: &mut OObject) -> Result<()> {
        if self.frozen {
            return Err(Error::Frozen);
        }
        root.seal();

        let format_pos = self.write_data(&ARCHIVE_FORMAT_VERSION.to_le_bytes())?;
        let library_pos = self.write_data(&LIBRARY_VERSION.to_le_bytes())?;

        let (root_obj_pos, _) = self.write_object(root)?;

        let archive_meta = self.archive_metadata.serialize();
        let archive_meta_pos = self.write_data(archive_meta.as_bytes())?;

        let ts_data = self.serialize_time_samplings();
        let ts_pos = self.write_data(&ts_data)?;

        let idx_meta = self.serialize_indexed_metadata();
        let idx_meta_pos = self.write_data(&idx_meta)?;

        let root_children = [
            make_data_ref(format_pos),
            make_data_ref(library_pos),
            make_group_ref(root_obj_pos),
            make_data_ref(archive_meta_pos),
            make_data_ref(ts_pos),
            make_data_ref(idx_meta_pos),
        ];
        let root_pos = self.write_group(&root_children)?;

        self.frozen = true;

        self.stream.seek(FROZEN_OFFSET as u64)?;
        self.stream.write_u8(FROZEN_FLAG)?;
        self.stream.seek(ROOT_POS_OFFSET as u64)?;
        self.stream.write_u64(root_pos)?;
        self.stream.seek_end()?;
        self.stream.flush()?;

        tracing::debug!(
            root_pos,
            dedup_hits = self.written_samples.hits(),
            "archive frozen"
        );
        Ok(())
    }

    /// Finalize and close the archive. An archive nothing was written to
    /// gets an empty root object.
    pub fn close(mut self) -> Result<()> {
        if !self.frozen {
            let mut empty_root = OObject::new("");
            self.write_archive(&mut empty_root)?;
        }
        self.stream.flush()?;
        Ok(())
    }

    /// Write one object group: properties compound, child objects, then
    /// the child-headers block with the 32-byte digest suffix.
    fn write_object(&mut self, obj: &OObject) -> Result<(u64, SampleDigest)> {
        let (props_pos, props_digest) = self.write_property_set(&obj.properties)?;

        let mut child_refs = Vec::with_capacity(obj.children.len());
        let mut child_digest_bytes = Vec::with_capacity(obj.children.len() * 16);
        for child in &obj.children {
            let (pos, digest) = self.write_object(child)?;
            child_refs.push(make_group_ref(pos));
            child_digest_bytes.extend_from_slice(&digest);
        }
        let children_digest = if child_digest_bytes.is_empty() {
            [0u8; 16]
        } else {
            digest_bytes(&child_digest_bytes)
        };

        let headers = self.serialize_object_headers(&obj.children, props_digest, children_digest);
        let headers_pos = self.write_data(&headers)?;

        let mut refs = Vec::with_capacity(obj.children.len() + 2);
        refs.push(make_group_ref(props_pos));
        refs.extend_from_slice(&child_refs);
        refs.push(make_data_ref(headers_pos));
        let pos = self.write_group(&refs)?;

        // Digest handed to the parent covers this whole subtree.
        let mut buf = Vec::with_capacity(32 + obj.name.len());
        buf.extend_from_slice(&props_digest);
        buf.extend_from_slice(&children_digest);
        buf.extend_from_slice(obj.meta_data.serialize().as_bytes());
        buf.extend_from_slice(obj.name.as_bytes());
        Ok((pos, digest_bytes(&buf)))
    }

    /// Write a set of sibling properties as one compound group.
    fn write_property_set(&mut self, props: &[OProperty]) -> Result<(u64, SampleDigest)> {
        if props.is_empty() {
            return Ok((0, digest_bytes(&[])));
        }

        let mut refs = Vec::with_capacity(props.len() + 1);
        let mut digests = Vec::with_capacity(props.len() * 16);
        for prop in props {
            let (pos, digest) = self.write_property(prop)?;
            refs.push(make_group_ref(pos));
            digests.extend_from_slice(&digest);
        }

        let headers = self.serialize_property_headers(props);
        let headers_pos = self.write_data(&headers)?;
        refs.push(make_data_ref(headers_pos));

        let pos = self.write_group(&refs)?;
        Ok((pos, digest_bytes(&digests)))
    }

    fn write_property(&mut self, prop: &OProperty) -> Result<(u64, SampleDigest)> {
        let identity = self.property_identity_bytes(prop);
        match &prop.data {
            OPropertyData::Scalar(samples) => {
                self.update_max_samples(prop.time_sampling_index, samples.len() as u32);

                let mut refs = Vec::with_capacity(samples.len());
                let mut buf = identity;
                for sample in samples {
                    let pos = self.write_keyed_data(&sample.data, &sample.key)?;
                    refs.push(make_data_ref(pos));
                    buf.extend_from_slice(&sample.key.digest);
                }
                let pos = self.write_group(&refs)?;
                Ok((pos, digest_bytes(&buf)))
            }
            OPropertyData::Array(samples) => {
                self.update_max_samples(prop.time_sampling_index, samples.len() as u32);

                let mut refs = Vec::with_capacity(samples.len() * 2);
                let mut buf = identity;
                for sample in samples {
                    let data_pos = self.write_keyed_data(&sample.data, &sample.key)?;
                    refs.push(make_data_ref(data_pos));
                    // Rank <= 1 non-string dimensions are recoverable from
                    // the payload size, so only a sentinel is stored.
                    let dims_ref = if sample.dimensions.rank() <= 1
                        && !prop.data_type.pod.is_string()
                    {
                        EMPTY_DATA
                    } else {
                        let dims_data: Vec<u8> = sample
                            .dimensions
                            .sizes()
                            .iter()
                            .flat_map(|d| d.to_le_bytes())
                            .collect();
                        make_data_ref(self.write_data(&dims_data)?)
                    };
                    refs.push(dims_ref);
                    buf.extend_from_slice(&sample.key.digest);
                }
                let pos = self.write_group(&refs)?;
                Ok((pos, digest_bytes(&buf)))
            }
            OPropertyData::Compound(children) => {
                let (pos, set_digest) = self.write_property_set(children)?;
                let mut buf = identity;
                buf.extend_from_slice(&set_digest);
                Ok((pos, digest_bytes(&buf)))
            }
        }
    }

    /// Bytes identifying a property independent of where it lands in the
    /// file: name, metadata, and for leaf properties the data type and
    /// its time sampling.
    fn property_identity_bytes(&self, prop: &OProperty) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(prop.name.as_bytes());
        buf.extend_from_slice(prop.meta_data.serialize().as_bytes());
        if !prop.is_compound() {
            buf.push(prop.data_type.pod as u8);
            buf.push(prop.data_type.extent);
            let ts = self
                .time_samplings
                .get(prop.time_sampling_index as usize)
                .cloned()
                .unwrap_or_else(TimeSampling::identity);
            let (tpc, times) = sampling_record(&ts);
            buf.extend_from_slice(&tpc.to_le_bytes());
            buf.extend_from_slice(&(times.len() as u32).to_le_bytes());
            for t in &times {
                buf.extend_from_slice(&t.to_le_bytes());
            }
        }
        buf
    }

    /// Serialize child-object headers with the digest suffix: per child
    /// a u32 name length, name bytes, and a metadata index; then 16
    /// bytes of properties digest and 16 bytes of children digest.
    fn serialize_object_headers(
        &mut self,
        children: &[OObject],
        props_digest: SampleDigest,
        children_digest: SampleDigest,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        for child in children {
            let name_bytes = child.name.as_bytes();
            buf.extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(name_bytes);

            let meta_idx = self.add_indexed_metadata(&child.meta_data);
            buf.push(meta_idx);
            if meta_idx as u32 == INLINE_META_INDEX {
                let meta = child.meta_data.serialize();
                buf.extend_from_slice(&(meta.len() as u32).to_le_bytes());
                buf.extend_from_slice(meta.as_bytes());
            }
        }
        buf.extend_from_slice(&props_digest);
        buf.extend_from_slice(&children_digest);
        buf
    }

    fn serialize_property_headers(&mut self, props: &[OProperty]) -> Vec<u8> {
        let mut buf = Vec::new();
        for prop in props {
            let meta_idx = self.add_indexed_metadata(&prop.meta_data);
            let info = build_property_info(prop, meta_idx);
            buf.extend_from_slice(&info.to_le_bytes());

            let size_hint = ((info >> SIZE_HINT_SHIFT) & 0x03) as u8;

            if !prop.is_compound() {
                let num_samples = prop.num_samples() as u32;
                write_with_hint(&mut buf, num_samples, size_hint);
                if (info & HAS_CHANGED_BIT) != 0 {
                    write_with_hint(&mut buf, prop.first_changed_index, size_hint);
                    write_with_hint(&mut buf, prop.last_changed_index, size_hint);
                }
                if (info & HAS_TSIDX_BIT) != 0 {
                    write_with_hint(&mut buf, prop.time_sampling_index, size_hint);
                }
            }

            let name_bytes = prop.name.as_bytes();
            write_with_hint(&mut buf, name_bytes.len() as u32, size_hint);
            buf.extend_from_slice(name_bytes);

            if meta_idx as u32 == INLINE_META_INDEX {
                let meta = prop.meta_data.serialize();
                write_with_hint(&mut buf, meta.len() as u32, size_hint);
                buf.extend_from_slice(meta.as_bytes());
            }
        }
        buf
    }

    /// Serialize the time-sampling table. Per record: u32 max-sample
    /// count, f64 time per cycle, u32 stored-time count, then the
    /// stored times. Uniform samplings store exactly their start time.
    /// Acyclic samplings store the [`ACYCLIC_NUM_SAMPLES`] sentinel in
    /// the max-sample column; every stored time is one written sample.
    fn serialize_time_samplings(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for (i, ts) in self.time_samplings.iter().enumerate() {
            let max_sample = if ts.kind.is_acyclic() {
                ACYCLIC_NUM_SAMPLES
            } else {
                self.max_samples.get(i).copied().unwrap_or(0)
            };
            buf.extend_from_slice(&max_sample.to_le_bytes());

            let (tpc, times) = sampling_record(ts);
            buf.extend_from_slice(&tpc.to_le_bytes());
            buf.extend_from_slice(&(times.len() as u32).to_le_bytes());
            for t in &times {
                buf.extend_from_slice(&t.to_le_bytes());
            }
        }
        buf
    }

    /// Serialize the indexed-metadata table, skipping the fixed empty
    /// entry at index 0. Per entry: u8 length plus the serialized text.
    fn serialize_indexed_metadata(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for md in self.indexed_metadata.iter().skip(1) {
            let serialized = md.serialize();
            buf.push(serialized.len() as u8);
            buf.extend_from_slice(serialized.as_bytes());
        }
        buf
    }
}

/// Time per cycle and stored times for serialization and hashing.
fn sampling_record(ts: &TimeSampling) -> (Chrono, Vec<Chrono>) {
    match &ts.kind {
        TimeSamplingKind::Uniform {
            time_per_cycle,
            start_time,
        } => (*time_per_cycle, vec![*start_time]),
        TimeSamplingKind::Cyclic {
            time_per_cycle,
            times,
        } => (*time_per_cycle, times.clone()),
        TimeSamplingKind::Acyclic { times } => (ACYCLIC_TIME_PER_CYCLE, times.clone()),
    }
}

/// Pack the property info word.
fn build_property_info(prop: &OProperty, meta_idx: u8) -> u32 {
    let mut info: u32 = 0;

    let num_samples = prop.num_samples() as u32;
    let max_field = (prop.name.len() as u32)
        .max(prop.meta_data.serialize().len() as u32)
        .max(num_samples)
        .max(prop.time_sampling_index);
    let size_hint: u32 = if max_field >= 65536 {
        2
    } else if max_field > 255 {
        1
    } else {
        0
    };
    info |= size_hint << SIZE_HINT_SHIFT;

    match &prop.data {
        OPropertyData::Compound(_) => {}
        OPropertyData::Scalar(_) => info |= 1,
        OPropertyData::Array(_) => {
            info |= if prop.is_scalar_like { 3 } else { 2 };
        }
    }

    if !prop.is_compound() {
        info |= ((prop.data_type.pod as u32) & 0x0f) << POD_SHIFT;
        info |= ((prop.data_type.extent as u32) & 0xff) << EXTENT_SHIFT;

        if prop.time_sampling_index != 0 {
            info |= HAS_TSIDX_BIT;
        }

        if prop.first_changed_index == 0 && prop.last_changed_index == 0 {
            info |= ALL_SAME_BIT;
        } else if prop.first_changed_index != 1
            || prop.last_changed_index != num_samples.saturating_sub(1)
        {
            info |= HAS_CHANGED_BIT;
        }
    }

    info |= (meta_idx as u32) << META_SHIFT;
    info
}

/// Write a u32 at the width the size hint selects.
fn write_with_hint(buf: &mut Vec<u8>, value: u32, hint: u8) {
    match hint {
        0 => buf.push(value as u8),
        1 => buf.extend_from_slice(&(value as u16).to_le_bytes()),
        _ => buf.extend_from_slice(&value.to_le_bytes()),
    }
}

/// Names are non-empty and unique among siblings; only the archive
/// root may be unnamed.
fn check_name<'a>(
    parent: &str,
    name: &str,
    mut siblings: impl Iterator<Item = &'a str>,
) -> Result<()> {
    if name.is_empty() {
        return Err(Error::EmptyName(parent.to_string()));
    }
    if siblings.any(|s| s == name) {
        return Err(Error::DuplicateName {
            parent: parent.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}

/// 16-byte digest of a byte buffer.
fn digest_bytes(data: &[u8]) -> SampleDigest {
    murmur3::murmur3_x64_128(&mut &data[..], 0)
        .map(|h| h.to_le_bytes())
        .unwrap_or([0; 16])
}

// ============================================================================
// OObject
// ============================================================================

/// One scene object being assembled for writing.
pub struct OObject {
    pub(crate) name: String,
    pub(crate) meta_data: MetaData,
    pub(crate) children: Vec<OObject>,
    pub(crate) properties: Vec<OProperty>,
    sealed: bool,
}

impl OObject {
    /// Create a new object.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            meta_data: MetaData::new(),
            children: Vec::new(),
            properties: Vec::new(),
            sealed: false,
        }
    }

    /// Attach metadata at construction time.
    pub fn with_meta_data(mut self, md: MetaData) -> Self {
        self.meta_data = md;
        self
    }

    /// Object name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Object metadata.
    pub fn meta_data(&self) -> &MetaData {
        &self.meta_data
    }

    /// Number of child objects.
    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    /// Number of properties.
    pub fn num_properties(&self) -> usize {
        self.properties.len()
    }

    fn check_sealed(&self) -> Result<()> {
        if self.sealed {
            return Err(Error::Sealed(self.name.clone()));
        }
        Ok(())
    }

    /// Add a child object and return a handle to it.
    pub fn add_child(&mut self, child: OObject) -> Result<&mut OObject> {
        self.check_sealed()?;
        check_name(
            &self.name,
            &child.name,
            self.children.iter().map(|c| c.name.as_str()),
        )?;
        self.children.push(child);
        let last = self.children.len() - 1;
        Ok(&mut self.children[last])
    }

    /// Add a property and return a handle to it.
    pub fn add_property(&mut self, prop: OProperty) -> Result<&mut OProperty> {
        self.check_sealed()?;
        check_name(
            &self.name,
            &prop.name,
            self.properties.iter().map(|p| p.name.as_str()),
        )?;
        self.properties.push(prop);
        let last = self.properties.len() - 1;
        Ok(&mut self.properties[last])
    }

    /// Create and add a scalar property.
    pub fn add_scalar(&mut self, name: &str, data_type: DataType) -> Result<&mut OProperty> {
        self.add_property(OProperty::scalar(name, data_type))
    }

    /// Create and add an array property.
    pub fn add_array(&mut self, name: &str, data_type: DataType) -> Result<&mut OProperty> {
        self.add_property(OProperty::array(name, data_type))
    }

    /// Create and add a compound property.
    pub fn add_compound(&mut self, name: &str) -> Result<&mut OProperty> {
        self.add_property(OProperty::compound(name))
    }

    /// Find a child object by name.
    pub fn child_by_name(&mut self, name: &str) -> Option<&mut OObject> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Seal the subtree. Mutation after sealing fails with
    /// [`Error::Sealed`].
    pub fn seal(&mut self) {
        self.sealed = true;
        for child in &mut self.children {
            child.seal();
        }
        for prop in &mut self.properties {
            prop.seal();
        }
    }

    /// Whether the subtree has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

// ============================================================================
// OProperty
// ============================================================================

/// One stored sample: payload, shape, and its content key.
#[derive(Clone)]
pub(crate) struct WriteSample {
    pub(crate) data: Arc<Vec<u8>>,
    pub(crate) dimensions: Dimensions,
    pub(crate) key: SampleKey,
}

/// Property payload variants.
pub(crate) enum OPropertyData {
    Scalar(Vec<WriteSample>),
    Array(Vec<WriteSample>),
    Compound(Vec<OProperty>),
}

/// One property being assembled for writing.
pub struct OProperty {
    pub(crate) name: String,
    pub(crate) data_type: DataType,
    pub(crate) meta_data: MetaData,
    pub(crate) time_sampling_index: u32,
    pub(crate) first_changed_index: u32,
    pub(crate) last_changed_index: u32,
    pub(crate) data: OPropertyData,
    pub(crate) is_scalar_like: bool,
    sealed: bool,
}

impl OProperty {
    /// Create a scalar property.
    pub fn scalar(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            meta_data: MetaData::new(),
            time_sampling_index: 0,
            first_changed_index: 0,
            last_changed_index: 0,
            data: OPropertyData::Scalar(Vec::new()),
            is_scalar_like: false,
            sealed: false,
        }
    }

    /// Create an array property.
    pub fn array(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            meta_data: MetaData::new(),
            time_sampling_index: 0,
            first_changed_index: 0,
            last_changed_index: 0,
            data: OPropertyData::Array(Vec::new()),
            is_scalar_like: false,
            sealed: false,
        }
    }

    /// Create an array property that reads back as scalar-like.
    pub fn scalar_like_array(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            is_scalar_like: true,
            ..Self::array(name, data_type)
        }
    }

    /// Create a compound property.
    pub fn compound(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::UNKNOWN,
            meta_data: MetaData::new(),
            time_sampling_index: 0,
            first_changed_index: 0,
            last_changed_index: 0,
            data: OPropertyData::Compound(Vec::new()),
            is_scalar_like: false,
            sealed: false,
        }
    }

    /// Attach metadata at construction time.
    pub fn with_meta_data(mut self, md: MetaData) -> Self {
        self.meta_data = md;
        self
    }

    /// Select the time sampling by table index.
    pub fn with_time_sampling(mut self, index: u32) -> Self {
        self.time_sampling_index = index;
        self
    }

    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Property data type.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.data, OPropertyData::Scalar(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.data, OPropertyData::Array(_))
    }

    pub fn is_compound(&self) -> bool {
        matches!(self.data, OPropertyData::Compound(_))
    }

    /// Number of samples stored so far (0 for compounds).
    pub fn num_samples(&self) -> usize {
        match &self.data {
            OPropertyData::Scalar(s) | OPropertyData::Array(s) => s.len(),
            OPropertyData::Compound(_) => 0,
        }
    }

    fn check_sealed(&self) -> Result<()> {
        if self.sealed {
            return Err(Error::Sealed(self.name.clone()));
        }
        Ok(())
    }

    /// Append a scalar sample.
    pub fn add_scalar_sample(&mut self, payload: &[u8]) -> Result<()> {
        self.check_sealed()?;
        let expected = self.data_type.num_bytes();
        if !self.data_type.pod.is_string() && payload.len() != expected {
            return Err(Error::invalid(format!(
                "scalar sample for {} is {} bytes, type needs {}",
                self.name,
                payload.len(),
                expected
            )));
        }
        let key = SampleKey::compute(self.data_type, &Dimensions::scalar(), payload);
        match &mut self.data {
            OPropertyData::Scalar(samples) => {
                let prev = samples.last().map(|s| s.key);
                samples.push(WriteSample {
                    data: Arc::new(payload.to_vec()),
                    dimensions: Dimensions::scalar(),
                    key,
                });
                let index = samples.len() as u32 - 1;
                self.note_sample(index, key, prev);
                Ok(())
            }
            _ => Err(Error::TypeMismatch {
                expected: "scalar property".into(),
                actual: self.kind_name().into(),
            }),
        }
    }

    /// Append a scalar sample from a typed value.
    pub fn add_scalar_pod<T: bytemuck::Pod>(&mut self, value: &T) -> Result<()> {
        self.add_scalar_sample(bytemuck::bytes_of(value))
    }

    /// Append an array sample with explicit dimensions.
    pub fn add_array_sample(&mut self, payload: &[u8], dimensions: Dimensions) -> Result<()> {
        self.check_sealed()?;
        if !self.data_type.pod.is_string() {
            let expected = dimensions.flat_count() * self.data_type.num_bytes() as u64;
            if payload.len() as u64 != expected {
                return Err(Error::invalid(format!(
                    "array sample for {} is {} bytes, dimensions need {}",
                    self.name,
                    payload.len(),
                    expected
                )));
            }
        }
        let key = SampleKey::compute(self.data_type, &dimensions, payload);
        match &mut self.data {
            OPropertyData::Array(samples) => {
                let prev = samples.last().map(|s| s.key);
                samples.push(WriteSample {
                    data: Arc::new(payload.to_vec()),
                    dimensions,
                    key,
                });
                let index = samples.len() as u32 - 1;
                self.note_sample(index, key, prev);
                Ok(())
            }
            _ => Err(Error::TypeMismatch {
                expected: "array property".into(),
                actual: self.kind_name().into(),
            }),
        }
    }

    /// Append a rank-1 array sample from a typed slice.
    pub fn add_array_pod<T: bytemuck::Pod>(&mut self, values: &[T]) -> Result<()> {
        let count = values.len() as u64 / self.data_type.extent.max(1) as u64;
        self.add_array_sample(bytemuck::cast_slice(values), Dimensions::d1(count))
    }

    /// Repeat the previous sample without copying or rehashing its
    /// payload.
    pub fn set_from_previous(&mut self) -> Result<()> {
        self.check_sealed()?;
        match &mut self.data {
            OPropertyData::Scalar(samples) | OPropertyData::Array(samples) => {
                let last = samples
                    .last()
                    .cloned()
                    .ok_or_else(|| Error::invalid("set_from_previous with no prior sample"))?;
                samples.push(last);
                Ok(())
            }
            OPropertyData::Compound(_) => Err(Error::TypeMismatch {
                expected: "sampled property".into(),
                actual: "compound property".into(),
            }),
        }
    }

    /// Add a child property (compounds only).
    pub fn add_child(&mut self, prop: OProperty) -> Result<&mut OProperty> {
        self.check_sealed()?;
        let kind = self.kind_name();
        match &mut self.data {
            OPropertyData::Compound(children) => {
                check_name(&self.name, &prop.name, children.iter().map(|c| c.name.as_str()))?;
                children.push(prop);
                let last = children.len() - 1;
                Ok(&mut children[last])
            }
            _ => Err(Error::TypeMismatch {
                expected: "compound property".into(),
                actual: kind.into(),
            }),
        }
    }

    /// Find or create a scalar child (compounds only).
    pub fn get_or_create_scalar(
        &mut self,
        name: &str,
        data_type: DataType,
    ) -> Result<&mut OProperty> {
        self.check_sealed()?;
        if name.is_empty() {
            return Err(Error::EmptyName(self.name.clone()));
        }
        let kind = self.kind_name();
        match &mut self.data {
            OPropertyData::Compound(children) => {
                if let Some(idx) = children.iter().position(|p| p.name == name) {
                    return Ok(&mut children[idx]);
                }
                children.push(OProperty::scalar(name, data_type));
                let last = children.len() - 1;
                Ok(&mut children[last])
            }
            _ => Err(Error::TypeMismatch {
                expected: "compound property".into(),
                actual: kind.into(),
            }),
        }
    }

    /// Find or create an array child (compounds only).
    pub fn get_or_create_array(
        &mut self,
        name: &str,
        data_type: DataType,
    ) -> Result<&mut OProperty> {
        self.check_sealed()?;
        if name.is_empty() {
            return Err(Error::EmptyName(self.name.clone()));
        }
        let kind = self.kind_name();
        match &mut self.data {
            OPropertyData::Compound(children) => {
                if let Some(idx) = children.iter().position(|p| p.name == name) {
                    return Ok(&mut children[idx]);
                }
                children.push(OProperty::array(name, data_type));
                let last = children.len() - 1;
                Ok(&mut children[last])
            }
            _ => Err(Error::TypeMismatch {
                expected: "compound property".into(),
                actual: kind.into(),
            }),
        }
    }

    /// Changed-index bookkeeping: a sample whose key differs from its
    /// predecessor widens the [first, last] changed range.
    fn note_sample(&mut self, index: u32, key: SampleKey, prev: Option<SampleKey>) {
        if index == 0 {
            return;
        }
        if prev.map_or(true, |p| p != key) {
            if self.first_changed_index == 0 {
                self.first_changed_index = index;
            }
            self.last_changed_index = index;
        }
    }

    fn kind_name(&self) -> &'static str {
        match self.data {
            OPropertyData::Scalar(_) => "scalar property",
            OPropertyData::Array(_) => "array property",
            OPropertyData::Compound(_) => "compound property",
        }
    }

    fn seal(&mut self) {
        self.sealed = true;
        if let OPropertyData::Compound(children) = &mut self.data {
            for child in children {
                child.seal();
            }
        }
    }

    /// Whether this property has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::reader::VaultArchive;
    use tempfile::NamedTempFile;

    fn temp_path() -> NamedTempFile {
        NamedTempFile::new().unwrap()
    }

    #[test]
    fn header_is_patched_on_finalize() {
        let file = temp_path();
        let mut archive = OArchive::create(file.path()).unwrap();
        let mut root = OObject::new("");
        archive.write_archive(&mut root).unwrap();

        let bytes = std::fs::read(file.path()).unwrap();
        assert_eq!(&bytes[0..5], VAULT_MAGIC);
        assert_eq!(bytes[FROZEN_OFFSET], FROZEN_FLAG);
        let version = u16::from_le_bytes([bytes[6], bytes[7]]);
        assert_eq!(version, CURRENT_VERSION);
        let root_pos = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        assert!(root_pos >= HEADER_SIZE as u64);
    }

    #[test]
    fn written_archive_reopens_with_six_root_children() {
        let file = temp_path();
        let mut archive = OArchive::create(file.path()).unwrap();
        let mut root = OObject::new("");
        root.add_child(OObject::new("body")).unwrap();
        archive.write_archive(&mut root).unwrap();

        let vault = VaultArchive::open(file.path()).unwrap();
        assert_eq!(vault.root().num_children(), 6);
    }

    #[test]
    fn identical_samples_share_one_block() {
        let file = temp_path();
        let mut archive = OArchive::create(file.path()).unwrap();
        let mut root = OObject::new("");
        let prop = root
            .add_scalar("value", crate::util::DataType::FLOAT32)
            .unwrap();
        prop.add_scalar_pod(&1.5f32).unwrap();
        prop.add_scalar_pod(&1.5f32).unwrap();
        prop.add_scalar_pod(&1.5f32).unwrap();
        archive.write_archive(&mut root).unwrap();

        assert_eq!(archive.dedup_hits(), 2);
    }

    #[test]
    fn dedup_can_be_disabled() {
        let file = temp_path();
        let mut archive = OArchive::create(file.path()).unwrap();
        archive.set_dedup_enabled(false);
        let mut root = OObject::new("");
        let prop = root
            .add_scalar("value", crate::util::DataType::INT32)
            .unwrap();
        prop.add_scalar_pod(&7i32).unwrap();
        prop.add_scalar_pod(&7i32).unwrap();
        archive.write_archive(&mut root).unwrap();

        assert_eq!(archive.dedup_hits(), 0);
    }

    #[test]
    fn sealed_object_rejects_mutation() {
        let mut root = OObject::new("");
        root.add_child(OObject::new("a")).unwrap();
        root.seal();

        assert!(matches!(
            root.add_child(OObject::new("b")),
            Err(Error::Sealed(_))
        ));
        let child = root.child_by_name("a").unwrap();
        assert!(matches!(
            child.add_scalar("p", crate::util::DataType::INT32),
            Err(Error::Sealed(_))
        ));
    }

    #[test]
    fn frozen_archive_rejects_writes() {
        let file = temp_path();
        let mut archive = OArchive::create(file.path()).unwrap();
        let mut root = OObject::new("");
        archive.write_archive(&mut root).unwrap();

        assert!(matches!(archive.write_data(b"late"), Err(Error::Frozen)));
        assert!(matches!(
            archive.write_group(&[EMPTY_DATA]),
            Err(Error::Frozen)
        ));
        let mut again = OObject::new("");
        assert!(matches!(
            archive.write_archive(&mut again),
            Err(Error::Frozen)
        ));
    }

    #[test]
    fn changed_indices_track_sample_keys() {
        let mut prop = OProperty::scalar("v", crate::util::DataType::INT32);
        prop.add_scalar_pod(&1i32).unwrap();
        prop.add_scalar_pod(&1i32).unwrap();
        prop.add_scalar_pod(&1i32).unwrap();
        // All identical: the constant range stays (0, 0).
        assert_eq!(prop.first_changed_index, 0);
        assert_eq!(prop.last_changed_index, 0);

        prop.add_scalar_pod(&2i32).unwrap();
        assert_eq!(prop.first_changed_index, 3);
        assert_eq!(prop.last_changed_index, 3);

        prop.set_from_previous().unwrap();
        assert_eq!(prop.num_samples(), 5);
        assert_eq!(prop.last_changed_index, 3);
    }

    #[test]
    fn time_sampling_table_deduplicates() {
        let file = temp_path();
        let mut archive = OArchive::create(file.path()).unwrap();
        let ts = TimeSampling::uniform(1.0 / 24.0, 0.0);
        let a = archive.add_time_sampling(ts.clone());
        let b = archive.add_time_sampling(ts);
        assert_eq!(a, 1);
        assert_eq!(b, 1);
        assert_eq!(archive.add_time_sampling(TimeSampling::identity()), 0);
    }

    #[test]
    fn oversized_metadata_falls_back_to_inline() {
        let file = temp_path();
        let mut archive = OArchive::create(file.path()).unwrap();
        let mut md = MetaData::new();
        md.set("big", "x".repeat(400)).unwrap();
        assert_eq!(archive.add_indexed_metadata(&md), INLINE_META_INDEX as u8);

        let mut small = MetaData::new();
        small.set("k", "v").unwrap();
        let idx = archive.add_indexed_metadata(&small);
        assert_eq!(idx, 1);
        assert_eq!(archive.add_indexed_metadata(&small), idx);
    }

    #[test]
    fn sibling_names_must_be_unique_and_non_empty() {
        let mut root = OObject::new("");
        root.add_child(OObject::new("twin")).unwrap();
        assert!(matches!(
            root.add_child(OObject::new("twin")),
            Err(Error::DuplicateName { .. })
        ));
        assert!(matches!(
            root.add_child(OObject::new("")),
            Err(Error::EmptyName(_))
        ));

        root.add_scalar("v", crate::util::DataType::INT32).unwrap();
        assert!(matches!(
            root.add_scalar("v", crate::util::DataType::INT32),
            Err(Error::DuplicateName { .. })
        ));
        assert!(matches!(
            root.add_array("", crate::util::DataType::FLOAT32),
            Err(Error::EmptyName(_))
        ));

        let nested = root.add_compound("geo").unwrap();
        nested
            .add_child(OProperty::scalar("w", crate::util::DataType::BOOL))
            .unwrap();
        assert!(matches!(
            nested.add_child(OProperty::scalar("w", crate::util::DataType::BOOL)),
            Err(Error::DuplicateName { .. })
        ));
        assert!(matches!(
            nested.get_or_create_scalar("", crate::util::DataType::BOOL),
            Err(Error::EmptyName(_))
        ));
        assert!(matches!(
            nested.get_or_create_array("", crate::util::DataType::FLOAT32),
            Err(Error::EmptyName(_))
        ));
    }

    #[test]
    fn leaf_property_rejects_children() {
        let mut prop = OProperty::scalar("v", crate::util::DataType::INT32);
        assert!(matches!(
            prop.add_child(OProperty::compound("c")),
            Err(Error::TypeMismatch { ref actual, .. }) if actual == "scalar property"
        ));
        assert!(matches!(
            prop.get_or_create_scalar("c", crate::util::DataType::INT32),
            Err(Error::TypeMismatch { .. })
        ));

        let mut arr = OProperty::array("a", crate::util::DataType::FLOAT32);
        assert!(matches!(
            arr.get_or_create_array("c", crate::util::DataType::FLOAT32),
            Err(Error::TypeMismatch { ref actual, .. }) if actual == "array property"
        ));
    }

    #[test]
    fn mismatched_sample_size_is_rejected() {
        let mut prop = OProperty::scalar("v", crate::util::DataType::FLOAT64);
        assert!(prop.add_scalar_sample(&[0u8; 4]).is_err());

        let mut arr = OProperty::array("a", crate::util::DataType::FLOAT32);
        assert!(arr.add_array_sample(&[0u8; 5], Dimensions::d1(2)).is_err());
    }

    #[test]
    fn set_from_previous_reuses_payload() {
        let mut prop = OProperty::array("pts", crate::util::DataType::VEC3F);
        let values = [1.0f32; 9];
        prop.add_array_pod(&values).unwrap();
        prop.set_from_previous().unwrap();
        assert_eq!(prop.num_samples(), 2);
        if let OPropertyData::Array(samples) = &prop.data {
            assert!(Arc::ptr_eq(&samples[0].data, &samples[1].data));
            assert_eq!(samples[0].key, samples[1].key);
        } else {
            panic!("expected array data");
        }
    }
}
