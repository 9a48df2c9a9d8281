//! Parsers for the vault's packed table blocks: time samplings, indexed
//! metadata, object headers, property headers.

use super::reader::IData;
use crate::core::{
    MetaData, ObjectHeader, PropertyHeader, PropertyType, SampleDigest, TimeSampling,
    ACYCLIC_NUM_SAMPLES, ACYCLIC_TIME_PER_CYCLE,
};
use crate::util::{DataType, Error, PodType, Result};

// === Property info word layout ===
// bits 0-1   kind: 0 compound, 1 scalar, 2 array, 3 scalar-like array
// bits 2-3   size hint for variable-width fields: 0 u8, 1 u16, 2 u32
// bits 4-7   POD tag
// bit 8      time-sampling index follows
// bit 9      explicit first/last changed indices follow
// bit 11     all samples identical
// bits 12-19 extent
// bits 20-27 metadata index (0xFF = inline)

pub(crate) const KIND_MASK: u32 = 0x0003;
pub(crate) const SIZE_HINT_SHIFT: u32 = 2;
pub(crate) const SIZE_HINT_MASK: u32 = 0x000c;
pub(crate) const POD_SHIFT: u32 = 4;
pub(crate) const POD_MASK: u32 = 0x00f0;
pub(crate) const HAS_TSIDX_BIT: u32 = 1 << 8;
pub(crate) const HAS_CHANGED_BIT: u32 = 1 << 9;
pub(crate) const ALL_SAME_BIT: u32 = 1 << 11;
pub(crate) const EXTENT_SHIFT: u32 = 12;
pub(crate) const EXTENT_MASK: u32 = 0xff000;
pub(crate) const META_SHIFT: u32 = 20;
pub(crate) const META_MASK: u32 = 0xff0_0000;

/// Inline-metadata marker for the one-byte / packed metadata index.
pub const INLINE_META_INDEX: u32 = 0xff;

/// Interned metadata table caps: at most 254 entries of at most 255 bytes.
pub const MAX_INDEXED_META_ENTRIES: usize = 254;
pub const MAX_INDEXED_META_BYTES: usize = 255;

// ============================================================================
// Time sampling table
// ============================================================================

/// Read the time-sampling table: per record a u32 max-sample count, f64
/// time-per-cycle (acyclic sentinel), u32 stored-time count, and the times.
pub fn read_time_samplings_and_max(data: &IData) -> Result<(Vec<TimeSampling>, Vec<u32>)> {
    let mut samplings = Vec::new();
    let mut max_samples = Vec::new();

    if data.is_empty() {
        return Ok((samplings, max_samples));
    }

    let buf = data.read_all()?;
    let buf_size = buf.len();
    let mut pos = 0;

    while pos < buf_size {
        if pos + 4 + 8 + 4 > buf_size {
            return Err(Error::invalid("time sampling record truncated"));
        }

        let max_sample = read_u32_le(&buf[pos..]);
        pos += 4;

        let tpc = read_f64_le(&buf[pos..]);
        pos += 8;

        let num_times = read_u32_le(&buf[pos..]) as usize;
        pos += 4;

        if num_times == 0 || pos + 8 * num_times > buf_size {
            return Err(Error::invalid("time sampling stored times invalid"));
        }

        let mut times = Vec::with_capacity(num_times);
        for _ in 0..num_times {
            times.push(read_f64_le(&buf[pos..]));
            pos += 8;
        }

        // Acyclic records carry the sentinel max-sample count; each
        // stored time is one written sample.
        max_samples.push(if max_sample == ACYCLIC_NUM_SAMPLES {
            num_times as u32
        } else {
            max_sample
        });

        let ts = if tpc >= ACYCLIC_TIME_PER_CYCLE {
            TimeSampling::acyclic(times)
        } else if num_times == 1 {
            // Uniform stores exactly its start time.
            TimeSampling::uniform(tpc, times[0])
        } else {
            TimeSampling::cyclic(tpc, times)
        };

        samplings.push(ts);
    }

    Ok((samplings, max_samples))
}

// ============================================================================
// Indexed metadata table
// ============================================================================

/// Read the interned metadata table. Index 0 is implicitly empty metadata.
pub fn read_indexed_metadata(data: &IData) -> Result<Vec<MetaData>> {
    let mut table = Vec::new();
    table.push(MetaData::new());

    if data.is_empty() {
        return Ok(table);
    }

    if data.size() as usize > (MAX_INDEXED_META_ENTRIES + 1) * (MAX_INDEXED_META_BYTES + 1) {
        return Err(Error::invalid("indexed metadata table too large"));
    }

    let buf = data.read_all()?;
    let buf_size = buf.len();
    let mut pos = 0;

    while pos < buf_size {
        let entry_size = buf[pos] as usize;
        pos += 1;

        if pos + entry_size > buf_size {
            return Err(Error::invalid("indexed metadata entry truncated"));
        }

        if entry_size == 0 {
            table.push(MetaData::new());
        } else {
            let entry = std::str::from_utf8(&buf[pos..pos + entry_size])
                .map_err(|e| Error::invalid(format!("invalid UTF-8 in metadata: {e}")))?;
            pos += entry_size;
            table.push(MetaData::parse(entry));
        }
    }

    Ok(table)
}

// ============================================================================
// Object headers
// ============================================================================

/// Read an object group's child-headers block: per child a u32 name
/// length, the name, and a metadata index byte (0xFF means a u32 length
/// plus inline metadata string follow). The block ends with the owning
/// object's two 16-byte aggregate hashes.
pub fn read_object_headers(
    data: &IData,
    parent_full_name: &str,
    indexed_metadata: &[MetaData],
) -> Result<(Vec<ObjectHeader>, SampleDigest, SampleDigest)> {
    let total_size = data.size() as usize;
    if total_size < 32 {
        return Err(Error::invalid("object headers block missing hash suffix"));
    }

    let buf = data.read_all()?;
    let (buf, hashes) = buf.split_at(total_size - 32);
    let mut properties_hash = [0u8; 16];
    let mut children_hash = [0u8; 16];
    properties_hash.copy_from_slice(&hashes[..16]);
    children_hash.copy_from_slice(&hashes[16..]);

    let buf_size = buf.len();
    let mut headers = Vec::new();
    let mut pos = 0;

    while pos < buf_size {
        if pos + 4 > buf_size {
            return Err(Error::invalid("object header name length truncated"));
        }

        let name_size = read_u32_le(&buf[pos..]) as usize;
        pos += 4;

        if name_size == 0 || pos + name_size + 1 > buf_size {
            return Err(Error::invalid("object header name invalid"));
        }

        let name = std::str::from_utf8(&buf[pos..pos + name_size])
            .map_err(|e| Error::invalid(format!("invalid UTF-8 in object name: {e}")))?
            .to_string();
        pos += name_size;

        let metadata_index = buf[pos] as u32;
        pos += 1;

        let metadata = if metadata_index == INLINE_META_INDEX {
            if pos + 4 > buf_size {
                return Err(Error::invalid("object header metadata length truncated"));
            }
            let metadata_size = read_u32_le(&buf[pos..]) as usize;
            pos += 4;

            if pos + metadata_size > buf_size {
                return Err(Error::invalid("object header metadata truncated"));
            }
            let s = std::str::from_utf8(&buf[pos..pos + metadata_size])
                .map_err(|e| Error::invalid(format!("invalid UTF-8 in metadata: {e}")))?;
            pos += metadata_size;
            MetaData::parse(s)
        } else {
            lookup_indexed(indexed_metadata, metadata_index)?
        };

        let full_name = if parent_full_name.is_empty() || parent_full_name == "/" {
            format!("/{name}")
        } else {
            format!("{parent_full_name}/{name}")
        };

        headers.push(ObjectHeader::with_meta_data(name, full_name, metadata));
    }

    Ok((headers, properties_hash, children_hash))
}

// ============================================================================
// Property headers
// ============================================================================

/// Read a compound's property-headers block.
pub fn read_property_headers(
    data: &IData,
    indexed_metadata: &[MetaData],
) -> Result<Vec<PropertyHeader>> {
    let mut headers = Vec::new();

    if data.is_empty() {
        return Ok(headers);
    }

    let buf = data.read_all()?;
    let buf_size = buf.len();
    let mut pos = 0;

    while pos < buf_size {
        if pos + 4 > buf_size {
            return Err(Error::invalid("property header info word truncated"));
        }

        let info = read_u32_le(&buf[pos..]);
        pos += 4;

        let kind = info & KIND_MASK;
        let is_scalar_like = kind == 3;
        let property_type = match kind {
            0 => PropertyType::Compound,
            1 => PropertyType::Scalar,
            _ => PropertyType::Array,
        };

        let size_hint = (info & SIZE_HINT_MASK) >> SIZE_HINT_SHIFT;

        let mut data_type = DataType::UNKNOWN;
        let mut time_sampling_index = 0;
        let mut num_samples = 0;
        let mut first_changed_index = 0;
        let mut last_changed_index = 0;

        if property_type != PropertyType::Compound {
            let pod_tag = ((info & POD_MASK) >> POD_SHIFT) as u8;
            let pod = PodType::from_u8(pod_tag);
            if pod == PodType::Unknown {
                return Err(Error::invalid(format!("invalid POD tag: {pod_tag}")));
            }

            let extent = ((info & EXTENT_MASK) >> EXTENT_SHIFT) as u8;
            data_type = DataType::new(pod, extent);

            num_samples = get_u32_with_hint(buf.as_slice(), size_hint, &mut pos)?;

            (first_changed_index, last_changed_index) = if (info & HAS_CHANGED_BIT) != 0 {
                let first = get_u32_with_hint(buf.as_slice(), size_hint, &mut pos)?;
                let last = get_u32_with_hint(buf.as_slice(), size_hint, &mut pos)?;
                (first, last)
            } else if (info & ALL_SAME_BIT) != 0 {
                (0, 0)
            } else {
                (1, num_samples.saturating_sub(1))
            };

            if (info & HAS_TSIDX_BIT) != 0 {
                time_sampling_index = get_u32_with_hint(buf.as_slice(), size_hint, &mut pos)?;
            }
        }

        let name_size = get_u32_with_hint(buf.as_slice(), size_hint, &mut pos)? as usize;
        if name_size == 0 || pos + name_size > buf_size {
            return Err(Error::invalid("property header name invalid"));
        }

        let name = std::str::from_utf8(&buf[pos..pos + name_size])
            .map_err(|e| Error::invalid(format!("invalid UTF-8 in property name: {e}")))?
            .to_string();
        pos += name_size;

        let metadata_index = (info & META_MASK) >> META_SHIFT;
        let meta_data = if metadata_index == INLINE_META_INDEX {
            let metadata_size = get_u32_with_hint(buf.as_slice(), size_hint, &mut pos)? as usize;
            if pos + metadata_size > buf_size {
                return Err(Error::invalid("property header metadata truncated"));
            }
            let parsed = if metadata_size == 0 {
                MetaData::new()
            } else {
                let s = std::str::from_utf8(&buf[pos..pos + metadata_size])
                    .map_err(|e| Error::invalid(format!("invalid UTF-8 in metadata: {e}")))?;
                MetaData::parse(s)
            };
            pos += metadata_size;
            parsed
        } else {
            lookup_indexed(indexed_metadata, metadata_index)?
        };

        headers.push(PropertyHeader {
            name,
            property_type,
            data_type,
            time_sampling_index,
            meta_data,
            num_samples,
            first_changed_index,
            last_changed_index,
            is_scalar_like,
        });
    }

    Ok(headers)
}

fn lookup_indexed(table: &[MetaData], index: u32) -> Result<MetaData> {
    table
        .get(index as usize)
        .cloned()
        .ok_or_else(|| Error::invalid(format!("metadata index {index} outside interned table")))
}

/// Read a u32 stored at the width given by the header's size hint.
fn get_u32_with_hint(buf: &[u8], size_hint: u32, pos: &mut usize) -> Result<u32> {
    let value = match size_hint {
        0 => {
            if *pos + 1 > buf.len() {
                return Err(Error::invalid("truncated u8 in property header"));
            }
            let v = buf[*pos] as u32;
            *pos += 1;
            v
        }
        1 => {
            if *pos + 2 > buf.len() {
                return Err(Error::invalid("truncated u16 in property header"));
            }
            let v = u16::from_le_bytes([buf[*pos], buf[*pos + 1]]) as u32;
            *pos += 2;
            v
        }
        2 => {
            if *pos + 4 > buf.len() {
                return Err(Error::invalid("truncated u32 in property header"));
            }
            let v = read_u32_le(&buf[*pos..]);
            *pos += 4;
            v
        }
        _ => return Err(Error::invalid("invalid size hint")),
    };
    Ok(value)
}

#[inline]
fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[inline]
fn read_f64_le(bytes: &[u8]) -> f64 {
    f64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u32_le() {
        let bytes = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(read_u32_le(&bytes), 0x04030201);
    }

    #[test]
    fn test_read_f64_le() {
        let bytes = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF0, 0x3F];
        assert_eq!(read_f64_le(&bytes), 1.0);
    }

    #[test]
    fn test_size_hint_widths() {
        let buf = [7u8, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut pos = 0;
        assert_eq!(get_u32_with_hint(&buf, 0, &mut pos).unwrap(), 7);
        assert_eq!(get_u32_with_hint(&buf, 1, &mut pos).unwrap(), 0x1234);
        assert_eq!(get_u32_with_hint(&buf, 2, &mut pos).unwrap(), 0x12345678);
        assert_eq!(pos, 7);
        assert!(get_u32_with_hint(&buf, 3, &mut pos).is_err());
    }
}
