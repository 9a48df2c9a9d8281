//! Low-level vault readers: groups, data blocks, archive header.

use std::path::Path;
use std::sync::Arc;

use super::format::*;
use super::pool::{ReadStream, StreamPool};
use crate::util::{Error, Result};

/// Low-level archive reader: header plus the root group.
pub struct VaultArchive {
    pool: Arc<StreamPool>,
    root: IGroup,
}

impl VaultArchive {
    /// Open a file memory-mapped.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_pool(StreamPool::open(path)?)
    }

    /// Open a file through N pooled handles.
    pub fn open_with_streams(path: impl AsRef<Path>, num_streams: usize) -> Result<Self> {
        Self::from_pool(StreamPool::open_with_streams(path, num_streams)?)
    }

    /// Open from caller-owned streams.
    pub fn from_streams(sources: Vec<Box<dyn ReadStream>>) -> Result<Self> {
        Self::from_pool(StreamPool::from_streams(sources)?)
    }

    fn from_pool(pool: StreamPool) -> Result<Self> {
        let pool = Arc::new(pool);
        let root_pos = pool.root_pos()?;
        let root = IGroup::new(pool.clone(), root_pos)?;
        Ok(Self { pool, root })
    }

    /// Whether the archive was finalized.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.pool.is_frozen()
    }

    /// Container format version.
    #[inline]
    pub fn version(&self) -> u16 {
        self.pool.version()
    }

    /// The root group.
    #[inline]
    pub fn root(&self) -> &IGroup {
        &self.root
    }

    /// The underlying stream pool.
    #[inline]
    pub fn pool(&self) -> &Arc<StreamPool> {
        &self.pool
    }
}

/// A group node: u64 child count followed by child references.
#[derive(Clone)]
pub struct IGroup {
    pool: Arc<StreamPool>,
    pos: u64,
    child_refs: Vec<u64>,
}

impl IGroup {
    /// Read a group's child table at the given position.
    /// Position 0 is the empty-group sentinel.
    pub fn new(pool: Arc<StreamPool>, pos: u64) -> Result<Self> {
        let child_refs = if pos == 0 {
            Vec::new()
        } else {
            let mut lease = pool.lease();
            let num_children = lease.read_u64(pos)?;
            let remaining = pool.size().saturating_sub(pos + 8);
            if num_children.checked_mul(8).map_or(true, |n| n > remaining) {
                return Err(Error::invalid(format!(
                    "group at {pos} claims {num_children} children past end of file"
                )));
            }
            let table = lease.read_bytes(pos + 8, num_children as usize * 8)?;
            table
                .chunks_exact(8)
                .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect()
        };

        Ok(Self { pool, pos, child_refs })
    }

    /// Byte position of this group in the file.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Number of children.
    #[inline]
    pub fn num_children(&self) -> u64 {
        self.child_refs.len() as u64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.child_refs.is_empty()
    }

    /// The raw reference for a child (group/data bit included).
    pub fn child_ref(&self, index: u64) -> Result<u64> {
        self.child_refs
            .get(index as usize)
            .copied()
            .ok_or(Error::ChildOutOfBounds {
                index: index as usize,
                count: self.child_refs.len(),
            })
    }

    pub fn is_child_group(&self, index: u64) -> Result<bool> {
        Ok(is_group_ref(self.child_ref(index)?))
    }

    pub fn is_child_data(&self, index: u64) -> Result<bool> {
        Ok(is_data_ref(self.child_ref(index)?))
    }

    pub fn is_empty_child_data(&self, index: u64) -> Result<bool> {
        let r = self.child_ref(index)?;
        Ok(is_data_ref(r) && is_empty_ref(r))
    }

    /// Get a child group.
    pub fn group(&self, index: u64) -> Result<IGroup> {
        let r = self.child_ref(index)?;
        if !is_group_ref(r) {
            return Err(Error::TypeMismatch {
                expected: "group".to_string(),
                actual: "data".to_string(),
            });
        }
        IGroup::new(self.pool.clone(), extract_offset(r))
    }

    /// Get child data.
    pub fn data(&self, index: u64) -> Result<IData> {
        let r = self.child_ref(index)?;
        if !is_data_ref(r) {
            return Err(Error::TypeMismatch {
                expected: "data".to_string(),
                actual: "group".to_string(),
            });
        }
        IData::new(self.pool.clone(), extract_offset(r))
    }

    /// Iterate over all children.
    pub fn children(&self) -> impl Iterator<Item = Result<IChild>> + '_ {
        (0..self.num_children()).map(move |i| {
            let r = self.child_ref(i)?;
            let pos = extract_offset(r);
            if is_group_ref(r) {
                Ok(IChild::Group(IGroup::new(self.pool.clone(), pos)?))
            } else {
                Ok(IChild::Data(IData::new(self.pool.clone(), pos)?))
            }
        })
    }
}

/// A child node - either a group or a data block.
pub enum IChild {
    Group(IGroup),
    Data(IData),
}

impl IChild {
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data(_))
    }

    pub fn as_group(&self) -> Option<&IGroup> {
        match self {
            Self::Group(g) => Some(g),
            Self::Data(_) => None,
        }
    }

    pub fn as_data(&self) -> Option<&IData> {
        match self {
            Self::Data(d) => Some(d),
            Self::Group(_) => None,
        }
    }
}

/// A data block: u64 byte length followed by the payload.
pub struct IData {
    pool: Arc<StreamPool>,
    pos: u64,
    size: u64,
}

impl IData {
    /// Read a data block's length at the given position.
    /// Position 0 is the empty-data sentinel.
    pub fn new(pool: Arc<StreamPool>, pos: u64) -> Result<Self> {
        let size = if pos == 0 { 0 } else { pool.read_u64(pos)? };
        Ok(Self { pool, pos, size })
    }

    /// Byte position of this block in the file.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Declared payload size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Position of the payload bytes (after the length field).
    #[inline]
    pub fn payload_pos(&self) -> u64 {
        if self.pos == 0 {
            0
        } else {
            self.pos + 8
        }
    }

    /// Read the whole payload.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        if self.size == 0 {
            return Ok(Vec::new());
        }
        self.pool.read_bytes(self.payload_pos(), self.size as usize)
    }

    /// Read part of the payload into a caller buffer, returning the byte
    /// count transferred. A request running past the declared size
    /// transfers nothing and returns 0.
    pub fn read_range(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let end = match offset.checked_add(buf.len() as u64) {
            Some(end) => end,
            None => return Ok(0),
        };
        if end > self.size {
            return Ok(0);
        }
        self.pool
            .lease()
            .read_into(self.payload_pos() + offset, buf)?;
        Ok(buf.len())
    }

    /// Read the payload as a UTF-8 string, trimming a trailing null.
    pub fn read_string(&self) -> Result<String> {
        let bytes = self.read_all()?;
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8(bytes[..len].to_vec())?)
    }
}
