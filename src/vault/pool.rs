//! Read stream pool.
//!
//! A pool holds N interchangeable sources over the same bytes: either one
//! shared memory map (positional reads, no cursor, no locking) or N
//! independently seekable streams. Readers take an RAII [`StreamLease`] and
//! own one slot for the lease's lifetime, so concurrent readers never fight
//! over a seek cursor. A one-slot pool serializes readers; that is degraded
//! mode, not an error.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use memmap2::Mmap;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::format::*;
use crate::util::{Error, Result};

/// Object-safe bound for caller-supplied read streams.
pub trait ReadStream: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadStream for T {}

enum PoolSource {
    /// One shared memory map.
    Mmap(Mmap),
    /// N seekable streams over identical bytes.
    Streams(Vec<Mutex<Box<dyn ReadStream>>>),
}

/// Pooled read access to one archive's bytes, plus the parsed header.
pub struct StreamPool {
    source: PoolSource,
    next_slot: AtomicUsize,
    size: u64,
    version: u16,
    frozen: bool,
}

impl StreamPool {
    /// Open a file memory-mapped (the default read mode).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = open_file(path)?;
        let size = file.metadata()?.len();
        if size < HEADER_SIZE as u64 {
            return Err(Error::UnexpectedEof(size));
        }

        // Safety: the file is opened read-only; truncation by another
        // process while mapped is outside the format's guarantees.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapFailed(e.to_string()))?;
        let (version, frozen) = parse_header(&mmap)?;
        if !frozen {
            warn!(path = %path.display(), "archive was never finalized");
        }
        debug!(size, version, frozen, "opened mmap stream pool");

        Ok(Self {
            source: PoolSource::Mmap(mmap),
            next_slot: AtomicUsize::new(0),
            size,
            version,
            frozen,
        })
    }

    /// Open a file with `num_streams` independent handles instead of a map.
    pub fn open_with_streams(path: impl AsRef<Path>, num_streams: usize) -> Result<Self> {
        let path = path.as_ref();
        let num_streams = num_streams.max(1);
        let mut streams: Vec<Mutex<Box<dyn ReadStream>>> = Vec::with_capacity(num_streams);
        for _ in 0..num_streams {
            streams.push(Mutex::new(Box::new(open_file(path)?)));
        }
        let size = open_file(path)?.metadata()?.len();
        Self::from_parts(streams, size)
    }

    /// Build a pool from caller-owned streams over identical bytes.
    pub fn from_streams(sources: Vec<Box<dyn ReadStream>>) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::other("stream pool needs at least one stream"));
        }
        let mut sources = sources;
        let size = sources[0].seek(SeekFrom::End(0))?;
        let streams = sources.into_iter().map(Mutex::new).collect();
        Self::from_parts(streams, size)
    }

    fn from_parts(streams: Vec<Mutex<Box<dyn ReadStream>>>, size: u64) -> Result<Self> {
        if size < HEADER_SIZE as u64 {
            return Err(Error::UnexpectedEof(size));
        }

        let mut header = [0u8; HEADER_SIZE];
        {
            let mut first = streams[0].lock();
            first.seek(SeekFrom::Start(0))?;
            first.read_exact(&mut header)?;
        }
        let (version, frozen) = parse_header(&header)?;
        if !frozen {
            warn!("archive was never finalized");
        }
        debug!(
            size,
            version,
            frozen,
            slots = streams.len(),
            "opened seekable stream pool"
        );

        Ok(Self {
            source: PoolSource::Streams(streams),
            next_slot: AtomicUsize::new(0),
            size,
            version,
            frozen,
        })
    }

    /// Total byte size of the archive.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Container format version from the header.
    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Whether the archive was finalized.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Number of lease slots (1 for mmap: positional reads never contend).
    pub fn num_slots(&self) -> usize {
        match &self.source {
            PoolSource::Mmap(_) => 1,
            PoolSource::Streams(streams) => streams.len(),
        }
    }

    /// Take a lease on one slot, round-robin. Mmap pools hand out
    /// lock-free leases; stream pools lock the chosen slot until drop.
    pub fn lease(&self) -> StreamLease<'_> {
        match &self.source {
            PoolSource::Mmap(mmap) => StreamLease {
                size: self.size,
                inner: LeaseInner::Mmap(mmap),
            },
            PoolSource::Streams(streams) => {
                let slot = self.next_slot.fetch_add(1, Ordering::Relaxed) % streams.len();
                StreamLease {
                    size: self.size,
                    inner: LeaseInner::Stream(streams[slot].lock()),
                }
            }
        }
    }

    /// The root group position from the header.
    pub fn root_pos(&self) -> Result<u64> {
        self.lease().read_u64(ROOT_POS_OFFSET as u64)
    }

    /// Convenience: read bytes at a position through a one-shot lease.
    pub fn read_bytes(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.lease().read_into(pos, &mut buf)?;
        Ok(buf)
    }

    /// Convenience: read a u64 through a one-shot lease.
    pub fn read_u64(&self, pos: u64) -> Result<u64> {
        self.lease().read_u64(pos)
    }
}

enum LeaseInner<'a> {
    Mmap(&'a Mmap),
    Stream(MutexGuard<'a, Box<dyn ReadStream>>),
}

/// Exclusive use of one pool slot for positional reads.
pub struct StreamLease<'a> {
    size: u64,
    inner: LeaseInner<'a>,
}

impl StreamLease<'_> {
    /// Read exactly `buf.len()` bytes at `pos`. Running past the end of
    /// the archive is a structural error.
    pub fn read_into(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let end = pos + buf.len() as u64;
        if end > self.size {
            return Err(Error::UnexpectedEof(end));
        }

        match &mut self.inner {
            LeaseInner::Mmap(mmap) => {
                buf.copy_from_slice(&mmap[pos as usize..pos as usize + buf.len()]);
                Ok(())
            }
            LeaseInner::Stream(stream) => {
                stream.seek(SeekFrom::Start(pos))?;
                stream.read_exact(buf)?;
                Ok(())
            }
        }
    }

    /// Read `len` bytes at `pos` as an owned buffer.
    pub fn read_bytes(&mut self, pos: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_into(pos, &mut buf)?;
        Ok(buf)
    }

    /// Read a little-endian u64 at `pos`.
    pub fn read_u64(&mut self, pos: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_into(pos, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a little-endian u32 at `pos`.
    pub fn read_u32(&mut self, pos: u64) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_into(pos, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}

fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound(path.to_path_buf())
        } else {
            Error::Io(e)
        }
    })
}

/// Parse and validate the 16-byte archive header.
pub(crate) fn parse_header(data: &[u8]) -> Result<(u16, bool)> {
    if data.len() < HEADER_SIZE {
        return Err(Error::UnexpectedEof(data.len() as u64));
    }

    if &data[0..5] != VAULT_MAGIC {
        return Err(Error::InvalidMagic);
    }

    let frozen = data[FROZEN_OFFSET] == FROZEN_FLAG;
    let version = u16::from_le_bytes([data[VERSION_OFFSET], data[VERSION_OFFSET + 1]]);

    if version > CURRENT_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }

    Ok((version, frozen))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(version: u16, frozen: bool) -> [u8; 16] {
        let mut header = [0u8; 16];
        header[0..5].copy_from_slice(VAULT_MAGIC);
        header[FROZEN_OFFSET] = if frozen { FROZEN_FLAG } else { NOT_FROZEN_FLAG };
        header[VERSION_OFFSET..VERSION_OFFSET + 2].copy_from_slice(&version.to_le_bytes());
        header
    }

    #[test]
    fn test_header_parsing() {
        let (version, frozen) = parse_header(&header_bytes(1, true)).unwrap();
        assert_eq!(version, 1);
        assert!(frozen);
    }

    #[test]
    fn test_invalid_magic() {
        let header = [0u8; 16];
        assert!(matches!(parse_header(&header), Err(Error::InvalidMagic)));
    }

    #[test]
    fn test_future_version_refused() {
        let result = parse_header(&header_bytes(CURRENT_VERSION + 1, true));
        assert!(matches!(result, Err(Error::UnsupportedVersion(v)) if v == CURRENT_VERSION + 1));
    }

    #[test]
    fn test_from_streams_round_robin() {
        let mut bytes = header_bytes(1, true).to_vec();
        bytes.extend_from_slice(&42u64.to_le_bytes());

        let sources: Vec<Box<dyn ReadStream>> = (0..3)
            .map(|_| Box::new(std::io::Cursor::new(bytes.clone())) as Box<dyn ReadStream>)
            .collect();
        let pool = StreamPool::from_streams(sources).unwrap();
        assert_eq!(pool.num_slots(), 3);

        for _ in 0..6 {
            assert_eq!(pool.read_u64(HEADER_SIZE as u64).unwrap(), 42);
        }
    }

    #[test]
    fn test_read_past_end_is_structural_error() {
        let bytes = header_bytes(1, true).to_vec();
        let pool = StreamPool::from_streams(vec![Box::new(std::io::Cursor::new(bytes))]).unwrap();
        let result = pool.read_u64(12);
        assert!(matches!(result, Err(Error::UnexpectedEof(_))));
    }
}
