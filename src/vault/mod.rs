//! Vault container backend.
//!
//! The on-disk format is a frozen tree of two node kinds reached from a
//! 16-byte header: groups (child reference tables) and data blocks
//! (length-prefixed bytes). The high bit of a child reference selects
//! the kind. Sample payloads carry a 16-byte content key and are
//! deduplicated per archive at write time.

pub mod archive_impl;
pub mod format;
pub mod pool;
pub mod read_util;
pub mod reader;
pub mod writer;

pub use archive_impl::VaultArchiveReader;
pub use format::{CURRENT_VERSION, LIBRARY_VERSION};
pub use pool::{ReadStream, StreamLease, StreamPool};
pub use reader::{IChild, IData, IGroup, VaultArchive};
pub use writer::{OArchive, OObject, OProperty, OStream, WriteStream};
