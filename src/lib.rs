//! # SceneVault
//!
//! A hierarchical, versioned, time-sampled scene-description archive.
//!
//! Archives are write-once: a writer builds the object/property tree in
//! memory, samples are deduplicated by content key as they are added, and
//! finalizing the archive freezes the file. Readers memory-map (or stream)
//! the frozen file and materialize the tree lazily and concurrently.
//!
//! ## Modules
//!
//! - [`util`] - Basic types (POD, DataType, dimensions, errors)
//! - [`vault`] - Low-level binary container (groups, data blocks, keyed samples)
//! - [`core`] - Time sampling, metadata, headers, reader traits, caches
//! - [`api`] - High-level API (IArchive / OArchive, objects, properties)
//!
//! ## Example
//!
//! ```ignore
//! use scenevault::api::IArchive;
//!
//! let archive = IArchive::open("scene.svlt")?;
//! let root = archive.root()?;
//!
//! for child in root.children() {
//!     println!("{}", child?.name());
//! }
//! ```

pub mod util;
pub mod vault;
pub mod core;
pub mod api;

// Re-export commonly used types
pub use util::{DataType, Error, PodType, Result};
pub use api::{IArchive, IObject, OArchive, OObject, OProperty};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::api::{IArchive, IObject, OArchive, OObject, OProperty};
    pub use crate::core::{MetaData, SampleSelector, TimeSampling};
    pub use crate::util::{DataType, Dimensions, Error, PodType, Result};
}
