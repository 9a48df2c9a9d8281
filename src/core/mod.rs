//! Core layer - backend-independent types and reader traits.
//!
//! This module provides:
//! - [`TimeSampling`] - Maps sample indices to times
//! - [`MetaData`] - Key-value metadata storage
//! - [`ObjectHeader`] / [`PropertyHeader`] - Headers for objects and properties
//! - [`SampleSelector`] / [`SampleKey`] - Sample selection and content identity
//! - Reader traits implemented by the container backend
//! - Read cache and write-session dedup map

mod time_sampling;
mod metadata;
mod header;
mod traits;
mod sample;
mod cache;

pub use time_sampling::{
    TimeSampling, TimeSamplingKind, ACYCLIC_NUM_SAMPLES, ACYCLIC_TIME_PER_CYCLE, TIME_EPSILON,
};
pub use metadata::MetaData;
pub use header::{ObjectHeader, PropertyHeader, PropertyType};
pub use traits::{
    ArchiveReader, ArrayPropertyReader, CompoundPropertyReader, ObjectReader, PropertyReader,
    SampledPropertyReader, ScalarPropertyReader,
};
pub use sample::{ArraySample, SampleDigest, SampleKey, SampleSelector};
pub use cache::{ReadSampleCache, ReadSampleKey, WrittenSampleMap};
