//! Utility types shared across the library:
//! - [`PodType`] - Enum of basic storage types
//! - [`DataType`] - POD + extent (dimensionality)
//! - [`Dimensions`] - Array sample shape
//! - [`Error`] / [`Result`] - Error handling

mod pod;
mod data_type;
mod error;
mod dimensions;

pub use pod::*;
pub use data_type::*;
pub use error::*;
pub use dimensions::*;

/// Time values throughout the library are seconds as f64.
pub type Chrono = f64;
