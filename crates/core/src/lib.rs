//! # s1tilex Core
//!
//! Local data containers for the s1tilex Sentinel-1 tile extractor.
//!
//! This crate provides:
//! - `Feature` / `FeatureCollection`: geometry + attribute records
//! - `AttributeValue`: JSON-shaped attribute values
//! - `GeoTable`: a columnar table with one geometry column, built from GeoJSON features

pub mod error;
pub mod vector;

pub use error::{Error, Result};
pub use vector::{AttributeValue, Feature, FeatureCollection, GeoTable};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::vector::{AttributeValue, Feature, FeatureCollection, GeoTable};
}
