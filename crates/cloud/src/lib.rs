//! # s1tilex Cloud
//!
//! Sentinel-1 GRD tile extraction over the Earth Engine REST API.
//!
//! Queries are built lazily as expression trees ([`expr`], [`objects`]) and
//! only executed at an explicit [`ComputeBackend`] boundary: remotely through
//! [`EeClient`], or in-process through [`MemoryCatalog`].
//!
//! ## Features
//!
//! - `native` (default): blocking API via tokio `block_on`

pub mod auth;
pub mod backend;
pub mod ee_client;
pub mod error;
pub mod expr;
pub mod memory;
pub mod objects;
pub mod sentinel1;

pub mod sync_api;

pub use backend::{get_info, ComputeBackend};
pub use ee_client::{EeClient, EeClientOptions, EeEndpoint};
pub use error::{CloudError, Result};
pub use expr::{Expr, Expression};
pub use memory::{MemoryCatalog, MemoryImage};
pub use objects::{ComputedObject, Geometry, ImageCollection};
pub use sentinel1::{
    extract_tiles, extract_tiles_with, insert_group_id, to_feature_collection, DateRange,
    ExtractOptions, PolarisationPolicy, Sentinel1,
};

/// Blocking API re-exported as `blocking` module (native only).
#[cfg(feature = "native")]
pub mod blocking {
    pub use crate::sync_api::*;
}
