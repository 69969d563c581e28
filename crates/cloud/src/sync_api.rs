//! Blocking (synchronous) API for native platforms.
//!
//! Wraps the async [`EeClient`](crate::ee_client::EeClient) and the
//! extraction pipeline with a Tokio runtime so callers don't need to manage
//! their own async runtime.

#[cfg(feature = "native")]
mod inner {
    use s1tilex_core::GeoTable;

    use crate::ee_client::{EeClient, EeClientOptions, EeEndpoint};
    use crate::error::{CloudError, Result};
    use crate::expr::Expression;
    use crate::objects::Geometry;
    use crate::sentinel1::{self, DateRange, ExtractOptions};

    fn runtime() -> Result<tokio::runtime::Runtime> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CloudError::Network(e.to_string()))
    }

    /// Blocking wrapper around [`EeClient`].
    ///
    /// Uses an internal single-threaded Tokio runtime.
    pub struct EeClientBlocking {
        rt: tokio::runtime::Runtime,
        inner: EeClient,
    }

    impl EeClientBlocking {
        /// Create a new blocking client.
        pub fn new(
            endpoint: EeEndpoint,
            project: impl Into<String>,
            options: EeClientOptions,
        ) -> Result<Self> {
            let rt = runtime()?;
            let inner = EeClient::new(endpoint, project, options)?;
            Ok(Self { rt, inner })
        }

        /// Configure from the environment (see [`EeClient::from_env`]).
        pub fn from_env() -> Result<Self> {
            let rt = runtime()?;
            let inner = EeClient::from_env()?;
            Ok(Self { rt, inner })
        }

        /// The wrapped async client.
        pub fn client(&self) -> &EeClient {
            &self.inner
        }

        /// Evaluate an expression (blocking).
        pub fn compute(&self, expression: &Expression) -> Result<serde_json::Value> {
            self.rt.block_on(self.inner.compute(expression))
        }

        /// Extract Sentinel-1 tiles (blocking).
        pub fn extract_tiles(&self, aoi: &Geometry, date_range: &DateRange) -> Result<GeoTable> {
            self.rt
                .block_on(sentinel1::extract_tiles(&self.inner, aoi, date_range))
        }

        /// Extract Sentinel-1 tiles with explicit options (blocking).
        pub fn extract_tiles_with(
            &self,
            aoi: &Geometry,
            date_range: &DateRange,
            options: &ExtractOptions,
        ) -> Result<GeoTable> {
            self.rt.block_on(sentinel1::extract_tiles_with(
                &self.inner,
                aoi,
                date_range,
                options,
            ))
        }
    }

    /// One-shot: configure a client from the environment and extract tiles.
    pub fn extract_tiles(aoi: &Geometry, date_range: &DateRange) -> Result<GeoTable> {
        EeClientBlocking::from_env()?.extract_tiles(aoi, date_range)
    }
}

#[cfg(feature = "native")]
pub use inner::*;
