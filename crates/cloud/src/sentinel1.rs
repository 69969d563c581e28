//! Sentinel-1 GRD tile extraction.
//!
//! Builds a lazy query over `COPERNICUS/S1_GRD`, tags every image with a
//! `group_id` (relative orbit + centroid longitude), converts the images to
//! features and materializes them into a [`GeoTable`].
//!
//! Two remote round-trips happen per extraction: the emptiness check in
//! [`to_feature_collection`] and the final fetch in [`extract_tiles_with`].

use s1tilex_core::{AttributeValue, GeoTable};
use tracing::{debug, info};

use crate::backend::{get_info, ComputeBackend};
use crate::error::{CloudError, Result};
use crate::objects::{EeString, Feature, FeatureCollection, Geometry, ImageCollection};

/// Catalog id of the Sentinel-1 Ground Range Detected collection.
pub const S1_GRD: &str = "COPERNICUS/S1_GRD";
/// Property injected by [`insert_group_id`].
pub const GROUP_ID: &str = "group_id";
/// Relative orbit metadata field.
pub const RELATIVE_ORBIT: &str = "relativeOrbitNumber_start";
/// Polarisation channels field (a list of strings remotely).
pub const POLARISATION: &str = "transmitterReceiverPolarisation";
/// Separator used when flattening the polarisation list.
pub const POLARISATION_SEPARATOR: &str = ", ";
/// Max error passed to the remote centroid computation.
pub const CENTROID_MAX_ERROR: f64 = 1.0;

// ---------------------------------------------------------------------------
// Inputs & options
// ---------------------------------------------------------------------------

/// Acquisition window `[start, end)`, as date strings understood by the
/// catalog (e.g. `"2021-03-01"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

impl DateRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

impl<S: Into<String>, E: Into<String>> From<(S, E)> for DateRange {
    fn from((start, end): (S, E)) -> Self {
        Self::new(start, end)
    }
}

/// What to do with rows whose polarisation field is absent or null.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PolarisationPolicy {
    /// Fail the whole extraction.
    #[default]
    Strict,
    /// Keep the row with a null polarisation.
    NullMissing,
}

/// Knobs for [`extract_tiles_with`].
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub polarisation: PolarisationPolicy,
}

// ---------------------------------------------------------------------------
// Collection handle
// ---------------------------------------------------------------------------

/// Lazy handle over the Sentinel-1 GRD collection.
#[derive(Debug, Clone)]
pub struct Sentinel1 {
    collection: ImageCollection,
}

impl Sentinel1 {
    /// Handle bound to [`S1_GRD`]. Nothing is validated until evaluation.
    pub fn new() -> Self {
        Self {
            collection: ImageCollection::load(S1_GRD),
        }
    }

    pub fn filter_bounds(&self, aoi: &Geometry) -> Self {
        Self {
            collection: self.collection.filter_bounds(aoi),
        }
    }

    pub fn filter_date(&self, range: &DateRange) -> Self {
        Self {
            collection: self.collection.filter_date(&range.start, &range.end),
        }
    }

    pub fn insert_group_id(&self) -> Self {
        Self {
            collection: insert_group_id(&self.collection),
        }
    }

    pub fn collection(&self) -> &ImageCollection {
        &self.collection
    }

    pub fn into_collection(self) -> ImageCollection {
        self.collection
    }
}

impl Default for Sentinel1 {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

/// Tag every image with `group_id = "{orbit:%d}_{centroid_lon:%.2f}"`.
///
/// Purely lazy: an image lacking [`RELATIVE_ORBIT`] only fails once the
/// collection is evaluated.
pub fn insert_group_id(collection: &ImageCollection) -> ImageCollection {
    collection.map(|image| {
        let centroid_lon = image
            .geometry()
            .centroid(CENTROID_MAX_ERROR)
            .coordinates()
            .get_number(0)
            .format("%.2f");
        let orbit = image.get_number(RELATIVE_ORBIT).format("%d");
        let group_id = orbit.cat(&EeString::new("_")).cat(&centroid_lon);
        image.set(GROUP_ID, group_id)
    })
}

/// Number of images in `collection` (one remote round-trip).
pub async fn collection_size<B: ComputeBackend>(
    backend: &B,
    collection: &ImageCollection,
) -> Result<u64> {
    let value = get_info(backend, &collection.size()).await?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
        .ok_or_else(|| CloudError::Decode(format!("collection size is not a count: {value}")))
}

/// Convert images to features carrying the footprint and all metadata.
///
/// Fails with [`CloudError::EmptyCollection`] when the collection has no
/// images; this is the only eager check in the pipeline.
pub async fn to_feature_collection<B: ComputeBackend>(
    backend: &B,
    collection: &ImageCollection,
) -> Result<FeatureCollection> {
    let size = collection_size(backend, collection).await?;
    debug!(size, "input collection size");
    if size == 0 {
        return Err(CloudError::EmptyCollection);
    }

    Ok(collection.map_to_features(|image| Feature::new(&image.geometry(), &image.to_dictionary())))
}

/// Replace the polarisation list of every row with its `", "`-joined string.
pub fn flatten_polarisation(table: &mut GeoTable, policy: PolarisationPolicy) -> Result<()> {
    if !table.has_column(POLARISATION) {
        return match policy {
            PolarisationPolicy::Strict if table.is_empty() => Ok(()),
            PolarisationPolicy::Strict => Err(CloudError::Polarisation {
                row: 0,
                reason: "value is missing".into(),
            }),
            PolarisationPolicy::NullMissing => {
                let nulls = vec![AttributeValue::Null; table.len()];
                Ok(table.set_column(POLARISATION, nulls)?)
            }
        };
    }

    table.try_map_column(POLARISATION, |row, value| match value {
        AttributeValue::List(items) => {
            let channels = items
                .iter()
                .map(|item| {
                    item.as_str().ok_or_else(|| CloudError::Polarisation {
                        row,
                        reason: format!("list item is a {}, not a string", item.type_name()),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(AttributeValue::String(channels.join(POLARISATION_SEPARATOR)))
        }
        AttributeValue::Null if policy == PolarisationPolicy::NullMissing => {
            Ok(AttributeValue::Null)
        }
        AttributeValue::Null => Err(CloudError::Polarisation {
            row,
            reason: "value is missing".into(),
        }),
        other => Err(CloudError::Polarisation {
            row,
            reason: format!("expected a list, got a {}", other.type_name()),
        }),
    })
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Extract all Sentinel-1 GRD images over `aoi` within `date_range`.
pub async fn extract_tiles<B: ComputeBackend>(
    backend: &B,
    aoi: &Geometry,
    date_range: &DateRange,
) -> Result<GeoTable> {
    extract_tiles_with(backend, aoi, date_range, &ExtractOptions::default()).await
}

/// [`extract_tiles`] with explicit options.
pub async fn extract_tiles_with<B: ComputeBackend>(
    backend: &B,
    aoi: &Geometry,
    date_range: &DateRange,
    options: &ExtractOptions,
) -> Result<GeoTable> {
    let s1 = Sentinel1::new()
        .filter_bounds(aoi)
        .filter_date(date_range)
        .insert_group_id();

    let features = to_feature_collection(backend, s1.collection()).await?;

    let value = get_info(backend, &features).await?;
    let mut table = GeoTable::from_geojson(value)?;
    flatten_polarisation(&mut table, options.polarisation)?;

    info!(
        rows = table.len(),
        start = %date_range.start,
        end = %date_range.end,
        "extracted Sentinel-1 tiles"
    );
    Ok(table)
}
