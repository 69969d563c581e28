//! Error types for s1tilex core

use thiserror::Error;

/// Main error type for table and feature operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a GeoJSON FeatureCollection, got {0}")]
    NotAFeatureCollection(String),

    #[error("Column not found: {0}")]
    MissingColumn(String),

    #[error("Column '{column}' row {row}: expected {expected}, got {actual}")]
    ColumnType {
        column: String,
        row: usize,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Row index {row} out of bounds for table of {len} rows")]
    RowOutOfBounds { row: usize, len: usize },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for s1tilex core operations
pub type Result<T> = std::result::Result<T, Error>;
