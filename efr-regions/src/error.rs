/// Error types for the region dataset and the region updater
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegionError {
    #[error("Failed to read dataset {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write dataset {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse dataset: {0}")]
    Parse(#[from] serde_json::Error),

    /// The document is not a GeoJSON FeatureCollection
    #[error("Not a GeoJSON FeatureCollection: {0}")]
    NotFeatureCollection(String),

    /// A feature lacks a property every region must carry
    #[error("Feature {index} has no usable {property:?} property")]
    MissingProperty { index: usize, property: String },

    /// A property is present but cannot be read as the expected type
    #[error("Region {id}: invalid {property:?}: {message}")]
    InvalidProperty {
        id: String,
        property: String,
        message: String,
    },

    /// Two features share the same identifier
    #[error("Duplicate region id {0:?}")]
    DuplicateId(String),

    /// No scored row matches the region's representative point
    #[error("Region {id}: no forecast rows match its representative point")]
    NoMatchingRows { id: String },

    /// More than one scored row for the same forecast horizon
    #[error("Region {id}: duplicate forecast rows for date_id {date_id}")]
    DuplicateHorizon { id: String, date_id: u32 },
}

pub type Result<T> = std::result::Result<T, RegionError>;
