//! Feature windowing and assembly for flood-risk forecast series.
//!
//! This crate turns raw forecast samples into per-day feature rows, joins
//! the rows of every forecast source into one prediction-ready matrix, and
//! carries the scored rows back out to the region updater.

pub mod assemble;
pub mod error;
pub mod stats;
pub mod table;
pub mod window;

pub use assemble::{assemble, FeatureMatrix, MONTH_COLUMN};
pub use error::DataError;
pub use table::{Coordinate, FeatureRow, FeatureTable, RowKey, ScoredRow};
pub use window::{window_features, RawSeries};
