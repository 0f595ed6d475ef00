//! Region records and the GeoJSON dataset they live in.
//!
//! A [`Dataset`] is read once per run, updated batch by batch through
//! [`update_batch`], stamped, and rewritten in full after each successful
//! batch.

pub mod dataset;
pub mod error;
pub mod record;
pub mod update;

pub use dataset::{Dataset, DEFAULT_ID_PROPERTY};
pub use error::{RegionError, Result};
pub use record::{HorizonForecast, RegionForecast, RegionRecord};
pub use update::{batches, stamp, update_batch, update_region};
