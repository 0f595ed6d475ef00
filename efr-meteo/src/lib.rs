//! Open-Meteo forecast access for flood-risk features.
//!
//! Four sources (weather, soil moisture, river discharge, marine) are each
//! queried with one batched POST per batch of regions. Responses pass
//! through a retrying, caching [`client::MeteoClient`] and are windowed
//! into per-site feature tables by the fetchers in [`fetch`].
//!
//! The native HTTP transport lives behind the `api` feature so the rest of
//! the crate can be exercised with in-process transports.

pub mod client;
pub mod error;
pub mod fetch;
pub mod request;
pub mod response;
pub mod source;

#[cfg(feature = "api")]
pub use client::HttpTransport;
pub use client::{CachePolicy, MeteoClient, RetryPolicy, Transport};
pub use error::MeteoError;
pub use fetch::{fetch_all, Site, SourceTables};
pub use request::ForecastRequest;
pub use source::ForecastSource;
