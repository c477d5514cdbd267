//! is2_data: ICESat-2 sea ice thickness dataset loading
//!
//! A Rust library for loading the ICESat-2 sea ice thickness gridded datasets
//! used by the sea-ice analysis notebooks. Each loader locates or downloads
//! NetCDF/Zarr-formatted gridded data (local disk, the public S3 bucket, or a
//! Google Cloud Storage bucket), reads it into an in-memory labeled dataset,
//! normalizes the coordinate/dimension layout, and hands it back for plotting
//! and analysis.
//!
//! ## Key Features
//!
//! - **Campaign loader**: merges per-campaign gridded files into one
//!   time-indexed dataset, timestamped at each campaign's date-range midpoint
//! - **Monthly loader**: one parameterized reader for the aggregated zarr
//!   store on S3, per-month netcdf files on S3, or local per-month files
//! - **Book loader**: fetch-if-missing caching of the pre-merged notebook
//!   dataset
//! - **Coordinate normalization**: legacy `xgrid`/`ygrid` names renamed,
//!   `latitude`/`longitude` forced to eager 2-D arrays over (`y`,`x`)
//! - **Anonymous cloud access**: public-bucket reads, no credentials needed
//!
//! ## Module Organization
//!
//! - [`campaign`]: campaign (ISSITGR4) dataset loader
//! - [`monthly`]: monthly gridded (IS2SITMOGR4) dataset loader
//! - [`book`]: pre-merged book dataset loader
//! - [`dataset`]: the in-memory labeled dataset abstraction
//! - [`config`]: loader configuration (buckets, paths, versions)
//! - [`netcdf_io`]: NetCDF file reading
//! - [`zarr_io`]: Zarr store reading over object storage
//! - [`storage`]: object listing, bulk download and single-object fetch
//! - [`errors`]: centralized error handling
//!
//! ## Usage Examples
//!
//! ### Campaign data
//! ```rust,no_run
//! use is2_data::prelude::*;
//!
//! let config = CampaignConfig::default();
//! let ds = is2_data::campaign::read_campaign(&config).unwrap();
//! println!("{} campaigns loaded", ds.time().map_or(0, |t| t.len()));
//! ```
//!
//! ### Monthly gridded data
//! ```rust,no_run
//! use is2_data::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = MonthlyConfig {
//!         source: MonthlySource::NetcdfLocal,
//!         version: Version::V3,
//!         ..MonthlyConfig::default()
//!     };
//!     let ds = is2_data::monthly::read_monthly_gridded(&config).await.unwrap();
//!     println!("description: {:?}", ds.attr("description"));
//! }
//! ```
//!
//! The loaders are sequential and blocking throughout; failures surface as
//! [`errors::Is2DataError`] values for a notebook user to read directly.

// Core modules
pub mod book;
pub mod campaign;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod monthly;
pub mod netcdf_io;
pub mod storage;
pub mod zarr_io;

// Direct re-exports for the public API
pub use config::*;
pub use dataset::*;
pub use errors::*;

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::book::read_book_data;
    pub use crate::campaign::read_campaign;
    pub use crate::config::{
        BookConfig, CampaignConfig, MonthlyConfig, MonthlySource, StorageConfig, Version,
    };
    pub use crate::dataset::{ArrayValues, DataArray, Dataset};
    pub use crate::errors::{Is2DataError, Result};
    pub use crate::monthly::read_monthly_gridded;
    pub use crate::storage::{GsutilFetcher, ObjectFetcher, S3Fetcher};
    pub use crate::zarr_io::{LazyVariable, ZarrStore};
}

// Backwards compatibility shims for the historical per-version reader
// functions, collapsed into the parameterized monthly loader
#[deprecated(
    since = "0.3.0",
    note = "Use `monthly::read_monthly_gridded` with `MonthlyConfig { version: Version::V2, .. }`"
)]
pub async fn read_is2sitmogr4_v2(source: config::MonthlySource) -> errors::Result<dataset::Dataset> {
    let config = config::MonthlyConfig {
        source,
        version: config::Version::V2,
        ..config::MonthlyConfig::default()
    };
    monthly::read_monthly_gridded(&config).await
}

#[deprecated(
    since = "0.3.0",
    note = "Use `monthly::read_monthly_gridded` with `MonthlyConfig { version: Version::V3, .. }`"
)]
pub async fn read_is2sitmogr4_v3(source: config::MonthlySource) -> errors::Result<dataset::Dataset> {
    let config = config::MonthlyConfig {
        source,
        version: config::Version::V3,
        ..config::MonthlyConfig::default()
    };
    monthly::read_monthly_gridded(&config).await
}
