//! Loader configuration
//!
//! Bucket names, path templates and per-loader options live here instead of
//! being baked into function signatures. Configurations can be built in code
//! via the `Default` impls and builder-style methods, or loaded from a JSON
//! file for notebook-side setup.

use crate::errors::{Is2DataError, Result};
use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Dataset version of the monthly gridded product.
///
/// Version 2 files carry the legacy `xgrid`/`ygrid` grid coordinates, Version 3
/// renamed them to `x`/`y`. The version also fixes the date range embedded in
/// the aggregated zarr store name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Version {
    V2,
    V3,
}

impl Version {
    /// Grid coordinate variable names as they appear in files of this version
    pub fn grid_coords(&self) -> [&'static str; 2] {
        match self {
            Version::V2 => ["xgrid", "ygrid"],
            Version::V3 => ["x", "y"],
        }
    }

    /// Date range token embedded in the aggregated zarr store name
    pub fn zarr_date_range(&self) -> &'static str {
        match self {
            Version::V2 => "201811-202204",
            Version::V3 => "201811-202304",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::V2 => write!(f, "V2"),
            Version::V3 => write!(f, "V3"),
        }
    }
}

impl FromStr for Version {
    type Err = Is2DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "V2" | "v2" => Ok(Version::V2),
            "V3" | "v3" => Ok(Version::V3),
            other => Err(Is2DataError::Generic(format!(
                "Unknown dataset version '{}', expected V2 or V3",
                other
            ))),
        }
    }
}

/// Source mode for the monthly gridded loader.
///
/// The three modes were historically three near-duplicate reader functions;
/// they are collapsed here into one explicit switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MonthlySource {
    /// Open the aggregated zarr store directly from the S3 bucket
    #[serde(rename = "zarr-s3")]
    ZarrS3,
    /// Download the per-month netcdf files from S3, then read them locally
    #[serde(rename = "netcdf-s3")]
    NetcdfS3,
    /// Read per-month netcdf files already present on the local drive
    #[serde(rename = "netcdf-local")]
    NetcdfLocal,
}

/// Remote storage locations for the ICESat-2 sea ice products
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3 bucket holding the monthly gridded product and the book dataset
    pub bucket_name: String,
    /// AWS region of the bucket
    pub region: String,
    /// Key prefix of the pre-merged book dataset objects
    pub book_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket_name: "icesat-2-sea-ice-us-west-2".to_string(),
            region: "us-west-2".to_string(),
            book_prefix: "book_data".to_string(),
        }
    }
}

impl StorageConfig {
    /// Key prefix of the per-month netcdf files for a dataset version
    pub fn monthly_netcdf_prefix(&self, version: Version) -> String {
        format!("IS2SITMOGR4_{}/netcdf", version)
    }

    /// Key prefix of the aggregated zarr store for a dataset version
    pub fn monthly_zarr_prefix(&self, version: Version) -> String {
        format!(
            "IS2SITMOGR4_{v}/zarr/IS2SITMOGR4_{v}_{d}.zarr/all",
            v = version,
            d = version.zarr_date_range()
        )
    }
}

/// Configuration for the campaign (ISSITGR4) dataset loader
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Product version subdirectory, e.g. "001"
    pub version: String,
    /// Local directory holding per-campaign netcdf files
    pub local_data_path: PathBuf,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            version: "001".to_string(),
            local_data_path: PathBuf::from("./data/ISSITGR4"),
        }
    }
}

impl CampaignConfig {
    /// Load a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        from_json_file(path)
    }

    /// Glob pattern for the per-campaign files of this version
    pub fn file_pattern(&self) -> String {
        format!("{}/{}/*.nc", self.local_data_path.display(), self.version)
    }
}

/// Configuration for the monthly gridded (IS2SITMOGR4) dataset loader
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonthlyConfig {
    /// Where to read the data from
    pub source: MonthlySource,
    /// Dataset version
    pub version: Version,
    /// Local directory used as the per-version file cache
    pub local_data_path: PathBuf,
    /// Eagerly materialize every variable of the zarr store before returning
    pub persist: bool,
    /// Force a download of the per-month netcdf files before reading
    pub download: bool,
    /// Number of per-month files a complete local cache is expected to hold.
    /// A divergent count only produces a warning line.
    pub expected_file_count: usize,
    /// Remote storage locations
    pub storage: StorageConfig,
}

impl Default for MonthlyConfig {
    fn default() -> Self {
        Self {
            source: MonthlySource::ZarrS3,
            version: Version::V3,
            local_data_path: PathBuf::from("./data/IS2SITMOGR4"),
            persist: true,
            download: false,
            expected_file_count: 30,
            storage: StorageConfig::default(),
        }
    }
}

impl MonthlyConfig {
    /// Load a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        from_json_file(path)
    }

    /// Local directory holding this version's per-month files
    pub fn version_dir(&self) -> PathBuf {
        self.local_data_path.join(self.version.to_string())
    }

    /// Glob pattern for the per-month files of this version
    pub fn file_pattern(&self) -> String {
        format!("{}/*.nc", self.version_dir().display())
    }
}

/// Configuration for the pre-merged book dataset loader
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BookConfig {
    /// Local directory the book file is cached in
    pub local_path: PathBuf,
    /// Also include the wrangled CryoSat-2 thickness data
    pub cs2: bool,
    /// Remote storage locations
    pub storage: StorageConfig,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            local_path: PathBuf::from("./data"),
            cs2: false,
            storage: StorageConfig::default(),
        }
    }
}

impl BookConfig {
    /// Load a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        from_json_file(path)
    }

    /// Target filename following the book dataset naming convention
    pub fn filename(&self) -> &'static str {
        if self.cs2 {
            "IS2_CS2_jbook_dataset_201811-202104.nc"
        } else {
            "IS2_jbook_dataset_201811-202104.nc"
        }
    }

    /// Remote object key of the book dataset
    pub fn remote_key(&self) -> String {
        format!("{}/{}", self.storage.book_prefix, self.filename())
    }

    /// Local path the book dataset is cached at
    pub fn local_file(&self) -> PathBuf {
        self.local_path.join(self.filename())
    }
}

fn from_json_file<P: AsRef<Path>, T: serde::de::DeserializeOwned>(path: P) -> Result<T> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)?;
    Ok(config)
}
