//! Monthly gridded (IS2SITMOGR4) thickness dataset loader
//!
//! One parameterized loader covering the three source modes: the aggregated
//! zarr store on S3, per-month netcdf files downloaded from S3, and per-month
//! netcdf files already on the local drive. All modes return a dataset with
//! the same normalized shape: spatial coordinates eager and 2-D over
//! (`y`,`x`), `time` sorted ascending.

use crate::config::{MonthlyConfig, MonthlySource, Version};
use crate::dataset::Dataset;
use crate::errors::{Is2DataError, Result};
use crate::netcdf_io::{self, list_local_files};
use crate::storage;
use crate::zarr_io::{open_zarr_dataset, ZarrStore};
use chrono::{NaiveDate, NaiveTime};
use std::path::Path;

/// Literal token preceding the `YYYYMM` date in per-month filenames
const MONTHLY_FILE_TOKEN: &str = "IS2SITMOGR4_01_";

/// Read the monthly gridded thickness dataset.
///
/// The source mode, version, cache location and persistence behavior all come
/// from the [`MonthlyConfig`]. An explicit `download` flag forces the
/// per-month files to be (re-)downloaded regardless of mode; the
/// `netcdf-s3` mode always downloads before reading.
pub async fn read_monthly_gridded(config: &MonthlyConfig) -> Result<Dataset> {
    let wants_download = config.download || config.source == MonthlySource::NetcdfS3;
    if wants_download {
        download_monthly_files(config).await?;
    }

    match config.source {
        MonthlySource::ZarrS3 => read_zarr_store(config).await,
        MonthlySource::NetcdfS3 | MonthlySource::NetcdfLocal => read_monthly_files(config),
    }
}

/// Download every per-month netcdf object for the configured version into the
/// local cache directory.
///
/// The local file count is compared against the expected complete-cache count
/// first; a divergence is only worth a warning, completeness is never assumed
/// either way.
async fn download_monthly_files(config: &MonthlyConfig) -> Result<()> {
    let existing = list_local_files(&config.file_pattern())?.len();
    if existing != config.expected_file_count {
        println!(
            "⚠️ Local cache holds {} file(s), expected {}",
            existing, config.expected_file_count
        );
    }

    println!(
        "📥 Download from S3 bucket: {}",
        config.storage.bucket_name
    );
    let store = storage::anonymous_s3(&config.storage)?;
    let prefix = config.storage.monthly_netcdf_prefix(config.version);
    storage::download_objects(&store, &prefix, &config.version_dir()).await?;
    Ok(())
}

/// Open the aggregated zarr store directly from S3, no local cache involved
async fn read_zarr_store(config: &MonthlyConfig) -> Result<Dataset> {
    println!(
        "🚀 Load zarr store from S3 bucket: {}",
        config.storage.bucket_name
    );
    let prefix = config.storage.monthly_zarr_prefix(config.version);
    println!("zarr path: s3://{}/{}", config.storage.bucket_name, prefix);

    let store = storage::anonymous_s3(&config.storage)?;
    let zarr = ZarrStore::open(store, prefix).await?;
    let mut ds = open_zarr_dataset(&zarr).await?;

    // Plotting chokes on lazily chunked coordinates
    ds.assign_latlon_2d()?;

    if config.persist {
        ds.persist().await?;
    }
    Ok(ds)
}

/// Read the per-month netcdf files from the local cache directory
fn read_monthly_files(config: &MonthlyConfig) -> Result<Dataset> {
    let pattern = config.file_pattern();
    let filenames = list_local_files(&pattern)?;
    if filenames.is_empty() {
        return Err(Is2DataError::NoDataFound { pattern });
    }

    let mut parts = Vec::with_capacity(filenames.len());
    for file in &filenames {
        let date = monthly_file_date(file)?;
        let mut ds = netcdf_io::open_dataset(file)?;
        promote_grid_coords(&mut ds, config.version)?;
        ds.assign_time(date.and_time(NaiveTime::MIN));
        ds.expand_time_dim()?;
        parts.push(ds);
    }

    // The file listing carries no order guarantee, sort explicitly
    let mut merged = Dataset::merge(parts)?;
    merged.sort_by_time()?;
    merged.assign_latlon_2d()?;
    merged.set_attr(
        "description",
        format!("Aggregated IS2SITMOGR4 {} dataset.", config.version),
    );
    Ok(merged)
}

/// Promote the version's grid coordinate fields, normalizing the legacy V2
/// `xgrid`/`ygrid` names to `x`/`y`
fn promote_grid_coords(ds: &mut Dataset, version: Version) -> Result<()> {
    let [x_name, y_name] = version.grid_coords();
    ds.set_coords(&["latitude", "longitude", x_name, y_name])?;
    if version == Version::V2 {
        ds.rename(x_name, "x");
        ds.rename(y_name, "y");
    }
    Ok(())
}

/// Parse the `YYYYMM` token that follows `IS2SITMOGR4_01_` in a per-month
/// filename, using the first-day-of-month convention
fn monthly_file_date(path: &Path) -> Result<NaiveDate> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Is2DataError::Generic(format!("Unreadable filename: {}", path.display())))?;

    let stamp = filename
        .split(MONTHLY_FILE_TOKEN)
        .nth(1)
        .and_then(|rest| rest.split('_').next())
        .ok_or_else(|| {
            Is2DataError::Generic(format!(
                "Filename '{}' is missing the expected '{}YYYYMM' token",
                filename, MONTHLY_FILE_TOKEN
            ))
        })?;

    Ok(NaiveDate::parse_from_str(&format!("{}01", stamp), "%Y%m%d")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_monthly_file_date_first_of_month() {
        let path = PathBuf::from("/data/IS2SITMOGR4/V3/IS2SITMOGR4_01_202103_004_001.nc");
        assert_eq!(
            monthly_file_date(&path).unwrap(),
            NaiveDate::from_ymd_opt(2021, 3, 1).expect("Invalid date")
        );
    }

    #[test]
    fn test_monthly_file_date_token_at_start() {
        let path = PathBuf::from("IS2SITMOGR4_01_201811_002_001.nc");
        assert_eq!(
            monthly_file_date(&path).unwrap(),
            NaiveDate::from_ymd_opt(2018, 11, 1).expect("Invalid date")
        );
    }

    #[test]
    fn test_monthly_file_date_missing_token() {
        let path = PathBuf::from("somethingelse_202103.nc");
        assert!(monthly_file_date(&path).is_err());
    }

    #[test]
    fn test_monthly_file_date_malformed_stamp() {
        let path = PathBuf::from("IS2SITMOGR4_01_20xx03_004_001.nc");
        assert!(matches!(
            monthly_file_date(&path).unwrap_err(),
            Is2DataError::DateParseError(_)
        ));
    }
}
