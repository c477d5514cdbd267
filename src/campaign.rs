//! Campaign (ISSITGR4) gridded thickness dataset loader
//!
//! Reads the per-campaign netcdf files from a local directory and merges them
//! into one time-indexed dataset. Each campaign file embeds its measurement
//! period as `first_day`/`last_day` attributes; the campaign's representative
//! timestamp is the midpoint of that range.

use crate::config::CampaignConfig;
use crate::dataset::Dataset;
use crate::errors::{Is2DataError, Result};
use crate::netcdf_io::{self, list_local_files};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Variable carrying the campaign date-range attributes
const CAMPAIGN_DATES_VAR: &str = "campaign_dates";

/// Read the campaign gridded thickness dataset from local netcdf files.
///
/// Enumerates `{local_data_path}/{version}/*.nc`, fails with
/// [`Is2DataError::NoDataFound`] when the enumeration is empty, and otherwise
/// returns the outer-join merge of all campaign files, sorted ascending by
/// the midpoint timestamps.
pub fn read_campaign(config: &CampaignConfig) -> Result<Dataset> {
    let pattern = config.file_pattern();
    let filenames = list_local_files(&pattern)?;

    if filenames.is_empty() {
        return Err(Is2DataError::NoDataFound { pattern });
    }

    println!("Loading {} campaign netcdf file(s)", filenames.len());
    let mut parts = Vec::with_capacity(filenames.len());
    for file in filenames {
        println!("{}", file.display());
        let mut ds = netcdf_io::open_dataset(&file)?;
        ds.set_coords(&["latitude", "longitude", "x", "y"])?;
        ds.assign_time(campaign_midpoint(&ds)?);
        ds.expand_time_dim()?;
        parts.push(ds);
    }

    let mut merged = Dataset::merge(parts)?;
    merged.sort_by_time()?;
    Ok(merged)
}

/// Midpoint of the campaign's embedded date range.
///
/// The `campaign_dates` variable carries `first_day`/`last_day` string
/// attributes in `%Y-%m-%d` format; the midpoint is
/// `first + (last - first) / 2`.
fn campaign_midpoint(ds: &Dataset) -> Result<NaiveDateTime> {
    let var = ds
        .var(CAMPAIGN_DATES_VAR)
        .or_else(|| ds.coord(CAMPAIGN_DATES_VAR))
        .ok_or_else(|| Is2DataError::VariableNotFound {
            var: CAMPAIGN_DATES_VAR.to_string(),
        })?;

    let first = date_attr(var, "first_day")?;
    let last = date_attr(var, "last_day")?;
    Ok(midpoint(first, last))
}

fn date_attr(var: &crate::dataset::DataArray, attr: &str) -> Result<NaiveDate> {
    let value = var
        .attrs
        .get(attr)
        .ok_or_else(|| Is2DataError::AttributeNotFound {
            var: CAMPAIGN_DATES_VAR.to_string(),
            attr: attr.to_string(),
        })?;
    Ok(NaiveDate::parse_from_str(value, "%Y-%m-%d")?)
}

fn midpoint(first: NaiveDate, last: NaiveDate) -> NaiveDateTime {
    let first = first.and_time(NaiveTime::MIN);
    let last = last.and_time(NaiveTime::MIN);
    first + (last - first) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("Invalid date")
    }

    #[test]
    fn test_midpoint_of_even_range() {
        let mid = midpoint(date(2019, 3, 1), date(2019, 3, 31));
        assert_eq!(
            mid,
            date(2019, 3, 16).and_hms_opt(0, 0, 0).expect("Invalid time")
        );
    }

    #[test]
    fn test_midpoint_of_odd_range_lands_midday() {
        let mid = midpoint(date(2019, 4, 1), date(2019, 4, 30));
        assert_eq!(
            mid,
            date(2019, 4, 15).and_hms_opt(12, 0, 0).expect("Invalid time")
        );
    }

    #[test]
    fn test_midpoint_of_single_day_campaign() {
        let mid = midpoint(date(2019, 5, 7), date(2019, 5, 7));
        assert_eq!(
            mid,
            date(2019, 5, 7).and_hms_opt(0, 0, 0).expect("Invalid time")
        );
    }
}
