//! NetCDF file I/O
//!
//! Opens one netcdf file into the in-memory [`Dataset`] abstraction. All
//! variables are read eagerly; the per-month and per-campaign grids are small
//! enough that deferred reads buy nothing here.

use crate::dataset::{DataArray, Dataset};
use crate::errors::{Is2DataError, Result};
use glob::glob;
use ndarray::{ArrayD, IxDyn};
use netcdf::AttributeValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Enumerate local files matching a glob pattern
pub(crate) fn list_local_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern)
        .map_err(|e| Is2DataError::Generic(format!("Invalid glob pattern '{}': {}", pattern, e)))?;
    let mut files = Vec::new();
    for entry in paths {
        files.push(entry.map_err(|e| Is2DataError::IoError(e.into_error()))?);
    }
    Ok(files)
}

/// Open a netcdf file and read every variable into a [`Dataset`].
///
/// Numeric variables are converted to `f64` arrays. Non-numeric variables
/// (e.g. the string-typed `campaign_dates` carrier) keep their attributes but
/// no values. Only string attributes are carried; that is all the loaders
/// consume.
pub fn open_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let file = netcdf::open(path)?;
    let mut ds = Dataset::new();

    for var in file.variables() {
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

        let mut attrs = BTreeMap::new();
        for attr in var.attributes() {
            if let Ok(AttributeValue::Str(value)) = attr.value() {
                attrs.insert(attr.name().to_string(), value);
            }
        }

        let (dims, values) = match var.get_values::<f64, _>(..) {
            Ok(values) => (dims, ArrayD::from_shape_vec(IxDyn(&shape), values)?),
            // Attribute-only carrier variable, keep it without values
            Err(_) => (Vec::new(), ArrayD::from_shape_vec(IxDyn(&[0]), Vec::new())?),
        };

        let mut array = DataArray::eager(dims, values);
        array.attrs = attrs;
        ds.insert_var(var.name(), array);
    }

    for attr in file.attributes() {
        if let Ok(AttributeValue::Str(value)) = attr.value() {
            ds.set_attr(attr.name(), value);
        }
    }

    Ok(ds)
}
