//! In-memory labeled dataset abstraction
//!
//! A [`Dataset`] is a collection of named multi-dimensional arrays keyed by
//! named dimensions (at minimum `time` plus the spatial grid axes `y`/`x`),
//! split into coordinate fields and data fields. Variables read from a zarr
//! store start out lazily chunked ([`ArrayValues::Lazy`]); everything read
//! from netcdf files is eager. Spatial coordinate fields are always forced to
//! eager arrays before a loader returns, since downstream plotting cannot
//! consume the lazy form.

use crate::errors::{Is2DataError, Result};
use crate::zarr_io::LazyVariable;
use chrono::NaiveDateTime;
use ndarray::{ArrayD, Axis, IxDyn};
use std::collections::BTreeMap;

/// Name of the time dimension
pub const TIME_DIM: &str = "time";

/// Values held by a [`DataArray`]: either materialized in memory or a handle
/// into a chunked remote store
#[derive(Debug, Clone)]
pub enum ArrayValues {
    Eager(ArrayD<f64>),
    Lazy(LazyVariable),
}

impl ArrayValues {
    pub fn is_lazy(&self) -> bool {
        matches!(self, ArrayValues::Lazy(_))
    }

    /// Borrow the eager values, if materialized
    pub fn as_eager(&self) -> Option<&ArrayD<f64>> {
        match self {
            ArrayValues::Eager(arr) => Some(arr),
            ArrayValues::Lazy(_) => None,
        }
    }

    fn shape(&self) -> Vec<usize> {
        match self {
            ArrayValues::Eager(arr) => arr.shape().to_vec(),
            ArrayValues::Lazy(lazy) => lazy.shape().to_vec(),
        }
    }
}

/// One named field of a dataset: dimension names, values and string attributes
#[derive(Debug, Clone)]
pub struct DataArray {
    pub dims: Vec<String>,
    pub values: ArrayValues,
    pub attrs: BTreeMap<String, String>,
}

impl DataArray {
    /// Create an eager array field
    pub fn eager(dims: Vec<String>, values: ArrayD<f64>) -> Self {
        Self {
            dims,
            values: ArrayValues::Eager(values),
            attrs: BTreeMap::new(),
        }
    }

    /// Create a lazily chunked field backed by a zarr store
    pub fn lazy(dims: Vec<String>, variable: LazyVariable) -> Self {
        Self {
            dims,
            values: ArrayValues::Lazy(variable),
            attrs: BTreeMap::new(),
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        self.values.shape()
    }

    fn has_time_dim(&self) -> bool {
        self.dims.first().map(String::as_str) == Some(TIME_DIM)
    }
}

/// A labeled collection of coordinate and data fields sharing dimensions
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    dims: BTreeMap<String, usize>,
    time: Option<Vec<NaiveDateTime>>,
    coords: BTreeMap<String, DataArray>,
    vars: BTreeMap<String, DataArray>,
    attrs: BTreeMap<String, String>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time coordinate values, once established
    pub fn time(&self) -> Option<&[NaiveDateTime]> {
        self.time.as_deref()
    }

    /// Length of a named dimension
    pub fn dim_len(&self, name: &str) -> Option<usize> {
        if name == TIME_DIM {
            return self.time.as_ref().map(Vec::len);
        }
        self.dims.get(name).copied()
    }

    pub fn coord(&self, name: &str) -> Option<&DataArray> {
        self.coords.get(name)
    }

    pub fn var(&self, name: &str) -> Option<&DataArray> {
        self.vars.get(name)
    }

    pub fn coord_names(&self) -> Vec<&str> {
        self.coords.keys().map(String::as_str).collect()
    }

    pub fn var_names(&self) -> Vec<&str> {
        self.vars.keys().map(String::as_str).collect()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        self.attrs.insert(name.to_string(), value.into());
    }

    /// Insert a data field, recording its dimension lengths
    pub fn insert_var(&mut self, name: impl Into<String>, array: DataArray) {
        for (dim, len) in array.dims.iter().zip(array.shape()) {
            self.dims.insert(dim.clone(), len);
        }
        self.vars.insert(name.into(), array);
    }

    /// Insert a coordinate field, recording its dimension lengths
    pub fn insert_coord(&mut self, name: impl Into<String>, array: DataArray) {
        for (dim, len) in array.dims.iter().zip(array.shape()) {
            self.dims.insert(dim.clone(), len);
        }
        self.coords.insert(name.into(), array);
    }

    /// Promote named data fields to coordinate fields
    pub fn set_coords(&mut self, names: &[&str]) -> Result<()> {
        for &name in names {
            if self.coords.contains_key(name) {
                continue;
            }
            let array = self
                .vars
                .remove(name)
                .ok_or_else(|| Is2DataError::VariableNotFound {
                    var: name.to_string(),
                })?;
            self.coords.insert(name.to_string(), array);
        }
        Ok(())
    }

    /// Attach a scalar time coordinate
    pub fn assign_time(&mut self, time: NaiveDateTime) {
        self.time = Some(vec![time]);
    }

    /// Replace the time coordinate with explicit values
    pub fn set_time_values(&mut self, time: Vec<NaiveDateTime>) {
        self.dims.insert(TIME_DIM.to_string(), time.len());
        self.time = Some(time);
    }

    /// Make `time` the leading dimension of every data field.
    ///
    /// Coordinate fields are left untouched, so the spatial coordinates stay
    /// 2-D over (`y`,`x`). Requires the scalar time coordinate to be set.
    pub fn expand_time_dim(&mut self) -> Result<()> {
        let time_len = self
            .time
            .as_ref()
            .map(Vec::len)
            .ok_or_else(|| Is2DataError::Generic("No time coordinate to expand".to_string()))?;
        if time_len != 1 {
            return Err(Is2DataError::Generic(format!(
                "Cannot expand time dimension over {} time values",
                time_len
            )));
        }

        for (name, array) in self.vars.iter_mut() {
            if array.has_time_dim() {
                continue;
            }
            let expanded = match &array.values {
                ArrayValues::Eager(arr) => arr.clone().insert_axis(Axis(0)),
                ArrayValues::Lazy(_) => {
                    return Err(Is2DataError::Generic(format!(
                        "Cannot expand time dimension of lazy variable '{}'",
                        name
                    )))
                }
            };
            array.dims.insert(0, TIME_DIM.to_string());
            array.values = ArrayValues::Eager(expanded);
        }
        self.dims.insert(TIME_DIM.to_string(), 1);
        Ok(())
    }

    /// Sort the dataset ascending along the time dimension.
    ///
    /// Every field whose leading dimension is `time` is reordered together
    /// with the time coordinate. Lazy variables cannot be reordered; persist
    /// the dataset first if a zarr-backed dataset ever needs sorting.
    pub fn sort_by_time(&mut self) -> Result<()> {
        let time = match &self.time {
            Some(time) => time,
            None => return Ok(()),
        };

        let mut order: Vec<usize> = (0..time.len()).collect();
        order.sort_by_key(|&i| time[i]);
        if order.iter().enumerate().all(|(i, &j)| i == j) {
            return Ok(());
        }

        let sorted_time: Vec<NaiveDateTime> = order.iter().map(|&i| time[i]).collect();
        for (name, array) in self.vars.iter_mut().chain(self.coords.iter_mut()) {
            if !array.has_time_dim() {
                continue;
            }
            let reordered = match &array.values {
                ArrayValues::Eager(arr) => arr.select(Axis(0), &order),
                ArrayValues::Lazy(_) => {
                    return Err(Is2DataError::Generic(format!(
                        "Cannot sort lazy variable '{}' by time; persist the dataset first",
                        name
                    )))
                }
            };
            array.values = ArrayValues::Eager(reordered);
        }
        self.time = Some(sorted_time);
        Ok(())
    }

    /// Outer-join merge of several datasets along the time axis.
    ///
    /// The result's time coordinate is the sorted union of the input times.
    /// A field absent from a given input stays unfilled (NaN) at that input's
    /// time steps; last-one-wins is not the semantic. Spatial dimensions must
    /// agree across inputs.
    pub fn merge(parts: Vec<Dataset>) -> Result<Dataset> {
        if parts.is_empty() {
            return Err(Is2DataError::Generic(
                "Cannot merge an empty list of datasets".to_string(),
            ));
        }

        let mut union_time: Vec<NaiveDateTime> = Vec::new();
        for part in &parts {
            let time = part.time().ok_or_else(|| {
                Is2DataError::Generic("Cannot merge a dataset without a time coordinate".to_string())
            })?;
            union_time.extend_from_slice(time);
        }
        union_time.sort();
        union_time.dedup();

        let mut merged = Dataset::new();
        merged.time = Some(union_time.clone());
        merged.dims.insert(TIME_DIM.to_string(), union_time.len());

        for part in &parts {
            for (name, &len) in &part.dims {
                if name == TIME_DIM {
                    continue;
                }
                match merged.dims.get(name) {
                    Some(&existing) if existing != len => {
                        return Err(Is2DataError::DimensionMismatch {
                            name: name.clone(),
                            expected: existing,
                            found: len,
                        })
                    }
                    Some(_) => {}
                    None => {
                        merged.dims.insert(name.clone(), len);
                    }
                }
            }
            for (name, coord) in &part.coords {
                if !merged.coords.contains_key(name) {
                    merged.coords.insert(name.clone(), coord.clone());
                }
            }
            for (key, value) in &part.attrs {
                merged
                    .attrs
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }

        // Union of data fields, NaN-filled where a file does not carry them
        for part in &parts {
            let part_time = part.time().unwrap_or(&[]);
            for (name, array) in &part.vars {
                if !array.has_time_dim() {
                    merged
                        .vars
                        .entry(name.clone())
                        .or_insert_with(|| array.clone());
                    continue;
                }
                let values = array.values.as_eager().ok_or_else(|| {
                    Is2DataError::Generic(format!(
                        "Cannot merge lazy variable '{}'; persist the dataset first",
                        name
                    ))
                })?;

                let target = merged.vars.entry(name.clone()).or_insert_with(|| {
                    let mut shape = values.shape().to_vec();
                    shape[0] = union_time.len();
                    let mut dims = array.dims.clone();
                    dims[0] = TIME_DIM.to_string();
                    let mut filled = DataArray::eager(dims, ArrayD::from_elem(IxDyn(&shape), f64::NAN));
                    filled.attrs = array.attrs.clone();
                    filled
                });

                let target_values = match &mut target.values {
                    ArrayValues::Eager(arr) => arr,
                    ArrayValues::Lazy(_) => unreachable!("merged fields are always eager"),
                };
                for (step, stamp) in part_time.iter().enumerate() {
                    let slot = union_time
                        .binary_search(stamp)
                        .expect("union time contains every input time");
                    target_values
                        .index_axis_mut(Axis(0), slot)
                        .assign(&values.index_axis(Axis(0), step));
                }
            }
        }

        Ok(merged)
    }

    /// Rename a dimension and any coordinate or data field carrying that name
    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(len) = self.dims.remove(from) {
            self.dims.insert(to.to_string(), len);
        }
        for array in self.vars.values_mut().chain(self.coords.values_mut()) {
            for dim in array.dims.iter_mut() {
                if dim == from {
                    *dim = to.to_string();
                }
            }
        }
        if let Some(array) = self.coords.remove(from) {
            self.coords.insert(to.to_string(), array);
        }
        if let Some(array) = self.vars.remove(from) {
            self.vars.insert(to.to_string(), array);
        }
    }

    /// Force `longitude` and `latitude` to eager 2-D coordinate fields over
    /// (`y`,`x`).
    ///
    /// Downstream plotting cannot consume lazily chunked coordinates, so the
    /// loaders call this before returning.
    pub fn assign_latlon_2d(&mut self) -> Result<()> {
        for name in ["longitude", "latitude"] {
            let mut array = match self.coords.remove(name).or_else(|| self.vars.remove(name)) {
                Some(array) => array,
                None => {
                    return Err(Is2DataError::VariableNotFound {
                        var: name.to_string(),
                    })
                }
            };
            let values = array.values.as_eager().ok_or_else(|| {
                Is2DataError::Generic(format!(
                    "Coordinate '{}' is still lazily chunked; it must be materialized",
                    name
                ))
            })?;
            if values.ndim() != 2 {
                return Err(Is2DataError::Generic(format!(
                    "Coordinate '{}' must be 2-D over (y, x), found {} dimension(s)",
                    name,
                    values.ndim()
                )));
            }
            array.dims = vec!["y".to_string(), "x".to_string()];
            self.coords.insert(name.to_string(), array);
        }
        Ok(())
    }

    /// Whether every field of the dataset is materialized in memory
    pub fn is_fully_loaded(&self) -> bool {
        self.vars
            .values()
            .chain(self.coords.values())
            .all(|array| !array.values.is_lazy())
    }

    /// Eagerly materialize every lazily chunked variable.
    ///
    /// This is an explicit eager-materialization switch, not a cache: repeated
    /// loads re-open and re-materialize from the store.
    pub async fn persist(&mut self) -> Result<()> {
        for array in self.vars.values_mut().chain(self.coords.values_mut()) {
            if let ArrayValues::Lazy(lazy) = &array.values {
                let loaded = lazy.load().await?;
                array.values = ArrayValues::Eager(loaded);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::ArrayD;

    fn stamp(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .expect("Invalid date")
            .and_hms_opt(0, 0, 0)
            .expect("Invalid time")
    }

    fn grid_part(time: NaiveDateTime, var: &str, fill: f64) -> Dataset {
        let mut ds = Dataset::new();
        ds.insert_var(
            var,
            DataArray::eager(
                vec!["y".to_string(), "x".to_string()],
                ArrayD::from_elem(IxDyn(&[2, 3]), fill),
            ),
        );
        ds.assign_time(time);
        ds.expand_time_dim().unwrap();
        ds
    }

    #[test]
    fn test_expand_time_dim_leaves_coords_alone() {
        let mut ds = Dataset::new();
        ds.insert_var(
            "latitude",
            DataArray::eager(
                vec!["y".to_string(), "x".to_string()],
                ArrayD::from_elem(IxDyn(&[2, 3]), 80.0),
            ),
        );
        ds.insert_var(
            "thickness",
            DataArray::eager(
                vec!["y".to_string(), "x".to_string()],
                ArrayD::from_elem(IxDyn(&[2, 3]), 1.5),
            ),
        );
        ds.set_coords(&["latitude"]).unwrap();
        ds.assign_time(stamp(2021, 3, 1));
        ds.expand_time_dim().unwrap();

        assert_eq!(ds.var("thickness").unwrap().dims, ["time", "y", "x"]);
        assert_eq!(ds.var("thickness").unwrap().shape(), vec![1, 2, 3]);
        assert_eq!(ds.coord("latitude").unwrap().dims, ["y", "x"]);
    }

    #[test]
    fn test_merge_outer_join_fills_nan() {
        let a = grid_part(stamp(2021, 1, 1), "thickness", 1.0);
        let mut b = grid_part(stamp(2021, 2, 1), "thickness", 2.0);
        let extra = DataArray::eager(
            vec![
                TIME_DIM.to_string(),
                "y".to_string(),
                "x".to_string(),
            ],
            ArrayD::from_elem(IxDyn(&[1, 2, 3]), 0.3),
        );
        b.insert_var("snow_depth", extra);

        let merged = Dataset::merge(vec![b, a]).unwrap();
        assert_eq!(
            merged.time().unwrap(),
            &[stamp(2021, 1, 1), stamp(2021, 2, 1)]
        );

        let thickness = merged.var("thickness").unwrap().values.as_eager().unwrap();
        assert_eq!(thickness[[0, 0, 0]], 1.0);
        assert_eq!(thickness[[1, 0, 0]], 2.0);

        // snow_depth only exists in the February file
        let snow = merged.var("snow_depth").unwrap().values.as_eager().unwrap();
        assert!(snow[[0, 0, 0]].is_nan());
        assert_eq!(snow[[1, 0, 0]], 0.3);
    }

    #[test]
    fn test_merge_rejects_mismatched_grids() {
        let a = grid_part(stamp(2021, 1, 1), "thickness", 1.0);
        let mut b = Dataset::new();
        b.insert_var(
            "thickness",
            DataArray::eager(
                vec!["y".to_string(), "x".to_string()],
                ArrayD::from_elem(IxDyn(&[4, 3]), 2.0),
            ),
        );
        b.assign_time(stamp(2021, 2, 1));
        b.expand_time_dim().unwrap();

        let err = Dataset::merge(vec![a, b]).unwrap_err();
        assert!(matches!(
            err,
            Is2DataError::DimensionMismatch { ref name, .. } if name == "y"
        ));
    }

    #[test]
    fn test_sort_by_time_reorders_values() {
        let parts = vec![
            grid_part(stamp(2021, 3, 1), "thickness", 3.0),
            grid_part(stamp(2021, 1, 1), "thickness", 1.0),
            grid_part(stamp(2021, 2, 1), "thickness", 2.0),
        ];
        let mut merged = Dataset::merge(parts).unwrap();
        merged.sort_by_time().unwrap();

        assert_eq!(
            merged.time().unwrap(),
            &[stamp(2021, 1, 1), stamp(2021, 2, 1), stamp(2021, 3, 1)]
        );
        let values = merged.var("thickness").unwrap().values.as_eager().unwrap();
        assert_eq!(values[[0, 0, 0]], 1.0);
        assert_eq!(values[[1, 0, 0]], 2.0);
        assert_eq!(values[[2, 0, 0]], 3.0);
    }

    #[test]
    fn test_rename_legacy_grid_names() {
        let mut ds = Dataset::new();
        ds.insert_var(
            "xgrid",
            DataArray::eager(
                vec!["xgrid".to_string()],
                ArrayD::from_elem(IxDyn(&[3]), 0.0),
            ),
        );
        ds.insert_var(
            "thickness",
            DataArray::eager(
                vec!["ygrid".to_string(), "xgrid".to_string()],
                ArrayD::from_elem(IxDyn(&[2, 3]), 1.0),
            ),
        );
        ds.set_coords(&["xgrid"]).unwrap();
        ds.rename("xgrid", "x");
        ds.rename("ygrid", "y");

        assert!(ds.coord("x").is_some());
        assert!(ds.coord("xgrid").is_none());
        assert_eq!(ds.var("thickness").unwrap().dims, ["y", "x"]);
        assert_eq!(ds.dim_len("x"), Some(3));
    }
}
