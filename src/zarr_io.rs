//! Zarr store I/O
//!
//! Reads Zarr v2 stores over an [`ObjectStore`] backend, which covers both
//! the anonymous S3 bucket and local directories. Metadata objects
//! (consolidated `.zmetadata` when present, per-array `.zarray`/`.zattrs`
//! otherwise) are parsed with serde_json. Data variables are exposed as
//! [`LazyVariable`] handles so the store can be opened without pulling every
//! chunk; coordinates needed by plotting are materialized at open time.

use crate::dataset::{DataArray, Dataset};
use crate::errors::{Is2DataError, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use flate2::read::ZlibDecoder;
use ndarray::{ArrayD, IxDyn};
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

/// Chunk compression codec declared in `.zarray` metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compressor {
    /// No compression, chunks hold raw little-endian values
    Raw,
    /// zlib-compressed chunks
    Zlib,
    /// Codec this reader does not implement; reading chunks fails with its id
    Unsupported(String),
}

/// Metadata for one array of a Zarr store
#[derive(Debug, Clone)]
pub struct ZarrArrayMeta {
    pub name: String,
    pub shape: Vec<usize>,
    pub chunks: Vec<usize>,
    pub dtype: String,
    pub fill_value: Option<f64>,
    pub compressor: Compressor,
    pub dimension_separator: String,
    /// Dimension names from the `_ARRAY_DIMENSIONS` attribute
    pub dimensions: Vec<String>,
    /// String attributes from `.zattrs`
    pub attrs: BTreeMap<String, String>,
}

/// Handle to a Zarr v2 store behind an object store
#[derive(Debug, Clone)]
pub struct ZarrStore {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    consolidated: Option<Arc<JsonValue>>,
}

impl ZarrStore {
    /// Open a store, picking up consolidated metadata when the store has it
    pub async fn open(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Result<Self> {
        let mut zarr = Self {
            store,
            prefix: prefix.into().trim_matches('/').to_string(),
            consolidated: None,
        };
        if let Some(zmetadata) = zarr.get_json(".zmetadata").await? {
            let metadata = zmetadata
                .get("metadata")
                .cloned()
                .ok_or_else(|| Is2DataError::ZarrError(
                    "Consolidated .zmetadata is missing its 'metadata' map".to_string(),
                ))?;
            zarr.consolidated = Some(Arc::new(metadata));
        }
        Ok(zarr)
    }

    fn object_path(&self, suffix: &str) -> ObjectPath {
        if self.prefix.is_empty() {
            ObjectPath::from(suffix)
        } else {
            ObjectPath::from(format!("{}/{}", self.prefix, suffix))
        }
    }

    /// Fetch and parse a JSON metadata object, `None` if absent
    async fn get_json(&self, suffix: &str) -> Result<Option<JsonValue>> {
        match self.store.get(&self.object_path(suffix)).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Metadata JSON for a store key, from the consolidated map or the object
    async fn metadata_json(&self, key: &str) -> Result<Option<JsonValue>> {
        if let Some(consolidated) = &self.consolidated {
            return Ok(consolidated.get(key).cloned());
        }
        self.get_json(key).await
    }

    /// List the names of all arrays in the store
    pub async fn list_array_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        if let Some(consolidated) = &self.consolidated {
            let map = consolidated.as_object().ok_or_else(|| {
                Is2DataError::ZarrError("Consolidated metadata is not a JSON object".to_string())
            })?;
            for key in map.keys() {
                if let Some(name) = key.strip_suffix("/.zarray") {
                    names.push(name.to_string());
                }
            }
        } else {
            let prefix = if self.prefix.is_empty() {
                None
            } else {
                Some(ObjectPath::from(self.prefix.clone()))
            };
            let mut stream = self.store.list(prefix.as_ref());
            while let Some(meta) = futures::TryStreamExt::try_next(&mut stream).await? {
                let key = meta.location.as_ref();
                let key = key.strip_prefix(self.prefix.as_str()).unwrap_or(key);
                let key = key.trim_start_matches('/');
                if let Some(name) = key.strip_suffix("/.zarray") {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Read and parse the `.zarray`/`.zattrs` metadata of one array
    pub async fn array_metadata(&self, name: &str) -> Result<ZarrArrayMeta> {
        let zarray = self
            .metadata_json(&format!("{}/.zarray", name))
            .await?
            .ok_or_else(|| Is2DataError::ZarrError(format!(
                "Array metadata not found for '{}'",
                name
            )))?;

        let shape = usize_list(&zarray, "shape", name)?;
        let chunks = usize_list(&zarray, "chunks", name)?;
        let dtype = zarray["dtype"].as_str().unwrap_or("unknown").to_string();

        let fill_value = match &zarray["fill_value"] {
            JsonValue::Null => None,
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) if s == "NaN" => Some(f64::NAN),
            other => {
                return Err(Is2DataError::ZarrError(format!(
                    "Unrecognized fill_value {:?} on array '{}'",
                    other, name
                )))
            }
        };

        let compressor = match &zarray["compressor"] {
            JsonValue::Null => Compressor::Raw,
            JsonValue::Object(obj) => match obj.get("id").and_then(JsonValue::as_str) {
                Some("zlib") => Compressor::Zlib,
                Some(id) => Compressor::Unsupported(id.to_string()),
                None => Compressor::Unsupported("unnamed".to_string()),
            },
            other => {
                return Err(Is2DataError::ZarrError(format!(
                    "Unrecognized compressor {:?} on array '{}'",
                    other, name
                )))
            }
        };

        let dimension_separator = zarray["dimension_separator"]
            .as_str()
            .unwrap_or(".")
            .to_string();

        let mut dimensions = Vec::new();
        let mut attrs = BTreeMap::new();
        if let Some(zattrs) = self.metadata_json(&format!("{}/.zattrs", name)).await? {
            if let Some(dims) = zattrs["_ARRAY_DIMENSIONS"].as_array() {
                dimensions = dims
                    .iter()
                    .filter_map(|d| d.as_str().map(str::to_string))
                    .collect();
            }
            if let Some(map) = zattrs.as_object() {
                for (key, value) in map {
                    if let Some(s) = value.as_str() {
                        attrs.insert(key.clone(), s.to_string());
                    }
                }
            }
        }
        if dimensions.is_empty() {
            dimensions = (0..shape.len()).map(|i| format!("dim_{}", i)).collect();
        }

        Ok(ZarrArrayMeta {
            name: name.to_string(),
            shape,
            chunks,
            dtype,
            fill_value,
            compressor,
            dimension_separator,
            dimensions,
            attrs,
        })
    }

    /// Read an entire array, walking its chunk grid.
    ///
    /// Absent chunk objects keep the fill value, which is then masked to NaN
    /// along with every stored fill-value element.
    pub async fn read_array(&self, meta: &ZarrArrayMeta) -> Result<ArrayD<f64>> {
        let fill = meta.fill_value.unwrap_or(f64::NAN);
        let mut output = ArrayD::from_elem(IxDyn(&meta.shape), fill);

        let grid: Vec<usize> = meta
            .shape
            .iter()
            .zip(&meta.chunks)
            .map(|(&s, &c)| if c == 0 { 1 } else { s.div_ceil(c) })
            .collect();
        let chunk_elems: usize = meta.chunks.iter().product();

        let mut index = vec![0usize; grid.len()];
        loop {
            let chunk_name: String = if index.is_empty() {
                "0".to_string()
            } else {
                index
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(&meta.dimension_separator)
            };
            let key = self.object_path(&format!("{}/{}", meta.name, chunk_name));

            match self.store.get(&key).await {
                Ok(result) => {
                    let bytes = result.bytes().await?;
                    let values = decode_chunk(
                        &bytes,
                        &meta.dtype,
                        &meta.compressor,
                        chunk_elems.max(1),
                        &meta.name,
                    )?;
                    place_chunk(&mut output, meta, &index, &values)?;
                }
                Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            // Advance the chunk-grid odometer
            let mut dim = index.len();
            loop {
                if dim == 0 {
                    break;
                }
                dim -= 1;
                index[dim] += 1;
                if index[dim] < grid[dim] {
                    break;
                }
                index[dim] = 0;
            }
            if index.iter().all(|&i| i == 0) {
                break;
            }
        }

        if let Some(fill) = meta.fill_value {
            if fill.is_finite() {
                output.mapv_inplace(|v| if v == fill { f64::NAN } else { v });
            }
        }
        Ok(output)
    }
}

/// Parse a list of array sizes out of `.zarray` metadata
fn usize_list(zarray: &JsonValue, key: &str, array_name: &str) -> Result<Vec<usize>> {
    zarray[key]
        .as_array()
        .ok_or_else(|| Is2DataError::ZarrError(format!(
            "Missing {} in metadata for array '{}'",
            key, array_name
        )))?
        .iter()
        .map(|v| {
            v.as_u64().map(|v| v as usize).ok_or_else(|| {
                Is2DataError::ZarrError(format!(
                    "Non-integer {} entry in metadata for array '{}'",
                    key, array_name
                ))
            })
        })
        .collect()
}

/// Copy one decoded chunk into its slot of the output array, honoring
/// edge-chunk overhang
fn place_chunk(
    output: &mut ArrayD<f64>,
    meta: &ZarrArrayMeta,
    chunk_index: &[usize],
    values: &[f64],
) -> Result<()> {
    let ndim = meta.shape.len();
    if ndim == 0 {
        if let Some(&value) = values.first() {
            output[IxDyn(&[])] = value;
        }
        return Ok(());
    }

    let chunk_elems: usize = meta.chunks.iter().product();
    let chunk = ArrayD::from_shape_vec(IxDyn(&meta.chunks), values[..chunk_elems].to_vec())?;
    let starts: Vec<usize> = (0..ndim).map(|d| chunk_index[d] * meta.chunks[d]).collect();
    let region: Vec<usize> = (0..ndim)
        .map(|d| meta.shape[d].saturating_sub(starts[d]).min(meta.chunks[d]))
        .collect();

    for idx in ndarray::indices(IxDyn(&region)) {
        let local: Vec<usize> = (0..ndim).map(|d| idx[d]).collect();
        let global: Vec<usize> = local.iter().zip(&starts).map(|(&i, &s)| i + s).collect();
        output[IxDyn(&global)] = chunk[IxDyn(&local)];
    }
    Ok(())
}

/// Decompress and decode one chunk object into `f64` values
fn decode_chunk(
    bytes: &[u8],
    dtype: &str,
    compressor: &Compressor,
    expected: usize,
    array_name: &str,
) -> Result<Vec<f64>> {
    let raw: Vec<u8> = match compressor {
        Compressor::Raw => bytes.to_vec(),
        Compressor::Zlib => {
            let mut decoded = Vec::new();
            ZlibDecoder::new(bytes).read_to_end(&mut decoded)?;
            decoded
        }
        Compressor::Unsupported(id) => {
            return Err(Is2DataError::ZarrError(format!(
                "Compressor '{}' on array '{}' is not supported",
                id, array_name
            )))
        }
    };

    let values: Vec<f64> = match dtype.trim_start_matches(['<', '|']) {
        "f8" => raw
            .chunks_exact(8)
            .map(|b| {
                f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            })
            .collect(),
        "f4" => raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
        "i4" => raw
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
        "i8" => raw
            .chunks_exact(8)
            .map(|b| {
                i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64
            })
            .collect(),
        other => {
            return Err(Is2DataError::ZarrError(format!(
                "Unsupported dtype '{}' on array '{}'",
                other, array_name
            )))
        }
    };

    if values.len() < expected {
        return Err(Is2DataError::ZarrError(format!(
            "Chunk of array '{}' holds {} values, expected {}",
            array_name,
            values.len(),
            expected
        )));
    }
    Ok(values)
}

/// Decode CF-style numeric time values ("days since 2018-11-01") into
/// timestamps
pub fn decode_cf_time(values: &[f64], units: &str) -> Result<Vec<NaiveDateTime>> {
    let (unit, epoch_str) = units
        .split_once(" since ")
        .ok_or_else(|| Is2DataError::ZarrError(format!(
            "Unrecognized time units '{}'",
            units
        )))?;

    let epoch_str = epoch_str.trim();
    let epoch = NaiveDateTime::parse_from_str(epoch_str, "%Y-%m-%d %H:%M:%S").or_else(|_| {
        NaiveDate::parse_from_str(epoch_str, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN))
    })?;

    let seconds_per = match unit.trim() {
        "days" | "day" | "d" => 86_400.0,
        "hours" | "hour" | "h" => 3_600.0,
        "minutes" | "minute" | "min" => 60.0,
        "seconds" | "second" | "s" => 1.0,
        other => {
            return Err(Is2DataError::ZarrError(format!(
                "Unsupported time unit '{}'",
                other
            )))
        }
    };

    Ok(values
        .iter()
        .map(|&v| epoch + Duration::seconds((v * seconds_per).round() as i64))
        .collect())
}

/// Lazily chunked variable backed by a zarr store.
///
/// Holds only the store handle and array metadata; [`LazyVariable::load`]
/// pulls and decodes the chunks on demand.
#[derive(Debug, Clone)]
pub struct LazyVariable {
    store: ZarrStore,
    meta: ZarrArrayMeta,
}

impl LazyVariable {
    pub fn new(store: ZarrStore, meta: ZarrArrayMeta) -> Self {
        Self { store, meta }
    }

    /// Array shape without loading data
    pub fn shape(&self) -> &[usize] {
        &self.meta.shape
    }

    /// Array metadata without loading data
    pub fn metadata(&self) -> &ZarrArrayMeta {
        &self.meta
    }

    /// Pull every chunk of the array from the store
    pub async fn load(&self) -> Result<ArrayD<f64>> {
        self.store.read_array(&self.meta).await
    }
}

/// Open a zarr store as a [`Dataset`].
///
/// Dimension names come from the `_ARRAY_DIMENSIONS` attributes. The `time`
/// coordinate is decoded from its CF units, 1-D dimension coordinates and the
/// 2-D `latitude`/`longitude` fields are materialized at open time, and every
/// remaining array becomes a lazily chunked data field.
pub async fn open_zarr_dataset(store: &ZarrStore) -> Result<Dataset> {
    let names = store.list_array_names().await?;
    if names.is_empty() {
        return Err(Is2DataError::ZarrError(
            "Store contains no arrays".to_string(),
        ));
    }

    let mut ds = Dataset::new();
    for name in names {
        let meta = store.array_metadata(&name).await?;
        let dims = meta.dimensions.clone();

        if name == "time" {
            let units = meta
                .attrs
                .get("units")
                .ok_or_else(|| Is2DataError::AttributeNotFound {
                    var: "time".to_string(),
                    attr: "units".to_string(),
                })?
                .clone();
            let values = store.read_array(&meta).await?;
            let raw: Vec<f64> = values.iter().cloned().collect();
            ds.set_time_values(decode_cf_time(&raw, &units)?);
            continue;
        }

        let is_coordinate = name == "latitude"
            || name == "longitude"
            || (dims.len() == 1 && dims[0] == name);
        if is_coordinate {
            let values = store.read_array(&meta).await?;
            let mut array = DataArray::eager(dims, values);
            array.attrs = meta.attrs.clone();
            ds.insert_coord(name, array);
        } else {
            let mut array = DataArray::lazy(dims, LazyVariable::new(store.clone(), meta.clone()));
            array.attrs = meta.attrs.clone();
            ds.insert_var(name, array);
        }
    }

    if let Some(zattrs) = store.metadata_json(".zattrs").await? {
        if let Some(map) = zattrs.as_object() {
            for (key, value) in map {
                if let Some(s) = value.as_str() {
                    ds.set_attr(key, s);
                }
            }
        }
    }

    Ok(ds)
}
