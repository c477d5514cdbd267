//! Integration tests for zarr store reading, backed by a local filesystem
//! object store

use chrono::NaiveDate;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use is2_data::zarr_io::{open_zarr_dataset, ZarrStore};
use is2_data::ArrayValues;
use object_store::local::LocalFileSystem;
use object_store::ObjectStore;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn le_bytes(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn write_array(
    root: &Path,
    name: &str,
    shape: &[usize],
    chunks: &[usize],
    dims: &[&str],
    extra_attrs: serde_json::Value,
    chunk_data: &[(&str, Vec<u8>)],
) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).expect("Failed to create array dir");

    let zarray = json!({
        "zarr_format": 2,
        "shape": shape,
        "chunks": chunks,
        "dtype": "<f8",
        "compressor": null,
        "fill_value": null,
        "filters": null,
        "order": "C",
    });
    std::fs::write(dir.join(".zarray"), zarray.to_string()).expect("Failed to write .zarray");

    let mut zattrs = json!({ "_ARRAY_DIMENSIONS": dims });
    if let (Some(target), Some(source)) = (zattrs.as_object_mut(), extra_attrs.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
    std::fs::write(dir.join(".zattrs"), zattrs.to_string()).expect("Failed to write .zattrs");

    for (chunk_name, bytes) in chunk_data {
        std::fs::write(dir.join(chunk_name), bytes).expect("Failed to write chunk");
    }
}

/// Build a small store with the layout of the aggregated monthly product
fn write_monthly_like_store(root: &Path) {
    write_array(
        root,
        "time",
        &[2],
        &[2],
        &["time"],
        json!({ "units": "days since 2018-11-01" }),
        &[("0", le_bytes(&[0.0, 30.0]))],
    );
    write_array(
        root,
        "x",
        &[3],
        &[3],
        &["x"],
        json!({}),
        &[("0", le_bytes(&[0.0, 25000.0, 50000.0]))],
    );
    write_array(
        root,
        "y",
        &[2],
        &[2],
        &["y"],
        json!({}),
        &[("0", le_bytes(&[0.0, 25000.0]))],
    );
    write_array(
        root,
        "latitude",
        &[2, 3],
        &[2, 3],
        &["y", "x"],
        json!({}),
        &[("0.0", le_bytes(&[80.0, 80.1, 80.2, 80.3, 80.4, 80.5]))],
    );
    write_array(
        root,
        "longitude",
        &[2, 3],
        &[2, 3],
        &["y", "x"],
        json!({}),
        &[("0.0", le_bytes(&[-45.0, -45.1, -45.2, -45.3, -45.4, -45.5]))],
    );
    // One time step per chunk
    write_array(
        root,
        "ice_thickness",
        &[2, 2, 3],
        &[1, 2, 3],
        &["time", "y", "x"],
        json!({}),
        &[
            ("0.0.0", le_bytes(&[1.0, 1.1, 1.2, 1.3, 1.4, 1.5])),
            ("1.0.0", le_bytes(&[2.0, 2.1, 2.2, 2.3, 2.4, 2.5])),
        ],
    );
}

async fn open_store(root: &Path) -> ZarrStore {
    let store: Arc<dyn ObjectStore> =
        Arc::new(LocalFileSystem::new_with_prefix(root).expect("Failed to create local store"));
    ZarrStore::open(store, "").await.expect("Failed to open store")
}

#[tokio::test]
async fn test_open_store_coords_eager_vars_lazy() {
    let dir = tempdir().expect("Failed to create temp dir");
    write_monthly_like_store(dir.path());

    let zarr = open_store(dir.path()).await;
    let mut ds = open_zarr_dataset(&zarr).await.expect("Failed to open dataset");

    let time = ds.time().expect("No time coordinate");
    assert_eq!(
        time,
        &[
            NaiveDate::from_ymd_opt(2018, 11, 1)
                .expect("Invalid date")
                .and_hms_opt(0, 0, 0)
                .expect("Invalid time"),
            NaiveDate::from_ymd_opt(2018, 12, 1)
                .expect("Invalid date")
                .and_hms_opt(0, 0, 0)
                .expect("Invalid time"),
        ]
    );

    // Data variables stay lazily chunked until persisted
    assert!(matches!(
        ds.var("ice_thickness").expect("Missing ice_thickness").values,
        ArrayValues::Lazy(_)
    ));

    // Plotting coordinates come back eager, 2-D over (y, x)
    ds.assign_latlon_2d().expect("Failed to normalize coordinates");
    for name in ["latitude", "longitude"] {
        let coord = ds.coord(name).expect("Missing plotting coordinate");
        assert_eq!(coord.dims, ["y", "x"]);
        let values = coord.values.as_eager().expect("Coordinate left lazy");
        assert_eq!(values.ndim(), 2);
        assert_eq!(values.shape(), &[2, 3]);
    }
}

#[tokio::test]
async fn test_persist_materializes_all_chunks() {
    let dir = tempdir().expect("Failed to create temp dir");
    write_monthly_like_store(dir.path());

    let zarr = open_store(dir.path()).await;
    let mut ds = open_zarr_dataset(&zarr).await.expect("Failed to open dataset");
    assert!(!ds.is_fully_loaded());

    ds.persist().await.expect("Failed to persist dataset");
    assert!(ds.is_fully_loaded());

    let thickness = ds
        .var("ice_thickness")
        .expect("Missing ice_thickness")
        .values
        .as_eager()
        .expect("ice_thickness still lazy after persist");
    assert_eq!(thickness.shape(), &[2, 2, 3]);
    assert_eq!(thickness[[0, 0, 0]], 1.0);
    assert_eq!(thickness[[0, 1, 2]], 1.5);
    assert_eq!(thickness[[1, 0, 0]], 2.0);
    assert_eq!(thickness[[1, 1, 2]], 2.5);
}

#[tokio::test]
async fn test_edge_chunks_only_fill_their_region() {
    let dir = tempdir().expect("Failed to create temp dir");
    // shape 3 with chunk size 2: the second chunk overhangs by one element
    write_array(
        dir.path(),
        "edge",
        &[3],
        &[2],
        &["edge"],
        json!({}),
        &[
            ("0", le_bytes(&[1.0, 2.0])),
            ("1", le_bytes(&[3.0, 99.0])),
        ],
    );

    let zarr = open_store(dir.path()).await;
    let meta = zarr
        .array_metadata("edge")
        .await
        .expect("Failed to read metadata");
    let values = zarr.read_array(&meta).await.expect("Failed to read array");

    assert_eq!(values.shape(), &[3]);
    assert_eq!(values[[0]], 1.0);
    assert_eq!(values[[1]], 2.0);
    assert_eq!(values[[2]], 3.0);
}

#[tokio::test]
async fn test_missing_chunk_reads_as_nan() {
    let dir = tempdir().expect("Failed to create temp dir");
    write_array(
        dir.path(),
        "gappy",
        &[4],
        &[2],
        &["gappy"],
        json!({}),
        &[("0", le_bytes(&[1.0, 2.0]))],
    );

    let zarr = open_store(dir.path()).await;
    let meta = zarr
        .array_metadata("gappy")
        .await
        .expect("Failed to read metadata");
    let values = zarr.read_array(&meta).await.expect("Failed to read array");

    assert_eq!(values[[0]], 1.0);
    assert_eq!(values[[1]], 2.0);
    assert!(values[[2]].is_nan());
    assert!(values[[3]].is_nan());
}

#[tokio::test]
async fn test_finite_fill_value_masked_to_nan() {
    let dir = tempdir().expect("Failed to create temp dir");
    let root = dir.path().join("masked");
    std::fs::create_dir_all(&root).expect("Failed to create array dir");

    let zarray = json!({
        "zarr_format": 2,
        "shape": [3],
        "chunks": [3],
        "dtype": "<f8",
        "compressor": null,
        "fill_value": -999.0,
        "filters": null,
        "order": "C",
    });
    std::fs::write(root.join(".zarray"), zarray.to_string()).expect("Failed to write .zarray");
    std::fs::write(root.join("0"), le_bytes(&[1.0, -999.0, 3.0])).expect("Failed to write chunk");

    let zarr = open_store(dir.path()).await;
    let meta = zarr
        .array_metadata("masked")
        .await
        .expect("Failed to read metadata");
    let values = zarr.read_array(&meta).await.expect("Failed to read array");

    assert_eq!(values[[0]], 1.0);
    assert!(values[[1]].is_nan());
    assert_eq!(values[[2]], 3.0);
}

#[tokio::test]
async fn test_zlib_compressed_chunks() {
    let dir = tempdir().expect("Failed to create temp dir");
    let root = dir.path().join("packed");
    std::fs::create_dir_all(&root).expect("Failed to create array dir");

    let zarray = json!({
        "zarr_format": 2,
        "shape": [2],
        "chunks": [2],
        "dtype": "<f8",
        "compressor": { "id": "zlib", "level": 1 },
        "fill_value": null,
        "filters": null,
        "order": "C",
    });
    std::fs::write(root.join(".zarray"), zarray.to_string()).expect("Failed to write .zarray");

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&le_bytes(&[7.5, -2.5]))
        .expect("Failed to compress chunk");
    let compressed = encoder.finish().expect("Failed to finish compression");
    std::fs::write(root.join("0"), compressed).expect("Failed to write chunk");

    let zarr = open_store(dir.path()).await;
    let meta = zarr
        .array_metadata("packed")
        .await
        .expect("Failed to read metadata");
    let values = zarr.read_array(&meta).await.expect("Failed to read array");

    assert_eq!(values[[0]], 7.5);
    assert_eq!(values[[1]], -2.5);
}

#[tokio::test]
async fn test_consolidated_metadata_is_preferred() {
    let dir = tempdir().expect("Failed to create temp dir");

    // Chunks only; all metadata lives in the consolidated object
    std::fs::create_dir_all(dir.path().join("solo")).expect("Failed to create array dir");
    std::fs::write(dir.path().join("solo/0"), le_bytes(&[4.0, 5.0]))
        .expect("Failed to write chunk");

    let zmetadata = json!({
        "zarr_consolidated_format": 1,
        "metadata": {
            ".zgroup": { "zarr_format": 2 },
            "solo/.zarray": {
                "zarr_format": 2,
                "shape": [2],
                "chunks": [2],
                "dtype": "<f8",
                "compressor": null,
                "fill_value": null,
                "filters": null,
                "order": "C",
            },
            "solo/.zattrs": { "_ARRAY_DIMENSIONS": ["solo"] },
        },
    });
    std::fs::write(dir.path().join(".zmetadata"), zmetadata.to_string())
        .expect("Failed to write .zmetadata");

    let zarr = open_store(dir.path()).await;
    let names = zarr
        .list_array_names()
        .await
        .expect("Failed to list arrays");
    assert_eq!(names, vec!["solo".to_string()]);

    let meta = zarr
        .array_metadata("solo")
        .await
        .expect("Failed to read metadata");
    assert_eq!(meta.dimensions, vec!["solo".to_string()]);
    let values = zarr.read_array(&meta).await.expect("Failed to read array");
    assert_eq!(values[[0]], 4.0);
    assert_eq!(values[[1]], 5.0);
}
