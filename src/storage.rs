//! Remote object storage access
//!
//! All remote reads go through anonymous (unauthenticated) bucket access:
//! object listing, bulk download of per-month files, and single-object fetch
//! for the book dataset. Downloads are sequential blocking calls with no
//! retry; a failed item aborts the remaining loop and the error surfaces
//! unchanged.

use crate::config::StorageConfig;
use crate::errors::{Is2DataError, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// Build an anonymous S3 client for the configured bucket.
///
/// Request signing is skipped; the ICESat-2 buckets are public-read.
pub fn anonymous_s3(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    let store = AmazonS3Builder::new()
        .with_bucket_name(&config.bucket_name)
        .with_region(&config.region)
        .with_skip_signature(true)
        .build()?;
    Ok(Arc::new(store))
}

/// List every object key under a prefix, sorted by key
pub async fn list_objects(store: &Arc<dyn ObjectStore>, prefix: &str) -> Result<Vec<ObjectPath>> {
    let prefix = ObjectPath::from(prefix);
    let mut keys: Vec<ObjectPath> = store
        .list(Some(&prefix))
        .map_ok(|meta| meta.location)
        .try_collect()
        .await?;
    keys.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));
    Ok(keys)
}

/// Download every object under a prefix into a local directory.
///
/// Existing local copies are not skipped; each call re-downloads everything
/// present remotely. Returns the local paths written.
pub async fn download_objects(
    store: &Arc<dyn ObjectStore>,
    prefix: &str,
    local_dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(local_dir)?;

    let keys = list_objects(store, prefix).await?;
    let mut downloaded = Vec::with_capacity(keys.len());
    for key in keys {
        let filename = match key.filename() {
            Some(name) => name.to_string(),
            None => continue,
        };
        println!("📥 Downloading file from bucket to local storage... {}", key);
        let bytes = store.get(&key).await?.bytes().await?;
        let target = local_dir.join(filename);
        std::fs::write(&target, &bytes)?;
        downloaded.push(target);
    }
    Ok(downloaded)
}

/// Copy one named remote object to a named local path.
///
/// The two implementations reflect the two transfer mechanisms in use: a
/// direct object-storage client call ([`S3Fetcher`]) and a shell-out to the
/// `gsutil` command-line tool ([`GsutilFetcher`]).
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    async fn fetch(&self, remote_key: &str, local_path: &Path) -> Result<()>;
}

/// Fetches single objects through the anonymous S3 client
pub struct S3Fetcher {
    store: Arc<dyn ObjectStore>,
}

impl S3Fetcher {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        Ok(Self {
            store: anonymous_s3(config)?,
        })
    }

    pub fn with_store(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ObjectFetcher for S3Fetcher {
    async fn fetch(&self, remote_key: &str, local_path: &Path) -> Result<()> {
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let key = ObjectPath::from(remote_key);
        let bytes = self.store.get(&key).await?.bytes().await?;
        std::fs::write(local_path, &bytes)?;
        Ok(())
    }
}

/// Fetches single objects from a Google Cloud Storage bucket by shelling out
/// to `gsutil cp`
pub struct GsutilFetcher {
    pub bucket: String,
}

impl GsutilFetcher {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectFetcher for GsutilFetcher {
    async fn fetch(&self, remote_key: &str, local_path: &Path) -> Result<()> {
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let source = format!("gs://{}/{}", self.bucket, remote_key);
        let status = Command::new("gsutil")
            .arg("cp")
            .arg(&source)
            .arg(local_path)
            .status()?;
        if !status.success() {
            return Err(Is2DataError::FetchError(format!(
                "gsutil cp {} exited with {}",
                source, status
            )));
        }
        Ok(())
    }
}
