//! Pre-merged book dataset loader
//!
//! Fetches the single merged netcdf file used by the notebooks, caching it in
//! the local data directory. The file is opened as-is: no merging, no
//! coordinate promotion, no normalization.

use crate::config::BookConfig;
use crate::dataset::Dataset;
use crate::errors::Result;
use crate::netcdf_io;
use crate::storage::ObjectFetcher;

/// Read the pre-merged book dataset, downloading it first when it is not
/// already cached locally.
///
/// When the target file exists no fetch call happens at all; otherwise the
/// single object is fetched through the given transfer mechanism before the
/// open. Open failures propagate unchanged.
pub async fn read_book_data(config: &BookConfig, fetcher: &dyn ObjectFetcher) -> Result<Dataset> {
    let local_file = config.local_file();

    if !local_file.exists() {
        println!("📥 Downloading jupyter book data from the bucket...");
        fetcher.fetch(&config.remote_key(), &local_file).await?;
    }

    netcdf_io::open_dataset(&local_file)
}
