//! Client session over one bucket
//!
//! [`ArchiveClient`] is the entry point for library users. It owns the store
//! handle and bucket name and hands them to the catalog, uploader and
//! downloader, so nothing in the crate reaches for global state.
//!
//! ```rust,no_run
//! use djarchive::{ArchiveClient, ArchiveConfig, DownloadOptions};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ArchiveClient::from_config(&ArchiveConfig::directory("/srv/archive", "djarchive"))?;
//! for revision in client.revisions(Some("acme"))? {
//!     println!("{}", revision);
//! }
//!
//! let report = client.download("acme", "rev1", Path::new("./acme"), DownloadOptions::default())?;
//! println!("{} files fetched, {} issues", report.files_transferred, report.issue_count());
//! # Ok(())
//! # }
//! ```

use crate::catalog::{Catalog, Groupings, Revision};
use crate::config::ArchiveConfig;
use crate::download::Downloader;
use crate::error::Result;
use crate::store::ObjectStore;
use crate::types::{DownloadOptions, DownloadReport, UploadOptions, UploadReport};
use crate::upload::Uploader;
use std::path::Path;
use tracing::debug;

/// A store handle bound to a bucket
pub struct ArchiveClient {
    store: Box<dyn ObjectStore>,
    bucket: String,
}

impl std::fmt::Debug for ArchiveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveClient")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl ArchiveClient {
    /// Wrap an existing store
    pub fn new(store: Box<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Validate `config` and open the store it points at
    ///
    /// # Errors
    ///
    /// - [`crate::ArchiveError::InvalidConfiguration`] if validation fails or
    ///   the endpoint scheme is unsupported
    /// - [`crate::ArchiveError::NotFound`] if a client-scope store does not exist
    pub fn from_config(config: &ArchiveConfig) -> Result<Self> {
        let store = config.open_store()?;
        debug!("Connected to {} (bucket '{}')", config.endpoint, config.bucket);
        Ok(Self::new(store, config.bucket.clone()))
    }

    /// Bucket this client operates on
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Underlying store
    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Catalog view of the bucket
    pub fn catalog(&self) -> Catalog<'_> {
        Catalog::new(self.store(), &self.bucket)
    }

    /// Lazily list dataset names
    pub fn datasets(&self) -> Groupings<'_> {
        self.catalog().datasets()
    }

    /// List revisions of one dataset, or of all datasets
    pub fn revisions(&self, dataset: Option<&str>) -> Result<Vec<Revision>> {
        self.catalog().revisions(dataset)
    }

    /// Publish `source` as `name/revision`
    pub fn upload(
        &self,
        name: &str,
        revision: &str,
        source: &Path,
        options: UploadOptions,
    ) -> Result<UploadReport> {
        Uploader::new(self.store(), &self.bucket, options).upload(name, revision, source)
    }

    /// Retrieve `name/revision` into `target`
    pub fn download(
        &self,
        name: &str,
        revision: &str,
        target: &Path,
        options: DownloadOptions,
    ) -> Result<DownloadReport> {
        Downloader::new(self.store(), &self.bucket, options).download(name, revision, target)
    }
}
