//! Publishing a local tree as a dataset revision
//!
//! The protocol depends on whether the source tree already carries a manifest:
//!
//! - **Create**: no manifest. Every file is digested and pushed, and a new
//!   manifest is assembled from the results. Once the walk succeeds the
//!   manifest is written into the tree and pushed.
//! - **Verify**: a manifest exists. Every file must be listed in it and match
//!   its entry before it is pushed; the first violation aborts the upload.
//!   Entries with no local file abort it as well.
//!
//! In both modes the manifest object is written last. A revision whose upload
//! was interrupted therefore has data objects but no manifest, which readers
//! treat as incomplete.

use crate::digest::digest_file;
use crate::error::{ArchiveError, Result};
use crate::file_tracking::FileTracker;
use crate::manifest::{Manifest, ManifestEntry, MANIFEST_FILENAME};
use crate::path_codec::{denormalize, manifest_key, object_key, validate_name};
use crate::store::ObjectStore;
use crate::types::{IntegrityIssue, ProgressInfo, UploadMode, UploadOptions, UploadReport};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument, trace};

/// Pushes local trees to a bucket
pub struct Uploader<'a> {
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    options: UploadOptions,
}

impl std::fmt::Debug for Uploader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("bucket", &self.bucket)
            .field("options", &self.options)
            .finish()
    }
}

/// Running totals for one upload
#[derive(Default)]
struct Totals {
    files: usize,
    bytes: u64,
}

impl<'a> Uploader<'a> {
    /// Create an uploader writing into `bucket`
    pub fn new(store: &'a dyn ObjectStore, bucket: &'a str, options: UploadOptions) -> Self {
        Self {
            store,
            bucket,
            options,
        }
    }

    /// Upload `source` as revision `revision` of dataset `name`
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::NotFound`] if `source` is missing, or in verify mode
    ///   if a file has no manifest entry or an entry has no file
    /// - [`ArchiveError::IntegrityMismatch`] in verify mode if a file disagrees
    ///   with its entry
    /// - [`ArchiveError::Corrupt`] if the existing manifest cannot be loaded
    #[instrument(skip(self, source), fields(source = %source.display()))]
    pub fn upload(&self, name: &str, revision: &str, source: &Path) -> Result<UploadReport> {
        validate_name(name)?;
        validate_name(revision)?;
        if !source.is_dir() {
            return Err(ArchiveError::not_found(format!("source directory {:?}", source)));
        }

        let start = Instant::now();
        let tracker = FileTracker::new(source.to_path_buf())
            .with_ignore_patterns(&self.options.ignore_patterns)?
            .with_follow_symlinks(self.options.follow_symlinks);
        let manifest_path = source.join(MANIFEST_FILENAME);

        let (mode, totals) = if manifest_path.is_file() {
            info!("Uploading {}/{} from {:?} against existing manifest", name, revision, source);
            let manifest = Manifest::read(&manifest_path)?;
            (UploadMode::Verify, self.verify_and_push(name, revision, source, &tracker, &manifest)?)
        } else {
            info!("Uploading {}/{} from {:?}, generating manifest", name, revision, source);
            let (manifest, totals) = self.push_and_record(name, revision, &tracker)?;
            manifest.write(&manifest_path, false)?;
            (UploadMode::Create, totals)
        };

        let key = manifest_key(name, revision);
        self.store.put_object_from_file(self.bucket, &key, &manifest_path)?;
        debug!("Published manifest {}", key);

        let report = UploadReport {
            mode,
            files_uploaded: totals.files,
            bytes_uploaded: totals.bytes,
            manifest_key: key,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Uploaded {} files ({} bytes) to {}/{} in {}ms",
            report.files_uploaded, report.bytes_uploaded, name, revision, report.duration_ms
        );
        Ok(report)
    }

    fn push_and_record(
        &self,
        name: &str,
        revision: &str,
        tracker: &FileTracker,
    ) -> Result<(Manifest, Totals)> {
        let mut manifest = Manifest::new();
        let mut totals = Totals::default();

        for file in tracker.files()? {
            let file = file?;
            let digest = digest_file(&file.path)?;
            self.push(name, revision, &file.subpath, &file.path)?;
            manifest.insert(ManifestEntry::new(file.subpath.clone(), digest.size, digest.hash))?;

            totals.files += 1;
            totals.bytes += digest.size;
            self.report_progress(&file.subpath, &totals, None);
        }

        Ok((manifest, totals))
    }

    fn verify_and_push(
        &self,
        name: &str,
        revision: &str,
        source: &Path,
        tracker: &FileTracker,
        manifest: &Manifest,
    ) -> Result<Totals> {
        let mut totals = Totals::default();
        let mut seen = HashSet::with_capacity(manifest.len());

        for file in tracker.files()? {
            let file = file?;
            let entry = manifest
                .get(&file.subpath)
                .ok_or_else(|| IntegrityIssue::unlisted(&file.subpath).into_error())?;

            let digest = digest_file(&file.path)?;
            if !digest.matches(entry) {
                return Err(IntegrityIssue::mismatch(entry, &digest).into_error());
            }

            self.push(name, revision, &file.subpath, &file.path)?;
            seen.insert(file.subpath.clone());

            totals.files += 1;
            totals.bytes += digest.size;
            self.report_progress(&file.subpath, &totals, Some(manifest));
        }

        if let Some(entry) = manifest.iter().find(|entry| !seen.contains(&entry.subpath)) {
            // Present on disk but not walked: ignored or an unfollowed symlink
            if denormalize(source, &entry.subpath).symlink_metadata().is_ok() {
                return Err(ArchiveError::not_found(format!(
                    "'{}' is in the manifest but was skipped by the ignore patterns or symlink policy",
                    entry.subpath
                )));
            }
            return Err(IntegrityIssue::missing(&entry.subpath).into_error());
        }

        Ok(totals)
    }

    fn push(&self, name: &str, revision: &str, subpath: &str, path: &Path) -> Result<()> {
        let key = object_key(name, revision, subpath);
        trace!("Pushing {:?} to {}", path, key);
        self.store.put_object_from_file(self.bucket, &key, path)
    }

    fn report_progress(&self, subpath: &str, totals: &Totals, manifest: Option<&Manifest>) {
        if let Some(callback) = &self.options.progress_callback {
            callback(ProgressInfo {
                operation: "Uploading".to_string(),
                current_item: Some(subpath.to_string()),
                processed: totals.files,
                total: manifest.map(Manifest::len),
                bytes_processed: totals.bytes,
                total_bytes: manifest.map(Manifest::total_size),
            });
        }
    }
}
