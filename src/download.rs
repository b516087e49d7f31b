//! Retrieving a dataset revision into a local directory
//!
//! A download runs in five steps:
//!
//! 1. Make sure the target directory exists (optionally creating it).
//! 2. Stat the remote manifest. Without it the revision is unpublished or its
//!    upload never finished, and the download stops with `NotFound`.
//! 3. Fetch the manifest into the target and parse it.
//! 4. Walk every object under the revision prefix. Local files that already
//!    match their entry are skipped; everything else is fetched in ranged
//!    chunks and digested again once written.
//! 5. Report what was transferred and every integrity issue seen.
//!
//! Integrity problems are counted rather than raised unless
//! [`DownloadOptions::strict`] is set. Structural failures (missing target,
//! missing manifest, a key escaping the target) always abort.

use crate::digest::digest_file;
use crate::error::{ArchiveError, Result};
use crate::manifest::{Manifest, MANIFEST_FILENAME};
use crate::path_codec::{
    compose_local_target, ensure_no_symlinks, manifest_key, revision_prefix, strip_revision_prefix,
    validate_name,
};
use crate::store::{list_objects, ObjectStore};
use crate::types::{DownloadOptions, DownloadReport, IntegrityIssue, ProgressCallback, ProgressInfo};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

/// Fetch an object of known size into `dest` with ranged reads
///
/// The object is read `chunk_size` bytes at a time at an advancing offset and
/// written sequentially, so memory use is bounded by one chunk. `progress`, if
/// given, is called once per chunk. A failed read aborts the fetch and leaves
/// a partial file behind.
///
/// Returns the number of bytes written.
pub fn fetch_object(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    size: u64,
    dest: &Path,
    chunk_size: u64,
    progress: Option<&ProgressCallback>,
) -> Result<u64> {
    let chunk_size = chunk_size.max(1);
    let total_chunks = size.div_ceil(chunk_size) as usize;
    let mut writer = BufWriter::new(File::create(dest)?);
    let mut offset = 0u64;
    let mut chunks = 0usize;

    while offset < size {
        let length = chunk_size.min(size - offset);
        let data = store.get_object_range(bucket, key, offset, length)?;
        if data.is_empty() {
            return Err(ArchiveError::store(format!(
                "short read of '{}' at offset {} (expected {} bytes)",
                key, offset, size
            )));
        }
        writer.write_all(&data)?;
        offset += data.len() as u64;
        chunks += 1;

        if let Some(callback) = progress {
            callback(ProgressInfo {
                operation: "Downloading".to_string(),
                current_item: Some(key.to_string()),
                processed: chunks,
                total: Some(total_chunks),
                bytes_processed: offset,
                total_bytes: Some(size),
            });
        }
    }

    writer.flush()?;
    trace!("Fetched {} ({} bytes, {} chunks) to {:?}", key, offset, chunks, dest);
    Ok(offset)
}

/// Pulls dataset revisions from a bucket
pub struct Downloader<'a> {
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    options: DownloadOptions,
}

impl std::fmt::Debug for Downloader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("bucket", &self.bucket)
            .field("options", &self.options)
            .finish()
    }
}

impl<'a> Downloader<'a> {
    /// Create a downloader reading from `bucket`
    pub fn new(store: &'a dyn ObjectStore, bucket: &'a str, options: DownloadOptions) -> Self {
        Self {
            store,
            bucket,
            options,
        }
    }

    /// Download revision `revision` of dataset `name` into `target`
    ///
    /// Safe to re-run: files already present with the right digest are not
    /// fetched again.
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::NotFound`] if the target is missing (and creation was
    ///   not requested) or the revision has no manifest
    /// - [`ArchiveError::PathEscape`] if a remote key would resolve outside `target`
    /// - [`ArchiveError::Corrupt`] if the remote manifest cannot be parsed
    /// - In strict mode, the first integrity issue
    #[instrument(skip(self, target), fields(target = %target.display()))]
    pub fn download(&self, name: &str, revision: &str, target: &Path) -> Result<DownloadReport> {
        validate_name(name)?;
        validate_name(revision)?;
        let start = Instant::now();

        if !target.is_dir() {
            if !self.options.create_target {
                return Err(ArchiveError::not_found(format!("target directory {:?}", target)));
            }
            fs::create_dir_all(target)?;
            debug!("Created target directory {:?}", target);
        }

        let key = manifest_key(name, revision);
        let stat = self.store.stat_object(self.bucket, &key)?.ok_or_else(|| {
            ArchiveError::not_found(format!(
                "revision {}/{} (no manifest; unpublished or incomplete)",
                name, revision
            ))
        })?;

        let manifest_path = target.join(MANIFEST_FILENAME);
        ensure_no_symlinks(target, &manifest_path)?;
        fetch_object(
            self.store,
            self.bucket,
            &key,
            stat.size,
            &manifest_path,
            self.options.chunk_size,
            None,
        )?;
        let manifest = Manifest::read(&manifest_path)?;
        info!(
            "Retrieving {}/{}: {} files, {} bytes",
            name,
            revision,
            manifest.len(),
            manifest.total_size()
        );

        let mut report = DownloadReport::default();
        let mut seen = HashSet::with_capacity(manifest.len());
        let prefix = revision_prefix(name, revision);

        for object in list_objects(self.store, self.bucket, Some(&prefix), true) {
            let object = object?;
            if object.is_prefix {
                continue;
            }
            let Some(subpath) = strip_revision_prefix(&prefix, &object.key) else {
                continue;
            };
            if subpath == MANIFEST_FILENAME {
                continue;
            }

            let local = compose_local_target(target, subpath)?;
            ensure_no_symlinks(target, &local)?;
            seen.insert(subpath.to_string());

            let Some(entry) = manifest.get(subpath) else {
                self.record(&mut report, IntegrityIssue::unlisted(subpath))?;
                self.fetch(&object.key, object.size, &local, &mut report)?;
                continue;
            };

            if local.is_file() {
                let existing = digest_file(&local)?;
                if existing.matches(entry) {
                    trace!("Skipping {} (up to date)", subpath);
                    report.files_skipped += 1;
                    continue;
                }
                // A stale local copy is repaired by the fetch below, so it is
                // counted but never fatal.
                warn!("Local copy of {} differs from manifest, fetching again", subpath);
                report.issues.push(IntegrityIssue::mismatch(entry, &existing));
            }

            self.fetch(&object.key, object.size, &local, &mut report)?;

            let fetched = digest_file(&local)?;
            if !fetched.matches(entry) {
                self.record(&mut report, IntegrityIssue::mismatch(entry, &fetched))?;
            }
        }

        for entry in manifest.iter().filter(|entry| !seen.contains(&entry.subpath)) {
            self.record(&mut report, IntegrityIssue::missing(&entry.subpath))?;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        if report.is_clean() {
            info!(
                "Retrieved {}/{}: {} fetched, {} up to date, {} bytes in {}ms",
                name,
                revision,
                report.files_transferred,
                report.files_skipped,
                report.bytes_transferred,
                report.duration_ms
            );
        } else {
            warn!(
                "Retrieved {}/{} with {} integrity issues",
                name,
                revision,
                report.issue_count()
            );
        }
        Ok(report)
    }

    fn fetch(&self, key: &str, size: u64, local: &Path, report: &mut DownloadReport) -> Result<()> {
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = fetch_object(
            self.store,
            self.bucket,
            key,
            size,
            local,
            self.options.chunk_size,
            self.options.progress_callback.as_ref(),
        )?;
        report.files_transferred += 1;
        report.bytes_transferred += bytes;
        Ok(())
    }

    fn record(&self, report: &mut DownloadReport, issue: IntegrityIssue) -> Result<()> {
        warn!("Integrity issue: {}", issue);
        if self.options.strict {
            return Err(issue.into_error());
        }
        report.issues.push(issue);
        Ok(())
    }
}
