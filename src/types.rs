//! Core data types shared across djarchive
//!
//! - **Options**: [`UploadOptions`], [`DownloadOptions`]
//! - **Results**: [`UploadReport`], [`DownloadReport`], [`VerificationReport`]
//! - **Integrity**: [`IntegrityIssue`], [`IssueKind`]
//! - **Progress**: [`ProgressInfo`], [`ProgressCallback`]
//!
//! ```rust
//! use djarchive::types::DownloadOptions;
//!
//! let options = DownloadOptions {
//!     create_target: true,
//!     ..Default::default()
//! };
//! assert_eq!(options.chunk_size, 1024 * 1024);
//! ```

use crate::digest::FileDigest;
use crate::error::ArchiveError;
use crate::manifest::ManifestEntry;
use std::sync::Arc;

/// Size of each ranged read during a download
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Progress callback for long-running operations
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Information passed to progress callbacks
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Items processed so far
    pub processed: usize,
    /// Total items to process (if known)
    pub total: Option<usize>,
    /// Bytes processed so far
    pub bytes_processed: u64,
    /// Total bytes to process (if known)
    pub total_bytes: Option<u64>,
}

impl ProgressInfo {
    /// Get progress as a percentage (0-100)
    pub fn percentage(&self) -> Option<f32> {
        match self.total {
            Some(total) if total > 0 => Some((self.processed as f32 / total as f32) * 100.0),
            _ => None,
        }
    }
}

/// What went wrong with a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// Size or digest disagrees with the manifest
    Mismatch {
        /// Size recorded in the manifest
        expected_size: u64,
        /// Size observed
        actual_size: u64,
        /// Digest recorded in the manifest
        expected_digest: String,
        /// Digest observed
        actual_digest: String,
    },
    /// Recorded in the manifest but absent
    Missing,
    /// Present but not recorded in the manifest
    Unlisted,
}

/// An integrity problem found while downloading or verifying
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityIssue {
    /// Remote subpath of the file
    pub subpath: String,
    /// Kind of problem
    pub kind: IssueKind,
}

impl IntegrityIssue {
    /// Issue for a file whose digest disagrees with its entry
    pub fn mismatch(entry: &ManifestEntry, actual: &FileDigest) -> Self {
        Self {
            subpath: entry.subpath.clone(),
            kind: IssueKind::Mismatch {
                expected_size: entry.size,
                actual_size: actual.size,
                expected_digest: entry.digest.clone(),
                actual_digest: actual.hash.clone(),
            },
        }
    }

    /// Issue for a manifest entry with no file
    pub fn missing(subpath: &str) -> Self {
        Self {
            subpath: subpath.to_string(),
            kind: IssueKind::Missing,
        }
    }

    /// Issue for a file with no manifest entry
    pub fn unlisted(subpath: &str) -> Self {
        Self {
            subpath: subpath.to_string(),
            kind: IssueKind::Unlisted,
        }
    }

    /// Convert into the error raised when integrity issues are fatal
    pub fn into_error(self) -> ArchiveError {
        match self.kind {
            IssueKind::Mismatch {
                expected_size,
                actual_size,
                expected_digest,
                actual_digest,
            } => ArchiveError::IntegrityMismatch {
                subpath: self.subpath,
                expected_size,
                actual_size,
                expected_digest,
                actual_digest,
            },
            IssueKind::Missing => {
                ArchiveError::not_found(format!("'{}' is in the manifest but was not found", self.subpath))
            }
            IssueKind::Unlisted => {
                ArchiveError::not_found(format!("'{}' has no manifest entry", self.subpath))
            }
        }
    }
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            IssueKind::Mismatch {
                expected_size,
                actual_size,
                expected_digest,
                actual_digest,
            } => {
                write!(f, "{}: mismatch", self.subpath)?;
                if expected_size != actual_size {
                    write!(f, " (size {} != {})", actual_size, expected_size)?;
                }
                if expected_digest != actual_digest {
                    write!(f, " (digest {} != {})", actual_digest, expected_digest)?;
                }
                Ok(())
            }
            IssueKind::Missing => write!(f, "{}: missing", self.subpath),
            IssueKind::Unlisted => write!(f, "{}: not in manifest", self.subpath),
        }
    }
}

/// Result of checking a local tree against its manifest
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    /// Number of files digested
    pub files_checked: usize,
    /// Problems found
    pub issues: Vec<IntegrityIssue>,
}

impl VerificationReport {
    /// Whether the tree matches the manifest exactly
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Which upload protocol ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// No manifest existed; one was generated from the tree
    Create,
    /// An existing manifest was checked against the tree
    Verify,
}

/// Options for upload operations
///
/// Files left out by `ignore_patterns`, and symlinks when `follow_symlinks`
/// is off, are invisible to the upload. When the source already carries a
/// manifest that lists such a file, the upload fails with `NotFound` naming
/// the skipped file.
#[derive(Clone, Default)]
pub struct UploadOptions {
    /// Glob patterns (relative to the source root) to leave out of the revision
    pub ignore_patterns: Vec<String>,
    /// Follow symbolic links instead of skipping them
    pub follow_symlinks: bool,
    /// Progress callback, invoked once per uploaded file
    pub progress_callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadOptions")
            .field("ignore_patterns", &self.ignore_patterns)
            .field("follow_symlinks", &self.follow_symlinks)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

/// Result of an upload
#[derive(Debug, Clone)]
pub struct UploadReport {
    /// Protocol that ran
    pub mode: UploadMode,
    /// Number of data files pushed (the manifest is not counted)
    pub files_uploaded: usize,
    /// Bytes pushed in data files
    pub bytes_uploaded: u64,
    /// Key the manifest was written to
    pub manifest_key: String,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// Options for download operations
#[derive(Clone)]
pub struct DownloadOptions {
    /// Create the target directory (and parents) if missing
    pub create_target: bool,
    /// Fail on the first integrity issue instead of counting it
    pub strict: bool,
    /// Bytes per ranged read
    pub chunk_size: u64,
    /// Progress callback, invoked once per chunk
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            create_target: false,
            strict: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_callback: None,
        }
    }
}

impl std::fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("create_target", &self.create_target)
            .field("strict", &self.strict)
            .field("chunk_size", &self.chunk_size)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

/// Result of a download
#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    /// Files fetched from the store
    pub files_transferred: usize,
    /// Files already present with a matching digest
    pub files_skipped: usize,
    /// Bytes fetched (data files only)
    pub bytes_transferred: u64,
    /// Integrity problems encountered
    pub issues: Vec<IntegrityIssue>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

impl DownloadReport {
    /// Whether the transfer finished without integrity issues
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Number of integrity issues
    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }
}
