//! Error types for djarchive
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is
//! [`ArchiveError`]. The variants fall into two groups:
//!
//! - **Archive kinds**: [`ArchiveError::NotFound`], [`ArchiveError::AlreadyExists`],
//!   [`ArchiveError::IntegrityMismatch`], [`ArchiveError::Corrupt`] and
//!   [`ArchiveError::PathEscape`]. These carry the semantics callers branch on.
//! - **Ambient kinds**: I/O, JSON, directory walking, configuration and store
//!   backend failures.
//!
//! A path escape is never recoverable: it means a remote key tried to place a
//! file outside the download target, and the whole operation stops.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the djarchive library
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Main error type for all djarchive operations
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A directory, manifest, dataset, revision or manifest entry is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// A manifest already exists where a new one would be written
    #[error("Already exists: {0:?}")]
    AlreadyExists(PathBuf),

    /// A file disagrees with its manifest entry
    #[error(
        "Integrity mismatch for {subpath}: size {actual_size} (expected {expected_size}), \
         digest {actual_digest} (expected {expected_digest})"
    )]
    IntegrityMismatch {
        /// Remote subpath of the offending file
        subpath: String,
        /// Size recorded in the manifest
        expected_size: u64,
        /// Size observed on disk
        actual_size: u64,
        /// Digest recorded in the manifest
        expected_digest: String,
        /// Digest observed on disk
        actual_digest: String,
    },

    /// A manifest could not be parsed or contains duplicate entries
    #[error("Corrupt manifest: {0}")]
    Corrupt(String),

    /// A computed local path would land outside its root directory
    #[error("Path {target:?} escapes root {root:?}")]
    PathEscape {
        /// The offending computed path (or remote subpath)
        target: PathBuf,
        /// The directory the path was required to stay within
        root: PathBuf,
    },

    /// A local path cannot be represented as a remote key
    #[error("Path cannot be converted to a remote key: {0:?}")]
    InvalidPath(PathBuf),

    /// Object store backend failure
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Pattern parsing error
    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(String),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),
}

impl From<globset::Error> for ArchiveError {
    fn from(err: globset::Error) -> Self {
        ArchiveError::InvalidPattern(err.to_string())
    }
}

impl ArchiveError {
    /// Create a not-found error with a custom message
    pub fn not_found(msg: impl Into<String>) -> Self {
        ArchiveError::NotFound(msg.into())
    }

    /// Create a corrupt-manifest error with a custom message
    pub fn corrupt(msg: impl Into<String>) -> Self {
        ArchiveError::Corrupt(msg.into())
    }

    /// Create a store error with a custom message
    pub fn store(msg: impl Into<String>) -> Self {
        ArchiveError::Store(msg.into())
    }

    /// Check if this error indicates corrupted or tampered content
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            ArchiveError::Corrupt(_) | ArchiveError::IntegrityMismatch { .. }
        )
    }

    /// Check if this error is an invariant violation that must never be retried
    pub fn is_fatal(&self) -> bool {
        matches!(self, ArchiveError::PathEscape { .. })
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            ArchiveError::NotFound(what) => {
                format!(
                    "{} was not found. Use 'djarchive revisions' to list what is published; \
                     a revision without a manifest is still being uploaded or was interrupted.",
                    what
                )
            }
            ArchiveError::AlreadyExists(path) => {
                format!(
                    "A manifest already exists at {:?}. Remove it to regenerate, or upload \
                     to verify the tree against it.",
                    path
                )
            }
            ArchiveError::IntegrityMismatch { subpath, .. } => {
                format!(
                    "{} does not match its manifest entry. The file changed after the \
                     manifest was written.",
                    subpath
                )
            }
            ArchiveError::InvalidConfiguration(msg) => {
                format!("Invalid configuration: {}. Check the config file or DJARCHIVE_* variables.", msg)
            }
            _ => self.to_string(),
        }
    }
}
