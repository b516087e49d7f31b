//! Local tree scanning for uploads and verification
//!
//! [`FileTracker`] walks a dataset source directory and yields every regular
//! file together with its remote subpath. Entries come out sorted by file name
//! at each level so manifests generated from the same tree are identical.
//!
//! The manifest at the top of the tree is never yielded, and neither are files
//! matching the configured ignore patterns (glob syntax, matched against the
//! remote subpath).
//!
//! ```rust,ignore
//! use crate::file_tracking::FileTracker;
//!
//! let tracker = FileTracker::new(source.clone())
//!     .with_ignore_patterns(&["*.tmp".to_string(), "scratch/**".to_string()])?;
//! for file in tracker.files()? {
//!     let file = file?;
//!     println!("{} -> {}", file.path.display(), file.subpath);
//! }
//! ```

use crate::error::{ArchiveError, Result};
use crate::manifest::MANIFEST_FILENAME;
use crate::path_codec::normalize;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::PathBuf;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// A regular file discovered under the tracked root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// Absolute local path
    pub path: PathBuf,
    /// Remote subpath relative to the root
    pub subpath: String,
}

/// Scanner for a dataset source directory
#[derive(Debug, Clone)]
pub struct FileTracker {
    root: PathBuf,
    ignore: Option<GlobSet>,
    follow_symlinks: bool,
}

impl FileTracker {
    /// Create a tracker for `root` with no ignore patterns
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ignore: None,
            follow_symlinks: false,
        }
    }

    /// Exclude files whose subpath matches any of the glob patterns
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::InvalidPattern`] if a pattern does not compile
    pub fn with_ignore_patterns(mut self, patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            self.ignore = None;
            return Ok(self);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern)?);
        }
        self.ignore = Some(builder.build()?);
        Ok(self)
    }

    /// Follow symbolic links instead of skipping them
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Walk the tree lazily
    ///
    /// Each call starts a fresh walk. Walk errors and paths that cannot be
    /// expressed as remote keys are yielded as `Err` items rather than skipped.
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::NotFound`] if the root is not a directory
    pub fn files(&self) -> Result<impl Iterator<Item = Result<TrackedFile>>> {
        if !self.root.is_dir() {
            return Err(ArchiveError::not_found(format!(
                "source directory {:?}",
                self.root
            )));
        }

        debug!("Scanning {:?}", self.root);
        let root = self.root.clone();
        let ignore = self.ignore.clone();

        let walker = WalkDir::new(&self.root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter();

        Ok(walker.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };

            if entry.path_is_symlink() && !entry.file_type().is_file() {
                trace!("Skipping symlink {:?}", entry.path());
                return None;
            }
            if !entry.file_type().is_file() {
                return None;
            }

            let subpath = match normalize(&root, entry.path()) {
                Ok(subpath) => subpath,
                Err(e) => return Some(Err(e)),
            };
            if subpath == MANIFEST_FILENAME {
                return None;
            }
            if ignore.as_ref().is_some_and(|set| set.is_match(&subpath)) {
                trace!("Ignoring {}", subpath);
                return None;
            }

            Some(Ok(TrackedFile {
                path: entry.into_path(),
                subpath,
            }))
        }))
    }
}
