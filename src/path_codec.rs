//! Translation between local paths and remote object keys
//!
//! Local paths are hierarchical and use the platform separator; remote keys are
//! flat strings delimited by `/`. The two domains only meet in this module:
//!
//! ```text
//! <root>/raw/session1/frames.npy   <->   raw/session1/frames.npy
//!                                         \______ subpath ______/
//! <dataset>/<revision>/<subpath>          full object key
//! ```
//!
//! [`compose_local_target`] is the download-side entry point and carries the
//! escape guard: a remote subpath may never resolve to a location outside the
//! target directory, however its segments are arranged.

use crate::error::{ArchiveError, Result};
use crate::manifest::MANIFEST_FILENAME;
use crate::utils::make_relative;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Separator used by remote object keys
pub const REMOTE_SEPARATOR: char = '/';

/// Convert an absolute local path under `root` into a remote subpath
///
/// # Errors
///
/// - [`ArchiveError::PathEscape`] if `path` does not live under `root`
/// - [`ArchiveError::InvalidPath`] if a component is not valid UTF-8 or the
///   path is `root` itself
pub fn normalize(root: &Path, path: &Path) -> Result<String> {
    let relative = make_relative(path, root)?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment
                    .to_str()
                    .ok_or_else(|| ArchiveError::InvalidPath(path.to_path_buf()))?;
                segments.push(segment);
            }
            Component::CurDir => {}
            _ => {
                return Err(ArchiveError::PathEscape {
                    target: path.to_path_buf(),
                    root: root.to_path_buf(),
                })
            }
        }
    }

    if segments.is_empty() {
        return Err(ArchiveError::InvalidPath(path.to_path_buf()));
    }

    Ok(segments.join("/"))
}

/// Convert a remote subpath back into a local path under `root`
///
/// Empty segments (from doubled or trailing separators) are dropped. This is a
/// plain mapping with no escape guard; use [`compose_local_target`] for keys
/// that come from the store.
pub fn denormalize(root: &Path, subpath: &str) -> PathBuf {
    subpath
        .split(REMOTE_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

/// Compute the local write target for a remote subpath
///
/// Segments are joined one at a time under `target_root`. `.` segments are
/// ignored and `..` pops a previously pushed segment; popping past the root,
/// or any segment that is not a single plain file name (an absolute path, a
/// drive prefix, an embedded platform separator), fails.
///
/// # Errors
///
/// - [`ArchiveError::PathEscape`] if the result would leave `target_root`
/// - [`ArchiveError::InvalidPath`] if the subpath resolves to `target_root` itself
pub fn compose_local_target(target_root: &Path, subpath: &str) -> Result<PathBuf> {
    let escape = || ArchiveError::PathEscape {
        target: PathBuf::from(subpath),
        root: target_root.to_path_buf(),
    };

    let mut target = target_root.to_path_buf();
    let mut depth = 0usize;

    for segment in subpath.split(REMOTE_SEPARATOR) {
        match segment {
            "" | "." => continue,
            ".." => {
                if depth == 0 {
                    return Err(escape());
                }
                target.pop();
                depth -= 1;
            }
            name => {
                let mut components = Path::new(name).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => {
                        target.push(name);
                        depth += 1;
                    }
                    _ => return Err(escape()),
                }
            }
        }
    }

    if !target.starts_with(target_root) {
        return Err(escape());
    }
    if depth == 0 {
        return Err(ArchiveError::InvalidPath(PathBuf::from(subpath)));
    }

    Ok(target)
}

/// Refuse a local target reached through a symbolic link
///
/// [`compose_local_target`] only looks at the key. This walks the components
/// of `local` below `target_root` on disk; any existing one that is a symlink,
/// the leaf included, could redirect the write elsewhere. Components that do
/// not exist yet are created later as plain directories.
///
/// # Errors
///
/// - [`ArchiveError::PathEscape`] if `local` is outside `target_root` or a
///   component is a symlink
pub fn ensure_no_symlinks(target_root: &Path, local: &Path) -> Result<()> {
    let escape = || ArchiveError::PathEscape {
        target: local.to_path_buf(),
        root: target_root.to_path_buf(),
    };
    let relative = local.strip_prefix(target_root).map_err(|_| escape())?;

    let mut current = target_root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => return Err(escape()),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Check that a dataset or revision name is usable as a single key segment
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(REMOTE_SEPARATOR) {
        return Err(ArchiveError::InvalidPath(PathBuf::from(name)));
    }
    Ok(())
}

/// Key prefix shared by every object of a revision: `name/revision/`
pub fn revision_prefix(name: &str, revision: &str) -> String {
    format!("{}{sep}{}{sep}", name, revision, sep = REMOTE_SEPARATOR)
}

/// Full object key for a subpath within a revision
pub fn object_key(name: &str, revision: &str, subpath: &str) -> String {
    format!("{}{}", revision_prefix(name, revision), subpath)
}

/// Key of the manifest object that marks a revision complete
pub fn manifest_key(name: &str, revision: &str) -> String {
    object_key(name, revision, MANIFEST_FILENAME)
}

/// Strip a revision prefix from a full key, yielding the subpath
pub fn strip_revision_prefix<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(prefix)
        .map(|rest| rest.trim_start_matches(REMOTE_SEPARATOR))
        .filter(|rest| !rest.is_empty())
}
