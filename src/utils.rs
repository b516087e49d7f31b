//! Helpers shared by the path codec, manifest and CLI code

use crate::error::{ArchiveError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Strip `root` from `path`, falling back to canonical forms
///
/// The lexical strip is tried first so that symlinked entries keep the name
/// they have inside the tree. Only when it fails (a relative `path`, or a
/// `root` spelled differently) are both sides resolved on disk.
///
/// # Errors
///
/// - [`ArchiveError::PathEscape`] if `path` does not lie under `root`
pub fn make_relative(path: &Path, root: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(root) {
        return Ok(relative.to_path_buf());
    }

    let escape = || ArchiveError::PathEscape {
        target: path.to_path_buf(),
        root: root.to_path_buf(),
    };
    let resolved = path.canonicalize().map_err(|_| escape())?;
    let resolved_root = root.canonicalize().map_err(|_| escape())?;
    match resolved.strip_prefix(&resolved_root) {
        Ok(relative) => Ok(relative.to_path_buf()),
        Err(_) => Err(escape()),
    }
}

/// Replace the contents of `path` in one step
///
/// The bytes go to a temporary file in the same directory, which is then
/// renamed over `path`. Readers see either the old file or the new one.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(content)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| ArchiveError::Io(e.error))?;
    Ok(())
}

/// Render a byte count with binary units, e.g. `1.50 KB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}
