//! The revision manifest: checksum ledger and completeness marker
//!
//! A manifest lists every file of a revision with its size and SHA-256 digest.
//! On disk (and as the uploaded completeness object) it is a header-less,
//! quoted CSV with one entry per line:
//!
//! ```text
//! "1024","9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08","raw/session1/frames.npy"
//! "11","b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9","README"
//! ```
//!
//! Entries keep the order in which they were discovered; lookups go through a
//! subpath index. A subpath may appear only once: a repeated subpath means the
//! file was tampered with or concatenated, and loading fails.

use crate::digest::digest_file;
use crate::error::{ArchiveError, Result};
use crate::file_tracking::FileTracker;
use crate::path_codec::compose_local_target;
use crate::types::{IntegrityIssue, VerificationReport};
use crate::utils::atomic_write;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Reserved file name of the manifest, both locally and remotely
pub const MANIFEST_FILENAME: &str = "djarchive-manifest.csv";

/// One file recorded in a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Posix-style path relative to the revision root
    pub subpath: String,
    /// Content length in bytes
    pub size: u64,
    /// Lowercase hex SHA-256 of the content
    pub digest: String,
}

impl ManifestEntry {
    /// Create a new entry
    pub fn new(subpath: impl Into<String>, size: u64, digest: impl Into<String>) -> Self {
        Self {
            subpath: subpath.into(),
            size,
            digest: digest.into(),
        }
    }

    fn to_line(&self) -> String {
        format!(
            "{},{},{}",
            quote(&self.size.to_string()),
            quote(&self.digest),
            quote(&self.subpath)
        )
    }
}

/// Ordered set of manifest entries keyed by subpath
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    index: HashMap<String, usize>,
}

impl Manifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::Corrupt`] if the subpath is already present
    pub fn insert(&mut self, entry: ManifestEntry) -> Result<()> {
        if self.index.contains_key(&entry.subpath) {
            return Err(ArchiveError::corrupt(format!(
                "duplicate subpath '{}'",
                entry.subpath
            )));
        }
        self.index.insert(entry.subpath.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Look up the entry for a subpath
    pub fn get(&self, subpath: &str) -> Option<&ManifestEntry> {
        self.index.get(subpath).map(|&idx| &self.entries[idx])
    }

    /// Whether a subpath is recorded
    pub fn contains(&self, subpath: &str) -> bool {
        self.index.contains_key(subpath)
    }

    /// Entries in discovery order
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Iterate over entries in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all recorded file sizes
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Parse manifest text
    ///
    /// Blank lines are skipped. Every other record holds exactly three
    /// double-quoted fields: a decimal size, a hex digest and a relative
    /// subpath. A line break inside quotes belongs to the field, so subpaths
    /// containing newlines survive a round trip.
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::Corrupt`] on a malformed record or a repeated subpath
    pub fn parse(text: &str) -> Result<Self> {
        let mut manifest = Manifest::new();

        for record in Records::new(text) {
            let (line_no, [size, digest, subpath]) = record?;

            let size = size.parse::<u64>().map_err(|_| {
                ArchiveError::corrupt(format!("line {}: invalid size '{}'", line_no, size))
            })?;
            if digest.is_empty() || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ArchiveError::corrupt(format!(
                    "line {}: invalid digest '{}'",
                    line_no, digest
                )));
            }
            if subpath.is_empty() || subpath.starts_with('/') {
                return Err(ArchiveError::corrupt(format!(
                    "line {}: invalid subpath '{}'",
                    line_no, subpath
                )));
            }

            if manifest.contains(&subpath) {
                return Err(ArchiveError::corrupt(format!(
                    "line {}: duplicate subpath '{}'",
                    line_no, subpath
                )));
            }
            manifest.insert(ManifestEntry::new(subpath, size, digest.to_ascii_lowercase()))?;
        }

        Ok(manifest)
    }

    /// Serialize to manifest text, one line per entry in discovery order
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_line());
            out.push('\n');
        }
        out
    }

    /// Load a manifest from disk
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::NotFound`] if the file does not exist
    /// - [`ArchiveError::Corrupt`] if it is not valid UTF-8 or fails [`Manifest::parse`]
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArchiveError::not_found(format!("manifest {:?}", path)));
            }
            Err(e) => return Err(e.into()),
        };
        let text = String::from_utf8(bytes)
            .map_err(|e| ArchiveError::corrupt(format!("{:?} is not UTF-8: {}", path, e)))?;

        let manifest = Self::parse(&text)?;
        debug!("Loaded manifest {:?} with {} entries", path, manifest.len());
        Ok(manifest)
    }

    /// Write the manifest to disk
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::AlreadyExists`] if a file is present and `overwrite` is false
    pub fn write(&self, path: &Path, overwrite: bool) -> Result<()> {
        if !overwrite && path.exists() {
            return Err(ArchiveError::AlreadyExists(path.to_path_buf()));
        }
        atomic_write(path, self.to_csv().as_bytes())?;
        debug!("Wrote manifest {:?} with {} entries", path, self.len());
        Ok(())
    }

    /// Check a local tree against this manifest without contacting a store
    ///
    /// Every entry is digested in place. Entries with no file are reported as
    /// missing, files whose size or digest disagree as mismatched, and files
    /// present under `root` but absent from the manifest as unlisted. The
    /// manifest file itself is never considered.
    pub fn verify_tree(&self, root: &Path) -> Result<VerificationReport> {
        let mut report = VerificationReport::default();

        for entry in &self.entries {
            let path = compose_local_target(root, &entry.subpath)?;
            if !path.is_file() {
                report.issues.push(IntegrityIssue::missing(&entry.subpath));
                continue;
            }
            let digest = digest_file(&path)?;
            report.files_checked += 1;
            if !digest.matches(entry) {
                report.issues.push(IntegrityIssue::mismatch(entry, &digest));
            }
        }

        for file in FileTracker::new(root.to_path_buf()).files()? {
            let file = file?;
            if !self.contains(&file.subpath) {
                report.issues.push(IntegrityIssue::unlisted(&file.subpath));
            }
        }

        info!(
            "Verified {:?}: {} files checked, {} issues",
            root,
            report.files_checked,
            report.issues.len()
        );
        Ok(report)
    }
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Quoted-CSV records, each tagged with the line it starts on
struct Records<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line_no: usize,
    failed: bool,
}

impl<'a> Records<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line_no: 1,
            failed: false,
        }
    }

    fn skip_blank_lines(&mut self) {
        loop {
            match self.chars.peek() {
                Some('\n') => self.line_no += 1,
                Some('\r' | ' ' | '\t') => {}
                _ => return,
            }
            self.chars.next();
        }
    }

    fn quoted_field(&mut self, start: usize) -> Result<String> {
        if self.chars.next() != Some('"') {
            return Err(ArchiveError::corrupt(format!(
                "line {}: expected quoted field",
                start
            )));
        }

        let mut field = String::new();
        loop {
            match self.chars.next() {
                Some('"') if self.chars.peek() == Some(&'"') => {
                    self.chars.next();
                    field.push('"');
                }
                Some('"') => return Ok(field),
                Some(c) => {
                    if c == '\n' {
                        self.line_no += 1;
                    }
                    field.push(c);
                }
                None => {
                    return Err(ArchiveError::corrupt(format!(
                        "line {}: unterminated quoted field",
                        start
                    )))
                }
            }
        }
    }

    fn record(&mut self) -> Result<(usize, [String; 3])> {
        let start = self.line_no;
        let mut fields = Vec::with_capacity(3);

        loop {
            fields.push(self.quoted_field(start)?);
            match self.chars.next() {
                Some(',') => {}
                Some('\r') if matches!(self.chars.peek(), Some('\n') | None) => {
                    if self.chars.next().is_some() {
                        self.line_no += 1;
                    }
                    break;
                }
                Some('\n') => {
                    self.line_no += 1;
                    break;
                }
                None => break,
                Some(c) => {
                    return Err(ArchiveError::corrupt(format!(
                        "line {}: unexpected '{}' after field",
                        start, c
                    )))
                }
            }
        }

        let count = fields.len();
        let fields = <[String; 3]>::try_from(fields).map_err(|_| {
            ArchiveError::corrupt(format!("line {}: expected 3 fields, found {}", start, count))
        })?;
        Ok((start, fields))
    }
}

impl Iterator for Records<'_> {
    type Item = Result<(usize, [String; 3])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.skip_blank_lines();
        self.chars.peek()?;
        let record = self.record();
        self.failed = record.is_err();
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash_data;
    use crate::types::IssueKind;
    use tempfile::TempDir;

    fn sample() -> Manifest {
        let mut manifest = Manifest::new();
        manifest
            .insert(ManifestEntry::new("raw/a.bin", 3, hash_data(b"abc")))
            .unwrap();
        manifest
            .insert(ManifestEntry::new("README", 5, hash_data(b"hello")))
            .unwrap();
        manifest
    }

    #[test]
    fn test_line_format() {
        let manifest = sample();
        let text = manifest.to_csv();
        let first = text.lines().next().unwrap();
        assert_eq!(
            first,
            format!("\"3\",\"{}\",\"raw/a.bin\"", hash_data(b"abc"))
        );
    }

    #[test]
    fn test_write_read_preserves_entries_and_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(MANIFEST_FILENAME);
        let manifest = sample();

        manifest.write(&path, false).unwrap();
        let loaded = Manifest::read(&path).unwrap();

        assert_eq!(loaded, manifest);
        assert_eq!(loaded.entries()[0].subpath, "raw/a.bin");
        assert_eq!(loaded.get("README").unwrap().size, 5);
    }

    #[test]
    fn test_write_refuses_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(MANIFEST_FILENAME);
        let manifest = sample();

        manifest.write(&path, false).unwrap();
        let err = manifest.write(&path, false).unwrap_err();
        assert!(matches!(err, ArchiveError::AlreadyExists(_)));

        manifest.write(&path, true).unwrap();
    }

    #[test]
    fn test_read_missing() {
        let temp_dir = TempDir::new().unwrap();
        let err = Manifest::read(&temp_dir.path().join(MANIFEST_FILENAME)).unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
    }

    #[test]
    fn test_duplicate_subpath_is_corrupt() {
        let digest = hash_data(b"x");
        let text = format!(
            "\"1\",\"{d}\",\"a.txt\"\n\"1\",\"{d}\",\"b.txt\"\n\"1\",\"{d}\",\"a.txt\"\n",
            d = digest
        );
        let err = Manifest::parse(&text).unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_malformed_lines() {
        let digest = hash_data(b"x");
        let cases = [
            format!("1,\"{}\",\"a\"", digest),
            format!("\"1\",\"{}\"", digest),
            format!("\"1\",\"{}\",\"a\",\"b\"", digest),
            format!("\"one\",\"{}\",\"a\"", digest),
            "\"1\",\"not-hex\",\"a\"".to_string(),
            format!("\"1\",\"{}\",\"/abs\"", digest),
            format!("\"1\",\"{}\",\"unterminated", digest),
            format!("\"1\"x,\"{}\",\"a\"", digest),
        ];
        for case in &cases {
            let err = Manifest::parse(case).unwrap_err();
            assert!(matches!(err, ArchiveError::Corrupt(_)), "accepted: {}", case);
        }
    }

    #[test]
    fn test_quotes_and_commas_in_subpath() {
        let mut manifest = Manifest::new();
        manifest
            .insert(ManifestEntry::new("odd \"name\", v2.txt", 1, hash_data(b"1")))
            .unwrap();
        let parsed = Manifest::parse(&manifest.to_csv()).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_newline_in_subpath_round_trips() {
        let mut manifest = Manifest::new();
        manifest
            .insert(ManifestEntry::new("line1\nline2.txt", 2, hash_data(b"ab")))
            .unwrap();
        manifest
            .insert(ManifestEntry::new("crlf\r\nname", 1, hash_data(b"c")))
            .unwrap();
        manifest
            .insert(ManifestEntry::new("after.txt", 1, hash_data(b"d")))
            .unwrap();

        let parsed = Manifest::parse(&manifest.to_csv()).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_errors_name_the_starting_line() {
        let digest = hash_data(b"x");
        let text = format!(
            "\"1\",\"{d}\",\"two\nlines\"\n\"1\",\"{d}\",\"two\nlines\"\n",
            d = digest
        );
        let err = Manifest::parse(&text).unwrap_err();
        assert!(err.to_string().contains("line 3"), "{}", err);
    }

    #[test]
    fn test_blank_and_crlf_lines() {
        let digest = hash_data(b"x");
        let text = format!("\r\n\"1\",\"{}\",\"a\"\r\n\n", digest);
        let manifest = Manifest::parse(&text).unwrap();
        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains("a"));
    }

    #[test]
    fn test_verify_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("raw")).unwrap();
        fs::write(root.join("raw/a.bin"), b"abc").unwrap();
        fs::write(root.join("README"), b"HELLO").unwrap();
        fs::write(root.join("extra.txt"), b"extra").unwrap();

        let mut manifest = sample();
        manifest
            .insert(ManifestEntry::new("gone.txt", 1, hash_data(b"g")))
            .unwrap();
        manifest.write(&root.join(MANIFEST_FILENAME), false).unwrap();

        let report = manifest.verify_tree(root).unwrap();
        assert_eq!(report.files_checked, 2);
        assert!(!report.is_valid());

        let kinds: Vec<(&str, &IssueKind)> = report
            .issues
            .iter()
            .map(|i| (i.subpath.as_str(), &i.kind))
            .collect();
        assert!(kinds.iter().any(|(p, k)| *p == "README" && matches!(k, IssueKind::Mismatch { .. })));
        assert!(kinds.iter().any(|(p, k)| *p == "gone.txt" && matches!(k, IssueKind::Missing)));
        assert!(kinds.iter().any(|(p, k)| *p == "extra.txt" && matches!(k, IssueKind::Unlisted)));
        assert_eq!(report.issues.len(), 3);
    }
}
