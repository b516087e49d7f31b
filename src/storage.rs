//! Bundled [`ObjectStore`] backends
//!
//! - [`DirectoryStore`]: objects as files under `<root>/<bucket>/<key>`. Backs
//!   `file://` endpoints, so a dataset archive can live on a shared mount.
//! - [`MemoryStore`]: objects in memory, for tests and tooling.
//!
//! ## Directory layout
//!
//! ```text
//! store_root/
//! ├── .staging/              # in-flight uploads, renamed into place
//! └── <bucket>/
//!     └── <dataset>/
//!         └── <revision>/
//!             ├── djarchive-manifest.csv
//!             └── raw/session1/frames.npy
//! ```
//!
//! Uploads are written to `.staging` and renamed into the bucket, so a listing
//! never observes a half-written object.

use crate::error::{ArchiveError, Result};
use crate::path_codec::{compose_local_target, normalize, validate_name};
use crate::store::{paginate, ListPage, ObjectStat, ObjectStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Default number of entries per listing page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

const STAGING_DIR: &str = ".staging";

/// Filesystem-backed object store
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    page_size: usize,
}

impl DirectoryStore {
    /// Open a store rooted at `root`
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::NotFound`] if `root` is not a directory
    pub fn open(root: PathBuf) -> Result<Self> {
        if !root.is_dir() {
            return Err(ArchiveError::not_found(format!("store root {:?}", root)));
        }
        debug!("Opened directory store at {:?}", root);
        Ok(Self {
            root,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Create `root` if needed and open it
    pub fn create(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)?;
        Self::open(root)
    }

    /// Set the number of entries returned per listing page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a bucket directory if it does not exist
    pub fn create_bucket(&self, bucket: &str) -> Result<()> {
        validate_name(bucket)?;
        fs::create_dir_all(self.root.join(bucket))?;
        Ok(())
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        validate_name(bucket)?;
        if bucket == STAGING_DIR {
            return Err(ArchiveError::InvalidPath(PathBuf::from(bucket)));
        }
        let dir = self.root.join(bucket);
        if !dir.is_dir() {
            return Err(ArchiveError::not_found(format!("bucket '{}'", bucket)));
        }
        Ok(dir)
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let bucket_dir = self.bucket_dir(bucket)?;
        compose_local_target(&bucket_dir, key)
    }
}

impl ObjectStore for DirectoryStore {
    fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        recursive: bool,
        continuation: Option<&str>,
    ) -> Result<ListPage> {
        let bucket_dir = self.bucket_dir(bucket)?;

        // Only the directory holding the prefix's last complete segment can
        // contain matching keys.
        let walk_root = match prefix.and_then(|p| p.rfind('/').map(|idx| &p[..idx])) {
            Some(dir) => compose_local_target(&bucket_dir, dir)?,
            None => bucket_dir.clone(),
        };
        if !walk_root.is_dir() {
            return Ok(ListPage::default());
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&walk_root) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let key = normalize(&bucket_dir, entry.path())?;
                keys.push((key, entry.metadata()?.len()));
            }
        }
        keys.sort();

        Ok(paginate(
            keys.iter().map(|(key, size)| (key.as_str(), *size)),
            prefix,
            recursive,
            continuation,
            self.page_size,
        ))
    }

    fn stat_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectStat>> {
        let path = self.object_path(bucket, key)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(ObjectStat { size: meta.len() })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_object_range(&self, bucket: &str, key: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ArchiveError::not_found(format!("object '{}/{}'", bucket, key)));
            }
            Err(e) => return Err(e.into()),
        };

        let size = file.metadata()?.len();
        if offset > size {
            return Err(ArchiveError::store(format!(
                "range offset {} beyond end of '{}' ({} bytes)",
                offset, key, size
            )));
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(length.min(size - offset) as usize);
        file.take(length).read_to_end(&mut buf)?;
        trace!("Read {} bytes of '{}' at offset {}", buf.len(), key, offset);
        Ok(buf)
    }

    fn put_object_from_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let target = self.object_path(bucket, key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let staging = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging)?;

        let mut source = File::open(path)?;
        let mut temp = NamedTempFile::new_in(&staging)?;
        io::copy(&mut source, temp.as_file_mut())?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| ArchiveError::Io(e.error))?;

        trace!("Stored {:?} as '{}/{}'", path, bucket, key);
        Ok(())
    }
}

/// In-memory object store
///
/// Keys are kept verbatim, so unlike [`DirectoryStore`] this store accepts
/// keys that could never be written to a filesystem (`..` segments, doubled
/// separators). Useful for exercising the download guards.
#[derive(Debug)]
pub struct MemoryStore {
    buckets: RwLock<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with no buckets
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the number of entries returned per listing page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Create a bucket if it does not exist
    pub fn create_bucket(&self, bucket: &str) {
        self.buckets.write().entry(bucket.to_string()).or_default();
    }

    /// Store an object directly, creating the bucket if needed
    pub fn insert(&self, bucket: &str, key: &str, data: Vec<u8>) {
        self.buckets
            .write()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data);
    }

    /// Remove an object, returning its content
    pub fn remove(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets.write().get_mut(bucket)?.remove(key)
    }

    /// Full content of an object
    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets.read().get(bucket)?.get(key).cloned()
    }

    /// All keys in a bucket, in order
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn missing_bucket(bucket: &str) -> ArchiveError {
        ArchiveError::not_found(format!("bucket '{}'", bucket))
    }
}

impl ObjectStore for MemoryStore {
    fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        recursive: bool,
        continuation: Option<&str>,
    ) -> Result<ListPage> {
        let buckets = self.buckets.read();
        let objects = buckets.get(bucket).ok_or_else(|| Self::missing_bucket(bucket))?;
        Ok(paginate(
            objects.iter().map(|(key, data)| (key.as_str(), data.len() as u64)),
            prefix,
            recursive,
            continuation,
            self.page_size,
        ))
    }

    fn stat_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectStat>> {
        let buckets = self.buckets.read();
        let objects = buckets.get(bucket).ok_or_else(|| Self::missing_bucket(bucket))?;
        Ok(objects.get(key).map(|data| ObjectStat {
            size: data.len() as u64,
        }))
    }

    fn get_object_range(&self, bucket: &str, key: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        let buckets = self.buckets.read();
        let objects = buckets.get(bucket).ok_or_else(|| Self::missing_bucket(bucket))?;
        let data = objects
            .get(key)
            .ok_or_else(|| ArchiveError::not_found(format!("object '{}/{}'", bucket, key)))?;

        let size = data.len() as u64;
        if offset > size {
            return Err(ArchiveError::store(format!(
                "range offset {} beyond end of '{}' ({} bytes)",
                offset, key, size
            )));
        }
        let end = offset.saturating_add(length).min(size);
        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn put_object_from_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let data = fs::read(path)?;
        let mut buckets = self.buckets.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;
        objects.insert(key.to_string(), data);
        Ok(())
    }
}
