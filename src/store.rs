//! Object store abstraction
//!
//! The synchronization engine needs four capabilities from a remote store:
//! paginated listing under a prefix, stat, ranged reads, and whole-object
//! writes from a local file. [`ObjectStore`] captures exactly that surface so
//! the engine never depends on a particular wire protocol.
//!
//! Listings follow S3 conventions. A non-recursive listing groups keys on the
//! next `/` after the prefix and reports each group once as a prefix entry
//! (`is_prefix == true`, key ending in `/`); a recursive listing returns every
//! key under the prefix. Results come back in lexicographic key order, one page
//! at a time. [`list_objects`] wraps the page calls into a lazy iterator.

use crate::error::Result;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// An entry surfaced by a store listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Full object key, or a grouping prefix ending in `/`
    pub key: String,
    /// Object size in bytes (0 for prefixes)
    pub size: u64,
    /// Whether this entry is a grouping prefix rather than an object
    pub is_prefix: bool,
}

impl RemoteObject {
    /// An object entry
    pub fn object(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            is_prefix: false,
        }
    }

    /// A grouping prefix entry
    pub fn prefix(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: 0,
            is_prefix: true,
        }
    }
}

/// Result of a stat call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectStat {
    /// Object size in bytes
    pub size: u64,
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Entries in key order
    pub objects: Vec<RemoteObject>,
    /// Token to pass back for the next page; `None` on the last page
    pub continuation: Option<String>,
}

/// Minimal object store surface used by the archive engine
///
/// Implementations are used from one thread at a time; the `Send + Sync`
/// bounds only allow a client to be moved into or shared with a worker.
pub trait ObjectStore: Send + Sync {
    /// List one page of entries under `prefix`
    ///
    /// `continuation` is the token from the previous page, `None` for the first.
    fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        recursive: bool,
        continuation: Option<&str>,
    ) -> Result<ListPage>;

    /// Size of an object, or `None` if it does not exist
    fn stat_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectStat>>;

    /// Read up to `length` bytes starting at `offset`
    fn get_object_range(&self, bucket: &str, key: &str, offset: u64, length: u64) -> Result<Vec<u8>>;

    /// Write a whole object from a local file, replacing any existing object
    fn put_object_from_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        recursive: bool,
        continuation: Option<&str>,
    ) -> Result<ListPage> {
        (**self).list_page(bucket, prefix, recursive, continuation)
    }

    fn stat_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectStat>> {
        (**self).stat_object(bucket, key)
    }

    fn get_object_range(&self, bucket: &str, key: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        (**self).get_object_range(bucket, key, offset, length)
    }

    fn put_object_from_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        (**self).put_object_from_file(bucket, key, path)
    }
}

/// Lazy listing over all pages of a prefix
///
/// Pages are fetched on demand. After an error the iterator yields that error
/// once and then ends. To enumerate again, create a new listing.
pub struct ObjectListing<'a> {
    store: &'a dyn ObjectStore,
    bucket: String,
    prefix: Option<String>,
    recursive: bool,
    buffer: VecDeque<RemoteObject>,
    continuation: Option<String>,
    exhausted: bool,
}

impl std::fmt::Debug for ObjectListing<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectListing")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("recursive", &self.recursive)
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

/// Start a lazy listing of `bucket` under `prefix`
pub fn list_objects<'a>(
    store: &'a dyn ObjectStore,
    bucket: &str,
    prefix: Option<&str>,
    recursive: bool,
) -> ObjectListing<'a> {
    ObjectListing {
        store,
        bucket: bucket.to_string(),
        prefix: prefix.map(str::to_string),
        recursive,
        buffer: VecDeque::new(),
        continuation: None,
        exhausted: false,
    }
}

impl Iterator for ObjectListing<'_> {
    type Item = Result<RemoteObject>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(object) = self.buffer.pop_front() {
                return Some(Ok(object));
            }
            if self.exhausted {
                return None;
            }

            match self.store.list_page(
                &self.bucket,
                self.prefix.as_deref(),
                self.recursive,
                self.continuation.as_deref(),
            ) {
                Ok(page) => {
                    trace!(
                        "Listed {} entries under {:?} (more: {})",
                        page.objects.len(),
                        self.prefix,
                        page.continuation.is_some()
                    );
                    self.exhausted = page.continuation.is_none();
                    self.continuation = page.continuation;
                    self.buffer.extend(page.objects);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Build one listing page from keys in ascending order
///
/// Shared by the bundled backends so they agree on grouping and pagination.
/// The continuation token is the key of the last entry returned; the next
/// page starts strictly after it.
pub(crate) fn paginate<'k>(
    sorted: impl Iterator<Item = (&'k str, u64)>,
    prefix: Option<&str>,
    recursive: bool,
    continuation: Option<&str>,
    page_size: usize,
) -> ListPage {
    let prefix = prefix.unwrap_or("");
    let page_size = page_size.max(1);
    let mut page = ListPage::default();

    for (key, size) in sorted {
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };

        let entry = match rest.find('/') {
            Some(idx) if !recursive => RemoteObject::prefix(&key[..prefix.len() + idx + 1]),
            _ => RemoteObject::object(key, size),
        };

        if continuation.is_some_and(|token| entry.key.as_str() <= token) {
            continue;
        }
        if page.objects.last().is_some_and(|last| last.key == entry.key) {
            continue;
        }
        if page.objects.len() == page_size {
            page.continuation = page.objects.last().map(|last| last.key.clone());
            break;
        }
        page.objects.push(entry);
    }

    page
}
