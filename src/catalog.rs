//! Dataset and revision discovery
//!
//! Datasets and revisions have no records of their own: they exist only as
//! the first two segments of object keys. The catalog reads them back from
//! non-recursive listings, so a revision shows up as soon as any of its
//! objects exist, whether or not its manifest has been written yet.

use crate::error::{ArchiveError, Result};
use crate::path_codec::{validate_name, REMOTE_SEPARATOR};
use crate::store::{list_objects, ObjectListing, ObjectStore};
use tracing::{debug, instrument};

/// A `(dataset, revision)` pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision {
    /// Dataset name
    pub dataset: String,
    /// Revision name
    pub revision: String,
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.dataset, self.revision)
    }
}

/// Lazy iterator over the grouping names directly under a prefix
pub struct Groupings<'a> {
    listing: ObjectListing<'a>,
    prefix: String,
}

impl std::fmt::Debug for Groupings<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Groupings")
            .field("listing", &self.listing)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl Iterator for Groupings<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        for object in self.listing.by_ref() {
            let object = match object {
                Ok(object) => object,
                Err(e) => return Some(Err(e)),
            };
            // Loose objects at this level are not datasets or revisions
            if !object.is_prefix {
                continue;
            }
            let Some(rest) = object.key.strip_prefix(self.prefix.as_str()) else {
                debug!("Ignoring grouping {} outside prefix {:?}", object.key, self.prefix);
                continue;
            };
            let name = rest.trim_end_matches(REMOTE_SEPARATOR);
            if !name.is_empty() && !name.contains(REMOTE_SEPARATOR) {
                return Some(Ok(name.to_string()));
            }
        }
        None
    }
}

fn groupings<'a>(store: &'a dyn ObjectStore, bucket: &str, prefix: Option<String>) -> Groupings<'a> {
    Groupings {
        listing: list_objects(store, bucket, prefix.as_deref(), false),
        prefix: prefix.unwrap_or_default(),
    }
}

/// Read-only view of the datasets published in a bucket
#[derive(Clone, Copy)]
pub struct Catalog<'a> {
    store: &'a dyn ObjectStore,
    bucket: &'a str,
}

impl std::fmt::Debug for Catalog<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").field("bucket", &self.bucket).finish()
    }
}

impl<'a> Catalog<'a> {
    /// Create a catalog over `bucket`
    pub fn new(store: &'a dyn ObjectStore, bucket: &'a str) -> Self {
        Self { store, bucket }
    }

    /// Dataset names, in key order
    ///
    /// Each call starts a new listing; nothing is cached.
    pub fn datasets(&self) -> Groupings<'a> {
        groupings(self.store, self.bucket, None)
    }

    /// Revisions of one dataset, or of every dataset when `dataset` is `None`
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::NotFound`] if a named dataset has no revisions
    #[instrument(skip(self))]
    pub fn revisions(&self, dataset: Option<&str>) -> Result<Vec<Revision>> {
        match dataset {
            Some(name) => {
                let revisions = self.revisions_of(name)?;
                if revisions.is_empty() {
                    return Err(ArchiveError::not_found(format!("dataset '{}'", name)));
                }
                Ok(revisions)
            }
            None => {
                let mut all = Vec::new();
                for name in self.datasets() {
                    all.extend(self.revisions_of(&name?)?);
                }
                debug!("Found {} revisions", all.len());
                Ok(all)
            }
        }
    }

    fn revisions_of(&self, dataset: &str) -> Result<Vec<Revision>> {
        validate_name(dataset)?;
        let prefix = format!("{}{}", dataset, REMOTE_SEPARATOR);
        groupings(self.store, self.bucket, Some(prefix))
            .map(|revision| {
                revision.map(|revision| Revision {
                    dataset: dataset.to_string(),
                    revision,
                })
            })
            .collect()
    }
}
