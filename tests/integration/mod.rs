//! Integration tests for djarchive
//!
//! Publish/retrieve scenarios against a directory store wrapped in a
//! recording layer, so tests can assert which objects were written and which
//! were read.

use ::djarchive::store::ListPage;
use ::djarchive::*;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::info;

/// Store wrapper that records traffic and can refuse selected writes
pub struct RecordingStore {
    inner: DirectoryStore,
    puts: Mutex<Vec<String>>,
    reads: Mutex<Vec<String>>,
    refuse_suffix: Mutex<Option<String>>,
}

impl RecordingStore {
    pub fn new(inner: DirectoryStore) -> Self {
        Self {
            inner,
            puts: Mutex::new(Vec::new()),
            reads: Mutex::new(Vec::new()),
            refuse_suffix: Mutex::new(None),
        }
    }

    /// Keys written so far
    pub fn puts(&self) -> Vec<String> {
        self.puts.lock().clone()
    }

    /// Keys read (one entry per ranged read)
    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().clone()
    }

    pub fn clear(&self) {
        self.puts.lock().clear();
        self.reads.lock().clear();
    }

    /// Fail every write whose key ends with `suffix`
    pub fn refuse_writes_ending_with(&self, suffix: Option<&str>) {
        *self.refuse_suffix.lock() = suffix.map(str::to_string);
    }
}

impl ObjectStore for RecordingStore {
    fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        recursive: bool,
        continuation: Option<&str>,
    ) -> Result<ListPage> {
        self.inner.list_page(bucket, prefix, recursive, continuation)
    }

    fn stat_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectStat>> {
        self.inner.stat_object(bucket, key)
    }

    fn get_object_range(&self, bucket: &str, key: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        self.reads.lock().push(key.to_string());
        self.inner.get_object_range(bucket, key, offset, length)
    }

    fn put_object_from_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        if let Some(suffix) = self.refuse_suffix.lock().as_deref() {
            if key.ends_with(suffix) {
                return Err(ArchiveError::store(format!("connection reset writing '{}'", key)));
            }
        }
        self.puts.lock().push(key.to_string());
        self.inner.put_object_from_file(bucket, key, path)
    }
}

/// Test harness with a store, a source tree and a retrieval target
pub struct ArchiveTestHarness {
    pub store_dir: TempDir,
    pub source_dir: TempDir,
    pub target_dir: TempDir,
    pub store: Arc<RecordingStore>,
    pub client: ArchiveClient,
}

impl ArchiveTestHarness {
    pub fn new() -> Self {
        let store_dir = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        let target_dir = TempDir::new().unwrap();

        let directory = DirectoryStore::create(store_dir.path().to_path_buf())
            .unwrap()
            .with_page_size(3);
        directory.create_bucket("djarchive").unwrap();

        let store = Arc::new(RecordingStore::new(directory));
        let client = ArchiveClient::new(Box::new(Arc::clone(&store)), "djarchive");

        Self {
            store_dir,
            source_dir,
            target_dir,
            store,
            client,
        }
    }

    pub fn source(&self) -> &Path {
        self.source_dir.path()
    }

    pub fn target(&self) -> PathBuf {
        self.target_dir.path().join("retrieved")
    }

    /// Write a file under the source tree, creating parents
    pub fn write_source(&self, subpath: &str, content: &[u8]) {
        let path = self.source().join(subpath);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Populate the source tree with a small dataset
    pub fn sample_dataset(&self) {
        self.write_source("README", b"acme calcium imaging");
        self.write_source("raw/session1/frames.npy", &vec![1u8; 5000]);
        self.write_source("raw/session2/frames.npy", &vec![2u8; 7000]);
        self.write_source("meta/subjects.csv", b"id,age\n1,12\n2,14\n");
    }

    pub fn upload(&self, name: &str, revision: &str) -> Result<UploadReport> {
        self.client
            .upload(name, revision, self.source(), UploadOptions::default())
    }

    pub fn download(&self, name: &str, revision: &str) -> Result<DownloadReport> {
        let options = DownloadOptions {
            create_target: true,
            chunk_size: 1024,
            ..Default::default()
        };
        self.client.download(name, revision, &self.target(), options)
    }

    /// Data-file reads recorded since the last clear (manifest excluded)
    pub fn data_reads(&self) -> Vec<String> {
        let mut reads: Vec<String> = self
            .store
            .reads()
            .into_iter()
            .filter(|key| !key.ends_with(MANIFEST_FILENAME))
            .collect();
        reads.dedup();
        reads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_download_is_idempotent() {
        let harness = ArchiveTestHarness::new();
        harness.sample_dataset();
        harness.upload("acme", "rev1").unwrap();

        let first = harness.download("acme", "rev1").unwrap();
        assert!(first.is_clean());
        assert_eq!(first.files_transferred, 4);
        assert_eq!(first.bytes_transferred, 20 + 5000 + 7000 + 17);

        harness.store.clear();
        let second = harness.download("acme", "rev1").unwrap();
        info!("second run: {:?}", second);
        assert!(second.is_clean());
        assert_eq!(second.files_transferred, 0);
        assert_eq!(second.files_skipped, 4);
        assert!(harness.data_reads().is_empty());
    }

    #[test]
    #[traced_test]
    fn test_local_corruption_is_repaired_and_counted() {
        let harness = ArchiveTestHarness::new();
        harness.sample_dataset();
        harness.upload("acme", "rev1").unwrap();
        harness.download("acme", "rev1").unwrap();

        // Flip one byte of one file
        let victim = harness.target().join("raw/session2/frames.npy");
        let mut bytes = fs::read(&victim).unwrap();
        bytes[1234] ^= 0xff;
        fs::write(&victim, bytes).unwrap();

        harness.store.clear();
        let report = harness.download("acme", "rev1").unwrap();
        assert_eq!(report.files_transferred, 1);
        assert_eq!(report.files_skipped, 3);
        assert_eq!(report.issue_count(), 1);
        assert_eq!(report.issues[0].subpath, "raw/session2/frames.npy");
        assert_eq!(harness.data_reads(), vec!["acme/rev1/raw/session2/frames.npy"]);
        assert_eq!(fs::read(&victim).unwrap(), vec![2u8; 7000]);
    }

    #[test]
    fn test_chunked_reads() {
        let harness = ArchiveTestHarness::new();
        harness.write_source("big.bin", &vec![9u8; 4500]);
        harness.upload("acme", "rev1").unwrap();

        harness.store.clear();
        harness.download("acme", "rev1").unwrap();
        let reads = harness.store.reads();
        let data_chunks = reads.iter().filter(|k| k.ends_with("big.bin")).count();
        assert_eq!(data_chunks, 5);
    }

    #[test]
    fn test_verify_mode_stops_at_unlisted_file() {
        let harness = ArchiveTestHarness::new();
        harness.write_source("a.txt", b"a");
        harness.write_source("b.txt", b"b");
        harness.write_source("c.txt", b"c");
        harness.upload("acme", "rev1").unwrap();

        harness.write_source("a0.txt", b"new");
        harness.store.clear();
        let err = harness.upload("acme", "rev2").unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
        assert!(err.to_string().contains("a0.txt"));
        assert_eq!(harness.store.puts(), vec!["acme/rev2/a.txt"]);
    }

    #[test]
    fn test_verify_mode_reports_deltas() {
        let harness = ArchiveTestHarness::new();
        harness.sample_dataset();
        harness.upload("acme", "rev1").unwrap();

        harness.write_source("meta/subjects.csv", b"id,age\n1,12\n");
        match harness.upload("acme", "rev2").unwrap_err() {
            ArchiveError::IntegrityMismatch {
                subpath,
                expected_size,
                actual_size,
                expected_digest,
                actual_digest,
            } => {
                assert_eq!(subpath, "meta/subjects.csv");
                assert_eq!(expected_size, 17);
                assert_eq!(actual_size, 12);
                assert_ne!(expected_digest, actual_digest);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_interrupted_upload_is_not_downloadable() {
        let harness = ArchiveTestHarness::new();
        harness.sample_dataset();

        harness.store.refuse_writes_ending_with(Some(MANIFEST_FILENAME));
        let err = harness.upload("acme", "rev1").unwrap_err();
        assert!(matches!(err, ArchiveError::Store(_)));
        assert_eq!(harness.store.puts().len(), 4);

        // The revision is visible but has no manifest
        assert_eq!(
            harness.client.revisions(Some("acme")).unwrap(),
            vec![Revision {
                dataset: "acme".to_string(),
                revision: "rev1".to_string()
            }]
        );
        let err = harness.download("acme", "rev1").unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
        assert!(!harness.target().join("README").exists());

        // Re-running the upload in verify mode completes the revision
        harness.store.refuse_writes_ending_with(None);
        let report = harness.upload("acme", "rev1").unwrap();
        assert_eq!(report.mode, UploadMode::Verify);
        assert!(harness.download("acme", "rev1").unwrap().is_clean());
    }

    #[test]
    fn test_catalog_listing() {
        let harness = ArchiveTestHarness::new();
        harness.write_source("x.txt", b"x");
        harness.upload("acme", "rev1").unwrap();
        harness.upload("acme", "rev2").unwrap();
        harness.upload("beta", "rev1").unwrap();

        let mut datasets: Vec<String> = harness.client.datasets().map(|d| d.unwrap()).collect();
        datasets.sort();
        assert_eq!(datasets, vec!["acme", "beta"]);

        let revisions: Vec<String> = harness
            .client
            .revisions(Some("acme"))
            .unwrap()
            .iter()
            .map(|r| r.revision.clone())
            .collect();
        assert_eq!(revisions, vec!["rev1", "rev2"]);

        assert!(matches!(
            harness.client.revisions(Some("missing")),
            Err(ArchiveError::NotFound(_))
        ));
        assert_eq!(harness.client.revisions(None).unwrap().len(), 3);
    }

    #[test]
    fn test_escaping_key_never_written() {
        let store = MemoryStore::new();
        let mut manifest = Manifest::new();
        manifest
            .insert(ManifestEntry::new("ok.txt", 2, digest::hash_data(b"ok")))
            .unwrap();
        store.insert("djarchive", "acme/rev1/ok.txt", b"ok".to_vec());
        store.insert("djarchive", "acme/rev1/sub/../../../escaped.txt", b"pwned".to_vec());
        store.insert(
            "djarchive",
            "acme/rev1/djarchive-manifest.csv",
            manifest.to_csv().into_bytes(),
        );

        let outer = TempDir::new().unwrap();
        let target = outer.path().join("a/b");
        let client = ArchiveClient::new(Box::new(store), "djarchive");
        let options = DownloadOptions {
            create_target: true,
            ..Default::default()
        };

        let err = client.download("acme", "rev1", &target, options).unwrap_err();
        assert!(matches!(err, ArchiveError::PathEscape { .. }));
        assert!(!outer.path().join("escaped.txt").exists());
        assert!(!outer.path().join("a/escaped.txt").exists());
    }
}
