//! Main test module for djarchive
//!
//! This module includes all test suites:
//! - Integration tests for publish/retrieve scenarios
//! - Property-based tests for invariants
//! - Edge cases below

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::djarchive::*;
    use std::fs;
    use tempfile::TempDir;

    fn client_with_bucket() -> ArchiveClient {
        let store = MemoryStore::new();
        store.create_bucket("bucket");
        ArchiveClient::new(Box::new(store), "bucket")
    }

    #[test]
    fn test_empty_source_directory() {
        let client = client_with_bucket();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();

        let upload = client
            .upload("empty", "rev1", source.path(), UploadOptions::default())
            .unwrap();
        assert_eq!(upload.files_uploaded, 0);
        assert_eq!(fs::read_to_string(source.path().join(MANIFEST_FILENAME)).unwrap(), "");

        let report = client
            .download("empty", "rev1", target.path(), DownloadOptions::default())
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.files_transferred, 0);
        assert!(target.path().join(MANIFEST_FILENAME).is_file());
    }

    #[test]
    fn test_empty_files() {
        let client = client_with_bucket();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        fs::write(source.path().join("zero.bin"), b"").unwrap();

        client
            .upload("acme", "rev1", source.path(), UploadOptions::default())
            .unwrap();
        let report = client
            .download("acme", "rev1", target.path(), DownloadOptions::default())
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.files_transferred, 1);
        assert_eq!(fs::metadata(target.path().join("zero.bin")).unwrap().len(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_newline_in_file_name() {
        let client = client_with_bucket();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        fs::write(source.path().join("a\nb.txt"), b"two lines").unwrap();
        fs::write(source.path().join("plain.txt"), b"plain").unwrap();

        client
            .upload("acme", "rev1", source.path(), UploadOptions::default())
            .unwrap();
        let report = client
            .download("acme", "rev1", target.path(), DownloadOptions::default())
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.files_transferred, 2);
        assert_eq!(fs::read(target.path().join("a\nb.txt")).unwrap(), b"two lines");

        // The published manifest is reused as-is when uploading again
        let again = client
            .upload("acme", "rev2", source.path(), UploadOptions::default())
            .unwrap();
        assert_eq!(again.mode, UploadMode::Verify);
        assert_eq!(again.files_uploaded, 2);
    }

    #[test]
    fn test_unknown_revision() {
        let client = client_with_bucket();
        let target = TempDir::new().unwrap();
        let err = client
            .download("ghost", "rev1", target.path(), DownloadOptions::default())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
        assert!(err.user_message().contains("djarchive revisions"));
    }

    #[test]
    fn test_corrupt_local_manifest_blocks_upload() {
        let client = client_with_bucket();
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("a.txt"), b"a").unwrap();
        fs::write(source.path().join(MANIFEST_FILENAME), "\"1\",\"zz\",\"a.txt\"\n").unwrap();

        let err = client
            .upload("acme", "rev1", source.path(), UploadOptions::default())
            .unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(client.datasets().count(), 0);
    }

    #[test]
    fn test_download_into_nested_new_target() {
        let client = client_with_bucket();
        let source = TempDir::new().unwrap();
        let outer = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("deep/er/still")).unwrap();
        fs::write(source.path().join("deep/er/still/leaf.txt"), b"leaf").unwrap();
        client
            .upload("acme", "rev1", source.path(), UploadOptions::default())
            .unwrap();

        let target = outer.path().join("x/y/z");
        let options = DownloadOptions {
            create_target: true,
            ..Default::default()
        };
        client.download("acme", "rev1", &target, options).unwrap();
        assert_eq!(fs::read(target.join("deep/er/still/leaf.txt")).unwrap(), b"leaf");
    }

    #[test]
    fn test_retrieved_tree_verifies_offline() {
        let client = client_with_bucket();
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        fs::write(source.path().join("a.txt"), b"alpha").unwrap();
        client
            .upload("acme", "rev1", source.path(), UploadOptions::default())
            .unwrap();
        client
            .download("acme", "rev1", target.path(), DownloadOptions::default())
            .unwrap();

        fs::write(target.path().join("a.txt"), b"ALPHA").unwrap();
        let manifest = Manifest::read(&target.path().join(MANIFEST_FILENAME)).unwrap();
        let report = manifest.verify_tree(target.path()).unwrap();
        assert_eq!(report.issues.len(), 1);
        assert!(matches!(report.issues[0].kind, IssueKind::Mismatch { .. }));
    }
}
