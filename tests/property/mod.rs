//! Property-based testing for djarchive
//!
//! Uses proptest to check the manifest round-trip and the download path
//! guard across generated trees and keys.

use ::djarchive::path_codec::{compose_local_target, denormalize, normalize};
use ::djarchive::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Generate relative subpaths of one to four segments
fn subpath_strategy() -> impl Strategy<Value = String> {
    let segment = prop_oneof![
        "[a-z]{1,8}",
        "dir[0-9]{1,3}",
        "[a-z]{1,6}\\.(csv|npy|txt)",
        "[a-z]{1,4} [a-z,\"]{1,4}",
    ];
    prop::collection::vec(segment, 1..=4).prop_map(|segments| segments.join("/"))
}

/// Generate a tree of files where no file path is a prefix directory of another
fn tree_strategy() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(
        subpath_strategy().prop_map(|p| format!("{}.dat", p)),
        prop::collection::vec(any::<u8>(), 0..2048),
        1..12,
    )
}

/// Remote keys built from arbitrary mixes of names, `.`, `..` and empty segments
fn hostile_key_strategy() -> impl Strategy<Value = String> {
    let segment = prop_oneof![
        3 => "[a-z]{1,5}",
        2 => Just("..".to_string()),
        1 => Just(".".to_string()),
        1 => Just(String::new()),
    ];
    prop::collection::vec(segment, 1..8).prop_map(|segments| segments.join("/"))
}

fn write_tree(root: &Path, tree: &BTreeMap<String, Vec<u8>>) {
    for (subpath, content) in tree {
        let path = denormalize(root, subpath);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_manifest_round_trip(tree in tree_strategy()) {
        let source = TempDir::new().unwrap();
        write_tree(source.path(), &tree);

        let store = MemoryStore::new();
        store.create_bucket("bucket");
        let client = ArchiveClient::new(Box::new(store), "bucket");
        client.upload("ds", "r1", source.path(), UploadOptions::default()).unwrap();

        let manifest = Manifest::read(&source.path().join(MANIFEST_FILENAME)).unwrap();
        prop_assert_eq!(manifest.len(), tree.len());
        for (subpath, content) in &tree {
            let entry = manifest.get(subpath).unwrap();
            prop_assert_eq!(entry.size, content.len() as u64);
            prop_assert_eq!(&entry.digest, &digest::hash_data(content));
        }

        let reparsed = Manifest::parse(&manifest.to_csv()).unwrap();
        prop_assert_eq!(reparsed, manifest);
    }

    #[test]
    fn prop_normalize_inverts_denormalize(subpath in subpath_strategy()) {
        let root = Path::new("/archive/root");
        let local = denormalize(root, &subpath);
        prop_assert_eq!(normalize(root, &local).unwrap(), subpath);
    }

    #[test]
    fn prop_composed_target_stays_inside(key in hostile_key_strategy()) {
        let root = Path::new("/archive/target");
        match compose_local_target(root, &key) {
            Ok(path) => {
                prop_assert!(path.starts_with(root));
                prop_assert!(path != root);
                prop_assert!(path.components().all(|c| !matches!(c, std::path::Component::ParentDir)));
            }
            Err(e) => {
                prop_assert!(matches!(e, ArchiveError::PathEscape { .. } | ArchiveError::InvalidPath(_)), "unexpected error: {:?}", e);
            }
        }
    }

    #[test]
    fn prop_download_matches_source(tree in tree_strategy(), chunk in 1u64..700) {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        write_tree(source.path(), &tree);

        let store = MemoryStore::new();
        store.create_bucket("bucket");
        let client = ArchiveClient::new(Box::new(store), "bucket");
        client.upload("ds", "r1", source.path(), UploadOptions::default()).unwrap();

        let options = DownloadOptions { chunk_size: chunk, ..Default::default() };
        let report = client.download("ds", "r1", target.path(), options).unwrap();
        prop_assert!(report.is_clean());
        prop_assert_eq!(report.files_transferred, tree.len());
        for (subpath, content) in &tree {
            prop_assert_eq!(&fs::read(denormalize(target.path(), subpath)).unwrap(), content);
        }
    }
}
