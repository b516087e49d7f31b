//! # djarchive - Manifest-verified dataset archives
//!
//! Publish and retrieve versioned datasets (named, revisioned directory trees)
//! on a flat object store, using a checksum manifest as both an integrity
//! ledger and a completeness marker.
//!
//! ## Overview
//!
//! A dataset revision lives under `<dataset>/<revision>/` in a bucket. Next to
//! its files sits `djarchive-manifest.csv`, listing the size and SHA-256
//! digest of every file. djarchive lets you:
//! - Publish a local tree as a new revision, generating or checking its manifest
//! - Retrieve a revision, skipping files that are already present and intact
//! - Detect partial uploads, tampered objects and stale local copies
//! - Browse the datasets and revisions published in a bucket
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use djarchive::{ArchiveClient, ArchiveConfig, DownloadOptions, UploadOptions};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ArchiveConfig {
//!     admin: true,
//!     access_key: Some("publisher".to_string()),
//!     secret_key: Some("secret".to_string()),
//!     ..ArchiveConfig::directory("/srv/archive", "djarchive")
//! };
//! let client = ArchiveClient::from_config(&config)?;
//!
//! // Publish a revision; the manifest is uploaded last
//! let upload = client.upload("acme", "rev1", Path::new("./acme"), UploadOptions::default())?;
//! println!("Published {} files", upload.files_uploaded);
//!
//! // Retrieve it elsewhere; re-running only fetches what changed
//! let options = DownloadOptions { create_target: true, ..Default::default() };
//! let report = client.download("acme", "rev1", Path::new("/tmp/acme"), options)?;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Manifest
//!
//! A header-less quoted CSV of `"size","digest","subpath"` lines. Subpaths are
//! unique; a repeated subpath marks the manifest as corrupt. Uploads write the
//! manifest object after every data object, so its presence means the
//! revision is complete.
//!
//! ### Path codec
//!
//! Local paths and remote keys are separate domains joined only through
//! [`path_codec`]. Every key fetched from a store is checked so it cannot
//! resolve outside the download target.
//!
//! ### Object stores
//!
//! The engine talks to storage through the [`ObjectStore`] trait: paginated
//! listing, stat, ranged reads and whole-object writes. [`DirectoryStore`]
//! keeps objects on a local or shared filesystem (`file://` endpoints);
//! [`MemoryStore`] keeps them in memory.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] with [`ArchiveError`]. Uploads in
//! verify mode fail on the first problem. Downloads count integrity issues
//! in their report unless [`DownloadOptions::strict`] is set, but always abort
//! on a missing manifest or a key escaping the target.
//!
//! ## Module Organization
//!
//! - [`catalog`]: dataset and revision listing
//! - [`client`]: the client session tying a store to a bucket
//! - [`config`]: configuration file and environment handling
//! - [`digest`]: streamed SHA-256 file digests
//! - [`download`]: revision retrieval and chunked fetch
//! - [`manifest`]: manifest format and local verification
//! - [`path_codec`]: local path / remote key translation
//! - [`store`] and [`storage`]: the store trait and bundled backends
//! - [`upload`]: revision publication
//! - [`types`]: options, reports and progress types
//! - [`error`]: error types

// Public API modules
pub mod catalog;
pub mod client;
pub mod config;
pub mod digest;
pub mod download;
pub mod error;
pub mod manifest;
pub mod path_codec;
pub mod storage;
pub mod store;
pub mod types;
pub mod upload;
pub mod utils;

// Internal modules
mod file_tracking;

// Re-export main types for convenience
pub use catalog::{Catalog, Revision};
pub use client::ArchiveClient;
pub use config::{ArchiveConfig, ConfigFile};
pub use digest::{digest_file, FileDigest};
pub use download::{fetch_object, Downloader};
pub use error::{ArchiveError, Result};
pub use manifest::{Manifest, ManifestEntry, MANIFEST_FILENAME};
pub use storage::{DirectoryStore, MemoryStore};
pub use store::{list_objects, ObjectStat, ObjectStore, RemoteObject};
pub use types::*;
pub use upload::Uploader;
