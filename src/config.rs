//! Store configuration
//!
//! Connection settings come from a JSON file with one credential scope for
//! readers and one for publishers:
//!
//! ```json
//! {
//!   "djarchive.client": { "endpoint": "file:///srv/archive", "bucket": "djarchive" },
//!   "djarchive.admin": {
//!     "endpoint": "file:///srv/archive",
//!     "bucket": "djarchive",
//!     "access_key": "publisher",
//!     "secret_key": "..."
//!   },
//!   "loglevel": "info",
//!   "logfile": "/var/log/djarchive.log"
//! }
//! ```
//!
//! Every field is optional. `DJARCHIVE_*` environment variables override the
//! selected scope, and missing values fall back to [`DEFAULT_ENDPOINT`] and
//! [`DEFAULT_BUCKET`].

use crate::error::{ArchiveError, Result};
use crate::path_codec::validate_name;
use crate::storage::DirectoryStore;
use crate::store::ObjectStore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "file://.djarchive-store";

/// Bucket used when none is configured
pub const DEFAULT_BUCKET: &str = "djarchive";

/// Configuration file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "djarchive.json";

/// Environment variable overriding the endpoint
pub const ENV_ENDPOINT: &str = "DJARCHIVE_ENDPOINT";
/// Environment variable overriding the access key
pub const ENV_ACCESS_KEY: &str = "DJARCHIVE_ACCESS_KEY";
/// Environment variable overriding the secret key
pub const ENV_SECRET_KEY: &str = "DJARCHIVE_SECRET_KEY";
/// Environment variable overriding the bucket
pub const ENV_BUCKET: &str = "DJARCHIVE_BUCKET";
/// Environment variable selecting the log level
pub const ENV_LOGLEVEL: &str = "DJARCHIVE_LOGLEVEL";

const FILE_SCHEME: &str = "file://";

/// One credential scope as written in the configuration file
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScopeSettings {
    /// Store endpoint URL
    pub endpoint: Option<String>,
    /// Access key
    pub access_key: Option<String>,
    /// Secret key
    pub secret_key: Option<String>,
    /// Bucket holding the datasets
    pub bucket: Option<String>,
}

impl std::fmt::Debug for ScopeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeSettings")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Contents of a configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Read-only scope
    #[serde(rename = "djarchive.client")]
    pub client: ScopeSettings,
    /// Publishing scope
    #[serde(rename = "djarchive.admin")]
    pub admin: ScopeSettings,
    /// Log level directive (`error`, `warn`, `info`, `debug`, `trace`)
    pub loglevel: Option<String>,
    /// Additional file receiving log output
    pub logfile: Option<PathBuf>,
}

impl ConfigFile {
    /// Load a configuration file
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::NotFound`] if the file does not exist
    /// - [`ArchiveError::Json`] if it is not a valid configuration document
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArchiveError::not_found(format!("configuration file {:?}", path)));
            }
            Err(e) => return Err(e.into()),
        };
        let config = serde_json::from_str(&text)?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load `explicit` if given, else [`DEFAULT_CONFIG_FILE`] if present, else defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Settings for the requested scope
    pub fn scope(&self, admin: bool) -> &ScopeSettings {
        if admin {
            &self.admin
        } else {
            &self.client
        }
    }
}

/// Resolved connection settings for one client session
#[derive(Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Store endpoint URL
    pub endpoint: String,
    /// Access key, if any
    pub access_key: Option<String>,
    /// Secret key, if any
    pub secret_key: Option<String>,
    /// Bucket holding the datasets
    pub bucket: String,
    /// Whether the publishing scope was selected
    pub admin: bool,
}

impl std::fmt::Debug for ArchiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("bucket", &self.bucket)
            .field("admin", &self.admin)
            .finish()
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            access_key: None,
            secret_key: None,
            bucket: DEFAULT_BUCKET.to_string(),
            admin: false,
        }
    }
}

impl ArchiveConfig {
    /// Configuration for a local directory store
    pub fn directory(root: impl AsRef<Path>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: format!("{}{}", FILE_SCHEME, root.as_ref().display()),
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Resolve one scope of a configuration file, filling in defaults
    pub fn from_file(file: &ConfigFile, admin: bool) -> Self {
        let scope = file.scope(admin);
        Self {
            endpoint: scope
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            access_key: scope.access_key.clone(),
            secret_key: scope.secret_key.clone(),
            bucket: scope
                .bucket
                .clone()
                .unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            admin,
        }
    }

    /// Apply `DJARCHIVE_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(endpoint) = get(ENV_ENDPOINT) {
            self.endpoint = endpoint;
        }
        if let Some(access_key) = get(ENV_ACCESS_KEY) {
            self.access_key = Some(access_key);
        }
        if let Some(secret_key) = get(ENV_SECRET_KEY) {
            self.secret_key = Some(secret_key);
        }
        if let Some(bucket) = get(ENV_BUCKET) {
            self.bucket = bucket;
        }
        self
    }

    /// Presence checks on the resolved settings
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::InvalidConfiguration`] if the endpoint or bucket is
    ///   empty, the bucket is not a single key segment, or the admin scope
    ///   lacks credentials
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ArchiveError::InvalidConfiguration("endpoint is empty".to_string()));
        }
        if validate_name(&self.bucket).is_err() {
            return Err(ArchiveError::InvalidConfiguration(format!(
                "invalid bucket name '{}'",
                self.bucket
            )));
        }
        if self.admin {
            let missing = |value: &Option<String>| value.as_deref().unwrap_or("").is_empty();
            if missing(&self.access_key) || missing(&self.secret_key) {
                return Err(ArchiveError::InvalidConfiguration(
                    "admin scope requires access_key and secret_key".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Local root of a `file://` endpoint
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::InvalidConfiguration`] for any other scheme
    pub fn directory_root(&self) -> Result<PathBuf> {
        match self.endpoint.strip_prefix(FILE_SCHEME) {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Err(ArchiveError::InvalidConfiguration(format!(
                "unsupported endpoint '{}' (expected {}<directory>)",
                self.endpoint, FILE_SCHEME
            ))),
        }
    }

    /// Open the store the endpoint points at
    ///
    /// The admin scope creates the store directory and bucket on first use;
    /// the client scope requires both to exist.
    pub fn open_store(&self) -> Result<Box<dyn ObjectStore>> {
        self.validate()?;
        let root = self.directory_root()?;

        let store = if self.admin {
            let store = DirectoryStore::create(root)?;
            store.create_bucket(&self.bucket)?;
            store
        } else {
            DirectoryStore::open(root)?
        };
        Ok(Box::new(store))
    }
}
