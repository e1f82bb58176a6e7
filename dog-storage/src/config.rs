//! # Storage settings
//!
//! The gateway is configured with exactly one backend section: `folderFs`,
//! `s3Fs` or `gcsFs`. Settings are usually read from the JSON document the
//! service is deployed with:
//!
//! ```rust
//! use dog_storage::StorageSettings;
//!
//! let settings = StorageSettings::from_json_str(r#"{
//!     "folderFs": { "folderPath": "/var/lib/storage", "maxUsedStoragePercentage": 0.9 },
//!     "multifetch": { "concurrencyLevel": 16 }
//! }"#).unwrap();
//!
//! assert!(settings.backend().is_ok());
//! ```
//!
//! ## Environment overrides
//! Every key can also come from the environment, using a prefix and `__`
//! between sections:
//!
//! ```bash
//! export DOGSTORAGE__FOLDER_FS__FOLDER_PATH=/var/lib/storage
//! export DOGSTORAGE__FOLDER_FS__MAX_USED_STORAGE_PERCENTAGE=0.9
//! export DOGSTORAGE__MULTIFETCH__CONCURRENCY_LEVEL=16
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::filesystem::Filesystem;
use crate::local::LocalFilesystem;
use crate::object::{GcsClient, ObjectStoreFilesystem, S3Client, S3Config};
use crate::{StorageError, StorageResult};

/// Default prefix for environment overrides
pub const ENV_PREFIX: &str = "DOGSTORAGE__";

/// Top-level storage settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSettings {
    pub folder_fs: Option<FolderFsSettings>,
    pub s3_fs: Option<S3FsSettings>,
    pub gcs_fs: Option<GcsFsSettings>,
    #[serde(default)]
    pub multifetch: BatchSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderFsSettings {
    pub folder_path: PathBuf,
    /// Fraction of the disk in use above which the folder backend is unhealthy
    #[serde(default = "default_max_used_storage")]
    pub max_used_storage_percentage: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3FsSettings {
    pub bucket: String,
    pub path_prefix: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub credentials: S3Credentials,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Credentials {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsFsSettings {
    pub bucket: String,
    pub path_prefix: Option<String>,
    pub json_credentials_filename: Option<String>,
}

/// Sizing of the shared batch executor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSettings {
    #[serde(default = "default_concurrency_level")]
    pub concurrency_level: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency_level: default_concurrency_level(),
        }
    }
}

fn default_max_used_storage() -> f64 {
    0.95
}

fn default_concurrency_level() -> usize {
    10
}

/// The one backend a deployment runs with
#[derive(Debug, Clone)]
pub enum BackendSettings {
    Folder(FolderFsSettings),
    S3(S3FsSettings),
    Gcs(GcsFsSettings),
}

impl StorageSettings {
    /// Parse settings from a JSON document
    pub fn from_json_str(json: &str) -> StorageResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read settings from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> StorageResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Build settings from process environment variables starting with `prefix`
    pub fn from_env(prefix: &str) -> StorageResult<Self> {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Build settings from `KEY=value` pairs, e.g. `PREFIX__S3_FS__BUCKET`
    pub fn from_vars<I>(prefix: &str, vars: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let values: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(prefix)
                    .map(|stripped| (stripped.to_lowercase().replace("__", "."), value))
            })
            .collect();
        let get = |key: &str| values.get(key).cloned();

        let mut settings = Self::default();

        if let Some(folder_path) = get("folder_fs.folder_path") {
            let max_used_storage_percentage = match get("folder_fs.max_used_storage_percentage") {
                Some(raw) => raw.parse::<f64>().map_err(|_| {
                    StorageError::configuration(format!(
                        "folder_fs.max_used_storage_percentage is not a number: {}",
                        raw
                    ))
                })?,
                None => default_max_used_storage(),
            };
            settings.folder_fs = Some(FolderFsSettings {
                folder_path: PathBuf::from(folder_path),
                max_used_storage_percentage,
            });
        }

        if let Some(bucket) = get("s3_fs.bucket") {
            settings.s3_fs = Some(S3FsSettings {
                bucket,
                path_prefix: get("s3_fs.path_prefix"),
                region: get("s3_fs.region"),
                endpoint: get("s3_fs.endpoint"),
                credentials: S3Credentials {
                    access_key: get("s3_fs.credentials.access_key"),
                    secret_key: get("s3_fs.credentials.secret_key"),
                },
            });
        }

        if let Some(bucket) = get("gcs_fs.bucket") {
            settings.gcs_fs = Some(GcsFsSettings {
                bucket,
                path_prefix: get("gcs_fs.path_prefix"),
                json_credentials_filename: get("gcs_fs.json_credentials_filename"),
            });
        }

        if let Some(raw) = get("multifetch.concurrency_level") {
            settings.multifetch.concurrency_level = raw.parse().map_err(|_| {
                StorageError::configuration(format!(
                    "multifetch.concurrency_level is not a number: {}",
                    raw
                ))
            })?;
        }

        Ok(settings)
    }

    /// Resolve the single configured backend
    pub fn backend(&self) -> StorageResult<BackendSettings> {
        let mut selected = Vec::new();
        if let Some(folder) = &self.folder_fs {
            selected.push(BackendSettings::Folder(folder.clone()));
        }
        if let Some(s3) = &self.s3_fs {
            selected.push(BackendSettings::S3(s3.clone()));
        }
        if let Some(gcs) = &self.gcs_fs {
            selected.push(BackendSettings::Gcs(gcs.clone()));
        }

        match selected.len() {
            0 => Err(StorageError::configuration(
                "Please configure either folderFs, s3Fs or gcsFs",
            )),
            1 => Ok(selected.remove(0)),
            _ => Err(StorageError::configuration(format!(
                "Only one backend may be configured, found: {}",
                selected
                    .iter()
                    .map(BackendSettings::name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

impl BackendSettings {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Folder(_) => "folderFs",
            Self::S3(_) => "s3Fs",
            Self::Gcs(_) => "gcsFs",
        }
    }

    /// Build the configured backend
    pub async fn connect(&self) -> StorageResult<Arc<dyn Filesystem>> {
        match self {
            Self::Folder(folder) => {
                info!(path = %folder.folder_path.display(), "using local filesystem");
                let fs = LocalFilesystem::new(&folder.folder_path, folder.max_used_storage_percentage)
                    .await?;
                Ok(Arc::new(fs))
            }
            Self::S3(s3) => {
                info!(
                    bucket = %s3.bucket,
                    prefix = s3.path_prefix.as_deref().unwrap_or(""),
                    "using AWS S3 based filesystem"
                );
                let config = S3Config {
                    bucket: s3.bucket.clone(),
                    region: s3.region.clone(),
                    endpoint: s3.endpoint.clone(),
                    access_key: s3.credentials.access_key.clone(),
                    secret_key: s3.credentials.secret_key.clone(),
                };
                let client = S3Client::connect(&config).await?;
                Ok(Arc::new(ObjectStoreFilesystem::new(client, s3.path_prefix.clone())))
            }
            Self::Gcs(gcs) => {
                info!(
                    bucket = %gcs.bucket,
                    prefix = gcs.path_prefix.as_deref().unwrap_or(""),
                    "using GCS based filesystem"
                );
                let client = GcsClient::connect(&gcs.bucket, gcs.json_credentials_filename.as_deref())?;
                Ok(Arc::new(ObjectStoreFilesystem::new(client, gcs.path_prefix.clone())))
            }
        }
    }
}
