use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tracing::debug;

use super::{ObjectClient, ObjectStoreFilesystem};
use crate::filesystem::BackendKind;
use crate::{ByteStream, KeyStream, StorageError, StorageResult};

/// Google Cloud Storage backed filesystem
pub type GcsFilesystem = ObjectStoreFilesystem<GcsClient>;

/// [`ObjectClient`] over Google Cloud Storage through the `object_store` crate
#[derive(Clone)]
pub struct GcsClient {
    bucket: String,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for GcsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsClient").field("bucket", &self.bucket).finish()
    }
}

impl GcsClient {
    /// Connect to `bucket`.
    ///
    /// With `credentials_path` the service account JSON file is used;
    /// otherwise credentials come from `GOOGLE_APPLICATION_CREDENTIALS` or
    /// the default service account of the host.
    pub fn connect(bucket: &str, credentials_path: Option<&str>) -> StorageResult<Self> {
        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);

        match credentials_path.filter(|p| !p.is_empty()) {
            Some(path) => {
                debug!(credentials = path, "using GCS filesystem with JSON credentials file");
                builder = builder.with_service_account_path(path);
            }
            None => {
                debug!("using GCS filesystem with application default credentials");
            }
        }

        let store = builder.build().map_err(|e| {
            StorageError::configuration(format!("Failed to create GCS client for {}: {}", bucket, e))
        })?;

        Ok(Self::with_store(bucket, Arc::new(store)))
    }

    /// Wrap an already-built store, e.g. an in-memory one
    pub fn with_store<S: Into<String>>(bucket: S, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            bucket: bucket.into(),
            store,
        }
    }
}

/// Object path holding `key` verbatim, so listings hand back the same string
fn object_path(key: &str) -> StorageResult<ObjectPath> {
    ObjectPath::parse(key)
        .map_err(|e| StorageError::invalid(format!("'{}' is not a valid object key: {}", key, e)))
}

fn map_error(key: &str, error: object_store::Error) -> StorageError {
    match error {
        object_store::Error::NotFound { .. } => StorageError::not_found(key),
        other => StorageError::backend(other),
    }
}

#[async_trait]
impl ObjectClient for GcsClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Gcs
    }

    async fn put_object(&self, key: &str, body: Bytes) -> StorageResult<()> {
        let size = body.len();
        self.store
            .put(&object_path(key)?, PutPayload::from(body))
            .await
            .map_err(|e| map_error(key, e))?;
        debug!(key, size, "put object");
        Ok(())
    }

    async fn get_object(&self, key: &str) -> StorageResult<ByteStream> {
        let result = self
            .store
            .get(&object_path(key)?)
            .await
            .map_err(|e| map_error(key, e))?;
        Ok(Box::pin(result.into_stream().map_err(std::io::Error::other)))
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        match self.store.delete(&object_path(key)?).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(StorageError::backend(e)),
        }
    }

    async fn head_object(&self, key: &str) -> StorageResult<Option<u64>> {
        match self.store.head(&object_path(key)?).await {
            Ok(meta) => Ok(Some(meta.size)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(StorageError::backend(e)),
        }
    }

    fn list_keys(&self, prefix: &str) -> KeyStream {
        // object_store lists whole segments; list the parent and match the raw prefix
        let parent = prefix.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("");
        let listing = match object_path(parent) {
            Ok(path) if path.as_ref().is_empty() => self.store.list(None),
            Ok(path) => self.store.list(Some(&path)),
            Err(e) => return Box::pin(futures::stream::once(async move { Err(e) })),
        };

        let prefix = prefix.to_string();
        Box::pin(listing.filter_map(move |meta| {
            let key = match meta {
                Ok(meta) => {
                    let key = meta.location.to_string();
                    key.starts_with(&prefix).then_some(Ok(key))
                }
                Err(e) => Some(Err(StorageError::backend(e))),
            };
            futures::future::ready(key)
        }))
    }
}
