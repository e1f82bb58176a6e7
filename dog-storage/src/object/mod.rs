//! Object-store backends.
//!
//! Both remote variants share one algorithm, [`ObjectStoreFilesystem`], and
//! differ only in the [`ObjectClient`] that talks to the bucket:
//! [`S3Client`] (AWS SDK) and [`GcsClient`] (`object_store` GCS client).
//!
//! Keys are `prefix/domain/application/name` when a path prefix is
//! configured and `domain/application/name` otherwise.

mod gcs;
mod s3;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::{debug, instrument, warn};

use crate::encoding::{encode, read_to_end};
use crate::filesystem::{BackendKind, Filesystem};
use crate::{
    ByteStream, KeyStream, Record, SearchRequest, SearchResult, StorageError, StorageResult,
};

pub use gcs::{GcsClient, GcsFilesystem};
pub use s3::{S3Client, S3Config, S3Filesystem};

/// Content type every object is written with
pub const OBJECT_CONTENT_TYPE: &str = "application/octet-stream";

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Raw bucket operations on full physical keys
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Bucket the client is bound to
    fn bucket(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Create or overwrite the object at `key`
    async fn put_object(&self, key: &str, body: Bytes) -> StorageResult<()>;

    /// Stream the object at `key`, `NotFound` if it is absent
    async fn get_object(&self, key: &str) -> StorageResult<ByteStream>;

    /// Remove the object at `key`; a missing key is not an error
    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    /// Size of the object at `key`, `None` if it is absent
    async fn head_object(&self, key: &str) -> StorageResult<Option<u64>>;

    /// Every key that starts with `prefix` as a plain string, draining all
    /// listing pages. `a/b` also yields keys under `a/bc/`.
    fn list_keys(&self, prefix: &str) -> KeyStream;
}

/// A [`Filesystem`] over a remote bucket with an optional path prefix
pub struct ObjectStoreFilesystem<C> {
    client: C,
    path_prefix: Option<String>,
}

impl<C: ObjectClient> ObjectStoreFilesystem<C> {
    /// Wrap a client; empty prefixes and surrounding slashes are ignored
    pub fn new(client: C, path_prefix: Option<String>) -> Self {
        let path_prefix = path_prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());

        debug!(
            backend = %client.kind(),
            bucket = client.bucket(),
            prefix = path_prefix.as_deref().unwrap_or(""),
            "object store filesystem initialised"
        );

        Self {
            client,
            path_prefix,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn path_prefix(&self) -> Option<&str> {
        self.path_prefix.as_deref()
    }

    /// Physical key of a record
    pub fn key_of(&self, record: &Record) -> String {
        self.prefixed(&record.path())
    }

    fn prefixed(&self, path: &str) -> String {
        match &self.path_prefix {
            Some(prefix) => format!("{}/{}", prefix, path),
            None => path.to_string(),
        }
    }

    /// Logical path of a physical key
    fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        match &self.path_prefix {
            Some(prefix) => key
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(key),
            None => key,
        }
    }

    async fn first_match(&self, prefix: &str, needle: &str) -> StorageResult<Option<String>> {
        let mut keys = self.client.list_keys(prefix);
        let mut scanned = 0usize;
        while let Some(key) = keys.next().await {
            let key = key?;
            scanned += 1;
            if key.contains(needle) {
                debug!(scanned, key = %key, "search matched");
                return Ok(Some(key));
            }
        }
        debug!(scanned, "search found no match");
        Ok(None)
    }
}

#[async_trait]
impl<C: ObjectClient> Filesystem for ObjectStoreFilesystem<C> {
    #[instrument(skip(self, content), fields(record = %record))]
    async fn put(&self, record: &Record, content: ByteStream) -> StorageResult<()> {
        let body = read_to_end(content).await?;
        self.client.put_object(&self.key_of(record), body).await
    }

    #[instrument(skip(self), fields(record = %record))]
    async fn get(&self, record: &Record) -> StorageResult<ByteStream> {
        self.client
            .get_object(&self.key_of(record))
            .await
            .map_err(|e| if e.is_not_found() { StorageError::not_found(record.path()) } else { e })
    }

    #[instrument(skip(self), fields(record = %record))]
    async fn delete(&self, record: &Record) -> StorageResult<()> {
        self.client.delete_object(&self.key_of(record)).await
    }

    async fn exists(&self, record: &Record) -> StorageResult<bool> {
        Ok(self.client.head_object(&self.key_of(record)).await?.is_some())
    }

    async fn size(&self, record: &Record) -> StorageResult<u64> {
        self.client
            .head_object(&self.key_of(record))
            .await?
            .ok_or_else(|| StorageError::not_found(record.path()))
    }

    #[instrument(skip(self), fields(base = %request.base_search_path, name = %request.name))]
    async fn search(&self, request: &SearchRequest) -> StorageResult<Option<SearchResult>> {
        let directory = self.prefixed(&request.base_search_path);

        let Some(key) = self.first_match(&directory, &request.name).await? else {
            return Ok(None);
        };

        let content = read_to_end(self.client.get_object(&key).await?).await?;
        let data = encode(&content, request.encoding_type)?;
        let path = self.strip_prefix(&key).to_string();
        Ok(Some(SearchResult::new(data, path)))
    }

    fn healthy(&self) -> bool {
        true
    }

    async fn probe(&self) -> bool {
        let prefix = self.path_prefix.clone().unwrap_or_default();
        let mut keys = self.client.list_keys(&prefix);
        match tokio::time::timeout(PROBE_TIMEOUT, keys.next()).await {
            Ok(None) | Ok(Some(Ok(_))) => true,
            Ok(Some(Err(e))) => {
                warn!(bucket = self.client.bucket(), "object store probe failed: {}", e);
                false
            }
            Err(_) => {
                warn!(bucket = self.client.bucket(), "object store probe timed out");
                false
            }
        }
    }

    fn path_to_record(&self, path: &str) -> Option<Record> {
        Record::parse(self.strip_prefix(path.trim()))
    }

    fn kind(&self) -> BackendKind {
        self.client.kind()
    }
}
