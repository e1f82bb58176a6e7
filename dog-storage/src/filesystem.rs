use async_trait::async_trait;

use crate::{ByteStream, Record, SearchRequest, SearchResult, StorageResult};

/// Core storage operations - implemented by every backend
///
/// Callers (the gateway resources, health checks, the adapter) only ever
/// hold an `Arc<dyn Filesystem>`; which backend sits behind it is decided
/// once at startup from configuration.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Store the stream at the record's location, replacing any existing object
    async fn put(&self, record: &Record, content: ByteStream) -> StorageResult<()>;

    /// Open the stored object for reading
    ///
    /// Fails with `NotFound` when nothing is stored at `record`.
    async fn get(&self, record: &Record) -> StorageResult<ByteStream>;

    /// Remove the stored object. Removing an absent record succeeds.
    async fn delete(&self, record: &Record) -> StorageResult<()>;

    async fn exists(&self, record: &Record) -> StorageResult<bool>;

    /// Size of the stored object in bytes
    async fn size(&self, record: &Record) -> StorageResult<u64>;

    /// Find the first object under `base_search_path` whose key contains `name`
    async fn search(&self, request: &SearchRequest) -> StorageResult<Option<SearchResult>>;

    /// Cheap liveness signal, never fails
    fn healthy(&self) -> bool;

    /// Deeper health probe, may touch the backing medium
    async fn probe(&self) -> bool {
        self.healthy()
    }

    /// Rebuild the logical record from a physical path or key
    fn path_to_record(&self, path: &str) -> Option<Record>;

    /// Short backend name for logs and diagnostics
    fn kind(&self) -> BackendKind;
}

/// The closed set of backend variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Folder,
    S3,
    Gcs,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::S3 => "s3",
            Self::Gcs => "gcs",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
