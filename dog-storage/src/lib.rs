//! # dog-storage: One storage contract, three backends
//!
//! `dog-storage` is the core of the DogRS storage gateway. It exposes a single
//! put/get/delete/search contract, [`Filesystem`], over interchangeable
//! backends and a bounded worker pool for multi-record operations.
//!
//! ## Key Features
//!
//! - **Record addressing**: blobs live at `domain/application/name` logical paths
//! - **Local disk**: confined root directory with capacity-based health gating
//! - **S3 and GCS**: one key-mapping and prefix-search algorithm, two clients
//! - **Batch executor**: shared fixed-size pool with per-unit outcome reports
//! - **Server agnostic**: the HTTP resources are thin callers of [`StorageAdapter`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dog_storage::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> StorageResult<()> {
//! // 1. Select the backend from settings (exactly one must be configured)
//! let settings = StorageSettings::from_env(dog_storage::config::ENV_PREFIX)?;
//! let fs = settings.backend()?.connect().await?;
//!
//! // 2. Build the shared batch executor once and inject it
//! let batch = Arc::new(BatchExecutor::new(settings.multifetch.concurrency_level)?);
//! let storage = StorageAdapter::new(fs, batch);
//!
//! // 3. Store and read a record
//! let record = Record::new("acme", "billing", "invoice-17")?;
//! let body = futures::stream::once(async { Ok::<_, std::io::Error>(bytes::Bytes::from_static(b"hello")) });
//! storage.put(&record, Box::pin(body)).await?;
//!
//! let text = storage.fetch(&record, EncodingType::Plain).await?;
//! assert_eq!(text, "hello");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  Gateway resources   │  ← HTTP, outside this crate
//! ├──────────────────────┤
//! │   StorageAdapter     │  ← single + multi-record operations
//! ├──────────┬───────────┤
//! │Filesystem│BatchExec. │  ← backend contract, shared worker pool
//! ├──────────┴───────────┤
//! │ Local │  S3  │  GCS  │  ← backends
//! └──────────────────────┘
//! ```

pub mod adapter;
pub mod batch;
pub mod config;
pub mod encoding;
mod error;
pub mod filesystem;
pub mod health;
pub mod local;
pub mod object;
mod record;
#[cfg(feature = "tracing-basic")]
pub mod telemetry;
mod types;

// Re-export main types for clean API
pub use adapter::{DeleteSlot, FetchSlot, StorageAdapter};
pub use batch::{BatchExecutor, BatchReport, BatchUnit, MAX_POOL_SIZE, MIN_POOL_SIZE};
pub use config::{BackendSettings, BatchSettings, StorageSettings};
pub use encoding::EncodingType;
pub use error::{StorageError, StorageResult};
pub use filesystem::{BackendKind, Filesystem};
pub use health::{FilesystemHealthCheck, HealthCheck};
pub use local::{DiskUsage, LocalFilesystem, SpaceProbe};
pub use object::{
    GcsClient, GcsFilesystem, ObjectClient, ObjectStoreFilesystem, S3Client, S3Config,
    S3Filesystem,
};
pub use record::{Record, RECORD_SEGMENTS, SEPARATOR};
pub use types::{ByteStream, KeyStream, SearchRequest, SearchResult};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BatchExecutor, ByteStream, EncodingType, Filesystem, Record, SearchRequest,
        SearchResult, StorageAdapter, StorageError, StorageResult, StorageSettings,
    };
}
