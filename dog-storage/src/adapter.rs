use std::sync::Arc;

use tracing::debug;

use crate::encoding::{encode, read_to_end};
use crate::{
    BatchExecutor, BatchUnit, ByteStream, EncodingType, Filesystem, Record, SearchRequest,
    SearchResult, StorageResult,
};

/// The storage adapter - what the gateway resources call into
///
/// Wraps the configured backend and the shared batch executor. Single-record
/// calls go straight to the backend; multi-record calls fan out through the
/// executor and report one slot per record.
#[derive(Clone)]
pub struct StorageAdapter {
    fs: Arc<dyn Filesystem>,
    batch: Arc<BatchExecutor>,
}

/// Outcome of fetching one record of a multi-fetch
#[derive(Debug)]
pub struct FetchSlot {
    pub record: Record,
    pub result: StorageResult<String>,
}

/// Outcome of deleting one record of a multi-delete
#[derive(Debug)]
pub struct DeleteSlot {
    pub record: Record,
    pub result: StorageResult<()>,
}

impl StorageAdapter {
    pub fn new(fs: Arc<dyn Filesystem>, batch: Arc<BatchExecutor>) -> Self {
        Self { fs, batch }
    }

    pub fn filesystem(&self) -> &Arc<dyn Filesystem> {
        &self.fs
    }

    pub fn executor(&self) -> &Arc<BatchExecutor> {
        &self.batch
    }

    pub async fn put(&self, record: &Record, content: ByteStream) -> StorageResult<()> {
        self.fs.put(record, content).await
    }

    pub async fn get(&self, record: &Record) -> StorageResult<ByteStream> {
        self.fs.get(record).await
    }

    pub async fn delete(&self, record: &Record) -> StorageResult<()> {
        self.fs.delete(record).await
    }

    pub async fn exists(&self, record: &Record) -> StorageResult<bool> {
        self.fs.exists(record).await
    }

    pub async fn size(&self, record: &Record) -> StorageResult<u64> {
        self.fs.size(record).await
    }

    pub async fn search(&self, request: &SearchRequest) -> StorageResult<Option<SearchResult>> {
        self.fs.search(request).await
    }

    /// Read a whole record and encode it for transport
    pub async fn fetch(&self, record: &Record, encoding: EncodingType) -> StorageResult<String> {
        fetch_encoded(self.fs.as_ref(), record, encoding).await
    }

    /// Fetch many records in parallel, one slot per record in request order
    pub async fn multi_fetch(&self, records: Vec<Record>, encoding: EncodingType) -> Vec<FetchSlot> {
        let units = records
            .iter()
            .cloned()
            .map(|record| {
                let fs = self.fs.clone();
                let unit: BatchUnit<String> =
                    Box::pin(async move { fetch_encoded(fs.as_ref(), &record, encoding).await });
                unit
            })
            .collect();

        let report = self.batch.execute(units).await;
        debug!(
            requested = records.len(),
            fetched = report.succeeded(),
            "multi fetch finished"
        );

        records
            .into_iter()
            .zip(report.into_outcomes())
            .map(|(record, result)| FetchSlot { record, result })
            .collect()
    }

    /// Delete many records in parallel, one slot per record in request order
    pub async fn multi_delete(&self, records: Vec<Record>) -> Vec<DeleteSlot> {
        let units = records
            .iter()
            .cloned()
            .map(|record| {
                let fs = self.fs.clone();
                let unit: BatchUnit<()> = Box::pin(async move { fs.delete(&record).await });
                unit
            })
            .collect();

        let report = self.batch.execute(units).await;
        debug!(
            requested = records.len(),
            deleted = report.succeeded(),
            "multi delete finished"
        );

        records
            .into_iter()
            .zip(report.into_outcomes())
            .map(|(record, result)| DeleteSlot { record, result })
            .collect()
    }

    pub fn healthy(&self) -> bool {
        self.fs.healthy()
    }
}

async fn fetch_encoded(
    fs: &dyn Filesystem,
    record: &Record,
    encoding: EncodingType,
) -> StorageResult<String> {
    let content = read_to_end(fs.get(record).await?).await?;
    encode(&content, encoding)
}
