use std::sync::Arc;

use bytes::Bytes;
use object_store::memory::InMemory;

use dog_storage::{
    BatchExecutor, ByteStream, EncodingType, FilesystemHealthCheck, GcsClient,
    ObjectStoreFilesystem, Record, SearchRequest, StorageAdapter, StorageError,
};

fn body(data: &'static [u8]) -> ByteStream {
    Box::pin(futures::stream::once(async move {
        Ok::<_, std::io::Error>(Bytes::from_static(data))
    }))
}

fn record(name: &str) -> Record {
    Record::new("acme", "billing", name).unwrap()
}

fn adapter() -> StorageAdapter {
    let fs = ObjectStoreFilesystem::new(
        GcsClient::with_store("invoices", Arc::new(InMemory::new())),
        Some("gateway".to_string()),
    );
    let batch = Arc::new(BatchExecutor::new(4).unwrap());
    StorageAdapter::new(Arc::new(fs), batch)
}

/// Fetch reads a whole record and encodes it
#[tokio::test]
async fn test_fetch_encodes_content() {
    let storage = adapter();
    storage.put(&record("inv-1"), body(b"total: 42")).await.unwrap();

    let plain = storage.fetch(&record("inv-1"), EncodingType::Plain).await.unwrap();
    assert_eq!(plain, "total: 42");

    let encoded = storage.fetch(&record("inv-1"), EncodingType::Base64).await.unwrap();
    assert_eq!(encoded, "dG90YWw6IDQy");

    let missing = storage.fetch(&record("inv-404"), EncodingType::Plain).await;
    assert!(matches!(missing, Err(StorageError::NotFound { .. })));
}

/// Binary content cannot be fetched as plain text
#[tokio::test]
async fn test_fetch_plain_rejects_binary() {
    let storage = adapter();
    storage.put(&record("blob"), body(&[0xff, 0xfe, 0x00])).await.unwrap();

    let err = storage.fetch(&record("blob"), EncodingType::Plain).await.unwrap_err();
    assert!(matches!(err, StorageError::Invalid { .. }));
    assert_eq!(
        storage.fetch(&record("blob"), EncodingType::Base64).await.unwrap(),
        "//4A"
    );
}

/// A missing record fills its own slot; the others are still fetched
#[tokio::test]
async fn test_multi_fetch_reports_per_record() {
    let storage = adapter();
    storage.put(&record("inv-1"), body(b"one")).await.unwrap();
    storage.put(&record("inv-3"), body(b"three")).await.unwrap();

    let slots = storage
        .multi_fetch(
            vec![record("inv-1"), record("inv-2"), record("inv-3")],
            EncodingType::Plain,
        )
        .await;

    assert_eq!(slots.len(), 3);
    assert_eq!(slots[0].record, record("inv-1"));
    assert_eq!(slots[0].result.as_deref().unwrap(), "one");
    assert!(slots[1].result.as_ref().unwrap_err().is_not_found());
    assert_eq!(slots[2].record, record("inv-3"));
    assert_eq!(slots[2].result.as_deref().unwrap(), "three");
}

#[tokio::test]
async fn test_multi_fetch_empty() {
    let storage = adapter();
    let slots = storage.multi_fetch(Vec::new(), EncodingType::Base64).await;

    assert!(slots.is_empty());
    assert_eq!(storage.executor().submitted(), 0);
}

/// Multi-delete removes every record, present or not
#[tokio::test]
async fn test_multi_delete() {
    let storage = adapter();
    for name in ["a", "b", "c"] {
        storage.put(&record(name), body(b"x")).await.unwrap();
    }

    let slots = storage
        .multi_delete(vec![record("a"), record("b"), record("c"), record("ghost")])
        .await;

    assert_eq!(slots.len(), 4);
    assert!(slots.iter().all(|s| s.result.is_ok()));
    for name in ["a", "b", "c"] {
        assert!(!storage.exists(&record(name)).await.unwrap());
    }
}

/// Single-record calls go straight to the backend
#[tokio::test]
async fn test_pass_through_operations() {
    let storage = adapter();
    let r = record("inv-9");
    storage.put(&r, body(b"nine")).await.unwrap();

    assert!(storage.exists(&r).await.unwrap());
    assert_eq!(storage.size(&r).await.unwrap(), 4);

    let hit = storage
        .search(&SearchRequest::new("acme/billing", "inv-").with_encoding(EncodingType::Plain))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit.path, "acme/billing/inv-9");
    assert_eq!(hit.data, "nine");

    storage.delete(&r).await.unwrap();
    assert!(!storage.exists(&r).await.unwrap());
    assert!(storage.healthy());
}

#[tokio::test]
async fn test_health_check_uses_backend_probe() {
    let storage = adapter();
    let check = FilesystemHealthCheck::new(storage.filesystem().clone())
        .check()
        .await;

    assert_eq!(check.name, FilesystemHealthCheck::NAME);
    assert!(check.is_healthy());
}
