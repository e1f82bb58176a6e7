use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use dog_storage::encoding::read_to_end;
use dog_storage::local::{escape_segment, unescape_segment};
use dog_storage::{
    BackendKind, ByteStream, DiskUsage, Filesystem, LocalFilesystem, Record, SearchRequest,
    SpaceProbe, StorageError,
};

/// Disk usage that tests can move up and down
#[derive(Clone, Default)]
struct SimulatedDisk {
    used_percent: Arc<AtomicU64>,
}

impl SimulatedDisk {
    fn set_used_percent(&self, used: u64) {
        self.used_percent.store(used, Ordering::SeqCst);
    }
}

impl SpaceProbe for SimulatedDisk {
    fn usage(&self, _path: &Path) -> std::io::Result<DiskUsage> {
        let used = self.used_percent.load(Ordering::SeqCst);
        Ok(DiskUsage {
            total_bytes: 1_000,
            available_bytes: 1_000 - used * 10,
        })
    }
}

struct BrokenDisk;

impl SpaceProbe for BrokenDisk {
    fn usage(&self, _path: &Path) -> std::io::Result<DiskUsage> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "statvfs denied"))
    }
}

fn body(data: &'static [u8]) -> ByteStream {
    Box::pin(futures::stream::once(async move {
        Ok::<_, std::io::Error>(Bytes::from_static(data))
    }))
}

/// Traversal segments resolve inside the root
#[tokio::test]
async fn test_traversal_stays_within_root() {
    let dir = tempfile::tempdir().unwrap();
    let fs = LocalFilesystem::new(dir.path().join("root"), 0.9).await.unwrap();

    let sneaky = Record::new("..", "..", "passwd").unwrap();
    let resolved = fs.resolve(&sneaky);
    assert!(resolved.starts_with(fs.root()));
    assert!(resolved
        .components()
        .all(|c| !matches!(c, std::path::Component::ParentDir)));

    for logical in ["../../etc/passwd", "/etc/passwd", "a/../../b", "..\\..\\win.ini", "./."] {
        let confined = fs.confine(logical);
        assert!(confined.starts_with(fs.root()), "{} escaped to {:?}", logical, confined);
        assert!(
            confined
                .components()
                .all(|c| !matches!(c, std::path::Component::ParentDir)),
            "{} kept a parent component",
            logical
        );
    }
}

/// Writing through a traversal record lands under the root
#[tokio::test]
async fn test_traversal_write_lands_under_root() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");
    let fs = LocalFilesystem::new(&root, 0.9).await.unwrap();

    let sneaky = Record::new("..", "..", "escaped.txt").unwrap();
    fs.put(&sneaky, body(b"contained")).await.unwrap();

    assert!(!dir.path().join("escaped.txt").exists());
    assert!(fs.resolve(&sneaky).is_file());
    assert_eq!(fs.path_to_record(fs.resolve(&sneaky).to_str().unwrap()), Some(sneaky));
}

/// Health follows the simulated used-storage percentage
#[tokio::test]
async fn test_capacity_gating() {
    let dir = tempfile::tempdir().unwrap();
    let disk = SimulatedDisk::default();
    let fs = LocalFilesystem::new(dir.path(), 0.8)
        .await
        .unwrap()
        .with_space_probe(disk.clone());

    disk.set_used_percent(10);
    assert!(fs.healthy());

    disk.set_used_percent(80);
    assert!(fs.healthy());

    disk.set_used_percent(81);
    assert!(!fs.healthy());

    disk.set_used_percent(100);
    assert!(!fs.healthy());

    disk.set_used_percent(50);
    assert!(fs.healthy());
}

/// Failing to read disk usage reports unhealthy instead of erroring
#[tokio::test]
async fn test_unreadable_usage_is_unhealthy() {
    let dir = tempfile::tempdir().unwrap();
    let fs = LocalFilesystem::new(dir.path(), 0.8)
        .await
        .unwrap()
        .with_space_probe(BrokenDisk);

    assert!(!fs.healthy());
    assert!(!fs.probe().await);
}

/// Thresholds outside (0, 1] are configuration errors
#[tokio::test]
async fn test_invalid_threshold_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    for threshold in [0.0, -0.5, 1.5, f64::NAN] {
        let err = LocalFilesystem::new(dir.path(), threshold).await.unwrap_err();
        assert!(matches!(err, StorageError::Configuration { .. }), "{}", threshold);
    }
}

/// Physical paths decompose into records, relative or absolute
#[tokio::test]
async fn test_path_to_record() {
    let dir = tempfile::tempdir().unwrap();
    let fs = LocalFilesystem::new(dir.path(), 0.9).await.unwrap();
    let r = Record::new("svc", "logs", "50%.txt").unwrap();

    let absolute = fs.resolve(&r);
    assert_eq!(fs.path_to_record(absolute.to_str().unwrap()), Some(r.clone()));
    assert_eq!(fs.path_to_record("svc/logs/50%25.txt"), Some(r));

    assert_eq!(fs.path_to_record("svc/logs"), None);
    assert_eq!(fs.path_to_record("svc/logs/a/b"), None);
    assert_eq!(fs.path_to_record("/definitely/not/under/root"), None);
    assert_eq!(fs.path_to_record("../outside/x"), None);
}

/// Search walks nested directories and reports logical paths
#[tokio::test]
async fn test_search_reports_unescaped_paths() {
    let dir = tempfile::tempdir().unwrap();
    let fs = LocalFilesystem::new(dir.path(), 0.9).await.unwrap();
    let r = Record::new("svc", "..", "odd:name").unwrap();
    fs.put(&r, body(b"odd")).await.unwrap();

    let hit = fs
        .search(&SearchRequest::new("svc", "odd:"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit.path, "svc/../odd:name");
    assert_eq!(hit.record(), Some(r.clone()));
    assert_eq!(fs.path_to_record(fs.resolve(&r).to_str().unwrap()), Some(r));
}

/// Directories are not records
#[tokio::test]
async fn test_directories_are_not_records() {
    let dir = tempfile::tempdir().unwrap();
    let fs = LocalFilesystem::new(dir.path(), 0.9).await.unwrap();
    std::fs::create_dir_all(dir.path().join("a").join("b").join("c")).unwrap();

    let r = Record::new("a", "b", "c").unwrap();
    assert!(!fs.exists(&r).await.unwrap());
    assert!(fs.size(&r).await.unwrap_err().is_not_found());
    assert!(matches!(fs.get(&r).await, Err(StorageError::NotFound { .. })));
    assert_eq!(fs.kind(), BackendKind::Folder);
}

/// A record whose location holds other records' directories reads as absent
#[tokio::test]
async fn test_parent_of_a_record_is_absent() {
    let dir = tempfile::tempdir().unwrap();
    let fs = LocalFilesystem::new(dir.path(), 0.9).await.unwrap();
    fs.put(&Record::new("a", "b", "c").unwrap(), body(b"leaf")).await.unwrap();

    let parent = Record::from_segments(["a", "b"]).unwrap();
    assert!(!fs.exists(&parent).await.unwrap());
    assert!(matches!(fs.get(&parent).await, Err(e) if e.is_not_found()));
    assert!(fs.size(&parent).await.unwrap_err().is_not_found());
}

/// A put whose stream fails keeps the previous content and leaves nothing behind
#[tokio::test]
async fn test_failed_put_keeps_previous_content() {
    let dir = tempfile::tempdir().unwrap();
    let fs = LocalFilesystem::new(dir.path(), 0.9).await.unwrap();
    let r = Record::new("svc", "docs", "readme").unwrap();
    fs.put(&r, body(b"original content")).await.unwrap();

    let chunks: Vec<std::io::Result<Bytes>> = vec![
        Ok(Bytes::from_static(b"par")),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away")),
    ];
    let broken: ByteStream = Box::pin(futures::stream::iter(chunks));
    assert!(fs.put(&r, broken).await.is_err());

    let content = read_to_end(fs.get(&r).await.unwrap()).await.unwrap();
    assert_eq!(content, Bytes::from_static(b"original content"));

    let files: Vec<_> = walkdir::WalkDir::new(fs.root())
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .collect();
    assert_eq!(files.len(), 1);
}

/// A failed first put leaves the record absent
#[tokio::test]
async fn test_failed_first_put_leaves_record_absent() {
    let dir = tempfile::tempdir().unwrap();
    let fs = LocalFilesystem::new(dir.path(), 0.9).await.unwrap();
    let r = Record::new("svc", "docs", "draft").unwrap();

    let chunks: Vec<std::io::Result<Bytes>> = vec![Err(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "truncated upload",
    ))];
    assert!(fs.put(&r, Box::pin(futures::stream::iter(chunks))).await.is_err());

    assert!(!fs.exists(&r).await.unwrap());
    assert!(fs
        .search(&SearchRequest::new("svc", "draft"))
        .await
        .unwrap()
        .is_none());
}

#[test]
fn test_escape_is_reversible() {
    let raw = "..\\%:";
    assert_eq!(unescape_segment(&escape_segment(raw)), raw);
    assert!(!escape_segment(raw).contains('\\'));
}
