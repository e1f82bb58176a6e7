//! Folder-backed storage for single-node deployments.
//!
//! [`LocalFilesystem`] maps every record to a file under a root directory.
//! Logical segments are escaped before they touch the disk, so no record or
//! search path can resolve outside the root. Health is gated on how full the
//! filesystem holding the root is.

use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::encoding::encode;
use crate::filesystem::{BackendKind, Filesystem};
use crate::{
    ByteStream, Record, SearchRequest, SearchResult, StorageError, StorageResult, RECORD_SEGMENTS,
};

/// Space figures for the filesystem holding a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl DiskUsage {
    /// Fraction of the filesystem in use, between 0.0 and 1.0
    pub fn used_ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        used as f64 / self.total_bytes as f64
    }
}

/// Source of disk usage figures
pub trait SpaceProbe: Send + Sync {
    fn usage(&self, path: &Path) -> io::Result<DiskUsage>;
}

/// Reads usage from the operating system
#[derive(Debug, Clone, Default)]
pub struct OsSpaceProbe;

impl SpaceProbe for OsSpaceProbe {
    fn usage(&self, path: &Path) -> io::Result<DiskUsage> {
        Ok(DiskUsage {
            total_bytes: fs2::total_space(path)?,
            available_bytes: fs2::available_space(path)?,
        })
    }
}

/// A [`Filesystem`] rooted at a local directory
#[derive(Clone)]
pub struct LocalFilesystem {
    root: PathBuf,
    max_used_ratio: f64,
    space: Arc<dyn SpaceProbe>,
}

impl std::fmt::Debug for LocalFilesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFilesystem")
            .field("root", &self.root)
            .field("max_used_ratio", &self.max_used_ratio)
            .finish()
    }
}

impl LocalFilesystem {
    /// Open (creating if needed) a folder filesystem at `root`.
    ///
    /// `max_used_ratio` is the fraction of the disk, in `(0.0, 1.0]`, above
    /// which the backend reports itself unhealthy.
    pub async fn new(root: impl Into<PathBuf>, max_used_ratio: f64) -> StorageResult<Self> {
        if !(max_used_ratio > 0.0 && max_used_ratio <= 1.0) {
            return Err(StorageError::configuration(format!(
                "maxUsedStoragePercentage must be within (0, 1], got {}",
                max_used_ratio
            )));
        }

        let root = root.into();
        fs::create_dir_all(&root).await?;
        let root = fs::canonicalize(&root).await?;

        debug!(root = %root.display(), max_used_ratio, "LocalFilesystem initialised");

        Ok(Self {
            root,
            max_used_ratio,
            space: Arc::new(OsSpaceProbe),
        })
    }

    /// Replace the source of disk usage figures
    pub fn with_space_probe<P: SpaceProbe + 'static>(mut self, probe: P) -> Self {
        self.space = Arc::new(probe);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_used_ratio(&self) -> f64 {
        self.max_used_ratio
    }

    /// Physical location of a record
    pub fn resolve(&self, record: &Record) -> PathBuf {
        let mut path = self.root.clone();
        for segment in record.segments() {
            path.push(escape_segment(segment));
        }
        path
    }

    /// Physical location of an arbitrary logical path, confined to the root
    pub fn confine(&self, logical: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in logical.split('/').filter(|s| !s.is_empty()) {
            path.push(escape_segment(segment));
        }
        path
    }

    /// Logical path of a physical file under the root
    fn logical_path(&self, physical: &Path) -> Option<String> {
        let relative = physical.strip_prefix(&self.root).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => segments.push(unescape_segment(part.to_str()?)),
                _ => return None,
            }
        }
        Some(segments.join("/"))
    }

    fn used_ratio(&self) -> io::Result<f64> {
        Ok(self.space.usage(&self.root)?.used_ratio())
    }
}

#[async_trait]
impl Filesystem for LocalFilesystem {
    #[instrument(skip(self, content), fields(record = %record))]
    async fn put(&self, record: &Record, mut content: ByteStream) -> StorageResult<()> {
        let path = self.resolve(record);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Readers see the old content or the new one, never a partial write
        let partial = partial_path(&path);
        let written = match write_stream(&partial, &mut content).await {
            Ok(written) => written,
            Err(e) => {
                discard(&partial).await;
                warn!(path = %path.display(), "put failed, previous content kept: {}", e);
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&partial, &path).await {
            discard(&partial).await;
            return Err(e.into());
        }

        debug!(bytes = written, path = %path.display(), "stored record");
        Ok(())
    }

    #[instrument(skip(self), fields(record = %record))]
    async fn get(&self, record: &Record) -> StorageResult<ByteStream> {
        let path = self.resolve(record);
        let meta = fs::metadata(&path).await.map_err(|e| not_found_or(e, record))?;
        if !meta.is_file() {
            return Err(StorageError::not_found(record.path()));
        }
        let file = fs::File::open(&path).await.map_err(|e| not_found_or(e, record))?;
        Ok(Box::pin(ReaderStream::new(file)))
    }

    #[instrument(skip(self), fields(record = %record))]
    async fn delete(&self, record: &Record) -> StorageResult<()> {
        let path = self.resolve(record);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("delete {}: already absent", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, record: &Record) -> StorageResult<bool> {
        match fs::metadata(self.resolve(record)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn size(&self, record: &Record) -> StorageResult<u64> {
        let meta = fs::metadata(self.resolve(record))
            .await
            .map_err(|e| not_found_or(e, record))?;
        if !meta.is_file() {
            return Err(StorageError::not_found(record.path()));
        }
        Ok(meta.len())
    }

    #[instrument(skip(self), fields(base = %request.base_search_path, name = %request.name))]
    async fn search(&self, request: &SearchRequest) -> StorageResult<Option<SearchResult>> {
        let start = self.confine(&request.base_search_path);
        if fs::metadata(&start).await.is_err() {
            debug!("search base {} does not exist", start.display());
            return Ok(None);
        }

        let this = self.clone();
        let needle = request.name.clone();
        let hit = tokio::task::spawn_blocking(move || this.find_first(&start, &needle))
            .await
            .map_err(|e| StorageError::backend(io::Error::other(e)))??;

        let Some((physical, logical)) = hit else {
            return Ok(None);
        };

        let content = fs::read(&physical).await?;
        let data = encode(&content, request.encoding_type)?;
        debug!(path = %logical, "search matched");
        Ok(Some(SearchResult::new(data, logical)))
    }

    fn healthy(&self) -> bool {
        match self.used_ratio() {
            Ok(used) if used > self.max_used_ratio => {
                warn!(
                    used_ratio = used,
                    max_used_ratio = self.max_used_ratio,
                    "storage usage above threshold"
                );
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!("unable to read disk usage for {}: {}", self.root.display(), e);
                false
            }
        }
    }

    fn path_to_record(&self, path: &str) -> Option<Record> {
        let path = Path::new(path.trim());
        let physical = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let logical = self.logical_path(&physical)?;
        let segments: Vec<&str> = logical.split('/').collect();
        if segments.len() != RECORD_SEGMENTS {
            return None;
        }
        Record::from_segments(segments).ok()
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Folder
    }
}

impl LocalFilesystem {
    /// Walk `start` and return the first file whose logical path contains `needle`
    fn find_first(&self, start: &Path, needle: &str) -> io::Result<Option<(PathBuf, String)>> {
        for entry in WalkDir::new(start) {
            let entry = entry?;
            if !entry.file_type().is_file() || is_partial(entry.file_name()) {
                continue;
            }
            if let Some(logical) = self.logical_path(entry.path()) {
                if logical.contains(needle) {
                    return Ok(Some((entry.into_path(), logical)));
                }
            }
        }
        Ok(None)
    }
}

/// Marker of in-flight writes. Stored names never contain it since `%` is
/// always escaped.
const PARTIAL_MARKER: &str = ".%partial-";

fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}{}", name, PARTIAL_MARKER, Uuid::new_v4()))
}

fn is_partial(name: &OsStr) -> bool {
    name.to_str().is_some_and(|n| n.contains(PARTIAL_MARKER))
}

async fn write_stream(path: &Path, content: &mut ByteStream) -> StorageResult<u64> {
    let mut file = fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = content.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

async fn discard(partial: &Path) {
    if let Err(e) = fs::remove_file(partial).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %partial.display(), "unable to remove partial write: {}", e);
        }
    }
}

fn not_found_or(error: io::Error, record: &Record) -> StorageError {
    if error.kind() == io::ErrorKind::NotFound {
        StorageError::not_found(record.path())
    } else {
        error.into()
    }
}

/// Neutralise a logical segment so it maps to exactly one normal path component
pub fn escape_segment(segment: &str) -> String {
    match segment {
        "." => return "%2E".to_string(),
        ".." => return "%2E%2E".to_string(),
        _ => {}
    }

    let mut escaped = String::with_capacity(segment.len());
    for ch in segment.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            '/' => escaped.push_str("%2F"),
            '\\' => escaped.push_str("%5C"),
            ':' => escaped.push_str("%3A"),
            '\0' => escaped.push_str("%00"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Inverse of [`escape_segment`]
pub fn unescape_segment(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_segments_are_neutralised() {
        assert_eq!(escape_segment(".."), "%2E%2E");
        assert_eq!(escape_segment("."), "%2E");
        assert_eq!(escape_segment("a\\b"), "a%5Cb");
        assert_eq!(escape_segment("c:"), "c%3A");
    }

    #[test]
    fn escape_round_trips() {
        for raw in ["..", ".", "50%", "a\\b", "plain-name", "x/y", "..hidden"] {
            assert_eq!(unescape_segment(&escape_segment(raw)), raw);
        }
    }

    #[test]
    fn used_ratio_handles_empty_disks() {
        let usage = DiskUsage {
            total_bytes: 0,
            available_bytes: 0,
        };
        assert_eq!(usage.used_ratio(), 1.0);

        let usage = DiskUsage {
            total_bytes: 200,
            available_bytes: 50,
        };
        assert!((usage.used_ratio() - 0.75).abs() < f64::EPSILON);
    }
}
