use serde::{Deserialize, Serialize};

use crate::{StorageError, StorageResult};

/// Separator between logical path segments
pub const SEPARATOR: char = '/';

/// Number of segments a record path decomposes into (domain/application/name)
pub const RECORD_SEGMENTS: usize = 3;

/// Logical address of one stored blob.
///
/// A record is a list of path segments. No segment is empty and no segment
/// contains [`SEPARATOR`], so `path()` can always be split back into the same
/// segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Record {
    segments: Vec<String>,
}

impl Record {
    /// Create a record from the conventional domain/application/name triple
    pub fn new<D, A, N>(domain: D, application: A, name: N) -> StorageResult<Self>
    where
        D: Into<String>,
        A: Into<String>,
        N: Into<String>,
    {
        Self::from_segments([domain.into(), application.into(), name.into()])
    }

    /// Create a record from arbitrary segments
    pub fn from_segments<I, S>(segments: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();

        if segments.is_empty() {
            return Err(StorageError::invalid("Record must have at least one segment"));
        }

        for segment in &segments {
            if segment.is_empty() {
                return Err(StorageError::invalid("Record segments must not be empty"));
            }
            if segment.contains(SEPARATOR) {
                return Err(StorageError::invalid(format!(
                    "Record segment '{}' contains the separator '{}'",
                    segment, SEPARATOR
                )));
            }
        }

        Ok(Self { segments })
    }

    /// Parse a logical path of exactly [`RECORD_SEGMENTS`] segments
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.trim().split(SEPARATOR).collect();
        if segments.len() != RECORD_SEGMENTS {
            return None;
        }
        Self::from_segments(segments).ok()
    }

    /// Segments in order, never empty
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// First segment of the path
    pub fn domain(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or_default()
    }

    /// Second segment, absent on single-segment records
    pub fn application(&self) -> Option<&str> {
        self.segments.get(1).map(String::as_str)
    }

    /// Last segment of the path
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Logical path, segments joined by [`SEPARATOR`]
    pub fn path(&self) -> String {
        self.segments.join("/")
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

impl TryFrom<String> for Record {
    type Error = StorageError;

    fn try_from(path: String) -> Result<Self, Self::Error> {
        Self::from_segments(path.split(SEPARATOR))
    }
}

impl From<Record> for String {
    fn from(record: Record) -> Self {
        record.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_joins_segments() {
        let record = Record::new("acme", "billing", "invoice-17").unwrap();
        assert_eq!(record.path(), "acme/billing/invoice-17");
        assert_eq!(record.domain(), "acme");
        assert_eq!(record.application(), Some("billing"));
        assert_eq!(record.name(), "invoice-17");

        let solo = Record::from_segments(["solo"]).unwrap();
        assert_eq!(solo.domain(), "solo");
        assert_eq!(solo.application(), None);
        assert_eq!(solo.name(), "solo");
    }

    #[test]
    fn segments_with_separator_are_rejected() {
        let err = Record::new("acme", "bill/ing", "x").unwrap_err();
        assert!(matches!(err, StorageError::Invalid { .. }));
        assert!(Record::new("", "b", "c").is_err());
    }

    #[test]
    fn parse_requires_three_segments() {
        assert_eq!(
            Record::parse("a/b/c"),
            Some(Record::new("a", "b", "c").unwrap())
        );
        assert_eq!(Record::parse("a/b"), None);
        assert_eq!(Record::parse("a/b/c/d"), None);
        assert_eq!(Record::parse("a//c"), None);
    }

    #[test]
    fn serde_uses_the_logical_path() {
        let record = Record::new("a", "b", "c").unwrap();
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, "\"a/b/c\"");

        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);

        assert!(serde_json::from_str::<Record>("\"a//c\"").is_err());
    }
}
