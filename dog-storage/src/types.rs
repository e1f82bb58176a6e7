use bytes::Bytes;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::{EncodingType, Record, StorageResult};

/// Stream of bytes for record content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Stream of physical keys produced by a listing
pub type KeyStream = Pin<Box<dyn Stream<Item = StorageResult<String>> + Send>>;

/// Request to find the first stored object whose key contains `name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Logical path prefix scoping the search
    pub base_search_path: String,
    /// Unanchored substring matched against candidate keys
    pub name: String,
    #[serde(default)]
    pub encoding_type: EncodingType,
}

impl SearchRequest {
    pub fn new<B: Into<String>, N: Into<String>>(base_search_path: B, name: N) -> Self {
        Self {
            base_search_path: base_search_path.into(),
            name: name.into(),
            encoding_type: EncodingType::default(),
        }
    }

    pub fn with_encoding(mut self, encoding_type: EncodingType) -> Self {
        self.encoding_type = encoding_type;
        self
    }
}

/// A search hit: the encoded content and the logical path it was found at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub data: String,
    pub path: String,
}

impl SearchResult {
    pub fn new(data: String, path: String) -> Self {
        Self { data, path }
    }

    /// The logical path as a record, when it has the conventional shape
    pub fn record(&self) -> Option<Record> {
        Record::parse(&self.path)
    }
}
