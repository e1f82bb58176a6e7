use base64::Engine;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::{ByteStream, StorageError, StorageResult};

/// How fetched bytes are turned into a string for transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EncodingType {
    /// UTF-8 text, passed through as-is
    Plain,
    /// Standard base64 alphabet with padding
    #[default]
    Base64,
}

/// Encode raw content according to `encoding`
pub fn encode(content: &[u8], encoding: EncodingType) -> StorageResult<String> {
    match encoding {
        EncodingType::Plain => String::from_utf8(content.to_vec())
            .map_err(|e| StorageError::invalid(format!("Content is not valid UTF-8: {}", e))),
        EncodingType::Base64 => Ok(base64::engine::general_purpose::STANDARD.encode(content)),
    }
}

/// Drain a byte stream into a single buffer
pub async fn read_to_end(mut stream: ByteStream) -> StorageResult<Bytes> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer.freeze())
}
