use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Record not found: {path}")]
    NotFound { path: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Configuration problem: {message}")]
    Configuration { message: String },

    #[error("Batch unit {index} failed: {reason}")]
    UnitFailed { index: usize, reason: String },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(path: S) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a failed batch unit error
    pub fn unit_failed<S: Into<String>>(index: usize, reason: S) -> Self {
        Self::UnitFailed {
            index,
            reason: reason.into(),
        }
    }

    /// Whether the error means the addressed object is absent
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io { source } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
