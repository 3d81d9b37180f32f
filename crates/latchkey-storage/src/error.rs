use std::path::PathBuf;
use thiserror::Error;

/// Storage-specific error types for the door controller.
///
/// Failures of the local access log and the fallback file are fatal to the
/// runtime; failures of the aggregate store are absorbed by the caller.
#[derive(Debug, Error)]
pub enum StorageError {
    /// File system operation failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Event could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Stored data did not have the expected shape
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Store refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
