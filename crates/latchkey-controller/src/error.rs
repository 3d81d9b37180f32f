use latchkey_storage::StorageError;
use thiserror::Error;

/// Errors that stop the door runtime.
///
/// Hardware and remote failures never appear here: they are absorbed by the
/// component that hit them and surfaced through the status snapshot instead.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The local access log or fallback file could not be written.
    #[error("Local storage fault: {0}")]
    LocalStorage(#[from] StorageError),

    /// A local storage fault was signalled by a component that could not
    /// return it directly.
    #[error("Local storage fault reported: {0}")]
    LocalStorageReported(String),

    /// Configuration rejected at startup.
    #[error("Configuration error: {0}")]
    Config(#[from] latchkey_core::Error),

    /// The runtime was built without a required component.
    #[error("Missing component: {0}")]
    MissingComponent(&'static str),

    /// A supervised task panicked.
    #[error("Task {task} panicked")]
    TaskPanicked { task: String },
}

impl ControllerError {
    /// Whether the error came from local durable storage.
    pub fn is_local_storage(&self) -> bool {
        matches!(
            self,
            Self::LocalStorage(_) | Self::LocalStorageReported(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
