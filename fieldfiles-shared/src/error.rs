use std::fmt;

/// Errors raised by a blob storage backend.
#[derive(Debug)]
pub enum StorageError {
    /// The requested blob was not found.
    NotFound(String),
    /// An I/O error occurred.
    Io(std::io::Error),
    /// The logical path escapes the storage root or is otherwise unusable.
    InvalidPath(String),
    /// The remote backend rejected the request.
    Backend(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "blob not found: {path}"),
            Self::Io(err) => write!(f, "storage IO error: {err}"),
            Self::InvalidPath(path) => write!(f, "invalid storage path: {path}"),
            Self::Backend(msg) => write!(f, "storage backend error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::Io(err),
        }
    }
}

#[derive(Debug)]
pub enum AttachmentError {
    /// No entity matches the id or name
    NotFound(String),
    /// The relational store failed, nothing after the failing step ran
    Store(sea_orm::DbErr),
    /// A blob backend failed
    Storage(StorageError),
    Processor(String),
    /// Bad input, rejected before anything was persisted
    Validation(String),
    Configuration(String),
}

impl fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Store(err) => write!(f, "store error: {err}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Processor(msg) => write!(f, "image processing failed: {msg}"),
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for AttachmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sea_orm::DbErr> for AttachmentError {
    fn from(err: sea_orm::DbErr) -> Self {
        AttachmentError::Store(err)
    }
}

impl From<StorageError> for AttachmentError {
    fn from(err: StorageError) -> Self {
        AttachmentError::Storage(err)
    }
}

impl From<std::io::Error> for AttachmentError {
    fn from(err: std::io::Error) -> Self {
        AttachmentError::Storage(StorageError::from(err))
    }
}
