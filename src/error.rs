//! Error types for file system operations.

use crate::core::StoreError;

/// Result type for [`VirtualFileSystem`](crate::VirtualFileSystem) operations.
pub type VfsResult<T> = std::result::Result<T, VfsError>;

/// Errors from file system operations.
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    /// The operation needs an existing path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Destination is already occupied.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Missing or malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The store refused to persist the entry at this path.
    #[error("storage capacity exceeded while writing {0}")]
    CapacityExceeded(String),

    /// File written over a directory (or the reverse) in strict mode.
    #[error("type conflict: {0}")]
    TypeConflict(String),

    #[error(transparent)]
    Storage(StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VfsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Short machine-readable name of the failure reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::CapacityExceeded(_) => "capacity_exceeded",
            Self::TypeConflict(_) => "type_conflict",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Maps a store failure for `path` into a file system error.
    pub(crate) fn from_store(err: StoreError, path: &str) -> Self {
        match err {
            StoreError::CapacityExceeded => Self::CapacityExceeded(path.to_string()),
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_maps_to_path() {
        let err = VfsError::from_store(StoreError::CapacityExceeded, "/docs/a.txt");
        match err {
            VfsError::CapacityExceeded(ref path) => assert_eq!(path, "/docs/a.txt"),
            _ => panic!("Expected CapacityExceeded"),
        }
        assert_eq!(err.reason(), "capacity_exceeded");
    }

    #[test]
    fn test_io_maps_to_storage() {
        let io = std::io::Error::other("disk gone");
        let err = VfsError::from_store(StoreError::Io(io), "/a");
        assert!(matches!(err, VfsError::Storage(StoreError::Io(_))));
        assert_eq!(err.to_string(), "storage i/o error: disk gone");
    }
}
