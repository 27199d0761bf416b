use thiserror::Error;

use super::fs::{FsError, FsErrorKind};
use super::paths::PathTooLong;
use crate::config::CodecError;

/// Errors returned by [`StorageManager`](super::StorageManager).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// No record at that location, or the stored record has a different
    /// layout version.
    #[error("record not found")]
    NotFound,

    /// The filesystem is full or a new profile would not fit.
    #[error("insufficient flash space")]
    NoSpace,

    /// A stored record has the wrong size or does not decode.
    #[error("corrupted record")]
    Corrupted,

    #[error("path too long")]
    PathTooLong,

    /// The manager was closed.
    #[error("storage not mounted")]
    NotMounted,

    /// Any other filesystem failure.
    #[error("filesystem error: {0}")]
    Filesystem(FsErrorKind),

    /// A record could not be encoded.
    #[error("codec error: {0}")]
    Codec(CodecError),
}

impl From<PathTooLong> for StorageError {
    fn from(_: PathTooLong) -> Self {
        StorageError::PathTooLong
    }
}

impl From<CodecError> for StorageError {
    fn from(err: CodecError) -> Self {
        StorageError::Codec(err)
    }
}

/// Map a filesystem error onto the storage error space.
pub(crate) fn fs_err<E: FsError>(err: E) -> StorageError {
    match err.kind() {
        FsErrorKind::NotFound => StorageError::NotFound,
        FsErrorKind::NoSpace => StorageError::NoSpace,
        kind => StorageError::Filesystem(kind),
    }
}
