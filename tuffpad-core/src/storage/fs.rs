//! Filesystem port consumed by [`StorageManager`](super::StorageManager).

/// Broad classes of filesystem failure the storage layer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FsErrorKind {
    NotFound,
    AlreadyExists,
    NoSpace,
    /// On-media structures are unreadable or the volume is not formatted.
    Corrupt,
    Other,
}

impl core::fmt::Display for FsErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::NoSpace => write!(f, "no space left"),
            Self::Corrupt => write!(f, "corrupt filesystem"),
            Self::Other => write!(f, "filesystem error"),
        }
    }
}

/// Error type of a [`FileSystem`] implementation.
pub trait FsError: core::fmt::Debug {
    /// Classify this error.
    fn kind(&self) -> FsErrorKind;
}

/// A small blocking, path-based filesystem.
///
/// Paths are absolute and `/`-separated. Implementations need not support
/// nested directories beyond what the storage layout uses.
pub trait FileSystem {
    /// Open file handle.
    type File;
    /// Error type returned by every operation.
    type Error: FsError;

    /// Mount an existing volume. Fails with [`FsErrorKind::Corrupt`] when the
    /// media holds no valid volume.
    fn mount(&mut self) -> Result<(), Self::Error>;

    /// Erase the media and lay down an empty volume.
    fn format(&mut self) -> Result<(), Self::Error>;

    fn unmount(&mut self) -> Result<(), Self::Error>;

    /// Create a directory. Fails with [`FsErrorKind::AlreadyExists`] if it
    /// is already there.
    fn create_dir(&mut self, path: &str) -> Result<(), Self::Error>;

    /// Create or truncate a file and open it for writing.
    fn create(&mut self, path: &str) -> Result<Self::File, Self::Error>;

    /// Open an existing file for reading.
    fn open(&mut self, path: &str) -> Result<Self::File, Self::Error>;

    /// Read from the current position. Returns 0 at end of file.
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Append to a file opened with [`create`](Self::create).
    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<usize, Self::Error>;

    /// Make everything written so far durable.
    fn sync(&mut self, file: &mut Self::File) -> Result<(), Self::Error>;

    /// Sync and release the handle.
    fn close(&mut self, file: Self::File) -> Result<(), Self::Error>;

    /// Remove a file or an empty directory.
    fn remove(&mut self, path: &str) -> Result<(), Self::Error>;

    /// Rename a file. Fails with [`FsErrorKind::AlreadyExists`] if `to`
    /// exists; callers remove the target first.
    fn rename(&mut self, from: &str, to: &str) -> Result<(), Self::Error>;

    /// Call `visit` with the name (not the full path) of every direct child
    /// of the directory `path`.
    fn read_dir(&mut self, path: &str, visit: &mut dyn FnMut(&str)) -> Result<(), Self::Error>;

    /// Total size of the volume in bytes.
    fn capacity(&self) -> u64;
}
