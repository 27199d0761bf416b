//! Fixed-capacity RAM filesystem.
//!
//! Used by host tests and simulation. Besides plain storage it can inject a
//! one-shot failure into any operation, or cut "power" right after an
//! operation completes so that recovery on the next mount can be exercised.

use heapless::Vec;

use super::fs::{FileSystem, FsError, FsErrorKind};
use super::paths::{file_name, parent, PathBuf};

/// Largest file a [`MemFs`] can hold.
pub const MEM_FILE_SIZE: usize = 512;

/// Volume size reported by [`MemFs::new`].
pub const DEFAULT_CAPACITY: u64 = 256 * 1024;

/// Filesystem operations that faults can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FsOp {
    Mount,
    Format,
    Unmount,
    CreateDir,
    Create,
    Open,
    Read,
    Write,
    Sync,
    Close,
    Remove,
    Rename,
    ReadDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MemFsError(pub FsErrorKind);

impl FsError for MemFsError {
    fn kind(&self) -> FsErrorKind {
        self.0
    }
}

impl core::fmt::Display for MemFsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "memfs: {}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Fail(FsOp, FsErrorKind),
    PowerCutAfter(FsOp),
}

#[derive(Debug, Clone)]
struct Entry {
    path: PathBuf,
    dir: bool,
    data: Vec<u8, MEM_FILE_SIZE>,
}

/// Handle to an open [`MemFs`] file.
///
/// Writes are buffered in the handle and only reach the volume on
/// [`sync`](FileSystem::sync) or [`close`](FileSystem::close).
#[derive(Debug)]
pub struct MemFile {
    path: PathBuf,
    data: Vec<u8, MEM_FILE_SIZE>,
    pos: usize,
    writable: bool,
}

/// RAM filesystem holding at most `N` files and directories.
#[derive(Debug)]
pub struct MemFs<const N: usize> {
    entries: Vec<Entry, N>,
    capacity: u64,
    formatted: bool,
    mounted: bool,
    powered: bool,
    fault: Option<Fault>,
}

impl<const N: usize> Default for MemFs<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MemFs<N> {
    /// An empty, formatted volume of [`DEFAULT_CAPACITY`] bytes.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// An empty, formatted volume reporting `capacity` bytes.
    #[must_use]
    pub const fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            formatted: true,
            mounted: false,
            powered: true,
            fault: None,
        }
    }

    /// A volume that fails to mount until formatted.
    #[must_use]
    pub const fn unformatted() -> Self {
        let mut fs = Self::new();
        fs.formatted = false;
        fs
    }

    /// Make the next call of `op` fail with `kind`.
    pub fn fail_next(&mut self, op: FsOp, kind: FsErrorKind) {
        self.fault = Some(Fault::Fail(op, kind));
    }

    /// Lose power as soon as the next call of `op` succeeds. Every later
    /// operation fails until [`power_cycle`](Self::power_cycle).
    pub fn power_cut_after(&mut self, op: FsOp) {
        self.fault = Some(Fault::PowerCutAfter(op));
    }

    /// Restore power. The volume keeps whatever was synced and must be
    /// mounted again.
    pub fn power_cycle(&mut self) {
        self.powered = true;
        self.mounted = false;
        self.fault = None;
    }

    #[must_use]
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Check whether a file or directory exists at `path`.
    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.find(path).is_some()
    }

    /// Stored contents of the file at `path`.
    #[must_use]
    pub fn contents(&self, path: &str) -> Option<&[u8]> {
        self.find(path)
            .map(|i| &self.entries[i])
            .filter(|e| !e.dir)
            .map(|e| &e.data[..])
    }

    /// Number of files (not directories) on the volume.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.dir).count()
    }

    fn find(&self, path: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.path.as_str() == path)
    }

    fn find_file(&self, path: &str) -> Result<usize, MemFsError> {
        match self.find(path) {
            Some(i) if !self.entries[i].dir => Ok(i),
            Some(_) => Err(MemFsError(FsErrorKind::Other)),
            None => Err(MemFsError(FsErrorKind::NotFound)),
        }
    }

    fn dir_exists(&self, path: &str) -> bool {
        path == "/" || self.find(path).is_some_and(|i| self.entries[i].dir)
    }

    fn check_parent(&self, path: &str) -> Result<(), MemFsError> {
        if self.dir_exists(parent(path)) {
            Ok(())
        } else {
            Err(MemFsError(FsErrorKind::NotFound))
        }
    }

    fn used_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.data.len() as u64).sum()
    }

    fn make_path(path: &str) -> Result<PathBuf, MemFsError> {
        let mut buf = PathBuf::new();
        buf.push_str(path)
            .map_err(|_| MemFsError(FsErrorKind::Other))?;
        Ok(buf)
    }

    fn insert(&mut self, entry: Entry) -> Result<(), MemFsError> {
        self.entries
            .push(entry)
            .map_err(|_| MemFsError(FsErrorKind::NoSpace))
    }

    /// Run `f` as operation `op`, applying power state, mount state and
    /// pending faults.
    fn run<T>(
        &mut self,
        op: FsOp,
        f: impl FnOnce(&mut Self) -> Result<T, MemFsError>,
    ) -> Result<T, MemFsError> {
        if !self.powered {
            return Err(MemFsError(FsErrorKind::Other));
        }
        if let Some(Fault::Fail(target, kind)) = self.fault {
            if target == op {
                self.fault = None;
                return Err(MemFsError(kind));
            }
        }
        if !self.mounted && !matches!(op, FsOp::Mount | FsOp::Format) {
            return Err(MemFsError(FsErrorKind::Other));
        }

        let result = f(self);

        if let (Ok(_), Some(Fault::PowerCutAfter(target))) = (&result, self.fault) {
            if target == op {
                self.fault = None;
                self.powered = false;
            }
        }
        result
    }
}

impl<const N: usize> FileSystem for MemFs<N> {
    type File = MemFile;
    type Error = MemFsError;

    fn mount(&mut self) -> Result<(), Self::Error> {
        self.run(FsOp::Mount, |fs| {
            if !fs.formatted {
                return Err(MemFsError(FsErrorKind::Corrupt));
            }
            fs.mounted = true;
            Ok(())
        })
    }

    fn format(&mut self) -> Result<(), Self::Error> {
        self.run(FsOp::Format, |fs| {
            fs.entries.clear();
            fs.formatted = true;
            fs.mounted = false;
            Ok(())
        })
    }

    fn unmount(&mut self) -> Result<(), Self::Error> {
        self.run(FsOp::Unmount, |fs| {
            fs.mounted = false;
            Ok(())
        })
    }

    fn create_dir(&mut self, path: &str) -> Result<(), Self::Error> {
        self.run(FsOp::CreateDir, |fs| {
            if fs.exists(path) || path == "/" {
                return Err(MemFsError(FsErrorKind::AlreadyExists));
            }
            fs.check_parent(path)?;
            let path = Self::make_path(path)?;
            fs.insert(Entry {
                path,
                dir: true,
                data: Vec::new(),
            })
        })
    }

    fn create(&mut self, path: &str) -> Result<Self::File, Self::Error> {
        self.run(FsOp::Create, |fs| {
            fs.check_parent(path)?;
            let owned = Self::make_path(path)?;
            match fs.find(path) {
                Some(i) if fs.entries[i].dir => return Err(MemFsError(FsErrorKind::Other)),
                Some(i) => fs.entries[i].data.clear(),
                None => fs.insert(Entry {
                    path: owned.clone(),
                    dir: false,
                    data: Vec::new(),
                })?,
            }
            Ok(MemFile {
                path: owned,
                data: Vec::new(),
                pos: 0,
                writable: true,
            })
        })
    }

    fn open(&mut self, path: &str) -> Result<Self::File, Self::Error> {
        self.run(FsOp::Open, |fs| {
            let i = fs.find_file(path)?;
            Ok(MemFile {
                path: fs.entries[i].path.clone(),
                data: fs.entries[i].data.clone(),
                pos: 0,
                writable: false,
            })
        })
    }

    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.run(FsOp::Read, |_| {
            let remaining = &file.data[file.pos..];
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            file.pos += n;
            Ok(n)
        })
    }

    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<usize, Self::Error> {
        self.run(FsOp::Write, |fs| {
            if !file.writable {
                return Err(MemFsError(FsErrorKind::Other));
            }
            if fs.used_bytes() + (file.data.len() + data.len()) as u64 > fs.capacity {
                return Err(MemFsError(FsErrorKind::NoSpace));
            }
            file.data
                .extend_from_slice(data)
                .map_err(|_| MemFsError(FsErrorKind::NoSpace))?;
            Ok(data.len())
        })
    }

    fn sync(&mut self, file: &mut Self::File) -> Result<(), Self::Error> {
        self.run(FsOp::Sync, |fs| {
            if !file.writable {
                return Ok(());
            }
            let i = fs.find_file(&file.path)?;
            fs.entries[i].data = file.data.clone();
            Ok(())
        })
    }

    fn close(&mut self, mut file: Self::File) -> Result<(), Self::Error> {
        self.run(FsOp::Close, |fs| {
            if file.writable {
                let i = fs.find_file(&file.path)?;
                fs.entries[i].data = core::mem::take(&mut file.data);
            }
            Ok(())
        })
    }

    fn remove(&mut self, path: &str) -> Result<(), Self::Error> {
        self.run(FsOp::Remove, |fs| {
            let i = fs.find(path).ok_or(MemFsError(FsErrorKind::NotFound))?;
            if fs.entries[i].dir && fs.entries.iter().any(|e| parent(&e.path) == path) {
                return Err(MemFsError(FsErrorKind::Other));
            }
            fs.entries.remove(i);
            Ok(())
        })
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), Self::Error> {
        self.run(FsOp::Rename, |fs| {
            let i = fs.find_file(from)?;
            if fs.exists(to) {
                return Err(MemFsError(FsErrorKind::AlreadyExists));
            }
            fs.check_parent(to)?;
            fs.entries[i].path = Self::make_path(to)?;
            Ok(())
        })
    }

    fn read_dir(&mut self, path: &str, visit: &mut dyn FnMut(&str)) -> Result<(), Self::Error> {
        self.run(FsOp::ReadDir, |fs| {
            if !fs.dir_exists(path) {
                return Err(MemFsError(FsErrorKind::NotFound));
            }
            for entry in fs.entries.iter().filter(|e| parent(&e.path) == path) {
                visit(file_name(&entry.path));
            }
            Ok(())
        })
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}
