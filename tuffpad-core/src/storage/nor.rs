//! Flat sector-per-file filesystem over a NOR flash partition.
//!
//! Sector 0 holds the volume marker. Every other sector is either free or
//! holds exactly one file:
//!
//! ```text
//! [0..4]   file magic, programmed last
//! [4..8]   rename commit word (all 0xFF until renamed, then all 0x00)
//! [8..10]  data length LE
//! [10]     name length
//! [11]     reserved
//! [12..52] name
//! [52]     renamed-to name length
//! [56..96] renamed-to name
//! [96..]   data
//! ```
//!
//! A file becomes visible only once its magic is programmed after its data,
//! so an interrupted write leaves a free sector. Rename programs the new name
//! and then the commit word; until the commit lands the old name is still
//! in effect. Directories are implicit in the paths.

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
use heapless::Vec;

use super::fs::{FileSystem, FsError, FsErrorKind};
use super::paths::{file_name, parent, PathBuf};

/// Largest file a [`NorFlashFs`] stores.
pub const NOR_FILE_SIZE: usize = 512;

/// Longest path stored in a sector header.
pub const NOR_NAME_SIZE: usize = 40;

/// Files that may be open for writing at once.
const MAX_OPEN_WRITES: usize = 4;

const VOLUME_MAGIC: [u8; 4] = *b"TPV1";
const FILE_MAGIC: [u8; 4] = *b"TPF1";

const MAGIC_OFFSET: usize = 0;
const COMMIT_OFFSET: usize = 4;
const META_OFFSET: usize = 8;
const NAME_OFFSET: usize = 12;
const ALT_OFFSET: usize = 52;
const ALT_NAME_OFFSET: usize = 56;
const DATA_OFFSET: usize = 96;

/// All writes are done in 4-byte words.
const WORD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NorFsError<E> {
    /// The underlying flash failed.
    Flash(E),
    NotFound,
    AlreadyExists,
    NoSpace,
    /// No volume marker; the partition needs formatting.
    NoVolume,
    /// Path longer than [`NOR_NAME_SIZE`] or file larger than
    /// [`NOR_FILE_SIZE`].
    TooLarge,
    /// Flash geometry this layout cannot use.
    Geometry,
    NotMounted,
    /// Operation the flat layout does not support.
    Unsupported,
}

impl<E: core::fmt::Debug> FsError for NorFsError<E> {
    fn kind(&self) -> FsErrorKind {
        match self {
            Self::NotFound => FsErrorKind::NotFound,
            Self::AlreadyExists => FsErrorKind::AlreadyExists,
            Self::NoSpace | Self::TooLarge => FsErrorKind::NoSpace,
            Self::NoVolume => FsErrorKind::Corrupt,
            Self::Flash(_) | Self::Geometry | Self::NotMounted | Self::Unsupported => {
                FsErrorKind::Other
            }
        }
    }
}

/// Handle to an open [`NorFlashFs`] file.
#[derive(Debug)]
pub struct NorFile {
    sector: u32,
    path: PathBuf,
    data: Vec<u8, NOR_FILE_SIZE>,
    pos: usize,
    writable: bool,
    /// Length programmed by the last sync.
    synced: Option<usize>,
}

struct Header {
    len: usize,
    renamed: bool,
    path: PathBuf,
}

/// Sector-per-file filesystem on a NOR flash partition.
///
/// `flash` must cover exactly the partition; offset 0 is its first sector.
pub struct NorFlashFs<F: NorFlash> {
    flash: F,
    sectors: u32,
    mounted: bool,
    open_writes: Vec<u32, MAX_OPEN_WRITES>,
}

impl<F: NorFlash> NorFlashFs<F> {
    /// Wrap a partition. Fails if sectors are too small for a header plus
    /// [`NOR_FILE_SIZE`] bytes, if the flash cannot be written in 4-byte
    /// words, or if there is no room for at least one file.
    pub fn new(flash: F) -> Result<Self, NorFsError<F::Error>> {
        let sectors = flash.capacity() / F::ERASE_SIZE;
        if F::ERASE_SIZE < DATA_OFFSET + NOR_FILE_SIZE
            || WORD % F::WRITE_SIZE != 0
            || WORD % F::READ_SIZE != 0
            || sectors < 2
        {
            return Err(NorFsError::Geometry);
        }
        Ok(Self {
            flash,
            sectors: sectors as u32,
            mounted: false,
            open_writes: Vec::new(),
        })
    }

    /// Release the flash.
    pub fn into_inner(self) -> F {
        self.flash
    }

    /// Get a mutable reference to the flash.
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    fn base(sector: u32) -> u32 {
        sector * F::ERASE_SIZE as u32
    }

    fn read_raw(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), NorFsError<F::Error>> {
        self.flash.read(offset, buf).map_err(NorFsError::Flash)
    }

    fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), NorFsError<F::Error>> {
        self.flash.write(offset, data).map_err(NorFsError::Flash)
    }

    fn erase(&mut self, sector: u32) -> Result<(), NorFsError<F::Error>> {
        let from = Self::base(sector);
        self.flash
            .erase(from, from + F::ERASE_SIZE as u32)
            .map_err(NorFsError::Flash)
    }

    fn check_mounted(&self) -> Result<(), NorFsError<F::Error>> {
        if self.mounted {
            Ok(())
        } else {
            Err(NorFsError::NotMounted)
        }
    }

    /// Parse the header of `sector`. `None` for free or torn sectors.
    fn header(&mut self, sector: u32) -> Result<Option<Header>, NorFsError<F::Error>> {
        let mut raw = [0u8; DATA_OFFSET];
        self.read_raw(Self::base(sector), &mut raw)?;
        if raw[MAGIC_OFFSET..MAGIC_OFFSET + WORD] != FILE_MAGIC {
            return Ok(None);
        }

        let renamed = raw[COMMIT_OFFSET..COMMIT_OFFSET + WORD] == [0; WORD];
        let (len_at, name_at) = if renamed {
            (ALT_OFFSET, ALT_NAME_OFFSET)
        } else {
            (META_OFFSET + 2, NAME_OFFSET)
        };
        let name_len = usize::from(raw[len_at]);
        if name_len > NOR_NAME_SIZE {
            return Ok(None);
        }
        let Ok(name) = core::str::from_utf8(&raw[name_at..name_at + name_len]) else {
            return Ok(None);
        };
        let mut path = PathBuf::new();
        if path.push_str(name).is_err() {
            return Ok(None);
        }

        let len = usize::from(u16::from_le_bytes([raw[META_OFFSET], raw[META_OFFSET + 1]]));
        if len > NOR_FILE_SIZE {
            return Ok(None);
        }
        Ok(Some(Header { len, renamed, path }))
    }

    fn find(&mut self, path: &str) -> Result<Option<(u32, Header)>, NorFsError<F::Error>> {
        for sector in 1..self.sectors {
            if let Some(header) = self.header(sector)? {
                if header.path.as_str() == path {
                    return Ok(Some((sector, header)));
                }
            }
        }
        Ok(None)
    }

    fn find_free(&mut self) -> Result<u32, NorFsError<F::Error>> {
        for sector in 1..self.sectors {
            if self.open_writes.contains(&sector) {
                continue;
            }
            if self.header(sector)?.is_none() {
                return Ok(sector);
            }
        }
        Err(NorFsError::NoSpace)
    }

    /// Erase `file.sector` and program header, data and magic.
    fn commit(&mut self, file: &NorFile) -> Result<(), NorFsError<F::Error>> {
        let base = Self::base(file.sector);
        self.erase(file.sector)?;

        let mut meta = [0xFFu8; ALT_OFFSET - META_OFFSET];
        meta[0..2].copy_from_slice(&(file.data.len() as u16).to_le_bytes());
        meta[2] = file.path.len() as u8;
        let name_at = NAME_OFFSET - META_OFFSET;
        meta[name_at..name_at + file.path.len()].copy_from_slice(file.path.as_bytes());
        self.program(base + META_OFFSET as u32, &meta)?;

        let aligned = file.data.len() - file.data.len() % WORD;
        if aligned > 0 {
            self.program(base + DATA_OFFSET as u32, &file.data[..aligned])?;
        }
        let tail = &file.data[aligned..];
        if !tail.is_empty() {
            let mut word = [0xFFu8; WORD];
            word[..tail.len()].copy_from_slice(tail);
            self.program(base + (DATA_OFFSET + aligned) as u32, &word)?;
        }

        self.program(base + MAGIC_OFFSET as u32, &FILE_MAGIC)
    }

    fn release(&mut self, sector: u32) {
        self.open_writes.retain(|&s| s != sector);
    }
}

impl<F: NorFlash> FileSystem for NorFlashFs<F> {
    type File = NorFile;
    type Error = NorFsError<F::Error>;

    fn mount(&mut self) -> Result<(), Self::Error> {
        let mut marker = [0u8; WORD];
        self.read_raw(0, &mut marker)?;
        if marker != VOLUME_MAGIC {
            return Err(NorFsError::NoVolume);
        }
        self.mounted = true;
        Ok(())
    }

    fn format(&mut self) -> Result<(), Self::Error> {
        self.mounted = false;
        self.open_writes.clear();
        for sector in 0..self.sectors {
            self.erase(sector)?;
        }
        self.program(0, &VOLUME_MAGIC)
    }

    fn unmount(&mut self) -> Result<(), Self::Error> {
        self.mounted = false;
        self.open_writes.clear();
        Ok(())
    }

    fn create_dir(&mut self, _path: &str) -> Result<(), Self::Error> {
        self.check_mounted()
    }

    fn create(&mut self, path: &str) -> Result<Self::File, Self::Error> {
        self.check_mounted()?;
        let mut owned = PathBuf::new();
        if path.len() > NOR_NAME_SIZE || owned.push_str(path).is_err() {
            return Err(NorFsError::TooLarge);
        }

        let sector = match self.find(path)? {
            Some((sector, _)) => {
                // Truncate
                self.erase(sector)?;
                sector
            }
            None => self.find_free()?,
        };
        self.open_writes
            .push(sector)
            .map_err(|_| NorFsError::Unsupported)?;

        Ok(NorFile {
            sector,
            path: owned,
            data: Vec::new(),
            pos: 0,
            writable: true,
            synced: None,
        })
    }

    fn open(&mut self, path: &str) -> Result<Self::File, Self::Error> {
        self.check_mounted()?;
        let (sector, header) = self.find(path)?.ok_or(NorFsError::NotFound)?;

        let mut buf = [0u8; NOR_FILE_SIZE];
        let padded = header.len.next_multiple_of(WORD);
        self.read_raw(Self::base(sector) + DATA_OFFSET as u32, &mut buf[..padded])?;

        let mut data = Vec::new();
        data.extend_from_slice(&buf[..header.len])
            .map_err(|_| NorFsError::TooLarge)?;
        Ok(NorFile {
            sector,
            path: header.path,
            data,
            pos: 0,
            writable: false,
            synced: Some(header.len),
        })
    }

    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.check_mounted()?;
        let remaining = &file.data[file.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        file.pos += n;
        Ok(n)
    }

    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<usize, Self::Error> {
        self.check_mounted()?;
        if !file.writable {
            return Err(NorFsError::Unsupported);
        }
        file.data
            .extend_from_slice(data)
            .map_err(|_| NorFsError::TooLarge)?;
        Ok(data.len())
    }

    fn sync(&mut self, file: &mut Self::File) -> Result<(), Self::Error> {
        self.check_mounted()?;
        if !file.writable || file.synced == Some(file.data.len()) {
            return Ok(());
        }
        self.commit(file)?;
        file.synced = Some(file.data.len());
        Ok(())
    }

    fn close(&mut self, mut file: Self::File) -> Result<(), Self::Error> {
        let result = self.sync(&mut file);
        if file.writable {
            self.release(file.sector);
        }
        result
    }

    fn remove(&mut self, path: &str) -> Result<(), Self::Error> {
        self.check_mounted()?;
        let (sector, _) = self.find(path)?.ok_or(NorFsError::NotFound)?;
        self.erase(sector)
    }

    /// Only a file that has never been renamed can be renamed.
    fn rename(&mut self, from: &str, to: &str) -> Result<(), Self::Error> {
        self.check_mounted()?;
        if to.len() > NOR_NAME_SIZE {
            return Err(NorFsError::TooLarge);
        }
        let (sector, header) = self.find(from)?.ok_or(NorFsError::NotFound)?;
        if self.find(to)?.is_some() {
            return Err(NorFsError::AlreadyExists);
        }
        if header.renamed {
            return Err(NorFsError::Unsupported);
        }

        let base = Self::base(sector);
        let mut alt = [0xFFu8; DATA_OFFSET - ALT_OFFSET];
        alt[0] = to.len() as u8;
        let name_at = ALT_NAME_OFFSET - ALT_OFFSET;
        alt[name_at..name_at + to.len()].copy_from_slice(to.as_bytes());
        self.program(base + ALT_OFFSET as u32, &alt)?;

        self.program(base + COMMIT_OFFSET as u32, &[0; WORD])
    }

    fn read_dir(&mut self, path: &str, visit: &mut dyn FnMut(&str)) -> Result<(), Self::Error> {
        self.check_mounted()?;
        for sector in 1..self.sectors {
            if let Some(header) = self.header(sector)? {
                if parent(&header.path) == path {
                    visit(file_name(&header.path));
                }
            }
        }
        Ok(())
    }

    fn capacity(&self) -> u64 {
        u64::from(self.sectors - 1) * F::ERASE_SIZE as u64
    }
}
