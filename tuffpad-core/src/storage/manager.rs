//! Persistent configuration store over a [`FileSystem`].

use heapless::Vec;

use super::error::{fs_err, StorageError};
use super::fs::{FileSystem, FsError, FsErrorKind};
use super::paths::{
    is_temp, join, parse_profile_name, profile_path, temp_path, PathBuf, CONFIG_DIR,
    DEVICE_PATH, PROFILES_DIR,
};
use crate::config::{DeviceConfig, Profile, Record, CURRENT_VERSION, MAX_RECORD_SIZE};

/// Estimated flash footprint of one stored profile, including metadata.
pub const PROFILE_FOOTPRINT: i64 = 320;

/// Estimated footprint of the device config and directories.
pub const BASE_FOOTPRINT: i64 = 100;

/// Free space that must remain before a new profile is accepted.
pub const PROFILE_HEADROOM: i64 = 512;

/// Occupied slots in ascending order.
pub type SlotList = Vec<u8, 256>;

/// Temp files removed per directory scan during boot cleanup.
const CLEANUP_BATCH: usize = 8;

/// Lifecycle of the underlying volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MountState {
    Unmounted,
    Mounting,
    Formatting,
    Mounted,
    Closed,
}

/// Construction options for [`StorageManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StorageOptions {
    /// Format the volume when it does not mount.
    pub format_on_failure: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            format_on_failure: true,
        }
    }
}

/// Storage usage, computed on demand from the profile count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    pub total_space: i64,
    pub used_space: i64,
    pub free_space: i64,
    pub profile_count: usize,
}

/// Owns the filesystem and stores device config and profiles in it.
///
/// Every write goes through a temp file that is synced and then renamed
/// over the target, so a reset at any point leaves either the old or the
/// new record, never a partial one. Leftover temp files are removed the
/// next time the manager is built.
pub struct StorageManager<F: FileSystem> {
    fs: F,
    state: MountState,
}

impl<F: FileSystem> StorageManager<F> {
    /// Mount `fs`, clean up interrupted writes and apply the version policy.
    ///
    /// Fails if the volume cannot be mounted (after formatting, when
    /// allowed) or if a required wipe fails. Cleanup and version-check
    /// problems are logged and otherwise ignored.
    pub fn new(fs: F, options: StorageOptions) -> Result<Self, StorageError> {
        let mut manager = Self {
            fs,
            state: MountState::Unmounted,
        };
        manager.mount(options)?;

        if let Err(err) = manager.boot_cleanup() {
            warn!("boot cleanup failed: {}", err);
        }

        match manager.check_version() {
            Ok(true) => {
                warn!("config version mismatch, wiping all configuration");
                manager.wipe_all()?;
            }
            Ok(false) => {}
            Err(err) => warn!("version check failed: {}", err),
        }

        Ok(manager)
    }

    fn mount(&mut self, options: StorageOptions) -> Result<(), StorageError> {
        self.state = MountState::Mounting;
        if let Err(err) = self.fs.mount() {
            if !options.format_on_failure {
                error!("mount failed: {}", err.kind());
                self.state = MountState::Unmounted;
                return Err(fs_err(err));
            }

            warn!("mount failed ({}), formatting", err.kind());
            self.state = MountState::Formatting;
            let formatted = self.fs.format().and_then(|()| self.fs.mount());
            if let Err(err) = formatted {
                error!("format failed: {}", err.kind());
                self.state = MountState::Unmounted;
                return Err(fs_err(err));
            }
        }

        info!("storage mounted, {} bytes", self.fs.capacity());
        self.state = MountState::Mounted;
        Ok(())
    }

    /// Remove `*.tmp` leftovers in the config and profile directories.
    fn boot_cleanup(&mut self) -> Result<(), StorageError> {
        for dir in [CONFIG_DIR, PROFILES_DIR] {
            loop {
                let mut stale: Vec<PathBuf, CLEANUP_BATCH> = Vec::new();
                let mut truncated = false;

                let scan = self.fs.read_dir(dir, &mut |name| {
                    if !is_temp(name) {
                        return;
                    }
                    match join(dir, name) {
                        Ok(path) => truncated |= stale.push(path).is_err(),
                        Err(_) => warn!("skipping temp file with long name in {}", dir),
                    }
                });
                match scan {
                    Ok(()) => {}
                    Err(err) if err.kind() == FsErrorKind::NotFound => break,
                    Err(err) => return Err(fs_err(err)),
                }

                let mut all_removed = true;
                for path in &stale {
                    match self.fs.remove(path) {
                        Ok(()) => info!("removed stale {}", path.as_str()),
                        Err(err) => {
                            warn!("could not remove {}: {}", path.as_str(), err.kind());
                            all_removed = false;
                        }
                    }
                }

                // Rescan only while progress is being made
                if !truncated || !all_removed {
                    break;
                }
            }
        }
        Ok(())
    }

    /// `Ok(true)` when a device config exists with a foreign version.
    fn check_version(&mut self) -> Result<bool, StorageError> {
        let mut buf = [0u8; MAX_RECORD_SIZE + 1];
        match self.read_file(DEVICE_PATH, &mut buf) {
            Ok(n) if n == DeviceConfig::SIZE => {
                let version = u16::from_le_bytes([buf[0], buf[1]]);
                Ok(version != CURRENT_VERSION)
            }
            Ok(_) => Err(StorageError::Corrupted),
            Err(StorageError::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn wipe_all(&mut self) -> Result<(), StorageError> {
        for slot in self.list_profiles()? {
            self.delete_profile(slot)?;
        }
        self.remove_if_present(DEVICE_PATH)?;
        info!("configuration wiped");
        Ok(())
    }

    fn ensure_mounted(&self) -> Result<(), StorageError> {
        match self.state {
            MountState::Mounted => Ok(()),
            _ => Err(StorageError::NotMounted),
        }
    }

    fn ensure_dirs(&mut self) -> Result<(), StorageError> {
        for dir in [CONFIG_DIR, PROFILES_DIR] {
            match self.fs.create_dir(dir) {
                Ok(()) => debug!("created {}", dir),
                Err(err) if err.kind() == FsErrorKind::AlreadyExists => {}
                Err(err) => return Err(fs_err(err)),
            }
        }
        Ok(())
    }

    fn remove_if_present(&mut self, path: &str) -> Result<(), StorageError> {
        match self.fs.remove(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == FsErrorKind::NotFound => Ok(()),
            Err(err) => Err(fs_err(err)),
        }
    }

    /// Read a whole file into `buf`. A file longer than `buf` fills it.
    fn read_file(&mut self, path: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let mut file = self.fs.open(path).map_err(fs_err)?;
        let mut filled = 0;
        let result = loop {
            if filled == buf.len() {
                break Ok(filled);
            }
            match self.fs.read(&mut file, &mut buf[filled..]) {
                Ok(0) => break Ok(filled),
                Ok(n) => filled += n,
                Err(err) => break Err(fs_err(err)),
            }
        };
        if let Err(err) = self.fs.close(file) {
            debug!("close after read failed: {}", err.kind());
        }
        result
    }

    fn load<R: Record>(&mut self, path: &str) -> Result<R, StorageError> {
        self.ensure_mounted()?;
        let mut buf = [0u8; MAX_RECORD_SIZE + 1];
        let n = self.read_file(path, &mut buf)?;
        if n != R::SIZE {
            warn!("{} has {} bytes, expected {}", path, n, R::SIZE);
            return Err(StorageError::Corrupted);
        }
        if u16::from_le_bytes([buf[0], buf[1]]) != CURRENT_VERSION {
            return Err(StorageError::NotFound);
        }
        R::decode(&buf[..n]).map_err(|_| StorageError::Corrupted)
    }

    fn store<R: Record + Clone>(&mut self, path: &str, record: &R) -> Result<(), StorageError> {
        self.ensure_mounted()?;
        self.ensure_dirs()?;

        let mut record = record.clone();
        record.set_version(CURRENT_VERSION);
        let mut buf = [0u8; MAX_RECORD_SIZE];
        let n = record.encode(&mut buf)?;
        self.atomic_write(path, &buf[..n])
    }

    /// Write `data` to `path` through `<path>.tmp`.
    ///
    /// On failure the temp file is removed and `path` is left as it was.
    fn atomic_write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let tmp = temp_path(path)?;
        let _ = self.fs.remove(&tmp);

        let mut file = self.fs.create(&tmp).map_err(fs_err)?;
        if let Err(err) = self.write_synced(&mut file, data) {
            let _ = self.fs.close(file);
            self.discard(&tmp);
            error!("writing {} failed: {}", path, err);
            return Err(err);
        }
        if let Err(err) = self.fs.close(file) {
            self.discard(&tmp);
            error!("closing {} failed: {}", tmp.as_str(), err.kind());
            return Err(fs_err(err));
        }

        // Rename does not replace
        if let Err(err) = self.remove_if_present(path) {
            warn!("could not remove old {}: {}", path, err);
        }

        if let Err(err) = self.fs.rename(&tmp, path) {
            self.discard(&tmp);
            error!("renaming {} failed: {}", tmp.as_str(), err.kind());
            return Err(fs_err(err));
        }
        Ok(())
    }

    fn write_synced(&mut self, file: &mut F::File, mut data: &[u8]) -> Result<(), StorageError> {
        while !data.is_empty() {
            match self.fs.write(file, data).map_err(fs_err)? {
                0 => return Err(StorageError::NoSpace),
                n => data = &data[n..],
            }
        }
        self.fs.sync(file).map_err(fs_err)
    }

    fn discard(&mut self, tmp: &str) {
        if let Err(err) = self.remove_if_present(tmp) {
            warn!("could not remove {}: {}", tmp, err);
        }
    }

    /// Load the device config.
    ///
    /// `NotFound` if absent or stored under another layout version.
    pub fn load_device(&mut self) -> Result<DeviceConfig, StorageError> {
        self.load(DEVICE_PATH)
    }

    /// Atomically store the device config with the current version.
    pub fn save_device(&mut self, config: &DeviceConfig) -> Result<(), StorageError> {
        self.store(DEVICE_PATH, config)
    }

    /// Load the profile in `slot`.
    pub fn load_profile(&mut self, slot: u8) -> Result<Profile, StorageError> {
        let path = profile_path(slot)?;
        self.load(&path)
    }

    /// Atomically store a profile in `slot` with the current version.
    ///
    /// Filling a previously empty slot fails with
    /// [`StorageError::NoSpace`] when [`can_fit_profile`](Self::can_fit_profile)
    /// says there is no room.
    pub fn save_profile(&mut self, slot: u8, profile: &Profile) -> Result<(), StorageError> {
        self.ensure_mounted()?;
        if !self.profile_exists(slot) && !self.can_fit_profile() {
            warn!("no room for profile {}", slot);
            return Err(StorageError::NoSpace);
        }
        let path = profile_path(slot)?;
        self.store(&path, profile)
    }

    /// Delete the profile in `slot`. Deleting an empty slot succeeds.
    pub fn delete_profile(&mut self, slot: u8) -> Result<(), StorageError> {
        self.ensure_mounted()?;
        let path = profile_path(slot)?;
        self.remove_if_present(&path)
    }

    /// Check whether a profile file exists in `slot`.
    pub fn profile_exists(&mut self, slot: u8) -> bool {
        if self.ensure_mounted().is_err() {
            return false;
        }
        let Ok(path) = profile_path(slot) else {
            return false;
        };
        match self.fs.open(&path) {
            Ok(file) => {
                let _ = self.fs.close(file);
                true
            }
            Err(_) => false,
        }
    }

    /// Occupied slots, ascending and without duplicates.
    pub fn list_profiles(&mut self) -> Result<SlotList, StorageError> {
        self.ensure_mounted()?;

        let mut occupied = [false; 256];
        let scan = self.fs.read_dir(PROFILES_DIR, &mut |name| {
            if let Some(slot) = parse_profile_name(name) {
                occupied[usize::from(slot)] = true;
            }
        });
        match scan {
            Ok(()) => {}
            Err(err) if err.kind() == FsErrorKind::NotFound => {}
            Err(err) => return Err(fs_err(err)),
        }

        let mut slots = SlotList::new();
        for (slot, _) in occupied.iter().enumerate().filter(|(_, used)| **used) {
            // At most 256 entries, one per slot value
            let _ = slots.push(slot as u8);
        }
        Ok(slots)
    }

    /// Estimated usage: [`PROFILE_FOOTPRINT`] per profile plus
    /// [`BASE_FOOTPRINT`], against the volume capacity.
    pub fn stats(&mut self) -> Result<Stats, StorageError> {
        let profile_count = self.list_profiles()?.len();
        let total_space = i64::try_from(self.fs.capacity()).unwrap_or(i64::MAX);
        let used_space = profile_count as i64 * PROFILE_FOOTPRINT + BASE_FOOTPRINT;
        Ok(Stats {
            total_space,
            used_space,
            free_space: total_space - used_space,
            profile_count,
        })
    }

    /// Whether another profile is likely to fit.
    pub fn can_fit_profile(&mut self) -> bool {
        self.stats()
            .map(|stats| stats.free_space > PROFILE_HEADROOM)
            .unwrap_or(false)
    }

    /// Delete the device config and every profile.
    pub fn force_wipe(&mut self) -> Result<(), StorageError> {
        self.ensure_mounted()?;
        self.wipe_all()
    }

    /// Unmount the volume. Later operations fail with
    /// [`StorageError::NotMounted`].
    pub fn close(&mut self) -> Result<(), StorageError> {
        if self.state != MountState::Mounted {
            return Ok(());
        }
        self.state = MountState::Closed;
        self.fs.unmount().map_err(fs_err)
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> MountState {
        self.state
    }

    /// Get a mutable reference to the filesystem.
    ///
    /// Meant for fault injection and inspection; writing through it bypasses
    /// the atomic-write protocol.
    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    /// Give back the filesystem without unmounting it.
    pub fn into_inner(self) -> F {
        self.fs
    }
}
