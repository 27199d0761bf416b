//! Power-loss-safe configuration storage.
//!
//! - [`StorageManager`]: record-level API with atomic writes, boot cleanup
//!   and the version wipe
//! - [`FileSystem`]: the port it runs on
//! - [`MemFs`]: RAM implementation for tests and simulation
//! - [`NorFlashFs`]: sector-per-file implementation over NOR flash
//!
//! Layout on the volume:
//!
//! ```text
//! /config/device.bin           DeviceConfig
//! /config/profiles/<slot>.bin  Profile, slot 0..=255
//! <any of the above>.tmp       write in progress
//! ```

mod error;
mod fs;
mod manager;
pub mod mem;
pub mod nor;
pub mod paths;

pub use error::StorageError;
pub use fs::{FileSystem, FsError, FsErrorKind};
pub use manager::{
    MountState, SlotList, Stats, StorageManager, StorageOptions, BASE_FOOTPRINT,
    PROFILE_FOOTPRINT, PROFILE_HEADROOM,
};
pub use mem::{FsOp, MemFile, MemFs, MemFsError};
pub use nor::{NorFile, NorFlashFs, NorFsError};
