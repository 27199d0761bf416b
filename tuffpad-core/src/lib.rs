//! Platform-agnostic configuration core for the tuffpad firmware.
//!
//! This crate holds everything between the USB serial stream and the flash
//! chip, with no hardware dependencies, so that it can run both on the
//! device and on a host for testing.
//!
//! # Overview
//!
//! - [`config`]: fixed-layout records ([`DeviceConfig`], [`Profile`], [`KeyBinding`])
//! - [`storage`]: [`StorageManager`] with atomic writes over a [`FileSystem`]
//! - [`dispatcher`]: [`CommandDispatcher`] mapping requests to storage operations
//! - [`link`]: [`ProtocolLink`] reading frames and writing responses
//!
//! # Example
//!
//! ```rust
//! use tuffpad_core::{
//!     CommandDispatcher, FirmwareVersion, FrameHandler, MemFs, StorageManager, StorageOptions,
//! };
//! use tuffpad_proto::{Command, Frame, Status};
//!
//! let storage = StorageManager::new(MemFs::<16>::new(), StorageOptions::default()).unwrap();
//! let mut dispatcher = CommandDispatcher::new(storage, FirmwareVersion::new(0, 1));
//!
//! let response = dispatcher.handle(&Frame::new(Command::GetProfile, &[3]).unwrap());
//! assert_eq!(response.status, Status::NotFound);
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Log through defmt and derive `defmt::Format` (for embedded logging)
//! - **`log`**: Log through the `log` facade (for host tools)
//!
//! # No-std Support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

// Must come first so the logging macros are visible in every module
mod fmt;

pub mod config;
pub mod dispatcher;
pub mod link;
pub mod storage;

// Re-export types at crate root for convenience
pub use config::{
    BindingType, CodecError, DeviceConfig, KeyBinding, OutputType, Profile, Record,
    CURRENT_VERSION,
};
pub use dispatcher::{CommandDispatcher, FirmwareVersion, FrameHandler, DISCOVER_REPLY};
pub use link::{DtrSignal, LinkConfig, LinkError, LinkState, LinkStats, ProtocolLink};
pub use storage::{
    FileSystem, FsError, FsErrorKind, MemFs, NorFlashFs, Stats, StorageError, StorageManager,
    StorageOptions,
};
