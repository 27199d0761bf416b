//! tuffpad firmware for RP2040.
//!
//! This crate wires the platform-agnostic configuration core to the board:
//! USB CDC-ACM serial for the configurator link, a partition of the
//! on-board flash for storage, and a status LED.

#![no_std]

// Re-export core types for convenience
pub use tuffpad_core::{
    CommandDispatcher, DeviceConfig, FirmwareVersion, LinkConfig, LinkError, NorFlashFs, Profile,
    ProtocolLink, StorageError, StorageManager, StorageOptions,
};

pub mod board;
pub mod status;
pub mod usb_serial;

pub use status::{LinkStatus, StatusCell};
pub use usb_serial::{configure_usb_serial, UsbSerial, UsbSerialError};

/// Version reported by GetVersion, taken from the package version.
pub const FIRMWARE_VERSION: FirmwareVersion = FirmwareVersion::new(
    parse_version_part(env!("CARGO_PKG_VERSION_MAJOR")),
    parse_version_part(env!("CARGO_PKG_VERSION_MINOR")),
);

/// Parse a decimal version component, saturating at 255.
const fn parse_version_part(digits: &str) -> u8 {
    let bytes = digits.as_bytes();
    let mut value: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        value = value * 10 + (bytes[i] - b'0') as u32;
        if value > u8::MAX as u32 {
            return u8::MAX;
        }
        i += 1;
    }
    value as u8
}
