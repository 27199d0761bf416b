//! Board constants for a Raspberry Pi Pico.

/// Total on-board flash.
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Config partition size: 272 sectors, enough for every profile slot, the
/// device config, one temp file and the volume marker.
pub const CONFIG_PARTITION_SIZE: u32 = 272 * 4096;

/// The config partition sits at the end of flash.
pub const CONFIG_PARTITION_OFFSET: u32 = FLASH_SIZE as u32 - CONFIG_PARTITION_SIZE;

/// pid.codes test VID/PID.
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x0001;

pub const USB_MANUFACTURER: &str = "tuffpad";
pub const USB_PRODUCT: &str = "tuffpad gamepad";
pub const USB_SERIAL: &str = "001";
