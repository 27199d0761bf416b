//! Link status published by the config task and shown on the LED.

use defmt::Format;
use portable_atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
#[repr(u8)]
pub enum LinkStatus {
    Booting = 0,
    WaitingForHost = 1,
    Connected = 2,
    /// Storage did not come up; only Ping, Discover and GetVersion work.
    StorageFault = 3,
}

impl LinkStatus {
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::WaitingForHost,
            2 => Self::Connected,
            3 => Self::StorageFault,
            _ => Self::Booting,
        }
    }

    /// Status for a link whose storage is `storage_ready`.
    #[must_use]
    pub const fn for_link(storage_ready: bool, connected: bool) -> Self {
        match (storage_ready, connected) {
            (false, _) => Self::StorageFault,
            (true, false) => Self::WaitingForHost,
            (true, true) => Self::Connected,
        }
    }

    /// LED on and off time in milliseconds. An off time of zero is solid.
    #[must_use]
    pub const fn blink_pattern(self) -> (u64, u64) {
        match self {
            Self::Booting => (50, 50),
            Self::WaitingForHost => (500, 500),
            Self::Connected => (1000, 0),
            Self::StorageFault => (100, 900),
        }
    }
}

/// Single-word status cell shared between tasks.
pub struct StatusCell(AtomicU8);

impl StatusCell {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU8::new(LinkStatus::Booting as u8))
    }

    pub fn publish(&self, status: LinkStatus) {
        self.0.store(status as u8, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get(&self) -> LinkStatus {
        LinkStatus::from_u8(self.0.load(Ordering::Relaxed))
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}
