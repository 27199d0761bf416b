//! Command and status codes carried in the second byte of every frame.

use strum::FromRepr;

/// Request command codes (host → device).
///
/// Unknown codes are still representable on the wire: a [`Frame`](crate::Frame)
/// carries the raw byte and [`Command::from_repr`] returns `None` for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    GetDeviceConfig = 0x01,
    SetDeviceConfig = 0x02,
    GetProfile = 0x03,
    SetProfile = 0x04,
    DeleteProfile = 0x05,
    ListProfiles = 0x06,
    GetStorageStats = 0x07,
    Ping = 0x08,
    FactoryReset = 0x09,
    GetVersion = 0x10,
    /// Identification request used by the host to find the device among
    /// arbitrary serial ports.
    Discover = 0x7F,
}

impl Command {
    /// Get the raw command byte.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> Self {
        cmd.as_u8()
    }
}

/// Response status codes (device → host).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    /// Unexpected storage or filesystem fault.
    Error = 0x01,
    InvalidCmd = 0x02,
    /// Wrong payload size or malformed record.
    InvalidData = 0x03,
    NotFound = 0x04,
    NoSpace = 0x05,
    /// Profile payload describes a config version the firmware does not speak.
    VersionMismatch = 0x06,
    /// Reserved on the wire. Frames failing their CRC are dropped before a
    /// response exists, so the device never sends this.
    CrcError = 0x07,
}

impl Status {
    /// Get the raw status byte.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check whether this status reports success.
    #[inline]
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        status.as_u8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes_match_wire_table() {
        assert_eq!(Command::GetDeviceConfig.as_u8(), 0x01);
        assert_eq!(Command::SetDeviceConfig.as_u8(), 0x02);
        assert_eq!(Command::GetProfile.as_u8(), 0x03);
        assert_eq!(Command::SetProfile.as_u8(), 0x04);
        assert_eq!(Command::DeleteProfile.as_u8(), 0x05);
        assert_eq!(Command::ListProfiles.as_u8(), 0x06);
        assert_eq!(Command::GetStorageStats.as_u8(), 0x07);
        assert_eq!(Command::Ping.as_u8(), 0x08);
        assert_eq!(Command::FactoryReset.as_u8(), 0x09);
        assert_eq!(Command::GetVersion.as_u8(), 0x10);
        assert_eq!(Command::Discover.as_u8(), 0x7F);
    }

    #[test]
    fn test_command_from_repr_unknown() {
        assert_eq!(Command::from_repr(0x08), Some(Command::Ping));
        assert_eq!(Command::from_repr(0x0A), None);
        assert_eq!(Command::from_repr(0xFF), None);
    }

    #[test]
    fn test_status_roundtrip() {
        for raw in 0x00..=0x07u8 {
            let status = Status::from_repr(raw).unwrap();
            assert_eq!(u8::from(status), raw);
        }
        assert_eq!(Status::from_repr(0x08), None);
        assert!(Status::Ok.is_ok());
        assert!(!Status::NotFound.is_ok());
    }
}
