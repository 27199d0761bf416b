//! Persisted configuration records and their fixed little-endian layouts.
//!
//! Every record has exactly one encoded width. The same bytes are used on
//! the wire (command payloads) and on flash, so a record read from storage
//! can be sent to the host without re-encoding.

use strum::FromRepr;

/// Layout version written into every record.
///
/// Device config and profiles share it. A stored record with any other
/// version is treated as absent and triggers a wipe at boot.
pub const CURRENT_VERSION: u16 = 1;

/// Number of bindings in a profile.
pub const BINDINGS_PER_PROFILE: usize = 32;

/// Size of the null-padded name field.
pub const PROFILE_NAME_SIZE: usize = 16;

/// Longest name that still leaves room for the terminating NUL.
pub const PROFILE_NAME_MAX_LEN: usize = PROFILE_NAME_SIZE - 1;

/// Largest encoded record, used to size scratch buffers.
pub const MAX_RECORD_SIZE: usize = Profile::SIZE;

/// Errors from encoding or decoding a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// Input is not exactly the record width.
    WrongLength { expected: usize, actual: usize },
    /// Output buffer is smaller than the record width.
    BufferTooSmall,
}

impl core::fmt::Display for CodecError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::WrongLength { expected, actual } => {
                write!(f, "expected {} bytes, got {}", expected, actual)
            }
            Self::BufferTooSmall => write!(f, "buffer too small"),
        }
    }
}

/// A fixed-width record that can be persisted and sent over the link.
pub trait Record: Sized {
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Encode into the first [`Self::SIZE`] bytes of `buf`.
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError>;

    /// Decode from exactly [`Self::SIZE`] bytes.
    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;

    /// Stored layout version.
    fn version(&self) -> u16;

    /// Overwrite the stored layout version.
    fn set_version(&mut self, version: u16);
}

fn check_decode_len(bytes: &[u8], expected: usize) -> Result<(), CodecError> {
    if bytes.len() != expected {
        return Err(CodecError::WrongLength {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn check_encode_len(buf: &[u8], expected: usize) -> Result<(), CodecError> {
    if buf.len() < expected {
        return Err(CodecError::BufferTooSmall);
    }
    Ok(())
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Physical input a binding listens to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BindingType {
    #[default]
    Key = 0,
    JoystickButton = 1,
    DPad = 2,
    RgbPattern = 3,
}

/// HID output a binding produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OutputType {
    #[default]
    None = 0,
    Keyboard = 1,
    GamepadButton = 2,
    MouseButton = 3,
    Consumer = 4,
}

/// One input-to-output mapping (8 bytes).
///
/// ```text
/// [0] input type | [1] input id | [2] output type | [3..5] output value LE
/// [5] modifiers  | [6] flags    | [7] reserved
/// ```
///
/// The type bytes are kept raw so values this firmware does not know yet
/// survive a store and load unchanged. Use [`binding_type`](Self::binding_type)
/// and [`output_kind`](Self::output_kind) for the typed view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyBinding {
    /// [`BindingType`] byte.
    pub input_type: u8,
    pub input_id: u8,
    /// [`OutputType`] byte.
    pub output_type: u8,
    /// HID usage, button number or consumer code, depending on `output_type`.
    pub output_value: u16,
    pub modifiers: u8,
    pub flags: u8,
    pub reserved: u8,
}

impl KeyBinding {
    /// Encoded width in bytes.
    pub const SIZE: usize = 8;

    /// Input type, or `None` for a byte this firmware does not know.
    #[must_use]
    pub fn binding_type(&self) -> Option<BindingType> {
        BindingType::from_repr(self.input_type)
    }

    /// Output type, or `None` for a byte this firmware does not know.
    #[must_use]
    pub fn output_kind(&self) -> Option<OutputType> {
        OutputType::from_repr(self.output_type)
    }

    /// Encode into a fixed array.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let value = self.output_value.to_le_bytes();
        [
            self.input_type,
            self.input_id,
            self.output_type,
            value[0],
            value[1],
            self.modifiers,
            self.flags,
            self.reserved,
        ]
    }

    /// Decode from exactly [`Self::SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        check_decode_len(bytes, Self::SIZE)?;
        Ok(Self {
            input_type: bytes[0],
            input_id: bytes[1],
            output_type: bytes[2],
            output_value: u16_at(bytes, 3),
            modifiers: bytes[5],
            flags: bytes[6],
            reserved: bytes[7],
        })
    }
}

/// Global device settings (12 bytes).
///
/// ```text
/// [0..2] version | [2..6] flags | [6] active profile | [7] brightness
/// [8] debounce ms | [9] reserved | [10..12] reserved2
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceConfig {
    pub version: u16,
    pub flags: u32,
    pub active_profile: u8,
    pub brightness: u8,
    pub debounce_ms: u8,
    pub reserved: u8,
    pub reserved2: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            flags: 0,
            active_profile: 0,
            brightness: 0,
            debounce_ms: 0,
            reserved: 0,
            reserved2: 0,
        }
    }
}

impl DeviceConfig {
    /// Encode into a fixed array.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.version.to_le_bytes());
        out[2..6].copy_from_slice(&self.flags.to_le_bytes());
        out[6] = self.active_profile;
        out[7] = self.brightness;
        out[8] = self.debounce_ms;
        out[9] = self.reserved;
        out[10..12].copy_from_slice(&self.reserved2.to_le_bytes());
        out
    }
}

impl Record for DeviceConfig {
    const SIZE: usize = 12;

    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        check_encode_len(buf, Self::SIZE)?;
        buf[..Self::SIZE].copy_from_slice(&self.to_bytes());
        Ok(Self::SIZE)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        check_decode_len(bytes, Self::SIZE)?;
        Ok(Self {
            version: u16_at(bytes, 0),
            flags: u32_at(bytes, 2),
            active_profile: bytes[6],
            brightness: bytes[7],
            debounce_ms: bytes[8],
            reserved: bytes[9],
            reserved2: u16_at(bytes, 10),
        })
    }

    fn version(&self) -> u16 {
        self.version
    }

    fn set_version(&mut self, version: u16) {
        self.version = version;
    }
}

/// One keybinding layer (286 bytes).
///
/// ```text
/// [0..2] version | [2..6] flags | [6..10] rgb color | [10] rgb pattern
/// [11] reserved1 | [12] binding count | [13] reserved2 | [14..30] name
/// [30..286] 32 x KeyBinding
/// ```
///
/// `binding_count` is advisory; all 32 bindings are always stored.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Profile {
    pub version: u16,
    pub flags: u32,
    /// RGB888 in the low three bytes.
    pub rgb_color: u32,
    pub rgb_pattern: u8,
    pub reserved1: u8,
    pub binding_count: u8,
    pub reserved2: u8,
    /// Null-padded UTF-8.
    pub name: [u8; PROFILE_NAME_SIZE],
    pub bindings: [KeyBinding; BINDINGS_PER_PROFILE],
}

const NAME_OFFSET: usize = 14;
const BINDINGS_OFFSET: usize = NAME_OFFSET + PROFILE_NAME_SIZE;

impl Default for Profile {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            flags: 0,
            rgb_color: 0,
            rgb_pattern: 0,
            reserved1: 0,
            binding_count: 0,
            reserved2: 0,
            name: [0; PROFILE_NAME_SIZE],
            bindings: [KeyBinding::default(); BINDINGS_PER_PROFILE],
        }
    }
}

impl Profile {
    /// Profile name up to the first NUL.
    ///
    /// Returns `None` if the stored bytes are not valid UTF-8.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(PROFILE_NAME_SIZE);
        core::str::from_utf8(&self.name[..end]).ok()
    }

    /// Store `name`, truncated to [`PROFILE_NAME_MAX_LEN`] bytes on a
    /// character boundary and null-padded.
    pub fn set_name(&mut self, name: &str) {
        let mut end = name.len().min(PROFILE_NAME_MAX_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        self.name = [0; PROFILE_NAME_SIZE];
        self.name[..end].copy_from_slice(&name.as_bytes()[..end]);
    }

    /// Encode into a fixed array.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.version.to_le_bytes());
        out[2..6].copy_from_slice(&self.flags.to_le_bytes());
        out[6..10].copy_from_slice(&self.rgb_color.to_le_bytes());
        out[10] = self.rgb_pattern;
        out[11] = self.reserved1;
        out[12] = self.binding_count;
        out[13] = self.reserved2;
        out[NAME_OFFSET..BINDINGS_OFFSET].copy_from_slice(&self.name);
        for (chunk, binding) in out[BINDINGS_OFFSET..]
            .chunks_exact_mut(KeyBinding::SIZE)
            .zip(self.bindings.iter())
        {
            chunk.copy_from_slice(&binding.to_bytes());
        }
        out
    }
}

impl Record for Profile {
    const SIZE: usize = BINDINGS_OFFSET + BINDINGS_PER_PROFILE * KeyBinding::SIZE;

    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        check_encode_len(buf, Self::SIZE)?;
        buf[..Self::SIZE].copy_from_slice(&self.to_bytes());
        Ok(Self::SIZE)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        check_decode_len(bytes, Self::SIZE)?;

        let mut name = [0u8; PROFILE_NAME_SIZE];
        name.copy_from_slice(&bytes[NAME_OFFSET..BINDINGS_OFFSET]);

        let mut bindings = [KeyBinding::default(); BINDINGS_PER_PROFILE];
        for (binding, chunk) in bindings
            .iter_mut()
            .zip(bytes[BINDINGS_OFFSET..].chunks_exact(KeyBinding::SIZE))
        {
            *binding = KeyBinding::from_bytes(chunk)?;
        }

        Ok(Self {
            version: u16_at(bytes, 0),
            flags: u32_at(bytes, 2),
            rgb_color: u32_at(bytes, 6),
            rgb_pattern: bytes[10],
            reserved1: bytes[11],
            binding_count: bytes[12],
            reserved2: bytes[13],
            name,
            bindings,
        })
    }

    fn version(&self) -> u16 {
        self.version
    }

    fn set_version(&mut self, version: u16) {
        self.version = version;
    }
}
