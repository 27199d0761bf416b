//! Frame encoding and decoding for the configurator link.
//!
//! Request and response frames share one layout:
//!
//! ```text
//! [0xAA][TAG:1][LEN:2 LE][PAYLOAD:LEN][CRC16:2 LE]
//! ```
//!
//! `TAG` is the command code on requests and the status code on responses.
//! The CRC covers `TAG`, `LEN` and `PAYLOAD`, never the sync byte.

use heapless::Vec;

use crate::codes::{Command, Status};
use crate::crc::calculate_crc16;

/// Frame synchronization byte.
pub const SYNC_BYTE: u8 = 0xAA;

/// Maximum payload size in bytes. Larger length fields are rejected before
/// any payload is buffered.
pub const MAX_PAYLOAD_SIZE: usize = 4096;

/// Sync + tag + 2-byte length.
pub const HEADER_SIZE: usize = 4;

/// Trailing CRC16 size.
pub const CRC_SIZE: usize = 2;

/// Bytes a frame adds around its payload.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + CRC_SIZE;

/// Maximum complete frame size.
pub const MAX_FRAME_SIZE: usize = MAX_PAYLOAD_SIZE + FRAME_OVERHEAD;

/// Fixed-capacity payload buffer.
pub type Payload = Vec<u8, MAX_PAYLOAD_SIZE>;

/// Errors that can occur during frame parsing or encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Bad sync byte, oversized length field or unknown status code.
    InvalidFrame,
    /// Received CRC does not match the computed one.
    CrcMismatch,
    /// Payload exceeds [`MAX_PAYLOAD_SIZE`].
    PayloadTooLarge,
    /// Output buffer cannot hold the encoded frame.
    BufferTooSmall,
    /// Input ends before the frame does.
    Incomplete,
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidFrame => write!(f, "invalid frame"),
            Self::CrcMismatch => write!(f, "CRC mismatch"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::Incomplete => write!(f, "incomplete frame"),
        }
    }
}

/// A decoded request: command byte plus payload.
///
/// The command is kept as the raw byte so that unknown codes survive decoding
/// and can be answered with [`Status::InvalidCmd`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw command byte.
    pub command: u8,
    /// Payload data.
    pub payload: Payload,
}

impl Frame {
    /// Create a new frame with the given command and payload.
    pub fn new(command: impl Into<u8>, payload: &[u8]) -> Result<Self, FrameError> {
        Ok(Self {
            command: command.into(),
            payload: payload_from_slice(payload)?,
        })
    }

    /// Create a frame with no payload.
    #[must_use]
    pub fn empty(command: impl Into<u8>) -> Self {
        Self {
            command: command.into(),
            payload: Vec::new(),
        }
    }

    /// The command, if the byte is a known code.
    #[inline]
    #[must_use]
    pub fn command(&self) -> Option<Command> {
        Command::from_repr(self.command)
    }

    /// Encode this frame into a byte buffer.
    ///
    /// Returns the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, FrameError> {
        encode_tagged(self.command, &self.payload, buf)
    }

    /// Encode this frame into a heapless Vec.
    pub fn encode_to_vec(&self) -> Result<Vec<u8, MAX_FRAME_SIZE>, FrameError> {
        encode_tagged_to_vec(self.command, &self.payload)
    }

    /// Decode one frame from the start of `bytes`.
    ///
    /// Returns the frame and the number of bytes it occupied.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), FrameError> {
        let (command, payload, consumed) = decode_tagged(bytes)?;
        Ok((Self::new(command, payload)?, consumed))
    }
}

/// A response: status plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Outcome of the command.
    pub status: Status,
    /// Payload data (empty for most error statuses).
    pub payload: Payload,
}

impl Response {
    /// Create a response carrying `payload`.
    pub fn new(status: Status, payload: &[u8]) -> Result<Self, FrameError> {
        Ok(Self {
            status,
            payload: payload_from_slice(payload)?,
        })
    }

    /// Create a response with no payload.
    #[must_use]
    pub fn empty(status: Status) -> Self {
        Self {
            status,
            payload: Vec::new(),
        }
    }

    /// Successful response carrying `payload`.
    pub fn ok(payload: &[u8]) -> Result<Self, FrameError> {
        Self::new(Status::Ok, payload)
    }

    /// Encode this response into a byte buffer.
    ///
    /// Returns the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, FrameError> {
        encode_tagged(self.status.as_u8(), &self.payload, buf)
    }

    /// Encode this response into a heapless Vec.
    pub fn encode_to_vec(&self) -> Result<Vec<u8, MAX_FRAME_SIZE>, FrameError> {
        encode_tagged_to_vec(self.status.as_u8(), &self.payload)
    }

    /// Decode one response from the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), FrameError> {
        let (status, payload, consumed) = decode_tagged(bytes)?;
        let status = Status::from_repr(status).ok_or(FrameError::InvalidFrame)?;
        Ok((Self::new(status, payload)?, consumed))
    }
}

fn payload_from_slice(data: &[u8]) -> Result<Payload, FrameError> {
    Vec::from_slice(data).map_err(|_| FrameError::PayloadTooLarge)
}

/// Write `[sync][tag][len][payload][crc]` into `buf`.
fn encode_tagged(tag: u8, payload: &[u8], buf: &mut [u8]) -> Result<usize, FrameError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge);
    }

    let frame_len = FRAME_OVERHEAD + payload.len();
    if buf.len() < frame_len {
        return Err(FrameError::BufferTooSmall);
    }

    let payload_end = HEADER_SIZE + payload.len();
    buf[0] = SYNC_BYTE;
    buf[1] = tag;
    buf[2..HEADER_SIZE].copy_from_slice(&(payload.len() as u16).to_le_bytes());
    buf[HEADER_SIZE..payload_end].copy_from_slice(payload);

    let crc = calculate_crc16(&buf[1..payload_end]);
    buf[payload_end..frame_len].copy_from_slice(&crc.to_le_bytes());

    Ok(frame_len)
}

fn encode_tagged_to_vec(tag: u8, payload: &[u8]) -> Result<Vec<u8, MAX_FRAME_SIZE>, FrameError> {
    let mut vec = Vec::new();
    vec.resize(FRAME_OVERHEAD + payload.len(), 0)
        .map_err(|_| FrameError::PayloadTooLarge)?;
    let len = encode_tagged(tag, payload, &mut vec)?;
    vec.truncate(len);
    Ok(vec)
}

/// Parse `[sync][tag][len][payload][crc]` from the start of `bytes`.
///
/// Returns the tag, the payload slice and the total bytes consumed.
fn decode_tagged(bytes: &[u8]) -> Result<(u8, &[u8], usize), FrameError> {
    match bytes.first() {
        None => return Err(FrameError::Incomplete),
        Some(&SYNC_BYTE) => {}
        Some(_) => return Err(FrameError::InvalidFrame),
    }

    if bytes.len() < HEADER_SIZE {
        return Err(FrameError::Incomplete);
    }

    let tag = bytes[1];
    let length = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    if length > MAX_PAYLOAD_SIZE {
        return Err(FrameError::InvalidFrame);
    }

    let payload_end = HEADER_SIZE + length;
    let frame_end = payload_end + CRC_SIZE;
    if bytes.len() < frame_end {
        return Err(FrameError::Incomplete);
    }

    let received = u16::from_le_bytes([bytes[payload_end], bytes[payload_end + 1]]);
    if calculate_crc16(&bytes[1..payload_end]) != received {
        return Err(FrameError::CrcMismatch);
    }

    Ok((tag, &bytes[HEADER_SIZE..payload_end], frame_end))
}
