//! Reading and writing frames over an async byte stream.
//!
//! The reader consumes exactly one frame attempt per call. A bad sync byte
//! fails immediately after consuming that single byte, so a caller that
//! simply calls [`read_frame`] again resynchronizes one byte at a time.
//!
//! Writers serialize the whole frame into one contiguous buffer and hand it
//! to the transport with a single `write_all`, so a packetizing transport
//! never sees a frame split across calls.

use embedded_io_async::{Read, ReadExactError, Write};

use crate::crc::FrameCrc;
use crate::frame::{Frame, FrameError, Payload, Response, MAX_PAYLOAD_SIZE, SYNC_BYTE};

/// Error returned by [`read_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadError<E> {
    /// Bad sync byte or oversized length field.
    InvalidFrame,
    /// CRC over command, length and payload did not match.
    CrcMismatch,
    /// The stream ended in the middle of a frame.
    UnexpectedEof,
    /// Transport error, passed through unmodified.
    Io(E),
}

impl<E> From<ReadExactError<E>> for ReadError<E> {
    fn from(err: ReadExactError<E>) -> Self {
        match err {
            ReadExactError::UnexpectedEof => ReadError::UnexpectedEof,
            ReadExactError::Other(e) => ReadError::Io(e),
        }
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for ReadError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidFrame => write!(f, "invalid frame"),
            Self::CrcMismatch => write!(f, "CRC mismatch"),
            Self::UnexpectedEof => write!(f, "unexpected end of stream"),
            Self::Io(e) => write!(f, "transport error: {:?}", e),
        }
    }
}

/// Error returned by [`write_frame`] and [`write_response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteError<E> {
    /// The frame could not be encoded.
    Frame(FrameError),
    /// Transport error, passed through unmodified.
    Io(E),
}

impl<E: core::fmt::Debug> core::fmt::Display for WriteError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Frame(e) => write!(f, "encode failed: {}", e),
            Self::Io(e) => write!(f, "transport error: {:?}", e),
        }
    }
}

/// Read and validate one request frame from `stream`.
///
/// Frames whose CRC does not match are consumed and reported as
/// [`ReadError::CrcMismatch`]; they never reach the caller as data.
pub async fn read_frame<R: Read>(stream: &mut R) -> Result<Frame, ReadError<R::Error>> {
    let mut sync = [0u8; 1];
    stream.read_exact(&mut sync).await?;
    if sync[0] != SYNC_BYTE {
        return Err(ReadError::InvalidFrame);
    }

    // Command + 2-byte little-endian length
    let mut header = [0u8; 3];
    stream.read_exact(&mut header).await?;

    let command = header[0];
    let length = u16::from_le_bytes([header[1], header[2]]) as usize;
    if length > MAX_PAYLOAD_SIZE {
        return Err(ReadError::InvalidFrame);
    }

    let mut payload = Payload::new();
    payload
        .resize(length, 0)
        .map_err(|_| ReadError::InvalidFrame)?;
    stream.read_exact(&mut payload).await?;

    let mut trailer = [0u8; 2];
    stream.read_exact(&mut trailer).await?;

    let mut crc = FrameCrc::with_header(&header);
    crc.payload(&payload);
    if !crc.matches(trailer) {
        return Err(ReadError::CrcMismatch);
    }

    Ok(Frame { command, payload })
}

/// Write a response frame as one contiguous buffer, then flush.
pub async fn write_response<W: Write>(
    stream: &mut W,
    response: &Response,
) -> Result<(), WriteError<W::Error>> {
    let encoded = response.encode_to_vec().map_err(WriteError::Frame)?;
    write_contiguous(stream, &encoded).await
}

/// Write a request frame as one contiguous buffer, then flush.
///
/// Used by host-side tooling and tests; the device only writes responses.
pub async fn write_frame<W: Write>(
    stream: &mut W,
    frame: &Frame,
) -> Result<(), WriteError<W::Error>> {
    let encoded = frame.encode_to_vec().map_err(WriteError::Frame)?;
    write_contiguous(stream, &encoded).await
}

async fn write_contiguous<W: Write>(stream: &mut W, bytes: &[u8]) -> Result<(), WriteError<W::Error>> {
    stream.write_all(bytes).await.map_err(WriteError::Io)?;
    stream.flush().await.map_err(WriteError::Io)
}
