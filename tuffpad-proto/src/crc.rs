//! Frame checksum.
//!
//! The CRC covers the bytes between the sync byte and the checksum: the
//! command or status byte, the two length bytes and the payload. It is sent
//! little-endian after the payload. The algorithm is CRC-16/IBM-3740
//! (polynomial `0x1021`, seed `0xFFFF`, unreflected, no final XOR).

use crc::{Crc, Digest, CRC_16_IBM_3740};

use crate::frame::HEADER_SIZE;

const FRAME_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Checksum of a contiguous `[tag][len LE][payload]` span.
#[inline]
#[must_use]
pub fn calculate_crc16(covered: &[u8]) -> u16 {
    FRAME_CRC.checksum(covered)
}

/// Checksum built up while a frame arrives in pieces.
///
/// Seeded with the header, fed the payload, then compared against the two
/// trailer bytes as received.
pub struct FrameCrc {
    digest: Digest<'static, u16>,
}

impl FrameCrc {
    /// Start from the tag and length bytes that follow the sync byte.
    #[must_use]
    pub fn with_header(header: &[u8; HEADER_SIZE - 1]) -> Self {
        let mut digest = FRAME_CRC.digest();
        digest.update(header);
        Self { digest }
    }

    /// Add payload bytes.
    #[inline]
    pub fn payload(&mut self, chunk: &[u8]) {
        self.digest.update(chunk);
    }

    /// `true` if the little-endian `trailer` equals the accumulated checksum.
    #[must_use]
    pub fn matches(self, trailer: [u8; 2]) -> bool {
        self.digest.finalize() == u16::from_le_bytes(trailer)
    }
}
