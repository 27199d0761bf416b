//! Binary serial protocol for the tuffpad configurator link.
//!
//! This crate provides everything needed to speak the device's
//! request/response protocol:
//!
//! - **Codes**: [`Command`] and [`Status`] wire codes
//! - **Frames**: [`Frame`] (request) and [`Response`], slice encode/decode
//! - **CRC**: [`calculate_crc16`] and [`FrameCrc`]
//! - **Streams**: [`read_frame`], [`write_response`] and [`write_frame`] over
//!   `embedded-io-async` byte streams
//!
//! # Frame Format
//!
//! ```text
//! ┌──────┬─────────┬─────────┬─────────────┬──────────┐
//! │ SYNC │ CMD/STS │ LEN     │ PAYLOAD     │ CRC16    │
//! │ 0xAA │ 1B      │ 2B LE   │ 0–4096B     │ 2B LE    │
//! └──────┴─────────┴─────────┴─────────────┴──────────┘
//! ```
//!
//! The CRC is CRC16-CCITT (polynomial `0x1021`, seed `0xFFFF`, no final XOR)
//! over everything between the sync byte and the CRC itself.
//!
//! # Example
//!
//! ```
//! use tuffpad_proto::{Command, Frame};
//!
//! let frame = Frame::new(Command::Ping, b"hello").unwrap();
//! let bytes = frame.encode_to_vec().unwrap();
//! assert_eq!(bytes[0], 0xAA);
//!
//! let (decoded, _) = Frame::decode(&bytes).unwrap();
//! assert_eq!(decoded.command(), Some(Command::Ping));
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)
//!
//! # No-std Support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod codes;
pub mod crc;
pub mod frame;
pub mod stream;

// Re-export types at crate root for convenience
pub use codes::{Command, Status};
pub use crc::{calculate_crc16, FrameCrc};
pub use frame::{
    Frame, FrameError, Payload, Response, CRC_SIZE, FRAME_OVERHEAD, HEADER_SIZE, MAX_FRAME_SIZE,
    MAX_PAYLOAD_SIZE, SYNC_BYTE,
};
pub use stream::{read_frame, write_frame, write_response, ReadError, WriteError};
