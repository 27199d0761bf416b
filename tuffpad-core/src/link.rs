//! ProtocolLink: the half-duplex request/response loop over a byte stream.

use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{Read, Write};
use tuffpad_proto::{read_frame, write_response, ReadError, WriteError};

use crate::dispatcher::FrameHandler;

/// Transports that can tell whether the host has opened the port.
pub trait DtrSignal {
    /// `true` while the host asserts DTR.
    fn dtr(&self) -> bool;
}

/// Where the link is in its read cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    /// Waiting for the host to raise DTR before the first frame.
    WaitingForHost,
    /// Expecting a sync byte.
    WaitSync,
    /// The last attempt was dropped; the next call starts over at the
    /// following byte.
    Resync,
}

/// Timing of the startup handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkConfig {
    /// Give up waiting for DTR after this long.
    pub dtr_timeout_ms: u32,
    /// DTR polling interval.
    pub dtr_poll_ms: u32,
    /// Pause after the wait before the first read, so the host side of the
    /// port is ready for responses.
    pub settle_ms: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            dtr_timeout_ms: 2000,
            dtr_poll_ms: 10,
            settle_ms: 100,
        }
    }
}

/// Counters since the link was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    /// Frames that passed framing and CRC checks.
    pub frames: u32,
    pub responses: u32,
    /// Attempts dropped for a bad sync byte or oversized length.
    pub invalid: u32,
    pub crc_errors: u32,
    /// Transport errors and truncated frames, in either direction.
    pub io_errors: u32,
}

/// Error from one [`ProtocolLink::process_one`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError<E> {
    /// The request was dropped; nothing was sent.
    Read(ReadError<E>),
    /// The response could not be sent.
    Write(WriteError<E>),
}

impl<E: core::fmt::Debug> core::fmt::Display for LinkError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Read(e) => write!(f, "read: {}", e),
            Self::Write(e) => write!(f, "write: {}", e),
        }
    }
}

/// Owns the stream and the handler and shuttles frames between them.
///
/// One frame is read, handled and answered before the next is read. Framing
/// and transport errors never end the loop; the failed attempt is dropped.
pub struct ProtocolLink<S, H> {
    stream: S,
    handler: H,
    dtr: Option<fn(&S) -> bool>,
    config: LinkConfig,
    state: LinkState,
    stats: LinkStats,
}

impl<S: Read + Write, H: FrameHandler> ProtocolLink<S, H> {
    /// Create a link over a stream without DTR reporting.
    pub fn new(stream: S, handler: H, config: LinkConfig) -> Self {
        Self {
            stream,
            handler,
            dtr: None,
            config,
            state: LinkState::WaitSync,
            stats: LinkStats::default(),
        }
    }

    /// Create a link that waits for DTR in [`wait_for_host`](Self::wait_for_host).
    pub fn with_dtr(stream: S, handler: H, config: LinkConfig) -> Self
    where
        S: DtrSignal,
    {
        Self {
            stream,
            handler,
            dtr: Some(S::dtr),
            config,
            state: LinkState::WaitingForHost,
            stats: LinkStats::default(),
        }
    }

    /// Wait until the host raises DTR or the timeout passes, then settle.
    ///
    /// Returns whether DTR was seen. Links without DTR reporting return
    /// `true` after the settle delay.
    pub async fn wait_for_host<D: DelayNs>(&mut self, delay: &mut D) -> bool {
        let connected = match self.dtr {
            None => true,
            Some(dtr) => {
                let mut waited = 0;
                loop {
                    if dtr(&self.stream) {
                        break true;
                    }
                    if waited >= self.config.dtr_timeout_ms {
                        break false;
                    }
                    delay.delay_ms(self.config.dtr_poll_ms).await;
                    waited += self.config.dtr_poll_ms;
                }
            }
        };

        if !connected {
            warn!("no DTR after {} ms, starting anyway", self.config.dtr_timeout_ms);
        }
        delay.delay_ms(self.config.settle_ms).await;
        self.state = LinkState::WaitSync;
        connected
    }

    /// Read one frame, handle it and write the response.
    pub async fn process_one(&mut self) -> Result<(), LinkError<S::Error>> {
        self.state = LinkState::WaitSync;

        let frame = match read_frame(&mut self.stream).await {
            Ok(frame) => frame,
            Err(err) => {
                self.state = LinkState::Resync;
                match err {
                    ReadError::InvalidFrame => bump(&mut self.stats.invalid),
                    ReadError::CrcMismatch => {
                        bump(&mut self.stats.crc_errors);
                        warn!("dropped frame: CRC mismatch");
                    }
                    ReadError::UnexpectedEof | ReadError::Io(_) => {
                        bump(&mut self.stats.io_errors);
                        warn!("dropped frame: transport error");
                    }
                }
                return Err(LinkError::Read(err));
            }
        };
        bump(&mut self.stats.frames);

        let response = self.handler.handle(&frame);
        if let Err(err) = write_response(&mut self.stream, &response).await {
            bump(&mut self.stats.io_errors);
            warn!("response not sent");
            return Err(LinkError::Write(err));
        }
        bump(&mut self.stats.responses);
        Ok(())
    }

    /// Serve requests forever.
    pub async fn run(&mut self) -> ! {
        loop {
            let _ = self.process_one().await;
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Get a reference to the handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Get a mutable reference to the handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Get a mutable reference to the stream.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Decompose the link into its stream and handler.
    pub fn into_parts(self) -> (S, H) {
        (self.stream, self.handler)
    }
}

/// Counters wrap rather than overflow on a link that runs for months.
fn bump(counter: &mut u32) {
    *counter = counter.wrapping_add(1);
}
