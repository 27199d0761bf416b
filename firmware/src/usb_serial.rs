//! USB CDC-ACM serial transport for the configurator link.

use defmt::Format;
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::Builder;
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use tuffpad_core::DtrSignal;

/// Full-speed bulk endpoint size.
pub const MAX_PACKET_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum UsbSerialError {
    /// The host closed the port or the bus was reset.
    Disconnected,
    /// A packet did not fit the receive buffer.
    Overflow,
}

impl From<EndpointError> for UsbSerialError {
    fn from(err: EndpointError) -> Self {
        match err {
            EndpointError::Disabled => Self::Disconnected,
            EndpointError::BufferOverflow => Self::Overflow,
        }
    }
}

impl embedded_io_async::Error for UsbSerialError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Disconnected => ErrorKind::NotConnected,
            Self::Overflow => ErrorKind::OutOfMemory,
        }
    }
}

/// Byte stream over a CDC-ACM class.
///
/// USB moves whole packets; reads are served from the last received packet
/// and writes go out one packet per call. A full-size final packet is
/// terminated with a zero-length packet on flush so the host sees the end
/// of the transfer.
pub struct UsbSerial<'d> {
    class: CdcAcmClass<'d, Driver<'d, USB>>,
    rx: [u8; MAX_PACKET_SIZE],
    rx_pos: usize,
    rx_len: usize,
    zlp_pending: bool,
}

impl<'d> UsbSerial<'d> {
    pub fn new(class: CdcAcmClass<'d, Driver<'d, USB>>) -> Self {
        Self {
            class,
            rx: [0; MAX_PACKET_SIZE],
            rx_pos: 0,
            rx_len: 0,
            zlp_pending: false,
        }
    }

    /// Wait until the host configures the device. Drops any buffered input.
    pub async fn wait_connection(&mut self) {
        self.class.wait_connection().await;
        self.rx_pos = 0;
        self.rx_len = 0;
        self.zlp_pending = false;
    }
}

impl DtrSignal for UsbSerial<'_> {
    fn dtr(&self) -> bool {
        self.class.dtr()
    }
}

impl ErrorType for UsbSerial<'_> {
    type Error = UsbSerialError;
}

impl Read for UsbSerial<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        // Zero-length packets carry no data; keep waiting
        while self.rx_pos == self.rx_len {
            self.rx_len = self.class.read_packet(&mut self.rx).await?;
            self.rx_pos = 0;
        }
        let n = (self.rx_len - self.rx_pos).min(buf.len());
        buf[..n].copy_from_slice(&self.rx[self.rx_pos..self.rx_pos + n]);
        self.rx_pos += n;
        Ok(n)
    }
}

impl Write for UsbSerial<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        let max = usize::from(self.class.max_packet_size());
        let n = buf.len().min(max);
        self.class.write_packet(&buf[..n]).await?;
        self.zlp_pending = n == max;
        Ok(n)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        if self.zlp_pending {
            self.class.write_packet(&[]).await?;
            self.zlp_pending = false;
        }
        Ok(())
    }
}

/// Configure the CDC-ACM class in the USB builder.
///
/// Returns the serial stream for use by the config task.
pub fn configure_usb_serial<'d>(
    builder: &mut Builder<'d, Driver<'d, USB>>,
    state: &'d mut State<'d>,
) -> UsbSerial<'d> {
    UsbSerial::new(CdcAcmClass::new(builder, state, MAX_PACKET_SIZE as u16))
}
