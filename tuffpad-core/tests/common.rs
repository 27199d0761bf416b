#![allow(dead_code)]

// Shared helpers for the integration tests: a blocking executor, an
// in-memory byte stream and a RAM NOR flash.
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use embedded_storage::nor_flash::{
    ErrorType as FlashErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use tuffpad_proto::{Frame, Response};

pub const FLASH_SECTOR_SIZE: usize = 4096;
pub const WORD_SIZE: usize = 4;

// Helper to run a future to completion (simple blocking executor)
pub fn block_on<F: Future>(mut f: F) -> F::Output {
    fn noop_raw_waker() -> RawWaker {
        fn noop(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            noop_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        RawWaker::new(core::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(noop_raw_waker()) };
    let mut cx = Context::from_waker(&waker);

    // SAFETY: We don't move f after pinning
    let mut f = unsafe { Pin::new_unchecked(&mut f) };

    loop {
        match f.as_mut().poll(&mut cx) {
            Poll::Ready(result) => return result,
            Poll::Pending => panic!("Mock future returned Pending unexpectedly"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamError;

impl embedded_io_async::Error for StreamError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Host side of a serial port: bytes queued by the test are read by the
/// device, bytes the device writes are collected.
#[derive(Default)]
pub struct HostPort {
    pub rx: Vec<u8>,
    pub pos: usize,
    pub tx: Vec<u8>,
    pub writes: usize,
}

impl HostPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, command: impl Into<u8>, payload: &[u8]) {
        let frame = Frame::new(command, payload).unwrap();
        self.rx.extend_from_slice(&frame.encode_to_vec().unwrap());
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.rx.extend_from_slice(bytes);
    }

    /// Decode every response written so far.
    pub fn responses(&self) -> Vec<Response> {
        let mut out = Vec::new();
        let mut rest = &self.tx[..];
        while !rest.is_empty() {
            let (response, used) = Response::decode(rest).unwrap();
            out.push(response);
            rest = &rest[used..];
        }
        out
    }

    pub fn pending(&self) -> usize {
        self.rx.len() - self.pos
    }
}

impl ErrorType for HostPort {
    type Error = StreamError;
}

impl Read for HostPort {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        // USB full-speed packets are at most 64 bytes
        let n = buf.len().min(self.rx.len() - self.pos).min(64);
        buf[..n].copy_from_slice(&self.rx[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for HostPort {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.writes += 1;
        self.tx.extend_from_slice(buf);
        Ok(buf.len())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
    Erase { offset: u32, len: usize },
}

/// RAM NOR flash: erase sets bytes to 0xFF, programming can only clear bits.
#[derive(Default)]
pub struct Flash {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    /// Fail any write that touches this offset.
    pub fail_write_at: Option<u32>,
    pub operations: Vec<Operation>,
}

impl Flash {
    pub fn new(pages: usize) -> Self {
        Self {
            buf: vec![0xffu8; FLASH_SECTOR_SIZE * pages],
            fail_after_operation: usize::MAX,
            ..Default::default()
        }
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
        self.fail_write_at = None;
    }

    pub fn erases(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Erase { .. }))
            .count()
    }

    fn check_fault(&self) -> Result<(), FlashError> {
        if self.operations.len() >= self.fail_after_operation {
            return Err(FlashError);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashError;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

impl FlashErrorType for Flash {
    type Error = FlashError;
}

impl ReadNorFlash for Flash {
    const READ_SIZE: usize = WORD_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        assert_eq!(offset % Self::READ_SIZE as u32, 0);
        assert_eq!(bytes.len() % Self::READ_SIZE, 0);
        self.check_fault()?;
        self.operations.push(Operation::Read {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl NorFlash for Flash {
    const WRITE_SIZE: usize = WORD_SIZE;
    const ERASE_SIZE: usize = FLASH_SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert_eq!(from % Self::ERASE_SIZE as u32, 0);
        assert_eq!(to % Self::ERASE_SIZE as u32, 0);
        self.check_fault()?;
        self.operations.push(Operation::Erase {
            offset: from,
            len: (to - from) as usize,
        });

        self.buf[from as usize..to as usize].fill(0xff);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        assert_eq!(offset % Self::WRITE_SIZE as u32, 0);
        assert_eq!(bytes.len() % Self::WRITE_SIZE, 0);
        self.check_fault()?;
        if let Some(at) = self.fail_write_at {
            if (offset..offset + bytes.len() as u32).contains(&at) {
                return Err(FlashError);
            }
        }
        self.operations.push(Operation::Write {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        for (cell, byte) in self.buf[offset..offset + bytes.len()].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}
