//! The abstract interface the device-side core consumes instead of a
//! concrete UART peripheral. A real port supplies an implementation backed
//! by `embedded-hal`'s blocking `Write`; tests supply an in-memory one.

/// Byte-oriented transmit side of the UART. Mirrors the original
/// `HardwareSerial::write(buffer, size)` contract: returns how many bytes
/// were actually written, so a short write can be detected without the
/// framer needing to know anything about the underlying peripheral.
pub trait DeviceLink {
    fn write(&mut self, bytes: &[u8]) -> usize;
}

/// An in-memory `DeviceLink` used throughout the test suite. Can be told to
/// truncate writes to simulate the `send_header`/`send_payload` short-write
/// failure mode.
#[derive(Default)]
pub struct LoopbackLink {
    pub written: Vec<u8>,
    pub max_write: Option<usize>,
}

impl LoopbackLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(max_write: usize) -> Self {
        Self {
            written: Vec::new(),
            max_write: Some(max_write),
        }
    }
}

impl DeviceLink for LoopbackLink {
    fn write(&mut self, bytes: &[u8]) -> usize {
        let n = match self.max_write {
            Some(max) => bytes.len().min(max),
            None => bytes.len(),
        };
        self.written.extend_from_slice(&bytes[..n]);
        n
    }
}
