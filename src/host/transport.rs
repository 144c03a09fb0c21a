//! The host side's view of the serial link: byte-at-a-time reads with the
//! configured read timeout, and a single writer shared between the main
//! sync thread and the watchdog bridge thread. §5: "the host side doesn't
//! need the embedded interrupt-safety machinery, just a mutex."

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Byte-oriented read/write access to the framed serial link. Implemented
/// for `Box<dyn serialport::SerialPort>`; tests implement it directly
/// against an in-memory duplex.
pub trait SerialTransport: Send {
    /// Reads one byte, respecting the configured read timeout. `Ok(None)`
    /// means the read timed out with no byte available.
    fn read_byte(&mut self) -> std::io::Result<Option<u8>>;
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;
}

impl SerialTransport for Box<dyn serialport::SerialPort> {
    fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.read_exact(&mut buf) {
            Ok(()) => Ok(Some(buf[0])),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        Write::write_all(self.as_mut(), buf)
    }
}

/// Opens the configured serial port with the given baud and VTIME-style
/// read timeout (deciseconds).
pub fn open_port(path: &std::path::Path, baud: u32, timeout_deciseconds: u8) -> serialport::Result<Box<dyn serialport::SerialPort>> {
    serialport::new(path.to_string_lossy(), baud)
        .timeout(Duration::from_millis(timeout_deciseconds as u64 * 100))
        .open()
}

/// A mutex-guarded writer shared between the sync engine (which sends
/// `Common/Time`, `RNG/FloodOn` during post-sync init) and the watchdog
/// bridge thread (which sends `Watchdog/KeepAlive`/`Deactivate`). Plays the
/// role of the original's spinlock around `device_write_command`.
#[derive(Clone)]
pub struct SharedWriter<T: SerialTransport> {
    inner: Arc<Mutex<T>>,
}

impl<T: SerialTransport> SharedWriter<T> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(transport)),
        }
    }

    /// Sends one ASCII command line, under the shared lock.
    pub fn send_command(&self, line: &str) -> std::io::Result<()> {
        let mut guard = self.inner.lock().expect("serial writer mutex poisoned");
        guard.write_all(line.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct LoopbackTransport {
        rx: VecDeque<u8>,
        pub tx: Vec<u8>,
    }

    impl SerialTransport for LoopbackTransport {
        fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
            Ok(self.rx.pop_front())
        }
        fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
            self.tx.extend_from_slice(buf);
            Ok(())
        }
    }

    #[test]
    fn shared_writer_sends_under_lock() {
        let writer = SharedWriter::new(LoopbackTransport {
            rx: VecDeque::new(),
            tx: Vec::new(),
        });
        writer.send_command("C1:1460792071\n").unwrap();
        let guard = writer.inner.lock().unwrap();
        assert_eq!(guard.tx, b"C1:1460792071\n");
    }
}
