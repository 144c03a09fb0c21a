//! The host-side watchdog bridge: a dedicated thread that turns bytes
//! arriving on a FIFO into rate-limited `Watchdog/KeepAlive` commands.
//! §4.10 of the specification.

use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::host::transport::{SerialTransport, SharedWriter};

/// Only this byte, received while `!nowayout`, marks the bridge safe to
/// close without leaving the device watchdog running.
const MAGIC_CHAR: u8 = b'V';

/// Rate limit on `Watchdog/KeepAlive` sends, regardless of how often the
/// FIFO writer pokes us.
pub const MIN_KEEP_ALIVE_INTERVAL: Duration = Duration::from_millis(1000);

/// Delay between retrying to open the FIFO when no writer is present yet.
const REOPEN_BACKOFF: Duration = Duration::from_millis(200);

pub struct WatchdogBridge<T: SerialTransport> {
    fifo_path: PathBuf,
    nowayout: bool,
    writer: SharedWriter<T>,
    last_keep_alive: Option<Instant>,
    ok_to_close: bool,
}

impl<T: SerialTransport> WatchdogBridge<T> {
    pub fn new(fifo_path: PathBuf, nowayout: bool, writer: SharedWriter<T>) -> Self {
        Self {
            fifo_path,
            nowayout,
            writer,
            last_keep_alive: None,
            ok_to_close: false,
        }
    }

    /// Runs the bridge loop until `running` is cleared. Checked only
    /// between FIFO (re)opens — per §5, cancellation of this thread while
    /// it's blocked in a read is asynchronous and expected at shutdown.
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) {
            let file = match std::fs::File::open(&self.fifo_path) {
                Ok(f) => f,
                Err(_) => {
                    std::thread::sleep(REOPEN_BACKOFF);
                    continue;
                }
            };
            self.ok_to_close = false;
            self.read_until_eof(file);
            self.release();
        }
    }

    fn read_until_eof(&mut self, mut reader: impl Read) {
        let mut byte = [0u8; 1];
        loop {
            match reader.read(&mut byte) {
                Ok(0) => break, // writer closed its end
                Ok(_) => {
                    if !self.nowayout {
                        self.ok_to_close = byte[0] == MAGIC_CHAR;
                    }
                    self.keep_alive();
                }
                Err(_) => break,
            }
        }
    }

    /// Every received byte refreshes the device watchdog, but the actual
    /// serial send is rate-limited to at most once per
    /// `MIN_KEEP_ALIVE_INTERVAL`.
    fn keep_alive(&mut self) {
        let now = Instant::now();
        let due = match self.last_keep_alive {
            Some(last) => now.duration_since(last) >= MIN_KEEP_ALIVE_INTERVAL,
            None => true,
        };
        if due && self.writer.send_command("W0\n").is_ok() {
            self.last_keep_alive = Some(now);
        }
    }

    /// EOF handling: deactivate the device watchdog only if the magic byte
    /// was the last thing seen; otherwise leave it running and complain.
    fn release(&mut self) {
        if self.ok_to_close {
            let _ = self.writer.send_command("W1\n");
        } else {
            log::error!("WDT: device closed unexpectedly - timer will not stop");
        }
        self.ok_to_close = false;
    }
}
