//! Host-side sync state machine: Unknown → Sync → Header → Payload. §4.7.
//!
//! Drives the serial link one byte at a time. Side effects (opening the
//! port, sending `Common/Sync`, post-sync `Common/Time`/`RNG/FloodOn`) are
//! left to the caller, which reacts to the returned [`SyncOutcome`] — this
//! keeps the state machine itself testable against a plain byte source.

use std::time::{Duration, Instant};

use crate::host::transport::SerialTransport;
use crate::protocol::header::{FrameHeader, HEADER_SIZE};
use crate::protocol::{command::common_cmd, DeviceKind, RX_BUFFER_CAPACITY};

pub const SYNC_LEN: u8 = 3;
pub const SYNC_TIMEOUT: Duration = Duration::from_millis(2000);
pub const SYNC_RETRY: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Unknown,
    Sync,
    Header,
    Payload,
}

#[derive(Debug, PartialEq)]
pub enum SyncOutcome {
    /// No event this poll — no byte was available, or a byte was merely
    /// buffered.
    Pending,
    /// Just transitioned to `Unknown`. The caller must (re)open the
    /// serial port, send `RNG/FloodOff`, drain stray bytes, then send
    /// `Common/Sync` with `SYNC_LEN`.
    NeedsResync,
    /// Sync preamble observed. The caller must send `Common/Time` and
    /// `RNG/FloodOn` (§4.8); failure of either aborts the daemon.
    SyncAchieved,
    /// A header decoded and passed the sequence check.
    Header(FrameHeader),
    /// A payload decoded for the header most recently reported.
    Payload(FrameHeader, Vec<u8>),
    /// `payload_size < 0`: the device reported a handler failure.
    DeviceError(FrameHeader),
    /// `Common/Reset`'s ACK arrived unsolicited: the device rebooted on
    /// its own.
    UnsolicitedReboot,
    /// Sequence mismatch, or a buffer overflow outside `Sync`.
    Desync,
    /// `SYNC_RETRY` attempts exhausted — the daemon must abort.
    Aborted,
}

pub struct SyncEngine {
    status: Status,
    expected_seq: u16,
    sync_started_at: Option<Instant>,
    sync_retries: u32,
    rx_buffer: Vec<u8>,
    resync_requested: bool,
    post_sync_done: bool,
    header_pending: Option<FrameHeader>,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            status: Status::Unknown,
            expected_seq: 0,
            sync_started_at: None,
            sync_retries: 0,
            rx_buffer: Vec::with_capacity(RX_BUFFER_CAPACITY),
            resync_requested: false,
            post_sync_done: false,
            header_pending: None,
        }
    }

    fn enter_unknown(&mut self) {
        self.status = Status::Unknown;
        self.resync_requested = false;
        self.post_sync_done = false;
        self.rx_buffer.clear();
        self.header_pending = None;
    }

    /// Advances the state machine by (at most) one byte read from
    /// `transport`.
    pub fn poll(&mut self, transport: &mut impl SerialTransport) -> std::io::Result<SyncOutcome> {
        match self.status {
            Status::Unknown => {
                if self.resync_requested {
                    // Caller already sent the resync commands; start
                    // reading for the preamble.
                    self.status = Status::Sync;
                    self.sync_started_at = Some(Instant::now());
                    self.rx_buffer.clear();
                    self.expected_seq = 0;
                    Ok(SyncOutcome::Pending)
                } else {
                    self.resync_requested = true;
                    Ok(SyncOutcome::NeedsResync)
                }
            }
            Status::Sync => Ok(self.poll_sync(transport)?),
            Status::Header => Ok(self.poll_header(transport)?),
            Status::Payload => Ok(self.poll_payload(transport)?),
        }
    }

    fn poll_sync(&mut self, transport: &mut impl SerialTransport) -> std::io::Result<SyncOutcome> {
        let Some(byte) = transport.read_byte()? else {
            let elapsed = self.sync_started_at.map(|t| t.elapsed()).unwrap_or_default();
            if elapsed > SYNC_TIMEOUT {
                self.sync_retries += 1;
                if self.sync_retries >= SYNC_RETRY {
                    return Ok(SyncOutcome::Aborted);
                }
                self.enter_unknown();
            }
            return Ok(SyncOutcome::Pending);
        };

        self.rx_buffer.push(byte);
        if self.rx_buffer.len() > RX_BUFFER_CAPACITY {
            // Overflow during Sync just restarts the attempt, no retry charged.
            self.rx_buffer.clear();
            return Ok(SyncOutcome::Pending);
        }

        let len = self.rx_buffer.len();
        let tail_len = SYNC_LEN as usize;
        if len >= tail_len && self.rx_buffer[len - tail_len..].iter().all(|&b| b == 0xFF) {
            self.status = Status::Header;
            self.rx_buffer.clear();
            if !self.post_sync_done {
                self.post_sync_done = true;
                return Ok(SyncOutcome::SyncAchieved);
            }
        }
        Ok(SyncOutcome::Pending)
    }

    fn poll_header(&mut self, transport: &mut impl SerialTransport) -> std::io::Result<SyncOutcome> {
        let Some(byte) = transport.read_byte()? else {
            return Ok(SyncOutcome::Pending);
        };
        self.rx_buffer.push(byte);
        if self.rx_buffer.len() > RX_BUFFER_CAPACITY {
            self.enter_unknown();
            return Ok(SyncOutcome::Desync);
        }
        if self.rx_buffer.len() < HEADER_SIZE {
            return Ok(SyncOutcome::Pending);
        }

        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&self.rx_buffer[..HEADER_SIZE]);
        self.rx_buffer.clear();
        let header = FrameHeader::from_bytes(&raw);

        if header.seq_num != self.expected_seq {
            self.enter_unknown();
            return Ok(SyncOutcome::Desync);
        }
        self.expected_seq = self.expected_seq.wrapping_add(1);

        if header.payload_size < 0 {
            return Ok(SyncOutcome::DeviceError(header));
        }
        if header.payload_size == 0 {
            if header.device_kind() == DeviceKind::Common && header.cmd_id == common_cmd::RESET {
                self.enter_unknown();
                return Ok(SyncOutcome::UnsolicitedReboot);
            }
            return Ok(SyncOutcome::Header(header));
        }

        if header.payload_size as usize > RX_BUFFER_CAPACITY {
            self.enter_unknown();
            return Ok(SyncOutcome::Desync);
        }
        self.header_pending = Some(header);
        self.status = Status::Payload;
        Ok(SyncOutcome::Header(header))
    }

    fn poll_payload(&mut self, transport: &mut impl SerialTransport) -> std::io::Result<SyncOutcome> {
        let Some(byte) = transport.read_byte()? else {
            return Ok(SyncOutcome::Pending);
        };
        self.rx_buffer.push(byte);
        let header = self.header_pending.expect("Payload state always has a pending header");
        if self.rx_buffer.len() > RX_BUFFER_CAPACITY {
            self.enter_unknown();
            return Ok(SyncOutcome::Desync);
        }
        if self.rx_buffer.len() < header.payload_size as usize {
            return Ok(SyncOutcome::Pending);
        }
        let payload = std::mem::take(&mut self.rx_buffer);
        self.status = Status::Header;
        self.header_pending = None;
        Ok(SyncOutcome::Payload(header, payload))
    }
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct FixedTransport(VecDeque<u8>);
    impl SerialTransport for FixedTransport {
        fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
            Ok(self.0.pop_front())
        }
        fn write_all(&mut self, _buf: &[u8]) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn fresh_engine_requests_resync_first() {
        let mut engine = SyncEngine::new();
        let mut transport = FixedTransport(VecDeque::new());
        assert_eq!(engine.poll(&mut transport).unwrap(), SyncOutcome::NeedsResync);
    }

    #[test]
    fn sync_preamble_transitions_to_header_once() {
        let mut engine = SyncEngine::new();
        let mut transport = FixedTransport(VecDeque::from(vec![0xFF, 0xFF, 0xFF]));
        assert_eq!(engine.poll(&mut transport).unwrap(), SyncOutcome::NeedsResync);
        assert_eq!(engine.poll(&mut transport).unwrap(), SyncOutcome::Pending); // -> Sync
        assert_eq!(engine.poll(&mut transport).unwrap(), SyncOutcome::Pending);
        assert_eq!(engine.poll(&mut transport).unwrap(), SyncOutcome::Pending);
        assert_eq!(engine.poll(&mut transport).unwrap(), SyncOutcome::SyncAchieved);
    }

    fn synced_engine(extra_bytes: Vec<u8>) -> (SyncEngine, FixedTransport) {
        let mut engine = SyncEngine::new();
        let mut bytes = vec![0xFF, 0xFF, 0xFF];
        bytes.extend(extra_bytes);
        let mut transport = FixedTransport(VecDeque::from(bytes));
        engine.poll(&mut transport).unwrap(); // NeedsResync
        engine.poll(&mut transport).unwrap(); // -> Sync
        for _ in 0..3 {
            engine.poll(&mut transport).unwrap();
        }
        (engine, transport)
    }

    #[test]
    fn ack_header_is_reported_and_stays_in_header_state() {
        let header = FrameHeader::new(DeviceKind::Common.discriminant(), common_cmd::TIME, 0, 0);
        let (mut engine, mut transport) = synced_engine(header.to_bytes().to_vec());
        for _ in 0..5 {
            engine.poll(&mut transport).unwrap();
        }
        assert_eq!(
            engine.poll(&mut transport).unwrap(),
            SyncOutcome::Header(header)
        );
    }

    #[test]
    fn sequence_mismatch_forces_desync() {
        let header = FrameHeader::new(DeviceKind::Common.discriminant(), common_cmd::STATUS, 7, 0);
        let (mut engine, mut transport) = synced_engine(header.to_bytes().to_vec());
        for _ in 0..6 {
            let _ = engine.poll(&mut transport).unwrap();
        }
        let last = (0..1).map(|_| engine.poll(&mut transport).unwrap()).last().unwrap();
        assert_eq!(last, SyncOutcome::Desync);
    }

    #[test]
    fn unsolicited_reset_ack_reports_reboot() {
        let header = FrameHeader::new(DeviceKind::Common.discriminant(), common_cmd::RESET, 0, 0);
        let (mut engine, mut transport) = synced_engine(header.to_bytes().to_vec());
        for _ in 0..5 {
            engine.poll(&mut transport).unwrap();
        }
        assert_eq!(
            engine.poll(&mut transport).unwrap(),
            SyncOutcome::UnsolicitedReboot
        );
    }

    #[test]
    fn payload_bytes_are_accumulated_and_reported() {
        let header = FrameHeader::new(DeviceKind::Rng.discriminant(), 2, 0, 3);
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);
        let (mut engine, mut transport) = synced_engine(bytes);
        for _ in 0..6 {
            engine.poll(&mut transport).unwrap();
        }
        // 6 bytes consumed the header (-> Header event with payload pending).
        let mut last = SyncOutcome::Pending;
        for _ in 0..3 {
            last = engine.poll(&mut transport).unwrap();
        }
        assert_eq!(last, SyncOutcome::Payload(header, vec![1, 2, 3]));
    }
}
