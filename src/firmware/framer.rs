//! Device-side frame emission: builds and writes the 6-byte header,
//! optional payload, and the `0xFF` sync preamble. §4.2 of the spec.

use crate::firmware::link::DeviceLink;
use crate::protocol::header::{FrameHeader, HEADER_SIZE};
use crate::protocol::MAX_SYNC_SEQUENCE;

/// Owns the live sequence counter. Constructed once and passed by `&mut`
/// reference into the dispatch loop and every device handler — there is no
/// process-wide global sequence counter (§9, "Global singletons").
pub struct Framer<L: DeviceLink> {
    link: L,
    seq_num: u16,
}

impl<L: DeviceLink> Framer<L> {
    pub fn new(link: L) -> Self {
        Self { link, seq_num: 0 }
    }

    pub fn seq_num(&self) -> u16 {
        self.seq_num
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Builds a header for `(type_id, cmd_id)` with the given
    /// `payload_size` (`0` for ACK, `-1` for NAK, `>0` for a typed
    /// payload), stamps the live sequence number, and writes all 6 bytes.
    /// The sequence counter advances whether or not the write succeeds —
    /// there is no retry, and a short write is itself detected by the host
    /// as desync.
    pub fn send_header(&mut self, type_id: u8, cmd_id: u8, payload_size: i16) -> bool {
        let header = FrameHeader::new(type_id, cmd_id, self.seq_num, payload_size);
        self.seq_num = self.seq_num.wrapping_add(1);
        let bytes = header.to_bytes();
        self.link.write(&bytes) == HEADER_SIZE
    }

    pub fn send_payload(&mut self, payload: &[u8]) -> bool {
        if payload.is_empty() {
            return true;
        }
        self.link.write(payload) == payload.len()
    }

    /// Writes `n` bytes of `0xFF` and resets the sequence counter to 0.
    /// This is the *only* legal way to reset `seq_num` — reachable only via
    /// `Common/Sync`.
    pub fn send_sync(&mut self, n: u8) -> bool {
        if n == 0 || n > MAX_SYNC_SEQUENCE {
            return false;
        }
        self.seq_num = 0;
        let buf = [0xFFu8; MAX_SYNC_SEQUENCE as usize];
        self.link.write(&buf[..n as usize]) == n as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::link::LoopbackLink;

    #[test]
    fn send_header_increments_seq_and_writes_six_bytes() {
        let mut f = Framer::new(LoopbackLink::new());
        assert!(f.send_header(0, 2, 0));
        assert_eq!(f.seq_num(), 1);
        assert!(f.send_header(0, 2, 0));
        assert_eq!(f.seq_num(), 2);
        assert_eq!(f.link_mut().written.len(), 12);
    }

    #[test]
    fn short_write_is_reported_as_failure_but_seq_still_advances() {
        let mut f = Framer::new(LoopbackLink::failing_after(3));
        assert!(!f.send_header(0, 2, 0));
        assert_eq!(f.seq_num(), 1, "seq still advances; no retry");
    }

    #[test]
    fn send_sync_resets_sequence_counter() {
        let mut f = Framer::new(LoopbackLink::new());
        f.send_header(0, 2, 0);
        f.send_header(0, 2, 0);
        assert_eq!(f.seq_num(), 2);
        assert!(f.send_sync(3));
        assert_eq!(f.seq_num(), 0);
        assert_eq!(&f.link_mut().written[f.link_mut().written.len() - 3..], &[0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn send_sync_rejects_out_of_range_lengths() {
        let mut f = Framer::new(LoopbackLink::new());
        assert!(!f.send_sync(0));
        assert!(!f.send_sync(9));
    }
}
