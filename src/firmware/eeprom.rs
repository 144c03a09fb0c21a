//! The circular boot/reset event log backed by on-chip EEPROM. §4.4 of the
//! specification. Generic over an `EepromStorage` byte-block so the
//! discovery scan, append/eviction, and traversal logic are all testable
//! against an in-memory backing store.

use crate::protocol::payloads::{LogRecord, LOG_RECORD_SIZE};
use derive_more::Display;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum EepromError {
    /// Discovery found a record that is neither fully zero nor fully
    /// occupied (`time > 0 && event > 0`) — the log is corrupted.
    #[display(fmt = "EEPROM log corrupted: record at discovery offset is neither zero nor fully occupied")]
    Corrupted,
}

impl std::error::Error for EepromError {}

/// Raw byte-block access to the backing EEPROM. `capacity` must be a
/// multiple of [`LOG_RECORD_SIZE`]. Implementors need not buffer; the
/// circular log re-derives `begin`/`end` from storage content on startup.
pub trait EepromStorage {
    fn capacity(&self) -> usize;
    fn read_record(&self, offset: usize) -> [u8; LOG_RECORD_SIZE];
    fn write_record(&mut self, offset: usize, bytes: [u8; LOG_RECORD_SIZE]);
}

/// An in-memory `EepromStorage`, used by the test suite and available for a
/// hosted build that has no real EEPROM part.
pub struct MemoryEeprom {
    bytes: Vec<u8>,
}

impl MemoryEeprom {
    pub fn new(record_count: usize) -> Self {
        Self {
            bytes: vec![0u8; record_count * LOG_RECORD_SIZE],
        }
    }
}

impl EepromStorage for MemoryEeprom {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn read_record(&self, offset: usize) -> [u8; LOG_RECORD_SIZE] {
        let mut b = [0u8; LOG_RECORD_SIZE];
        b.copy_from_slice(&self.bytes[offset..offset + LOG_RECORD_SIZE]);
        b
    }

    fn write_record(&mut self, offset: usize, bytes: [u8; LOG_RECORD_SIZE]) {
        self.bytes[offset..offset + LOG_RECORD_SIZE].copy_from_slice(&bytes);
    }
}

pub struct CircularLog<S: EepromStorage> {
    storage: S,
    begin: usize,
    end: usize,
    cursor: usize,
    reverse: bool,
    limit: Option<usize>,
}

fn is_occupied(bytes: &[u8; LOG_RECORD_SIZE]) -> bool {
    let r = LogRecord::from_bytes(bytes);
    r.time > 0 && r.log_event as u8 > 0
}

fn is_zero(bytes: &[u8; LOG_RECORD_SIZE]) -> bool {
    bytes.iter().all(|&b| b == 0)
}

impl<S: EepromStorage> CircularLog<S> {
    /// Runs the cold-start discovery scan described in §4.4: walk forward
    /// from offset 0 while records are occupied; the first zero record
    /// marks `end`. A record matching neither pattern is corruption.
    pub fn discover(storage: S) -> Result<Self, EepromError> {
        let capacity = storage.capacity();
        let mut offset = 0usize;
        let mut end = None;
        while offset < capacity {
            let rec = storage.read_record(offset);
            if is_zero(&rec) {
                end = Some(offset);
                break;
            } else if is_occupied(&rec) {
                offset += LOG_RECORD_SIZE;
            } else {
                return Err(EepromError::Corrupted);
            }
        }
        let end = end.unwrap_or(0);
        let begin = (end + LOG_RECORD_SIZE) % capacity;
        let begin = if is_zero(&storage.read_record(begin)) {
            0
        } else {
            begin
        };
        let end = if begin == 0 && is_zero(&storage.read_record(0)) {
            0
        } else {
            end
        };
        Ok(Self {
            storage,
            begin,
            end,
            cursor: begin,
            reverse: false,
            limit: None,
        })
    }

    pub fn length(&self) -> usize {
        let capacity = self.storage.capacity();
        ((capacity + self.end - self.begin) % capacity) / LOG_RECORD_SIZE
    }

    /// Appends `record` at `end`, advances `end`, writes a fresh
    /// terminator, and evicts the oldest entry if the advance collided
    /// with `begin`.
    pub fn append(&mut self, record: LogRecord) {
        let capacity = self.storage.capacity();
        self.storage.write_record(self.end, record.to_bytes());
        let new_end = (self.end + LOG_RECORD_SIZE) % capacity;
        self.storage.write_record(new_end, LogRecord::empty().to_bytes());
        self.end = new_end;
        if self.end == self.begin {
            self.begin = (self.begin + LOG_RECORD_SIZE) % capacity;
        }
    }

    /// Repositions the traversal cursor to `begin` (forward) or `end`
    /// (reverse) and clears any limit from a previous pass.
    pub fn set_reverse(&mut self, reverse: bool) {
        self.reverse = reverse;
        self.limit = None;
        self.cursor = if reverse { self.end } else { self.begin };
    }

    /// Clamps the traversal to at most `n` records, snapping the starting
    /// cursor so a forward pass yields the `n` most recent records and a
    /// reverse pass yields the `n` oldest-first records. `n == 0` means "no
    /// limit" and leaves the full-length traversal untouched, matching the
    /// original `Log::set_limit`'s treatment of zero as a no-op.
    pub fn set_limit(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let capacity = self.storage.capacity();
        let total = self.length();
        let n = n.min(total);
        self.limit = Some(n);
        if self.reverse {
            self.cursor = (self.begin + n * LOG_RECORD_SIZE) % capacity;
        } else {
            self.cursor = (self.end + capacity - n * LOG_RECORD_SIZE) % capacity;
        }
    }

    /// Returns the next record in the current traversal direction, or
    /// `None` once the opposite endpoint is reached (single-pass).
    pub fn next(&mut self) -> Option<LogRecord> {
        if let Some(limit) = self.limit {
            if limit == 0 {
                return None;
            }
        }
        let capacity = self.storage.capacity();
        if self.reverse {
            if self.cursor == self.begin {
                return None;
            }
            self.cursor = (self.cursor + capacity - LOG_RECORD_SIZE) % capacity;
            if let Some(limit) = self.limit.as_mut() {
                *limit -= 1;
            }
            Some(LogRecord::from_bytes(&self.storage.read_record(self.cursor)))
        } else {
            if self.cursor == self.end {
                return None;
            }
            let record = LogRecord::from_bytes(&self.storage.read_record(self.cursor));
            self.cursor = (self.cursor + LOG_RECORD_SIZE) % capacity;
            if let Some(limit) = self.limit.as_mut() {
                *limit -= 1;
            }
            Some(record)
        }
    }

    /// Zeroes every slot and resets all pointers.
    pub fn clean(&mut self) {
        let capacity = self.storage.capacity();
        let mut offset = 0;
        while offset < capacity {
            self.storage.write_record(offset, LogRecord::empty().to_bytes());
            offset += LOG_RECORD_SIZE;
        }
        self.begin = 0;
        self.end = 0;
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::payloads::LogEvent;

    fn rec(time: i32, event: LogEvent) -> LogRecord {
        LogRecord { time, log_event: event }
    }

    #[test]
    fn discovery_on_blank_eeprom_yields_empty_log() {
        let log = CircularLog::discover(MemoryEeprom::new(8)).unwrap();
        assert_eq!(log.length(), 0);
    }

    #[test]
    fn append_then_discover_recovers_state() {
        let mut log = CircularLog::discover(MemoryEeprom::new(8)).unwrap();
        log.append(rec(100, LogEvent::Boot));
        log.append(rec(200, LogEvent::Reset));
        assert_eq!(log.length(), 2);

        let storage = log.storage;
        let recovered = CircularLog::discover(storage).unwrap();
        assert_eq!(recovered.length(), 2);
    }

    #[test]
    fn append_at_capacity_evicts_oldest() {
        // capacity 4 records -> usable 3 (one terminator slot)
        let mut log = CircularLog::discover(MemoryEeprom::new(4)).unwrap();
        log.append(rec(1, LogEvent::Boot));
        log.append(rec(2, LogEvent::Boot));
        log.append(rec(3, LogEvent::Boot));
        assert_eq!(log.length(), 3);
        log.append(rec(4, LogEvent::Reset));
        assert_eq!(log.length(), 3);

        log.set_reverse(false);
        let first = log.next().unwrap();
        assert_eq!(first.time, 2, "oldest entry (time=1) was evicted");
    }

    #[test]
    fn forward_and_reverse_traversal_visit_same_set() {
        let mut log = CircularLog::discover(MemoryEeprom::new(8)).unwrap();
        for t in [10, 20, 30] {
            log.append(rec(t, LogEvent::Boot));
        }
        log.set_reverse(false);
        let mut forward = Vec::new();
        while let Some(r) = log.next() {
            forward.push(r.time);
        }
        assert_eq!(forward, vec![10, 20, 30]);

        log.set_reverse(true);
        let mut backward = Vec::new();
        while let Some(r) = log.next() {
            backward.push(r.time);
        }
        assert_eq!(backward, vec![30, 20, 10]);
    }

    #[test]
    fn limit_clamps_to_most_recent() {
        let mut log = CircularLog::discover(MemoryEeprom::new(8)).unwrap();
        for t in [10, 20, 30] {
            log.append(rec(t, LogEvent::Boot));
        }
        log.set_reverse(false);
        log.set_limit(2);
        let mut out = Vec::new();
        while let Some(r) = log.next() {
            out.push(r.time);
        }
        assert_eq!(out, vec![20, 30]);
    }

    #[test]
    fn zero_limit_is_a_no_op_and_yields_every_record() {
        let mut log = CircularLog::discover(MemoryEeprom::new(8)).unwrap();
        for t in [10, 20, 30] {
            log.append(rec(t, LogEvent::Boot));
        }
        log.set_reverse(false);
        log.set_limit(0);
        let mut out = Vec::new();
        while let Some(r) = log.next() {
            out.push(r.time);
        }
        assert_eq!(out, vec![10, 20, 30]);
    }

    #[test]
    fn clean_resets_everything() {
        let mut log = CircularLog::discover(MemoryEeprom::new(8)).unwrap();
        log.append(rec(10, LogEvent::Boot));
        log.clean();
        assert_eq!(log.length(), 0);
        log.set_reverse(false);
        assert_eq!(log.next(), None);
    }
}
