//! The 6-byte packed frame header that precedes every device-to-host payload.
//!
//! Layout (little-endian, 1-byte aligned): `type_id: u8, cmd_id: u8, seq_num: u16,
//! payload_size: i16`. We do not rely on `#[repr(packed)]` field access (which is
//! unsafe to reference directly) — the header is always moved across the wire
//! through `to_bytes`/`from_bytes`.

use std::fmt;

pub const HEADER_SIZE: usize = 6;

/// Which of the four logical sub-devices a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Common = 0,
    Watchdog = 1,
    Rng = 2,
    RngSend = 3,
    Radio = 4,
    RadioForward = 5,
    Unknown = 6,
}

impl DeviceKind {
    pub fn from_u8(v: u8) -> DeviceKind {
        match v {
            0 => DeviceKind::Common,
            1 => DeviceKind::Watchdog,
            2 => DeviceKind::Rng,
            3 => DeviceKind::RngSend,
            4 => DeviceKind::Radio,
            5 => DeviceKind::RadioForward,
            _ => DeviceKind::Unknown,
        }
    }

    pub fn discriminant(self) -> u8 {
        self as u8
    }

    /// Name used in NAK/header log lines, mirroring the original daemon's
    /// `command_list[type][0]` lookup table.
    pub fn name(self) -> &'static str {
        match self {
            DeviceKind::Common => "COMMON",
            DeviceKind::Watchdog => "WDT",
            DeviceKind::Rng => "RNG",
            DeviceKind::RngSend => "RNG-SEND",
            DeviceKind::Radio => "RADIO",
            DeviceKind::RadioForward => "RADIO-FORWARD",
            DeviceKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub type_id: u8,
    pub cmd_id: u8,
    pub seq_num: u16,
    pub payload_size: i16,
}

impl FrameHeader {
    pub fn new(type_id: u8, cmd_id: u8, seq_num: u16, payload_size: i16) -> Self {
        Self {
            type_id,
            cmd_id,
            seq_num,
            payload_size,
        }
    }

    pub fn device_kind(&self) -> DeviceKind {
        DeviceKind::from_u8(self.type_id)
    }

    pub fn is_nak(&self) -> bool {
        self.payload_size < 0
    }

    pub fn is_ack(&self) -> bool {
        self.payload_size == 0
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.type_id;
        buf[1] = self.cmd_id;
        buf[2..4].copy_from_slice(&self.seq_num.to_le_bytes());
        buf[4..6].copy_from_slice(&self.payload_size.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        Self {
            type_id: buf[0],
            cmd_id: buf[1],
            seq_num: u16::from_le_bytes([buf[2], buf[3]]),
            payload_size: i16::from_le_bytes([buf[4], buf[5]]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let h = FrameHeader::new(2, 5, 0xBEEF, -1);
        let bytes = h.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(FrameHeader::from_bytes(&bytes), h);
    }

    #[test]
    fn payload_size_sign_selects_ack_nak() {
        assert!(FrameHeader::new(0, 0, 0, 0).is_ack());
        assert!(FrameHeader::new(0, 0, 0, -1).is_nak());
        assert!(!FrameHeader::new(0, 0, 0, 4).is_ack());
    }

    #[test]
    fn device_kind_round_trips_known_values() {
        for (v, k) in [
            (0u8, DeviceKind::Common),
            (1, DeviceKind::Watchdog),
            (2, DeviceKind::Rng),
            (3, DeviceKind::RngSend),
            (4, DeviceKind::Radio),
            (5, DeviceKind::RadioForward),
        ] {
            assert_eq!(DeviceKind::from_u8(v), k);
        }
        assert_eq!(DeviceKind::from_u8(200), DeviceKind::Unknown);
    }
}
