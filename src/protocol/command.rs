//! ASCII command grammar and the byte-at-a-time parser state machine shared by
//! the device firmware (parsing host-issued commands) and tests that drive it.
//!
//! Grammar: `TYPE DIGIT (':' DIGITS)? (':' DIGITS)? '\n'`, `TYPE` one of
//! `[CcWwRrNn]`, case-insensitive, `\r` ignored, any illegal byte resets the
//! parser to `ExpectingType`/`Unknown`.

use super::header::DeviceKind;

/// Single-digit command IDs within `Common`.
pub mod common_cmd {
    pub const SYNC: u8 = 0;
    pub const TIME: u8 = 1;
    pub const STATUS: u8 = 2;
    pub const RESET: u8 = 3;
    pub const PROGRAM: u8 = 4;
    pub const LOG_CLEAN: u8 = 5;
}

pub mod wdt_cmd {
    pub const KEEP_ALIVE: u8 = 0;
    pub const DEACTIVATE: u8 = 1;
    pub const STATUS: u8 = 2;
    pub const TIMEOUT: u8 = 3;
    pub const LOG: u8 = 4;
}

pub mod rng_cmd {
    pub const FLOOD_ON: u8 = 0;
    pub const FLOOD_OFF: u8 = 1;
    pub const STATUS: u8 = 2;
}

pub mod rng_send_cmd {
    pub const PAYLOAD: u8 = 0;
}

pub mod radio_forward_cmd {
    pub const LIGHT: u8 = 0;
}

/// A parsed (or synthesized) command ready for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub device_type: DeviceKind,
    pub id: u8,
    pub arg1: i32,
    pub arg2: i32,
}

impl Command {
    pub fn new(device_type: DeviceKind, id: u8, arg1: i32, arg2: i32) -> Self {
        Self {
            device_type,
            id,
            arg1,
            arg2,
        }
    }

    /// Renders the ASCII line the host sends to the device, per §6's
    /// grammar. Only `Common`/`Watchdog`/`Rng` are ever host-issued;
    /// `RngSend`/`RadioForward` are device-synthesized and never sent
    /// this way.
    pub fn to_ascii_line(&self) -> String {
        let type_char = match self.device_type {
            DeviceKind::Common => 'C',
            DeviceKind::Watchdog => 'W',
            DeviceKind::Rng => 'R',
            DeviceKind::Radio => 'N',
            _ => unreachable!("device-synthesized command has no ASCII form"),
        };
        if self.arg2 != 0 {
            format!("{}{}:{}:{}\n", type_char, self.id, self.arg1, self.arg2)
        } else if self.arg1 != 0 {
            format!("{}{}:{}\n", type_char, self.id, self.arg1)
        } else {
            format!("{}{}\n", type_char, self.id)
        }
    }

    /// Best-effort human name for the command, used in NAK and header log
    /// lines. Mirrors the original daemon's `command_list` lookup tables.
    pub fn name(&self) -> &'static str {
        use DeviceKind::*;
        match (self.device_type, self.id) {
            (Common, common_cmd::SYNC) => "SYNC",
            (Common, common_cmd::TIME) => "TIME",
            (Common, common_cmd::STATUS) => "STATUS",
            (Common, common_cmd::RESET) => "RESET",
            (Common, common_cmd::PROGRAM) => "PROGRAM",
            (Common, common_cmd::LOG_CLEAN) => "LOG-CLEAN",
            (Watchdog, wdt_cmd::KEEP_ALIVE) => "KEEP-ALIVE",
            (Watchdog, wdt_cmd::DEACTIVATE) => "DEACTIVATE",
            (Watchdog, wdt_cmd::STATUS) => "STATUS",
            (Watchdog, wdt_cmd::TIMEOUT) => "TIMEOUT",
            (Watchdog, wdt_cmd::LOG) => "LOG",
            (Rng, rng_cmd::FLOOD_ON) => "FLOOD-ON",
            (Rng, rng_cmd::FLOOD_OFF) => "FLOOD-OFF",
            (Rng, rng_cmd::STATUS) => "STATUS",
            (RngSend, rng_send_cmd::PAYLOAD) => "PAYLOAD",
            (RadioForward, radio_forward_cmd::LIGHT) => "L",
            _ => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    ExpectingType,
    ExpectingId,
    ExpectingArg1,
    ExpectingArg2,
    Complete,
}

/// Soft limit on bytes consumed from the UART receive buffer per polling
/// pass, matching `CMD_SIZE_SOFT_LIMIT` in the original firmware.
pub const CMD_SIZE_SOFT_LIMIT: u8 = 16;

/// Byte-at-a-time ASCII command parser. One instance lives on the device
/// side; the host never needs it (it only ever *sends* ASCII commands).
pub struct CommandParser {
    state: ParserState,
    device_type: DeviceKind,
    id: u8,
    arg1: i32,
    arg2: i32,
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::ExpectingType,
            device_type: DeviceKind::Unknown,
            id: 0,
            arg1: 0,
            arg2: 0,
        }
    }

    pub fn reset(&mut self) {
        self.state = ParserState::ExpectingType;
        self.device_type = DeviceKind::Unknown;
        self.id = 0;
        self.arg1 = 0;
        self.arg2 = 0;
    }

    pub fn is_complete(&self) -> bool {
        self.state == ParserState::Complete && self.device_type != DeviceKind::Unknown
    }

    /// Synthesize a command directly (used by the RNG engine and radio
    /// forwarder to hand themselves a command for dispatch, bypassing the
    /// ASCII grammar).
    pub fn set(&mut self, device_type: DeviceKind, id: u8, arg1: i32, arg2: i32) {
        self.state = ParserState::Complete;
        self.device_type = device_type;
        self.id = id;
        self.arg1 = arg1;
        self.arg2 = arg2;
    }

    pub fn command(&self) -> Command {
        Command::new(self.device_type, self.id, self.arg1, self.arg2)
    }

    /// Feed one byte to the parser. Returns `true` exactly when this byte
    /// completed a command (i.e. `'\n'` was seen and the command is not
    /// `Unknown`). The caller must read `command()` before the next call —
    /// calling `write` again after completion re-arms the parser.
    pub fn write(&mut self, c: u8) -> bool {
        if self.state == ParserState::Complete {
            self.reset();
        }

        if c == b'\r' {
            return false;
        }
        if c == b':' {
            match self.state {
                ParserState::ExpectingId => self.state = ParserState::ExpectingArg1,
                ParserState::ExpectingArg1 => self.state = ParserState::ExpectingArg2,
                _ => self.reset(),
            }
            return false;
        }
        if c == b'\n' {
            if self.device_type != DeviceKind::Unknown {
                self.state = ParserState::Complete;
                return true;
            } else {
                self.reset();
            }
            return false;
        }

        match self.state {
            ParserState::ExpectingType => {
                self.device_type = match c {
                    b'C' | b'c' => DeviceKind::Common,
                    b'W' | b'w' => DeviceKind::Watchdog,
                    b'R' | b'r' => DeviceKind::Rng,
                    b'N' | b'n' => DeviceKind::Radio,
                    _ => DeviceKind::Unknown,
                };
                if self.device_type != DeviceKind::Unknown {
                    self.state = ParserState::ExpectingId;
                }
            }
            ParserState::ExpectingId => {
                if c.is_ascii_digit() && self.id < 10 {
                    self.id = self.id.wrapping_mul(10).wrapping_add(c - b'0');
                } else {
                    self.reset();
                }
            }
            ParserState::ExpectingArg1 => {
                if c.is_ascii_digit() {
                    self.arg1 = self
                        .arg1
                        .wrapping_mul(10)
                        .wrapping_add((c - b'0') as i32);
                } else {
                    self.reset();
                }
            }
            ParserState::ExpectingArg2 => {
                if c.is_ascii_digit() {
                    self.arg2 = self
                        .arg2
                        .wrapping_mul(10)
                        .wrapping_add((c - b'0') as i32);
                } else {
                    self.reset();
                }
            }
            ParserState::Complete => unreachable!("handled above"),
        }

        false
    }

    /// Feed a batch of bytes (e.g. drained from the RX ring buffer in one
    /// polling pass), stopping as soon as a command completes or the soft
    /// limit is reached. Returns `true` if a command completed.
    pub fn feed(&mut self, bytes: impl IntoIterator<Item = u8>) -> bool {
        for (i, c) in bytes.into_iter().enumerate() {
            if self.write(c) {
                return true;
            }
            if i as u32 + 1 >= CMD_SIZE_SOFT_LIMIT as u32 {
                break;
            }
        }
        false
    }
}
