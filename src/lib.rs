//! `wrn-bridge`: a framed-serial telemetry and watchdog bridge between an
//! embedded UART device and a host daemon.
//!
//! `protocol` is the shared wire format both sides speak. `firmware` is
//! the device-side core (command parsing, dispatch, EEPROM log, RNG
//! calibration, hardware watchdog) — generic over small hardware traits so
//! it runs on a hosted target under test. `host` is the daemon side (sync
//! state machine, FIFO fan-out, watchdog bridge, log sink) that `wrnd`
//! assembles into a running process.

pub mod firmware;
pub mod host;
pub mod protocol;
