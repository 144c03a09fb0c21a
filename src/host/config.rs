//! Command-line surface, implementing the flag table in §6 of the
//! specification with `clap`'s derive API.

use clap::Parser;
use std::path::PathBuf;

use crate::protocol::WDT_TIMEOUT_DEFAULT;

/// `wrnd` — bridges a framed-serial telemetry device to a set of named
/// pipes, and supervises a host-side keep-alive watchdog.
#[derive(Debug, Parser)]
#[command(name = "wrnd", version, about)]
pub struct Args {
    /// Serial device path (e.g. /dev/ttyUSB0).
    #[arg(short = 'D', long = "device-port")]
    pub device_port: PathBuf,

    /// Baud rate.
    #[arg(short = 'b', long = "baud-rate", default_value_t = 57_600)]
    pub baud_rate: u32,

    /// Serial read timeout, in deciseconds (VTIME units).
    #[arg(short = 't', long = "timeout", default_value_t = 10)]
    pub timeout_deciseconds: u8,

    /// RNG byte-stream FIFO path.
    #[arg(short = 'r', long = "rng-fifo", default_value = "/var/run/wrnd/rng")]
    pub rng_fifo: PathBuf,

    /// Radio-forward FIFO path. Named `nrf-fifo` for continuity with the
    /// original daemon's external flag surface.
    #[arg(short = 'n', long = "nrf-fifo", default_value = "/var/run/wrnd/nrf")]
    pub nrf_fifo: PathBuf,

    /// Command-feedback FIFO path (one-shot replies).
    #[arg(short = 'c', long = "cmd-fifo", default_value = "/var/run/wrnd/cmd")]
    pub cmd_fifo: PathBuf,

    /// PID file path.
    #[arg(short = 'p', long = "pid-file", default_value = "/var/run/wrnd.pid")]
    pub pid_file: PathBuf,

    /// Watchdog bridge FIFO path.
    #[arg(short = 'w', long = "wdt-fifo", default_value = "/var/run/wrnd/wdt")]
    pub wdt_fifo: PathBuf,

    /// Device watchdog timeout, in seconds (30-300).
    #[arg(short = 'T', long = "wdt-timeout", default_value_t = WDT_TIMEOUT_DEFAULT)]
    pub wdt_timeout: u16,

    /// If set, a reader closing the watchdog FIFO without sending the
    /// magic byte does not stop the keep-alive bridge.
    #[arg(short = 'N', long = "wdt-nowayout", default_value_t = false)]
    pub wdt_nowayout: bool,

    /// Verbosity: 0 = errors only, 1 = header logs, 2 = + payload hex
    /// dumps. Repeat the flag to increase (`-vv`).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Fork into the background after initialisation succeeds.
    #[arg(short = 'd', long = "daemonize", default_value_t = false)]
    pub daemonize: bool,

    /// Directory for the per-category log files.
    #[arg(long = "log-dir", default_value = "/var/log/wrnd")]
    pub log_dir: PathBuf,
}
