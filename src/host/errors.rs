//! Daemon-level error type. Wire/protocol errors live in `protocol::` and
//! `firmware::` (where the corpus's `derive_more::Display` pattern fits a
//! handful of small enums); at the daemon boundary we switch to `thiserror`
//! for the `#[from]` convenience across the many `io::Error`-producing
//! subsystems a long-running process touches (serial port, FIFOs, PID
//! file, signal handling).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("failed to open serial port {path}: {source}")]
    SerialOpen {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("serial sync exhausted after {retries} retries")]
    SyncExhausted { retries: u32 },

    #[error("post-sync initialisation failed: {0}")]
    PostSyncInit(String),

    #[error("failed to create FIFO at {path}: {source}")]
    FifoCreate {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },

    #[error("failed to write PID file {path}: {source}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] nix::Error),

    #[error("failed to daemonize: {0}")]
    Daemonize(#[source] nix::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
