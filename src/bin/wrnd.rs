//! `wrnd`: the host daemon entry point. Parses the command line, opens the
//! serial port and the named pipes, runs the sync/dispatch loop on the main
//! thread and the watchdog bridge on its own, and tears down on `SIGTERM`/
//! `SIGINT`. §5/§6 of the specification.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::stat::Mode;

use wrn_bridge::host::demux::Demultiplexer;
use wrn_bridge::host::log_sink::{LogCategory, LogSink};
use wrn_bridge::host::sync::{SyncEngine, SyncOutcome, SYNC_LEN, SYNC_RETRY};
use wrn_bridge::host::transport::{open_port, SharedWriter};
use wrn_bridge::host::wdt_bridge::WatchdogBridge;
use wrn_bridge::host::{Args, DaemonError};
use wrn_bridge::protocol::command::{common_cmd, rng_cmd};
use wrn_bridge::protocol::{Command, DeviceKind};

/// Cleared by the `SIGTERM`/`SIGINT` handler; checked by the main loop
/// between polls and by the watchdog bridge thread between FIFO (re)opens.
static RUNNING: AtomicBool = AtomicBool::new(true);

/// Set by the `SIGHUP` handler; the main loop reopens rotated log files the
/// next time it notices.
static REOPEN_LOGS: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_: i32) {
    RUNNING.store(false, Ordering::SeqCst);
}

extern "C" fn request_log_reopen(_: i32) {
    REOPEN_LOGS.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() -> Result<(), nix::Error> {
    // Safety: these handlers only touch `AtomicBool`s, which is
    // signal-safe.
    unsafe {
        signal::signal(Signal::SIGTERM, SigHandler::Handler(request_shutdown))?;
        signal::signal(Signal::SIGINT, SigHandler::Handler(request_shutdown))?;
        signal::signal(Signal::SIGHUP, SigHandler::Handler(request_log_reopen))?;
        signal::signal(Signal::SIGPIPE, SigHandler::SigIgn)?;
    }
    Ok(())
}

fn create_fifo(path: &Path) -> Result<(), DaemonError> {
    match nix::unistd::mkfifo(path, Mode::from_bits_truncate(0o640)) {
        Ok(()) | Err(nix::errno::Errno::EEXIST) => Ok(()),
        Err(source) => Err(DaemonError::FifoCreate {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_pid_file(path: &Path) -> Result<(), DaemonError> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    std::fs::write(path, format!("{}\n", std::process::id())).map_err(|source| DaemonError::PidFile {
        path: path.to_path_buf(),
        source,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    // `nix::unistd::daemon` does the single-fork-and-detach dance (new
    // session, working directory unchanged, stdio left open) without the
    // classic double-fork: good enough for a long-running bridge that logs
    // to files, not the controlling terminal.
    if args.daemonize {
        nix::unistd::daemon(true, true).map_err(DaemonError::Daemonize)?;
    }

    install_signal_handlers().map_err(DaemonError::Signal)?;
    write_pid_file(&args.pid_file)?;
    for fifo in [&args.rng_fifo, &args.nrf_fifo, &args.cmd_fifo, &args.wdt_fifo] {
        create_fifo(fifo)?;
    }

    let log_sink = Arc::new(LogSink::open(&args.log_dir)?);
    log_sink.log(LogCategory::Common, "+++ wrnd starting up");

    let mut read_port = open_port(&args.device_port, args.baud_rate, args.timeout_deciseconds).map_err(|source| {
        DaemonError::SerialOpen {
            path: args.device_port.display().to_string(),
            source,
        }
    })?;
    let write_port = read_port.try_clone().map_err(|source| DaemonError::SerialOpen {
        path: format!("{} (write handle)", args.device_port.display()),
        source,
    })?;
    let writer = SharedWriter::new(write_port);

    {
        let writer = writer.clone();
        let wdt_fifo = args.wdt_fifo.clone();
        let nowayout = args.wdt_nowayout;
        std::thread::spawn(move || {
            WatchdogBridge::new(wdt_fifo, nowayout, writer).run(&RUNNING);
        });
    }

    let mut demux = Demultiplexer::new(
        args.cmd_fifo.clone(),
        args.rng_fifo.clone(),
        args.nrf_fifo.clone(),
        log_sink.clone(),
        args.verbose,
    );
    let mut sync_engine = SyncEngine::new();

    let run_result = run_bridge_loop(&mut sync_engine, &mut read_port, &mut demux, &writer, &log_sink);

    let _ = writer.send_command(&Command::new(DeviceKind::Rng, rng_cmd::FLOOD_OFF, 0, 0).to_ascii_line());
    log_sink.log(LogCategory::Common, "--- wrnd shutting down");
    run_result
}

/// The main poll/dispatch loop: drives the sync engine one byte at a time,
/// reacting to each [`SyncOutcome`] until `RUNNING` is cleared or the link
/// is deemed unrecoverable.
fn run_bridge_loop(
    sync_engine: &mut SyncEngine,
    read_port: &mut Box<dyn serialport::SerialPort>,
    demux: &mut Demultiplexer,
    writer: &SharedWriter<Box<dyn serialport::SerialPort>>,
    log_sink: &LogSink,
) -> Result<(), Box<dyn std::error::Error>> {
    while RUNNING.load(Ordering::Relaxed) {
        if REOPEN_LOGS.swap(false, Ordering::Relaxed) {
            if let Err(e) = log_sink.reopen() {
                log::error!("failed to reopen log files: {e}");
            }
        }

        match sync_engine.poll(read_port) {
            Ok(SyncOutcome::Pending) => {}
            Ok(SyncOutcome::NeedsResync) => {
                log_sink.log(LogCategory::Common, "syncing with the device");
                let _ = read_port.clear(serialport::ClearBuffer::Input);
                let floodoff = Command::new(DeviceKind::Rng, rng_cmd::FLOOD_OFF, 0, 0).to_ascii_line();
                let sync = Command::new(DeviceKind::Common, common_cmd::SYNC, SYNC_LEN as i32, 0).to_ascii_line();
                if writer.send_command(&floodoff).is_err() || writer.send_command(&sync).is_err() {
                    log_sink.log(LogCategory::Error, "failed to send the sync preamble to the device");
                }
            }
            Ok(SyncOutcome::SyncAchieved) => {
                log_sink.log(LogCategory::Common, "sync achieved, initialising the device");
                let now = chrono::Utc::now().timestamp() as i32;
                let time = Command::new(DeviceKind::Common, common_cmd::TIME, now, 0).to_ascii_line();
                let flood_on = Command::new(DeviceKind::Rng, rng_cmd::FLOOD_ON, 0, 0).to_ascii_line();
                if writer.send_command(&time).is_err() || writer.send_command(&flood_on).is_err() {
                    log_sink.log(LogCategory::Error, "post-sync initialisation failed");
                    return Err(Box::new(DaemonError::PostSyncInit(
                        "could not send Common/Time or RNG/FloodOn".to_string(),
                    )));
                }
            }
            Ok(SyncOutcome::Header(header)) => {
                if header.is_ack() {
                    demux.dispatch_confirmation(header);
                }
                // `payload_size > 0` headers are just an announcement; the
                // matching `Payload` event carries the actual bytes.
            }
            Ok(SyncOutcome::Payload(header, payload)) => {
                demux.dispatch_payload(header, &payload);
            }
            Ok(SyncOutcome::DeviceError(header)) => {
                let name = Command::new(header.device_kind(), header.cmd_id, 0, 0).name();
                demux.dispatch_error(header, name);
            }
            Ok(SyncOutcome::UnsolicitedReboot) => {
                log_sink.log(LogCategory::Common, "the device rebooted on its own");
            }
            Ok(SyncOutcome::Desync) => {
                log_sink.log(LogCategory::Error, "lost sync with the device, resyncing");
            }
            Ok(SyncOutcome::Aborted) => {
                log_sink.log(
                    LogCategory::Error,
                    &format!("could not sync with the device after {SYNC_RETRY} attempts"),
                );
                return Err(Box::new(DaemonError::SyncExhausted { retries: SYNC_RETRY }));
            }
            Err(e) => {
                log_sink.log(LogCategory::Error, &format!("serial port read failed: {e}"));
                return Err(Box::new(DaemonError::Io(e)));
            }
        }
    }
    Ok(())
}
