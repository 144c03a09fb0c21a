//! Routes decoded frames to their per-device consumer FIFO, and — at
//! configured verbosity — mirrors the original daemon's hex-dump logging
//! of headers and payloads into the per-category log files. §4.9 of the
//! specification.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use nix::fcntl::OFlag;

use crate::host::log_sink::{LogCategory, LogSink};
use crate::protocol::command::{common_cmd, radio_forward_cmd, rng_cmd, wdt_cmd};
use crate::protocol::header::{DeviceKind, FrameHeader};
use crate::protocol::payloads::{CommonStatus, LogRecord, RadioLight, RngStatus, WatchdogStatus};

/// A FIFO opened lazily `O_WRONLY | O_NONBLOCK`. Writes that would block
/// (no reader, or reader's buffer full) are silently dropped, matching
/// `write_fifo_and_close`'s "ignore the result" comment.
pub struct FifoSink {
    path: PathBuf,
    file: Option<File>,
}

impl FifoSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    fn ensure_open(&mut self) {
        if self.file.is_none() {
            // O_NONBLOCK on a FIFO's write side fails with ENXIO when no
            // reader has it open yet; that's expected and not an error.
            self.file = OpenOptions::new()
                .write(true)
                .custom_flags(OFlag::O_NONBLOCK.bits())
                .open(&self.path)
                .ok();
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.ensure_open();
        if let Some(file) = self.file.as_mut() {
            let _ = file.write_all(bytes);
        }
    }

    pub fn write_line(&mut self, line: &str) {
        self.write(line.as_bytes());
    }

    /// One-shot reply semantics: write, then close so the reader sees EOF.
    pub fn write_line_and_close(&mut self, line: &str) {
        self.write_line(line);
        self.close();
    }

    pub fn close(&mut self) {
        self.file = None;
    }
}

/// Demultiplexes decoded (header, payload) pairs to the command-feedback,
/// RNG, and radio FIFOs, per §4.9's table.
pub struct Demultiplexer {
    cmd_fifo: FifoSink,
    rng_fifo: FifoSink,
    nrf_fifo: FifoSink,
    log_sink: std::sync::Arc<LogSink>,
    verbosity: u8,
}

impl Demultiplexer {
    pub fn new(
        cmd_fifo: PathBuf,
        rng_fifo: PathBuf,
        nrf_fifo: PathBuf,
        log_sink: std::sync::Arc<LogSink>,
        verbosity: u8,
    ) -> Self {
        Self {
            cmd_fifo: FifoSink::new(cmd_fifo),
            rng_fifo: FifoSink::new(rng_fifo),
            nrf_fifo: FifoSink::new(nrf_fifo),
            log_sink,
            verbosity,
        }
    }

    fn category_for(kind: DeviceKind) -> LogCategory {
        match kind {
            DeviceKind::Common => LogCategory::Common,
            DeviceKind::Watchdog => LogCategory::Wdt,
            DeviceKind::Rng | DeviceKind::RngSend => LogCategory::Rng,
            DeviceKind::Radio | DeviceKind::RadioForward => LogCategory::Nrf,
            DeviceKind::Unknown => LogCategory::Error,
        }
    }

    /// Verbosity ≥ 1: log a one-line hex dump of the header, matching
    /// `log_device_header`.
    fn log_header(&self, kind_label: &str, header: &FrameHeader) {
        if self.verbosity < 1 {
            return;
        }
        let kind = header.device_kind();
        let label = if header.is_ack() {
            "Confirmation"
        } else if header.payload_size > 0 {
            "Payload"
        } else {
            "Header"
        };
        let hex: String = header
            .to_bytes()
            .iter()
            .map(|b| format!(" {:02X}", b))
            .collect();
        self.log_sink.log(
            Self::category_for(kind),
            &format!("{} ({}):{} [{}]{}", label, kind_label, header.payload_size, header.seq_num, hex),
        );
    }

    /// Verbosity ≥ 2: log a hex dump of the payload bytes, matching
    /// `log_device_payload`.
    fn log_payload(&self, header: &FrameHeader, payload: &[u8]) {
        if self.verbosity < 2 || payload.is_empty() {
            return;
        }
        let hex: String = payload.iter().map(|b| format!(" {:02X}", b)).collect();
        self.log_sink
            .log(Self::category_for(header.device_kind()), hex.trim_start());
    }

    /// A zero-size confirmation arrived. Only a couple of command IDs emit
    /// a one-shot reply here; most confirmations are silent.
    pub fn dispatch_confirmation(&mut self, header: FrameHeader) {
        self.log_header("Confirmation", &header);
        match (header.device_kind(), header.cmd_id) {
            (DeviceKind::Common, common_cmd::LOG_CLEAN) => self
                .cmd_fifo
                .write_line_and_close("The device log has successfully been cleaned out.\n"),
            (DeviceKind::Watchdog, wdt_cmd::LOG) => self
                .cmd_fifo
                .write_line_and_close("The device log is empty.\n"),
            _ => {}
        }
    }

    /// A device-reported error (`payload_size < 0`). Always logged to the
    /// error category, named by device/command.
    pub fn dispatch_error(&mut self, header: FrameHeader, command_name: &str) {
        self.log_sink.log(
            LogCategory::Error,
            &format!(
                "Error status received from the device [{}] {}:{}",
                header.seq_num,
                header.device_kind().name(),
                command_name
            ),
        );
    }

    pub fn dispatch_payload(&mut self, header: FrameHeader, payload: &[u8]) {
        self.log_header("Payload", &header);
        self.log_payload(&header, payload);
        match header.device_kind() {
            DeviceKind::Common => self.dispatch_common_payload(header, payload),
            DeviceKind::Watchdog => self.dispatch_watchdog_payload(header, payload),
            DeviceKind::Rng => self.dispatch_rng_payload(header, payload),
            DeviceKind::RngSend => self.rng_fifo.write(payload),
            DeviceKind::RadioForward => self.dispatch_radio_payload(header, payload),
            DeviceKind::Radio | DeviceKind::Unknown => {}
        }
    }

    fn dispatch_common_payload(&mut self, header: FrameHeader, payload: &[u8]) {
        if header.cmd_id != common_cmd::STATUS || payload.len() < 13 {
            return;
        }
        let status = CommonStatus::from_bytes(payload);
        let line = format_common_status(header.seq_num, &status);
        self.cmd_fifo.write_line_and_close(&line);
    }

    fn dispatch_watchdog_payload(&mut self, header: FrameHeader, payload: &[u8]) {
        match header.cmd_id {
            wdt_cmd::STATUS if payload.len() >= 7 => {
                let status = WatchdogStatus::from_bytes(payload);
                let line = format!(
                    "WDT [{}] Active: {}; Timeout: {}s; MinDelta: {}s; LogSize: {}\n",
                    header.seq_num,
                    if status.active != 0 { "YES" } else { "NO" },
                    status.timeout,
                    status.min_delta,
                    status.log_length,
                );
                self.cmd_fifo.write_line_and_close(&line);
            }
            wdt_cmd::LOG => {
                use crate::protocol::payloads::LOG_RECORD_SIZE;
                for chunk in payload.chunks_exact(LOG_RECORD_SIZE) {
                    let record = LogRecord::from_bytes(chunk);
                    self.cmd_fifo.write_line(&format_log_record(&record));
                }
                self.cmd_fifo.close();
            }
            _ => {}
        }
    }

    fn dispatch_rng_payload(&mut self, header: FrameHeader, payload: &[u8]) {
        if header.cmd_id != rng_cmd::STATUS || payload.len() < 5 {
            return;
        }
        let status = RngStatus::from_bytes(payload);
        let line = format!(
            "RNG [{}] Threshold: {}; Calibrated: {}; Flood: {}; Fault: {}\n",
            header.seq_num,
            status.threshold,
            if status.calibrated != 0 { "YES" } else { "NO" },
            if status.flood != 0 { "ON" } else { "OFF" },
            status.fault,
        );
        self.cmd_fifo.write_line_and_close(&line);
    }

    fn dispatch_radio_payload(&mut self, header: FrameHeader, payload: &[u8]) {
        if header.cmd_id != radio_forward_cmd::LIGHT || payload.len() < 16 {
            return;
        }
        let light = RadioLight::from_bytes(payload);
        let line = format!(
            "INSERT INTO sensor_light (id, uptime, light, vcc, tmp36, stat) VALUES ('{}', '{}', '{}', '{}', '{}', '{}');\n",
            light.id, light.uptime, light.light, light.vcc, light.tmp36, light.stat,
        );
        self.nrf_fifo.write_line(&line);
    }
}

fn format_common_status(seq_num: u16, status: &CommonStatus) -> String {
    let time = chrono::DateTime::from_timestamp(status.time as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "????-??-?? ??:??:??".to_string());
    let days = status.uptime / 86_400;
    let hours = (status.uptime / 3_600) % 24;
    let minutes = (status.uptime / 60) % 60;
    let seconds = status.uptime % 60;
    format!(
        "SYSTEM [{}] {}; Uptime: {} {} {:02}:{:02}:{:02}; Vcc: {:.2}; Lock: {}\n",
        seq_num,
        time,
        days,
        if days > 1 { "days" } else { "day" },
        hours,
        minutes,
        seconds,
        status.vcc as f64 / 1000.0,
        if status.nlock != 0 { "OFF" } else { "ON" },
    )
}

fn format_log_record(record: &LogRecord) -> String {
    let time = chrono::DateTime::from_timestamp(record.time as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "????-??-?? ??:??:??".to_string());
    format!("{}  {}\n", time, record.log_event.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::payloads::LogEvent;

    #[test]
    fn formats_common_status_line() {
        let status = CommonStatus {
            time: 1_460_792_071,
            uptime: 90_061, // 1 day, 01:01:01
            vcc: 3_300,
            nlock: 0,
        };
        let line = format_common_status(5, &status);
        assert!(line.starts_with("SYSTEM [5] "));
        assert!(line.contains("Uptime: 1 day 01:01:01"));
        assert!(line.contains("Vcc: 3.30"));
        assert!(line.contains("Lock: ON"));
    }

    #[test]
    fn formats_log_record_line() {
        let record = LogRecord {
            time: 1_460_792_071,
            log_event: LogEvent::Reset,
        };
        let line = format_log_record(&record);
        assert!(line.ends_with("  RESET\n"));
    }
}
