//! Device-side hardware watchdog supervisor. §4.11 of the specification.

use crate::protocol::payloads::{LogEvent, LogRecord, WatchdogStatus};
use crate::protocol::{WDT_TIMEOUT_DEFAULT, WDT_TIMEOUT_MAX, WDT_TIMEOUT_MIN};

/// Drives the physical reset line. A real port asserts a GPIO pin; tests
/// record the pulse.
pub trait ResetLine {
    fn pulse(&mut self);
}

pub struct HardwareWatchdog {
    active: bool,
    timeout: u16,
    min_delta: u16,
    keep_alive_uptime: u32,
}

impl HardwareWatchdog {
    pub fn new() -> Self {
        Self {
            active: false,
            timeout: WDT_TIMEOUT_DEFAULT,
            min_delta: WDT_TIMEOUT_DEFAULT,
            keep_alive_uptime: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// `W0`: idle→active transition snapshots `uptime` and resets
    /// `min_delta`; re-arming while already active only refreshes the
    /// snapshot.
    pub fn keep_alive(&mut self, uptime: u32) {
        if !self.active {
            self.min_delta = self.timeout;
        }
        self.active = true;
        self.keep_alive_uptime = uptime;
    }

    /// `W1`: active→idle.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// `W3:t`: accepts `30 <= t <= 300`, otherwise the handler fails and
    /// the caller emits a NAK. A changed timeout also resets `min_delta`
    /// to the new timeout, since the old headroom no longer relates to it.
    pub fn set_timeout(&mut self, t: u16) -> bool {
        if !(WDT_TIMEOUT_MIN as u16..=WDT_TIMEOUT_MAX as u16).contains(&t) {
            return false;
        }
        if self.timeout != t {
            self.timeout = t;
            self.min_delta = t;
        }
        true
    }

    pub fn status(&self, log_length: u16) -> WatchdogStatus {
        WatchdogStatus {
            active: self.active as u8,
            timeout: self.timeout,
            min_delta: self.min_delta,
            log_length,
        }
    }

    /// Per-tick update: recomputes headroom from `uptime`, tracks the
    /// running minimum, and pulses the reset line plus appends a `Reset`
    /// log event once headroom is exhausted.
    pub fn update(&mut self, uptime: u32, reset: &mut impl ResetLine) -> Option<LogRecord> {
        if !self.active {
            return None;
        }
        let elapsed = uptime.saturating_sub(self.keep_alive_uptime);
        let delta = self.timeout as i64 - elapsed as i64;
        self.min_delta = self.min_delta.min(delta.clamp(0, u16::MAX as i64) as u16);
        if delta <= 0 {
            reset.pulse();
            self.active = false;
            Some(LogRecord {
                time: uptime as i32,
                log_event: LogEvent::Reset,
            })
        } else {
            None
        }
    }
}

impl Default for HardwareWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingReset {
        pulses: u32,
    }

    impl ResetLine for RecordingReset {
        fn pulse(&mut self) {
            self.pulses += 1;
        }
    }

    #[test]
    fn keep_alive_activates_and_resets_min_delta() {
        let mut wdt = HardwareWatchdog::new();
        wdt.keep_alive(100);
        assert!(wdt.is_active());
        assert_eq!(wdt.status(0).min_delta, WDT_TIMEOUT_DEFAULT);
    }

    #[test]
    fn fresh_boot_reports_default_timeout_as_min_delta_not_zero() {
        // min_delta == 0 means "last reboot was watchdog-induced"; a clean
        // boot that never saw a keep-alive must not claim that.
        let wdt = HardwareWatchdog::new();
        assert_eq!(wdt.status(0).min_delta, WDT_TIMEOUT_DEFAULT);
    }

    #[test]
    fn set_timeout_rejects_out_of_range() {
        let mut wdt = HardwareWatchdog::new();
        assert!(!wdt.set_timeout(29));
        assert!(!wdt.set_timeout(301));
        assert!(wdt.set_timeout(60));
        assert_eq!(wdt.status(0).timeout, 60);
    }

    #[test]
    fn changing_timeout_resets_min_delta_to_the_new_timeout() {
        let mut wdt = HardwareWatchdog::new();
        wdt.set_timeout(100);
        wdt.keep_alive(0);
        let mut reset = RecordingReset::default();
        wdt.update(40, &mut reset);
        assert_eq!(wdt.status(0).min_delta, 60);

        wdt.set_timeout(200);
        assert_eq!(wdt.status(0).min_delta, 200);
    }

    #[test]
    fn expiry_pulses_reset_and_logs() {
        let mut wdt = HardwareWatchdog::new();
        wdt.set_timeout(30);
        wdt.keep_alive(0);
        let mut reset = RecordingReset::default();

        assert!(wdt.update(10, &mut reset).is_none());
        assert_eq!(reset.pulses, 0);

        let record = wdt.update(31, &mut reset);
        assert!(record.is_some());
        assert_eq!(reset.pulses, 1);
        assert!(!wdt.is_active());
    }

    #[test]
    fn min_delta_is_monotonically_non_increasing() {
        let mut wdt = HardwareWatchdog::new();
        wdt.set_timeout(100);
        wdt.keep_alive(0);
        let mut reset = RecordingReset::default();
        wdt.update(10, &mut reset);
        let d1 = wdt.status(0).min_delta;
        wdt.update(50, &mut reset);
        let d2 = wdt.status(0).min_delta;
        assert!(d2 <= d1);
    }
}
