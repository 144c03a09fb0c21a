//! Handlers for the `Common` device type: sync, wall clock, status, reset,
//! the programming interlock, and log wipe. §4.3's Common row in the spec.

use crate::firmware::clock::Clock;
use crate::protocol::payloads::CommonStatus;

/// Releases the hardware interlock that normally blocks the bootloader
/// from re-flashing firmware while the device is running untended.
pub trait ProgramInterlock {
    fn release(&mut self);
    fn is_locked(&self) -> bool;
}

/// Arms the on-chip watchdog for an imminent self-reset, so `Common/Reset`
/// can "fire and loop" rather than reset synchronously from inside the
/// command handler.
pub trait SystemReset {
    fn arm(&mut self);
}

/// Reads supply voltage in millivolts, for `Common/Status`.
pub trait SupplyMonitor {
    fn read_vcc_mv(&mut self) -> i32;
}

pub struct CommonDevice<P, R, S> {
    clock: Clock,
    interlock: P,
    system_reset: R,
    supply: S,
}

impl<P: ProgramInterlock, R: SystemReset, S: SupplyMonitor> CommonDevice<P, R, S> {
    pub fn new(interlock: P, system_reset: R, supply: S) -> Self {
        Self {
            clock: Clock::new(),
            interlock,
            system_reset,
            supply,
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    /// `C1:t`. Returns `true` exactly once, the first time the clock is
    /// set after boot — the caller appends a `Boot` log event on `true`.
    pub fn set_time(&mut self, t: i32) -> bool {
        self.clock.set_wall_clock(t)
    }

    pub fn status(&mut self) -> CommonStatus {
        CommonStatus {
            time: self.clock.wall_clock(),
            uptime: self.clock.uptime_s(),
            vcc: self.supply.read_vcc_mv(),
            nlock: self.interlock.is_locked() as u8,
        }
    }

    /// `C3`. Arms the system watchdog; the caller's main loop keeps
    /// running normally until the armed reset fires.
    pub fn arm_reset(&mut self) {
        self.system_reset.arm();
    }

    /// `C4`.
    pub fn release_program_interlock(&mut self) {
        self.interlock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockInterlock {
        locked: bool,
    }
    impl ProgramInterlock for MockInterlock {
        fn release(&mut self) {
            self.locked = false;
        }
        fn is_locked(&self) -> bool {
            self.locked
        }
    }

    #[derive(Default)]
    struct MockReset {
        armed: bool,
    }
    impl SystemReset for MockReset {
        fn arm(&mut self) {
            self.armed = true;
        }
    }

    struct FixedSupply(i32);
    impl SupplyMonitor for FixedSupply {
        fn read_vcc_mv(&mut self) -> i32 {
            self.0
        }
    }

    #[test]
    fn status_reports_locked_interlock_by_default() {
        let mut dev = CommonDevice::new(
            MockInterlock { locked: true },
            MockReset::default(),
            FixedSupply(3300),
        );
        assert_eq!(dev.status().nlock, 1);
        dev.release_program_interlock();
        assert_eq!(dev.status().nlock, 0);
    }

    #[test]
    fn set_time_only_reports_first_call_as_boot() {
        let mut dev = CommonDevice::new(
            MockInterlock::default(),
            MockReset::default(),
            FixedSupply(3300),
        );
        assert!(dev.set_time(1_460_792_071));
        assert!(!dev.set_time(1_460_792_100));
    }

    #[test]
    fn reset_arms_system_watchdog() {
        let mut dev = CommonDevice::new(
            MockInterlock::default(),
            MockReset::default(),
            FixedSupply(3300),
        );
        dev.arm_reset();
        assert!(dev.system_reset.armed);
    }
}
