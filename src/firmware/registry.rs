//! Ties every device handler together behind one dispatch table keyed by
//! [`DeviceKind`]. §4.3 of the specification: a tagged match, not a trait
//! object vtable — the four handlers have genuinely different shapes
//! (different hardware traits, different payload types) and nothing is
//! gained by forcing them behind one interface.

use crate::firmware::clock::Clock;
use crate::firmware::common_device::{CommonDevice, ProgramInterlock, SupplyMonitor, SystemReset};
use crate::firmware::eeprom::{CircularLog, EepromStorage};
use crate::firmware::framer::Framer;
use crate::firmware::link::DeviceLink;
use crate::firmware::radio::{RadioForwarder, RadioLink};
use crate::firmware::rng::{Adc, RngEngine};
use crate::firmware::watchdog::{HardwareWatchdog, ResetLine};
use crate::protocol::command::{common_cmd, rng_cmd, rng_send_cmd, wdt_cmd};
use crate::protocol::header::DeviceKind;
use crate::protocol::payloads::{LogEvent, LogRecord, LOG_RECORD_SIZE};
use crate::protocol::Command;

pub struct DeviceRegistry<L, P, R, S, Ee, A, Rl>
where
    L: DeviceLink,
    P: ProgramInterlock,
    R: SystemReset,
    S: SupplyMonitor,
    Ee: EepromStorage,
    A: Adc,
    Rl: RadioLink,
{
    framer: Framer<L>,
    common: CommonDevice<P, R, S>,
    watchdog: HardwareWatchdog,
    log: CircularLog<Ee>,
    rng: RngEngine<A>,
    radio: RadioForwarder<Rl>,
}

impl<L, P, R, S, Ee, A, Rl> DeviceRegistry<L, P, R, S, Ee, A, Rl>
where
    L: DeviceLink,
    P: ProgramInterlock,
    R: SystemReset,
    S: SupplyMonitor,
    Ee: EepromStorage,
    A: Adc,
    Rl: RadioLink,
{
    pub fn new(
        link: L,
        interlock: P,
        system_reset: R,
        supply: S,
        eeprom: Ee,
        adc: A,
        radio: Option<Rl>,
    ) -> Result<Self, crate::firmware::eeprom::EepromError> {
        Ok(Self {
            framer: Framer::new(link),
            common: CommonDevice::new(interlock, system_reset, supply),
            watchdog: HardwareWatchdog::new(),
            log: CircularLog::discover(eeprom)?,
            rng: RngEngine::new(adc),
            radio: RadioForwarder::new(radio),
        })
    }

    pub fn clock(&self) -> &Clock {
        self.common.clock()
    }

    pub fn log(&self) -> &CircularLog<Ee> {
        &self.log
    }

    /// (i) in the per-tick ordering: pets the on-chip watchdog and, if the
    /// user-space watchdog just expired, appends a `Reset` event.
    pub fn tick_watchdog(&mut self, reset_line: &mut impl ResetLine) {
        let uptime = self.common.clock().uptime_s();
        if let Some(record) = self.watchdog.update(uptime, reset_line) {
            self.log.append(record);
        }
    }

    /// (ii): polls the radio and forwards a `RadioForward/L` payload if a
    /// light frame was waiting.
    pub fn poll_radio(&mut self) -> bool {
        match self.radio.poll() {
            Some(light) => self.send_typed(DeviceKind::RadioForward, 0, &light.to_bytes()),
            None => true,
        }
    }

    /// (iii): draws one RNG sample and forwards the flood payload once it
    /// fills.
    pub fn poll_rng(&mut self) -> bool {
        match self.rng.tick() {
            Some(payload) => self.send_typed(DeviceKind::RngSend, rng_send_cmd::PAYLOAD, &payload),
            None => true,
        }
    }

    /// (v): dispatches one completed host command. Returns `false` on
    /// handler failure — the caller is responsible for emitting the NAK.
    pub fn dispatch(&mut self, cmd: &Command) -> bool {
        match cmd.device_type {
            DeviceKind::Common => self.dispatch_common(cmd),
            DeviceKind::Watchdog => self.dispatch_watchdog(cmd),
            DeviceKind::Rng => self.dispatch_rng(cmd),
            _ => false,
        }
    }

    fn ack(&mut self, cmd: &Command) -> bool {
        self.framer.send_header(cmd.device_type.discriminant(), cmd.id, 0)
    }

    fn send_typed(&mut self, kind: DeviceKind, cmd_id: u8, bytes: &[u8]) -> bool {
        self.framer.send_header(kind.discriminant(), cmd_id, bytes.len() as i16)
            && self.framer.send_payload(bytes)
    }

    fn dispatch_common(&mut self, cmd: &Command) -> bool {
        match cmd.id {
            common_cmd::SYNC => {
                let n = cmd.arg1.clamp(1, 8) as u8;
                self.framer.send_sync(n)
            }
            common_cmd::TIME => {
                let became_set = self.common.set_time(cmd.arg1);
                if became_set {
                    self.log.append(LogRecord {
                        time: cmd.arg1,
                        log_event: LogEvent::Boot,
                    });
                }
                self.ack(cmd)
            }
            common_cmd::STATUS => {
                let status = self.common.status();
                self.send_typed(DeviceKind::Common, cmd.id, &status.to_bytes())
            }
            common_cmd::RESET => {
                self.common.arm_reset();
                self.ack(cmd)
            }
            common_cmd::PROGRAM => {
                self.common.release_program_interlock();
                self.ack(cmd)
            }
            common_cmd::LOG_CLEAN => {
                self.log.clean();
                self.ack(cmd)
            }
            _ => false,
        }
    }

    fn dispatch_watchdog(&mut self, cmd: &Command) -> bool {
        match cmd.id {
            wdt_cmd::KEEP_ALIVE => {
                let uptime = self.common.clock().uptime_s();
                self.watchdog.keep_alive(uptime);
                self.ack(cmd)
            }
            wdt_cmd::DEACTIVATE => {
                self.watchdog.deactivate();
                self.ack(cmd)
            }
            wdt_cmd::STATUS => {
                let status = self.watchdog.status(self.log.length() as u16);
                self.send_typed(DeviceKind::Watchdog, cmd.id, &status.to_bytes())
            }
            wdt_cmd::TIMEOUT => {
                if self.watchdog.set_timeout(cmd.arg1 as u16) {
                    self.ack(cmd)
                } else {
                    false
                }
            }
            wdt_cmd::LOG => self.emit_log(cmd.arg1.max(0) as usize),
            _ => false,
        }
    }

    /// `W4:n`: streams up to `n` records, newest-first-capped. `n == 0`
    /// (i.e. bare `W4`) means "no limit" — `CircularLog::set_limit` treats
    /// zero as a no-op, so the whole log is emitted.
    fn emit_log(&mut self, n: usize) -> bool {
        self.log.set_reverse(false);
        self.log.set_limit(n);
        let mut records = Vec::new();
        while let Some(r) = self.log.next() {
            records.push(r);
        }
        let size = (records.len() * LOG_RECORD_SIZE) as i16;
        if !self
            .framer
            .send_header(DeviceKind::Watchdog.discriminant(), wdt_cmd::LOG, size)
        {
            return false;
        }
        for r in records {
            if !self.framer.send_payload(&r.to_bytes()) {
                return false;
            }
        }
        true
    }

    fn dispatch_rng(&mut self, cmd: &Command) -> bool {
        match cmd.id {
            rng_cmd::FLOOD_ON => {
                self.rng.flood_on();
                self.ack(cmd)
            }
            rng_cmd::FLOOD_OFF => {
                self.rng.flood_off();
                self.ack(cmd)
            }
            rng_cmd::STATUS => {
                let status = self.rng.status();
                self.send_typed(DeviceKind::Rng, cmd.id, &status.to_bytes())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::eeprom::MemoryEeprom;
    use crate::firmware::link::LoopbackLink;
    use crate::firmware::radio::RadioLink as RadioLinkTrait;
    use crate::firmware::rng::Adc as AdcTrait;
    use crate::protocol::command::common_cmd;

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
    struct MockReset;
    impl SystemReset for MockReset {
        fn arm(&mut self) {}
    }

    struct FixedSupply;
    impl SupplyMonitor for FixedSupply {
        fn read_vcc_mv(&mut self) -> i32 {
            3300
        }
    }

    struct ZeroAdc;
    impl AdcTrait for ZeroAdc {
        fn sample(&mut self) -> u8 {
            0
        }
    }

    struct NoRadio;
    impl RadioLinkTrait for NoRadio {
        fn poll(&mut self) -> Option<crate::firmware::radio::RadioFrame> {
            None
        }
    }

    type TestRegistry = DeviceRegistry<LoopbackLink, MockInterlock, MockReset, FixedSupply, MemoryEeprom, ZeroAdc, NoRadio>;

    fn new_registry() -> TestRegistry {
        DeviceRegistry::new(
            LoopbackLink::new(),
            MockInterlock::default(),
            MockReset::default(),
            FixedSupply,
            MemoryEeprom::new(16),
            ZeroAdc,
            None,
        )
        .unwrap()
    }

    #[test]
    fn sync_resets_sequence_and_writes_preamble() {
        let mut reg = new_registry();
        let cmd = Command::new(DeviceKind::Common, common_cmd::SYNC, 3, 0);
        assert!(reg.dispatch(&cmd));
    }

    #[test]
    fn status_after_time_reflects_set_clock() {
        let mut reg = new_registry();
        let time_cmd = Command::new(DeviceKind::Common, common_cmd::TIME, 1_460_792_071, 0);
        assert!(reg.dispatch(&time_cmd));
        assert_eq!(reg.log().length(), 1, "first time-set logs a Boot event");

        let status_cmd = Command::new(DeviceKind::Common, common_cmd::STATUS, 0, 0);
        assert!(reg.dispatch(&status_cmd));
    }

    #[test]
    fn watchdog_timeout_rejects_out_of_range() {
        let mut reg = new_registry();
        let bad = Command::new(DeviceKind::Watchdog, wdt_cmd::TIMEOUT, 5, 0);
        assert!(!reg.dispatch(&bad));
        let good = Command::new(DeviceKind::Watchdog, wdt_cmd::TIMEOUT, 60, 0);
        assert!(reg.dispatch(&good));
    }

    #[test]
    fn log_clean_then_log_query_returns_zero_records() {
        let mut reg = new_registry();
        reg.dispatch(&Command::new(DeviceKind::Common, common_cmd::TIME, 100, 0));
        assert_eq!(reg.log().length(), 1);

        reg.dispatch(&Command::new(DeviceKind::Common, common_cmd::LOG_CLEAN, 0, 0));
        assert_eq!(reg.log().length(), 0);
    }

    #[test]
    fn bare_w4_with_no_arg_emits_the_entire_log() {
        let mut reg = new_registry();
        reg.dispatch(&Command::new(DeviceKind::Common, common_cmd::TIME, 100, 0));
        assert_eq!(reg.log().length(), 1, "one Boot event logged");

        let written_before = reg.framer.link_mut().written.len();
        let log_cmd = Command::new(DeviceKind::Watchdog, wdt_cmd::LOG, 0, 0);
        assert!(reg.dispatch(&log_cmd));

        // header (6 bytes) + one LogRecord (5 bytes), not an empty log.
        let written_after = reg.framer.link_mut().written.len();
        assert_eq!(written_after - written_before, 6 + LOG_RECORD_SIZE);
    }

    #[test]
    fn unknown_command_id_fails() {
        let mut reg = new_registry();
        let cmd = Command::new(DeviceKind::Common, 9, 0, 0);
        assert!(!reg.dispatch(&cmd));
    }
}
