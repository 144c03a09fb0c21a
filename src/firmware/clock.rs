//! Monotonic uptime and host-supplied wall clock. §5 of the specification:
//! the Timer0 overflow interrupt accumulates milliseconds with a
//! sub-millisecond fractional remainder, the same scheme the Arduino core
//! uses for `millis()`.

/// Matches the 16 MHz/64-prescaler Timer0 overflow period used by the
/// original firmware: each overflow is 1024 microseconds, tracked as a
/// whole-millisecond increment plus a fractional remainder out of 125.
const FRACT_INC: u8 = 3;
const FRACT_MAX: u8 = 125;

pub struct Clock {
    millis: u32,
    fract: u8,
    wall_clock_offset: i32,
    time_set: bool,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            millis: 0,
            fract: 0,
            wall_clock_offset: 0,
            time_set: false,
        }
    }

    /// Called from the Timer0 overflow interrupt context.
    pub fn on_timer_overflow(&mut self) {
        self.millis = self.millis.wrapping_add(1);
        self.fract += FRACT_INC;
        if self.fract >= FRACT_MAX {
            self.fract -= FRACT_MAX;
            self.millis = self.millis.wrapping_add(1);
        }
    }

    pub fn uptime_ms(&self) -> u32 {
        self.millis
    }

    pub fn uptime_s(&self) -> u32 {
        self.millis / 1000
    }

    /// `C1:t` handler. Returns `true` the first time the clock is set
    /// after boot, so the caller can append the `Boot` log event exactly
    /// once.
    pub fn set_wall_clock(&mut self, t: i32) -> bool {
        self.wall_clock_offset = t - self.uptime_s() as i32;
        let first = !self.time_set;
        self.time_set = true;
        first
    }

    pub fn wall_clock(&self) -> i32 {
        self.wall_clock_offset + self.uptime_s() as i32
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_accumulates_to_one_second() {
        let mut clock = Clock::new();
        for _ in 0..977 {
            clock.on_timer_overflow();
        }
        assert_eq!(clock.uptime_s(), 1);
    }

    #[test]
    fn wall_clock_tracks_uptime_after_being_set() {
        let mut clock = Clock::new();
        for _ in 0..977 {
            clock.on_timer_overflow();
        }
        assert!(clock.set_wall_clock(1_460_792_071));
        assert_eq!(clock.wall_clock(), 1_460_792_071);
        for _ in 0..977 {
            clock.on_timer_overflow();
        }
        assert_eq!(clock.wall_clock(), 1_460_792_072);
    }

    #[test]
    fn only_first_set_reports_boot_event() {
        let mut clock = Clock::new();
        assert!(clock.set_wall_clock(1000));
        assert!(!clock.set_wall_clock(2000));
    }
}
