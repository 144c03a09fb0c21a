//! Self-calibrating hardware RNG: ADC sampling, threshold calibration, and
//! Von Neumann-style debiasing. §4.5 of the specification.

use crate::protocol::payloads::RngStatus;
use crate::protocol::RNG_FAST_CALIBRATION;

pub const PAYLOAD_SIZE: usize = crate::protocol::RNG_PAYLOAD_SIZE;

/// An 8-bit reduction of the device's 10-bit ADC reading from a
/// high-impedance pin. Real firmware samples actual hardware noise; tests
/// supply a scripted sequence.
pub trait Adc {
    fn sample(&mut self) -> u8;
}

pub struct RngEngine<A: Adc> {
    adc: A,
    threshold: u8,
    byte: u8,
    bit_count: u8,
    bit_flip: bool,
    payload: [u8; PAYLOAD_SIZE],
    payload_len: usize,
    pan_left: u16,
    pan_right: u16,
    num_measures: u16,
    measure_limit: u16,
    fault: u16,
    flood: bool,
}

impl<A: Adc> RngEngine<A> {
    pub fn new(adc: A) -> Self {
        Self {
            adc,
            threshold: 128,
            byte: 0,
            bit_count: 0,
            bit_flip: false,
            payload: [0u8; PAYLOAD_SIZE],
            payload_len: 0,
            pan_left: 0,
            pan_right: 0,
            num_measures: 0,
            measure_limit: RNG_FAST_CALIBRATION,
            fault: 0,
            flood: false,
        }
    }

    pub fn calibrated(&self) -> bool {
        self.measure_limit == 0
    }

    pub fn flood_on(&mut self) {
        self.flood = true;
    }

    /// Disables emission and resets the buffer, per §4.3's `R1` handler.
    pub fn flood_off(&mut self) {
        self.flood = false;
        self.payload_len = 0;
    }

    pub fn status(&self) -> RngStatus {
        RngStatus {
            threshold: self.threshold,
            calibrated: self.calibrated() as u8,
            flood: self.flood as u8,
            fault: self.fault,
        }
    }

    /// Draws one ADC sample and advances the calibration/production state
    /// machine. Returns the flood payload when it just filled.
    pub fn tick(&mut self) -> Option<[u8; PAYLOAD_SIZE]> {
        let value = self.adc.sample();
        self.process(value)
    }

    fn process(&mut self, value: u8) -> Option<[u8; PAYLOAD_SIZE]> {
        if self.measure_limit > 0 {
            self.calibrate_sample(value);
            None
        } else {
            self.produce_bit(value)
        }
    }

    fn calibrate_sample(&mut self, value: u8) {
        self.num_measures += 1;
        if self.num_measures < self.measure_limit {
            if value <= self.threshold {
                self.pan_left += 1;
            } else {
                self.pan_right += 1;
            }
            return;
        }

        // Window complete; the final sample is deliberately excluded from
        // the tally to avoid overflowing the pan counters.
        let fault = self.pan_left.abs_diff(self.pan_right);
        let acceptable_fault = ((self.measure_limit - 1) / 256 + 1) * 3;
        self.fault = fault;

        if fault > acceptable_fault {
            if self.pan_right > self.pan_left {
                if self.threshold < u8::MAX {
                    self.threshold += 1;
                }
            } else if self.pan_left > self.pan_right && self.threshold > 0 {
                self.threshold -= 1;
            }
            self.pan_left = 0;
            self.pan_right = 0;
            self.num_measures = 0;
            if self.threshold == 0 || fault == u16::MAX {
                self.measure_limit = RNG_FAST_CALIBRATION;
            }
        } else {
            self.measure_limit = 0;
            self.pan_left = 0;
            self.pan_right = 0;
            self.num_measures = 0;
            self.byte = 0;
            self.bit_count = 0;
        }
    }

    fn produce_bit(&mut self, value: u8) -> Option<[u8; PAYLOAD_SIZE]> {
        let bit = value > self.threshold;
        let debiased = bit ^ self.bit_flip;
        self.bit_flip = !self.bit_flip;

        self.byte = (self.byte << 1) | debiased as u8;
        self.bit_count += 1;
        if self.bit_count < 8 {
            return None;
        }
        self.bit_count = 0;
        if self.payload_len < PAYLOAD_SIZE {
            self.payload[self.payload_len] = self.byte;
            self.payload_len += 1;
        }
        if self.flood && self.payload_len == PAYLOAD_SIZE {
            let out = self.payload;
            self.payload_len = 0;
            return Some(out);
        }
        None
    }
}
