//! Single-wire protocol decoder for DHT11-class sensors.
//!
//! # Transaction
//!
//! ```text
//!  host   ‾‾‾‾\____________________/‾‾‾‾ (released, pull-up)
//!  sensor                            ‾‾\____80us____/‾‾‾80us‾‾‾\_50us_/‾26|70us‾\_50us_/ ...
//!                                       ack low       ack high    bit 0/1 high pulses
//! ```
//!
//! 1. The host holds the line low for [`START_HOLD_MS`] and releases it.
//! 2. The sensor acknowledges with an ~80µs low and an ~80µs high.
//! 3. Each bit is a ~50µs low followed by a high pulse whose width encodes
//!    the bit: ~26µs for `0`, ~70µs for `1`. Bits arrive MSB first.
//!
//! Capture and decode are split. [`SampleDecoder::capture`] is the only part
//! that touches the line and the clock; [`decode_timing`] and
//! [`decode_frame`] are pure and testable with synthetic input.
//!
//! # Example
//!
//! ```
//! use weather_station::sensor::{decode_frame, DecodeError, WireFormat};
//!
//! // humidity 50%, 20.0°C, checksum 0x46
//! let sample = decode_frame(0x32_00_14_00_46, WireFormat::Checksummed).unwrap();
//! assert_eq!(sample.humidity(), 50);
//!
//! // Same data with a wrong checksum byte
//! let result = decode_frame(0x32_00_14_00_16, WireFormat::Checksummed);
//! assert_eq!(result, Err(DecodeError::ChecksumInvalid));
//! ```
//!
//! [`START_HOLD_MS`]: crate::config::START_HOLD_MS

use super::sample::Sample;
use crate::config::{BIT_THRESHOLD_US, LINE_IDLE_TIMEOUT_US, PULSE_MAX_US, START_HOLD_MS};
use std::fmt;

/// Largest frame any wire variant carries.
pub const MAX_FRAME_BITS: usize = 40;

/// Framing used by the attached sensor.
///
/// Data bytes are always the first four bytes on the wire
/// (`humidity, humidity_frac, temperature_whole, temperature_frac`), so field
/// extraction is the same for both variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WireFormat {
    /// 40 bits: four data bytes followed by an additive checksum byte.
    #[default]
    Checksummed,
    /// 32 bits: four data bytes, no checksum.
    Unchecked,
}

impl WireFormat {
    /// Number of bits in one frame.
    pub const fn bit_count(self) -> usize {
        match self {
            Self::Checksummed => 40,
            Self::Unchecked => 32,
        }
    }
}

/// Errors from one decode cycle. All are recovered by the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The sensor did not acknowledge the start sequence.
    NoResponse,
    /// A pulse or gap exceeded the protocol bound, or the frame was short.
    Timeout,
    /// Sum of the data bytes did not match the checksum byte.
    ChecksumInvalid,
    /// The frame decoded to a humidity or temperature fraction out of range.
    OutOfRange,
    /// The GPIO driver rejected a line operation.
    LineFault,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResponse => write!(f, "sensor did not respond"),
            Self::Timeout => write!(f, "pulse exceeded {}us", PULSE_MAX_US),
            Self::ChecksumInvalid => write!(f, "checksum mismatch"),
            Self::OutOfRange => write!(f, "decoded value out of range"),
            Self::LineFault => write!(f, "data line fault"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// The GPIO driver failed to change the line direction or level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineFault;

impl From<LineFault> for DecodeError {
    fn from(_: LineFault) -> Self {
        Self::LineFault
    }
}

/// Access to the sensor's data line and a monotonic microsecond clock.
pub trait SingleWireBus {
    /// Drive the line low (output mode).
    fn drive_low(&mut self) -> Result<(), LineFault>;

    /// Release the line to the pull-up (input mode).
    fn release(&mut self) -> Result<(), LineFault>;

    /// Sample the line level.
    fn is_high(&mut self) -> bool;

    /// Monotonic time in microseconds.
    fn now_us(&mut self) -> u64;

    /// Hold the current line state for `ms` milliseconds.
    ///
    /// Runs outside the timing window, so implementations should yield.
    fn hold_ms(&mut self, ms: u32);
}

/// High-pulse durations captured during one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTiming {
    pulses: [u32; MAX_FRAME_BITS],
    len: usize,
}

impl Default for RawTiming {
    fn default() -> Self {
        Self::new()
    }
}

impl RawTiming {
    /// Create an empty capture.
    pub const fn new() -> Self {
        Self {
            pulses: [0; MAX_FRAME_BITS],
            len: 0,
        }
    }

    /// Build a capture from recorded durations.
    ///
    /// Returns `None` if there are more pulses than a frame can hold.
    pub fn from_pulses(pulses: &[u32]) -> Option<Self> {
        let mut timing = Self::new();
        for &us in pulses {
            if !timing.push(us) {
                return None;
            }
        }
        Some(timing)
    }

    /// Append a pulse. Returns `false` when full.
    pub fn push(&mut self, us: u32) -> bool {
        if self.len == MAX_FRAME_BITS {
            return false;
        }
        self.pulses[self.len] = us;
        self.len += 1;
        true
    }

    /// Recorded pulses in arrival order.
    pub fn as_slice(&self) -> &[u32] {
        &self.pulses[..self.len]
    }

    /// Number of recorded pulses.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Classify one high pulse.
pub fn classify_pulse(us: u32) -> Result<bool, DecodeError> {
    if us > PULSE_MAX_US {
        return Err(DecodeError::Timeout);
    }
    Ok(us > BIT_THRESHOLD_US)
}

/// Additive checksum over the data bytes.
pub fn checksum(data: &[u8; 4]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Turn a full capture into a sample.
pub fn decode_timing(timing: &RawTiming, format: WireFormat) -> Result<Sample, DecodeError> {
    if timing.len() != format.bit_count() {
        return Err(DecodeError::Timeout);
    }
    let mut bits = 0u64;
    for &us in timing.as_slice() {
        bits = (bits << 1) | classify_pulse(us)? as u64;
    }
    decode_frame(bits, format)
}

/// Split accumulated bits into fields and validate them.
pub fn decode_frame(bits: u64, format: WireFormat) -> Result<Sample, DecodeError> {
    let bytes = bits.to_be_bytes();
    let data = match format {
        WireFormat::Checksummed => {
            let data = [bytes[3], bytes[4], bytes[5], bytes[6]];
            if checksum(&data) != bytes[7] {
                return Err(DecodeError::ChecksumInvalid);
            }
            data
        }
        WireFormat::Unchecked => [bytes[4], bytes[5], bytes[6], bytes[7]],
    };
    Sample::new(data[0], data[2], data[3]).ok_or(DecodeError::OutOfRange)
}

/// Decoder timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Frame variant of the sensor.
    pub wire_format: WireFormat,
    /// Start-sequence hold.
    pub start_hold_ms: u32,
    /// Acknowledgement timeout.
    pub line_idle_timeout_us: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            wire_format: WireFormat::default(),
            start_hold_ms: START_HOLD_MS,
            line_idle_timeout_us: LINE_IDLE_TIMEOUT_US,
        }
    }
}

impl From<&crate::config::NodeConfig> for DecoderConfig {
    fn from(config: &crate::config::NodeConfig) -> Self {
        Self {
            wire_format: config.wire_format,
            start_hold_ms: config.start_hold_ms,
            line_idle_timeout_us: config.line_idle_timeout_us,
        }
    }
}

/// Runs full sensor transactions over a [`SingleWireBus`].
pub struct SampleDecoder<B> {
    bus: B,
    config: DecoderConfig,
}

impl<B: SingleWireBus> SampleDecoder<B> {
    /// Create a decoder for the given line.
    pub fn new(bus: B, config: DecoderConfig) -> Self {
        Self { bus, config }
    }

    /// Get the decoder configuration.
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Get a mutable reference to the underlying line.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Run one transaction and decode it.
    pub fn decode(&mut self) -> Result<Sample, DecodeError> {
        let timing = self.capture()?;
        decode_timing(&timing, self.config.wire_format)
    }

    /// Run the start sequence and record every bit's high-pulse width.
    ///
    /// Every wait is bounded; nothing here retries.
    pub fn capture(&mut self) -> Result<RawTiming, DecodeError> {
        self.bus.drive_low()?;
        self.bus.hold_ms(self.config.start_hold_ms);
        self.bus.release()?;

        // Acknowledgement: low, high, then low again before the first bit
        let idle = self.config.line_idle_timeout_us;
        for level in [false, true, false] {
            self.wait_for_level(level, idle)
                .map_err(|_| DecodeError::NoResponse)?;
        }

        let mut timing = RawTiming::new();
        for _ in 0..self.config.wire_format.bit_count() {
            self.wait_for_level(true, PULSE_MAX_US)?;
            let high_us = self.wait_for_level(false, PULSE_MAX_US)?;
            timing.push(high_us);
        }
        Ok(timing)
    }

    /// Spin until the line reaches `high`, returning the time spent.
    fn wait_for_level(&mut self, high: bool, timeout_us: u32) -> Result<u32, DecodeError> {
        let start = self.bus.now_us();
        loop {
            let elapsed = self.bus.now_us().saturating_sub(start);
            if self.bus.is_high() == high {
                return Ok(elapsed.min(u32::MAX as u64) as u32);
            }
            if elapsed > timeout_us as u64 {
                return Err(DecodeError::Timeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{frame_pulses, SimulatedSensor, ONE_PULSE_US, ZERO_PULSE_US};
    use proptest::prelude::*;

    fn decoder(sensor: SimulatedSensor, format: WireFormat) -> SampleDecoder<SimulatedSensor> {
        SampleDecoder::new(
            sensor,
            DecoderConfig {
                wire_format: format,
                ..Default::default()
            },
        )
    }

    // ==================== Frame Tests ====================

    #[test]
    fn test_frame_field_extraction() {
        let sample = decode_frame(0x32_00_14_00_46, WireFormat::Checksummed).unwrap();
        assert_eq!(sample.humidity(), 0x32);
        assert_eq!(sample.temperature_whole(), 0x14);
        assert_eq!(sample.temperature_frac(), 0);
    }

    #[test]
    fn test_frame_checksum_mismatch() {
        // 0x32 + 0x00 + 0x14 + 0x00 = 0x46, frame carries 0x16
        assert_eq!(checksum(&[0x32, 0x00, 0x14, 0x00]), 0x46);
        assert_eq!(
            decode_frame(0x32_00_14_00_16, WireFormat::Checksummed),
            Err(DecodeError::ChecksumInvalid)
        );
    }

    #[test]
    fn test_checksum_wraps_mod_256() {
        let data = [0x64, 0x00, 0xC8, 0x05];
        assert_eq!(checksum(&data), 0x31);
        let sample = decode_frame(0x64_00_C8_05_31, WireFormat::Checksummed).unwrap();
        assert_eq!(sample.humidity(), 100);
        assert_eq!(sample.temperature_whole(), 200);
    }

    #[test]
    fn test_unchecked_frame() {
        let sample = decode_frame(0x2D_00_17_03, WireFormat::Unchecked).unwrap();
        assert_eq!(sample.humidity(), 45);
        assert_eq!(sample.temperature_whole(), 23);
        assert_eq!(sample.temperature_frac(), 3);
    }

    #[test]
    fn test_frame_out_of_range() {
        // humidity 0x65 = 101, checksum valid
        assert_eq!(
            decode_frame(0x65_00_14_00_79, WireFormat::Checksummed),
            Err(DecodeError::OutOfRange)
        );
        // fraction 0x0A
        assert_eq!(
            decode_frame(0x32_00_14_0A, WireFormat::Unchecked),
            Err(DecodeError::OutOfRange)
        );
    }

    // ==================== Timing Tests ====================

    #[test]
    fn test_classify_pulse() {
        assert_eq!(classify_pulse(ZERO_PULSE_US), Ok(false));
        assert_eq!(classify_pulse(BIT_THRESHOLD_US), Ok(false));
        assert_eq!(classify_pulse(BIT_THRESHOLD_US + 1), Ok(true));
        assert_eq!(classify_pulse(ONE_PULSE_US), Ok(true));
        assert_eq!(classify_pulse(PULSE_MAX_US), Ok(true));
        assert_eq!(classify_pulse(PULSE_MAX_US + 1), Err(DecodeError::Timeout));
    }

    #[test]
    fn test_decode_synthetic_timing() {
        let pulses = frame_pulses(0x37_00_16_04_51, WireFormat::Checksummed);
        let timing = RawTiming::from_pulses(&pulses).unwrap();
        let sample = decode_timing(&timing, WireFormat::Checksummed).unwrap();
        assert_eq!(sample, Sample::new(55, 22, 4).unwrap());
    }

    #[test]
    fn test_short_capture_is_timeout() {
        let timing = RawTiming::from_pulses(&[ZERO_PULSE_US; 39]).unwrap();
        assert_eq!(
            decode_timing(&timing, WireFormat::Checksummed),
            Err(DecodeError::Timeout)
        );
    }

    #[test]
    fn test_raw_timing_capacity() {
        assert!(RawTiming::from_pulses(&[0; MAX_FRAME_BITS]).is_some());
        assert!(RawTiming::from_pulses(&[0; MAX_FRAME_BITS + 1]).is_none());
    }

    // ==================== Transaction Tests ====================

    #[test]
    fn test_transaction_checksummed() {
        let sample = Sample::new(48, 24, 6).unwrap();
        let mut decoder = decoder(SimulatedSensor::new(sample), WireFormat::Checksummed);
        assert_eq!(decoder.decode(), Ok(sample));
    }

    #[test]
    fn test_transaction_unchecked() {
        let sample = Sample::new(61, 19, 2).unwrap();
        let sensor = SimulatedSensor::new(sample).with_format(WireFormat::Unchecked);
        let mut decoder = decoder(sensor, WireFormat::Unchecked);
        assert_eq!(decoder.decode(), Ok(sample));
    }

    #[test]
    fn test_transaction_holds_line_low() {
        let sample = Sample::new(48, 24, 6).unwrap();
        let mut decoder = decoder(SimulatedSensor::new(sample), WireFormat::Checksummed);
        decoder.decode().unwrap();
        assert_eq!(decoder.bus_mut().last_hold_ms(), Some(START_HOLD_MS));
    }

    #[test]
    fn test_absent_sensor_no_response() {
        let mut decoder = decoder(SimulatedSensor::absent(), WireFormat::Checksummed);
        assert_eq!(decoder.decode(), Err(DecodeError::NoResponse));
    }

    #[test]
    fn test_stretched_pulse_aborts_with_timeout() {
        let mut pulses = frame_pulses(0x32_00_14_00_46, WireFormat::Checksummed);
        pulses[7] = PULSE_MAX_US + 40;
        let mut decoder = decoder(
            SimulatedSensor::with_pulses(pulses),
            WireFormat::Checksummed,
        );
        assert_eq!(decoder.decode(), Err(DecodeError::Timeout));
    }

    #[test]
    fn test_corrupted_frame_checksum() {
        let pulses = frame_pulses(0x32_00_14_00_16, WireFormat::Checksummed);
        let mut decoder = decoder(
            SimulatedSensor::with_pulses(pulses),
            WireFormat::Checksummed,
        );
        assert_eq!(decoder.decode(), Err(DecodeError::ChecksumInvalid));
    }

    #[test]
    fn test_line_fault() {
        let mut decoder = decoder(SimulatedSensor::faulty(), WireFormat::Checksummed);
        assert_eq!(decoder.decode(), Err(DecodeError::LineFault));
    }

    proptest! {
        #[test]
        fn prop_valid_frames_round_trip(h in 0u8..=100, whole in 0u8..=60, frac in 0u8..=9) {
            let sample = Sample::new(h, whole, frac).unwrap();
            let data = [h, 0, whole, frac];
            let bits = u64::from_be_bytes([0, 0, 0, data[0], data[1], data[2], data[3], checksum(&data)]);
            let timing = RawTiming::from_pulses(&frame_pulses(bits, WireFormat::Checksummed)).unwrap();
            prop_assert_eq!(decode_timing(&timing, WireFormat::Checksummed), Ok(sample));
        }

        #[test]
        fn prop_overlong_pulse_is_timeout(
            position in 0usize..40,
            width in (PULSE_MAX_US + 1)..10_000u32,
        ) {
            let mut pulses = frame_pulses(0x32_00_14_00_46, WireFormat::Checksummed);
            pulses[position] = width;
            let timing = RawTiming::from_pulses(&pulses).unwrap();
            prop_assert_eq!(
                decode_timing(&timing, WireFormat::Checksummed),
                Err(DecodeError::Timeout)
            );
        }

        #[test]
        fn prop_checksum_mismatch_detected(bits in 0u64..(1u64 << 40)) {
            let bytes = bits.to_be_bytes();
            let data = [bytes[3], bytes[4], bytes[5], bytes[6]];
            prop_assume!(checksum(&data) != bytes[7]);
            prop_assert_eq!(
                decode_frame(bits, WireFormat::Checksummed),
                Err(DecodeError::ChecksumInvalid)
            );
        }
    }
}
