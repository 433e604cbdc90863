//! Periodic acquisition task.
//!
//! Runs one decoder transaction per period and publishes successful samples
//! to the [`ReadingStore`]. Failed cycles leave the store untouched; the next
//! period simply tries again.

use super::decoder::{DecodeError, SampleDecoder, SingleWireBus};
use super::sample::Sample;
use crate::store::ReadingStore;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Decode outcome counters.
#[derive(Debug, Default)]
pub struct AcquisitionStats {
    /// Cycles that produced a sample.
    pub decoded: AtomicUsize,
    /// Cycles that failed for any reason.
    pub failed: AtomicUsize,
}

impl AcquisitionStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, result: &Result<Sample, DecodeError>) {
        let counter = if result.is_ok() {
            &self.decoded
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Sensor acquisition loop.
pub struct Acquisition<B> {
    decoder: SampleDecoder<B>,
    store: Arc<ReadingStore>,
    period: Duration,
    stats: Arc<AcquisitionStats>,
}

impl<B: SingleWireBus> Acquisition<B> {
    /// Create an acquisition task writing into `store`.
    pub fn new(decoder: SampleDecoder<B>, store: Arc<ReadingStore>, period: Duration) -> Self {
        Self {
            decoder,
            store,
            period,
            stats: Arc::new(AcquisitionStats::new()),
        }
    }

    /// Shared counters for this task.
    pub fn stats(&self) -> Arc<AcquisitionStats> {
        self.stats.clone()
    }

    /// Run one transaction, publishing the sample on success.
    pub fn run_cycle(&mut self) -> Result<Sample, DecodeError> {
        let result = self.decoder.decode();
        self.stats.record(&result);
        match result {
            Ok(sample) => {
                let generation = self.store.replace(sample);
                info!("{} (generation {})", sample, generation);
            }
            Err(e) => warn!("Sensor read failed: {}", e),
        }
        result
    }

    /// Run forever. `after_cycle` runs right after every transaction, before
    /// the task sleeps; the radio notify path hooks in here.
    pub fn run(mut self, mut after_cycle: impl FnMut()) -> ! {
        info!("Acquisition task started, period {:?}", self.period);
        loop {
            let _ = self.run_cycle();
            after_cycle();
            debug!("Acquisition sleeping {:?}", self.period);
            thread::sleep(self.period);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PULSE_MAX_US;
    use crate::sensor::{DecoderConfig, WireFormat};
    use crate::sim::{frame_pulses, SimulatedSensor};
    use proptest::prelude::*;

    const VALID_FRAME: u64 = 0x32_00_14_00_46;

    /// Task over `sensor` whose store already holds `previous`.
    fn preloaded(
        sensor: SimulatedSensor,
        previous: Sample,
    ) -> (Acquisition<SimulatedSensor>, Arc<ReadingStore>) {
        let store = Arc::new(ReadingStore::new());
        store.replace(previous);
        let decoder = SampleDecoder::new(sensor, DecoderConfig::default());
        (
            Acquisition::new(decoder, store.clone(), Duration::from_millis(10)),
            store,
        )
    }

    fn acquisition(sensor: SimulatedSensor) -> (Acquisition<SimulatedSensor>, Arc<ReadingStore>) {
        let store = Arc::new(ReadingStore::new());
        let decoder = SampleDecoder::new(sensor, DecoderConfig::default());
        (
            Acquisition::new(decoder, store.clone(), Duration::from_millis(10)),
            store,
        )
    }

    #[test]
    fn test_successful_cycle_replaces_reading() {
        let sample = Sample::new(42, 22, 1).unwrap();
        let (mut task, store) = acquisition(SimulatedSensor::new(sample));

        assert_eq!(task.run_cycle(), Ok(sample));
        assert_eq!(store.current(), Some(sample));
        assert_eq!(store.generation(), 1);
        assert_eq!(task.stats().decoded.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_failed_cycle_leaves_store_unchanged() {
        let sample = Sample::new(42, 22, 1).unwrap();
        let store = Arc::new(ReadingStore::new());
        store.replace(sample);

        let pulses = frame_pulses(0x32_00_14_00_16, WireFormat::Checksummed);
        let decoder = SampleDecoder::new(SimulatedSensor::with_pulses(pulses), DecoderConfig::default());
        let mut task = Acquisition::new(decoder, store.clone(), Duration::from_millis(10));

        assert_eq!(task.run_cycle(), Err(DecodeError::ChecksumInvalid));
        assert_eq!(store.current(), Some(sample));
        assert_eq!(store.generation(), 1);
        assert_eq!(task.stats().failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_absent_sensor_counts_failures() {
        let (mut task, store) = acquisition(SimulatedSensor::absent());
        for _ in 0..3 {
            assert_eq!(task.run_cycle(), Err(DecodeError::NoResponse));
        }
        assert_eq!(store.current(), None);
        assert_eq!(task.stats().failed.load(Ordering::Relaxed), 3);
        assert_eq!(task.stats().decoded.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_stretched_trailing_gap_is_harmless() {
        let previous = Sample::new(42, 22, 1).unwrap();
        let sensor = SimulatedSensor::with_pulses(frame_pulses(VALID_FRAME, WireFormat::Checksummed))
            .with_gap(40, PULSE_MAX_US * 10);
        let (mut task, store) = preloaded(sensor, previous);

        let sample = Sample::new(50, 20, 0).unwrap();
        assert_eq!(task.run_cycle(), Ok(sample));
        assert_eq!(store.current(), Some(sample));
        assert_eq!(store.generation(), 2);
    }

    proptest! {
        #[test]
        fn prop_overlong_pulse_leaves_store_unchanged(
            position in 0usize..40,
            width in (PULSE_MAX_US + 5)..2_000u32,
        ) {
            let previous = Sample::new(42, 22, 1).unwrap();
            let mut pulses = frame_pulses(VALID_FRAME, WireFormat::Checksummed);
            pulses[position] = width;
            let (mut task, store) = preloaded(SimulatedSensor::with_pulses(pulses), previous);

            prop_assert_eq!(task.run_cycle(), Err(DecodeError::Timeout));
            prop_assert_eq!(store.current(), Some(previous));
            prop_assert_eq!(store.generation(), 1);
        }

        #[test]
        fn prop_overlong_gap_leaves_store_unchanged(
            position in 0usize..40,
            width in (PULSE_MAX_US + 5)..2_000u32,
        ) {
            let previous = Sample::new(42, 22, 1).unwrap();
            let sensor = SimulatedSensor::with_pulses(frame_pulses(VALID_FRAME, WireFormat::Checksummed))
                .with_gap(position, width);
            let (mut task, store) = preloaded(sensor, previous);

            prop_assert_eq!(task.run_cycle(), Err(DecodeError::Timeout));
            prop_assert_eq!(store.current(), Some(previous));
            prop_assert_eq!(store.generation(), 1);
        }
    }
}
