//! Host stand-ins for the hardware adapters.
//!
//! The host binary runs the full task graph against these, and the unit and
//! integration tests use them as doubles:
//!
//! - [`SimulatedSensor`] - DHT11 waveform on a virtual microsecond clock
//! - [`LoggingRadio`] - records advertising restarts and notifications
//! - [`SimulatedWifi`] - scripted station driver

use crate::network::{ConnectionError, ConnectionEvents, NetworkEvent, WifiDriver};
use crate::provisioning::{Credentials, RadioPort};
use crate::sensor::{checksum, LineFault, Sample, SingleWireBus, WireFormat, RADIO_FRAME_LEN};
use log::{debug, info};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// High-pulse width the simulated sensor uses for a `0` bit (µs).
pub const ZERO_PULSE_US: u32 = 26;
/// High-pulse width the simulated sensor uses for a `1` bit (µs).
pub const ONE_PULSE_US: u32 = 70;

/// Gap between the host releasing the line and the sensor answering (µs).
const RESPONSE_DELAY_US: u32 = 30;
/// Width of each half of the acknowledgement (µs).
const ACK_US: u32 = 80;
/// Low gap before every bit and after the last one (µs).
const BIT_GAP_US: u32 = 50;

/// High-pulse widths encoding the low `format.bit_count()` bits of `bits`,
/// MSB first.
pub fn frame_pulses(bits: u64, format: WireFormat) -> Vec<u32> {
    (0..format.bit_count())
        .rev()
        .map(|i| {
            if (bits >> i) & 1 == 1 {
                ONE_PULSE_US
            } else {
                ZERO_PULSE_US
            }
        })
        .collect()
}

/// Frame bits a sensor would send for `sample`.
pub fn sample_bits(sample: &Sample, format: WireFormat) -> u64 {
    let [a, b, c, d] = sample.to_radio_frame();
    match format {
        WireFormat::Checksummed => {
            u64::from_be_bytes([0, 0, 0, a, b, c, d, checksum(&[a, b, c, d])])
        }
        WireFormat::Unchecked => u64::from_be_bytes([0, 0, 0, 0, a, b, c, d]),
    }
}

/// Simulated DHT11 on a virtual clock.
///
/// Every call to `now_us` advances the clock by 1 µs, and `hold_ms` by the
/// full hold, so decoding is deterministic and never sleeps.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    sample: Option<Sample>,
    format: WireFormat,
    pulses: Vec<u32>,
    stretched_gap: Option<(usize, u32)>,
    present: bool,
    faulty: bool,
    drifting: bool,
    clock: u64,
    driven_low: bool,
    released_at: Option<u64>,
    segments: Vec<(bool, u32)>,
    last_hold_ms: Option<u32>,
}

impl SimulatedSensor {
    fn with_parts(sample: Option<Sample>, pulses: Vec<u32>) -> Self {
        Self {
            sample,
            format: WireFormat::default(),
            pulses,
            stretched_gap: None,
            present: true,
            faulty: false,
            drifting: false,
            clock: 0,
            driven_low: false,
            released_at: None,
            segments: Vec::new(),
            last_hold_ms: None,
        }
    }

    /// Sensor that always reports `sample` in the checksummed format.
    pub fn new(sample: Sample) -> Self {
        let pulses = frame_pulses(sample_bits(&sample, WireFormat::Checksummed), WireFormat::Checksummed);
        Self::with_parts(Some(sample), pulses)
    }

    /// Sensor whose reading changes slightly on every transaction.
    pub fn drifting(sample: Sample) -> Self {
        Self {
            drifting: true,
            ..Self::new(sample)
        }
    }

    /// Sensor that replays exactly these high-pulse widths.
    pub fn with_pulses(pulses: Vec<u32>) -> Self {
        Self::with_parts(None, pulses)
    }

    /// Nothing attached; the pull-up keeps the line high.
    pub fn absent() -> Self {
        Self {
            present: false,
            ..Self::with_parts(None, Vec::new())
        }
    }

    /// Line whose driver rejects every level change.
    pub fn faulty() -> Self {
        Self {
            faulty: true,
            ..Self::with_parts(None, Vec::new())
        }
    }

    /// Switch the framing the sensor sends.
    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        if let Some(sample) = self.sample {
            self.pulses = frame_pulses(sample_bits(&sample, format), format);
        }
        self
    }

    /// Hold the low gap before bit `index` for `us` instead of the usual
    /// 50 µs. Index `bit_count` is the gap after the last bit.
    pub fn with_gap(mut self, index: usize, us: u32) -> Self {
        self.stretched_gap = Some((index, us));
        self
    }

    /// Reading the sensor will send next.
    pub fn sample(&self) -> Option<Sample> {
        self.sample
    }

    /// Duration of the most recent start-sequence hold.
    pub fn last_hold_ms(&self) -> Option<u32> {
        self.last_hold_ms
    }

    fn drift(&mut self) {
        let Some(sample) = self.sample else {
            return;
        };
        let tenths = sample.temperature_whole() as u32 * 10 + sample.temperature_frac() as u32 + 1;
        let tenths = if tenths > 300 { 180 } else { tenths };
        let humidity = if sample.humidity() >= 70 {
            30
        } else {
            sample.humidity() + 1
        };
        if let Some(next) = Sample::new(humidity, (tenths / 10) as u8, (tenths % 10) as u8) {
            self.sample = Some(next);
            self.pulses = frame_pulses(sample_bits(&next, self.format), self.format);
        }
    }

    fn gap_us(&self, index: usize) -> u32 {
        match self.stretched_gap {
            Some((stretched, us)) if stretched == index => us,
            _ => BIT_GAP_US,
        }
    }

    fn level(&self) -> bool {
        if self.driven_low {
            return false;
        }
        let Some(released_at) = self.released_at else {
            return true;
        };
        let mut offset = self.clock.saturating_sub(released_at);
        for &(level, duration) in &self.segments {
            if offset < duration as u64 {
                return level;
            }
            offset -= duration as u64;
        }
        true
    }
}

impl SingleWireBus for SimulatedSensor {
    fn drive_low(&mut self) -> Result<(), LineFault> {
        if self.faulty {
            return Err(LineFault);
        }
        self.driven_low = true;
        self.released_at = None;
        Ok(())
    }

    fn release(&mut self) -> Result<(), LineFault> {
        if self.faulty {
            return Err(LineFault);
        }
        self.driven_low = false;
        self.released_at = Some(self.clock);
        self.segments.clear();
        if self.present {
            self.segments.extend([
                (true, RESPONSE_DELAY_US),
                (false, ACK_US),
                (true, ACK_US),
            ]);
            let bits: Vec<(bool, u32)> = self
                .pulses
                .iter()
                .enumerate()
                .flat_map(|(index, &pulse)| [(false, self.gap_us(index)), (true, pulse)])
                .collect();
            let trailing = self.gap_us(self.pulses.len());
            self.segments.extend(bits);
            self.segments.push((false, trailing));
            if self.drifting {
                self.drift();
            }
        }
        Ok(())
    }

    fn is_high(&mut self) -> bool {
        self.level()
    }

    fn now_us(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn hold_ms(&mut self, ms: u32) {
        self.last_hold_ms = Some(ms);
        self.clock += ms as u64 * 1000;
    }
}

/// Radio that logs instead of transmitting.
#[derive(Debug, Default)]
pub struct LoggingRadio {
    notifications: Mutex<Vec<(u16, [u8; RADIO_FRAME_LEN])>>,
    advertising_restarts: AtomicUsize,
}

impl LoggingRadio {
    /// Create a radio with nothing recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications sent so far, oldest first.
    pub fn notifications(&self) -> Vec<(u16, [u8; RADIO_FRAME_LEN])> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of advertising restarts.
    pub fn advertising_restarts(&self) -> usize {
        self.advertising_restarts.load(Ordering::Relaxed)
    }
}

impl RadioPort for LoggingRadio {
    fn restart_advertising(&self) {
        self.advertising_restarts.fetch_add(1, Ordering::Relaxed);
        debug!("[radio] advertising restarted");
    }

    fn notify(&self, conn: u16, frame: &[u8; RADIO_FRAME_LEN]) {
        info!("[radio] notify conn {}: {:02x?}", conn, frame);
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((conn, *frame));
    }
}

#[derive(Debug, Default)]
struct WifiInner {
    script: VecDeque<Vec<NetworkEvent>>,
    fallback: Option<NetworkEvent>,
    events: Option<Arc<ConnectionEvents>>,
    subscriptions: usize,
    connect_requests: usize,
    stops: usize,
    configured_name: Option<String>,
}

/// Station driver that answers connect requests from a script.
///
/// Each connect request pops one scripted answer and delivers its events
/// synchronously, in order. Once the script runs out the fallback event (if
/// any) is delivered instead.
#[derive(Debug, Clone, Default)]
pub struct SimulatedWifi {
    inner: Arc<Mutex<WifiInner>>,
}

impl SimulatedWifi {
    /// Driver that answers requests with `script`, then stays silent.
    pub fn scripted(script: &[NetworkEvent]) -> Self {
        let inner = WifiInner {
            script: script.iter().map(|&event| vec![event]).collect(),
            ..Default::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Driver that always obtains an address.
    pub fn reliable() -> Self {
        let driver = Self::scripted(&[]);
        driver.lock().fallback = Some(NetworkEvent::GotIp);
        driver
    }

    /// Queue `events` as the answer to one more connect request.
    ///
    /// All of them are delivered before the request returns, so the
    /// connector sees them back to back.
    pub fn answer_with(&self, events: &[NetworkEvent]) {
        self.lock().script.push_back(events.to_vec());
    }

    /// Deliver a stack event now, as the radio would on its own.
    ///
    /// Dropped if nothing is subscribed.
    pub fn inject(&self, event: NetworkEvent) {
        let events = self.lock().events.clone();
        match events {
            Some(events) => events.deliver(event),
            None => debug!("[wifi] no subscriber for {:?}", event),
        }
    }

    /// Number of connect requests issued.
    pub fn connect_requests(&self) -> usize {
        self.lock().connect_requests
    }

    /// Number of times the radio was stopped.
    pub fn stops(&self) -> usize {
        self.lock().stops
    }

    /// Live subscription guards.
    pub fn active_subscriptions(&self) -> usize {
        self.lock().subscriptions
    }

    /// Network name from the last `configure`.
    pub fn configured_name(&self) -> Option<String> {
        self.lock().configured_name.clone()
    }

    fn lock(&self) -> MutexGuard<'_, WifiInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Subscription guard of [`SimulatedWifi`].
#[derive(Debug)]
pub struct SimulatedSubscription {
    inner: Arc<Mutex<WifiInner>>,
}

impl Drop for SimulatedSubscription {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.subscriptions = inner.subscriptions.saturating_sub(1);
        if inner.subscriptions == 0 {
            inner.events = None;
        }
    }
}

impl WifiDriver for SimulatedWifi {
    type Subscription = SimulatedSubscription;

    fn subscribe(
        &mut self,
        events: Arc<ConnectionEvents>,
    ) -> Result<Self::Subscription, ConnectionError> {
        let mut inner = self.lock();
        inner.events = Some(events);
        inner.subscriptions += 1;
        Ok(SimulatedSubscription {
            inner: self.inner.clone(),
        })
    }

    fn configure(&mut self, credentials: &Credentials) -> Result<(), ConnectionError> {
        self.lock().configured_name = Some(credentials.network_name_lossy());
        Ok(())
    }

    fn start(&mut self) -> Result<(), ConnectionError> {
        debug!("[wifi] started");
        Ok(())
    }

    fn connect_request(&mut self) -> Result<(), ConnectionError> {
        let (answer, events) = {
            let mut inner = self.lock();
            inner.connect_requests += 1;
            let fallback = inner.fallback;
            let answer = inner
                .script
                .pop_front()
                .unwrap_or_else(|| fallback.into_iter().collect());
            (answer, inner.events.clone())
        };
        if let Some(events) = events {
            debug!("[wifi] answering connect request with {:?}", answer);
            for event in answer {
                events.deliver(event);
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ConnectionError> {
        self.lock().stops += 1;
        debug!("[wifi] stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_pulses_msb_first() {
        let pulses = frame_pulses(0b1, WireFormat::Unchecked);
        assert_eq!(pulses.len(), 32);
        assert_eq!(pulses[31], ONE_PULSE_US);
        assert!(pulses[..31].iter().all(|&p| p == ZERO_PULSE_US));
    }

    #[test]
    fn test_sample_bits_checksummed() {
        let sample = Sample::new(50, 20, 0).unwrap();
        assert_eq!(sample_bits(&sample, WireFormat::Checksummed), 0x32_00_14_00_46);
        assert_eq!(sample_bits(&sample, WireFormat::Unchecked), 0x32_00_14_00);
    }

    #[test]
    fn test_absent_line_stays_high() {
        let mut sensor = SimulatedSensor::absent();
        sensor.drive_low().unwrap();
        assert!(!sensor.is_high());
        sensor.release().unwrap();
        for _ in 0..100 {
            sensor.now_us();
            assert!(sensor.is_high());
        }
    }

    #[test]
    fn test_drifting_sensor_changes_reading() {
        let start = Sample::new(40, 20, 9).unwrap();
        let mut sensor = SimulatedSensor::drifting(start);
        sensor.drive_low().unwrap();
        sensor.release().unwrap();
        assert_eq!(sensor.sample(), Sample::new(41, 21, 0));
    }

    #[test]
    fn test_scripted_wifi_counts_requests() {
        let mut wifi = SimulatedWifi::scripted(&[NetworkEvent::Disconnected]);
        wifi.connect_request().unwrap();
        wifi.connect_request().unwrap();
        assert_eq!(wifi.connect_requests(), 2);
    }

    #[test]
    fn test_logging_radio_records() {
        let radio = LoggingRadio::new();
        radio.notify(2, &[1, 0, 2, 3]);
        radio.restart_advertising();
        assert_eq!(radio.notifications(), vec![(2, [1, 0, 2, 3])]);
        assert_eq!(radio.advertising_restarts(), 1);
    }
}
