//! ESP-IDF data line for the DHT11.
//!
//! The pin runs in open-drain mode: "low" pulls the line down, "high"
//! releases it to the external pull-up, and the input buffer stays enabled
//! so the sensor's pulses can be read back without switching direction.

use super::decoder::{LineFault, SingleWireBus};
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyIOPin, InputOutput, PinDriver, Pull};
use esp_idf_sys::EspError;
use log::warn;

/// Open-drain GPIO wired to the sensor's data pin.
pub struct DhtPin<'d> {
    pin: PinDriver<'d, AnyIOPin, InputOutput>,
}

impl<'d> DhtPin<'d> {
    /// Configure `pin` as an open-drain line idling high.
    pub fn new(pin: AnyIOPin) -> Result<Self, EspError> {
        let mut pin = PinDriver::input_output_od(pin)?;
        pin.set_pull(Pull::Up)?;
        pin.set_high()?;
        Ok(Self { pin })
    }
}

impl SingleWireBus for DhtPin<'_> {
    fn drive_low(&mut self) -> Result<(), LineFault> {
        self.pin.set_low().map_err(|e| {
            warn!("DHT line drive failed: {:?}", e);
            LineFault
        })
    }

    fn release(&mut self) -> Result<(), LineFault> {
        self.pin.set_high().map_err(|e| {
            warn!("DHT line release failed: {:?}", e);
            LineFault
        })
    }

    fn is_high(&mut self) -> bool {
        self.pin.is_high()
    }

    fn now_us(&mut self) -> u64 {
        // esp_timer is monotonic from boot and never negative
        unsafe { esp_idf_sys::esp_timer_get_time() as u64 }
    }

    fn hold_ms(&mut self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}
