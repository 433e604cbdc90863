//! Validated temperature/humidity sample.

use std::fmt;

/// Highest relative humidity a sample may carry (percent).
pub const MAX_HUMIDITY: u8 = 100;

/// Highest tenths digit of the temperature.
pub const MAX_TEMPERATURE_FRAC: u8 = 9;

/// Size of the radio representation of a sample.
pub const RADIO_FRAME_LEN: usize = 4;

/// One decoded sensor reading.
///
/// Fields are private so a `Sample` can only exist in a validated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sample {
    humidity: u8,
    temperature_whole: u8,
    temperature_frac: u8,
}

impl Sample {
    /// Create a sample, returning `None` if a field is out of range.
    pub const fn new(humidity: u8, temperature_whole: u8, temperature_frac: u8) -> Option<Self> {
        if humidity > MAX_HUMIDITY || temperature_frac > MAX_TEMPERATURE_FRAC {
            return None;
        }
        Some(Self {
            humidity,
            temperature_whole,
            temperature_frac,
        })
    }

    /// Relative humidity in percent.
    pub fn humidity(&self) -> u8 {
        self.humidity
    }

    /// Integer part of the temperature in °C.
    pub fn temperature_whole(&self) -> u8 {
        self.temperature_whole
    }

    /// Tenths of a degree.
    pub fn temperature_frac(&self) -> u8 {
        self.temperature_frac
    }

    /// Temperature in °C.
    pub fn celsius(&self) -> f32 {
        self.temperature_whole as f32 + self.temperature_frac as f32 / 10.0
    }

    /// Temperature in °F.
    pub fn fahrenheit(&self) -> f32 {
        self.celsius() * 1.8 + 32.0
    }

    /// Encode for the reading characteristic.
    ///
    /// Layout: `[humidity, unused, temperature_whole, temperature_frac]`.
    /// Byte 1 is the sensor's humidity fraction slot, always zero on DHT11.
    pub fn to_radio_frame(&self) -> [u8; RADIO_FRAME_LEN] {
        [
            self.humidity,
            0,
            self.temperature_whole,
            self.temperature_frac,
        ]
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Humidity: {}% | Temperature: {:.1}°C ~ {:.2}°F",
            self.humidity,
            self.celsius(),
            self.fahrenheit()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_sample() {
        let sample = Sample::new(50, 20, 0).unwrap();
        assert_eq!(sample.humidity(), 50);
        assert_eq!(sample.temperature_whole(), 20);
        assert_eq!(sample.temperature_frac(), 0);
    }

    #[test]
    fn test_humidity_bounds() {
        assert!(Sample::new(100, 20, 0).is_some());
        assert!(Sample::new(101, 20, 0).is_none());
    }

    #[test]
    fn test_fraction_bounds() {
        assert!(Sample::new(50, 20, 9).is_some());
        assert!(Sample::new(50, 20, 10).is_none());
    }

    #[test]
    fn test_celsius_and_fahrenheit() {
        let sample = Sample::new(40, 23, 5).unwrap();
        assert!((sample.celsius() - 23.5).abs() < 1e-4);
        assert!((sample.fahrenheit() - 74.3).abs() < 1e-3);
    }

    #[test]
    fn test_radio_frame_layout() {
        let sample = Sample::new(55, 21, 7).unwrap();
        assert_eq!(sample.to_radio_frame(), [55, 0, 21, 7]);
    }

    #[test]
    fn test_display_text() {
        let sample = Sample::new(50, 20, 0).unwrap();
        assert_eq!(
            sample.to_string(),
            "Humidity: 50% | Temperature: 20.0°C ~ 68.00°F"
        );
    }
}
