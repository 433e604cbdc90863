//! Temperature/humidity acquisition.
//!
//! # Components
//!
//! - [`sample`] - validated reading type
//! - [`decoder`] - single-wire protocol capture and decode (host-testable)
//! - [`acquisition`] - periodic task feeding the reading store
//! - [`dht_pin`] - ESP-IDF GPIO line adapter (ESP32 only)

mod acquisition;
mod decoder;
mod sample;

#[cfg(feature = "esp32")]
mod dht_pin;

pub use acquisition::{Acquisition, AcquisitionStats};
pub use decoder::{
    checksum, classify_pulse, decode_frame, decode_timing, DecodeError, DecoderConfig, LineFault,
    RawTiming, SampleDecoder, SingleWireBus, WireFormat, MAX_FRAME_BITS,
};
pub use sample::{Sample, MAX_HUMIDITY, MAX_TEMPERATURE_FRAC, RADIO_FRAME_LEN};

#[cfg(feature = "esp32")]
pub use dht_pin::DhtPin;
