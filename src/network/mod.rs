//! Network join and station driver.
//!
//! [`NetworkConnector`] runs the retry state machine against any
//! [`WifiDriver`]. On ESP32 the driver is [`EspWifiDriver`]; on the host the
//! simulated driver in [`crate::sim`] stands in.

mod connector;

#[cfg(feature = "esp32")]
mod wifi;

pub use connector::{
    ConnectionError, ConnectionEvents, ConnectionState, ConnectionStatus, NetworkConnector,
    NetworkEvent, WifiDriver,
};

#[cfg(feature = "esp32")]
pub use wifi::EspWifiDriver;
