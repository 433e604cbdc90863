//! DHT11 weather station firmware library.
//!
//! Everything here except the hardware adapters is platform independent and
//! tested on the host. The adapters (`DhtPin`, the NimBLE GATT binding, the
//! ESP-IDF station driver) are behind the `esp32` feature; `sim` provides
//! host stand-ins for all of them and is left out of firmware builds.
//!
//! # Task graph
//!
//! ```text
//! acquisition --> ReadingStore --+--> Distributor::pump --> ProvisioningService::notify
//!                                +--> DisplayRefresher  --> DisplaySink
//!                                +--> SnapshotServer (per request)
//!
//! BLE writes --> ProvisioningService --(ready)--> Mailbox --> ControlLoop --> NetworkConnector
//! ```

pub mod config;
pub mod control;
pub mod display;
pub mod distributor;
pub mod network;
pub mod provisioning;
pub mod sensor;
pub mod signal;
#[cfg(not(feature = "esp32"))]
pub mod sim;
pub mod store;
pub mod web;

// Re-export commonly used items
pub use config::{ConfigError, NodeConfig};
pub use control::ControlLoop;
pub use display::{DisplayRefresher, DisplaySink, LogDisplay};
pub use distributor::Distributor;
pub use network::{ConnectionError, ConnectionState, NetworkConnector, WifiDriver};
pub use provisioning::{Credentials, ProvisioningService, RadioEvent, RadioPort};
pub use sensor::{Acquisition, DecodeError, Sample, SampleDecoder, SingleWireBus, WireFormat};
pub use signal::{Mailbox, Signal};
pub use store::ReadingStore;
pub use web::SnapshotServer;
