//! BLE credential provisioning and reading notification.
//!
//! - [`credentials`] - bounded, zeroizing credential storage
//! - [`service`] - GATT service state machine (host-testable)
//! - [`gatt`] - NimBLE binding (ESP32 only)

mod credentials;
mod service;

#[cfg(feature = "esp32")]
pub mod gatt;

pub use credentials::{BoundedBytes, Credentials, MAX_NETWORK_NAME_LEN, MAX_NETWORK_SECRET_LEN};
pub use service::{
    Field, ProvisioningService, RadioEvent, RadioPort, ADVERTISED_SERVICE_UUID, CLIENT_CONFIG_LEN,
    DEVICE_NAME, NETWORK_NAME_CHAR_UUID, NETWORK_SECRET_CHAR_UUID, NETWORK_SECRET_WRITE_MAX,
    NOTIFY_ENABLED, READING_CHAR_UUID, SERVICE_UUID,
};
