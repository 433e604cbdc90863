//! BLE provisioning service state machine.
//!
//! Platform independent: the GATT adapter translates stack callbacks into
//! [`RadioEvent`]s and implements [`RadioPort`] for the two things the
//! service asks of the radio (advertising restart and notification).
//!
//! # GATT layout
//!
//! | Characteristic | UUID     | Properties   | Size |
//! |----------------|----------|--------------|------|
//! | reading        | `0xFF01` | read, notify | 4    |
//! | network name   | `0xFF02` | write        | 32   |
//! | network secret | `0xFF03` | write        | 63   |
//!
//! All three live in service `0x00FF`. The reading payload is
//! `[humidity, 0, temperature_whole, temperature_frac]`.
//!
//! # Ready event
//!
//! Once both the network name and the network secret have been written
//! (in any order, with any number of rewrites in between), the registered
//! callback receives a copy of the pair exactly once and both written flags
//! reset. A later pair of writes fires again.

use super::credentials::{Credentials, MAX_NETWORK_NAME_LEN};
use crate::sensor::{Sample, RADIO_FRAME_LEN};
use log::{debug, info, warn};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Primary service UUID.
pub const SERVICE_UUID: u16 = 0x00FF;
/// Reading characteristic UUID (read, notify).
pub const READING_CHAR_UUID: u16 = 0xFF01;
/// Network name characteristic UUID (write).
pub const NETWORK_NAME_CHAR_UUID: u16 = 0xFF02;
/// Network secret characteristic UUID (write).
pub const NETWORK_SECRET_CHAR_UUID: u16 = 0xFF03;

/// Name carried in advertising packets.
pub const DEVICE_NAME: &str = "Weather Station";

/// 128-bit service UUID carried in advertising packets.
pub const ADVERTISED_SERVICE_UUID: &str = "000000ff-0000-1000-8000-00805f9b34fb";

/// Longest network secret a peer may write (WPA2 passphrase limit).
pub const NETWORK_SECRET_WRITE_MAX: usize = 63;

/// Client configuration bit enabling notifications.
pub const NOTIFY_ENABLED: u8 = 0x01;

/// Size of the client characteristic configuration value.
pub const CLIENT_CONFIG_LEN: usize = 2;

/// Writable attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Client characteristic configuration of the reading characteristic.
    ClientConfig,
    /// Network name characteristic.
    NetworkName,
    /// Network secret characteristic.
    NetworkSecret,
}

impl Field {
    /// Largest value the attribute accepts. Longer writes are truncated.
    pub const fn max_len(self) -> usize {
        match self {
            Self::ClientConfig => CLIENT_CONFIG_LEN,
            Self::NetworkName => MAX_NETWORK_NAME_LEN,
            Self::NetworkSecret => NETWORK_SECRET_WRITE_MAX,
        }
    }

    /// Look up a characteristic by its 16-bit UUID.
    pub const fn from_uuid(uuid: u16) -> Option<Self> {
        match uuid {
            NETWORK_NAME_CHAR_UUID => Some(Self::NetworkName),
            NETWORK_SECRET_CHAR_UUID => Some(Self::NetworkSecret),
            _ => None,
        }
    }
}

/// Events delivered by the radio stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// A peer connected.
    Connected { conn: u16 },
    /// A peer disconnected.
    Disconnected { conn: u16 },
    /// A peer wrote an attribute.
    Write { field: Field, data: Vec<u8> },
}

/// Radio operations the service drives.
pub trait RadioPort: Send + Sync {
    /// Start advertising again after a disconnect.
    fn restart_advertising(&self);

    /// Push the reading payload to `conn`.
    fn notify(&self, conn: u16, frame: &[u8; RADIO_FRAME_LEN]);
}

type ReadyCallback = Box<dyn Fn(Credentials) + Send + Sync>;

#[derive(Default)]
struct ServiceState {
    session: Option<u16>,
    client_config: [u8; CLIENT_CONFIG_LEN],
    credentials: Credentials,
    reading: [u8; RADIO_FRAME_LEN],
}

/// Provisioning GATT service.
pub struct ProvisioningService<P> {
    port: P,
    state: Mutex<ServiceState>,
    on_ready: Mutex<Option<ReadyCallback>>,
}

impl<P: RadioPort> ProvisioningService<P> {
    /// Create the service over a radio port. No peer, notifications off.
    pub fn new(port: P) -> Self {
        Self {
            port,
            state: Mutex::new(ServiceState::default()),
            on_ready: Mutex::new(None),
        }
    }

    /// Get the radio port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Register the handler for completed credential pairs.
    ///
    /// Replaces any earlier handler.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(Credentials) + Send + Sync + 'static,
    {
        *self
            .on_ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(callback));
    }

    /// Dispatch one radio event.
    pub fn handle(&self, event: RadioEvent) {
        match event {
            RadioEvent::Connected { conn } => self.on_connect(conn),
            RadioEvent::Disconnected { conn } => self.on_disconnect(conn),
            RadioEvent::Write { field, data } => {
                self.on_write(field, &data);
            }
        }
    }

    /// Record the peer session.
    pub fn on_connect(&self, conn: u16) {
        let mut state = self.lock_state();
        if let Some(previous) = state.session.replace(conn) {
            warn!("BLE connect {} while session {} active", conn, previous);
        }
        info!("BLE peer connected (conn {})", conn);
    }

    /// Clear the session and resume advertising.
    pub fn on_disconnect(&self, conn: u16) {
        {
            let mut state = self.lock_state();
            if state.session == Some(conn) {
                state.session = None;
                state.client_config = [0; CLIENT_CONFIG_LEN];
                info!("BLE peer disconnected (conn {})", conn);
            } else {
                debug!("BLE disconnect for unknown conn {}", conn);
            }
        }
        self.port.restart_advertising();
    }

    /// Store an attribute write.
    ///
    /// Returns `true` if this write completed a credential pair and the
    /// ready callback ran.
    pub fn on_write(&self, field: Field, data: &[u8]) -> bool {
        let limit = field.max_len();
        if data.len() > limit {
            debug!(
                "BLE write to {:?} truncated from {} to {} bytes",
                field,
                data.len(),
                limit
            );
        }

        let ready = {
            let mut state = self.lock_state();
            match field {
                Field::ClientConfig => {
                    state.client_config = [0; CLIENT_CONFIG_LEN];
                    let kept = data.len().min(limit);
                    state.client_config[..kept].copy_from_slice(&data[..kept]);
                    debug!("BLE client config {:02x?}", state.client_config);
                    return false;
                }
                Field::NetworkName => {
                    let kept = state.credentials.set_network_name(data, limit);
                    info!(
                        "Network name set ({} bytes): {}",
                        kept,
                        state.credentials.network_name_lossy()
                    );
                }
                Field::NetworkSecret => {
                    let kept = state.credentials.set_network_secret(data, limit);
                    info!("Network secret set ({} bytes)", kept);
                }
            }

            if state.credentials.is_complete() {
                let ready = state.credentials.clone();
                state.credentials.mark_consumed();
                Some(ready)
            } else {
                None
            }
        };

        // Run the handler outside the state lock
        match ready {
            Some(credentials) => {
                let callback = self.on_ready.lock().unwrap_or_else(PoisonError::into_inner);
                match callback.as_ref() {
                    Some(callback) => callback(credentials),
                    None => warn!("Credentials complete but no handler registered"),
                }
                true
            }
            None => false,
        }
    }

    /// Publish a reading.
    ///
    /// The readable value is always updated. A notification goes out only if
    /// a peer is connected and has enabled notifications; returns whether one
    /// was sent.
    pub fn notify(&self, sample: &Sample) -> bool {
        let frame = sample.to_radio_frame();
        let target = {
            let mut state = self.lock_state();
            state.reading = frame;
            match state.session {
                Some(conn) if state.client_config[0] == NOTIFY_ENABLED => Some(conn),
                _ => None,
            }
        };

        match target {
            Some(conn) => {
                self.port.notify(conn, &frame);
                debug!("Notified conn {} with {:02x?}", conn, frame);
                true
            }
            None => false,
        }
    }

    /// Current readable value of the reading characteristic.
    pub fn reading(&self) -> [u8; RADIO_FRAME_LEN] {
        self.lock_state().reading
    }

    /// Check if a peer is connected.
    pub fn is_connected(&self) -> bool {
        self.lock_state().session.is_some()
    }

    /// Check if the connected peer has enabled notifications.
    pub fn notifications_enabled(&self) -> bool {
        let state = self.lock_state();
        state.session.is_some() && state.client_config[0] == NOTIFY_ENABLED
    }

    /// Copy of the stored credentials and their written flags.
    pub fn credentials(&self) -> Credentials {
        self.lock_state().credentials.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
