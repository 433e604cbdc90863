//! Station-mode network join with bounded automatic retry.
//!
//! # State machine
//!
//! ```text
//!                 connect()
//!  Disconnected ------------> Connecting --- got IP -----------> Connected
//!       ^                     |   ^   |                            |
//!       |                     |   +---+ disconnect, budget left    | link lost /
//!       |                     |         (reconnect request)        | disconnect()
//!       |                     v                                    |
//!       +------------------ Failed <-- disconnect, budget spent    |
//!       |      (stop)                                              |
//!       +----------------------------------------------------------+
//! ```
//!
//! Stack events arrive on whatever context the driver uses and are fed into
//! [`ConnectionEvents::deliver`]. The handler only updates shared state and
//! wakes the waiter; the thread blocked in [`NetworkConnector::connect`]
//! issues reconnect requests itself, so the driver is only ever touched by
//! its owner.

use crate::config::{CONNECT_TIMEOUT, MAX_RECONNECT_ATTEMPTS};
use crate::provisioning::Credentials;
use log::{debug, info, warn};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Idle, or torn down after an attempt.
    #[default]
    Disconnected,
    /// Attempt in flight.
    Connecting,
    /// Address assigned.
    Connected,
    /// Retry budget spent; the attempt is being torn down.
    Failed,
}

/// Reasons a connection attempt ended without an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Every reconnect attempt was answered with a disconnect.
    RetryExhausted,
    /// Neither an address nor a final disconnect arrived in time.
    Timeout,
    /// No credentials have been configured.
    NotConfigured,
    /// The network driver rejected an operation.
    Driver(String),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryExhausted => write!(f, "reconnect attempts exhausted"),
            Self::Timeout => write!(f, "timed out waiting for an address"),
            Self::NotConfigured => write!(f, "no network credentials configured"),
            Self::Driver(msg) => write!(f, "driver error: {}", msg),
        }
    }
}

impl std::error::Error for ConnectionError {}

/// Stack notifications the connector reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Association lost or refused.
    Disconnected,
    /// DHCP assigned an address.
    GotIp,
}

#[derive(Debug, Default)]
struct Shared {
    state: ConnectionState,
    attempts: u8,
    max_attempts: u8,
    reconnects_due: u8,
    // An attempt is in flight and its outcome not yet collected
    settling: bool,
    link_lost: bool,
}

/// Event sink shared between the driver's callbacks and the connector.
#[derive(Debug)]
pub struct ConnectionEvents {
    shared: Mutex<Shared>,
    changed: Condvar,
}

impl ConnectionEvents {
    fn new(max_attempts: u8) -> Self {
        Self {
            shared: Mutex::new(Shared {
                max_attempts,
                ..Default::default()
            }),
            changed: Condvar::new(),
        }
    }

    /// Feed one stack event into the state machine.
    pub fn deliver(&self, event: NetworkEvent) {
        let mut shared = self.lock();
        match (event, shared.state) {
            // A drop right after the address arrived, before the waiter
            // collected it, still counts against this attempt's budget
            (NetworkEvent::Disconnected, ConnectionState::Connecting | ConnectionState::Connected)
                if shared.settling =>
            {
                if shared.attempts < shared.max_attempts {
                    shared.state = ConnectionState::Connecting;
                    shared.attempts += 1;
                    shared.reconnects_due += 1;
                    info!(
                        "Disconnected, retrying ({}/{})",
                        shared.attempts, shared.max_attempts
                    );
                } else {
                    shared.state = ConnectionState::Failed;
                    warn!("Disconnected, no retries left");
                }
            }
            (NetworkEvent::Disconnected, ConnectionState::Connected) => {
                shared.state = ConnectionState::Disconnected;
                shared.link_lost = true;
                warn!("Network link lost");
            }
            (NetworkEvent::GotIp, ConnectionState::Connecting) => {
                shared.state = ConnectionState::Connected;
                shared.reconnects_due = 0;
            }
            (event, state) => {
                debug!("Ignoring {:?} in state {:?}", event, state);
                return;
            }
        }
        self.changed.notify_all();
    }

    fn state(&self) -> ConnectionState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Station-mode network driver.
///
/// Implementations forward stack events to the [`ConnectionEvents`] passed
/// to [`subscribe`](WifiDriver::subscribe) for as long as the returned guard
/// is alive.
pub trait WifiDriver {
    /// Registration guard; dropping it unregisters the handlers.
    type Subscription;

    /// Start forwarding disconnect and got-IP events.
    fn subscribe(
        &mut self,
        events: Arc<ConnectionEvents>,
    ) -> Result<Self::Subscription, ConnectionError>;

    /// Apply station credentials.
    fn configure(&mut self, credentials: &Credentials) -> Result<(), ConnectionError>;

    /// Start the radio.
    fn start(&mut self) -> Result<(), ConnectionError>;

    /// Ask the stack to associate.
    fn connect_request(&mut self) -> Result<(), ConnectionError>;

    /// Stop the radio.
    fn stop(&mut self) -> Result<(), ConnectionError>;
}

/// Read-only view of a connector's state for other tasks.
#[derive(Debug, Clone)]
pub struct ConnectionStatus(Arc<ConnectionEvents>);

impl ConnectionStatus {
    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.0.state()
    }

    /// Check if an address is held.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

/// Joins the configured network.
pub struct NetworkConnector<D: WifiDriver> {
    driver: D,
    events: Arc<ConnectionEvents>,
    credentials: Option<Credentials>,
    timeout: Duration,
    link: Option<D::Subscription>,
}

impl<D: WifiDriver> NetworkConnector<D> {
    /// Create a connector with the default budget and timeout.
    pub fn new(driver: D) -> Self {
        Self::with_limits(driver, MAX_RECONNECT_ATTEMPTS, CONNECT_TIMEOUT)
    }

    /// Create a connector with an explicit reconnect budget and wait.
    pub fn with_limits(driver: D, max_attempts: u8, timeout: Duration) -> Self {
        Self {
            driver,
            events: Arc::new(ConnectionEvents::new(max_attempts)),
            credentials: None,
            timeout,
            link: None,
        }
    }

    /// Get the driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Store the target network. Takes effect on the next `connect()`.
    pub fn configure(&mut self, credentials: Credentials) {
        info!("Target network: {}", credentials.network_name_lossy());
        self.credentials = Some(credentials);
    }

    /// Check if credentials have been configured.
    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.events.state()
    }

    /// Check if an address is held. Never blocks on an attempt.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Shareable state handle.
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus(self.events.clone())
    }

    /// Report (once) that an established link dropped.
    pub fn take_link_lost(&self) -> bool {
        std::mem::take(&mut self.events.lock().link_lost)
    }

    /// Join the configured network.
    ///
    /// Blocks until an address is assigned, the reconnect budget is spent,
    /// or the connect timeout elapses.
    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.is_connected() {
            return Ok(());
        }
        let credentials = self.credentials.clone().ok_or(ConnectionError::NotConfigured)?;

        // Drop any guard left from an earlier link before re-registering
        self.link = None;
        {
            let mut shared = self.events.lock();
            shared.state = ConnectionState::Connecting;
            shared.attempts = 0;
            shared.reconnects_due = 0;
            shared.settling = true;
            shared.link_lost = false;
        }
        info!("Connecting to {}", credentials.network_name_lossy());

        let subscription = match self.begin(&credentials) {
            Ok(subscription) => subscription,
            Err(e) => {
                self.teardown();
                return Err(e);
            }
        };

        match self.wait_for_outcome() {
            Ok(()) => {
                info!("Connected to {}", credentials.network_name_lossy());
                self.link = Some(subscription);
                Ok(())
            }
            Err(e) => {
                drop(subscription);
                self.teardown();
                warn!("Connection attempt failed: {}", e);
                Err(e)
            }
        }
    }

    /// Tear down the link and stop the driver.
    pub fn disconnect(&mut self) -> Result<(), ConnectionError> {
        self.link = None;
        {
            let mut shared = self.events.lock();
            shared.state = ConnectionState::Disconnected;
            shared.settling = false;
        }
        info!("Network disconnected");
        self.driver.stop()
    }

    fn begin(&mut self, credentials: &Credentials) -> Result<D::Subscription, ConnectionError> {
        let subscription = self.driver.subscribe(self.events.clone())?;
        self.driver.configure(credentials)?;
        self.driver.start()?;
        self.driver.connect_request()?;
        Ok(subscription)
    }

    fn wait_for_outcome(&mut self) -> Result<(), ConnectionError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let reconnect = {
                let mut shared = self.events.lock();
                loop {
                    match shared.state {
                        ConnectionState::Connected => {
                            shared.settling = false;
                            shared.attempts = 0;
                            return Ok(());
                        }
                        ConnectionState::Failed => return Err(ConnectionError::RetryExhausted),
                        ConnectionState::Disconnected => {
                            return Err(ConnectionError::Driver("attempt aborted".into()))
                        }
                        ConnectionState::Connecting => {}
                    }
                    if shared.reconnects_due > 0 {
                        shared.reconnects_due -= 1;
                        break true;
                    }
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(ConnectionError::Timeout);
                    }
                    shared = self
                        .events
                        .changed
                        .wait_timeout(shared, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            };

            if reconnect {
                debug!("Issuing reconnect request");
                self.driver.connect_request()?;
            }
        }
    }

    fn teardown(&mut self) {
        if let Err(e) = self.driver.stop() {
            warn!("Failed to stop network driver: {}", e);
        }
        let mut shared = self.events.lock();
        shared.state = ConnectionState::Disconnected;
        shared.reconnects_due = 0;
        shared.settling = false;
        shared.link_lost = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedWifi;

    fn credentials() -> Credentials {
        Credentials::new(b"home", b"secret123")
    }

    fn connector(script: &[NetworkEvent]) -> NetworkConnector<SimulatedWifi> {
        let mut connector = NetworkConnector::with_limits(
            SimulatedWifi::scripted(script),
            MAX_RECONNECT_ATTEMPTS,
            Duration::from_millis(200),
        );
        connector.configure(credentials());
        connector
    }

    #[test]
    fn test_connect_first_try() {
        let mut connector = connector(&[NetworkEvent::GotIp]);
        assert_eq!(connector.connect(), Ok(()));
        assert!(connector.is_connected());
        assert_eq!(connector.driver().connect_requests(), 1);
        assert_eq!(connector.driver().configured_name().as_deref(), Some("home"));
    }

    #[test]
    fn test_connect_without_credentials() {
        let mut connector = NetworkConnector::new(SimulatedWifi::scripted(&[NetworkEvent::GotIp]));
        assert_eq!(connector.connect(), Err(ConnectionError::NotConfigured));
        assert_eq!(connector.driver().connect_requests(), 0);
    }

    #[test]
    fn test_connect_when_connected_is_noop() {
        let mut connector = connector(&[NetworkEvent::GotIp]);
        connector.connect().unwrap();
        assert_eq!(connector.connect(), Ok(()));
        assert_eq!(connector.driver().connect_requests(), 1);
    }

    #[test]
    fn test_retries_then_connects() {
        let mut connector = connector(&[
            NetworkEvent::Disconnected,
            NetworkEvent::Disconnected,
            NetworkEvent::GotIp,
        ]);
        assert_eq!(connector.connect(), Ok(()));
        assert_eq!(connector.driver().connect_requests(), 3);
    }

    #[test]
    fn test_retry_budget_exhausted() {
        let mut connector = connector(&[NetworkEvent::Disconnected; 4]);
        assert_eq!(connector.connect(), Err(ConnectionError::RetryExhausted));

        // Initial request plus three reconnects, nothing after the fourth drop
        assert_eq!(connector.driver().connect_requests(), 4);
        assert_eq!(connector.state(), ConnectionState::Disconnected);
        assert_eq!(connector.driver().stops(), 1);
    }

    #[test]
    fn test_drop_before_address_collected_retries() {
        let mut connector = connector(&[]);
        connector
            .driver()
            .answer_with(&[NetworkEvent::GotIp, NetworkEvent::Disconnected]);
        connector.driver().answer_with(&[NetworkEvent::GotIp]);

        assert_eq!(connector.connect(), Ok(()));
        assert_eq!(connector.driver().connect_requests(), 2);
        assert!(!connector.take_link_lost());
        assert_eq!(connector.driver().active_subscriptions(), 1);
    }

    #[test]
    fn test_flapping_link_spends_budget() {
        let mut connector = connector(&[]);
        for _ in 0..4 {
            connector
                .driver()
                .answer_with(&[NetworkEvent::GotIp, NetworkEvent::Disconnected]);
        }

        assert_eq!(connector.connect(), Err(ConnectionError::RetryExhausted));
        assert_eq!(connector.driver().connect_requests(), 4);
        assert_eq!(connector.state(), ConnectionState::Disconnected);
        assert!(!connector.take_link_lost());
    }

    #[test]
    fn test_timeout_when_stack_silent() {
        let mut connector = connector(&[]);
        let started = Instant::now();
        assert_eq!(connector.connect(), Err(ConnectionError::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(connector.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_subscriptions_released_after_failure() {
        let mut connector = connector(&[NetworkEvent::Disconnected; 4]);
        let _ = connector.connect();
        assert_eq!(connector.driver().active_subscriptions(), 0);

        let _ = connector.connect();
        assert_eq!(connector.driver().active_subscriptions(), 0);
    }

    #[test]
    fn test_subscription_held_while_connected() {
        let mut connector = connector(&[NetworkEvent::GotIp]);
        connector.connect().unwrap();
        assert_eq!(connector.driver().active_subscriptions(), 1);

        connector.disconnect().unwrap();
        assert_eq!(connector.driver().active_subscriptions(), 0);
        assert!(!connector.is_connected());
    }

    #[test]
    fn test_repeated_connects_hold_single_subscription() {
        let mut connector = connector(&[]);
        connector.driver().answer_with(&[NetworkEvent::GotIp]);
        connector.driver().answer_with(&[NetworkEvent::GotIp]);

        connector.connect().unwrap();
        connector.events.deliver(NetworkEvent::Disconnected);
        assert!(connector.take_link_lost());
        connector.connect().unwrap();
        assert_eq!(connector.driver().active_subscriptions(), 1);
    }

    #[test]
    fn test_link_loss_reported_once() {
        let mut connector = connector(&[NetworkEvent::GotIp]);
        connector.connect().unwrap();
        let status = connector.status();

        connector.events.deliver(NetworkEvent::Disconnected);
        assert!(!status.is_connected());
        assert!(connector.take_link_lost());
        assert!(!connector.take_link_lost());
    }

    #[test]
    fn test_events_ignored_when_idle() {
        let events = ConnectionEvents::new(3);
        events.deliver(NetworkEvent::GotIp);
        events.deliver(NetworkEvent::Disconnected);
        assert_eq!(events.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ConnectionError::Driver("boom".into()).to_string(),
            "driver error: boom"
        );
        assert_eq!(
            ConnectionError::RetryExhausted.to_string(),
            "reconnect attempts exhausted"
        );
    }
}
