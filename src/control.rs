//! Control task: turns credential handoffs into connection attempts.

use crate::network::{ConnectionError, NetworkConnector, WifiDriver};
use crate::provisioning::Credentials;
use crate::signal::Mailbox;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Waits for credentials and drives the connector.
pub struct ControlLoop<D: WifiDriver> {
    connector: NetworkConnector<D>,
    mailbox: Arc<Mailbox<Credentials>>,
    poll: Duration,
}

impl<D: WifiDriver> ControlLoop<D> {
    /// Create the task around `connector`, waking at least every `poll`.
    pub fn new(connector: NetworkConnector<D>, poll: Duration) -> Self {
        Self {
            connector,
            mailbox: Arc::new(Mailbox::new()),
            poll,
        }
    }

    /// Mailbox the provisioning ready handler posts into.
    pub fn mailbox(&self) -> Arc<Mailbox<Credentials>> {
        self.mailbox.clone()
    }

    /// Get the connector.
    pub fn connector(&self) -> &NetworkConnector<D> {
        &self.connector
    }

    /// Wait up to one poll interval and act on what arrived.
    ///
    /// Returns the outcome of the connection attempt made, if any. A failed
    /// attempt is not retried until new credentials arrive.
    pub fn poll_once(&mut self) -> Option<Result<(), ConnectionError>> {
        if let Some(credentials) = self.mailbox.wait_take(self.poll) {
            let already = self.connector.is_connected();
            self.connector.configure(credentials);
            if already {
                info!("Already connected; new credentials apply on next reconnect");
                return None;
            }
            return Some(self.attempt());
        }

        if self.connector.take_link_lost() && self.connector.is_configured() {
            info!("Link lost, reconnecting");
            return Some(self.attempt());
        }
        None
    }

    fn attempt(&mut self) -> Result<(), ConnectionError> {
        let result = self.connector.connect();
        if let Err(e) = &result {
            warn!("Network unavailable: {}", e);
        }
        result
    }

    /// Run forever.
    pub fn run(mut self) -> ! {
        info!("Control task started, poll {:?}", self.poll);
        loop {
            let _ = self.poll_once();
        }
    }
}
