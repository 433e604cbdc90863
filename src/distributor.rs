//! Fan-out of the latest reading to its consumers.
//!
//! Each consumer reads the [`ReadingStore`] on its own schedule and owns its
//! own new-data signal, so a slow consumer never holds up another:
//!
//! - radio: [`Distributor::pump`] runs on the acquisition thread right after
//!   each cycle and pushes the sample to the provisioning service,
//! - display: a [`DisplayRefresher`] thread redraws at most once per tick,
//! - web: the [`SnapshotServer`] reads the store per request.

use crate::display::{DisplayRefresher, DisplaySink};
use crate::provisioning::{ProvisioningService, RadioPort};
use crate::signal::Signal;
use crate::store::ReadingStore;
use crate::web::SnapshotServer;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Connects the reading store to the radio, display and web paths.
pub struct Distributor<P> {
    store: Arc<ReadingStore>,
    service: Arc<ProvisioningService<P>>,
    radio: Arc<Signal>,
}

impl<P: RadioPort> Distributor<P> {
    /// Subscribe the radio path to `store`.
    pub fn new(store: Arc<ReadingStore>, service: Arc<ProvisioningService<P>>) -> Self {
        let radio = store.subscribe();
        Self {
            store,
            service,
            radio,
        }
    }

    /// Push the latest sample to the radio if a new one arrived.
    ///
    /// Returns `true` if a notification went out to a subscribed peer.
    pub fn pump(&self) -> bool {
        if !self.radio.take() {
            return false;
        }
        match self.store.current() {
            Some(sample) => self.service.notify(&sample),
            None => false,
        }
    }

    /// Display path over `sink`.
    pub fn display<S: DisplaySink>(&self, sink: S, tick: Duration) -> DisplayRefresher<S> {
        DisplayRefresher::new(sink, self.store.clone(), tick)
    }

    /// Web path on `bind_addr:port`.
    pub fn serve(&self, bind_addr: Option<IpAddr>, port: u16) -> io::Result<SnapshotServer> {
        SnapshotServer::start(bind_addr, port, self.store.clone())
    }
}
