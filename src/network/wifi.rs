//! ESP-IDF station driver.
//!
//! Wraps `EspWifi` and the system event loop. Disconnect and got-IP events
//! are forwarded to [`ConnectionEvents`] through event loop subscriptions
//! that unregister when the returned guard drops.

use super::connector::{ConnectionError, ConnectionEvents, NetworkEvent, WifiDriver};
use crate::provisioning::Credentials;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi, WifiEvent};
use esp_idf_sys::EspError;
use log::info;
use std::sync::Arc;

impl From<EspError> for ConnectionError {
    fn from(e: EspError) -> Self {
        Self::Driver(format!("{:?}", e))
    }
}

/// Station-mode driver over `EspWifi`.
pub struct EspWifiDriver {
    wifi: EspWifi<'static>,
    sysloop: EspSystemEventLoop,
}

impl EspWifiDriver {
    /// Create the driver. The radio stays off until `start()`.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
    ) -> Result<Self, EspError> {
        let wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;
        Ok(Self { wifi, sysloop })
    }
}

impl WifiDriver for EspWifiDriver {
    type Subscription = (EspSubscription<'static, System>, EspSubscription<'static, System>);

    fn subscribe(
        &mut self,
        events: Arc<ConnectionEvents>,
    ) -> Result<Self::Subscription, ConnectionError> {
        let on_wifi = events.clone();
        let wifi_sub = self.sysloop.subscribe::<WifiEvent, _>(move |event| {
            if let WifiEvent::StaDisconnected(_) = event {
                on_wifi.deliver(NetworkEvent::Disconnected);
            }
        })?;
        let ip_sub = self.sysloop.subscribe::<IpEvent, _>(move |event| {
            if let IpEvent::DhcpIpAssigned(_) = event {
                info!("DHCP address assigned");
                events.deliver(NetworkEvent::GotIp);
            }
        })?;
        Ok((wifi_sub, ip_sub))
    }

    fn configure(&mut self, credentials: &Credentials) -> Result<(), ConnectionError> {
        let ssid = std::str::from_utf8(credentials.network_name())
            .map_err(|_| ConnectionError::Driver("network name is not UTF-8".into()))?;
        let password = std::str::from_utf8(credentials.network_secret())
            .map_err(|_| ConnectionError::Driver("network secret is not UTF-8".into()))?;

        let auth_method = if credentials.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let config = Configuration::Client(ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| ConnectionError::Driver("network name too long".into()))?,
            password: password
                .try_into()
                .map_err(|_| ConnectionError::Driver("network secret too long".into()))?,
            auth_method,
            ..Default::default()
        });
        self.wifi.set_configuration(&config)?;
        Ok(())
    }

    fn start(&mut self) -> Result<(), ConnectionError> {
        self.wifi.start()?;
        Ok(())
    }

    fn connect_request(&mut self) -> Result<(), ConnectionError> {
        self.wifi.connect()?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ConnectionError> {
        self.wifi.stop()?;
        Ok(())
    }
}
