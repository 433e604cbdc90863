//! End-to-end: a peer provisions credentials over the radio, the station
//! joins the network and notifies the peer with the latest reading.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use weather_station::network::{NetworkConnector, NetworkEvent};
use weather_station::provisioning::{Field, ProvisioningService, RadioEvent};
use weather_station::sensor::{Acquisition, DecoderConfig, Sample, SampleDecoder};
use weather_station::sim::{LoggingRadio, SimulatedSensor, SimulatedWifi};
use weather_station::{ControlLoop, Distributor, ReadingStore};

#[test]
fn test_provision_connect_and_notify() {
    let store = Arc::new(ReadingStore::new());
    let service = Arc::new(ProvisioningService::new(LoggingRadio::new()));
    let distributor = Distributor::new(store.clone(), service.clone());

    let connector = NetworkConnector::with_limits(
        SimulatedWifi::scripted(&[NetworkEvent::Disconnected, NetworkEvent::GotIp]),
        3,
        Duration::from_secs(1),
    );
    let mut control = ControlLoop::new(connector, Duration::from_millis(10));

    let ready_events = Arc::new(AtomicUsize::new(0));
    let mailbox = control.mailbox();
    let counter = ready_events.clone();
    service.register_callback(move |credentials| {
        counter.fetch_add(1, Ordering::SeqCst);
        mailbox.post(credentials);
    });

    // Peer session
    service.handle(RadioEvent::Connected { conn: 9 });
    service.handle(RadioEvent::Write {
        field: Field::ClientConfig,
        data: vec![0x01, 0x00],
    });
    service.handle(RadioEvent::Write {
        field: Field::NetworkName,
        data: b"home".to_vec(),
    });
    service.handle(RadioEvent::Write {
        field: Field::NetworkSecret,
        data: b"secret123".to_vec(),
    });
    assert_eq!(ready_events.load(Ordering::SeqCst), 1);

    // Control task picks up the pair and joins after one retry
    assert_eq!(control.poll_once(), Some(Ok(())));
    assert!(control.connector().is_connected());
    assert_eq!(
        control.connector().driver().configured_name().as_deref(),
        Some("home")
    );
    assert_eq!(control.connector().driver().connect_requests(), 2);

    // One acquisition cycle feeds the radio path
    let sample = Sample::new(52, 24, 3).unwrap();
    let decoder = SampleDecoder::new(SimulatedSensor::new(sample), DecoderConfig::default());
    let mut acquisition = Acquisition::new(decoder, store.clone(), Duration::from_secs(1));
    assert_eq!(acquisition.run_cycle(), Ok(sample));
    assert!(distributor.pump());

    assert_eq!(service.port().notifications(), vec![(9, [52, 0, 24, 3])]);
    assert_eq!(store.current(), Some(sample));
}

#[test]
fn test_repeated_single_field_write_does_not_reconnect() {
    let service = Arc::new(ProvisioningService::new(LoggingRadio::new()));
    let connector = NetworkConnector::with_limits(
        SimulatedWifi::reliable(),
        3,
        Duration::from_secs(1),
    );
    let mut control = ControlLoop::new(connector, Duration::from_millis(10));
    let mailbox = control.mailbox();
    service.register_callback(move |credentials| {
        mailbox.post(credentials);
    });

    service.on_write(Field::NetworkSecret, b"secret123");
    service.on_write(Field::NetworkSecret, b"secret123");
    service.on_write(Field::NetworkName, b"home");
    assert_eq!(control.poll_once(), Some(Ok(())));

    service.on_write(Field::NetworkName, b"home");
    assert_eq!(control.poll_once(), None);
    assert_eq!(control.connector().driver().connect_requests(), 1);
}

#[test]
fn test_disconnect_resumes_advertising_and_stops_notify() {
    let store = Arc::new(ReadingStore::new());
    let service = Arc::new(ProvisioningService::new(LoggingRadio::new()));
    let distributor = Distributor::new(store.clone(), service.clone());

    service.handle(RadioEvent::Connected { conn: 2 });
    service.handle(RadioEvent::Write {
        field: Field::ClientConfig,
        data: vec![0x01, 0x00],
    });
    service.handle(RadioEvent::Disconnected { conn: 2 });

    store.replace(Sample::new(40, 20, 0).unwrap());
    assert!(!distributor.pump());
    assert_eq!(service.port().advertising_restarts(), 1);
    assert!(service.port().notifications().is_empty());
    assert_eq!(service.reading(), [40, 0, 20, 0]);
}
