//! NimBLE binding for the provisioning service.
//!
//! Registers the `0x00FF` service with its three characteristics and routes
//! NimBLE server callbacks into [`ProvisioningService::handle`]. The reading
//! characteristic's value is served from the service on every read, so the
//! GATT table never holds a stale copy.

use super::service::{
    Field, ProvisioningService, RadioEvent, RadioPort, CLIENT_CONFIG_LEN, DEVICE_NAME,
    NETWORK_NAME_CHAR_UUID, NETWORK_SECRET_CHAR_UUID, READING_CHAR_UUID, SERVICE_UUID,
};
use crate::sensor::RADIO_FRAME_LEN;
use esp32_nimble::utilities::mutex::Mutex as NimbleMutex;
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{
    uuid128, BLEAdvertisementData, BLECharacteristic, BLEDevice, BLEError, NimbleProperties,
    NimbleSub,
};
use log::{info, warn};
use std::sync::Arc;

/// Same value as [`ADVERTISED_SERVICE_UUID`](super::service::ADVERTISED_SERVICE_UUID).
const ADVERTISED_UUID: BleUuid = uuid128!("000000ff-0000-1000-8000-00805f9b34fb");

/// [`RadioPort`] backed by the NimBLE host.
pub struct GattPort {
    reading: Arc<NimbleMutex<BLECharacteristic>>,
}

impl RadioPort for GattPort {
    fn restart_advertising(&self) {
        if let Err(e) = BLEDevice::take().get_advertising().lock().start() {
            warn!("Failed to restart advertising: {:?}", e);
        }
    }

    fn notify(&self, _conn: u16, frame: &[u8; RADIO_FRAME_LEN]) {
        // NimBLE notifies every subscribed connection; at most one exists
        self.reading.lock().set_value(frame).notify();
    }
}

/// Register the GATT table, start advertising, and return the running
/// service.
pub fn start(device: &'static BLEDevice) -> Result<Arc<ProvisioningService<GattPort>>, BLEError> {
    let server = device.get_server();
    server.advertise_on_disconnect(false);

    let gatt = server.create_service(BleUuid::from_uuid16(SERVICE_UUID));
    let reading = gatt.lock().create_characteristic(
        BleUuid::from_uuid16(READING_CHAR_UUID),
        NimbleProperties::READ | NimbleProperties::NOTIFY,
    );
    reading.lock().set_value(&[0; RADIO_FRAME_LEN]);
    let name = gatt.lock().create_characteristic(
        BleUuid::from_uuid16(NETWORK_NAME_CHAR_UUID),
        NimbleProperties::WRITE,
    );
    let secret = gatt.lock().create_characteristic(
        BleUuid::from_uuid16(NETWORK_SECRET_CHAR_UUID),
        NimbleProperties::WRITE,
    );

    let service = Arc::new(ProvisioningService::new(GattPort {
        reading: reading.clone(),
    }));

    let svc = service.clone();
    server.on_connect(move |_server, desc| {
        svc.handle(RadioEvent::Connected {
            conn: desc.conn_handle(),
        });
    });

    let svc = service.clone();
    server.on_disconnect(move |desc, reason| {
        if let Err(e) = reason {
            info!("BLE link closed: {:?}", e);
        }
        svc.handle(RadioEvent::Disconnected {
            conn: desc.conn_handle(),
        });
    });

    let svc = service.clone();
    reading.lock().on_read(move |chr, _desc| {
        chr.set_value(&svc.reading());
    });

    let svc = service.clone();
    reading.lock().on_subscribe(move |_chr, _desc, sub| {
        let mut config = 0u16;
        if sub.contains(NimbleSub::NOTIFY) {
            config |= 0x0001;
        }
        if sub.contains(NimbleSub::INDICATE) {
            config |= 0x0002;
        }
        let bytes: [u8; CLIENT_CONFIG_LEN] = config.to_le_bytes();
        svc.handle(RadioEvent::Write {
            field: Field::ClientConfig,
            data: bytes.to_vec(),
        });
    });

    let svc = service.clone();
    name.lock().on_write(move |args| {
        svc.handle(RadioEvent::Write {
            field: Field::NetworkName,
            data: args.recv_data().to_vec(),
        });
    });

    let svc = service.clone();
    secret.lock().on_write(move |args| {
        svc.handle(RadioEvent::Write {
            field: Field::NetworkSecret,
            data: args.recv_data().to_vec(),
        });
    });

    // The name and a 128-bit UUID do not fit one 31-byte packet together
    let advertising = device.get_advertising();
    advertising
        .lock()
        .set_data(BLEAdvertisementData::new().name(DEVICE_NAME))?;
    advertising
        .lock()
        .scan_response(true)
        .set_scan_response_data(BLEAdvertisementData::new().add_service_uuid(ADVERTISED_UUID))?;
    advertising.lock().start()?;

    info!("BLE advertising as \"{}\"", DEVICE_NAME);
    Ok(service)
}
