//! Weather station firmware binary.
//!
//! Runs on both ESP32 and host platforms:
//! - **ESP32**: `cargo espflash flash --bin station --features esp32 --release`
//! - **Host**: `cargo run --bin station` (simulated sensor, radio and Wi-Fi)
//!
//! ## Tasks
//!
//! | Thread      | Period    | Work                                         |
//! |-------------|-----------|----------------------------------------------|
//! | acquisition | 2.5 s     | DHT11 transaction, store, radio notify       |
//! | display     | 500 ms    | redraw on new data                           |
//! | http        | on demand | snapshot of the latest reading               |
//! | main        | 1 s       | credentials mailbox, network connect         |
//!
//! ## Endpoints
//!
//! - Text: http://<ip>/
//! - JSON: http://<ip>/reading

use log::info;
use std::error::Error;
use std::sync::Arc;
use std::thread;
use weather_station::config::NodeConfig;
use weather_station::store::ReadingStore;

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn main() -> Result<(), Box<dyn Error>> {
    platform_init();

    info!("=== Weather Station starting ===");

    #[cfg(feature = "esp32")]
    let config = NodeConfig::default();
    // Port 80 needs privileges on a desktop OS
    #[cfg(not(feature = "esp32"))]
    let config = NodeConfig::default().with_http_port(8080);

    config.validate()?;
    let store = Arc::new(ReadingStore::new());
    run(config, store)
}

#[cfg(feature = "esp32")]
fn run(config: NodeConfig, store: Arc<ReadingStore>) -> Result<(), Box<dyn Error>> {
    use esp32_nimble::BLEDevice;
    use esp_idf_hal::cpu::Core;
    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_hal::task::thread::ThreadSpawnConfiguration;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_sys::EspError;
    use weather_station::display::Hd44780;
    use weather_station::network::{EspWifiDriver, NetworkConnector};
    use weather_station::provisioning::gatt;
    use weather_station::sensor::{Acquisition, DecoderConfig, DhtPin, SampleDecoder};
    use weather_station::{ControlLoop, Distributor};

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;
    let pins = peripherals.pins;

    // BLE provisioning
    let service = gatt::start(BLEDevice::take())
        .map_err(|e| format!("BLE init failed: {:?}", e))?;
    let distributor = Distributor::new(store.clone(), service.clone());

    // Network
    let driver = EspWifiDriver::new(peripherals.modem, sysloop, nvs)?;
    let connector = NetworkConnector::with_limits(
        driver,
        config.max_reconnect_attempts,
        config.connect_timeout,
    );
    let control = ControlLoop::new(connector, config.control_poll);
    let mailbox = control.mailbox();
    service.register_callback(move |credentials| {
        mailbox.post(credentials);
    });

    // Display: RS 17, E 18, D0..D7 on 32, 27, 26, 25, 23, 22, 21, 19
    let out = |pin: AnyOutputPin| -> Result<PinDriver<'static, AnyOutputPin, Output>, EspError> {
        PinDriver::output(pin)
    };
    let mut lcd = Hd44780::new(
        out(pins.gpio17.downgrade_output())?,
        out(pins.gpio18.downgrade_output())?,
        [
            out(pins.gpio32.downgrade_output())?,
            out(pins.gpio27.downgrade_output())?,
            out(pins.gpio26.downgrade_output())?,
            out(pins.gpio25.downgrade_output())?,
            out(pins.gpio23.downgrade_output())?,
            out(pins.gpio22.downgrade_output())?,
            out(pins.gpio21.downgrade_output())?,
            out(pins.gpio19.downgrade_output())?,
        ],
        FreeRtos,
    );
    lcd.init()?;
    let refresher = distributor.display(lcd, config.display_tick);

    // HTTP snapshot
    let _server = distributor.serve(None, config.http_port)?;

    // Sensor on GPIO16
    let line = DhtPin::new(pins.gpio16.downgrade())?;
    let decoder = SampleDecoder::new(line, DecoderConfig::from(&config));
    let acquisition = Acquisition::new(decoder, store, config.sample_period);

    // The bit window is timing critical: highest priority, own core
    ThreadSpawnConfiguration {
        name: Some(&b"acquisition\0"[..]),
        priority: 20,
        pin_to_core: Some(Core::Core1),
        ..Default::default()
    }
    .set()?;
    thread::Builder::new()
        .stack_size(4096)
        .spawn(move || acquisition.run(move || {
            distributor.pump();
        }))?;

    ThreadSpawnConfiguration {
        name: Some(&b"display\0"[..]),
        priority: 5,
        pin_to_core: Some(Core::Core1),
        ..Default::default()
    }
    .set()?;
    thread::Builder::new()
        .stack_size(4096)
        .spawn(move || refresher.run())?;

    ThreadSpawnConfiguration::default().set()?;

    info!("Tasks started");
    control.run()
}

#[cfg(not(feature = "esp32"))]
fn run(config: NodeConfig, store: Arc<ReadingStore>) -> Result<(), Box<dyn Error>> {
    use std::time::Duration;
    use weather_station::display::LogDisplay;
    use weather_station::network::NetworkConnector;
    use weather_station::provisioning::{Field, ProvisioningService, RadioEvent};
    use weather_station::sensor::{Acquisition, DecoderConfig, Sample, SampleDecoder};
    use weather_station::sim::{LoggingRadio, SimulatedSensor, SimulatedWifi};
    use weather_station::{ControlLoop, Distributor};

    let service = Arc::new(ProvisioningService::new(LoggingRadio::new()));
    let distributor = Distributor::new(store.clone(), service.clone());

    let connector = NetworkConnector::with_limits(
        SimulatedWifi::reliable(),
        config.max_reconnect_attempts,
        config.connect_timeout,
    );
    let control = ControlLoop::new(connector, config.control_poll);
    let mailbox = control.mailbox();
    service.register_callback(move |credentials| {
        mailbox.post(credentials);
    });

    let refresher = distributor.display(LogDisplay::new(), config.display_tick);
    let server = distributor.serve(None, config.http_port)?;
    if let Some(addr) = server.local_addr() {
        info!("Snapshot at http://{}/", addr);
    }

    let seed = Sample::new(45, 21, 0).ok_or("invalid seed sample")?;
    let decoder = SampleDecoder::new(
        SimulatedSensor::drifting(seed).with_format(config.wire_format),
        DecoderConfig::from(&config),
    );
    let acquisition = Acquisition::new(decoder, store, config.sample_period);

    thread::Builder::new()
        .name("acquisition".into())
        .spawn(move || acquisition.run(move || {
            distributor.pump();
        }))?;
    thread::Builder::new()
        .name("display".into())
        .spawn(move || refresher.run())?;

    // Replay a phone provisioning session
    let peer = service.clone();
    thread::Builder::new().name("peer".into()).spawn(move || {
        thread::sleep(Duration::from_secs(5));
        peer.handle(RadioEvent::Connected { conn: 1 });
        peer.handle(RadioEvent::Write {
            field: Field::ClientConfig,
            data: vec![0x01, 0x00],
        });
        peer.handle(RadioEvent::Write {
            field: Field::NetworkName,
            data: b"home".to_vec(),
        });
        peer.handle(RadioEvent::Write {
            field: Field::NetworkSecret,
            data: b"secret123".to_vec(),
        });
    })?;

    info!("Tasks started");
    control.run()
}
