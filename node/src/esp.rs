use core::convert::TryInto;
use std::{
    io, thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use dht_sensor::{dht11, dht22, DhtError};
use ds18b20::Ds18b20;
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_hal::{
    delay::Ets,
    gpio::{AnyIOPin, InputOutput, PinDriver, Pull},
    reset::ResetReason,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    sntp::{EspSntp, SyncStatus},
    wifi::{BlockingWifi, EspWifi},
};
use log::{error, info, warn};
use one_wire_bus::{Address, OneWire};

use datalogger_common::{
    boot, BootCause, ConfigError, ConfigStorage, ConfigStore, DhtDriver, DhtKind, DhtSample,
    Network, NetworkError, OneWireBus, PowerControl, Schema, SensorError, Settings, StationParts,
    StdioPrompt, SystemClock, TcpTransport, WifiCredentials,
};

const NVS_NAMESPACE: &str = "datalogger";
const NVS_CONFIG_KEY: &str = "config_json";
const MAX_CONFIG_LEN: usize = 4096;

const SNTP_SYNC_TIMEOUT: Duration = Duration::from_secs(15);
const SNTP_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let power = EspPower::from_reset_reason();
    info!("boot cause: {}", power.boot_cause().as_str());

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut store = ConfigStore::new(
        Schema::datalogger(),
        NvsStorage {
            partition: nvs_partition.clone(),
        },
    );
    if !store.storage().exists() {
        warn!("no config in NVS; starting setup on the console");
        store
            .input(&mut StdioPrompt)
            .context("interactive setup failed")?;
    }
    store.read().context("failed to read config from NVS")?;
    let settings = Settings::load(&store).context("invalid config")?;

    let Peripherals { modem, .. } = Peripherals::take()?;
    let network = EspNetwork::new(modem, sys_loop, nvs_partition).context("wifi startup failed")?;

    let dht = settings
        .dht_gpio()
        .map(EspDht::new)
        .transpose()
        .context("failed to initialize DHT pin")?;
    let bus = settings
        .ds18x20_gpio()
        .map(EspOneWire::new)
        .transpose()
        .context("failed to initialize one-wire bus")?;

    let parts = StationParts {
        network,
        dht,
        bus,
        transport: TcpTransport::default(),
        power,
    };

    // Only returns if the wake timer could not be armed.
    boot(settings, parts, SystemClock).context("network bring-up failed")?;
    Err(anyhow!("deep sleep returned"))
}

/// Config document persisted as one JSON string in NVS.
struct NvsStorage {
    partition: EspDefaultNvsPartition,
}

impl NvsStorage {
    fn open(&self) -> Result<EspNvs<esp_idf_svc::nvs::NvsDefault>, ConfigError> {
        EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true).map_err(nvs_error)
    }
}

fn nvs_error(err: esp_idf_svc::sys::EspError) -> ConfigError {
    ConfigError::Io(io::Error::other(err.to_string()))
}

impl ConfigStorage for NvsStorage {
    fn exists(&self) -> bool {
        match self.open().and_then(|nvs| nvs.contains(NVS_CONFIG_KEY).map_err(nvs_error)) {
            Ok(found) => found,
            Err(err) => {
                warn!("failed to query NVS: {err}");
                false
            }
        }
    }

    fn load(&self) -> Result<String, ConfigError> {
        let nvs = self.open()?;
        let mut buffer = vec![0_u8; MAX_CONFIG_LEN];

        match nvs.get_str(NVS_CONFIG_KEY, &mut buffer).map_err(nvs_error)? {
            Some(value) => Ok(value.to_string()),
            None => Err(ConfigError::NotFound {
                location: self.location(),
            }),
        }
    }

    fn save(&self, contents: &str) -> Result<(), ConfigError> {
        let mut nvs = self.open()?;
        nvs.set_str(NVS_CONFIG_KEY, contents).map_err(nvs_error)
    }

    fn location(&self) -> String {
        format!("nvs:{NVS_NAMESPACE}/{NVS_CONFIG_KEY}")
    }
}

struct EspNetwork {
    wifi: BlockingWifi<EspWifi<'static>>,
    sntp: Option<EspSntp<'static>>,
}

impl EspNetwork {
    fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs_partition: EspDefaultNvsPartition,
    ) -> anyhow::Result<Self> {
        let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
        Ok(Self {
            wifi: BlockingWifi::wrap(esp_wifi, sys_loop)?,
            sntp: None,
        })
    }
}

fn connect_error(err: impl std::fmt::Display) -> NetworkError {
    NetworkError::Connect(err.to_string())
}

impl Network for EspNetwork {
    fn connect(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        let auth_method = if credentials.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };

        // Station-only configuration also switches the access point off.
        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: credentials
                    .ssid
                    .as_str()
                    .try_into()
                    .map_err(|_| connect_error("wifi ssid too long"))?,
                password: credentials
                    .password
                    .as_str()
                    .try_into()
                    .map_err(|_| connect_error("wifi password too long"))?,
                auth_method,
                ..Default::default()
            }))
            .map_err(connect_error)?;

        if !self.wifi.is_started().map_err(connect_error)? {
            self.wifi.start().map_err(connect_error)?;
        }
        if self.wifi.is_connected().map_err(connect_error)? {
            let _ = self.wifi.disconnect();
        }

        self.wifi.connect().map_err(connect_error)?;
        self.wifi.wait_netif_up().map_err(connect_error)?;

        let ip_info = self
            .wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .map_err(connect_error)?;
        info!("wifi connected to `{}` with {:?}", credentials.ssid, ip_info.ip);
        Ok(())
    }

    fn sync_time(&mut self) -> Result<(), NetworkError> {
        if self.sntp.is_none() {
            let sntp =
                EspSntp::new_default().map_err(|err| NetworkError::TimeSync(err.to_string()))?;
            self.sntp = Some(sntp);
        }
        let Some(sntp) = self.sntp.as_ref() else {
            return Err(NetworkError::TimeSync("sntp unavailable".to_string()));
        };

        let started = Instant::now();
        while sntp.get_sync_status() != SyncStatus::Completed {
            if started.elapsed() >= SNTP_SYNC_TIMEOUT {
                return Err(NetworkError::TimeSync(format!(
                    "no answer within {}s",
                    SNTP_SYNC_TIMEOUT.as_secs()
                )));
            }
            thread::sleep(SNTP_POLL_INTERVAL);
        }
        info!("time synchronized");
        Ok(())
    }

    fn scan(&mut self, ssid: &str) -> Result<Vec<i8>, NetworkError> {
        let access_points = self
            .wifi
            .scan()
            .map_err(|err| NetworkError::Scan(err.to_string()))?;

        Ok(access_points
            .iter()
            .filter(|ap| ap.ssid.as_str() == ssid)
            .map(|ap| ap.signal_strength)
            .collect())
    }
}

struct EspDht {
    pin: PinDriver<'static, AnyIOPin, InputOutput>,
    delay: Ets,
}

impl EspDht {
    fn new(gpio: u8) -> anyhow::Result<Self> {
        // Pin number comes from the config.
        let mut pin = PinDriver::input_output_od(unsafe { AnyIOPin::new(i32::from(gpio)) })?;
        pin.set_pull(Pull::Up)?;
        pin.set_high()?;
        info!("DHT data line on GPIO{gpio}");

        Ok(Self { pin, delay: Ets })
    }
}

fn dht_error<E: std::fmt::Debug>(err: DhtError<E>) -> SensorError {
    match err {
        DhtError::Timeout => SensorError::Timeout,
        DhtError::ChecksumMismatch => SensorError::Checksum,
        other => SensorError::Bus(format!("{other:?}")),
    }
}

impl DhtDriver for EspDht {
    fn measure(&mut self, kind: DhtKind) -> Result<DhtSample, SensorError> {
        self.pin
            .set_high()
            .map_err(|err| SensorError::Bus(err.to_string()))?;

        match kind {
            DhtKind::Dht11 => dht11::blocking::read(&mut self.delay, &mut self.pin)
                .map(|reading| DhtSample {
                    temperature_c: f32::from(reading.temperature),
                    relative_humidity: f32::from(reading.relative_humidity),
                })
                .map_err(dht_error),
            DhtKind::Dht22 => dht22::blocking::read(&mut self.delay, &mut self.pin)
                .map(|reading| DhtSample {
                    temperature_c: reading.temperature,
                    relative_humidity: reading.relative_humidity,
                })
                .map_err(dht_error),
        }
    }
}

struct EspOneWire {
    bus: OneWire<PinDriver<'static, AnyIOPin, InputOutput>>,
    delay: Ets,
}

impl EspOneWire {
    fn new(gpio: u8) -> anyhow::Result<Self> {
        let mut pin = PinDriver::input_output_od(unsafe { AnyIOPin::new(i32::from(gpio)) })?;
        pin.set_pull(Pull::Up)?;
        pin.set_high()?;

        let bus = OneWire::new(pin)
            .map_err(|err| anyhow!("failed to initialize one-wire bus: {err:?}"))?;
        info!("one-wire bus on GPIO{gpio}");

        Ok(Self { bus, delay: Ets })
    }
}

fn bus_error(err: impl std::fmt::Debug) -> SensorError {
    SensorError::Bus(format!("{err:?}"))
}

impl OneWireBus for EspOneWire {
    fn scan(&mut self) -> Result<Vec<u64>, SensorError> {
        let mut found = Vec::new();
        for device in self.bus.devices(false, &mut self.delay) {
            let address = device.map_err(bus_error)?;
            if address.family_code() == ds18b20::FAMILY_CODE {
                found.push(address.0);
            }
        }
        Ok(found)
    }

    fn start_conversion(&mut self) -> Result<(), SensorError> {
        ds18b20::start_simultaneous_temp_measurement(&mut self.bus, &mut self.delay)
            .map_err(bus_error)
    }

    fn read_temperature(&mut self, address: u64) -> Result<f32, SensorError> {
        let sensor = Ds18b20::new::<core::convert::Infallible>(Address(address))
            .map_err(bus_error)?;
        let data = sensor
            .read_data(&mut self.bus, &mut self.delay)
            .map_err(|err| match err {
                one_wire_bus::OneWireError::CrcMismatch => SensorError::Checksum,
                other => bus_error(other),
            })?;
        Ok(data.temperature)
    }
}

struct EspPower {
    cause: BootCause,
}

impl EspPower {
    fn from_reset_reason() -> Self {
        let cause = match ResetReason::get() {
            ResetReason::DeepSleep => BootCause::DeepSleepWake,
            _ => BootCause::ColdBoot,
        };
        Self { cause }
    }
}

impl PowerControl for EspPower {
    fn boot_cause(&self) -> BootCause {
        self.cause
    }

    fn deep_sleep(&mut self, wake_after: Duration) {
        let micros = u64::try_from(wake_after.as_micros()).unwrap_or(u64::MAX);
        if micros == 0 {
            error!("refusing to deep sleep without a wake timer");
            return;
        }
        unsafe { esp_idf_svc::sys::esp_deep_sleep(micros) }
    }
}
