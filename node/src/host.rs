use std::{env, path::PathBuf, thread, time::Duration};

use anyhow::Context;
use tracing::{info, warn};

use datalogger_common::{
    boot, BootCause, ConfigStorage, ConfigStore, CycleEnd, DhtDriver, DhtKind, DhtSample,
    FileStorage, Network, NetworkError, OneWireBus, PowerControl, Schema, SensorError, Settings,
    SetupOutcome, StationParts, StdioPrompt, SystemClock, TcpTransport, WifiCredentials,
    DEFAULT_CONFIG_FILE,
};

const CONFIG_ENV: &str = "DATALOGGER_CONFIG";
const SIMULATED_DS18X20: u64 = 0x28_ff64_1e0f_0000_01;

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut store = ConfigStore::new(Schema::datalogger(), FileStorage::new(path));

    if env::args().nth(1).as_deref() == Some("setup") {
        let outcome = store
            .input(&mut StdioPrompt)
            .context("interactive setup failed")?;
        match outcome {
            SetupOutcome::Written => info!("config written to {}", store.storage().location()),
            SetupOutcome::Kept => info!("kept existing config {}", store.storage().location()),
        }
        return Ok(());
    }

    let mut cause = BootCause::ColdBoot;
    loop {
        // A wake from deep sleep starts over, config included.
        let settings = load_settings(&mut store)?;
        info!(
            "logging `{}` to {} every {}s",
            settings.location,
            settings.endpoint.host,
            settings.update_period.as_secs()
        );

        let parts = StationParts {
            network: SimulatedNetwork::default(),
            dht: settings.dht_gpio().map(|_| SimulatedDht::default()),
            bus: settings.ds18x20_gpio().map(|_| SimulatedBus::default()),
            transport: TcpTransport::default(),
            power: SimulatedPower { cause },
        };

        match boot(settings, parts, SystemClock).context("network bring-up failed")? {
            CycleEnd::Restart => cause = BootCause::DeepSleepWake,
            CycleEnd::Continue => return Ok(()),
        }
    }
}

fn load_settings<S: ConfigStorage>(store: &mut ConfigStore<S>) -> anyhow::Result<Settings> {
    store
        .read()
        .with_context(|| format!("failed to read config {}", store.storage().location()))?;
    Settings::load(store).context("invalid config")
}

/// Stands in for the station interface; the host is assumed to be online.
#[derive(Debug, Default)]
struct SimulatedNetwork {
    connected: bool,
}

impl Network for SimulatedNetwork {
    fn connect(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        info!("simulated wifi join of `{}`", credentials.ssid);
        self.connected = true;
        Ok(())
    }

    fn sync_time(&mut self) -> Result<(), NetworkError> {
        if !self.connected {
            return Err(NetworkError::TimeSync("not connected".to_string()));
        }
        Ok(())
    }

    fn scan(&mut self, _ssid: &str) -> Result<Vec<i8>, NetworkError> {
        Ok(vec![-58])
    }
}

#[derive(Debug, Default)]
struct SimulatedDht {
    tick: u32,
}

impl DhtDriver for SimulatedDht {
    fn measure(&mut self, kind: DhtKind) -> Result<DhtSample, SensorError> {
        self.tick = self.tick.wrapping_add(1);
        let temperature_c = 20.0 + (self.tick % 8) as f32 * 0.2;
        let relative_humidity = 42.0 + (self.tick % 6) as f32 * 0.5;

        Ok(match kind {
            DhtKind::Dht11 => DhtSample {
                temperature_c: temperature_c.round(),
                relative_humidity: relative_humidity.round(),
            },
            DhtKind::Dht22 => DhtSample {
                temperature_c,
                relative_humidity,
            },
        })
    }
}

#[derive(Debug, Default)]
struct SimulatedBus {
    conversions: u32,
}

impl OneWireBus for SimulatedBus {
    fn scan(&mut self) -> Result<Vec<u64>, SensorError> {
        Ok(vec![SIMULATED_DS18X20])
    }

    fn start_conversion(&mut self) -> Result<(), SensorError> {
        self.conversions = self.conversions.wrapping_add(1);
        Ok(())
    }

    fn read_temperature(&mut self, address: u64) -> Result<f32, SensorError> {
        if address != SIMULATED_DS18X20 {
            return Err(SensorError::NoDevice);
        }
        Ok(18.0 + (self.conversions % 5) as f32 * 0.25)
    }
}

/// Deep sleep blocks for the wake interval, then the boot sequence reruns.
struct SimulatedPower {
    cause: BootCause,
}

impl PowerControl for SimulatedPower {
    fn boot_cause(&self) -> BootCause {
        self.cause
    }

    fn deep_sleep(&mut self, wake_after: Duration) {
        warn!(
            "simulating deep sleep for {}s; state is discarded",
            wake_after.as_secs()
        );
        thread::sleep(wake_after);
    }
}
