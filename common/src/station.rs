use log::info;

use crate::{
    clock::Clock,
    http::Transport,
    network::{self, bring_up_policy, Network, NetworkError},
    power::{self, CycleEnd, PowerAction, PowerControl},
    record::{Measurement, MeasurementRecord},
    retry::RetryError,
    sensors::{DhtDriver, DhtReader, Ds18x20Reader, OneWireBus},
    settings::Settings,
    upload::{Delivery, Uploader},
};

pub const COMMENT: &str = "-";

/// Hardware handed to a station at boot. A `None` sensor is disabled.
pub struct StationParts<N, D, B, T, P> {
    pub network: N,
    pub dht: Option<D>,
    pub bus: Option<B>,
    pub transport: T,
    pub power: P,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub measurement: Measurement,
    pub record: MeasurementRecord,
    pub delivery: Delivery,
    pub action: PowerAction,
    pub end: CycleEnd,
}

pub struct Station<N, D, B, T, P, C> {
    settings: Settings,
    network: N,
    dht: DhtReader<D>,
    ds18x20: Ds18x20Reader<B, C>,
    uploader: Uploader<T, C>,
    power: P,
    clock: C,
}

impl<N, D, B, T, P, C> Station<N, D, B, T, P, C>
where
    N: Network,
    D: DhtDriver,
    B: OneWireBus,
    T: Transport,
    P: PowerControl,
    C: Clock + Clone,
{
    pub fn new(settings: Settings, parts: StationParts<N, D, B, T, P>, clock: C) -> Self {
        let dht = DhtReader::new(
            parts.dht,
            settings.dht_kind,
            settings.dht_temperature_calibration.clone(),
            settings.dht_humidity_calibration.clone(),
        );
        let ds18x20 = Ds18x20Reader::new(
            parts.bus,
            settings.ds18x20_calibration.clone(),
            clock.clone(),
        );
        let uploader = Uploader::new(
            settings.backend.clone(),
            settings.endpoint.clone(),
            parts.transport,
            clock.clone(),
        );

        Self {
            settings,
            network: parts.network,
            dht,
            ds18x20,
            uploader,
            power: parts.power,
            clock,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    pub fn uploader(&self) -> &Uploader<T, C> {
        &self.uploader
    }

    pub fn measure(&mut self) -> Measurement {
        let temperature1 = self.dht.temperature();
        let humidity = self.dht.humidity();
        let temperature2 = self.ds18x20.temperature();
        let wifi_signal = network::wifi_signal(
            &mut self.network,
            self.settings.enable_wifi_signal,
            &self.settings.wifi.ssid,
        );

        Measurement {
            temperature1,
            temperature2,
            humidity,
            comment: COMMENT.to_string(),
            time: self.clock.now_unix(),
            location: self.settings.location.clone(),
            wifi_signal,
            supply_voltage: self.power.supply_voltage(),
        }
    }

    pub fn run_cycle(&mut self) -> CycleReport {
        let measurement = self.measure();
        let record = measurement.to_record();
        info!("measured {record}");

        let delivery = self.uploader.send(&record);
        let action = PowerAction::plan(
            self.settings.sleep_between_measurements,
            self.settings.update_period,
            self.power.boot_cause(),
        );
        let end = power::apply(action, &mut self.power, &self.clock);

        CycleReport {
            measurement,
            record,
            delivery,
            action,
            end,
        }
    }

    /// Measures until a deep sleep is requested.
    pub fn run(&mut self) -> CycleEnd {
        loop {
            if let CycleEnd::Restart = self.run_cycle().end {
                return CycleEnd::Restart;
            }
        }
    }
}

/// Everything that happens from power-on to the first deep sleep.
pub fn boot<N, D, B, T, P, C>(
    settings: Settings,
    mut parts: StationParts<N, D, B, T, P>,
    clock: C,
) -> Result<CycleEnd, RetryError<NetworkError>>
where
    N: Network,
    D: DhtDriver,
    B: OneWireBus,
    T: Transport,
    P: PowerControl,
    C: Clock + Clone,
{
    info!("booting after {}", parts.power.boot_cause().as_str());
    network::bring_up(&mut parts.network, &settings.wifi, &bring_up_policy(), &clock)?;

    Ok(Station::new(settings, parts, clock).run())
}
