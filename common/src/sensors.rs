use std::{fmt, time::Duration};

use log::warn;
use thiserror::Error;

use crate::{calibration::Calibration, clock::Clock, types::DhtKind};

/// DS18x20 conversion time at 12-bit resolution.
pub const DS18X20_CONVERSION_TIME: Duration = Duration::from_millis(750);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("sensor did not answer in time")]
    Timeout,
    #[error("checksum mismatch")]
    Checksum,
    #[error("no device found on the bus")]
    NoDevice,
    #[error("bus error: {0}")]
    Bus(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Disabled,
    Value(f32),
    Failed(SensorError),
}

impl Reading {
    pub fn value(&self) -> Option<f32> {
        match self {
            Self::Value(value) => Some(*value),
            _ => None,
        }
    }

    /// Upload representation: anything but a value is not-a-number.
    pub fn as_f32(&self) -> f32 {
        self.value().unwrap_or(f32::NAN)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("disabled"),
            Self::Value(value) => write!(f, "{value:.1}"),
            Self::Failed(err) => write!(f, "failed ({err})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DhtSample {
    pub temperature_c: f32,
    pub relative_humidity: f32,
}

/// One DHT measurement cycle on the data line.
pub trait DhtDriver {
    fn measure(&mut self, kind: DhtKind) -> Result<DhtSample, SensorError>;
}

/// 1-Wire bus with DS18x20 devices, addressed by 64-bit ROM code.
pub trait OneWireBus {
    fn scan(&mut self) -> Result<Vec<u64>, SensorError>;
    /// Starts a temperature conversion on every device.
    fn start_conversion(&mut self) -> Result<(), SensorError>;
    fn read_temperature(&mut self, address: u64) -> Result<f32, SensorError>;
}

/// DHT11/DHT22 reader.
///
/// Temperature and humidity come from the same physical sample: the hardware
/// is measured on every other accessor call, so callers must read
/// `temperature()` and `humidity()` as a pair per sample.
pub struct DhtReader<D> {
    driver: Option<D>,
    kind: DhtKind,
    temperature_calibration: Calibration,
    humidity_calibration: Calibration,
    measured: bool,
    sample: Option<Result<DhtSample, SensorError>>,
}

impl<D: DhtDriver> DhtReader<D> {
    pub fn new(
        driver: Option<D>,
        kind: DhtKind,
        temperature_calibration: Calibration,
        humidity_calibration: Calibration,
    ) -> Self {
        Self {
            driver,
            kind,
            temperature_calibration,
            humidity_calibration,
            measured: false,
            sample: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.driver.is_some()
    }

    pub fn driver(&self) -> Option<&D> {
        self.driver.as_ref()
    }

    fn next_sample(&mut self) -> Option<Result<DhtSample, SensorError>> {
        let driver = self.driver.as_mut()?;
        if !self.measured {
            let sample = driver.measure(self.kind);
            if let Err(err) = &sample {
                warn!("{:?} measurement failed: {err}", self.kind);
            }
            self.sample = Some(sample);
        }
        self.measured = !self.measured;
        self.sample.clone()
    }

    pub fn temperature(&mut self) -> Reading {
        match self.next_sample() {
            None => Reading::Disabled,
            Some(Ok(sample)) => {
                Reading::Value(self.temperature_calibration.apply(sample.temperature_c))
            }
            Some(Err(err)) => Reading::Failed(err),
        }
    }

    pub fn humidity(&mut self) -> Reading {
        match self.next_sample() {
            None => Reading::Disabled,
            Some(Ok(sample)) => {
                Reading::Value(self.humidity_calibration.apply(sample.relative_humidity))
            }
            Some(Err(err)) => Reading::Failed(err),
        }
    }
}

/// DS18x20 reader; rescans the bus on every reading and uses the first device.
pub struct Ds18x20Reader<B, C> {
    bus: Option<B>,
    calibration: Calibration,
    clock: C,
}

impl<B: OneWireBus, C: Clock> Ds18x20Reader<B, C> {
    pub fn new(bus: Option<B>, calibration: Calibration, clock: C) -> Self {
        Self {
            bus,
            calibration,
            clock,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.bus.is_some()
    }

    pub fn temperature(&mut self) -> Reading {
        let Some(bus) = self.bus.as_mut() else {
            return Reading::Disabled;
        };

        let result = bus.scan().and_then(|devices| {
            let address = *devices.first().ok_or(SensorError::NoDevice)?;
            bus.start_conversion()?;
            self.clock.sleep(DS18X20_CONVERSION_TIME);
            bus.read_temperature(address)
        });

        match result {
            Ok(temperature) => Reading::Value(self.calibration.apply(temperature)),
            Err(err) => {
                warn!("DS18x20 reading failed: {err}");
                Reading::Failed(err)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::clock::fake::FakeClock;

    #[derive(Debug, Default)]
    pub struct ScriptedDht {
        pub calls: u32,
        pub samples: VecDeque<Result<DhtSample, SensorError>>,
    }

    impl ScriptedDht {
        pub fn returning(samples: &[(f32, f32)]) -> Self {
            Self {
                calls: 0,
                samples: samples
                    .iter()
                    .map(|&(temperature_c, relative_humidity)| {
                        Ok(DhtSample {
                            temperature_c,
                            relative_humidity,
                        })
                    })
                    .collect(),
            }
        }
    }

    impl DhtDriver for ScriptedDht {
        fn measure(&mut self, _kind: DhtKind) -> Result<DhtSample, SensorError> {
            self.calls += 1;
            self.samples.pop_front().unwrap_or(Err(SensorError::Timeout))
        }
    }

    #[derive(Debug, Default)]
    pub struct FakeBus {
        pub devices: Vec<u64>,
        pub temperature: f32,
        pub conversions: u32,
        pub scans: u32,
    }

    impl OneWireBus for FakeBus {
        fn scan(&mut self) -> Result<Vec<u64>, SensorError> {
            self.scans += 1;
            Ok(self.devices.clone())
        }

        fn start_conversion(&mut self) -> Result<(), SensorError> {
            self.conversions += 1;
            Ok(())
        }

        fn read_temperature(&mut self, address: u64) -> Result<f32, SensorError> {
            assert_eq!(Some(&address), self.devices.first());
            Ok(self.temperature)
        }
    }

    fn dht(driver: Option<ScriptedDht>) -> DhtReader<ScriptedDht> {
        DhtReader::new(
            driver,
            DhtKind::Dht22,
            Calibration::identity(),
            Calibration::identity(),
        )
    }

    #[test]
    fn disabled_dht_reads_nothing() {
        let mut reader = dht(None);

        assert_eq!(reader.temperature(), Reading::Disabled);
        assert_eq!(reader.humidity(), Reading::Disabled);
        assert!(reader.temperature().as_f32().is_nan());
        assert!(reader.humidity().as_f32().is_nan());
        assert!(!reader.is_enabled());
    }

    #[test]
    fn one_measurement_per_temperature_humidity_pair() {
        let mut reader = dht(Some(ScriptedDht::returning(&[(21.0, 40.0), (22.0, 41.0)])));

        assert_eq!(reader.temperature(), Reading::Value(21.0));
        assert_eq!(reader.humidity(), Reading::Value(40.0));
        assert_eq!(reader.driver().unwrap().calls, 1);

        assert_eq!(reader.temperature(), Reading::Value(22.0));
        assert_eq!(reader.humidity(), Reading::Value(41.0));
        assert_eq!(reader.driver().unwrap().calls, 2);
    }

    #[test]
    fn failed_measurement_is_reported_by_both_accessors() {
        let mut reader = dht(Some(ScriptedDht::default()));

        assert_eq!(reader.temperature(), Reading::Failed(SensorError::Timeout));
        assert_eq!(reader.humidity(), Reading::Failed(SensorError::Timeout));
        assert_eq!(reader.driver().unwrap().calls, 1);
    }

    #[test]
    fn dht_applies_calibrations() {
        let mut reader = DhtReader::new(
            Some(ScriptedDht::returning(&[(20.0, 50.0)])),
            DhtKind::Dht11,
            Calibration::parse("x - 1").unwrap(),
            Calibration::affine(2.0, 0.0),
        );

        assert_eq!(reader.temperature(), Reading::Value(19.0));
        assert_eq!(reader.humidity(), Reading::Value(100.0));
    }

    #[test]
    fn ds18x20_waits_for_conversion_and_reads_first_device() {
        let clock = FakeClock::default();
        let bus = FakeBus {
            devices: vec![0x28_0000_0000_0001, 0x28_0000_0000_0002],
            temperature: 18.5,
            ..FakeBus::default()
        };
        let mut reader = Ds18x20Reader::new(Some(bus), Calibration::parse("x + 0.5").unwrap(), &clock);

        assert_eq!(reader.temperature(), Reading::Value(19.0));
        assert_eq!(reader.temperature(), Reading::Value(19.0));
        assert_eq!(
            *clock.sleeps.borrow(),
            vec![DS18X20_CONVERSION_TIME, DS18X20_CONVERSION_TIME]
        );
        let bus = reader.bus.as_ref().unwrap();
        assert_eq!((bus.scans, bus.conversions), (2, 2));
    }

    #[test]
    fn ds18x20_without_devices() {
        let clock = FakeClock::default();
        let mut reader = Ds18x20Reader::new(Some(FakeBus::default()), Calibration::identity(), &clock);

        assert_eq!(reader.temperature(), Reading::Failed(SensorError::NoDevice));
        assert!(reader.temperature().as_f32().is_nan());
        assert!(clock.sleeps.borrow().is_empty());
    }

    #[test]
    fn disabled_ds18x20() {
        let clock = FakeClock::default();
        let mut reader: Ds18x20Reader<FakeBus, _> =
            Ds18x20Reader::new(None, Calibration::identity(), &clock);

        assert_eq!(reader.temperature(), Reading::Disabled);
        assert!(!reader.is_enabled());
    }
}
