use std::time::Duration;

use crate::{
    backend::{Backend, Endpoint},
    calibration::Calibration,
    config::{ConfigError, ConfigStorage, ConfigStore},
    keys::*,
    types::{DhtKind, WifiCredentials},
};

/// Typed settings, built once from a loaded store and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub dht_pin: i32,
    pub dht_kind: DhtKind,
    pub ds18x20_pin: i32,
    pub update_period: Duration,
    pub enable_wifi_signal: bool,
    pub sleep_between_measurements: bool,
    pub location: String,
    pub backend: Backend,
    pub endpoint: Endpoint,
    pub wifi: WifiCredentials,
    pub dht_temperature_calibration: Calibration,
    pub dht_humidity_calibration: Calibration,
    pub ds18x20_calibration: Calibration,
}

impl Settings {
    pub fn load<S: ConfigStorage>(store: &ConfigStore<S>) -> Result<Self, ConfigError> {
        let update_period = store.int(KEY_UPDATE_PERIOD)?;
        if update_period <= 0 {
            return Err(ConfigError::InvalidValue {
                key: KEY_UPDATE_PERIOD.to_string(),
                reason: format!("{update_period} is not a positive number of seconds"),
            });
        }

        Ok(Self {
            dht_pin: pin(store, KEY_SENSOR_DHT_PIN)?,
            dht_kind: store.dht_kind(KEY_SENSOR_DHT_TYPE)?,
            ds18x20_pin: pin(store, KEY_SENSOR_DS18X20_PIN)?,
            update_period: Duration::from_secs(update_period as u64),
            enable_wifi_signal: store.boolean(KEY_ENABLE_WIFI_SIGNAL)?,
            sleep_between_measurements: store.boolean(KEY_SLEEP_BETWEEN_MEASUREMENTS)?,
            location: store.string(KEY_LOCATION)?,
            backend: store.backend(KEY_API_BACKEND)?,
            endpoint: Endpoint {
                host: store.string(KEY_HOST)?,
                public_key: store.string(KEY_API_PUB_KEY)?,
                private_key: store.string(KEY_API_PRIVATE_KEY)?,
            },
            wifi: WifiCredentials {
                ssid: store.string(KEY_WIFI_SSID)?,
                password: store.string(KEY_WIFI_PASSWD)?,
            },
            dht_temperature_calibration: store.calibration(KEY_DHT_TEMP_CALIBRATION)?,
            dht_humidity_calibration: store.calibration(KEY_DHT_HUMID_CALIBRATION)?,
            ds18x20_calibration: store.calibration(KEY_DS18B20_TEMP_CALIBRATION)?,
        })
    }

    /// GPIO number of the DHT data line, `None` when disabled.
    pub fn dht_gpio(&self) -> Option<u8> {
        gpio(self.dht_pin)
    }

    pub fn ds18x20_gpio(&self) -> Option<u8> {
        gpio(self.ds18x20_pin)
    }
}

fn pin<S: ConfigStorage>(store: &ConfigStore<S>, key: &str) -> Result<i32, ConfigError> {
    let value = store.int(key)?;
    i32::try_from(value).map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("{value} is out of range for a pin"),
    })
}

fn gpio(pin: i32) -> Option<u8> {
    u8::try_from(pin).ok()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::config::{
        tests::{full_document, MemoryStorage},
        Schema,
    };

    fn load(document: serde_json::Value) -> Result<Settings, ConfigError> {
        let mut store = ConfigStore::new(Schema::datalogger(), MemoryStorage::with(document));
        store.read()?;
        Settings::load(&store)
    }

    #[test]
    fn loads_typed_settings() {
        let settings = load(full_document()).unwrap();

        assert_eq!(settings.dht_gpio(), Some(2));
        assert_eq!(settings.ds18x20_gpio(), None);
        assert_eq!(settings.dht_kind, DhtKind::Dht22);
        assert_eq!(settings.update_period, Duration::from_secs(300));
        assert!(!settings.enable_wifi_signal);
        assert!(settings.sleep_between_measurements);
        assert_eq!(settings.backend, Backend::ThingSpeak);
        assert_eq!(settings.endpoint.host, "http://logger.local:8080/");
        assert_eq!(settings.wifi.ssid, "home");
        assert_eq!(settings.dht_humidity_calibration.apply(50.0), 52.5);
    }

    #[test]
    fn rejects_non_positive_period() {
        let mut document = full_document();
        document["update_period"] = json!(0);

        assert!(matches!(
            load(document),
            Err(ConfigError::InvalidValue { key, .. }) if key == KEY_UPDATE_PERIOD
        ));
    }

    #[test]
    fn unloaded_store_fails() {
        let store = ConfigStore::new(Schema::datalogger(), MemoryStorage::default());
        assert!(matches!(
            Settings::load(&store),
            Err(ConfigError::MissingKey { .. })
        ));
    }
}
