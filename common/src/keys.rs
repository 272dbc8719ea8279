pub const KEY_SENSOR_DHT_PIN: &str = "sensor_dht_pin";
pub const KEY_SENSOR_DHT_TYPE: &str = "sensor_dht_type";
pub const KEY_SENSOR_DS18X20_PIN: &str = "sensor_ds18x20_pin";
pub const KEY_UPDATE_PERIOD: &str = "update_period";
pub const KEY_ENABLE_WIFI_SIGNAL: &str = "enable_wifi_signal";
pub const KEY_SLEEP_BETWEEN_MEASUREMENTS: &str = "sleep_between_measurements";
pub const KEY_LOCATION: &str = "location";
pub const KEY_API_BACKEND: &str = "api_backend";
pub const KEY_API_PUB_KEY: &str = "api_pub_key";
pub const KEY_API_PRIVATE_KEY: &str = "api_private_key";
pub const KEY_HOST: &str = "host";
pub const KEY_WIFI_SSID: &str = "wifi_ssid";
pub const KEY_WIFI_PASSWD: &str = "wifi_passwd";
pub const KEY_DHT_TEMP_CALIBRATION: &str = "dht_temp_calibration";
pub const KEY_DHT_HUMID_CALIBRATION: &str = "dht_humid_calibration";
pub const KEY_DS18B20_TEMP_CALIBRATION: &str = "ds18b20_temp_calibration";

pub const FIELD_TEMPERATURE1: &str = "temperature1";
pub const FIELD_TEMPERATURE2: &str = "temperature2";
pub const FIELD_HUMIDITY: &str = "humidity";
pub const FIELD_COMMENT: &str = "comment";
pub const FIELD_TIME: &str = "time";
pub const FIELD_LOCATION: &str = "location";
pub const FIELD_WIFI_SIGNAL: &str = "wifi_signal";
pub const FIELD_SUPPLY_VOLTAGE: &str = "supply_voltage";
