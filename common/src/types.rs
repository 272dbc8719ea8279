use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DhtKind {
    Dht11,
    Dht22,
}

impl DhtKind {
    /// Case-insensitive `DHT11`/`DHT22`.
    pub fn parse(value: &str) -> Option<Self> {
        serde_json::from_value(Value::String(value.trim().to_ascii_uppercase())).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootCause {
    ColdBoot,
    DeepSleepWake,
}

impl BootCause {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ColdBoot => "cold boot",
            Self::DeepSleepWake => "deep sleep wake",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}
