use std::{
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::{
    backend::Backend,
    calibration::Calibration,
    keys::*,
    types::DhtKind,
};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{location} not found; run `datalogger-node setup` to generate a config")]
    NotFound { location: String },
    #[error("invalid config document: {0}")]
    InvalidFormat(String),
    #[error("invalid config keys (missing: {missing:?}, unexpected: {unexpected:?})")]
    SchemaMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    #[error("config has not been loaded; `{key}` is unavailable")]
    MissingKey { key: String },
    #[error("`{key}` is not a declared config key")]
    UnknownKey { key: String },
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("config storage i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Bool,
    Text,
    DhtKind,
    Backend,
    Calibration,
}

impl ValueKind {
    /// Validates `raw` and returns the canonical JSON form that gets persisted.
    pub fn normalize(self, raw: &Value) -> Result<Value, String> {
        match self {
            Self::Int => to_int(raw).map(Value::from),
            Self::Bool => to_bool(raw).map(Value::Bool),
            Self::Text => to_text(raw).map(Value::String),
            Self::DhtKind => to_dht_kind(raw)
                .and_then(|kind| serde_json::to_value(kind).map_err(|err| err.to_string())),
            Self::Backend => to_backend(raw).map(|backend| json!(backend.as_config_str())),
            Self::Calibration => to_calibration(raw).map(|cal| json!(cal.source())),
        }
    }
}

fn to_int(raw: &Value) -> Result<i64, String> {
    match raw {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| format!("{number} is not an integer")),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("`{text}` is not an integer")),
        other => Err(format!("expected an integer, found {other}")),
    }
}

fn to_bool(raw: &Value) -> Result<bool, String> {
    match raw {
        Value::Bool(value) => Ok(*value),
        Value::Number(number) => Ok(number.as_f64().is_some_and(|value| value != 0.0)),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
            "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
            _ => Err(format!("`{text}` is not a boolean (use true/false)")),
        },
        other => Err(format!("expected a boolean, found {other}")),
    }
}

fn to_text(raw: &Value) -> Result<String, String> {
    match raw {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(value) => Ok(value.to_string()),
        other => Err(format!("expected a string, found {other}")),
    }
}

fn to_dht_kind(raw: &Value) -> Result<DhtKind, String> {
    let text = to_text(raw)?;
    DhtKind::parse(&text).ok_or_else(|| format!("`{text}` is not DHT11 or DHT22"))
}

fn to_backend(raw: &Value) -> Result<Backend, String> {
    Backend::parse(&to_text(raw)?)
}

fn to_calibration(raw: &Value) -> Result<Calibration, String> {
    Calibration::parse(&to_text(raw)?).map_err(|err| err.to_string())
}

fn display_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub kind: ValueKind,
    pub description: &'static str,
    pub default: Option<Value>,
}

impl ConfigEntry {
    pub fn new(
        key: &'static str,
        kind: ValueKind,
        description: &'static str,
        default: Option<Value>,
    ) -> Self {
        Self {
            key,
            kind,
            description,
            default,
        }
    }
}

/// Ordered set of declared config keys.
#[derive(Debug, Clone)]
pub struct Schema {
    entries: Vec<ConfigEntry>,
}

impl Schema {
    pub fn new(entries: Vec<ConfigEntry>) -> Self {
        Self { entries }
    }

    pub fn datalogger() -> Self {
        Self::new(vec![
            ConfigEntry::new(
                KEY_SENSOR_DHT_PIN,
                ValueKind::Int,
                "Pin for data to DHT chip, use -1 to disable",
                Some(json!(2)),
            ),
            ConfigEntry::new(
                KEY_SENSOR_DHT_TYPE,
                ValueKind::DhtKind,
                "Type of DHT sensor, either \"DHT11\" (blue) or \"DHT22\" (white)",
                Some(json!("DHT11")),
            ),
            ConfigEntry::new(
                KEY_SENSOR_DS18X20_PIN,
                ValueKind::Int,
                "Pin for data to DS18B20 chip, use -1 to disable",
                Some(json!(-1)),
            ),
            ConfigEntry::new(
                KEY_UPDATE_PERIOD,
                ValueKind::Int,
                "Update interval for measurements in seconds",
                Some(json!(10 * 60)),
            ),
            ConfigEntry::new(
                KEY_ENABLE_WIFI_SIGNAL,
                ValueKind::Bool,
                "Report wifi signal strength (scanning drains the battery faster)",
                Some(json!(true)),
            ),
            ConfigEntry::new(
                KEY_SLEEP_BETWEEN_MEASUREMENTS,
                ValueKind::Bool,
                "Deep sleep between measurements to save power (<1mA instead of 75mA)",
                Some(json!(true)),
            ),
            ConfigEntry::new(
                KEY_LOCATION,
                ValueKind::Text,
                "Where is the sensor located?",
                Some(json!("-")),
            ),
            ConfigEntry::new(
                KEY_API_BACKEND,
                ValueKind::Backend,
                "Data logging backend: phant, thingspeak or a URL template with {host}, {pubkey}, {privkey} and {fields}",
                Some(json!("phant")),
            ),
            ConfigEntry::new(KEY_API_PUB_KEY, ValueKind::Text, "Public API key", None),
            ConfigEntry::new(KEY_API_PRIVATE_KEY, ValueKind::Text, "Private API key", None),
            ConfigEntry::new(
                KEY_HOST,
                ValueKind::Text,
                "Host and port of the data logging server (like http://HOST:PORT/)",
                Some(json!("http://m33x7:8888/")),
            ),
            ConfigEntry::new(KEY_WIFI_SSID, ValueKind::Text, "WIFI SSID", None),
            ConfigEntry::new(KEY_WIFI_PASSWD, ValueKind::Text, "WIFI password", None),
            ConfigEntry::new(
                KEY_DHT_TEMP_CALIBRATION,
                ValueKind::Calibration,
                "DHT temperature calibration, an expression in x",
                Some(json!("x")),
            ),
            ConfigEntry::new(
                KEY_DHT_HUMID_CALIBRATION,
                ValueKind::Calibration,
                "DHT humidity calibration, an expression in x",
                Some(json!("x")),
            ),
            ConfigEntry::new(
                KEY_DS18B20_TEMP_CALIBRATION,
                ValueKind::Calibration,
                "DS18B20 temperature calibration, an expression in x",
                Some(json!("x")),
            ),
        ])
    }

    pub fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }

    pub fn entry(&self, key: &str) -> Option<&ConfigEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn check(&self, data: &Map<String, Value>) -> Result<(), ConfigError> {
        let mut missing: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !data.contains_key(entry.key))
            .map(|entry| entry.key.to_string())
            .collect();
        let mut unexpected: Vec<String> = data
            .keys()
            .filter(|key| self.entry(key).is_none())
            .cloned()
            .collect();

        if missing.is_empty() && unexpected.is_empty() {
            return Ok(());
        }
        missing.sort();
        unexpected.sort();
        Err(ConfigError::SchemaMismatch {
            missing,
            unexpected,
        })
    }
}

/// Where the config document lives.
pub trait ConfigStorage {
    fn exists(&self) -> bool;
    fn load(&self) -> Result<String, ConfigError>;
    /// Replaces the whole stored document.
    fn save(&self, contents: &str) -> Result<(), ConfigError>;
    fn location(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ConfigStorage for FileStorage {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn load(&self) -> Result<String, ConfigError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(ConfigError::NotFound {
                location: self.location(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, contents: &str) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let temp = self.temp_path();
        fs::write(&temp, contents)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Line-oriented question/answer channel used by interactive setup.
pub trait Prompt {
    /// Returns the answer without the trailing newline.
    fn ask(&mut self, question: &str) -> io::Result<String>;
    fn say(&mut self, text: &str) -> io::Result<()>;
}

pub struct StdioPrompt;

impl Prompt for StdioPrompt {
    fn ask(&mut self, question: &str) -> io::Result<String> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(question.as_bytes())?;
        stdout.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed during setup",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn say(&mut self, text: &str) -> io::Result<()> {
        writeln!(io::stdout().lock(), "{text}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    Written,
    Kept,
}

/// Schema-checked key/value store. Unread until `read` or `input` succeeds.
pub struct ConfigStore<S> {
    schema: Schema,
    storage: S,
    data: Option<Map<String, Value>>,
}

impl<S: ConfigStorage> ConfigStore<S> {
    pub fn new(schema: Schema, storage: S) -> Self {
        Self {
            schema,
            storage,
            data: None,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    fn load_document(&self) -> Result<Map<String, Value>, ConfigError> {
        if !self.storage.exists() {
            return Err(ConfigError::NotFound {
                location: self.storage.location(),
            });
        }

        match serde_json::from_str::<Value>(&self.storage.load()?)? {
            Value::Object(map) => Ok(map),
            other => Err(ConfigError::InvalidFormat(format!(
                "expected a JSON object, found {other}"
            ))),
        }
    }

    pub fn read(&mut self) -> Result<(), ConfigError> {
        let data = self.load_document()?;
        self.schema.check(&data)?;

        if let Some((key, _)) = data
            .iter()
            .find(|(_, value)| value.is_object() || value.is_array())
        {
            return Err(ConfigError::InvalidFormat(format!(
                "`{key}` must be a plain value"
            )));
        }

        self.data = Some(data);
        Ok(())
    }

    pub fn write(&self) -> Result<(), ConfigError> {
        let data = self.data.as_ref().ok_or_else(|| ConfigError::MissingKey {
            key: "*".to_string(),
        })?;
        let payload = serde_json::to_string_pretty(data)?;
        self.storage.save(&payload)
    }

    /// Asks for every key, offering declared defaults or the values of an
    /// existing store, then persists the complete key set.
    pub fn input(&mut self, prompt: &mut impl Prompt) -> Result<SetupOutcome, ConfigError> {
        let mut defaults: Map<String, Value> = self
            .schema
            .entries
            .iter()
            .filter_map(|entry| Some((entry.key.to_string(), entry.default.clone()?)))
            .collect();

        if self.storage.exists() {
            loop {
                let answer = prompt.ask("File exists. Overwrite? [y/n] ")?;
                match answer.trim().to_ascii_lowercase().as_str() {
                    "y" | "yes" => break,
                    "n" | "no" => return Ok(SetupOutcome::Kept),
                    _ => {}
                }
            }

            let answer = prompt.ask("Defaults from old file? [Y/n] ")?;
            if matches!(answer.trim().to_ascii_lowercase().as_str(), "" | "y" | "yes") {
                let old = self.load_document()?;
                for entry in &self.schema.entries {
                    if let Some(value) = old.get(entry.key) {
                        defaults.insert(entry.key.to_string(), value.clone());
                    }
                }
            }
        }

        let mut data = Map::new();
        for entry in &self.schema.entries {
            if !entry.description.is_empty() {
                prompt.say(&format!("\n{}", entry.description))?;
            }

            let default = defaults.get(entry.key);
            let question = match default {
                Some(value) => format!("  {} [{}]: ", entry.key, display_scalar(value)),
                None => format!("  {}: ", entry.key),
            };

            loop {
                let answer = prompt.ask(&question)?;
                let raw = match (answer.is_empty(), default) {
                    (true, Some(value)) => value.clone(),
                    _ => Value::String(answer),
                };
                match entry.kind.normalize(&raw) {
                    Ok(value) => {
                        data.insert(entry.key.to_string(), value);
                        break;
                    }
                    Err(reason) => prompt.say(&format!("  invalid value: {reason}"))?,
                }
            }
        }

        self.data = Some(data);
        self.write()?;
        Ok(SetupOutcome::Written)
    }

    fn raw(&self, key: &str) -> Result<&Value, ConfigError> {
        if self.schema.entry(key).is_none() {
            return Err(ConfigError::UnknownKey {
                key: key.to_string(),
            });
        }
        self.data
            .as_ref()
            .and_then(|data| data.get(key))
            .ok_or_else(|| ConfigError::MissingKey {
                key: key.to_string(),
            })
    }

    fn convert<T>(
        &self,
        key: &str,
        convert: impl FnOnce(&Value) -> Result<T, String>,
    ) -> Result<T, ConfigError> {
        convert(self.raw(key)?).map_err(|reason| ConfigError::InvalidValue {
            key: key.to_string(),
            reason,
        })
    }

    pub fn int(&self, key: &str) -> Result<i64, ConfigError> {
        self.convert(key, to_int)
    }

    pub fn boolean(&self, key: &str) -> Result<bool, ConfigError> {
        self.convert(key, to_bool)
    }

    pub fn string(&self, key: &str) -> Result<String, ConfigError> {
        self.convert(key, to_text)
    }

    pub fn dht_kind(&self, key: &str) -> Result<DhtKind, ConfigError> {
        self.convert(key, to_dht_kind)
    }

    pub fn backend(&self, key: &str) -> Result<Backend, ConfigError> {
        self.convert(key, to_backend)
    }

    pub fn calibration(&self, key: &str) -> Result<Calibration, ConfigError> {
        self.convert(key, to_calibration)
    }
}
