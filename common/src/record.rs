use std::fmt;

use crate::{keys::*, network::WifiSignal, sensors::Reading};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f32),
    Integer(i64),
    Text(String),
}

impl FieldValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Integer(value) => Some(*value as f32),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(value) if value.is_nan() => f.write_str("nan"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Ordered field name to value mapping sent to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    fields: Vec<(String, FieldValue)>,
}

impl MeasurementRecord {
    pub fn new<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Renames fields through `table`; names without an entry stay as they are.
    pub fn renamed(&self, table: &[(&str, &str)]) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .map(|(name, value)| {
                    let renamed = table
                        .iter()
                        .find(|(from, _)| from == name)
                        .map_or(name.as_str(), |(_, to)| *to);
                    (renamed.to_string(), value.clone())
                })
                .collect(),
        }
    }

    /// `name=value&name=value` with both sides percent-encoded.
    pub fn query_string(&self) -> String {
        self.fields
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    percent_encode(name),
                    percent_encode(&value.to_string())
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Display for MeasurementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, (name, value)) in self.fields.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

pub fn percent_encode(value: &str) -> String {
    use std::fmt::Write as _;

    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => {
                let _ = write!(&mut encoded, "%{byte:02X}");
            }
        }
    }
    encoded
}

/// Everything one measurement cycle collects, before it is flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub temperature1: Reading,
    pub temperature2: Reading,
    pub humidity: Reading,
    pub comment: String,
    pub time: i64,
    pub location: String,
    pub wifi_signal: WifiSignal,
    pub supply_voltage: Option<f32>,
}

impl Measurement {
    pub fn to_record(&self) -> MeasurementRecord {
        MeasurementRecord::new([
            (FIELD_TEMPERATURE1, FieldValue::Float(self.temperature1.as_f32())),
            (FIELD_TEMPERATURE2, FieldValue::Float(self.temperature2.as_f32())),
            (FIELD_HUMIDITY, FieldValue::Float(self.humidity.as_f32())),
            (FIELD_COMMENT, FieldValue::Text(self.comment.clone())),
            (FIELD_TIME, FieldValue::Integer(self.time)),
            (FIELD_LOCATION, FieldValue::Text(self.location.clone())),
            (
                FIELD_WIFI_SIGNAL,
                FieldValue::Float(self.wifi_signal.value().unwrap_or(f32::NAN)),
            ),
            (
                FIELD_SUPPLY_VOLTAGE,
                FieldValue::Float(self.supply_voltage.unwrap_or(f32::NAN)),
            ),
        ])
    }
}
