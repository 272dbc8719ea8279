use crate::{
    http::{HttpRequest, UploadError},
    keys::*,
    record::{percent_encode, MeasurementRecord},
};

const THINGSPEAK_FIELDS: &[(&str, &str)] = &[
    (FIELD_TEMPERATURE1, "field1"),
    (FIELD_TEMPERATURE2, "field2"),
    (FIELD_HUMIDITY, "field3"),
    (FIELD_WIFI_SIGNAL, "field4"),
    (FIELD_SUPPLY_VOLTAGE, "field5"),
    (FIELD_TIME, "field6"),
    (FIELD_LOCATION, "field7"),
    (FIELD_COMMENT, "status"),
];

/// Where and how records are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub public_key: String,
    pub private_key: String,
}

impl Endpoint {
    fn base(&self) -> &str {
        self.host.trim_end_matches('/')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Phant,
    ThingSpeak,
    /// URL template with `{host}`, `{pubkey}`, `{privkey}` and `{fields}`.
    Custom(String),
}

impl Backend {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "phant" => Ok(Self::Phant),
            "thingspeak" => Ok(Self::ThingSpeak),
            _ if trimmed.contains("{fields}") => Ok(Self::Custom(trimmed.to_string())),
            _ => Err(format!(
                "`{raw}` is neither phant, thingspeak nor a template containing {{fields}}"
            )),
        }
    }

    pub fn as_config_str(&self) -> &str {
        match self {
            Self::Phant => "phant",
            Self::ThingSpeak => "thingspeak",
            Self::Custom(template) => template,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Phant => "phant",
            Self::ThingSpeak => "thingspeak",
            Self::Custom(_) => "custom",
        }
    }

    pub fn field_map(&self) -> Option<&'static [(&'static str, &'static str)]> {
        match self {
            Self::ThingSpeak => Some(THINGSPEAK_FIELDS),
            Self::Phant | Self::Custom(_) => None,
        }
    }

    /// Renames the record's fields to the names this backend expects.
    pub fn translate(&self, record: &MeasurementRecord) -> MeasurementRecord {
        match self.field_map() {
            Some(table) => record.renamed(table),
            None => record.clone(),
        }
    }

    /// Builds the request publishing an already translated record.
    pub fn request(
        &self,
        endpoint: &Endpoint,
        record: &MeasurementRecord,
    ) -> Result<HttpRequest, UploadError> {
        let fields = record.query_string();
        let public_key = percent_encode(&endpoint.public_key);
        let private_key = percent_encode(&endpoint.private_key);

        match self {
            Self::Phant => HttpRequest::get(&format!(
                "{}/input/{public_key}?private_key={private_key}&{fields}",
                endpoint.base()
            )),
            Self::ThingSpeak => HttpRequest::get(&format!(
                "{}/update?api_key={private_key}&{fields}",
                endpoint.base()
            )),
            Self::Custom(template) => HttpRequest::get(
                &template
                    .replace("{host}", endpoint.base())
                    .replace("{pubkey}", &public_key)
                    .replace("{privkey}", &private_key)
                    .replace("{fields}", &fields),
            ),
        }
    }
}
