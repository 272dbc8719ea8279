pub mod backend;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod http;
pub mod keys;
pub mod network;
pub mod power;
pub mod record;
pub mod retry;
pub mod sensors;
pub mod settings;
pub mod station;
pub mod types;
pub mod upload;

pub use backend::{Backend, Endpoint};
pub use calibration::{Calibration, CalibrationError};
pub use clock::{Clock, SystemClock};
pub use config::{
    ConfigError, ConfigStorage, ConfigStore, FileStorage, Prompt, Schema, SetupOutcome,
    StdioPrompt, DEFAULT_CONFIG_FILE,
};
pub use http::{HttpRequest, HttpResponse, TcpTransport, Transport, UploadError};
pub use keys::*;
pub use network::{Network, NetworkError, WifiSignal};
pub use power::{CycleEnd, PowerAction, PowerControl};
pub use record::{FieldValue, Measurement, MeasurementRecord};
pub use retry::{OnExhausted, RetryError, RetryOutcome, RetryPolicy};
pub use sensors::{DhtDriver, DhtSample, OneWireBus, Reading, SensorError};
pub use settings::Settings;
pub use station::{boot, Station, StationParts};
pub use types::{BootCause, DhtKind, WifiCredentials};
pub use upload::{Delivery, Uploader};
