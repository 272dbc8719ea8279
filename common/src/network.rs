use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

use crate::{
    clock::Clock,
    retry::{RetryError, RetryOutcome, RetryPolicy},
    types::WifiCredentials,
};

pub const BRING_UP_ATTEMPTS: u32 = 10;
pub const BRING_UP_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("wifi connection failed: {0}")]
    Connect(String),
    #[error("no address assigned within {0:?}")]
    AddressTimeout(Duration),
    #[error("time sync failed: {0}")]
    TimeSync(String),
    #[error("wifi scan failed: {0}")]
    Scan(String),
}

/// Station-mode wifi plus wall-clock synchronisation.
pub trait Network {
    /// Disables the access point, joins `credentials.ssid` and waits for an address.
    fn connect(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError>;
    fn sync_time(&mut self) -> Result<(), NetworkError>;
    /// RSSI of every visible access point named `ssid`.
    fn scan(&mut self, ssid: &str) -> Result<Vec<i8>, NetworkError>;
}

pub fn bring_up_policy() -> RetryPolicy {
    RetryPolicy::new("network bring-up")
        .max_attempts(BRING_UP_ATTEMPTS)
        .delay(BRING_UP_RETRY_DELAY)
}

/// Connects and syncs the clock, retrying the pair as one unit.
pub fn bring_up<N, C>(
    network: &mut N,
    credentials: &WifiCredentials,
    policy: &RetryPolicy,
    clock: &C,
) -> Result<u32, RetryError<NetworkError>>
where
    N: Network,
    C: Clock,
{
    info!("connecting to wifi `{}`", credentials.ssid);
    let outcome = policy.run(clock, |_| {
        network.connect(credentials)?;
        network.sync_time()
    })?;

    match outcome {
        RetryOutcome::Done { attempts, .. } => {
            info!("network up after {attempts} attempt(s)");
            Ok(attempts)
        }
        RetryOutcome::GaveUp { attempts } => {
            warn!("continuing without network after {attempts} attempt(s)");
            Ok(attempts)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiSignal {
    Disabled,
    Rssi(i8),
    NotFound,
    Ambiguous(usize),
    ScanFailed(String),
}

impl WifiSignal {
    pub fn value(&self) -> Option<f32> {
        match self {
            Self::Rssi(rssi) => Some(f32::from(*rssi)),
            _ => None,
        }
    }
}

/// Looks up the RSSI of the configured access point. Zero or several matches
/// are reported as such rather than guessed.
pub fn wifi_signal<N: Network>(network: &mut N, enabled: bool, ssid: &str) -> WifiSignal {
    if !enabled {
        return WifiSignal::Disabled;
    }

    match network.scan(ssid) {
        Ok(matches) => match matches.as_slice() {
            [rssi] => WifiSignal::Rssi(*rssi),
            [] => {
                warn!("wifi scan did not find `{ssid}`");
                WifiSignal::NotFound
            }
            several => {
                warn!("wifi scan found {} networks named `{ssid}`", several.len());
                WifiSignal::Ambiguous(several.len())
            }
        },
        Err(err) => {
            warn!("{err}");
            WifiSignal::ScanFailed(err.to_string())
        }
    }
}
