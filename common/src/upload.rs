use std::time::Duration;

use log::{info, warn};

use crate::{
    backend::{Backend, Endpoint},
    clock::Clock,
    http::{Transport, UploadError},
    record::MeasurementRecord,
    retry::{OnExhausted, RetryOutcome, RetryPolicy},
};

pub const UPLOAD_ATTEMPTS: u32 = 10;
pub const UPLOAD_RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered { attempts: u32, status: u16 },
    Dropped { attempts: u32 },
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

pub fn upload_policy() -> RetryPolicy {
    RetryPolicy::new("upload")
        .max_attempts(UPLOAD_ATTEMPTS)
        .delay(UPLOAD_RETRY_DELAY)
        .on_exhausted(OnExhausted::GiveUp)
}

pub struct Uploader<T, C> {
    backend: Backend,
    endpoint: Endpoint,
    transport: T,
    clock: C,
    policy: RetryPolicy,
}

impl<T: Transport, C: Clock> Uploader<T, C> {
    pub fn new(backend: Backend, endpoint: Endpoint, transport: T, clock: C) -> Self {
        Self {
            backend,
            endpoint,
            transport,
            clock,
            policy: upload_policy(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Translates and publishes `record`. A record that cannot be delivered
    /// within the attempt budget is dropped.
    pub fn send(&mut self, record: &MeasurementRecord) -> Delivery {
        let translated = self.backend.translate(record);
        let request = match self.backend.request(&self.endpoint, &translated) {
            Ok(request) => request,
            Err(err) => {
                warn!("dropping record, cannot build {} request: {err}", self.backend.name());
                return Delivery::Dropped { attempts: 0 };
            }
        };

        let transport = &mut self.transport;
        let outcome = self.policy.run(&self.clock, |_| {
            let response = transport.execute(&request)?;
            if response.is_success() {
                Ok(response.status)
            } else {
                Err(UploadError::Rejected {
                    status: response.status,
                    reason: response.reason,
                })
            }
        });

        match outcome {
            Ok(RetryOutcome::Done { value, attempts }) => {
                info!("uploaded to {} ({value}) after {attempts} attempt(s)", self.backend.name());
                Delivery::Delivered {
                    attempts,
                    status: value,
                }
            }
            Ok(RetryOutcome::GaveUp { attempts }) => {
                warn!("dropping record after {attempts} failed upload(s)");
                Delivery::Dropped { attempts }
            }
            Err(err) => {
                warn!("dropping record: {err}");
                Delivery::Dropped {
                    attempts: self.policy.max_attempts,
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{collections::VecDeque, io};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        clock::fake::FakeClock,
        http::{HttpRequest, HttpResponse},
        record::FieldValue,
    };

    /// Answers from a script; once it runs out every call succeeds.
    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        pub requests: Vec<HttpRequest>,
        pub script: VecDeque<Result<u16, ()>>,
    }

    impl ScriptedTransport {
        pub fn failing(times: usize) -> Self {
            Self {
                requests: Vec::new(),
                script: std::iter::repeat(Err(())).take(times).collect(),
            }
        }

        pub fn rejecting(times: usize, status: u16) -> Self {
            Self {
                requests: Vec::new(),
                script: std::iter::repeat(Ok(status)).take(times).collect(),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, UploadError> {
            self.requests.push(request.clone());
            match self.script.pop_front().unwrap_or(Ok(200)) {
                Ok(status) => Ok(HttpResponse {
                    status,
                    reason: "whatever".to_string(),
                    body: Vec::new(),
                }),
                Err(()) => Err(UploadError::Unreachable {
                    host: request.url.host.clone(),
                    source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
                }),
            }
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint {
            host: "http://logger.local/".to_string(),
            public_key: "pub".to_string(),
            private_key: "priv".to_string(),
        }
    }

    fn record() -> MeasurementRecord {
        MeasurementRecord::new([("temperature1", FieldValue::Float(21.5))])
    }

    #[test]
    fn delivered_on_last_attempt() {
        let clock = FakeClock::default();
        let mut uploader = Uploader::new(
            Backend::Phant,
            endpoint(),
            ScriptedTransport::failing(9),
            &clock,
        );

        assert_eq!(
            uploader.send(&record()),
            Delivery::Delivered {
                attempts: 10,
                status: 200
            }
        );
        assert_eq!(uploader.transport().requests.len(), 10);
        assert_eq!(clock.total_slept(), UPLOAD_RETRY_DELAY * 9);
    }

    #[test]
    fn dropped_after_ten_failures() {
        let clock = FakeClock::default();
        let mut uploader = Uploader::new(
            Backend::Phant,
            endpoint(),
            ScriptedTransport::failing(20),
            &clock,
        );

        assert_eq!(uploader.send(&record()), Delivery::Dropped { attempts: 10 });
        assert_eq!(uploader.transport().requests.len(), 10);
    }

    #[test]
    fn rejected_status_is_retried() {
        let clock = FakeClock::default();
        let transport = ScriptedTransport {
            requests: Vec::new(),
            script: VecDeque::from([Ok(500), Ok(403)]),
        };
        let mut uploader = Uploader::new(Backend::Phant, endpoint(), transport, &clock);

        let delivery = uploader.send(&record());

        assert_eq!(
            delivery,
            Delivery::Delivered {
                attempts: 3,
                status: 200
            }
        );
        assert!(delivery.is_delivered());
    }

    #[test]
    fn delivered_after_nine_rejections() {
        let clock = FakeClock::default();
        let mut uploader = Uploader::new(
            Backend::Phant,
            endpoint(),
            ScriptedTransport::rejecting(9, 500),
            &clock,
        );

        assert_eq!(
            uploader.send(&record()),
            Delivery::Delivered {
                attempts: 10,
                status: 200
            }
        );
        assert_eq!(uploader.transport().requests.len(), 10);
        assert_eq!(clock.total_slept(), UPLOAD_RETRY_DELAY * 9);
    }

    #[test]
    fn dropped_after_ten_rejections() {
        let clock = FakeClock::default();
        let mut uploader = Uploader::new(
            Backend::Phant,
            endpoint(),
            ScriptedTransport::rejecting(10, 500),
            &clock,
        );

        assert_eq!(uploader.send(&record()), Delivery::Dropped { attempts: 10 });
        assert_eq!(uploader.transport().requests.len(), 10);
        assert_eq!(clock.total_slept(), UPLOAD_RETRY_DELAY * 9);
    }

    #[test]
    fn sends_translated_record() {
        let clock = FakeClock::default();
        let mut uploader = Uploader::new(
            Backend::ThingSpeak,
            endpoint(),
            ScriptedTransport::default(),
            &clock,
        );

        uploader.send(&record());

        let request = &uploader.transport().requests[0];
        assert_eq!(request.url.path, "/update?api_key=priv&field1=21.5");
    }

    #[test]
    fn unbuildable_request_is_dropped_without_attempts() {
        let clock = FakeClock::default();
        let endpoint = Endpoint {
            host: "ftp://logger.local".to_string(),
            ..endpoint()
        };
        let mut uploader =
            Uploader::new(Backend::Phant, endpoint, ScriptedTransport::default(), &clock);

        assert_eq!(uploader.send(&record()), Delivery::Dropped { attempts: 0 });
        assert!(uploader.transport().requests.is_empty());
    }
}
