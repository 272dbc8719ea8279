use std::{fmt::Display, time::Duration};

use log::warn;
use thiserror::Error;

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnExhausted {
    /// Return `RetryError::Exhausted` with the last error.
    Fail,
    /// Log and report `RetryOutcome::GaveUp`.
    GiveUp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    Done { value: T, attempts: u32 },
    GaveUp { attempts: u32 },
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("{label} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        label: &'static str,
        attempts: u32,
        last: E,
    },
}

/// Fixed-delay retry. `max_attempts == 0` retries forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub label: &'static str,
    pub max_attempts: u32,
    pub delay: Duration,
    pub on_exhausted: OnExhausted,
}

impl RetryPolicy {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            max_attempts: 0,
            delay: Duration::ZERO,
            on_exhausted: OnExhausted::Fail,
        }
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn on_exhausted(mut self, on_exhausted: OnExhausted) -> Self {
        self.on_exhausted = on_exhausted;
        self
    }

    /// Calls `op` with the 1-based attempt number until it succeeds or the
    /// attempt budget runs out. Sleeps `delay` between attempts only.
    pub fn run<T, E, C, F>(&self, clock: &C, mut op: F) -> Result<RetryOutcome<T>, RetryError<E>>
    where
        E: Display,
        C: Clock,
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let err = match op(attempt) {
                Ok(value) => {
                    return Ok(RetryOutcome::Done {
                        value,
                        attempts: attempt,
                    })
                }
                Err(err) => err,
            };

            if self.max_attempts == 0 {
                warn!("{}: attempt {attempt} failed: {err}", self.label);
            } else {
                warn!(
                    "{}: attempt {attempt}/{} failed: {err}",
                    self.label, self.max_attempts
                );
            }

            if self.max_attempts > 0 && attempt >= self.max_attempts {
                return match self.on_exhausted {
                    OnExhausted::Fail => Err(RetryError::Exhausted {
                        label: self.label,
                        attempts: attempt,
                        last: err,
                    }),
                    OnExhausted::GiveUp => {
                        warn!("{}: giving up after {attempt} attempt(s)", self.label);
                        Ok(RetryOutcome::GaveUp { attempts: attempt })
                    }
                };
            }

            clock.sleep(self.delay);
        }
    }
}
