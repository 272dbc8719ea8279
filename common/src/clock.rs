use std::time::Duration;

/// Time source and blocking wait used by every component that sleeps.
pub trait Clock {
    fn sleep(&self, duration: Duration);

    /// Seconds since the Unix epoch.
    fn now_unix(&self) -> i64;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }

    fn now_unix(&self) -> i64 {
        (**self).now_unix()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}
