use std::time::Duration;

use log::info;

use crate::{clock::Clock, types::BootCause};

/// Awake time after power-on so a console can attach before the first deep sleep.
pub const COLD_BOOT_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    LightSleep(Duration),
    DeepSleep {
        grace: Option<Duration>,
        wake_after: Duration,
    },
}

impl PowerAction {
    pub fn plan(sleep_between_measurements: bool, update_period: Duration, cause: BootCause) -> Self {
        if !sleep_between_measurements {
            return Self::LightSleep(update_period);
        }

        Self::DeepSleep {
            grace: (cause == BootCause::ColdBoot).then_some(COLD_BOOT_GRACE),
            wake_after: update_period,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEnd {
    Continue,
    /// Deep sleep was entered; all in-memory state is gone and boot starts over.
    Restart,
}

pub trait PowerControl {
    fn boot_cause(&self) -> BootCause;

    /// Arms the wake timer and powers down. Does not return on hardware.
    fn deep_sleep(&mut self, wake_after: Duration);

    fn supply_voltage(&mut self) -> Option<f32> {
        None
    }
}

pub fn apply<P, C>(action: PowerAction, power: &mut P, clock: &C) -> CycleEnd
where
    P: PowerControl,
    C: Clock,
{
    match action {
        PowerAction::LightSleep(period) => {
            info!("sleeping {}s until the next measurement", period.as_secs());
            clock.sleep(period);
            CycleEnd::Continue
        }
        PowerAction::DeepSleep { grace, wake_after } => {
            if let Some(grace) = grace {
                info!("cold boot, staying awake {}s before deep sleep", grace.as_secs());
                clock.sleep(grace);
            }
            info!("entering deep sleep for {}s", wake_after.as_secs());
            power.deep_sleep(wake_after);
            CycleEnd::Restart
        }
    }
}
