//! Health Feed Poller
//!
//! Periodically polls a [`HealthSource`] and forwards each report to the
//! controller inbox. The controller applies reports to the registry; the
//! poller never touches it.

use std::sync::Arc;
use std::time::Duration;

use crate::events::ControllerHandle;
use crate::scheduler::{clamp_period, ScheduledTask};
use crate::transport::HealthSource;

/// Owned polling task; dropping it stops the poll
#[derive(Debug)]
pub struct HealthPoller {
    task: ScheduledTask,
    interval: Duration,
}

impl HealthPoller {
    /// Poll `source` immediately and then every `interval`
    ///
    /// A zero interval is raised to the scheduler's minimum period.
    pub fn start(source: Arc<dyn HealthSource>, handle: ControllerHandle, interval: Duration) -> Self {
        let interval = clamp_period(interval);
        let task = ScheduledTask::spawn("health-poller", move |_| async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let reports = source.poll_health().await;
                tracing::trace!(count = reports.len(), "Polled health feed");
                for report in reports {
                    if !handle.health(report) {
                        return;
                    }
                }
            }
        });
        Self { task, interval }
    }

    /// Poll interval
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop polling
    pub fn stop(&self) {
        self.task.cancel();
    }
}
