//! Task Scheduler
//!
//! Every piece of background work in the crate (stream pumps, the telemetry
//! sampler, retry backoff, health polling, simulated producers) runs as a
//! [`ScheduledTask`]. A task is owned by exactly one value; dropping that value
//! cancels the task. Nothing is spawned fire-and-forget.
//!
//! ```text
//!   owner ──holds──▶ ScheduledTask { token, handle }
//!                         │
//!          drop / cancel  ▼
//!                    token.cancel() ──▶ select! in task exits
//!                    handle.abort()  ──▶ task future dropped
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Shortest period a repeating timer runs at
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// `period`, raised to [`MIN_PERIOD`] when zero
#[must_use]
pub fn clamp_period(period: Duration) -> Duration {
    period.max(MIN_PERIOD)
}

/// Owned handle to a cancellable background task
#[derive(Debug)]
pub struct ScheduledTask {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Spawn `task`, racing it against the task's cancellation token
    ///
    /// The closure receives a clone of the token so long-running bodies can
    /// check it between steps.
    pub fn spawn<F, Fut>(name: &'static str, task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        let body = task(token.clone());
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = child.cancelled() => {
                    tracing::trace!(task = name, "Scheduled task cancelled");
                }
                () = body => {}
            }
        });
        tracing::trace!(task = name, "Scheduled task spawned");
        Self {
            name,
            token,
            handle,
        }
    }

    /// Run `fire` once after `delay` unless cancelled first
    pub fn after<F>(name: &'static str, delay: Duration, fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::spawn(name, move |_| async move {
            tokio::time::sleep(delay).await;
            fire();
        })
    }

    /// Run `tick` every `period`, starting one period from now, until it
    /// returns `false` or the task is cancelled
    ///
    /// A zero `period` runs at [`MIN_PERIOD`].
    pub fn every<F>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let period = clamp_period(period);
        Self::spawn(name, move |_| async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !tick() {
                    break;
                }
            }
        })
    }

    /// Task name used in logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Clone of the task's cancellation token
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request cancellation without giving up the handle
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the task body has finished
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}
