//! Retry/Backoff Controller
//!
//! Decides what happens after a send fails. The attempt budget and backoff
//! are fixed:
//!
//! - [`MAX_ATTEMPTS`] automatic or manual retries per user-initiated send
//! - [`BACKOFF`] between a failure and its automatic retry
//!
//! # Lifecycle
//!
//! ```text
//!   user send ──▶ reset_for_new_send()      attempt = 0
//!   failure   ──▶ on_failure(kind, text)
//!                   ├─ not auto-retryable ──▶ NotRetryable   (text kept)
//!                   ├─ attempt == MAX     ──▶ Exhausted      (text kept)
//!                   └─ otherwise          ──▶ Scheduled      attempt += 1
//!                                              arm(timer)
//!   timer / online ──▶ take_pending(..)     fires at most once
//!   success   ──▶ on_success()              state cleared
//! ```
//!
//! The controller owns one `RetryController`; nothing else mutates
//! [`RetryState`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::scheduler::ScheduledTask;

/// Attempt budget per user-initiated send
pub const MAX_ATTEMPTS: u32 = 3;

/// Delay before an automatic retry
pub const BACKOFF: Duration = Duration::from_millis(3_000);

/// Snapshot of retry bookkeeping
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryState {
    /// Text of the most recent failed send
    pub last_failed_text: Option<String>,
    /// Retries consumed since the last user-initiated send
    pub attempt_count: u32,
    /// Kind of the most recent failure
    pub last_kind: Option<ErrorKind>,
}

impl RetryState {
    /// Fixed attempt budget
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        MAX_ATTEMPTS
    }

    /// Fixed backoff in milliseconds
    #[must_use]
    pub const fn backoff_ms(&self) -> u64 {
        BACKOFF.as_millis() as u64
    }

    /// Whether any attempts remain
    #[must_use]
    pub fn has_budget(&self) -> bool {
        self.attempt_count < MAX_ATTEMPTS
    }
}

/// Outcome of a failed send
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// An automatic retry should be armed
    Scheduled {
        /// Attempt number the retry will carry
        attempt: u32,
        /// Delay before it fires
        delay: Duration,
    },
    /// The kind is retryable but the budget is spent
    Exhausted,
    /// The kind is never retried automatically
    NotRetryable(ErrorKind),
}

/// Why a manual retry was refused
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryRefusal {
    /// No failed text is retained
    NothingToRetry,
    /// The last failure's kind cannot be retried by hand
    NotAllowed(ErrorKind),
    /// The attempt budget is spent
    BudgetExhausted,
}

impl std::fmt::Display for RetryRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NothingToRetry => write!(f, "nothing to retry"),
            Self::NotAllowed(ErrorKind::RateLimit) => write!(f, "rate limited; wait before retrying"),
            Self::NotAllowed(kind) => write!(f, "{kind} failures must be sent again"),
            Self::BudgetExhausted => write!(f, "retry limit of {MAX_ATTEMPTS} reached"),
        }
    }
}

/// Outcome of a manual retry request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManualRetry {
    /// Resend `text` as attempt `attempt`
    Allowed {
        /// Text to resend
        text: String,
        /// Attempt number
        attempt: u32,
    },
    /// Retry refused
    Refused(RetryRefusal),
}

/// A retry whose trigger fired
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FiredRetry {
    /// Text to resend
    pub text: String,
    /// Attempt number
    pub attempt: u32,
}

#[derive(Debug)]
struct PendingRetry {
    generation: u64,
    text: String,
    attempt: u32,
    // Held for its Drop; cancelling the pending retry cancels the timer.
    _timer: ScheduledTask,
}

/// Retry bookkeeping plus the armed retry, if any
#[derive(Debug, Default)]
pub struct RetryController {
    state: RetryState,
    pending: Option<PendingRetry>,
    generation: u64,
}

impl RetryController {
    /// Create a controller with an empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> &RetryState {
        &self.state
    }

    /// Whether an automatic retry is armed
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Forget everything; called for every user-initiated send
    pub fn reset_for_new_send(&mut self) {
        if self.cancel_pending() {
            tracing::debug!("Pending retry cancelled by new send");
        }
        self.state = RetryState::default();
    }

    /// Record a failure and decide whether to retry automatically
    pub fn on_failure(&mut self, kind: ErrorKind, text: &str) -> RetryDecision {
        self.cancel_pending();
        self.state.last_failed_text = Some(text.to_string());
        self.state.last_kind = Some(kind);

        if !kind.is_auto_retryable() {
            return RetryDecision::NotRetryable(kind);
        }
        if !self.state.has_budget() {
            tracing::warn!(
                attempts = self.state.attempt_count,
                "Retry budget exhausted"
            );
            return RetryDecision::Exhausted;
        }
        self.state.attempt_count += 1;
        RetryDecision::Scheduled {
            attempt: self.state.attempt_count,
            delay: BACKOFF,
        }
    }

    /// Arm the retry decided by the last `on_failure`
    ///
    /// `schedule` receives the generation to echo back through
    /// [`take_pending`](Self::take_pending) and returns the timer task.
    /// Returns `false` when there is no failed text to retry.
    pub fn arm<F>(&mut self, schedule: F) -> bool
    where
        F: FnOnce(u64) -> ScheduledTask,
    {
        let Some(text) = self.state.last_failed_text.clone() else {
            return false;
        };
        self.generation += 1;
        let generation = self.generation;
        self.pending = Some(PendingRetry {
            generation,
            text,
            attempt: self.state.attempt_count,
            _timer: schedule(generation),
        });
        true
    }

    /// Take the armed retry
    ///
    /// With `Some(generation)` (timer expiry) the retry is taken only if it
    /// is the one that timer was armed for; with `None` (online transition)
    /// any armed retry is taken. Either way the retry fires at most once.
    pub fn take_pending(&mut self, generation: Option<u64>) -> Option<FiredRetry> {
        match (&self.pending, generation) {
            (Some(pending), Some(expected)) if pending.generation != expected => return None,
            (None, _) => return None,
            _ => {}
        }
        self.pending.take().map(|p| FiredRetry {
            text: p.text,
            attempt: p.attempt,
        })
    }

    /// Drop the armed retry and its timer; returns whether one existed
    pub fn cancel_pending(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Validate a manual retry and consume one attempt
    pub fn begin_manual(&mut self) -> ManualRetry {
        let Some(text) = self.state.last_failed_text.clone() else {
            return ManualRetry::Refused(RetryRefusal::NothingToRetry);
        };
        if let Some(kind) = self.state.last_kind.filter(|k| !k.allows_manual_retry()) {
            return ManualRetry::Refused(RetryRefusal::NotAllowed(kind));
        }
        if !self.state.has_budget() {
            return ManualRetry::Refused(RetryRefusal::BudgetExhausted);
        }
        self.cancel_pending();
        self.state.attempt_count += 1;
        ManualRetry::Allowed {
            text,
            attempt: self.state.attempt_count,
        }
    }

    /// Clear state after a successful completion
    pub fn on_success(&mut self) {
        self.cancel_pending();
        self.state = RetryState::default();
    }
}
