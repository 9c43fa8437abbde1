//! Performance Telemetry Collector
//!
//! Rolling measurement anchored at stream-open time:
//!
//! - `stream_latency_ms`: open to first delta (time to first token)
//! - `render_time_ms`: open to the latest delta or sample tick
//! - `tokens_per_second`: whitespace tokens in a delta divided by the time
//!   since the previous delta (or since open, for the first one)
//!
//! A computation that cannot produce a finite value (zero elapsed time) keeps
//! the previous value. Recent samples are kept in a bounded window whose mean
//! throughput feeds provider decisions.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::messages::PerformanceSample;

/// Default interval between samples while streaming
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of samples kept in the window
pub const DEFAULT_WINDOW: usize = 32;

/// Derives [`PerformanceSample`]s from delta arrival times
#[derive(Debug)]
pub struct TelemetryCollector {
    window_size: usize,
    opened_at: Option<Instant>,
    last_delta_at: Option<Instant>,
    current: PerformanceSample,
    window: VecDeque<PerformanceSample>,
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl TelemetryCollector {
    /// Create a collector keeping `window_size` recent samples
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            opened_at: None,
            last_delta_at: None,
            current: PerformanceSample::default(),
            window: VecDeque::with_capacity(window_size),
        }
    }

    /// Anchor a new measurement at `opened_at`
    pub fn start(&mut self, opened_at: Instant) {
        self.opened_at = Some(opened_at);
        self.last_delta_at = None;
        self.current = PerformanceSample::default();
    }

    /// Whether a stream is being measured
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.opened_at.is_some()
    }

    /// Latest sample
    #[must_use]
    pub fn current(&self) -> PerformanceSample {
        self.current
    }

    /// Record a delta that arrived at `at`
    ///
    /// Must be called before the delta is applied to the pending buffer.
    pub fn observe(&mut self, text: &str, at: Instant) -> PerformanceSample {
        let Some(opened_at) = self.opened_at else {
            return self.current;
        };

        let tokens = text.split_whitespace().count() as u64;
        let previous = self.last_delta_at.unwrap_or(opened_at);
        let elapsed = at.saturating_duration_since(previous).as_secs_f64();

        if self.current.delta_count == 0 {
            self.current.stream_latency_ms = millis_between(opened_at, at);
        }
        self.current.delta_count += 1;
        self.current.total_tokens += tokens;
        self.current.render_time_ms = millis_between(opened_at, at);

        let rate = tokens as f64 / elapsed;
        if elapsed > 0.0 && rate.is_finite() {
            self.current.tokens_per_second = rate;
        } else {
            tracing::trace!(tokens, "Zero elapsed time; holding tokens/sec");
        }

        self.last_delta_at = Some(at);
        self.record(self.current);
        self.current
    }

    /// Periodic sample: refresh render time
    pub fn tick(&mut self, now: Instant) -> Option<PerformanceSample> {
        let opened_at = self.opened_at?;
        self.current.render_time_ms = millis_between(opened_at, now);
        self.record(self.current);
        Some(self.current)
    }

    /// Freeze the final sample and stop measuring
    pub fn finish(&mut self, now: Instant) -> PerformanceSample {
        let sample = self.tick(now).unwrap_or(self.current);
        self.opened_at = None;
        self.last_delta_at = None;
        sample
    }

    /// Stop measuring without producing a snapshot
    pub fn cancel(&mut self) {
        self.opened_at = None;
        self.last_delta_at = None;
    }

    /// Samples currently in the window, oldest first
    pub fn window(&self) -> impl Iterator<Item = &PerformanceSample> {
        self.window.iter()
    }

    /// Mean non-zero tokens/sec across the window
    #[must_use]
    pub fn mean_tokens_per_second(&self) -> Option<f64> {
        let rates: Vec<f64> = self
            .window
            .iter()
            .map(|s| s.tokens_per_second)
            .filter(|r| *r > 0.0)
            .collect();
        if rates.is_empty() {
            None
        } else {
            Some(rates.iter().sum::<f64>() / rates.len() as f64)
        }
    }

    fn record(&mut self, sample: PerformanceSample) {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(sample);
    }
}

fn millis_between(from: Instant, to: Instant) -> u64 {
    u64::try_from(to.saturating_duration_since(from).as_millis()).unwrap_or(u64::MAX)
}
