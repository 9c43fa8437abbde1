//! Controller Messages
//!
//! Messages sent from the session controller to whatever presentation surface
//! is attached (terminal console, GUI, test harness). The surface renders what
//! it is told; it never mutates the timeline or provider records itself.
//!
//! This module also holds the identifiers and the committed [`Message`] type,
//! since both travel inside [`ControllerEvent`]s.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::routing::health::ProviderRecord;
use crate::session::SessionStatus;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique message identifier
///
/// Allocated from a process-wide counter, so ids increase strictly in creation
/// order across every controller in the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Allocate the next message ID
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "msg_{}", self.0)
    }
}

/// Session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID
    pub fn new() -> Self {
        Self(format!("session_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one opened stream within a controller
///
/// Events tagged with anything other than the active stream id are stale and
/// get dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub u64);

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream_{}", self.0)
    }
}

// ============================================================================
// Timeline Messages
// ============================================================================

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// Typed or dictated by the user
    User,
    /// Generated by a provider
    Assistant,
}

/// Performance measurements for one stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    /// Time since the stream opened
    pub render_time_ms: u64,
    /// Time from stream open to the first delta
    pub stream_latency_ms: u64,
    /// Most recent instantaneous throughput
    pub tokens_per_second: f64,
    /// Whitespace-delimited tokens received so far
    pub total_tokens: u64,
    /// Deltas received so far
    pub delta_count: u64,
}

/// A committed timeline entry
///
/// Immutable once committed: the fields are public for reading, and the
/// timeline only hands out shared references.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Monotonic ID
    pub id: MessageId,
    /// Author
    pub sender: Sender,
    /// Text content
    pub content: String,
    /// Commit time
    pub timestamp: DateTime<Utc>,
    /// Provider that produced (assistant) or received (user) the message
    pub provider: Option<String>,
    /// Model used by that provider
    pub model: Option<String>,
    /// Telemetry frozen at completion (assistant messages only)
    pub performance: Option<PerformanceSample>,
    /// Automatic or manual retry number this user message was sent as
    pub retry_count: u32,
}

impl Message {
    /// Build a user message
    pub fn user(content: impl Into<String>, retry_count: u32) -> Self {
        Self {
            id: MessageId::next(),
            sender: Sender::User,
            content: content.into(),
            timestamp: Utc::now(),
            provider: None,
            model: None,
            performance: None,
            retry_count,
        }
    }

    /// Build an assistant message
    pub fn assistant(
        content: impl Into<String>,
        provider: Option<String>,
        model: Option<String>,
        performance: PerformanceSample,
    ) -> Self {
        Self {
            id: MessageId::next(),
            sender: Sender::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            provider,
            model,
            performance: Some(performance),
            retry_count: 0,
        }
    }

    /// Attach the provider the message was sent to
    #[must_use]
    pub fn with_provider(mut self, provider: Option<String>, model: Option<String>) -> Self {
        self.provider = provider;
        self.model = model;
        self
    }
}

// ============================================================================
// Outbound Events
// ============================================================================

/// Notification severity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// Warning
    Warning,
    /// Error
    Error,
    /// Success
    Success,
}

/// Why a send request did not start a stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Draft was empty or whitespace only
    EmptyDraft,
    /// Another exchange is in progress
    Busy,
    /// Connectivity is offline
    Offline,
    /// No provider is selected or the selected one is unavailable
    NoProvider,
    /// Manual retry with nothing to retry
    NothingToRetry,
    /// Manual retry refused (budget spent or rate limited)
    RetryRefused,
}

/// Messages from the controller to the presentation surface
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ControllerEvent {
    /// Session status changed
    StatusChanged {
        /// New status
        status: SessionStatus,
    },

    /// A message was appended to the timeline
    MessageCommitted {
        /// The committed message
        message: Message,
    },

    /// A stream opened for the given provider
    StreamStarted {
        /// Stream identifier
        stream_id: StreamId,
        /// Provider selected for this stream
        provider: Option<String>,
    },

    /// A delta was applied to the pending buffer
    Delta {
        /// Stream identifier
        stream_id: StreamId,
        /// The delta text
        text: String,
    },

    /// Periodic telemetry sample
    Telemetry {
        /// Stream identifier
        stream_id: StreamId,
        /// The sample
        sample: PerformanceSample,
    },

    /// User-facing notification
    Notify {
        /// Severity
        level: NotifyLevel,
        /// Error kind, when the notification reports a failure
        kind: Option<ErrorKind>,
        /// Text to show
        message: String,
    },

    /// An automatic retry is armed
    RetryScheduled {
        /// Attempt number the retry will be sent as
        attempt: u32,
        /// Attempt budget
        max_attempts: u32,
        /// Delay before the retry fires (unless connectivity returns first)
        delay_ms: u64,
    },

    /// Connectivity flag changed
    ConnectivityChanged {
        /// Whether sends are allowed
        online: bool,
    },

    /// Current provider changed
    ProviderChanged {
        /// New current provider id
        provider_id: String,
    },

    /// A provider record was updated by a health report
    ProviderUpdated {
        /// Updated record
        record: ProviderRecord,
    },

    /// Draft text or voice preview changed
    DraftChanged {
        /// Committed draft text
        text: String,
        /// Interim voice preview (while recording)
        preview: Option<String>,
    },

    /// Voice capture started or stopped
    VoiceStateChanged {
        /// Whether recording is active
        recording: bool,
    },
}

impl ControllerEvent {
    /// Shorthand for a notification
    pub fn notify(level: NotifyLevel, kind: Option<ErrorKind>, message: impl Into<String>) -> Self {
        Self::Notify {
            level,
            kind,
            message: message.into(),
        }
    }
}
