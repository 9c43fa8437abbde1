//! Session State Machine
//!
//! One [`StreamingSession`] exists per controller. It is a single slot: at
//! most one exchange is in flight, and the only way to move between states is
//! [`StreamingSession::apply`] with a [`Transition`].
//!
//! ```text
//!          Begin            Opened             Complete
//!  Idle ─────────▶ Sending ────────▶ Streaming ─────────▶ Completed ──┐
//!   ▲                 │                  │                             │
//!   │                 │ Fail             │ Fail / Abort                │
//!   │                 ▼                  ▼                             │
//!   │               Failed ◀─────────────┘                             │
//!   │                 │                                                │
//!   └──── Settle ─────┴────────────────────────────────────────────────┘
//! ```
//!
//! The pending buffer and the cancellation token live inside the `Streaming`
//! variant, so neither can outlive that state.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::messages::{Message, SessionId, Sender, StreamId};
use crate::transport::StreamHandle;

/// Coarse session status exposed to callers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Ready for a new send
    Idle,
    /// Waiting for the transport to open a stream
    Sending,
    /// Receiving deltas
    Streaming,
    /// Reply committed; about to settle back to idle
    Completed,
    /// Exchange failed or was aborted; about to settle back to idle
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The in-flight half of an exchange
#[derive(Debug)]
pub struct ActiveStream {
    stream_id: StreamId,
    handle: StreamHandle,
    cancel: CancellationToken,
    buffer: String,
    provider: Option<String>,
    model: Option<String>,
}

impl ActiveStream {
    /// Wrap a freshly opened stream
    pub fn new(
        stream_id: StreamId,
        handle: StreamHandle,
        cancel: CancellationToken,
        provider: Option<String>,
        model: Option<String>,
    ) -> Self {
        Self {
            stream_id,
            handle,
            cancel,
            buffer: String::new(),
            provider,
            model,
        }
    }
}

/// What remains of a stream after it leaves the `Streaming` state
#[derive(Debug)]
pub struct ClosedStream {
    /// Stream identifier
    pub stream_id: StreamId,
    /// Transport handle, needed to tear down the underlying connection
    pub handle: StreamHandle,
    /// Accumulated text at the moment of closing
    pub buffer: String,
    /// Provider selected when the stream opened
    pub provider: Option<String>,
    /// Model selected when the stream opened
    pub model: Option<String>,
}

/// Triggers accepted by the state machine
#[derive(Debug)]
pub enum Transition {
    /// A send request passed its guards
    Begin {
        /// Text being sent
        text: String,
    },
    /// The transport acknowledged the stream
    Opened(ActiveStream),
    /// The transport signalled completion
    Complete,
    /// The transport failed (before or after opening)
    Fail,
    /// The user cancelled the stream
    Abort,
    /// Return to idle after a terminal state
    Settle,
}

impl Transition {
    fn name(&self) -> &'static str {
        match self {
            Self::Begin { .. } => "begin",
            Self::Opened(_) => "opened",
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Abort => "abort",
            Self::Settle => "settle",
        }
    }
}

/// An illegal transition was requested
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("cannot apply '{trigger}' while {from}")]
pub struct TransitionError {
    /// Status at the time of the request
    pub from: SessionStatus,
    /// Name of the rejected trigger
    pub trigger: &'static str,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Sending { text: String },
    Streaming(ActiveStream),
    Completed,
    Failed,
}

impl Phase {
    fn status(&self) -> SessionStatus {
        match self {
            Self::Idle => SessionStatus::Idle,
            Self::Sending { .. } => SessionStatus::Sending,
            Self::Streaming(_) => SessionStatus::Streaming,
            Self::Completed => SessionStatus::Completed,
            Self::Failed => SessionStatus::Failed,
        }
    }
}

/// Single-slot streaming state for one conversation
#[derive(Debug)]
pub struct StreamingSession {
    id: SessionId,
    phase: Phase,
}

impl Default for StreamingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingSession {
    /// Create an idle session
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            phase: Phase::Idle,
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.phase.status()
    }

    /// Whether a new send may start
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    /// Text being sent, while in `Sending`
    #[must_use]
    pub fn sending_text(&self) -> Option<&str> {
        match &self.phase {
            Phase::Sending { text } => Some(text),
            _ => None,
        }
    }

    /// Accumulated reply text; empty unless streaming
    #[must_use]
    pub fn pending_text(&self) -> &str {
        match &self.phase {
            Phase::Streaming(stream) => &stream.buffer,
            _ => "",
        }
    }

    /// Active stream id, while streaming
    #[must_use]
    pub fn active_stream(&self) -> Option<StreamId> {
        match &self.phase {
            Phase::Streaming(stream) => Some(stream.stream_id),
            _ => None,
        }
    }

    /// Whether events tagged with `stream_id` should be applied
    #[must_use]
    pub fn accepts(&self, stream_id: StreamId) -> bool {
        self.active_stream() == Some(stream_id)
    }

    /// Append a delta to the pending buffer
    ///
    /// Returns `false` (and changes nothing) when `stream_id` is not the
    /// active stream.
    pub fn append(&mut self, stream_id: StreamId, text: &str) -> bool {
        match &mut self.phase {
            Phase::Streaming(stream) if stream.stream_id == stream_id => {
                stream.buffer.push_str(text);
                true
            }
            _ => false,
        }
    }

    /// Apply a transition
    ///
    /// Leaving `Streaming` cancels the stream's token and hands back what the
    /// stream held; the buffer is gone from the session afterwards.
    pub fn apply(&mut self, transition: Transition) -> Result<Option<ClosedStream>, TransitionError> {
        let from = self.status();
        let trigger = transition.name();
        let current = std::mem::replace(&mut self.phase, Phase::Idle);

        let (next, closed) = match (current, transition) {
            (Phase::Idle, Transition::Begin { text }) => (Phase::Sending { text }, None),
            (Phase::Sending { .. }, Transition::Opened(stream)) => (Phase::Streaming(stream), None),
            (Phase::Sending { .. }, Transition::Fail) => (Phase::Failed, None),
            (Phase::Streaming(stream), Transition::Complete) => {
                (Phase::Completed, Some(close(stream)))
            }
            (Phase::Streaming(stream), Transition::Fail | Transition::Abort) => {
                (Phase::Failed, Some(close(stream)))
            }
            (Phase::Completed | Phase::Failed, Transition::Settle) => (Phase::Idle, None),
            (phase, _) => {
                self.phase = phase;
                return Err(TransitionError { from, trigger });
            }
        };

        tracing::debug!(
            session = %self.id,
            from = %from,
            to = %next.status(),
            trigger,
            "Session transition"
        );
        self.phase = next;
        Ok(closed)
    }
}

fn close(stream: ActiveStream) -> ClosedStream {
    stream.cancel.cancel();
    ClosedStream {
        stream_id: stream.stream_id,
        handle: stream.handle,
        buffer: stream.buffer,
        provider: stream.provider,
        model: stream.model,
    }
}

// ============================================================================
// Timeline
// ============================================================================

/// Ordered list of committed messages
#[derive(Clone, Debug, Default)]
pub struct Timeline {
    messages: Vec<Message>,
    /// Maximum number of messages to keep (0 = unlimited)
    max_messages: usize,
}

impl Timeline {
    /// Create an unbounded timeline
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a timeline that keeps at most `max_messages` entries
    #[must_use]
    pub fn with_limit(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages,
        }
    }

    /// Append a committed message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.prune_if_needed();
    }

    /// All retained messages, oldest first
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of retained messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the timeline is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent message
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Messages from one sender
    pub fn by_sender(&self, sender: Sender) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.sender == sender)
    }

    fn prune_if_needed(&mut self) {
        if self.max_messages == 0 || self.messages.len() <= self.max_messages {
            return;
        }
        let excess = self.messages.len() - self.max_messages;
        self.messages.drain(..excess);
        tracing::debug!(
            removed = excess,
            remaining = self.messages.len(),
            "Pruned timeline messages"
        );
    }
}
