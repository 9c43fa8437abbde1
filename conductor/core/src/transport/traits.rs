//! Transport Adapter Traits
//!
//! Trait definitions for the streaming transport a session controller drives.
//! The controller never talks to a provider directly: it asks an adapter to
//! open a stream, reads [`TransportEvent`]s from the returned channel, and
//! tells the adapter to tear a stream down on abort.
//!
//! # Design Philosophy
//!
//! The `TransportAdapter` trait provides a common interface for:
//! - Opening one streaming exchange per request
//! - Aborting an open stream without waiting for it
//! - Routing subsequent requests to another provider
//!
//! Implementations handle wire formats, authentication and reconnection.
//! Health is reported separately through [`HealthSource`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{ErrorKind, TransportError};
use crate::routing::HealthReport;

/// Events delivered on an open stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// Incremental reply text
    Delta(String),
    /// Stream finished successfully
    Complete {
        /// The complete reply (may differ from the concatenated deltas)
        full_text: String,
    },
    /// Stream failed
    Error {
        /// Classified kind
        kind: ErrorKind,
        /// Adapter-supplied detail
        message: String,
    },
}

impl TransportEvent {
    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta(_))
    }
}

/// Parameters for opening a stream
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamRequest {
    /// Text to send
    pub text: String,
    /// Provider selected for this stream
    pub provider: Option<String>,
    /// Model selected for this stream
    pub model: Option<String>,
}

impl StreamRequest {
    /// Create a request for `text`
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Route to a provider
    #[must_use]
    pub fn with_provider(mut self, provider: Option<String>, model: Option<String>) -> Self {
        self.provider = provider;
        self.model = model;
        self
    }
}

/// Adapter-assigned identifier of an open stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub u64);

impl std::fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handle_{}", self.0)
    }
}

/// An acknowledged stream
///
/// The channel closes after a terminal event, or early if the connection
/// drops.
#[derive(Debug)]
pub struct OpenedStream {
    /// Handle for `abort`
    pub handle: StreamHandle,
    /// Event channel
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Streaming transport trait
///
/// Implement this trait to connect the controller to a provider backend.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Adapter name for logs (e.g., "simulated", "http")
    fn name(&self) -> &str;

    /// Open a stream for `request`
    ///
    /// Resolves once the provider acknowledged the stream. Errors here mean
    /// nothing was opened.
    async fn open(&self, request: &StreamRequest) -> Result<OpenedStream, TransportError>;

    /// Tear down an open stream
    ///
    /// Must not block; network teardown may finish in the background.
    fn abort(&self, handle: &StreamHandle);

    /// Route subsequent opens to `provider_id`
    async fn switch_provider(&self, provider_id: &str) -> Result<(), TransportError>;
}

/// Provider health feed
#[async_trait]
pub trait HealthSource: Send + Sync {
    /// Current reports for every provider the source knows about
    async fn poll_health(&self) -> Vec<HealthReport>;
}
