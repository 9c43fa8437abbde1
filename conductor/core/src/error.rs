//! Error Classification
//!
//! Every failure that can reach the session controller is reduced to an
//! [`ErrorKind`]. The kind alone decides retry eligibility, whether
//! connectivity is forced offline, and what the user is told. Nothing in this
//! module propagates past the controller: the controller converts each error
//! into a notification plus a retry-state update.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse class of a send or capability failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Connection dropped, timed out, or could not be established
    Network,
    /// Provider refused the request because of a rate limit
    RateLimit,
    /// Provider-side failure (bad model, upstream 5xx, refused switch)
    Provider,
    /// A required client capability (speech recognition) is missing
    UnsupportedCapability,
    /// Anything the classifier could not place
    Unknown,
}

impl ErrorKind {
    /// Whether a failure of this kind is retried without user action
    #[must_use]
    pub fn is_auto_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Unknown)
    }

    /// Whether a failure of this kind drops connectivity until the next
    /// online signal
    #[must_use]
    pub fn forces_offline(self) -> bool {
        matches!(self, Self::Network)
    }

    /// Whether the user may retry the failed text by hand
    #[must_use]
    pub fn allows_manual_retry(self) -> bool {
        matches!(self, Self::Network | Self::Provider | Self::Unknown)
    }

    /// Short user-facing explanation
    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Network => "Connection lost. Check your network.",
            Self::RateLimit => "Rate limit reached. Please wait before sending again.",
            Self::Provider => "The provider failed to answer. Try switching providers.",
            Self::UnsupportedCapability => "Speech recognition is not supported here.",
            Self::Unknown => "Something went wrong while sending your message.",
        }
    }

    /// Classify a free-form error message from an adapter that does not
    /// report a kind of its own.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        const RATE_LIMIT: &[&str] = &["rate limit", "rate-limit", "too many requests", "429"];
        const NETWORK: &[&str] = &[
            "network",
            "connection",
            "timed out",
            "timeout",
            "unreachable",
            "failed to fetch",
            "offline",
            "disconnected",
        ];
        const PROVIDER: &[&str] = &["provider", "model not found", "upstream", "503", "502"];

        if RATE_LIMIT.iter().any(|m| lower.contains(m)) {
            Self::RateLimit
        } else if NETWORK.iter().any(|m| lower.contains(m)) {
            Self::Network
        } else if PROVIDER.iter().any(|m| lower.contains(m)) {
            Self::Provider
        } else if lower.contains("speech") && lower.contains("not supported") {
            Self::UnsupportedCapability
        } else {
            Self::Unknown
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::RateLimit => write!(f, "rate-limit"),
            Self::Provider => write!(f, "provider"),
            Self::UnsupportedCapability => write!(f, "unsupported-capability"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Failure reported by a transport adapter
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    /// Classified kind
    pub kind: ErrorKind,
    /// Adapter-supplied detail
    pub message: String,
}

impl TransportError {
    /// Create an error with an explicit kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create an error whose kind is inferred from the message text
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ErrorKind::classify(&message),
            message,
        }
    }
}

/// Why a provider switch was refused
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderSwitchError {
    /// No record exists for the requested id
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider exists but is not currently available
    #[error("provider {0} is not available")]
    Unavailable(String),

    /// The transport refused the switch
    #[error("transport rejected switch to {id}: {reason}")]
    Rejected {
        /// Requested provider id
        id: String,
        /// Transport-supplied reason
        reason: String,
    },
}

/// Voice bridge failures
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VoiceError {
    /// The environment exposes no speech-recognition capability
    #[error("speech recognition is not supported in this environment")]
    Unsupported,

    /// The capability reported an error code
    #[error("speech recognition error: {0}")]
    Recognition(String),
}

impl VoiceError {
    /// Error kind used for notifications
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unsupported => ErrorKind::UnsupportedCapability,
            Self::Recognition(_) => ErrorKind::Unknown,
        }
    }
}
