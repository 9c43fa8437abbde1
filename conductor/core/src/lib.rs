//! Stream Conductor - Client-Side Streaming Session Controller
//!
//! This crate manages one conversational session with pluggable LLM
//! providers: it sends user text, consumes a token-by-token reply stream,
//! commits finished replies to a timeline, recovers from failures with bounded
//! automatic retries, tracks provider health, measures streaming performance,
//! and folds speech-recognition results into the composer draft.
//!
//! It owns no network protocol and no UI. Transports, health feeds, and voice
//! capabilities plug in through traits; surfaces consume [`ControllerEvent`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Presentation Surface                         │
//! │        Command (up)                    ControllerEvent (down)    │
//! └────────────┬─────────────────────────────────────▲───────────────┘
//!              │                                     │
//! ┌────────────▼─────────────────────────────────────┴───────────────┐
//! │                      SessionController                           │
//! │  ┌───────────┐ ┌──────────┐ ┌───────────┐ ┌──────────────────┐   │
//! │  │ Streaming │ │  Retry   │ │ Telemetry │ │ Connectivity     │   │
//! │  │ Session + │ │ Backoff  │ │ Collector │ │ Monitor          │   │
//! │  │ Timeline  │ │          │ │           │ │                  │   │
//! │  └───────────┘ └──────────┘ └───────────┘ └──────────────────┘   │
//! │  ┌───────────────────┐ ┌──────────────────────────────────────┐  │
//! │  │ Voice Bridge      │ │ Provider Registry (health, current)  │  │
//! │  └───────────────────┘ └──────────────────────────────────────┘  │
//! └────────────▲───────────────────────┬─────────────────────────────┘
//!              │ ControllerInput       │ open / abort / switch
//!   pumps, timers, voice, health       ▼
//!                            ┌────────────────────┐
//!                            │ TransportAdapter   │
//!                            └────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use stream_conductor::{
//!     ProviderRecord, ProviderRegistry, SessionConfig, SessionController, SimulatedTransport,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(ProviderRegistry::new());
//!     registry.seed([ProviderRecord::new("local", "Local")]);
//!
//!     let transport = Arc::new(SimulatedTransport::new());
//!     let (mut controller, mut events) =
//!         SessionController::new(transport, registry, SessionConfig::default());
//!
//!     controller.submit("Hello").await;
//!     controller.run_until_idle().await;
//!
//!     while let Ok(event) = events.try_recv() {
//!         // Render event
//!     }
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`controller`]: The session controller and its event loop
//! - [`session`]: Streaming state machine and message timeline
//! - [`retry`]: Bounded retry/backoff bookkeeping
//! - [`routing`]: Provider records, health reports, and polling
//! - [`streaming`]: Stream pumps and performance telemetry
//! - [`connectivity`]: Online/offline flag
//! - [`voice`]: Speech-recognition bridge and composer draft
//! - [`transport`]: Transport and health-source traits, simulated adapter
//! - [`scheduler`]: Owned, cancellable background tasks
//! - [`config`]: TOML, environment, and CLI configuration
//! - [`events`]: Controller inputs and the inbox handle
//! - [`messages`]: Timeline messages and outbound events
//! - [`error`]: Error kinds and error types

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod connectivity;
pub mod controller;
pub mod error;
pub mod events;
pub mod messages;
pub mod retry;
pub mod routing;
pub mod scheduler;
pub mod session;
pub mod streaming;
pub mod transport;
pub mod voice;

// Re-exports for convenience
pub use config::{
    load_config, load_config_from_path, ConductorConfigFile, ConfigError, ConfigOverrides,
    ConfigSource, SessionConfig,
};
pub use connectivity::{ConnectivityMonitor, ConnectivitySignal};
pub use controller::{SendOutcome, SessionController};
pub use error::{ErrorKind, ProviderSwitchError, TransportError, VoiceError};
pub use events::{Command, ControllerHandle, ControllerInput, StreamSignal};
pub use messages::{
    ControllerEvent, Message, MessageId, NotifyLevel, PerformanceSample, RejectReason, Sender,
    SessionId, StreamId,
};
pub use retry::{RetryState, BACKOFF, MAX_ATTEMPTS};
pub use routing::{
    HealthIndicator, HealthPoller, HealthReport, ProviderHealth, ProviderRecord, ProviderRegistry,
};
pub use scheduler::ScheduledTask;
pub use session::{SessionStatus, StreamingSession, Timeline};
pub use streaming::TelemetryCollector;
pub use transport::{
    HealthSource, OpenedStream, ScriptStep, ScriptedReply, SimulatedTransport, StreamHandle,
    StreamRequest, TransportAdapter, TransportEvent,
};
pub use voice::{Draft, SimulatedVoice, VoiceCapability, VoiceEvent, VoiceSink};
