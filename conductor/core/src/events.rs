//! Controller Inputs
//!
//! Everything that reaches the session controller arrives as a
//! [`ControllerInput`] on its inbox: commands from the surface, tagged stream
//! events, connectivity and voice signals, health reports, and timer expiries.
//! Producers hold a cloneable [`ControllerHandle`].
//!
//! ```text
//!   surface ─┐
//!   pumps   ─┤
//!   timers  ─┼──▶ ControllerHandle ──▶ inbox ──▶ SessionController::step()
//!   voice   ─┤
//!   health  ─┘
//! ```

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::connectivity::ConnectivitySignal;
use crate::messages::StreamId;
use crate::routing::HealthReport;
use crate::transport::TransportEvent;
use crate::voice::VoiceEvent;

/// Commands issued by a presentation surface
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Send the current draft
    SendDraft,
    /// Send explicit text
    Send(String),
    /// Abort the in-flight stream
    Abort,
    /// Manually retry the last failed text
    Retry,
    /// Replace the draft text (manual edit)
    SetDraft(String),
    /// Select a provider for the next send
    SwitchProvider(String),
    /// Start voice capture
    StartVoice,
    /// Stop voice capture
    StopVoice,
}

/// What a stream pump observed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamSignal {
    /// An event from the transport
    Event(TransportEvent),
    /// The channel closed
    Closed,
}

/// Inbound events consumed by the controller loop
#[derive(Clone, Debug)]
pub enum ControllerInput {
    /// Surface command
    Command(Command),
    /// Stream event tagged with its stream id and arrival time
    Stream {
        /// Stream the event belongs to
        stream_id: StreamId,
        /// The event
        signal: StreamSignal,
        /// When the pump received it
        received_at: Instant,
    },
    /// Environment connectivity change
    Connectivity(ConnectivitySignal),
    /// Voice capability event
    Voice(VoiceEvent),
    /// Health feed report
    Health(HealthReport),
    /// Backoff timer expired
    RetryTimer {
        /// Generation the timer was armed for
        generation: u64,
    },
    /// Telemetry sampling tick
    SampleTick {
        /// Stream the sampler belongs to
        stream_id: StreamId,
    },
    /// Stop the loop
    Shutdown,
}

/// Cloneable sender for the controller inbox
#[derive(Clone, Debug)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<ControllerInput>,
}

impl ControllerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ControllerInput>) -> Self {
        Self { tx }
    }

    /// Deliver an input; returns `false` when the controller is gone
    pub fn send(&self, input: ControllerInput) -> bool {
        if self.tx.send(input).is_err() {
            tracing::debug!("Controller inbox closed; input dropped");
            return false;
        }
        true
    }

    /// Deliver a surface command
    pub fn command(&self, command: Command) -> bool {
        self.send(ControllerInput::Command(command))
    }

    /// Send explicit text
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.command(Command::Send(text.into()))
    }

    /// Abort the in-flight stream
    pub fn abort(&self) -> bool {
        self.command(Command::Abort)
    }

    /// Manually retry
    pub fn retry(&self) -> bool {
        self.command(Command::Retry)
    }

    /// Report a connectivity change
    pub fn connectivity(&self, signal: ConnectivitySignal) -> bool {
        self.send(ControllerInput::Connectivity(signal))
    }

    /// Report a voice event
    pub fn voice(&self, event: VoiceEvent) -> bool {
        self.send(ControllerInput::Voice(event))
    }

    /// Report provider health
    pub fn health(&self, report: HealthReport) -> bool {
        self.send(ControllerInput::Health(report))
    }

    /// Ask the loop to stop
    pub fn shutdown(&self) -> bool {
        self.send(ControllerInput::Shutdown)
    }

    /// Whether the controller dropped its inbox
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
