//! Transport Layer
//!
//! The [`TransportAdapter`] seam between the session controller and whatever
//! carries requests to a provider, plus [`SimulatedTransport`], an in-process
//! adapter that replays scripted replies.

pub mod simulated;
pub mod traits;

pub use simulated::{ScriptStep, ScriptedReply, SimulatedTransport};
pub use traits::{
    HealthSource, OpenedStream, StreamHandle, StreamRequest, TransportAdapter, TransportEvent,
};
