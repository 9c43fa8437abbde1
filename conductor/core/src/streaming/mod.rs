//! Streaming Infrastructure
//!
//! How deltas travel from a transport into the session controller and what is
//! measured on the way.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐   TransportEvent    ┌────────────┐
//! │ TransportAdapter   │ ──────────────────▶ │ pump task  │
//! │ (OpenedStream.rx)  │                     └─────┬──────┘
//! └────────────────────┘                           │ ControllerInput::Stream
//!                                                  │ { stream_id, received_at }
//!                                                  ▼
//!                                         ┌──────────────────┐
//!                                         │ SessionController│
//!                                         │  1. telemetry    │ observe
//!                                         │  2. buffer       │ apply
//!                                         └──────────────────┘
//! ```
//!
//! # Features
//!
//! - **Arrival-time telemetry**: the pump stamps each event when it arrives
//! - **Stale filtering**: events carry a [`StreamId`](crate::messages::StreamId)
//! - **Owned tasks**: pumps are [`ScheduledTask`](crate::scheduler::ScheduledTask)s

pub mod pump;
pub mod telemetry;

pub use telemetry::{TelemetryCollector, DEFAULT_SAMPLE_INTERVAL, DEFAULT_WINDOW};
