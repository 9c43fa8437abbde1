//! Stream Pump
//!
//! Moves events from a transport's channel into the controller inbox. Each
//! event is stamped with its stream id and the instant the pump received it,
//! so the controller can drop stale events and feed telemetry with arrival
//! times rather than processing times.

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::events::{ControllerHandle, ControllerInput, StreamSignal};
use crate::messages::StreamId;
use crate::scheduler::ScheduledTask;
use crate::transport::TransportEvent;

/// Spawn a pump for one stream
///
/// The pump stops after forwarding a terminal event, after the channel
/// closes (forwarding [`StreamSignal::Closed`]), or when its task is
/// cancelled.
pub fn spawn(
    stream_id: StreamId,
    events: mpsc::Receiver<TransportEvent>,
    handle: ControllerHandle,
) -> ScheduledTask {
    ScheduledTask::spawn("stream-pump", move |_| async move {
        let mut events = ReceiverStream::new(events);
        while let Some(event) = events.next().await {
            let terminal = event.is_terminal();
            let delivered = handle.send(ControllerInput::Stream {
                stream_id,
                signal: StreamSignal::Event(event),
                received_at: Instant::now(),
            });
            if !delivered || terminal {
                return;
            }
        }
        tracing::debug!(stream_id = %stream_id, "Transport channel closed");
        handle.send(ControllerInput::Stream {
            stream_id,
            signal: StreamSignal::Closed,
            received_at: Instant::now(),
        });
    })
}
