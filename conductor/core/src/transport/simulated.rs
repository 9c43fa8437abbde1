//! Simulated Transport
//!
//! In-process [`TransportAdapter`] that replays queued [`ScriptedReply`]s,
//! falling back to echoing the prompt word by word. Every open, abort, and
//! provider switch is recorded so tests can assert on what the controller
//! asked for. It also serves as a [`HealthSource`] with reports set by the
//! caller.
//!
//! Each stream is produced by a [`ScheduledTask`] keyed by its handle;
//! `abort` drops that task, which closes the event channel.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::sync::mpsc;

use super::traits::{
    HealthSource, OpenedStream, StreamHandle, StreamRequest, TransportAdapter, TransportEvent,
};
use crate::error::{ErrorKind, TransportError};
use crate::routing::HealthReport;
use crate::scheduler::ScheduledTask;

const EVENT_BUFFER: usize = 64;

/// Default pause between echoed words
pub const DEFAULT_ECHO_DELAY: Duration = Duration::from_millis(40);

/// One step of a scripted stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptStep {
    /// Emit a delta
    Delta(String),
    /// Pause
    Wait(Duration),
    /// Emit completion with the concatenated deltas
    Complete,
    /// Emit completion with explicit full text
    CompleteWith(String),
    /// Emit an error
    Error(ErrorKind, String),
    /// Close the channel without a terminal event
    Disconnect,
    /// Stay open until aborted
    Hang,
}

/// What the next `open` does
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Acknowledge and play the steps
    Stream(Vec<ScriptStep>),
    /// Refuse to open
    FailOpen(TransportError),
}

impl ScriptedReply {
    /// Deltas separated by `delay`, then completion
    pub fn deltas<S: AsRef<str>>(deltas: &[S], delay: Duration) -> Self {
        let mut steps = Vec::with_capacity(deltas.len() * 2 + 1);
        for delta in deltas {
            steps.push(ScriptStep::Wait(delay));
            steps.push(ScriptStep::Delta(delta.as_ref().to_string()));
        }
        steps.push(ScriptStep::Complete);
        Self::Stream(steps)
    }

    /// Deltas separated by `delay`, then an error
    pub fn deltas_then_error<S: AsRef<str>>(
        deltas: &[S],
        delay: Duration,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        let mut steps = Vec::with_capacity(deltas.len() * 2 + 1);
        for delta in deltas {
            steps.push(ScriptStep::Wait(delay));
            steps.push(ScriptStep::Delta(delta.as_ref().to_string()));
        }
        steps.push(ScriptStep::Error(kind, message.into()));
        Self::Stream(steps)
    }

    /// Deltas separated by `delay`, then stay open
    pub fn hang<S: AsRef<str>>(deltas: &[S], delay: Duration) -> Self {
        let mut steps = Vec::with_capacity(deltas.len() * 2 + 1);
        for delta in deltas {
            steps.push(ScriptStep::Wait(delay));
            steps.push(ScriptStep::Delta(delta.as_ref().to_string()));
        }
        steps.push(ScriptStep::Hang);
        Self::Stream(steps)
    }

    /// Refuse to open with `kind`
    pub fn fail_open(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::FailOpen(TransportError::new(kind, message))
    }
}

/// Scripted in-process transport
#[derive(Debug)]
pub struct SimulatedTransport {
    script: Mutex<VecDeque<ScriptedReply>>,
    producers: Mutex<HashMap<StreamHandle, ScheduledTask>>,
    next_handle: AtomicU64,
    opens: Mutex<Vec<StreamRequest>>,
    aborts: Mutex<Vec<StreamHandle>>,
    switches: Mutex<Vec<String>>,
    rejected_providers: Mutex<HashSet<String>>,
    current_provider: RwLock<Option<String>>,
    health: Mutex<Vec<HealthReport>>,
    fail_rate: f64,
    echo_delay: Duration,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTransport {
    /// Create a transport that echoes every prompt
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            producers: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            opens: Mutex::new(Vec::new()),
            aborts: Mutex::new(Vec::new()),
            switches: Mutex::new(Vec::new()),
            rejected_providers: Mutex::new(HashSet::new()),
            current_provider: RwLock::new(None),
            health: Mutex::new(Vec::new()),
            fail_rate: 0.0,
            echo_delay: DEFAULT_ECHO_DELAY,
        }
    }

    /// Fail unscripted opens with a network error at this probability
    #[must_use]
    pub fn with_fail_rate(mut self, fail_rate: f64) -> Self {
        self.fail_rate = fail_rate.clamp(0.0, 1.0);
        self
    }

    /// Pause between echoed words
    #[must_use]
    pub fn with_echo_delay(mut self, delay: Duration) -> Self {
        self.echo_delay = delay;
        self
    }

    /// Queue the reply for the next open
    pub fn push_reply(&self, reply: ScriptedReply) {
        self.script.lock().push_back(reply);
    }

    /// Make `switch_provider(id)` fail
    pub fn reject_provider(&self, id: impl Into<String>) {
        self.rejected_providers.lock().insert(id.into());
    }

    /// Replace the reports returned by `poll_health`
    pub fn set_health(&self, reports: Vec<HealthReport>) {
        *self.health.lock() = reports;
    }

    /// Every request passed to `open`, in order
    #[must_use]
    pub fn opens(&self) -> Vec<StreamRequest> {
        self.opens.lock().clone()
    }

    /// Number of `open` calls
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opens.lock().len()
    }

    /// Every handle passed to `abort`, in order
    #[must_use]
    pub fn aborts(&self) -> Vec<StreamHandle> {
        self.aborts.lock().clone()
    }

    /// Every accepted provider switch, in order
    #[must_use]
    pub fn switches(&self) -> Vec<String> {
        self.switches.lock().clone()
    }

    /// Provider selected by the last accepted switch
    #[must_use]
    pub fn current_provider(&self) -> Option<String> {
        self.current_provider.read().clone()
    }

    /// Producers still running
    #[must_use]
    pub fn active_producers(&self) -> usize {
        self.producers
            .lock()
            .values()
            .filter(|task| !task.is_finished())
            .count()
    }

    fn echo_reply(&self, request: &StreamRequest) -> ScriptedReply {
        if self.fail_rate > 0.0 && rand::thread_rng().gen_bool(self.fail_rate) {
            return ScriptedReply::fail_open(ErrorKind::Network, "simulated connection failure");
        }
        let words: Vec<String> = request
            .text
            .split_whitespace()
            .enumerate()
            .map(|(i, w)| if i == 0 { w.to_string() } else { format!(" {w}") })
            .collect();
        ScriptedReply::deltas(&words, self.echo_delay)
    }
}

async fn play(steps: Vec<ScriptStep>, tx: mpsc::Sender<TransportEvent>, handle: StreamHandle) {
    let mut full_text = String::new();
    for step in steps {
        let event = match step {
            ScriptStep::Wait(delay) => {
                tokio::time::sleep(delay).await;
                continue;
            }
            ScriptStep::Delta(text) => {
                full_text.push_str(&text);
                TransportEvent::Delta(text)
            }
            ScriptStep::Complete => TransportEvent::Complete {
                full_text: std::mem::take(&mut full_text),
            },
            ScriptStep::CompleteWith(text) => TransportEvent::Complete { full_text: text },
            ScriptStep::Error(kind, message) => TransportEvent::Error { kind, message },
            ScriptStep::Disconnect => {
                tracing::debug!(handle = %handle, "Simulated disconnect");
                return;
            }
            ScriptStep::Hang => {
                std::future::pending::<()>().await;
                return;
            }
        };
        let terminal = event.is_terminal();
        if tx.send(event).await.is_err() {
            tracing::debug!(handle = %handle, "Receiver dropped; producer stopping");
            return;
        }
        if terminal {
            return;
        }
    }
}

#[async_trait]
impl TransportAdapter for SimulatedTransport {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn open(&self, request: &StreamRequest) -> Result<OpenedStream, TransportError> {
        self.opens.lock().push(request.clone());

        let reply = self.script.lock().pop_front();
        let reply = match reply {
            Some(reply) => reply,
            None => self.echo_reply(request),
        };

        let steps = match reply {
            ScriptedReply::Stream(steps) => steps,
            ScriptedReply::FailOpen(err) => {
                tracing::debug!(error = %err, "Simulated open failure");
                return Err(err);
            }
        };

        let handle = StreamHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let producer = ScheduledTask::spawn("simulated-producer", move |_| play(steps, tx, handle));

        let mut producers = self.producers.lock();
        producers.retain(|_, task| !task.is_finished());
        producers.insert(handle, producer);

        Ok(OpenedStream { handle, events: rx })
    }

    fn abort(&self, handle: &StreamHandle) {
        self.aborts.lock().push(*handle);
        if self.producers.lock().remove(handle).is_some() {
            tracing::debug!(handle = %handle, "Simulated stream aborted");
        }
    }

    async fn switch_provider(&self, provider_id: &str) -> Result<(), TransportError> {
        if self.rejected_providers.lock().contains(provider_id) {
            return Err(TransportError::new(
                ErrorKind::Provider,
                format!("provider {provider_id} refused the switch"),
            ));
        }
        *self.current_provider.write() = Some(provider_id.to_string());
        self.switches.lock().push(provider_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl HealthSource for SimulatedTransport {
    async fn poll_health(&self) -> Vec<HealthReport> {
        self.health.lock().clone()
    }
}
