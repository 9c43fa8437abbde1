//! Streaming Session Controller
//!
//! Owns the message timeline and the single-slot streaming state machine, and
//! is the only place where either changes. Everything else (transport pumps,
//! timers, voice, connectivity, health) reaches it through the inbox as a
//! [`ControllerInput`], and everything it wants a surface to know leaves as a
//! [`ControllerEvent`].
//!
//! # Send path
//!
//! ```text
//!  submit(text)
//!    │ guards: non-blank, idle, online, provider available
//!    ▼
//!  Begin ─▶ commit user message ─▶ transport.open()
//!                                      │ ok                 │ err
//!                                      ▼                    ▼
//!                               Opened + pump          Fail ─▶ retry decision
//!                                      │
//!         Delta: telemetry.observe ─▶ buffer.append
//!         Complete: commit assistant message, reset retry
//!         Error / Closed: Fail ─▶ retry decision
//! ```
//!
//! Every failure resolves the session back to idle. Abort is synchronous: once
//! [`SessionController::abort`] returns, no event of the aborted stream is
//! applied, because the session no longer accepts its stream id.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::config::SessionConfig;
use crate::connectivity::{ConnectivityMonitor, ConnectivitySignal, Transition as Connectivity};
use crate::error::{ErrorKind, ProviderSwitchError};
use crate::events::{Command, ControllerHandle, ControllerInput, StreamSignal};
use crate::messages::{ControllerEvent, Message, NotifyLevel, RejectReason, SessionId, StreamId};
use crate::retry::{ManualRetry, RetryController, RetryDecision, RetryRefusal, RetryState, MAX_ATTEMPTS};
use crate::routing::{HealthPoller, HealthReport, ProviderRecord, ProviderRegistry};
use crate::scheduler::ScheduledTask;
use crate::session::{ActiveStream, SessionStatus, StreamingSession, Timeline, Transition};
use crate::streaming::{pump, TelemetryCollector};
use crate::transport::{HealthSource, StreamRequest, TransportAdapter, TransportEvent};
use crate::voice::{Draft, VoiceBridge, VoiceCapability, VoiceEvent, VoiceOutcome, VoiceSink};

/// Result of a send request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The transport opened a stream
    Started(StreamId),
    /// The user message was committed but the stream failed to open
    Failed(ErrorKind),
    /// Nothing happened; the timeline is unchanged
    Rejected(RejectReason),
}

impl SendOutcome {
    /// Whether the request got past the guards
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// The session controller
///
/// Generic over the transport so callers keep their concrete adapter type.
pub struct SessionController<T: TransportAdapter> {
    transport: Arc<T>,
    registry: Arc<ProviderRegistry>,
    config: SessionConfig,

    session: StreamingSession,
    timeline: Timeline,
    retry: RetryController,
    telemetry: TelemetryCollector,
    connectivity: ConnectivityMonitor,
    voice: VoiceBridge,
    draft: Draft,

    /// Text of the exchange currently streaming
    in_flight_text: Option<String>,
    next_stream: u64,
    pump: Option<ScheduledTask>,
    sampler: Option<ScheduledTask>,
    health_poller: Option<HealthPoller>,

    handle: ControllerHandle,
    inbox: mpsc::UnboundedReceiver<ControllerInput>,
    events: mpsc::UnboundedSender<ControllerEvent>,
    shut_down: bool,
}

impl<T: TransportAdapter> std::fmt::Debug for SessionController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("transport", &self.transport.name())
            .field("session", &self.session.id())
            .field("status", &self.session.status())
            .field("messages", &self.timeline.len())
            .finish_non_exhaustive()
    }
}

impl<T: TransportAdapter> SessionController<T> {
    /// Create a controller and the receiver for its outbound events
    pub fn new(
        transport: Arc<T>,
        registry: Arc<ProviderRegistry>,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();

        if let Some(id) = &config.default_provider {
            if let Err(e) = registry.set_current(id) {
                tracing::warn!(provider = %id, error = %e, "Default provider not selectable");
            }
        }

        let controller = Self {
            transport,
            registry,
            session: StreamingSession::new(),
            timeline: Timeline::with_limit(config.max_messages),
            retry: RetryController::new(),
            telemetry: TelemetryCollector::new(config.telemetry_window),
            connectivity: ConnectivityMonitor::new(config.start_online),
            voice: VoiceBridge::new(None),
            draft: Draft::default(),
            in_flight_text: None,
            next_stream: 1,
            pump: None,
            sampler: None,
            health_poller: None,
            handle: ControllerHandle::new(inbox_tx),
            inbox,
            events,
            shut_down: false,
            config,
        };
        tracing::info!(
            session = %controller.session.id(),
            transport = controller.transport.name(),
            provider = ?controller.registry.current(),
            "Session controller created"
        );
        (controller, events_rx)
    }

    /// Attach a speech-recognition capability
    #[must_use]
    pub fn with_voice(mut self, capability: Arc<dyn VoiceCapability>) -> Self {
        self.voice = VoiceBridge::new(Some(capability));
        self
    }

    /// Poll `source` every `interval` and apply its reports
    pub fn start_health_feed(&mut self, source: Arc<dyn HealthSource>, interval: Duration) {
        self.health_poller = Some(HealthPoller::start(source, self.handle.clone(), interval));
        tracing::debug!(interval_ms = interval.as_millis() as u64, "Health feed started");
    }

    /// Cloneable sender for the inbox
    #[must_use]
    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Session identifier
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        self.session.id()
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    /// Committed messages, oldest first
    #[must_use]
    pub fn timeline(&self) -> &[Message] {
        self.timeline.messages()
    }

    /// Retry bookkeeping
    #[must_use]
    pub fn retry_state(&self) -> &RetryState {
        self.retry.state()
    }

    /// Whether an automatic retry is armed
    #[must_use]
    pub fn has_pending_retry(&self) -> bool {
        self.retry.has_pending()
    }

    /// Connectivity flag
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Subscribe to connectivity changes
    #[must_use]
    pub fn connectivity(&self) -> watch::Receiver<bool> {
        self.connectivity.subscribe()
    }

    /// Whether a user send would pass the guards
    #[must_use]
    pub fn can_send(&self) -> bool {
        self.session.is_idle() && self.is_online() && self.registry.current_available()
    }

    /// Record of the provider the next send goes to
    #[must_use]
    pub fn current_provider(&self) -> Option<ProviderRecord> {
        self.registry.current_record()
    }

    /// Provider registry
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Composer draft
    #[must_use]
    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    /// Accumulated text of the in-flight reply
    #[must_use]
    pub fn pending_text(&self) -> &str {
        self.session.pending_text()
    }

    /// Whether voice capture is active
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.voice.is_recording()
    }

    /// Mean throughput over the telemetry window
    #[must_use]
    pub fn mean_tokens_per_second(&self) -> Option<f64> {
        self.telemetry.mean_tokens_per_second()
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Wait for the next input
    ///
    /// Cancel-safe, so it can sit in a `select!` next to other sources.
    pub async fn next_input(&mut self) -> ControllerInput {
        self.inbox.recv().await.unwrap_or(ControllerInput::Shutdown)
    }

    /// Apply one input; returns `false` once the controller has shut down
    pub async fn process(&mut self, input: ControllerInput) -> bool {
        match input {
            ControllerInput::Command(command) => self.handle_command(command).await,
            ControllerInput::Stream {
                stream_id,
                signal,
                received_at,
            } => self.handle_stream(stream_id, signal, received_at),
            ControllerInput::Connectivity(signal) => self.connectivity_changed(signal).await,
            ControllerInput::Voice(event) => self.handle_voice(event),
            ControllerInput::Health(report) => self.apply_health_report(report).await,
            ControllerInput::RetryTimer { generation } => self.fire_retry(Some(generation)).await,
            ControllerInput::SampleTick { stream_id } => self.sample(stream_id),
            ControllerInput::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        !self.shut_down
    }

    /// Wait for and apply one input
    pub async fn step(&mut self) -> bool {
        let input = self.next_input().await;
        self.process(input).await
    }

    /// Apply inputs that are already queued, without waiting
    pub async fn process_ready(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(input) = self.inbox.try_recv() {
            processed += 1;
            if !self.process(input).await {
                break;
            }
        }
        processed
    }

    /// Apply inputs until the session is idle again
    pub async fn run_until_idle(&mut self) {
        while !self.session.is_idle() {
            if !self.step().await {
                return;
            }
        }
    }

    /// Apply inputs until shutdown
    pub async fn run(mut self) {
        while self.step().await {}
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send(text) => {
                self.submit(text).await;
            }
            Command::SendDraft => {
                self.send_draft().await;
            }
            Command::Abort => {
                self.abort();
            }
            Command::Retry => {
                self.retry().await;
            }
            Command::SetDraft(text) => self.set_draft(text),
            Command::SwitchProvider(id) => {
                // Failures are reported as notifications
                let _ = self.switch_provider(&id).await;
            }
            Command::StartVoice => self.start_voice(),
            Command::StopVoice => self.stop_voice(),
        }
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Send user-typed text
    ///
    /// Resets the retry budget and cancels any armed automatic retry.
    pub async fn submit(&mut self, text: impl Into<String>) -> SendOutcome {
        let text = text.into();
        if let Err(reason) = self.check_send(&text) {
            return SendOutcome::Rejected(reason);
        }
        self.retry.reset_for_new_send();
        self.begin_send(text, 0).await
    }

    /// Send the draft and clear it when accepted
    pub async fn send_draft(&mut self) -> SendOutcome {
        let text = self.draft.text.clone();
        let outcome = self.submit(text).await;
        if outcome.is_accepted() {
            self.voice.stop(&mut self.draft);
            self.draft.clear();
            self.emit_draft();
        }
        outcome
    }

    /// Manually retry the last failed text
    pub async fn retry(&mut self) -> SendOutcome {
        if !self.session.is_idle() {
            return SendOutcome::Rejected(RejectReason::Busy);
        }
        if self.retry.state().last_failed_text.is_none() {
            return SendOutcome::Rejected(RejectReason::NothingToRetry);
        }
        if let Err(reason) = self.check_reachable() {
            return SendOutcome::Rejected(reason);
        }
        match self.retry.begin_manual() {
            ManualRetry::Allowed { text, attempt } => {
                tracing::info!(attempt, "Manual retry");
                self.begin_send(text, attempt).await
            }
            ManualRetry::Refused(RetryRefusal::NothingToRetry) => {
                SendOutcome::Rejected(RejectReason::NothingToRetry)
            }
            ManualRetry::Refused(refusal) => {
                tracing::warn!(reason = %refusal, "Manual retry refused");
                let kind = self.retry.state().last_kind;
                self.notify(NotifyLevel::Warning, kind, format!("Cannot retry: {refusal}."));
                SendOutcome::Rejected(RejectReason::RetryRefused)
            }
        }
    }

    fn check_send(&self, text: &str) -> Result<(), RejectReason> {
        if text.trim().is_empty() {
            return Err(RejectReason::EmptyDraft);
        }
        if !self.session.is_idle() {
            tracing::debug!(status = %self.session.status(), "Send rejected; session busy");
            return Err(RejectReason::Busy);
        }
        self.check_reachable()
    }

    fn check_reachable(&self) -> Result<(), RejectReason> {
        if !self.connectivity.is_online() {
            self.notify(
                NotifyLevel::Info,
                None,
                "You are offline. Messages can be sent once the connection returns.",
            );
            return Err(RejectReason::Offline);
        }
        if !self.registry.current_available() {
            self.notify(
                NotifyLevel::Info,
                None,
                "No provider is available. Select another provider.",
            );
            return Err(RejectReason::NoProvider);
        }
        Ok(())
    }

    /// Shared send path for user sends, manual retries, and automatic retries
    async fn begin_send(&mut self, text: String, retry_count: u32) -> SendOutcome {
        let record = self.registry.current_record();
        let provider = record.as_ref().map(|r| r.id.clone());
        let model = record.and_then(|r| r.model);

        if let Err(e) = self.session.apply(Transition::Begin { text: text.clone() }) {
            tracing::warn!(error = %e, "Send raced a non-idle session");
            return SendOutcome::Rejected(RejectReason::Busy);
        }
        self.emit_status();
        self.commit(Message::user(text.clone(), retry_count).with_provider(provider.clone(), model.clone()));

        let request = StreamRequest::new(text.clone()).with_provider(provider.clone(), model.clone());
        match self.transport.open(&request).await {
            Ok(opened) => {
                let stream_id = StreamId(self.next_stream);
                self.next_stream += 1;

                let pump = pump::spawn(stream_id, opened.events, self.handle.clone());
                let active = ActiveStream::new(
                    stream_id,
                    opened.handle,
                    pump.token(),
                    provider.clone(),
                    model,
                );
                if let Err(e) = self.session.apply(Transition::Opened(active)) {
                    tracing::warn!(error = %e, "Stream opened for a session that is not sending");
                    self.transport.abort(&opened.handle);
                    return SendOutcome::Rejected(RejectReason::Busy);
                }
                self.pump = Some(pump);
                self.in_flight_text = Some(text);
                self.telemetry.start(Instant::now());
                self.start_sampler(stream_id);

                tracing::info!(
                    stream_id = %stream_id,
                    handle = %opened.handle,
                    provider = ?provider,
                    retry_count,
                    "Stream opened"
                );
                self.emit_status();
                self.emit(ControllerEvent::StreamStarted {
                    stream_id,
                    provider,
                });
                SendOutcome::Started(stream_id)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Transport failed to open stream");
                if let Err(e) = self.session.apply(Transition::Fail) {
                    tracing::warn!(error = %e, "Unexpected session state after open failure");
                }
                self.handle_failure(err.kind, &text);
                SendOutcome::Failed(err.kind)
            }
        }
    }

    fn start_sampler(&mut self, stream_id: StreamId) {
        let handle = self.handle.clone();
        self.sampler = Some(ScheduledTask::every(
            "telemetry-sampler",
            self.config.sample_interval,
            move || handle.send(ControllerInput::SampleTick { stream_id }),
        ));
    }

    fn stop_stream_tasks(&mut self) {
        self.pump = None;
        self.sampler = None;
        self.in_flight_text = None;
    }

    // ========================================================================
    // Stream events
    // ========================================================================

    fn handle_stream(&mut self, stream_id: StreamId, signal: StreamSignal, received_at: Instant) {
        if !self.session.accepts(stream_id) {
            tracing::debug!(stream_id = %stream_id, "Dropping event for inactive stream");
            return;
        }
        match signal {
            StreamSignal::Event(TransportEvent::Delta(text)) => {
                // Observe before applying
                self.telemetry.observe(&text, received_at);
                self.session.append(stream_id, &text);
                tracing::debug!(stream_id = %stream_id, len = text.len(), "Delta applied");
                self.emit(ControllerEvent::Delta { stream_id, text });
            }
            StreamSignal::Event(TransportEvent::Complete { full_text }) => {
                self.complete(full_text);
            }
            StreamSignal::Event(TransportEvent::Error { kind, message }) => {
                tracing::warn!(stream_id = %stream_id, kind = %kind, message = %message, "Stream error");
                self.fail_stream(kind);
            }
            StreamSignal::Closed => {
                tracing::warn!(stream_id = %stream_id, "Stream disconnected unexpectedly");
                self.fail_stream(ErrorKind::Network);
            }
        }
    }

    fn complete(&mut self, full_text: String) {
        let snapshot = self.telemetry.finish(Instant::now());
        let closed = match self.session.apply(Transition::Complete) {
            Ok(Some(closed)) => closed,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Completion for a session that is not streaming");
                return;
            }
        };
        self.stop_stream_tasks();

        let content = if closed.buffer.is_empty() {
            full_text
        } else {
            closed.buffer
        };
        tracing::info!(
            stream_id = %closed.stream_id,
            tokens = snapshot.total_tokens,
            tokens_per_second = snapshot.tokens_per_second,
            "Stream completed"
        );
        self.commit(Message::assistant(content, closed.provider, closed.model, snapshot));
        self.retry.on_success();
        self.emit_status();
        self.settle();
    }

    fn fail_stream(&mut self, kind: ErrorKind) {
        let text = self.in_flight_text.take().unwrap_or_default();
        self.telemetry.cancel();
        if let Err(e) = self.session.apply(Transition::Fail) {
            tracing::warn!(error = %e, "Failure for a session that is not streaming");
            return;
        }
        self.stop_stream_tasks();
        self.handle_failure(kind, &text);
    }

    /// Classify, notify, and decide on a retry; leaves the session idle
    fn handle_failure(&mut self, kind: ErrorKind, text: &str) {
        self.emit_status();

        if kind.forces_offline() && self.connectivity.force_offline().is_some() {
            self.emit(ControllerEvent::ConnectivityChanged { online: false });
        }

        match self.retry.on_failure(kind, text) {
            RetryDecision::Scheduled { attempt, delay } => {
                let handle = self.handle.clone();
                self.retry.arm(|generation| {
                    ScheduledTask::after("retry-backoff", delay, move || {
                        handle.send(ControllerInput::RetryTimer { generation });
                    })
                });
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                tracing::info!(attempt, delay_ms, kind = %kind, "Automatic retry scheduled");
                self.notify(
                    NotifyLevel::Warning,
                    Some(kind),
                    format!(
                        "{} Retrying ({attempt}/{MAX_ATTEMPTS}) in {}s.",
                        kind.user_message(),
                        delay.as_secs()
                    ),
                );
                self.emit(ControllerEvent::RetryScheduled {
                    attempt,
                    max_attempts: MAX_ATTEMPTS,
                    delay_ms,
                });
            }
            RetryDecision::Exhausted => {
                self.notify(
                    NotifyLevel::Error,
                    Some(kind),
                    format!(
                        "{} Gave up after {MAX_ATTEMPTS} retries.",
                        kind.user_message()
                    ),
                );
            }
            RetryDecision::NotRetryable(kind) => {
                let message = match kind {
                    ErrorKind::Provider => {
                        let current = self.registry.current();
                        match self.registry.best_alternative(current.as_deref()) {
                            Some(alt) => format!(
                                "{} {} is available.",
                                kind.user_message(),
                                alt.display_name
                            ),
                            None => kind.user_message().to_string(),
                        }
                    }
                    _ => kind.user_message().to_string(),
                };
                self.notify(NotifyLevel::Error, Some(kind), message);
            }
        }

        self.settle();
    }

    fn settle(&mut self) {
        if let Err(e) = self.session.apply(Transition::Settle) {
            tracing::warn!(error = %e, "Could not settle session");
            return;
        }
        self.emit_status();
    }

    fn sample(&mut self, stream_id: StreamId) {
        if !self.session.accepts(stream_id) {
            return;
        }
        if let Some(sample) = self.telemetry.tick(Instant::now()) {
            self.emit(ControllerEvent::Telemetry { stream_id, sample });
        }
    }

    // ========================================================================
    // Abort
    // ========================================================================

    /// Cancel the in-flight stream
    ///
    /// Valid only while streaming. The partial reply is discarded and retry
    /// logic is not consulted. Returns whether a stream was aborted.
    pub fn abort(&mut self) -> bool {
        if self.session.status() != SessionStatus::Streaming {
            return false;
        }
        let closed = match self.session.apply(Transition::Abort) {
            Ok(Some(closed)) => closed,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "Abort rejected");
                return false;
            }
        };
        self.stop_stream_tasks();
        self.telemetry.cancel();
        self.transport.abort(&closed.handle);

        tracing::info!(
            stream_id = %closed.stream_id,
            discarded = closed.buffer.len(),
            "Stream aborted"
        );
        self.emit_status();
        self.notify(NotifyLevel::Info, None, "Response stopped.");
        self.settle();
        true
    }

    // ========================================================================
    // Automatic retry
    // ========================================================================

    async fn fire_retry(&mut self, generation: Option<u64>) {
        let Some(fired) = self.retry.take_pending(generation) else {
            return;
        };
        if !self.session.is_idle() {
            tracing::debug!(attempt = fired.attempt, "Retry fired while busy; dropped");
            return;
        }
        if !self.registry.current_available() {
            self.notify(
                NotifyLevel::Warning,
                None,
                "Retry skipped: no provider is available.",
            );
            return;
        }
        tracing::info!(
            attempt = fired.attempt,
            trigger = if generation.is_some() { "timer" } else { "online" },
            "Automatic retry firing"
        );
        self.begin_send(fired.text, fired.attempt).await;
    }

    // ========================================================================
    // Connectivity
    // ========================================================================

    /// Apply an environment connectivity signal
    ///
    /// Going online fires an armed retry immediately.
    pub async fn connectivity_changed(&mut self, signal: ConnectivitySignal) {
        match self.connectivity.apply(signal) {
            None => {}
            Some(Connectivity::WentOffline) => {
                tracing::info!("Connectivity lost");
                self.emit(ControllerEvent::ConnectivityChanged { online: false });
            }
            Some(Connectivity::WentOnline) => {
                tracing::info!("Connectivity restored");
                self.emit(ControllerEvent::ConnectivityChanged { online: true });
                if self.retry.has_pending() {
                    self.fire_retry(None).await;
                }
            }
        }
    }

    // ========================================================================
    // Providers
    // ========================================================================

    /// Select a provider for the next send
    ///
    /// The in-flight stream, if any, keeps its provider. On error the current
    /// provider is unchanged.
    pub async fn switch_provider(&mut self, id: &str) -> Result<ProviderRecord, ProviderSwitchError> {
        let result = self.try_switch(id).await;
        match &result {
            Ok(record) => {
                tracing::info!(provider = %record.id, "Provider switched");
                self.emit(ControllerEvent::ProviderChanged {
                    provider_id: record.id.clone(),
                });
            }
            Err(e) => {
                tracing::warn!(provider = %id, error = %e, "Provider switch failed");
                self.notify(NotifyLevel::Warning, Some(ErrorKind::Provider), e.to_string());
            }
        }
        result
    }

    async fn try_switch(&self, id: &str) -> Result<ProviderRecord, ProviderSwitchError> {
        self.registry.validate_switch(id)?;
        self.transport
            .switch_provider(id)
            .await
            .map_err(|e| ProviderSwitchError::Rejected {
                id: id.to_string(),
                reason: e.message,
            })?;
        self.registry.set_current(id)
    }

    /// Apply a health report, failing over if the current provider dropped
    pub async fn apply_health_report(&mut self, report: HealthReport) {
        let (record, flipped) = self.registry.apply_report(&report);
        self.emit(ControllerEvent::ProviderUpdated {
            record: record.clone(),
        });

        let lost_current = flipped
            && !record.available
            && self.registry.current().as_deref() == Some(record.id.as_str());
        if !lost_current || !self.config.auto_failover {
            return;
        }

        match self.registry.best_alternative(Some(&record.id)) {
            Some(alt) => {
                if self.switch_provider(&alt.id).await.is_ok() {
                    self.notify(
                        NotifyLevel::Info,
                        None,
                        format!(
                            "{} is unavailable; switched to {}.",
                            record.display_name, alt.display_name
                        ),
                    );
                }
            }
            None => {
                self.notify(
                    NotifyLevel::Warning,
                    Some(ErrorKind::Provider),
                    format!("{} is unavailable and no alternative is.", record.display_name),
                );
            }
        }
    }

    // ========================================================================
    // Draft & voice
    // ========================================================================

    /// Manual edit of the draft text
    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft.text = text.into();
        self.emit_draft();
    }

    /// Start voice capture
    pub fn start_voice(&mut self) {
        match self.voice.start(VoiceSink::new(self.handle.clone())) {
            Ok(true) => self.emit(ControllerEvent::VoiceStateChanged { recording: true }),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Voice capture unavailable");
                self.notify(NotifyLevel::Warning, Some(e.kind()), e.to_string());
            }
        }
    }

    /// Stop voice capture, discarding the preview
    pub fn stop_voice(&mut self) {
        if self.voice.stop(&mut self.draft) {
            self.emit(ControllerEvent::VoiceStateChanged { recording: false });
            self.emit_draft();
        }
    }

    fn handle_voice(&mut self, event: VoiceEvent) {
        match self.voice.handle(event, &mut self.draft) {
            VoiceOutcome::Ignored => {}
            VoiceOutcome::PreviewUpdated => self.emit_draft(),
            VoiceOutcome::Finalized => {
                self.emit(ControllerEvent::VoiceStateChanged { recording: false });
                self.emit_draft();
            }
            VoiceOutcome::Failed(e) => {
                self.notify(NotifyLevel::Warning, Some(e.kind()), e.to_string());
                self.emit(ControllerEvent::VoiceStateChanged { recording: false });
                self.emit_draft();
            }
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Cancel every timer and task, abort the in-flight stream, stop voice
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.teardown();
        tracing::info!(session = %self.session.id(), "Session controller shut down");
    }

    fn teardown(&mut self) {
        if self.session.status() == SessionStatus::Streaming {
            if let Ok(Some(closed)) = self.session.apply(Transition::Abort) {
                self.transport.abort(&closed.handle);
            }
        }
        self.stop_stream_tasks();
        self.retry.cancel_pending();
        self.health_poller = None;
        self.telemetry.cancel();
        self.voice.stop(&mut self.draft);
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn commit(&mut self, message: Message) {
        self.timeline.push(message.clone());
        self.emit(ControllerEvent::MessageCommitted { message });
    }

    fn emit_status(&self) {
        self.emit(ControllerEvent::StatusChanged {
            status: self.session.status(),
        });
    }

    fn emit_draft(&self) {
        self.emit(ControllerEvent::DraftChanged {
            text: self.draft.text.clone(),
            preview: self.draft.preview.clone(),
        });
    }

    fn notify(&self, level: NotifyLevel, kind: Option<ErrorKind>, message: impl Into<String>) {
        self.emit(ControllerEvent::notify(level, kind, message));
    }

    fn emit(&self, event: ControllerEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("No surface attached; event dropped");
        }
    }
}

impl<T: TransportAdapter> Drop for SessionController<T> {
    fn drop(&mut self) {
        if !self.shut_down {
            self.teardown();
        }
    }
}
