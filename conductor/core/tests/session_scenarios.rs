//! End-to-end session scenarios
//!
//! Drive a [`SessionController`] against the scripted [`SimulatedTransport`]
//! on paused tokio time, so backoff timers and delta spacing are exact.
//! Covers:
//! - Delta accumulation and commit with a telemetry snapshot
//! - Network failures, automatic retry, online precedence, budget exhaustion
//! - Abort, busy rejection, stale stream events
//! - Provider switching and failover from health reports
//! - Voice input folding into the draft

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use stream_conductor::{
    Command, ConnectivitySignal, ControllerEvent, ErrorKind, HealthReport, NotifyLevel,
    ProviderHealth, ProviderRecord, ProviderRegistry, ProviderSwitchError, RejectReason,
    ScriptStep, ScriptedReply, SendOutcome, Sender, SessionConfig, SessionController,
    SessionStatus, SimulatedTransport, SimulatedVoice,
};

type Controller = SessionController<SimulatedTransport>;
type Events = mpsc::UnboundedReceiver<ControllerEvent>;

const TICK: Duration = Duration::from_millis(50);

fn registry() -> Arc<ProviderRegistry> {
    let registry = Arc::new(ProviderRegistry::new());
    registry.seed([
        ProviderRecord::new("local", "Local")
            .with_model("llama3.2")
            .with_health(ProviderHealth::Healthy)
            .with_latency(20),
        ProviderRecord::new("cloud", "Cloud")
            .with_model("large")
            .with_health(ProviderHealth::Healthy)
            .with_latency(180),
    ]);
    registry
}

fn setup_with(config: SessionConfig) -> (Controller, Events, Arc<SimulatedTransport>) {
    let transport = Arc::new(SimulatedTransport::new());
    let (controller, events) = SessionController::new(transport.clone(), registry(), config);
    (controller, events, transport)
}

fn setup() -> (Controller, Events, Arc<SimulatedTransport>) {
    setup_with(SessionConfig::default())
}

fn drain(events: &mut Events) -> Vec<ControllerEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn deltas(events: &[ControllerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ControllerEvent::Delta { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn notifications(events: &[ControllerEvent]) -> Vec<(NotifyLevel, Option<ErrorKind>, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            ControllerEvent::Notify {
                level,
                kind,
                message,
            } => Some((*level, *kind, message.clone())),
            _ => None,
        })
        .collect()
}

/// Step the controller until the in-flight reply reads `expected`
async fn stream_until(controller: &mut Controller, expected: &str) {
    while controller.pending_text() != expected {
        assert!(controller.step().await, "controller stopped early");
    }
}

// =============================================================================
// Delivery
// =============================================================================

/// "Hello" answered with "Hi" + " there" commits both messages and a snapshot
#[tokio::test(start_paused = true)]
async fn test_hello_reply_is_committed_with_snapshot() {
    let (mut controller, mut events, transport) = setup();
    transport.push_reply(ScriptedReply::deltas(&["Hi", " there"], TICK));

    let outcome = controller.submit("Hello").await;
    assert!(matches!(outcome, SendOutcome::Started(_)));
    assert_eq!(controller.status(), SessionStatus::Streaming);

    controller.run_until_idle().await;
    assert_eq!(controller.status(), SessionStatus::Idle);
    assert_eq!(controller.pending_text(), "");

    let timeline = controller.timeline();
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].sender, Sender::User);
    assert_eq!(timeline[0].content, "Hello");
    assert_eq!(timeline[0].retry_count, 0);
    assert_eq!(timeline[1].sender, Sender::Assistant);
    assert_eq!(timeline[1].content, "Hi there");
    assert_eq!(timeline[1].provider.as_deref(), Some("local"));
    assert_eq!(timeline[1].model.as_deref(), Some("llama3.2"));
    assert!(timeline[0].id < timeline[1].id);

    let snapshot = timeline[1].performance.expect("assistant snapshot");
    assert!(snapshot.tokens_per_second > 0.0);
    assert!(snapshot.stream_latency_ms >= 50);
    assert_eq!(snapshot.delta_count, 2);
    assert_eq!(snapshot.total_tokens, 2);

    let events = drain(&mut events);
    assert_eq!(deltas(&events), vec!["Hi".to_string(), " there".to_string()]);
    let statuses: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ControllerEvent::StatusChanged { status } => Some(*status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            SessionStatus::Sending,
            SessionStatus::Streaming,
            SessionStatus::Completed,
            SessionStatus::Idle
        ]
    );
}

/// Committed content is the deltas in arrival order, not the completion text
#[tokio::test(start_paused = true)]
async fn test_committed_content_is_concatenated_deltas() {
    let (mut controller, _events, transport) = setup();
    transport.push_reply(ScriptedReply::Stream(vec![
        ScriptStep::Delta("one".into()),
        ScriptStep::Wait(TICK),
        ScriptStep::Delta(", two".into()),
        ScriptStep::Wait(TICK),
        ScriptStep::Delta(", three".into()),
        ScriptStep::CompleteWith("something else".into()),
    ]));

    controller.submit("count").await;
    controller.run_until_idle().await;
    assert_eq!(controller.timeline()[1].content, "one, two, three");
}

/// A completion with no deltas commits the full text
#[tokio::test(start_paused = true)]
async fn test_completion_without_deltas_uses_full_text() {
    let (mut controller, _events, transport) = setup();
    transport.push_reply(ScriptedReply::Stream(vec![ScriptStep::CompleteWith(
        "whole reply".into(),
    )]));

    controller.submit("hi").await;
    controller.run_until_idle().await;
    assert_eq!(controller.timeline()[1].content, "whole reply");
}

/// Telemetry samples are emitted while the stream is open
#[tokio::test(start_paused = true)]
async fn test_telemetry_sampled_while_streaming() {
    let (mut controller, mut events, transport) = setup();
    transport.push_reply(ScriptedReply::deltas(
        &["a", " b", " c"],
        Duration::from_millis(80),
    ));

    controller.submit("go").await;
    controller.run_until_idle().await;

    let samples = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, ControllerEvent::Telemetry { .. }))
        .count();
    assert!(samples >= 2, "expected periodic samples, got {samples}");
    assert!(controller.mean_tokens_per_second().is_some());
}

/// A zero sample interval still samples and the reply still commits
#[tokio::test(start_paused = true)]
async fn test_zero_sample_interval_keeps_sampling() {
    let (mut controller, mut events, transport) =
        setup_with(SessionConfig::default().with_sample_interval(Duration::ZERO));
    transport.push_reply(ScriptedReply::deltas(&["a", " b"], TICK));

    controller.submit("go").await;
    controller.run_until_idle().await;

    assert_eq!(controller.timeline().len(), 2);
    assert_eq!(controller.timeline()[1].content, "a b");
    let samples = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, ControllerEvent::Telemetry { .. }))
        .count();
    assert!(samples > 0, "expected samples at the minimum period");
}

/// The timeline keeps only the newest messages when bounded
#[tokio::test(start_paused = true)]
async fn test_bounded_timeline_prunes_oldest() {
    let (mut controller, _events, transport) =
        setup_with(SessionConfig::default().with_max_messages(2));
    transport.push_reply(ScriptedReply::deltas(&["first"], TICK));
    transport.push_reply(ScriptedReply::deltas(&["second"], TICK));

    controller.submit("one").await;
    controller.run_until_idle().await;
    controller.submit("two").await;
    controller.run_until_idle().await;

    let contents: Vec<_> = controller
        .timeline()
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["two", "second"]);
}

// =============================================================================
// Guards
// =============================================================================

/// A second send while streaming is rejected and the stream is untouched
#[tokio::test(start_paused = true)]
async fn test_send_while_streaming_rejected() {
    let (mut controller, _events, transport) = setup();
    transport.push_reply(ScriptedReply::hang(&["partial"], TICK));

    controller.submit("first").await;
    stream_until(&mut controller, "partial").await;

    assert_eq!(
        controller.submit("second").await,
        SendOutcome::Rejected(RejectReason::Busy)
    );
    assert_eq!(controller.status(), SessionStatus::Streaming);
    assert_eq!(controller.pending_text(), "partial");
    assert_eq!(controller.timeline().len(), 1);
    assert_eq!(transport.open_count(), 1);
    assert_eq!(
        controller.retry().await,
        SendOutcome::Rejected(RejectReason::Busy)
    );
}

/// Whitespace sends leave the timeline and status alone
#[tokio::test(start_paused = true)]
async fn test_whitespace_send_is_noop() {
    let (mut controller, mut events, transport) = setup();
    assert_eq!(
        controller.submit(" \n\t ").await,
        SendOutcome::Rejected(RejectReason::EmptyDraft)
    );
    assert_eq!(
        controller.send_draft().await,
        SendOutcome::Rejected(RejectReason::EmptyDraft)
    );
    assert!(controller.timeline().is_empty());
    assert_eq!(controller.status(), SessionStatus::Idle);
    assert_eq!(transport.open_count(), 0);
    assert!(drain(&mut events).is_empty());
}

// =============================================================================
// Abort
// =============================================================================

/// Abort discards the partial reply and commits nothing
#[tokio::test(start_paused = true)]
async fn test_abort_discards_partial_reply() {
    let (mut controller, _events, transport) = setup();
    transport.push_reply(ScriptedReply::hang(&["partial"], TICK));

    controller.submit("tell me a story").await;
    stream_until(&mut controller, "partial").await;

    assert!(controller.abort());
    assert_eq!(controller.status(), SessionStatus::Idle);
    assert_eq!(controller.pending_text(), "");
    assert_eq!(controller.timeline().len(), 1);
    assert_eq!(transport.aborts().len(), 1);
    assert!(!controller.has_pending_retry());
    assert_eq!(controller.retry_state().attempt_count, 0);

    tokio::task::yield_now().await;
    assert_eq!(transport.active_producers(), 0);

    // Second abort has nothing to cancel
    assert!(!controller.abort());

    tokio::time::sleep(Duration::from_secs(1)).await;
    controller.process_ready().await;
    assert_eq!(controller.timeline().len(), 1);
    assert_eq!(controller.status(), SessionStatus::Idle);
}

/// Events of an aborted stream never reach the next one
#[tokio::test(start_paused = true)]
async fn test_stale_events_dropped_after_abort() {
    let (mut controller, _events, transport) = setup();
    transport.push_reply(ScriptedReply::Stream(vec![
        ScriptStep::Delta("old-1".into()),
        ScriptStep::Delta("old-2".into()),
        ScriptStep::Hang,
    ]));
    transport.push_reply(ScriptedReply::deltas(&["new"], TICK));

    controller.submit("first").await;
    // Let the producer queue both deltas without applying them
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert!(controller.abort());

    controller.submit("second").await;
    controller.run_until_idle().await;

    let timeline = controller.timeline();
    assert_eq!(timeline.len(), 3);
    assert_eq!(timeline[2].content, "new");
}

// =============================================================================
// Failure and retry
// =============================================================================

/// A network error forces offline and arms a retry for 3000 ms
#[tokio::test(start_paused = true)]
async fn test_network_error_schedules_retry() {
    let (mut controller, mut events, transport) = setup();
    transport.push_reply(ScriptedReply::deltas_then_error(
        &["par"],
        TICK,
        ErrorKind::Network,
        "connection reset",
    ));

    controller.submit("X").await;
    controller.run_until_idle().await;

    assert_eq!(controller.status(), SessionStatus::Idle);
    assert!(!controller.is_online());
    assert_eq!(controller.retry_state().attempt_count, 1);
    assert_eq!(controller.retry_state().last_failed_text.as_deref(), Some("X"));
    assert!(controller.has_pending_retry());
    assert_eq!(controller.timeline().len(), 1);

    let events = drain(&mut events);
    assert!(events.contains(&ControllerEvent::ConnectivityChanged { online: false }));
    assert!(events.contains(&ControllerEvent::RetryScheduled {
        attempt: 1,
        max_attempts: 3,
        delay_ms: 3_000,
    }));
    assert!(notifications(&events)
        .iter()
        .any(|(level, kind, _)| *level == NotifyLevel::Warning && *kind == Some(ErrorKind::Network)));

    // The retry fires after the backoff even while offline
    transport.push_reply(ScriptedReply::deltas(&["ok"], TICK));
    let failed_at = Instant::now();
    while controller.timeline().len() < 2 {
        assert!(controller.step().await);
    }
    assert!(failed_at.elapsed() >= Duration::from_millis(3_000));

    controller.run_until_idle().await;
    let timeline = controller.timeline();
    assert_eq!(timeline.len(), 3);
    assert_eq!(timeline[1].content, "X");
    assert_eq!(timeline[1].retry_count, 1);
    assert_eq!(timeline[2].content, "ok");
    assert_eq!(controller.retry_state().attempt_count, 0);
    assert!(controller.retry_state().last_failed_text.is_none());
}

/// Going online fires the armed retry at once, and the timer never fires
#[tokio::test(start_paused = true)]
async fn test_online_signal_preempts_backoff() {
    let (mut controller, _events, transport) = setup();
    transport.push_reply(ScriptedReply::fail_open(ErrorKind::Network, "unreachable"));

    assert_eq!(
        controller.submit("X").await,
        SendOutcome::Failed(ErrorKind::Network)
    );
    assert!(controller.has_pending_retry());

    let failed_at = Instant::now();
    controller
        .connectivity_changed(ConnectivitySignal::BecameOnline)
        .await;
    assert!(failed_at.elapsed() < Duration::from_millis(3_000));
    assert_eq!(transport.open_count(), 2);
    assert!(!controller.has_pending_retry());

    controller.run_until_idle().await;
    assert_eq!(controller.timeline().len(), 3);

    tokio::time::sleep(Duration::from_secs(5)).await;
    controller.process_ready().await;
    assert_eq!(transport.open_count(), 2);
}

/// A new user send cancels the armed retry and resets the budget
#[tokio::test(start_paused = true)]
async fn test_user_send_cancels_pending_retry() {
    let (mut controller, _events, transport) = setup();
    transport.push_reply(ScriptedReply::fail_open(ErrorKind::Unknown, "boom"));

    controller.submit("X").await;
    assert!(controller.has_pending_retry());
    assert!(controller.is_online());

    controller.submit("Y").await;
    assert!(!controller.has_pending_retry());
    assert_eq!(controller.retry_state().attempt_count, 0);
    controller.run_until_idle().await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    controller.process_ready().await;
    assert_eq!(transport.open_count(), 2);
}

/// Three retries are the limit; the fourth failure is terminal
#[tokio::test(start_paused = true)]
async fn test_retry_budget_exhausted_after_three_attempts() {
    let (mut controller, mut events, transport) = setup();
    for _ in 0..4 {
        transport.push_reply(ScriptedReply::fail_open(ErrorKind::Network, "down"));
    }

    controller.submit("X").await;
    while controller.has_pending_retry() {
        assert!(controller.step().await);
        assert!(controller.retry_state().attempt_count <= 3);
    }

    assert_eq!(transport.open_count(), 4);
    assert_eq!(controller.retry_state().attempt_count, 3);
    assert_eq!(controller.retry_state().last_failed_text.as_deref(), Some("X"));
    assert_eq!(controller.status(), SessionStatus::Idle);

    let retry_counts: Vec<_> = controller.timeline().iter().map(|m| m.retry_count).collect();
    assert_eq!(retry_counts, vec![0, 1, 2, 3]);

    let notes = notifications(&drain(&mut events));
    let last = notes.last().expect("terminal notification");
    assert_eq!(last.0, NotifyLevel::Error);
    assert_eq!(last.1, Some(ErrorKind::Network));

    // No silent extra attempt, even once back online
    controller
        .connectivity_changed(ConnectivitySignal::BecameOnline)
        .await;
    assert_eq!(transport.open_count(), 4);
    assert_eq!(
        controller.retry().await,
        SendOutcome::Rejected(RejectReason::RetryRefused)
    );
    assert_eq!(transport.open_count(), 4);
}

/// Rate limits are never retried, automatically or manually
#[tokio::test(start_paused = true)]
async fn test_rate_limit_not_retried() {
    let (mut controller, _events, transport) = setup();
    transport.push_reply(ScriptedReply::fail_open(ErrorKind::RateLimit, "429 Too Many Requests"));

    controller.submit("X").await;
    assert!(!controller.has_pending_retry());
    assert_eq!(controller.retry_state().attempt_count, 0);
    assert!(controller.is_online());

    assert_eq!(
        controller.retry().await,
        SendOutcome::Rejected(RejectReason::RetryRefused)
    );
    assert_eq!(transport.open_count(), 1);
}

/// Provider errors suggest an alternative; manual retry spends the budget
#[tokio::test(start_paused = true)]
async fn test_provider_error_allows_manual_retry() {
    let (mut controller, mut events, transport) = setup();
    transport.push_reply(ScriptedReply::fail_open(ErrorKind::Provider, "model not found"));

    controller.submit("X").await;
    assert!(!controller.has_pending_retry());
    let notes = notifications(&drain(&mut events));
    assert!(notes
        .iter()
        .any(|(level, kind, message)| *level == NotifyLevel::Error
            && *kind == Some(ErrorKind::Provider)
            && message.contains("Cloud")));

    let outcome = controller.retry().await;
    assert!(matches!(outcome, SendOutcome::Started(_)));
    assert_eq!(controller.retry_state().attempt_count, 1);
    assert_eq!(controller.timeline().last().map(|m| m.retry_count), Some(1));

    controller.run_until_idle().await;
    assert_eq!(controller.retry_state().attempt_count, 0);
    assert_eq!(controller.timeline().len(), 3);
}

/// A stream that closes without a terminal event is a network failure
#[tokio::test(start_paused = true)]
async fn test_disconnect_treated_as_network_error() {
    let (mut controller, _events, transport) = setup();
    transport.push_reply(ScriptedReply::Stream(vec![
        ScriptStep::Wait(TICK),
        ScriptStep::Delta("half".into()),
        ScriptStep::Disconnect,
    ]));

    controller.submit("X").await;
    controller.run_until_idle().await;

    assert_eq!(controller.timeline().len(), 1);
    assert!(!controller.is_online());
    assert!(controller.has_pending_retry());
    assert_eq!(controller.retry_state().last_kind, Some(ErrorKind::Network));
}

/// Offline user sends are refused until connectivity returns
#[tokio::test(start_paused = true)]
async fn test_offline_send_refused_until_online() {
    let (mut controller, _events, transport) =
        setup_with(SessionConfig::default().with_start_online(false));

    assert!(!controller.can_send());
    assert_eq!(
        controller.submit("X").await,
        SendOutcome::Rejected(RejectReason::Offline)
    );
    assert_eq!(transport.open_count(), 0);

    controller
        .connectivity_changed(ConnectivitySignal::BecameOnline)
        .await;
    assert!(controller.can_send());
    assert!(controller.submit("X").await.is_accepted());
}

// =============================================================================
// Providers
// =============================================================================

/// Switching to an unknown, unavailable, or refusing provider changes nothing
#[tokio::test(start_paused = true)]
async fn test_failed_switch_keeps_current_provider() {
    let (mut controller, _events, transport) = setup();

    let err = assert_err!(controller.switch_provider("nope").await);
    assert_eq!(err, ProviderSwitchError::UnknownProvider("nope".into()));

    controller
        .apply_health_report(HealthReport::new(
            "cloud",
            false,
            ProviderHealth::Unhealthy,
            None,
        ))
        .await;
    let err = assert_err!(controller.switch_provider("cloud").await);
    assert_eq!(err, ProviderSwitchError::Unavailable("cloud".into()));

    controller
        .apply_health_report(HealthReport::new(
            "cloud",
            true,
            ProviderHealth::Recovering,
            Some(400),
        ))
        .await;
    transport.reject_provider("cloud");
    assert!(matches!(
        controller.switch_provider("cloud").await,
        Err(ProviderSwitchError::Rejected { .. })
    ));

    assert_eq!(
        controller.current_provider().map(|p| p.id),
        Some("local".to_string())
    );
    assert!(transport.switches().is_empty());
}

/// The in-flight stream keeps its provider; the next send uses the new one
#[tokio::test(start_paused = true)]
async fn test_switch_applies_to_next_send() {
    let (mut controller, mut events, transport) = setup();
    transport.push_reply(ScriptedReply::deltas(&["from", " local"], TICK));
    transport.push_reply(ScriptedReply::deltas(&["from cloud"], TICK));

    controller.submit("first").await;
    let record = assert_ok!(controller.switch_provider("cloud").await);
    assert_eq!(record.id, "cloud");
    controller.run_until_idle().await;

    controller.submit("second").await;
    controller.run_until_idle().await;

    let timeline = controller.timeline();
    assert_eq!(timeline[1].provider.as_deref(), Some("local"));
    assert_eq!(timeline[3].provider.as_deref(), Some("cloud"));
    assert_eq!(timeline[3].model.as_deref(), Some("large"));

    let opens = transport.opens();
    assert_eq!(opens[1].provider.as_deref(), Some("cloud"));
    assert_eq!(transport.switches(), vec!["cloud".to_string()]);
    assert!(drain(&mut events).contains(&ControllerEvent::ProviderChanged {
        provider_id: "cloud".into()
    }));
}

/// Losing the current provider fails over to the best available one
#[tokio::test(start_paused = true)]
async fn test_failover_on_unavailable_current_provider() {
    let (mut controller, mut events, _transport) = setup();

    controller
        .apply_health_report(HealthReport::new(
            "local",
            false,
            ProviderHealth::Unhealthy,
            None,
        ))
        .await;

    assert_eq!(
        controller.current_provider().map(|p| p.id),
        Some("cloud".to_string())
    );
    let events = drain(&mut events);
    assert!(events.contains(&ControllerEvent::ProviderChanged {
        provider_id: "cloud".into()
    }));
    assert!(events
        .iter()
        .any(|e| matches!(e, ControllerEvent::ProviderUpdated { record } if record.id == "local")));
}

/// Without failover an unavailable current provider blocks sends
#[tokio::test(start_paused = true)]
async fn test_no_failover_blocks_sends() {
    let (mut controller, _events, transport) =
        setup_with(SessionConfig::default().with_auto_failover(false));

    controller
        .apply_health_report(HealthReport::new(
            "local",
            false,
            ProviderHealth::Unhealthy,
            None,
        ))
        .await;

    assert_eq!(
        controller.current_provider().map(|p| p.id),
        Some("local".to_string())
    );
    assert!(!controller.can_send());
    assert_eq!(
        controller.submit("X").await,
        SendOutcome::Rejected(RejectReason::NoProvider)
    );
    assert_eq!(transport.open_count(), 0);
}

/// Health reports reach the controller through the polling feed
#[tokio::test(start_paused = true)]
async fn test_health_feed_updates_registry() {
    let (mut controller, _events, transport) = setup();
    transport.set_health(vec![HealthReport::new(
        "cloud",
        true,
        ProviderHealth::Recovering,
        Some(900),
    )]);
    controller.start_health_feed(transport.clone(), Duration::from_secs(5));

    assert!(controller.step().await);
    let cloud = controller.registry().get("cloud").expect("cloud record");
    assert_eq!(cloud.health, ProviderHealth::Recovering);
    assert_eq!(cloud.latency_ms, Some(900));
}

// =============================================================================
// Voice and commands
// =============================================================================

/// Interim "go to the", typed "ignore me", final "go to the store"
#[tokio::test(start_paused = true)]
async fn test_voice_final_result_wins_over_typing() {
    let (controller, _events, transport) = setup();
    let voice = Arc::new(SimulatedVoice::new());
    let mut controller = controller.with_voice(voice.clone());
    let handle = controller.handle();

    assert!(handle.command(Command::StartVoice));
    controller.process_ready().await;
    assert!(controller.is_recording());

    assert!(voice.interim("go to the"));
    assert!(handle.command(Command::SetDraft("ignore me".into())));
    controller.process_ready().await;
    assert_eq!(controller.draft().display(), "go to the");

    assert!(voice.finalize("go to the store"));
    controller.process_ready().await;
    assert_eq!(controller.draft().text, "go to the store");
    assert!(!controller.is_recording());

    transport.push_reply(ScriptedReply::deltas(&["ok"], TICK));
    assert!(controller.send_draft().await.is_accepted());
    assert!(controller.draft().is_blank());
    controller.run_until_idle().await;
    assert_eq!(controller.timeline()[0].content, "go to the store");
}

/// Recognition errors stop recording and keep the typed draft
#[tokio::test(start_paused = true)]
async fn test_voice_error_keeps_draft() {
    let (controller, mut events, _transport) = setup();
    let voice = Arc::new(SimulatedVoice::new());
    let mut controller = controller.with_voice(voice.clone());

    controller.set_draft("typed");
    controller.start_voice();
    assert!(voice.interim("spoken"));
    assert!(voice.fail("network"));
    controller.process_ready().await;

    assert!(!controller.is_recording());
    assert_eq!(controller.draft().display(), "typed");
    assert!(notifications(&drain(&mut events))
        .iter()
        .any(|(level, _, _)| *level == NotifyLevel::Warning));
}

/// Commands sent through the handle drive the same paths
#[tokio::test(start_paused = true)]
async fn test_handle_commands_and_shutdown() {
    let (mut controller, _events, transport) = setup();
    let handle = controller.handle();
    transport.push_reply(ScriptedReply::deltas(&["Hi"], TICK));

    assert!(handle.send_text("Hello"));
    assert!(controller.step().await);
    assert_eq!(controller.status(), SessionStatus::Streaming);
    controller.run_until_idle().await;
    assert_eq!(controller.timeline().len(), 2);

    assert!(handle.shutdown());
    assert!(!controller.step().await);
}

/// Shutdown aborts the in-flight stream
#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_stream() {
    let (mut controller, _events, transport) = setup();
    transport.push_reply(ScriptedReply::hang(&["partial"], TICK));

    controller.submit("X").await;
    stream_until(&mut controller, "partial").await;
    controller.shutdown();

    assert_eq!(transport.aborts().len(), 1);
    assert_eq!(controller.timeline().len(), 1);
    tokio::task::yield_now().await;
    assert_eq!(transport.active_producers(), 0);
}
