//! Conductor Console
//!
//! Line-oriented surface for the session controller, backed by the simulated
//! transport and simulated voice input.
//!
//! # Usage
//!
//! ```bash
//! # Echo replies, word by word
//! conductor-console
//!
//! # Inject network failures into a third of the sends
//! conductor-console --fail-rate 0.33
//!
//! # Custom config file, verbose controller logs
//! conductor-console --config ./conductor.toml --log-level debug
//! ```
//!
//! # Commands
//!
//! Plain text is sent as a message. Slash commands:
//!
//! - `/abort`, `/retry`
//! - `/provider <id>`, `/providers`
//! - `/online`, `/offline`
//! - `/voice start|stop`, `/say <interim>|<final>`
//! - `/draft <text>`, `/send`
//! - `/timeline`, `/help`, `/quit`

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use stream_conductor::{
    load_config_from_path, ConfigOverrides, ConnectivitySignal, ControllerEvent, ControllerInput,
    HealthReport, Message, NotifyLevel, ProviderRegistry, SendOutcome, Sender, SessionController,
    SimulatedTransport, SimulatedVoice,
};

/// Conductor Console - interactive surface for the streaming session controller
#[derive(Parser, Debug)]
#[command(name = "conductor-console")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CONDUCTOR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Provider to select at startup
    #[arg(short = 'p', long, value_name = "ID")]
    provider: Option<String>,

    /// Probability (0.0 to 1.0) that a send fails with a network error
    #[arg(long, default_value_t = 0.0)]
    fail_rate: f64,

    /// Delay between simulated reply words
    #[arg(long, value_name = "MS", default_value_t = 60)]
    echo_delay_ms: u64,

    /// Start with connectivity offline
    #[arg(long)]
    offline: bool,

    /// Do not fail over when the current provider becomes unavailable
    #[arg(long)]
    no_failover: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CONDUCTOR_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so the conversation on stdout stays readable.
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| {
            tracing_subscriber::EnvFilter::try_new(format!(
                "conductor_console={level},stream_conductor={level}"
            ))
        })
        .with_context(|| format!("Invalid log level: {level}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// What woke the main loop
enum Next {
    Input(ControllerInput),
    Line(Option<std::io::Result<String>>),
    Event(ControllerEvent),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut config =
        load_config_from_path(args.config.clone()).context("Failed to load configuration")?;
    let mut overrides = ConfigOverrides::new().with_start_offline(args.offline);
    if let Some(provider) = args.provider.clone() {
        overrides = overrides.with_default_provider(provider);
    }
    if args.no_failover {
        overrides = overrides.with_auto_failover(false);
    }
    overrides
        .apply(&mut config)
        .context("Invalid command-line overrides")?;
    info!(source = ?config.source(), path = ?config.config_file_path, "Configuration loaded");

    let registry = Arc::new(ProviderRegistry::new());
    registry.seed(config.providers.iter().cloned());

    let transport = Arc::new(
        SimulatedTransport::new()
            .with_fail_rate(args.fail_rate.clamp(0.0, 1.0))
            .with_echo_delay(Duration::from_millis(args.echo_delay_ms)),
    );
    transport.set_health(
        config
            .providers
            .iter()
            .map(|p| HealthReport::new(p.id.clone(), p.available, p.health, p.latency_ms))
            .collect(),
    );
    let voice = Arc::new(SimulatedVoice::new());

    let (controller, mut events) =
        SessionController::new(transport.clone(), registry, config.session.clone());
    let mut controller = controller.with_voice(voice.clone());
    if let Some(interval) = config.health_poll_interval {
        controller.start_health_feed(transport, interval);
    }

    print_help();
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());

    loop {
        let next = tokio::select! {
            input = controller.next_input() => Next::Input(input),
            line = lines.next() => Next::Line(line),
            Some(event) = events.recv() => Next::Event(event),
        };

        match next {
            Next::Input(input) => {
                if !controller.process(input).await {
                    break;
                }
            }
            Next::Event(event) => render(&event),
            Next::Line(Some(Ok(line))) => {
                if !run_command(&mut controller, &voice, &line).await {
                    break;
                }
            }
            Next::Line(Some(Err(e))) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
            Next::Line(None) => {
                // Piped input ran out; let the last reply finish
                controller.run_until_idle().await;
                break;
            }
        }
    }

    controller.shutdown();
    while let Ok(event) = events.try_recv() {
        render(&event);
    }
    info!("Console exiting");
    Ok(())
}

/// Execute one line of input; returns `false` to quit
async fn run_command(
    controller: &mut SessionController<SimulatedTransport>,
    voice: &SimulatedVoice,
    line: &str,
) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return true;
    }
    let Some(rest) = line.strip_prefix('/') else {
        report(controller.submit(line).await);
        return true;
    };
    let (command, arg) = rest
        .split_once(' ')
        .map_or((rest, ""), |(c, a)| (c, a.trim()));

    match command {
        "abort" => {
            if !controller.abort() {
                println!("Nothing to abort.");
            }
        }
        "retry" => report(controller.retry().await),
        "provider" if !arg.is_empty() => {
            // Failures surface as notifications
            let _ = controller.switch_provider(arg).await;
        }
        "providers" => print_providers(controller),
        "online" => {
            controller
                .connectivity_changed(ConnectivitySignal::BecameOnline)
                .await;
        }
        "offline" => {
            controller
                .connectivity_changed(ConnectivitySignal::BecameOffline)
                .await;
        }
        "voice" if arg == "start" => controller.start_voice(),
        "voice" if arg == "stop" => controller.stop_voice(),
        "say" if !arg.is_empty() => {
            if !voice.is_capturing() {
                controller.start_voice();
            }
            let (interim, fin) = match arg.split_once('|') {
                Some((interim, fin)) => (interim.trim(), Some(fin.trim())),
                None => (arg, None),
            };
            voice.interim(interim);
            if let Some(fin) = fin {
                voice.finalize(fin);
            }
            controller.process_ready().await;
        }
        "draft" => controller.set_draft(arg),
        "send" => report(controller.send_draft().await),
        "timeline" => match serde_json::to_string_pretty(controller.timeline()) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!(error = %e, "Failed to serialize timeline"),
        },
        "help" => print_help(),
        "quit" | "exit" => return false,
        _ => println!("Unknown command: {line}. Type /help for commands."),
    }
    true
}

fn report(outcome: SendOutcome) {
    if let SendOutcome::Rejected(reason) = outcome {
        println!("(not sent: {reason:?})");
    }
}

fn print_providers(controller: &SessionController<SimulatedTransport>) {
    let current = controller.registry().current();
    for record in controller.registry().all() {
        let marker = if current.as_deref() == Some(record.id.as_str()) {
            '*'
        } else {
            ' '
        };
        let latency = record
            .latency_ms
            .map_or_else(|| "-".to_string(), |ms| format!("{ms} ms"));
        println!(
            "{marker} {:<10} {:<16} {:?} {:?} {latency}",
            record.id,
            record.display_name,
            record.indicator(),
            record.health
        );
    }
}

fn print_help() {
    println!("Type a message to send it, or a command:");
    println!("  /abort  /retry  /provider <id>  /providers  /online  /offline");
    println!("  /voice start|stop  /say <interim>|<final>  /draft <text>  /send");
    println!("  /timeline  /help  /quit");
}

fn render(event: &ControllerEvent) {
    let mut stdout = std::io::stdout();
    match event {
        ControllerEvent::StreamStarted { provider, .. } => {
            print!("{}> ", provider.as_deref().unwrap_or("assistant"));
        }
        ControllerEvent::Delta { text, .. } => print!("{text}"),
        ControllerEvent::MessageCommitted { message } => render_commit(message),
        ControllerEvent::Notify { level, message, .. } => {
            let tag = match level {
                NotifyLevel::Info => "info",
                NotifyLevel::Warning => "warn",
                NotifyLevel::Error => "error",
                NotifyLevel::Success => "ok",
            };
            println!("\n[{tag}] {message}");
        }
        ControllerEvent::ConnectivityChanged { online } => {
            println!("[{}]", if *online { "online" } else { "offline" });
        }
        ControllerEvent::ProviderChanged { provider_id } => println!("[provider: {provider_id}]"),
        ControllerEvent::DraftChanged { text, preview } => match preview {
            Some(preview) => println!("draft: {text} ({preview}...)"),
            None => println!("draft: {text}"),
        },
        ControllerEvent::VoiceStateChanged { recording } => {
            println!("[voice {}]", if *recording { "on" } else { "off" });
        }
        ControllerEvent::StatusChanged { .. }
        | ControllerEvent::Telemetry { .. }
        | ControllerEvent::RetryScheduled { .. }
        | ControllerEvent::ProviderUpdated { .. } => {}
    }
    let _ = stdout.flush();
}

fn render_commit(message: &Message) {
    if message.sender != Sender::Assistant {
        return;
    }
    match &message.performance {
        Some(perf) => println!(
            "\n  ({:.1} tok/s, first token {} ms, {} ms total)",
            perf.tokens_per_second, perf.stream_latency_ms, perf.render_time_ms
        ),
        None => println!(),
    }
}
