//! TOML Configuration File Support
//!
//! Centralized configuration loading for the session controller, supporting a
//! TOML file at `~/.config/stream-conductor/conductor.toml`.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! The retry budget (3 attempts) and backoff (3000 ms) are fixed and have no
//! configuration key.
//!
//! # Example Configuration
//!
//! ```toml
//! [session]
//! default_provider = "local"
//! auto_failover = true
//! max_messages = 500
//! start_online = true
//!
//! [telemetry]
//! sample_interval_ms = 100
//! window = 32
//!
//! [health]
//! poll_interval_ms = 5000
//!
//! [[providers]]
//! id = "local"
//! display_name = "Local"
//! model = "llama3.2"
//!
//! [[providers]]
//! id = "cloud"
//! display_name = "Cloud"
//! available = false
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::ProviderRecord;
use crate::streaming::telemetry::{DEFAULT_SAMPLE_INTERVAL, DEFAULT_WINDOW};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[session]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Provider selected at startup
    pub default_provider: Option<String>,

    /// Switch away from a provider that becomes unavailable
    pub auto_failover: Option<bool>,

    /// Timeline bound (0 = unlimited)
    pub max_messages: Option<usize>,

    /// Initial connectivity flag
    pub start_online: Option<bool>,
}

/// `[telemetry]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryToml {
    /// Sampling interval while streaming
    pub sample_interval_ms: Option<u64>,

    /// Number of samples kept for averaging
    pub window: Option<usize>,
}

/// `[health]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthToml {
    /// Health feed poll interval (0 = no polling)
    pub poll_interval_ms: Option<u64>,
}

/// One `[[providers]]` entry
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToml {
    /// Provider id
    pub id: String,

    /// Human-readable name (defaults to the id)
    pub display_name: Option<String>,

    /// Served model
    pub model: Option<String>,

    /// Initial availability (defaults to true)
    pub available: Option<bool>,
}

impl ProviderToml {
    fn to_record(&self) -> ProviderRecord {
        let name = self.display_name.clone().unwrap_or_else(|| self.id.clone());
        let mut record = ProviderRecord::new(self.id.clone(), name)
            .with_available(self.available.unwrap_or(true));
        if let Some(model) = &self.model {
            record = record.with_model(model.clone());
        }
        record
    }
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorToml {
    /// Session section
    pub session: SessionToml,

    /// Telemetry section
    pub telemetry: TelemetryToml,

    /// Health section
    pub health: HealthToml,

    /// Provider seeds
    pub providers: Vec<ProviderToml>,
}

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Settings consumed by the session controller
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Interval between telemetry samples while streaming
    pub sample_interval: Duration,

    /// Number of samples kept for averaging
    pub telemetry_window: usize,

    /// Switch away from a provider that becomes unavailable
    pub auto_failover: bool,

    /// Timeline bound (0 = unlimited)
    pub max_messages: usize,

    /// Provider selected at startup
    pub default_provider: Option<String>,

    /// Initial connectivity flag
    pub start_online: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            telemetry_window: DEFAULT_WINDOW,
            auto_failover: true,
            max_messages: 0,
            default_provider: None,
            start_online: true,
        }
    }
}

impl SessionConfig {
    /// Set the sampling interval
    #[must_use]
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Set the telemetry window
    #[must_use]
    pub fn with_telemetry_window(mut self, window: usize) -> Self {
        self.telemetry_window = window;
        self
    }

    /// Enable or disable failover
    #[must_use]
    pub fn with_auto_failover(mut self, enabled: bool) -> Self {
        self.auto_failover = enabled;
        self
    }

    /// Bound the timeline
    #[must_use]
    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = max;
        self
    }

    /// Select a provider at startup
    #[must_use]
    pub fn with_default_provider(mut self, id: impl Into<String>) -> Self {
        self.default_provider = Some(id.into());
        self
    }

    /// Set the initial connectivity flag
    #[must_use]
    pub fn with_start_online(mut self, online: bool) -> Self {
        self.start_online = online;
        self
    }
}

/// Centralized configuration
///
/// Use [`load_config`] to load with proper priority handling.
#[derive(Clone, Debug)]
pub struct ConductorConfigFile {
    /// Controller settings
    pub session: SessionConfig,

    /// Health feed poll interval (`None` = no polling)
    pub health_poll_interval: Option<Duration>,

    /// Provider seeds for the registry
    pub providers: Vec<ProviderRecord>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ConductorConfigFile {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            health_poll_interval: Some(Duration::from_secs(5)),
            providers: vec![
                ProviderRecord::new("local", "Local").with_model("llama3.2"),
                ProviderRecord::new("cloud", "Cloud").with_model("large"),
            ],
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ConductorConfigFile {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Reject values the controller cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.sample_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "telemetry sample interval must be non-zero".into(),
            ));
        }
        if self.session.telemetry_window == 0 {
            return Err(ConfigError::ValidationError(
                "telemetry window must hold at least one sample".into(),
            ));
        }
        if let Some(id) = &self.session.default_provider {
            if !self.providers.iter().any(|p| &p.id == id) {
                return Err(ConfigError::ValidationError(format!(
                    "default provider '{id}' is not configured"
                )));
            }
        }
        if let Some(p) = self.providers.iter().find(|p| p.id.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "provider '{}' has an empty id",
                p.display_name
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/stream-conductor/conductor.toml` or
/// `~/.config/stream-conductor/conductor.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("stream-conductor").join("conductor.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// result fails validation. A missing file is not an error.
pub fn load_config() -> Result<ConductorConfigFile, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or the result fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ConductorConfigFile, ConfigError> {
    let mut config = ConductorConfigFile::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ConductorToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok());
    config.validate()?;

    Ok(config)
}

fn apply_toml_config(config: &mut ConductorConfigFile, toml: &ConductorToml) {
    // Session
    if toml.session.default_provider.is_some() {
        config.session.default_provider = toml.session.default_provider.clone();
    }
    if let Some(enabled) = toml.session.auto_failover {
        config.session.auto_failover = enabled;
    }
    if let Some(max) = toml.session.max_messages {
        config.session.max_messages = max;
    }
    if let Some(online) = toml.session.start_online {
        config.session.start_online = online;
    }

    // Telemetry
    if let Some(ms) = toml.telemetry.sample_interval_ms {
        config.session.sample_interval = Duration::from_millis(ms);
    }
    if let Some(window) = toml.telemetry.window {
        config.session.telemetry_window = window;
    }

    // Health
    if let Some(ms) = toml.health.poll_interval_ms {
        config.health_poll_interval = poll_interval(ms);
    }

    // Providers replace the defaults wholesale
    if !toml.providers.is_empty() {
        config.providers = toml.providers.iter().map(ProviderToml::to_record).collect();
    }
}

/// Apply `CONDUCTOR_*` overrides read through `lookup`
fn apply_env_config<F>(config: &mut ConductorConfigFile, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(provider) = lookup("CONDUCTOR_DEFAULT_PROVIDER") {
        config.session.default_provider = Some(provider);
        config.source = ConfigSource::Env;
    }

    if let Some(ms) = lookup("CONDUCTOR_SAMPLE_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.session.sample_interval = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }

    if let Some(window) = lookup("CONDUCTOR_TELEMETRY_WINDOW").and_then(|v| v.parse::<usize>().ok()) {
        config.session.telemetry_window = window;
        config.source = ConfigSource::Env;
    }

    if let Some(enabled) = lookup("CONDUCTOR_AUTO_FAILOVER") {
        config.session.auto_failover = enabled != "0" && enabled.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }

    if let Some(max) = lookup("CONDUCTOR_MAX_MESSAGES").and_then(|v| v.parse::<usize>().ok()) {
        config.session.max_messages = max;
        config.source = ConfigSource::Env;
    }

    if let Some(ms) = lookup("CONDUCTOR_HEALTH_POLL_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.health_poll_interval = poll_interval(ms);
        config.source = ConfigSource::Env;
    }
}

fn poll_interval(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Default provider override
    pub default_provider: Option<String>,

    /// Sample interval override (milliseconds)
    pub sample_interval_ms: Option<u64>,

    /// Auto failover override
    pub auto_failover: Option<bool>,

    /// Timeline bound override
    pub max_messages: Option<usize>,

    /// Start offline
    pub start_offline: bool,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set default provider override
    #[must_use]
    pub fn with_default_provider(mut self, provider: String) -> Self {
        self.default_provider = Some(provider);
        self
    }

    /// Set sample interval override
    #[must_use]
    pub fn with_sample_interval_ms(mut self, ms: u64) -> Self {
        self.sample_interval_ms = Some(ms);
        self
    }

    /// Set auto failover override
    #[must_use]
    pub fn with_auto_failover(mut self, enabled: bool) -> Self {
        self.auto_failover = Some(enabled);
        self
    }

    /// Set timeline bound override
    #[must_use]
    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = Some(max);
        self
    }

    /// Start with connectivity offline
    #[must_use]
    pub fn with_start_offline(mut self, offline: bool) -> Self {
        self.start_offline = offline;
        self
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns a validation error if the overridden configuration is unusable.
    pub fn apply(&self, config: &mut ConductorConfigFile) -> Result<(), ConfigError> {
        if self.default_provider.is_some()
            || self.sample_interval_ms.is_some()
            || self.auto_failover.is_some()
            || self.max_messages.is_some()
            || self.start_offline
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref provider) = self.default_provider {
            config.session.default_provider = Some(provider.clone());
        }
        if let Some(ms) = self.sample_interval_ms {
            config.session.sample_interval = Duration::from_millis(ms);
        }
        if let Some(enabled) = self.auto_failover {
            config.session.auto_failover = enabled;
        }
        if let Some(max) = self.max_messages {
            config.session.max_messages = max;
        }
        if self.start_offline {
            config.session.start_online = false;
        }
        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
