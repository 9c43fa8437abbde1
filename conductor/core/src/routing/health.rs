//! Provider Health Registry
//!
//! Authoritative availability, health, and latency for every known provider,
//! plus the id of the provider the next send will go to.
//!
//! # Thread Safety
//!
//! Records live in a `DashMap` and the current selection behind a
//! `parking_lot::RwLock`, so a surface can read the registry while the
//! controller applies health reports. Only the controller writes.
//!
//! # Switching
//!
//! ```text
//!  switch("x") ──▶ record exists? ──no──▶ UnknownProvider
//!                        │yes
//!                        ▼
//!                  available? ──no──▶ Unavailable
//!                        │yes
//!                        ▼
//!                  current = "x"   (next send only)
//! ```
//!
//! A stream that is already open keeps the provider it was opened with.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ProviderSwitchError;

/// Latency above which a healthy provider is shown as degraded
pub const SLOW_LATENCY_MS: u64 = 2_000;

// ============================================================================
// Health Types
// ============================================================================

/// Coarse health of a provider as reported by the health feed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderHealth {
    /// Answering normally
    Healthy,
    /// Coming back after a failure
    Recovering,
    /// Failing
    Unhealthy,
    /// No recent report
    #[default]
    Unknown,
}

impl ProviderHealth {
    /// Ordering key used when ranking alternatives (lower is better)
    #[must_use]
    fn rank(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Recovering => 1,
            Self::Unknown => 2,
            Self::Unhealthy => 3,
        }
    }
}

/// Color class a surface uses for a provider badge
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthIndicator {
    /// Healthy and responsive
    Green,
    /// Recovering or slow
    Yellow,
    /// Unhealthy or unavailable
    Red,
    /// Nothing known
    Gray,
}

/// Per-provider record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRecord {
    /// Provider id
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// Whether sends may be routed here
    pub available: bool,
    /// Last reported health
    pub health: ProviderHealth,
    /// Last observed latency
    pub latency_ms: Option<u64>,
    /// Model this provider serves
    pub model: Option<String>,
}

impl ProviderRecord {
    /// Create an available provider with unknown health
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            available: true,
            health: ProviderHealth::Unknown,
            latency_ms: None,
            model: None,
        }
    }

    /// Set the served model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the reported health
    #[must_use]
    pub fn with_health(mut self, health: ProviderHealth) -> Self {
        self.health = health;
        self
    }

    /// Set the availability flag
    #[must_use]
    pub fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Set the observed latency
    #[must_use]
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Derived badge color
    #[must_use]
    pub fn indicator(&self) -> HealthIndicator {
        if !self.available {
            return HealthIndicator::Red;
        }
        match self.health {
            ProviderHealth::Healthy => match self.latency_ms {
                Some(ms) if ms > SLOW_LATENCY_MS => HealthIndicator::Yellow,
                _ => HealthIndicator::Green,
            },
            ProviderHealth::Recovering => HealthIndicator::Yellow,
            ProviderHealth::Unhealthy => HealthIndicator::Red,
            ProviderHealth::Unknown => HealthIndicator::Gray,
        }
    }
}

/// One report from the health feed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Provider the report is about
    pub provider_id: String,
    /// Availability flag
    pub available: bool,
    /// Coarse health
    pub health: ProviderHealth,
    /// Observed latency
    pub latency_ms: Option<u64>,
}

impl HealthReport {
    /// Build a report
    pub fn new(
        provider_id: impl Into<String>,
        available: bool,
        health: ProviderHealth,
        latency_ms: Option<u64>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            available,
            health,
            latency_ms,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Provider records plus the current selection
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    records: DashMap<String, ProviderRecord>,
    current: RwLock<Option<String>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed records; the first available one becomes current if nothing is
    /// selected yet
    pub fn seed(&self, records: impl IntoIterator<Item = ProviderRecord>) {
        for record in records {
            self.records.insert(record.id.clone(), record);
        }
        let mut current = self.current.write();
        if current.is_none() {
            *current = self.ranked(None).into_iter().next().map(|r| r.id);
        }
    }

    /// Apply a health report, inserting unknown providers
    ///
    /// Returns the updated record and whether its availability flipped.
    pub fn apply_report(&self, report: &HealthReport) -> (ProviderRecord, bool) {
        let mut entry = self
            .records
            .entry(report.provider_id.clone())
            .or_insert_with(|| {
                ProviderRecord::new(report.provider_id.clone(), report.provider_id.clone())
            });
        let was_available = entry.available;
        entry.available = report.available;
        entry.health = report.health;
        if report.latency_ms.is_some() {
            entry.latency_ms = report.latency_ms;
        }
        let record = entry.clone();
        drop(entry);

        let flipped = was_available != record.available;
        if flipped {
            tracing::info!(
                provider = %record.id,
                available = record.available,
                health = ?record.health,
                "Provider availability changed"
            );
        } else {
            tracing::debug!(provider = %record.id, health = ?record.health, "Health report applied");
        }
        (record, flipped)
    }

    /// Record for `id`
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ProviderRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    /// Every record, sorted by id
    #[must_use]
    pub fn all(&self) -> Vec<ProviderRecord> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Available records, sorted by id
    #[must_use]
    pub fn available(&self) -> Vec<ProviderRecord> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.available)
            .map(|r| r.clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Check that `id` exists and is available
    pub fn validate_switch(&self, id: &str) -> Result<ProviderRecord, ProviderSwitchError> {
        let record = self
            .get(id)
            .ok_or_else(|| ProviderSwitchError::UnknownProvider(id.to_string()))?;
        if !record.available {
            return Err(ProviderSwitchError::Unavailable(id.to_string()));
        }
        Ok(record)
    }

    /// Validate and select `id` as the current provider
    ///
    /// On error the current provider is left untouched.
    pub fn set_current(&self, id: &str) -> Result<ProviderRecord, ProviderSwitchError> {
        let record = self.validate_switch(id)?;
        *self.current.write() = Some(record.id.clone());
        Ok(record)
    }

    /// Currently selected provider id
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.current.read().clone()
    }

    /// Record of the currently selected provider
    #[must_use]
    pub fn current_record(&self) -> Option<ProviderRecord> {
        self.current().and_then(|id| self.get(&id))
    }

    /// Whether the current provider exists and is available
    #[must_use]
    pub fn current_available(&self) -> bool {
        self.current_record().is_some_and(|r| r.available)
    }

    /// Best available provider other than `exclude`, by health then latency
    #[must_use]
    pub fn best_alternative(&self, exclude: Option<&str>) -> Option<ProviderRecord> {
        self.ranked(exclude).into_iter().next()
    }

    /// Badge color for `id`; gray when unknown
    #[must_use]
    pub fn health_indicator(&self, id: &str) -> HealthIndicator {
        self.get(id)
            .map_or(HealthIndicator::Gray, |r| r.indicator())
    }

    fn ranked(&self, exclude: Option<&str>) -> Vec<ProviderRecord> {
        let mut candidates: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.available && Some(r.id.as_str()) != exclude)
            .map(|r| r.clone())
            .collect();
        candidates.sort_by(|a, b| {
            a.health
                .rank()
                .cmp(&b.health.rank())
                .then(a.latency_ms.unwrap_or(u64::MAX).cmp(&b.latency_ms.unwrap_or(u64::MAX)))
                .then(a.id.cmp(&b.id))
        });
        candidates
    }
}
