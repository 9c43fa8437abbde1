//! Provider Routing
//!
//! Which provider the next send goes to, and how healthy each one is.
//!
//! - [`health`]: the provider registry and its record types
//! - [`feed`]: periodic polling of a health source into the controller

pub mod feed;
pub mod health;

pub use feed::HealthPoller;
pub use health::{
    HealthIndicator, HealthReport, ProviderHealth, ProviderRecord, ProviderRegistry,
    SLOW_LATENCY_MS,
};
