//! Configuration management for the task pipeline.
//!
//! Configuration can be set via environment variables:
//! - `DATABASE_URL` - Optional. Task store location. `memory` for a non-persistent
//!   store, otherwise a SQLite path (`sqlite://data/tasks.db` or a bare path).
//!   Defaults to `sqlite://data/tasks.db`.
//! - `BROKER_URL` - Optional. Address of the cache/broadcast service.
//!   Defaults to `memory://` (the in-process broker, the only one built in).
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `SUMMARY_TTL_SECS` - Optional. Summary snapshot lifetime. Defaults to `60`.
//! - `TASK_PAGE_SIZE` - Optional. Maximum tasks returned by a listing. Defaults to `100`.
//! - `DISPATCH_MODE` - Optional. `broadcast` (fan-out to every consumer) or
//!   `queue` (single delivery across consumers). Defaults to `broadcast`.
//! - `CONSUMER_ENABLED` - Optional. Run the enrichment consumer in-process. Defaults to `true`.
//! - `ENRICH_DELAY_MS` - Optional. Base simulated enrichment latency. Defaults to `500`.
//! - `ENRICH_JITTER_MS` - Optional. Random latency added on top of the base. Defaults to `250`.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::store::TaskStoreType;
use crate::util::parse_bool;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Unsupported broker address {0}: only memory:// is available")]
    UnsupportedBroker(String),
}

/// How task-created events reach consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Every subscribed consumer receives every event; events published with
    /// no subscriber are lost.
    #[default]
    Broadcast,
    /// Each event is handed to exactly one attached consumer.
    Queue,
}

impl FromStr for DispatchMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "broadcast" | "pubsub" => Ok(Self::Broadcast),
            "queue" | "work_queue" => Ok(Self::Queue),
            other => Err(ConfigError::InvalidValue(
                "DISPATCH_MODE".to_string(),
                other.to_string(),
            )),
        }
    }
}

/// Simulated enrichment latency.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    pub base_delay: Duration,
    pub jitter: Duration,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            jitter: Duration::from_millis(250),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Task store connection string
    pub database_url: String,

    /// Cache/broadcast service address
    pub broker_url: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Lifetime of the cached summary snapshot
    pub summary_ttl: Duration,

    /// Maximum number of tasks returned by a listing
    pub page_size: usize,

    pub dispatch_mode: DispatchMode,

    /// Whether this process runs the enrichment consumer
    pub consumer_enabled: bool,

    pub enrich: EnrichConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/tasks.db".to_string(),
            broker_url: "memory://".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            summary_ttl: Duration::from_secs(60),
            page_size: 100,
            dispatch_mode: DispatchMode::Broadcast,
            consumer_enabled: true,
            enrich: EnrichConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric or enumerated variable
    /// cannot be parsed, and `ConfigError::UnsupportedBroker` for a broker
    /// address other than the in-process one.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from any variable source.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = lookup("DATABASE_URL").unwrap_or(defaults.database_url);

        let broker_url = lookup("BROKER_URL").unwrap_or(defaults.broker_url);
        if !broker_url.starts_with("memory") {
            return Err(ConfigError::UnsupportedBroker(broker_url));
        }

        let host = lookup("HOST").unwrap_or(defaults.host);

        let port = parse_var(&lookup, "PORT", defaults.port)?;
        let summary_ttl = Duration::from_secs(parse_var(&lookup, "SUMMARY_TTL_SECS", 60u64)?);
        let page_size = parse_var(&lookup, "TASK_PAGE_SIZE", defaults.page_size)?;

        let dispatch_mode = match lookup("DISPATCH_MODE") {
            Some(value) => value.parse()?,
            None => DispatchMode::default(),
        };

        let enrich = EnrichConfig {
            base_delay: Duration::from_millis(parse_var(&lookup, "ENRICH_DELAY_MS", 500u64)?),
            jitter: Duration::from_millis(parse_var(&lookup, "ENRICH_JITTER_MS", 250u64)?),
        };

        let config = Self {
            database_url,
            broker_url,
            host,
            port,
            summary_ttl,
            page_size,
            dispatch_mode,
            consumer_enabled: lookup("CONSUMER_ENABLED")
                .map(|value| parse_bool(&value))
                .unwrap_or(defaults.consumer_enabled),
            enrich,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that parse but cannot run.
    ///
    /// A work queue with no in-process consumer would only accumulate
    /// messages, since no other process can attach to the in-process broker.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "TASK_PAGE_SIZE".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if self.dispatch_mode == DispatchMode::Queue && !self.consumer_enabled {
            return Err(ConfigError::InvalidValue(
                "DISPATCH_MODE".to_string(),
                "queue requires CONSUMER_ENABLED=true".to_string(),
            ));
        }
        Ok(())
    }

    /// Create an in-memory configuration (useful for testing).
    pub fn in_memory() -> Self {
        Self {
            database_url: "memory".to_string(),
            ..Self::default()
        }
    }

    pub fn store_type(&self) -> TaskStoreType {
        TaskStoreType::from_url(&self.database_url)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}
