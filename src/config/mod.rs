//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Connection strings are wrapped in secrecy::SecretString to prevent log leaks.
//! Everything here is read-only after construction.

pub mod secrets;

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::ledger::HistoryPolicy;
use secrecy::SecretString;

const DEFAULT_TABLE: &str = "messages";
const DEFAULT_ORDERING_KEY: &str = "default";

const MAX_STORE_TIMEOUT_SECS: u64 = 300;
const MAX_DEDUP_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;
const MAX_PENDING_THRESHOLD_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    /// Overrides `database_url` for the record store.
    pub store_endpoint: Option<SecretString>,
    /// Overrides `database_url` for the queue broker.
    pub queue_endpoint: Option<SecretString>,
    pub events_table: String,
    pub queue_name: String,
    pub ordering_key: String,
    pub history_policy: HistoryPolicy,
    pub store_timeout: Duration,
    pub dedup_window: Duration,
    pub pending_threshold: Duration,
    pub bind_addr: SocketAddr,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// The slice of configuration the intake orchestrator needs.
#[derive(Debug, Clone)]
pub struct IntakeSettings {
    pub queue_name: String,
    pub ordering_key: String,
    pub history_policy: HistoryPolicy,
    pub pending_threshold: Duration,
}

impl IntakeSettings {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            ordering_key: DEFAULT_ORDERING_KEY.to_string(),
            history_policy: HistoryPolicy::default(),
            pending_threshold: Duration::from_secs(900),
        }
    }

    pub fn ordering_key(mut self, key: impl Into<String>) -> Self {
        self.ordering_key = key.into();
        self
    }

    pub fn history_policy(mut self, policy: HistoryPolicy) -> Self {
        self.history_policy = policy;
        self
    }

    pub fn pending_threshold(mut self, threshold: Duration) -> Self {
        self.pending_threshold = threshold;
        self
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| {
            var(name).ok_or_else(|| {
                Error::Config(format!("required environment variable {name} is not set"))
            })
        };

        let events_table = var("EVENTS_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string());
        validate_identifier(&events_table)?;
        let queue_name = required("QUEUE_NAME")?;
        validate_identifier(&queue_name)?;

        let history_policy = match var("HISTORY_POLICY") {
            Some(v) => v.parse()?,
            None => HistoryPolicy::default(),
        };

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| Error::Config(format!("BIND_ADDR is not a socket address: {e}")))?;

        Ok(Self {
            database_url: SecretString::from(required("DATABASE_URL")?),
            store_endpoint: var("STORE_ENDPOINT").map(SecretString::from),
            queue_endpoint: var("QUEUE_ENDPOINT").map(SecretString::from),
            events_table,
            queue_name,
            ordering_key: var("ORDERING_KEY").unwrap_or_else(|| DEFAULT_ORDERING_KEY.to_string()),
            history_policy,
            store_timeout: seconds(
                var("STORE_TIMEOUT_SECS"),
                "STORE_TIMEOUT_SECS",
                5,
                MAX_STORE_TIMEOUT_SECS,
            )?,
            dedup_window: seconds(
                var("DEDUP_WINDOW_SECS"),
                "DEDUP_WINDOW_SECS",
                300,
                MAX_DEDUP_WINDOW_SECS,
            )?,
            pending_threshold: seconds(
                var("PENDING_THRESHOLD_SECS"),
                "PENDING_THRESHOLD_SECS",
                900,
                MAX_PENDING_THRESHOLD_SECS,
            )?,
            bind_addr,
            otel_endpoint: var("OTEL_ENDPOINT"),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Connection string for the record store.
    pub fn store_url(&self) -> &SecretString {
        self.store_endpoint.as_ref().unwrap_or(&self.database_url)
    }

    /// Connection string for the queue broker.
    pub fn queue_url(&self) -> &SecretString {
        self.queue_endpoint.as_ref().unwrap_or(&self.database_url)
    }

    pub fn intake_settings(&self) -> IntakeSettings {
        IntakeSettings::new(&self.queue_name)
            .ordering_key(&self.ordering_key)
            .history_policy(self.history_policy)
            .pending_threshold(self.pending_threshold)
    }
}

fn seconds(value: Option<String>, name: &str, default: u64, max: u64) -> Result<Duration> {
    let Some(v) = value else {
        return Ok(Duration::from_secs(default));
    };
    let secs = v
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{name} must be a whole number of seconds")))?;
    if secs > max {
        return Err(Error::Config(format!("{name} must be at most {max} seconds")));
    }
    Ok(Duration::from_secs(secs))
}

/// Table and queue names are spliced into SQL, so only plain identifiers pass.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_start && valid_rest && name.len() <= 48 {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}
