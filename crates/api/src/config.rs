//! Application configuration loaded from environment variables.

use std::time::Duration;

use order_saga::{CoordinatorOptions, NotifyPolicy};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL event store; unset keeps events in memory
/// - `SHIPMENT_URL`, `INVOICE_URL`: participant base URLs; unset uses
///   in-memory participants
/// - `NOTIFY_TIMEOUT_MS`: per-call participant timeout (default: `5000`)
/// - `NOTIFY_MAX_RETRIES`: retries of a failed participant call (default: `0`)
/// - `CONFLICT_MAX_RETRIES`: retries of a command after a concurrency
///   conflict (default: `5`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub shipment_url: Option<String>,
    pub invoice_url: Option<String>,
    pub notify_timeout: Duration,
    pub notify_max_retries: usize,
    pub conflict_max_retries: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or(defaults.log_format),
            database_url: non_empty("DATABASE_URL"),
            shipment_url: non_empty("SHIPMENT_URL"),
            invoice_url: non_empty("INVOICE_URL"),
            notify_timeout: lookup("NOTIFY_TIMEOUT_MS")
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.notify_timeout),
            notify_max_retries: lookup("NOTIFY_MAX_RETRIES")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.notify_max_retries),
            conflict_max_retries: lookup("CONFLICT_MAX_RETRIES")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.conflict_max_retries),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            conflict_retries: self.conflict_max_retries,
            notify: NotifyPolicy {
                timeout: self.notify_timeout,
                max_retries: self.notify_max_retries,
                ..NotifyPolicy::default()
            },
            ..CoordinatorOptions::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            shipment_url: None,
            invoice_url: None,
            notify_timeout: Duration::from_millis(5000),
            notify_max_retries: 0,
            conflict_max_retries: 5,
        }
    }
}
