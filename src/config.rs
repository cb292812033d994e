//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::bus::PgBusConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Balance store and bus log database
    pub database_url: String,

    /// Ledger store database (defaults to `database_url`)
    pub ledger_database_url: String,

    /// Maximum database connections per pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    pub bus_consumer_group: String,
    pub bus_poll_interval: Duration,
    pub bus_batch_size: i64,

    /// Pause after a failed bus read
    pub bus_read_backoff: Duration,

    /// Capacity of each subscriber queue
    pub subscriber_queue_capacity: usize,

    /// Worker loops per subscriber queue
    pub handler_workers: usize,

    /// Reconciliation period, `None` when disabled
    pub reconcile_interval: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;
        let ledger_database_url =
            lookup("LEDGER_DATABASE_URL").unwrap_or_else(|| database_url.clone());

        let subscriber_queue_capacity: usize = parse_or(&lookup, "SUBSCRIBER_QUEUE_CAPACITY", 100)?;
        if subscriber_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("SUBSCRIBER_QUEUE_CAPACITY"));
        }

        let handler_workers: usize = parse_or(&lookup, "HANDLER_WORKERS", 1)?;
        if handler_workers == 0 {
            return Err(ConfigError::InvalidValue("HANDLER_WORKERS"));
        }

        let bus_batch_size: i64 = parse_or(&lookup, "BUS_BATCH_SIZE", 100)?;
        if bus_batch_size <= 0 {
            return Err(ConfigError::InvalidValue("BUS_BATCH_SIZE"));
        }

        let reconcile_secs: u64 = parse_or(&lookup, "RECONCILE_INTERVAL_SECS", 300)?;

        Ok(Self {
            database_url,
            ledger_database_url,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&lookup, "PORT", 3000)?,
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            bus_consumer_group: lookup("BUS_CONSUMER_GROUP")
                .unwrap_or_else(|| "ledger-consumer".to_string()),
            bus_poll_interval: Duration::from_millis(parse_or(&lookup, "BUS_POLL_INTERVAL_MS", 200)?),
            bus_batch_size,
            bus_read_backoff: Duration::from_millis(parse_or(&lookup, "BUS_READ_BACKOFF_MS", 100)?),
            subscriber_queue_capacity,
            handler_workers,
            reconcile_interval: (reconcile_secs > 0).then(|| Duration::from_secs(reconcile_secs)),
        })
    }

    /// Whether the ledger store lives in its own database
    pub fn has_separate_ledger_database(&self) -> bool {
        self.ledger_database_url != self.database_url
    }

    pub fn bus_config(&self) -> PgBusConfig {
        PgBusConfig {
            consumer_group: self.bus_consumer_group.clone(),
            poll_interval: self.bus_poll_interval,
            batch_size: self.bus_batch_size,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/balances")]).unwrap();

        assert_eq!(config.ledger_database_url, config.database_url);
        assert!(!config.has_separate_ledger_database());
        assert_eq!(config.port, 3000);
        assert_eq!(config.subscriber_queue_capacity, 100);
        assert_eq!(config.handler_workers, 1);
        assert_eq!(config.bus_config().consumer_group, "ledger-consumer");
        assert_eq!(config.reconcile_interval, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_missing_database_url() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingEnv("DATABASE_URL"))));
    }

    #[test]
    fn test_invalid_values() {
        let base = ("DATABASE_URL", "postgres://localhost/balances");

        assert!(matches!(
            load(&[base, ("PORT", "http")]),
            Err(ConfigError::InvalidValue("PORT"))
        ));
        assert!(matches!(
            load(&[base, ("SUBSCRIBER_QUEUE_CAPACITY", "0")]),
            Err(ConfigError::InvalidValue("SUBSCRIBER_QUEUE_CAPACITY"))
        ));
        assert!(matches!(
            load(&[base, ("HANDLER_WORKERS", "0")]),
            Err(ConfigError::InvalidValue("HANDLER_WORKERS"))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/balances"),
            ("LEDGER_DATABASE_URL", "postgres://localhost/ledger"),
            ("HANDLER_WORKERS", "4"),
            ("BUS_READ_BACKOFF_MS", "250"),
            ("RECONCILE_INTERVAL_SECS", "0"),
        ])
        .unwrap();

        assert!(config.has_separate_ledger_database());
        assert_eq!(config.handler_workers, 4);
        assert_eq!(config.bus_read_backoff, Duration::from_millis(250));
        assert_eq!(config.reconcile_interval, None);
    }
}
