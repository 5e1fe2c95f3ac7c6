//! Environment-driven configuration.
//!
//! | Variable                      | Default                 |
//! |-------------------------------|-------------------------|
//! | `FACTGATE_STORE_URL`          | `https://api.osohq.com` |
//! | `FACTGATE_STORE_API_KEY`      | none                    |
//! | `FACTGATE_BATCH_SIZE`         | `20`                    |
//! | `FACTGATE_MAX_IN_FLIGHT`      | `4`                     |
//! | `FACTGATE_REQUEST_TIMEOUT_MS` | `5000`                  |

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::fact_store::{HttpFactStore, StoreError};
use crate::sync::SyncConfig;

pub const STORE_URL: &str = "FACTGATE_STORE_URL";
pub const STORE_API_KEY: &str = "FACTGATE_STORE_API_KEY";
pub const BATCH_SIZE: &str = "FACTGATE_BATCH_SIZE";
pub const MAX_IN_FLIGHT: &str = "FACTGATE_MAX_IN_FLIGHT";
pub const REQUEST_TIMEOUT_MS: &str = "FACTGATE_REQUEST_TIMEOUT_MS";

pub const DEFAULT_STORE_URL: &str = "https://api.osohq.com";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but its value cannot be used.
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactgateConfig {
    pub store_url: String,
    pub api_key: Option<String>,
    pub sync: SyncConfig,
    pub request_timeout: Duration,
}

impl Default for FactgateConfig {
    fn default() -> Self {
        Self {
            store_url: DEFAULT_STORE_URL.to_string(),
            api_key: None,
            sync: SyncConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl FactgateConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let api_key = get(STORE_API_KEY);
        if api_key.is_none() {
            warn!("{STORE_API_KEY} not set; fact store requests will be unauthenticated");
        }

        let sync = SyncConfig {
            batch_size: parse_or(get(BATCH_SIZE), BATCH_SIZE, defaults.sync.batch_size)?,
            max_in_flight: parse_or(get(MAX_IN_FLIGHT), MAX_IN_FLIGHT, defaults.sync.max_in_flight)?,
        };
        let timeout_ms: u64 = parse_or(
            get(REQUEST_TIMEOUT_MS),
            REQUEST_TIMEOUT_MS,
            defaults.request_timeout.as_millis() as u64,
        )?;

        Ok(Self {
            store_url: get(STORE_URL).unwrap_or(defaults.store_url),
            api_key,
            sync,
            request_timeout: Duration::from_millis(timeout_ms),
        })
    }

    pub fn http_store(&self) -> Result<HttpFactStore, StoreError> {
        HttpFactStore::new(self.store_url.clone(), self.api_key.clone(), self.request_timeout)
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = FactgateConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, FactgateConfig::default());
        assert_eq!(config.sync.batch_size.get(), 20);
    }

    #[test]
    fn reads_every_variable() {
        let config = FactgateConfig::from_lookup(lookup(&[
            (STORE_URL, "http://localhost:8080"),
            (STORE_API_KEY, "e_0123"),
            (BATCH_SIZE, "10"),
            (MAX_IN_FLIGHT, "8"),
            (REQUEST_TIMEOUT_MS, "250"),
        ]))
        .unwrap();

        assert_eq!(config.store_url, "http://localhost:8080");
        assert_eq!(config.api_key.as_deref(), Some("e_0123"));
        assert_eq!(config.sync.batch_size.get(), 10);
        assert_eq!(config.sync.max_in_flight.get(), 8);
        assert_eq!(config.request_timeout, Duration::from_millis(250));
    }

    #[test]
    fn zero_batch_size_is_invalid() {
        let err = FactgateConfig::from_lookup(lookup(&[(BATCH_SIZE, "0")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: BATCH_SIZE.to_string(),
                value: "0".to_string()
            }
        );
    }

    #[test]
    fn garbage_timeout_is_invalid() {
        let err = FactgateConfig::from_lookup(lookup(&[(REQUEST_TIMEOUT_MS, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = FactgateConfig::from_lookup(lookup(&[(STORE_API_KEY, ""), (STORE_URL, " ")])).unwrap();
        assert_eq!(config.api_key, None);
        assert_eq!(config.store_url, DEFAULT_STORE_URL);
    }
}
