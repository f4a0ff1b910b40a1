//! Finder configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::{FinderError, Result};

/// Cache policy and observability knobs for a [`Finder`](crate::Finder).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FinderConfig {
    /// Whether the default in-memory result cache is enabled
    pub cache_enabled: bool,
    /// Time-to-live of cached results in seconds (None = until invalidated)
    pub cache_ttl_secs: Option<u64>,
    /// Upper bound on cached entries (None = unbounded)
    pub cache_max_entries: Option<usize>,
    /// Queries slower than this are logged at WARN
    pub slow_query_threshold_ms: u64,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_secs: Some(300),
            cache_max_entries: Some(10_000),
            slow_query_threshold_ms: 1000,
        }
    }
}

impl FinderConfig {
    /// Configuration with the result cache turned off.
    pub fn uncached() -> Self {
        Self {
            cache_enabled: false,
            ..Default::default()
        }
    }

    /// Reads `LCA_FINDER_CACHE`, `LCA_FINDER_CACHE_TTL_SECS`,
    /// `LCA_FINDER_CACHE_MAX_ENTRIES` and `LCA_FINDER_SLOW_QUERY_MS`.
    ///
    /// A TTL or max-entries value of `0` means "no limit".
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let ttl: u64 = env_parse("LCA_FINDER_CACHE_TTL_SECS", defaults.cache_ttl_secs.unwrap_or(0))?;
        let max_entries: usize = env_parse(
            "LCA_FINDER_CACHE_MAX_ENTRIES",
            defaults.cache_max_entries.unwrap_or(0),
        )?;

        Ok(Self {
            cache_enabled: env_parse("LCA_FINDER_CACHE", defaults.cache_enabled)?,
            cache_ttl_secs: (ttl > 0).then_some(ttl),
            cache_max_entries: (max_entries > 0).then_some(max_entries),
            slow_query_threshold_ms: env_parse(
                "LCA_FINDER_SLOW_QUERY_MS",
                defaults.slow_query_threshold_ms,
            )?,
        })
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}

/// Parses `key` from the environment; an unset variable yields `default`.
pub(crate) fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| {
            FinderError::Configuration(format!("Invalid value '{}' for {}: {}", raw, key, e))
        }),
        Err(_) => Ok(default),
    }
}
