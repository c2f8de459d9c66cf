//! Configuration types

use crate::{ConfigError, MetatagResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Env var holding the retention window in milliseconds (`never`/`inf` disables it).
pub const ENV_CACHE_RETENTION_MS: &str = "METATAG_CACHE_RETENTION_MS";
/// Env var holding the stale time in milliseconds.
pub const ENV_CACHE_STALE_MS: &str = "METATAG_CACHE_STALE_MS";
/// Env var holding the log filter directives.
pub const ENV_LOG: &str = "METATAG_LOG";
/// Env var switching log output to JSON.
pub const ENV_LOG_JSON: &str = "METATAG_LOG_JSON";

/// Configuration shared by every store created from one cache client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long an entry survives once its last observer is gone.
    /// `None` keeps unobserved entries forever.
    pub retention: Option<Duration>,
    /// Age after which a cached value is considered stale.
    /// `None` means values only go stale through explicit invalidation.
    pub stale_time: Option<Duration>,
    /// Whether invalidating an observed entry schedules a refetch right away.
    pub refetch_on_invalidate: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retention: Some(Duration::from_secs(300)),
            stale_time: None,
            refetch_on_invalidate: true,
        }
    }
}

/// On-disk shape of [`CacheConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheConfigFile {
    retention_ms: Option<u64>,
    #[serde(default)]
    retain_forever: bool,
    stale_ms: Option<u64>,
    refetch_on_invalidate: Option<bool>,
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retention window for unobserved entries.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Keep unobserved entries until they are removed explicitly.
    pub fn retain_forever(mut self) -> Self {
        self.retention = None;
        self
    }

    /// Set the stale time.
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    /// Enable or disable refetching observed entries on invalidation.
    pub fn with_refetch_on_invalidate(mut self, enabled: bool) -> Self {
        self.refetch_on_invalidate = enabled;
        self
    }

    /// Validate the configuration.
    ///
    /// A zero retention window is rejected: use [`CacheConfig::retain_forever`]
    /// or a positive duration.
    pub fn validate(&self) -> MetatagResult<()> {
        if self.retention == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidValue {
                field: "retention".to_string(),
                value: "0".to_string(),
                reason: "must be positive; use retain_forever to disable retention".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Read overrides from the process environment on top of the defaults.
    pub fn from_env() -> MetatagResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> MetatagResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_CACHE_RETENTION_MS) {
            config.retention = match raw.trim() {
                "never" | "inf" | "infinity" => None,
                other => Some(parse_millis(ENV_CACHE_RETENTION_MS, other)?),
            };
        }
        if let Some(raw) = lookup(ENV_CACHE_STALE_MS) {
            config.stale_time = Some(parse_millis(ENV_CACHE_STALE_MS, raw.trim())?);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document such as:
    ///
    /// ```toml
    /// retention_ms = 60000
    /// stale_ms = 5000
    /// refetch_on_invalidate = false
    /// ```
    pub fn from_toml_str(source: &str) -> MetatagResult<Self> {
        let file: CacheConfigFile = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;

        let mut config = Self::default();
        if file.retain_forever {
            config.retention = None;
        } else if let Some(ms) = file.retention_ms {
            config.retention = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = file.stale_ms {
            config.stale_time = Some(Duration::from_millis(ms));
        }
        if let Some(enabled) = file.refetch_on_invalidate {
            config.refetch_on_invalidate = enabled;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Logging configuration consumed by the subscriber installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directives.
    pub filter: String,
    /// Emit JSON lines instead of human readable text.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "metatag=info,warn".to_string(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Read the log configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the log configuration through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            filter: lookup(ENV_LOG).unwrap_or(defaults.filter),
            json: lookup(ENV_LOG_JSON)
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.json),
        }
    }
}

fn parse_millis(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    raw.parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        })
}
