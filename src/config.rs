//! Engine configuration
//!
//! Engine-wide defaults applied when a model does not override them, plus the
//! Redis connection settings. Loaded from TOML with environment variable
//! overrides, or built from defaults with [`Config::create`].
//!
//! ```toml
//! key_prefix = "app"
//! default_ttl_secs = 3600
//! default_database = 0
//!
//! [redis]
//! url = "redis://127.0.0.1:6379"
//! pool_size = 16
//! ```

use crate::error::{Error, Result};
use crate::redis::RedisConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of logical databases a stock Redis server exposes
const MAX_DATABASES: i64 = 16;

/// Immutable engine-wide defaults
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Namespace prepended to every key (empty = none)
    #[serde(default)]
    pub key_prefix: String,

    /// TTL for models returning `Expiry::Default` (0 = no expiry)
    #[serde(default)]
    pub default_ttl_secs: u64,

    /// Database for models returning no database index
    #[serde(default)]
    pub default_database: i64,

    /// Redis connection settings
    #[serde(default)]
    pub redis: RedisSection,
}

/// Redis connection settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RedisSection {
    /// Server URL
    #[serde(default = "default_url")]
    pub url: String,

    /// Maximum concurrently checked-out connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection establishment timeout in milliseconds
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Per-command timeout in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

// Default value functions
fn default_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_pool_size() -> u32 { 16 }
fn default_connection_timeout_ms() -> u64 { 5_000 }
fn default_command_timeout_ms() -> u64 { 1_000 }

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            pool_size: default_pool_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            default_ttl_secs: 0,
            default_database: 0,
            redis: RedisSection::default(),
        }
    }
}

impl RedisSection {
    /// Pool configuration for [`crate::redis::RedisPool`]
    pub fn to_redis_config(&self) -> RedisConfig {
        RedisConfig::with_url(self.url.clone())
            .pool_size(self.pool_size)
            .connection_timeout(Duration::from_millis(self.connection_timeout_ms))
            .command_timeout(Duration::from_millis(self.command_timeout_ms))
            .tls(self.url.starts_with("rediss://"))
    }
}

impl Config {
    /// Configuration with all defaults
    pub fn create() -> Self {
        Self::default()
    }

    /// Set the key namespace
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the default TTL, rounded up to whole seconds; zero disables expiry
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        self
    }

    /// Set the default database
    pub fn with_default_database(mut self, db: i64) -> Self {
        self.default_database = db;
        self
    }

    /// Default TTL, `None` when disabled
    pub fn default_ttl(&self) -> Option<Duration> {
        (self.default_ttl_secs > 0).then(|| Duration::from_secs(self.default_ttl_secs))
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path, e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(prefix) = std::env::var("REDISTRUCTS_KEY_PREFIX") {
            self.key_prefix = prefix;
        }
        if let Ok(ttl) = std::env::var("REDISTRUCTS_DEFAULT_TTL_SECS") {
            if let Ok(t) = ttl.parse() {
                self.default_ttl_secs = t;
            }
        }
        if let Ok(db) = std::env::var("REDISTRUCTS_DATABASE") {
            if let Ok(d) = db.parse() {
                self.default_database = d;
            }
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.redis.url = url;
        }
    }

    /// Validate the engine defaults
    ///
    /// The `[redis]` section is checked by [`crate::redis::RedisPool::new`],
    /// so a config used only with another backend never fails on it.
    pub fn validate(&self) -> Result<()> {
        if !(0..MAX_DATABASES).contains(&self.default_database) {
            return Err(Error::Configuration(format!(
                "Default database must be in 0..{}, got {}",
                MAX_DATABASES, self.default_database
            )));
        }
        if self.key_prefix.chars().any(char::is_whitespace) {
            return Err(Error::Configuration(
                "Key prefix cannot contain whitespace".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents).map_err(|e| {
            Error::Configuration(format!("Failed to write config file {}: {}", path, e))
        })
    }
}
