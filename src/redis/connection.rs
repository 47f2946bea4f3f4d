//! Redis connection pool with per-database connections and health checking
//!
//! Provides the production [`KeyValueStore`] backend:
//! - Configurable pool size and timeouts
//! - One multiplexed connection per logical database, opened lazily
//! - Transactional batches via `MULTI`/`EXEC` pipelines
//! - Conditional index cleanup via a Lua script
//! - Connection metrics tracking
//!
//! Logical databases are selected by connecting with the database index
//! rather than issuing `SELECT` on a shared socket, so callers multiplexed on
//! the same connection never observe each other's database.
//!
//! # Example
//!
//! ```rust,no_run
//! use redistructs::redis::{RedisConfig, RedisPool};
//! use redistructs::engine::traits::KeyValueStore;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RedisConfig::with_url("redis://localhost:6379")
//!     .pool_size(16)
//!     .command_timeout(Duration::from_secs(1));
//!
//! let pool = RedisPool::new(config).await?;
//!
//! // Get a connection from the pool
//! let conn = pool.acquire().await?;
//! # Ok(())
//! # }
//! ```

use crate::engine::traits::{ttl_millis, Connection, KeyValueStore, WriteOp};
use crate::error::StoreError;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, info, warn};

use super::scripts::LuaScripts;
use super::util::{is_wrong_type, safe_redis_error, sanitize_url};

/// Configuration for Redis connection pool
///
/// Controls connection behavior and timeouts. Failed commands are never
/// retried by the pool; errors surface to the caller.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Redis server URL (e.g., "redis://localhost:6379")
    pub url: String,

    /// Maximum number of concurrently checked-out connections
    /// Default: 16
    pub pool_size: u32,

    /// Timeout for establishing new connections
    /// Default: 5 seconds
    pub connection_timeout: Duration,

    /// Timeout for individual Redis commands and transactions
    /// Default: 1 second
    pub command_timeout: Duration,

    /// Enable TLS for connections
    /// Default: false
    pub tls_enabled: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 16,
            connection_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(1),
            tls_enabled: false,
        }
    }
}

impl RedisConfig {
    /// Create a new config with the specified URL
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the pool size
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the command timeout
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Enable or disable TLS for Redis connections
    ///
    /// When enabled, the URL must use the `rediss://` scheme.
    /// Requires the `redis-tls` feature to be enabled.
    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls_enabled = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }
        if self.pool_size == 0 {
            return Err("Pool size must be greater than 0".to_string());
        }
        if self.pool_size > 1000 {
            return Err("Pool size cannot exceed 1000".to_string());
        }

        #[cfg(not(feature = "redis-tls"))]
        if self.tls_enabled {
            return Err(
                "TLS is enabled but the 'redis-tls' feature is not compiled. \
                 Enable it with: cargo build --features redis-tls"
                    .to_string(),
            );
        }

        if self.tls_enabled && !self.url.starts_with("rediss://") {
            return Err("TLS is enabled but URL doesn't use 'rediss://' scheme".to_string());
        }
        if !self.tls_enabled && self.url.starts_with("rediss://") {
            return Err("URL uses 'rediss://' scheme but TLS is not enabled".to_string());
        }

        Ok(())
    }
}

/// Connection pool metrics
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// Total number of successful connections
    pub connections_created: AtomicU64,

    /// Total number of connection failures
    pub connection_failures: AtomicU64,

    /// Total number of commands executed
    pub commands_executed: AtomicU64,

    /// Total number of command failures
    pub command_failures: AtomicU64,

    /// Total command latency in microseconds
    pub total_latency_us: AtomicU64,
}

impl PoolMetrics {
    /// Record a successful connection
    pub fn record_connection(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection failure
    pub fn record_connection_failure(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful command with latency
    pub fn record_command(&self, latency: Duration) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a command failure
    pub fn record_command_failure(&self) {
        self.command_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get average command latency in microseconds
    pub fn average_latency_us(&self) -> f64 {
        let total = self.total_latency_us.load(Ordering::Relaxed);
        let count = self.commands_executed.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Get a snapshot of the metrics
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            commands_executed: self.commands_executed.load(Ordering::Relaxed),
            command_failures: self.command_failures.load(Ordering::Relaxed),
            average_latency_us: self.average_latency_us(),
        }
    }
}

/// Snapshot of pool metrics at a point in time
#[derive(Debug, Clone)]
pub struct PoolMetricsSnapshot {
    /// Total number of connections created during pool lifetime
    pub connections_created: u64,
    /// Total number of connection failures during pool lifetime
    pub connection_failures: u64,
    /// Total number of commands executed through the pool
    pub commands_executed: u64,
    /// Total number of command failures encountered
    pub command_failures: u64,
    /// Average command latency in microseconds
    pub average_latency_us: f64,
}

/// Health status of the Redis connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Connection is healthy
    Healthy,
    /// Connection is degraded (slow but working)
    Degraded,
    /// Connection is unhealthy
    Unhealthy,
    /// Health status unknown (not yet checked)
    Unknown,
}

struct PoolInner {
    /// Redis client for the configured URL
    client: Client,

    /// Multiplexed connection per logical database
    connections: RwLock<HashMap<i64, MultiplexedConnection>>,

    config: RedisConfig,

    metrics: PoolMetrics,

    /// Bounds concurrently checked-out connections
    semaphore: Arc<Semaphore>,

    health_status: parking_lot::RwLock<HealthStatus>,

    scripts: LuaScripts,
}

impl PoolInner {
    /// Cached connection for `db`, connecting on first use
    async fn connection_for(&self, db: i64) -> Result<MultiplexedConnection, StoreError> {
        if let Some(conn) = self.connections.read().await.get(&db) {
            return Ok(conn.clone());
        }

        let start = Instant::now();
        let mut info = self.client.get_connection_info().clone();
        info.redis.db = db;
        let client = Client::open(info).map_err(|e| self.connection_error(&e))?;

        let conn = tokio::time::timeout(
            self.config.connection_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            self.metrics.record_connection_failure();
            StoreError::Timeout
        })?
        .map_err(|e| {
            self.metrics.record_connection_failure();
            self.connection_error(&e)
        })?;

        self.metrics.record_connection();
        debug!("Redis connection to db {} established in {:?}", db, start.elapsed());

        // Another task may have raced us; keep whichever landed first
        let mut guard = self.connections.write().await;
        Ok(guard.entry(db).or_insert(conn).clone())
    }

    /// Drop the cached connection for `db` so the next use reconnects
    async fn invalidate(&self, db: i64) {
        self.connections.write().await.remove(&db);
    }

    fn connection_error(&self, e: &RedisError) -> StoreError {
        StoreError::Connection(safe_redis_error(&self.config.url, e))
    }

    /// Run one command under the command timeout, recording metrics
    async fn timed<T, Fut>(&self, db: i64, fut: Fut) -> Result<T, StoreError>
    where
        Fut: Future<Output = Result<T, RedisError>>,
    {
        let start = Instant::now();
        match tokio::time::timeout(self.config.command_timeout, fut).await {
            Ok(Ok(value)) => {
                self.metrics.record_command(start.elapsed());
                Ok(value)
            },
            Ok(Err(e)) => {
                self.metrics.record_command_failure();
                if e.is_connection_dropped() || e.is_io_error() {
                    self.invalidate(db).await;
                    return Err(self.connection_error(&e));
                }
                if is_wrong_type(&e) {
                    return Err(StoreError::WrongType(e.to_string()));
                }
                Err(StoreError::Command(safe_redis_error(&self.config.url, &e)))
            },
            Err(_) => {
                self.metrics.record_command_failure();
                Err(StoreError::Timeout)
            },
        }
    }
}

/// Redis connection pool
///
/// Cheap to clone; clones share connections, limits and metrics.
#[derive(Clone)]
pub struct RedisPool {
    inner: Arc<PoolInner>,
}

impl RedisPool {
    /// Create a new Redis connection pool
    ///
    /// Validates the configuration and establishes the connection to
    /// database 0 so that dial failures surface here.
    pub async fn new(config: RedisConfig) -> Result<Self, StoreError> {
        config.validate().map_err(StoreError::Connection)?;

        // Sanitized URL in error messages prevents credential leakage
        let client = Client::open(config.url.as_str())
            .map_err(|e| StoreError::Connection(safe_redis_error(&config.url, &e)))?;

        let semaphore = Arc::new(Semaphore::new(config.pool_size as usize));

        let pool = Self {
            inner: Arc::new(PoolInner {
                client,
                connections: RwLock::new(HashMap::new()),
                config,
                metrics: PoolMetrics::default(),
                semaphore,
                health_status: parking_lot::RwLock::new(HealthStatus::Unknown),
                scripts: LuaScripts::new(),
            }),
        };

        pool.inner.connection_for(0).await?;
        *pool.inner.health_status.write() = HealthStatus::Healthy;

        info!(
            "Redis connection pool initialized for {}",
            sanitize_url(&pool.inner.config.url)
        );
        Ok(pool)
    }

    /// Perform a health check
    ///
    /// Sends a PING command to Redis and updates the health status.
    pub async fn health_check(&self) -> HealthStatus {
        let start = Instant::now();

        let result = async {
            let mut conn = self.inner.connection_for(0).await?;
            self.inner
                .timed(0, redis::cmd("PING").query_async::<String>(&mut conn))
                .await
        }
        .await;

        let status = match result {
            Ok(_) if start.elapsed() > Duration::from_millis(100) => HealthStatus::Degraded,
            Ok(_) => HealthStatus::Healthy,
            Err(e) => {
                warn!("Redis health check failed: {}", e);
                HealthStatus::Unhealthy
            },
        };

        *self.inner.health_status.write() = status.clone();
        status
    }

    /// Last observed health status
    pub fn health_status(&self) -> HealthStatus {
        self.inner.health_status.read().clone()
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Get the pool configuration
    pub fn config(&self) -> &RedisConfig {
        &self.inner.config
    }

    /// Close the pool; pending and later acquisitions fail
    pub fn close(&self) {
        self.inner.semaphore.close();
    }
}

#[async_trait]
impl KeyValueStore for RedisPool {
    type Conn = PooledConnection;

    fn backend_id(&self) -> &str {
        "redis-v1"
    }

    async fn acquire(&self) -> Result<PooledConnection, StoreError> {
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StoreError::Closed)?;

        let conn = self.inner.connection_for(0).await?;

        Ok(PooledConnection {
            inner: Arc::clone(&self.inner),
            db: 0,
            conn,
            _permit: permit,
        })
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        let mut conn = self.inner.connection_for(0).await?;
        self.inner
            .timed(0, redis::cmd("FLUSHALL").query_async::<()>(&mut conn))
            .await
    }
}

/// A pooled connection that returns its permit when dropped
pub struct PooledConnection {
    inner: Arc<PoolInner>,
    db: i64,
    conn: MultiplexedConnection,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Logical database currently selected
    pub fn database(&self) -> i64 {
        self.db
    }
}

#[async_trait]
impl Connection for PooledConnection {
    async fn select(&mut self, db: i64) -> Result<(), StoreError> {
        if db == self.db {
            return Ok(());
        }
        if db < 0 {
            return Err(StoreError::Command(format!(
                "DB index is out of range: {}",
                db
            )));
        }
        self.conn = self.inner.connection_for(db).await?;
        self.db = db;
        Ok(())
    }

    async fn apply(&mut self, ops: &[WriteOp]) -> Result<(), StoreError> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            match op {
                WriteOp::Set {
                    key,
                    value,
                    ttl: Some(ttl),
                } => {
                    pipe.pset_ex(key, value.as_slice(), ttl_millis(*ttl)).ignore();
                },
                WriteOp::Set {
                    key,
                    value,
                    ttl: None,
                } => {
                    pipe.set(key, value.as_slice()).ignore();
                },
                WriteOp::HSet { key, fields } => {
                    pipe.hset_multiple(key, fields.as_slice()).ignore();
                },
                WriteOp::Del { key } => {
                    pipe.del(key).ignore();
                },
                WriteOp::ZAdd { key, member, score } => {
                    pipe.zadd(key, member, *score).ignore();
                },
                WriteOp::ZRem { key, member } => {
                    pipe.zrem(key, member).ignore();
                },
                WriteOp::Expire { key, ttl } => {
                    pipe.pexpire(key, ttl_millis(*ttl) as i64).ignore();
                },
            }
        }

        let db = self.db;
        self.inner
            .timed(db, pipe.query_async::<()>(&mut self.conn))
            .await
    }

    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let db = self.db;
        self.inner.timed(db, self.conn.get(key)).await
    }

    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        let db = self.db;
        self.inner.timed(db, self.conn.hgetall(key)).await
    }

    async fn zrange_by_score(
        &mut self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<String>, StoreError> {
        let db = self.db;
        self.inner
            .timed(db, self.conn.zrangebyscore(key, min, max))
            .await
    }

    async fn zrem_if_absent(
        &mut self,
        record_key: &str,
        index_keys: &[String],
        member: &str,
    ) -> Result<usize, StoreError> {
        if index_keys.is_empty() {
            return Ok(0);
        }

        let mut invocation = self.inner.scripts.zrem_if_absent().prepare_invoke();
        invocation.key(record_key);
        for key in index_keys {
            invocation.key(key);
        }
        invocation.arg(member);

        let db = self.db;
        let removed: i64 = self
            .inner
            .timed(db, invocation.invoke_async(&mut self.conn))
            .await?;
        Ok(removed.max(0) as usize)
    }

    async fn exists(&mut self, key: &str) -> Result<bool, StoreError> {
        let db = self.db;
        self.inner.timed(db, self.conn.exists(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RedisConfig::default();
        assert_eq!(config.pool_size, 16);
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = RedisConfig {
            url: "".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RedisConfig::with_url("redis://localhost").pool_size(0);
        assert!(config.validate().is_err());

        let config = RedisConfig::with_url("redis://localhost").pool_size(1001);
        assert!(config.validate().is_err());

        let config = RedisConfig::with_url("redis://localhost").pool_size(16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tls_scheme_mismatch() {
        let config = RedisConfig::with_url("rediss://secure.example.com:6380");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pool_metrics() {
        let metrics = PoolMetrics::default();

        metrics.record_connection();
        metrics.record_command(Duration::from_micros(100));
        metrics.record_command(Duration::from_micros(200));
        metrics.record_command_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_created, 1);
        assert_eq!(snapshot.commands_executed, 2);
        assert_eq!(snapshot.command_failures, 1);
        assert_eq!(snapshot.average_latency_us, 150.0);
    }

    #[test]
    fn test_config_builder() {
        let config = RedisConfig::with_url("redis://localhost:6380")
            .pool_size(32)
            .connection_timeout(Duration::from_secs(10))
            .command_timeout(Duration::from_millis(250));

        assert_eq!(config.url, "redis://localhost:6380");
        assert_eq!(config.pool_size, 32);
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.command_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let config = RedisConfig::with_url("redis://127.0.0.1:1")
            .connection_timeout(Duration::from_millis(200));
        match RedisPool::new(config).await {
            Err(e) => assert!(e.is_connection(), "unexpected error: {:?}", e),
            Ok(_) => panic!("connected to a closed port"),
        }
    }
}
