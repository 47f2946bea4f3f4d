//! Redis backend for the mapping engine
//!
//! # Key schema
//!
//! ```text
//! [<prefix>:]<type>:<primary_key>        STRING (serialized / scalar) or HASH
//! [<prefix>:]<type>:idx:<score_name>     ZSET(score -> primary_key)
//! ```
//!
//! The delimiter (`:` above) is chosen by the model.
//!
//! # Features
//!
//! - Semaphore-bounded connection pool
//! - One multiplexed connection per logical database
//! - Per-instance writes applied as `MULTI`/`EXEC` transactions
//! - Dangling index members removed by a Lua script that checks the record first
//! - Connection metrics and health checks
//!
//! # Example
//!
//! ```rust,no_run
//! use redistructs::redis::{RedisConfig, RedisPool};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = RedisPool::new(RedisConfig::default()).await?;
//! let status = pool.health_check().await;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod scripts;
pub mod util;

pub use connection::{
    HealthStatus, PoolMetrics, PoolMetricsSnapshot, PooledConnection, RedisConfig, RedisPool,
};
