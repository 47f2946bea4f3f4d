//! redistructs - map application structs onto Redis
//!
//! This library persists arbitrary model types into a Redis-compatible store:
//! - Primary keys derived from the model's type name and primary key
//! - Serialized blob, hash or scalar storage chosen per model
//! - Score-ordered secondary indices kept in step with primary records
//! - TTL and logical database selection per model, with engine-wide defaults
//! - Pluggable backends: Redis, or an in-memory store for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use redistructs::{Config, Context, MappingEngine, Model, StoreType};
//! use redistructs::redis::{RedisConfig, RedisPool};
//!
//! struct Counter {
//!     name: String,
//!     value: i64,
//! }
//!
//! impl Model for Counter {
//!     fn store_type(&self) -> StoreType {
//!         StoreType::String
//!     }
//!
//!     fn primary_key(&self) -> String {
//!         self.name.clone()
//!     }
//!
//!     fn scalar(&self) -> Result<Vec<u8>, redistructs::CodecError> {
//!         Ok(self.value.to_string().into_bytes())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = RedisPool::new(RedisConfig::default()).await?;
//! let prototype = Counter { name: String::new(), value: 0 };
//! let counters = MappingEngine::new(pool, Config::create(), prototype)?;
//!
//! let ctx = Context::background();
//! counters.put(&ctx, &[Counter { name: "hits".into(), value: 1 }]).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod context;
pub mod error;
pub mod keys;
pub mod model;
pub mod types;

/// Configuration management with TOML support
pub mod config;

/// Mapping engine and the pluggable backend seam
pub mod engine;

/// Redis backend: pooled connections, metrics and health checks
pub mod redis;

// Re-export main types
pub use codec::Record;
pub use config::Config;
pub use context::{CancelHandle, Context};
pub use engine::memory::MemoryStore;
pub use engine::traits::{Connection, KeyValueStore, WriteOp};
pub use engine::MappingEngine;
pub use error::{CodecError, Error, Operation, Result, StoreError};
pub use keys::KeyBuilder;
pub use model::Model;
pub use types::{Expiry, Score, ScoreMap, StoreType};
