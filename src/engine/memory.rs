//! In-process key-value backend
//!
//! [`MemoryStore`] mirrors the subset of Redis semantics the engine relies on:
//! string, hash and sorted-set values, per-key TTL, numbered databases and
//! transactional batches. Like `MULTI`/`EXEC`, a batch runs without
//! interleaving and a write that hits a key of the wrong type fails alone
//! while the rest of the batch still applies. It is intended for:
//! - **Unit and integration testing** without a Redis server
//! - **Development** of models before a backend is provisioned
//!
//! Expired keys are removed lazily when touched, like Redis' passive expiry.
//!
//! # Warning
//!
//! All data lives in process memory and is lost on drop.
//!
//! # Example
//!
//! ```rust
//! use redistructs::engine::memory::MemoryStore;
//! use redistructs::engine::traits::{Connection, KeyValueStore, WriteOp};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! let mut conn = store.acquire().await?;
//! conn.apply(&[WriteOp::Set { key: "k".into(), value: b"v".to_vec(), ttl: None }]).await?;
//! assert_eq!(conn.get("k").await?, Some(b"v".to_vec()));
//! # Ok(())
//! # }
//! ```

use crate::engine::traits::{Connection, KeyValueStore, WriteOp};
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of concurrent connections
const DEFAULT_POOL_SIZE: usize = 16;

/// Number of logical databases, as in a stock Redis server
const DATABASES: i64 = 16;

#[derive(Debug, Clone)]
enum Value {
    Str(Vec<u8>),
    Hash(HashMap<String, Vec<u8>>),
    ZSet(HashMap<String, f64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type Database = HashMap<String, Entry>;

struct Shared {
    databases: RwLock<HashMap<i64, Database>>,
    permits: Arc<Semaphore>,
    failing_keys: RwLock<HashSet<String>>,
    commands_executed: AtomicU64,
}

/// In-memory backend implementing [`KeyValueStore`]
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create an empty store with the default pool size
    pub fn new() -> Self {
        Self::with_pool_size(DEFAULT_POOL_SIZE)
    }

    /// Create an empty store that hands out at most `pool_size` connections
    pub fn with_pool_size(pool_size: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                databases: RwLock::new(HashMap::new()),
                permits: Arc::new(Semaphore::new(pool_size.max(1))),
                failing_keys: RwLock::new(HashSet::new()),
                commands_executed: AtomicU64::new(0),
            }),
        }
    }

    /// Make every command touching `key` fail with a command error
    pub fn fail_on_key(&self, key: impl Into<String>) {
        self.shared.failing_keys.write().insert(key.into());
    }

    /// Undo all [`MemoryStore::fail_on_key`] injections
    pub fn clear_failures(&self) {
        self.shared.failing_keys.write().clear();
    }

    /// Live (unexpired) keys in `db`, sorted
    pub fn keys(&self, db: i64) -> Vec<String> {
        let now = Instant::now();
        let databases = self.shared.databases.read();
        let mut keys: Vec<String> = databases
            .get(&db)
            .map(|d| {
                d.iter()
                    .filter(|(_, e)| !e.is_expired(now))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Remaining TTL of `key` in `db`, if it has one
    pub fn ttl(&self, db: i64, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let databases = self.shared.databases.read();
        let entry = databases.get(&db)?.get(key)?;
        if entry.is_expired(now) {
            return None;
        }
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }

    /// Connections currently available
    pub fn available_connections(&self) -> usize {
        self.shared.permits.available_permits()
    }

    /// Total commands executed
    pub fn commands_executed(&self) -> u64 {
        self.shared.commands_executed.load(Ordering::Relaxed)
    }

    /// Close the pool; later acquisitions fail
    pub fn close(&self) {
        self.shared.permits.close();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    type Conn = MemoryConnection;

    fn backend_id(&self) -> &str {
        "in-memory-v1"
    }

    async fn acquire(&self) -> Result<MemoryConnection, StoreError> {
        let permit = self
            .shared
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StoreError::Closed)?;

        Ok(MemoryConnection {
            shared: Arc::clone(&self.shared),
            db: 0,
            _permit: permit,
        })
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        self.shared.databases.write().clear();
        Ok(())
    }
}

/// Connection to a [`MemoryStore`]; returns its permit when dropped
pub struct MemoryConnection {
    shared: Arc<Shared>,
    db: i64,
    _permit: OwnedSemaphorePermit,
}

impl MemoryConnection {
    fn check_key(&self, key: &str) -> Result<(), StoreError> {
        self.shared
            .commands_executed
            .fetch_add(1, Ordering::Relaxed);
        if self.shared.failing_keys.read().contains(key) {
            return Err(StoreError::Command(format!("injected failure on {}", key)));
        }
        Ok(())
    }

    /// Read a live entry, dropping it first if it has expired
    fn read_entry<T>(&self, key: &str, f: impl FnOnce(Option<&Value>) -> T) -> T {
        let now = Instant::now();
        {
            let databases = self.shared.databases.read();
            match databases.get(&self.db).and_then(|d| d.get(key)) {
                Some(entry) if !entry.is_expired(now) => return f(Some(&entry.value)),
                None => return f(None),
                Some(_) => {},
            }
        }

        let mut databases = self.shared.databases.write();
        if let Some(db) = databases.get_mut(&self.db) {
            if db.get(key).is_some_and(|e| e.is_expired(now)) {
                db.remove(key);
            }
        }
        f(None)
    }
}

/// Apply one write, failing like Redis when the key holds another type
fn apply_op(db: &mut Database, op: &WriteOp, now: Instant) -> Result<(), StoreError> {
    if db.get(op.key()).is_some_and(|e| e.is_expired(now)) {
        db.remove(op.key());
    }

    match op {
        WriteOp::Set { key, value, ttl } => {
            db.insert(
                key.clone(),
                Entry {
                    value: Value::Str(value.clone()),
                    expires_at: ttl.map(|t| now + t),
                },
            );
        },
        WriteOp::HSet { key, fields } => {
            let entry = db.entry(key.clone()).or_insert_with(|| Entry {
                value: Value::Hash(HashMap::new()),
                expires_at: None,
            });
            let Value::Hash(hash) = &mut entry.value else {
                return Err(StoreError::WrongType(key.clone()));
            };
            for (field, value) in fields {
                hash.insert(field.clone(), value.clone());
            }
        },
        WriteOp::Del { key } => {
            db.remove(key);
        },
        WriteOp::ZAdd { key, member, score } => {
            let entry = db.entry(key.clone()).or_insert_with(|| Entry {
                value: Value::ZSet(HashMap::new()),
                expires_at: None,
            });
            let Value::ZSet(zset) = &mut entry.value else {
                return Err(StoreError::WrongType(key.clone()));
            };
            zset.insert(member.clone(), *score);
        },
        WriteOp::ZRem { key, member } => {
            zrem_member(db, key, member)?;
        },
        WriteOp::Expire { key, ttl } => {
            if let Some(entry) = db.get_mut(key) {
                entry.expires_at = Some(now + *ttl);
            }
        },
    }
    Ok(())
}

/// Remove `member` from the set at `key`, dropping the set once empty
fn zrem_member(db: &mut Database, key: &str, member: &str) -> Result<bool, StoreError> {
    let (removed, now_empty) = match db.get_mut(key).map(|e| &mut e.value) {
        None => return Ok(false),
        Some(Value::ZSet(zset)) => (zset.remove(member).is_some(), zset.is_empty()),
        Some(_) => return Err(StoreError::WrongType(key.to_string())),
    };
    if now_empty {
        db.remove(key);
    }
    Ok(removed)
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn select(&mut self, db: i64) -> Result<(), StoreError> {
        if !(0..DATABASES).contains(&db) {
            return Err(StoreError::Command(format!(
                "DB index is out of range: {}",
                db
            )));
        }
        self.db = db;
        Ok(())
    }

    async fn apply(&mut self, ops: &[WriteOp]) -> Result<(), StoreError> {
        for op in ops {
            self.check_key(op.key())?;
        }

        let now = Instant::now();
        let mut databases = self.shared.databases.write();
        let db = databases.entry(self.db).or_default();

        // EXEC semantics: a failed write does not stop or undo the others
        let mut first_error = None;
        for op in ops {
            if let Err(e) = apply_op(db, op, now) {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_key(key)?;
        self.read_entry(key, |value| match value {
            None => Ok(None),
            Some(Value::Str(bytes)) => Ok(Some(bytes.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        })
    }

    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        self.check_key(key)?;
        self.read_entry(key, |value| match value {
            None => Ok(HashMap::new()),
            Some(Value::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        })
    }

    async fn zrange_by_score(
        &mut self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<String>, StoreError> {
        self.check_key(key)?;
        self.read_entry(key, |value| match value {
            None => Ok(Vec::new()),
            Some(Value::ZSet(zset)) => {
                let mut members: Vec<(&String, f64)> = zset
                    .iter()
                    .filter(|(_, s)| **s >= min && **s <= max)
                    .map(|(m, s)| (m, *s))
                    .collect();
                // Redis orders equal scores lexicographically by member
                members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
                Ok(members.into_iter().map(|(m, _)| m.clone()).collect())
            },
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        })
    }

    async fn zrem_if_absent(
        &mut self,
        record_key: &str,
        index_keys: &[String],
        member: &str,
    ) -> Result<usize, StoreError> {
        self.check_key(record_key)?;
        for key in index_keys {
            self.check_key(key)?;
        }

        let now = Instant::now();
        let mut databases = self.shared.databases.write();
        let db = databases.entry(self.db).or_default();
        if db.get(record_key).is_some_and(|e| !e.is_expired(now)) {
            return Ok(0);
        }

        let mut removed = 0;
        for key in index_keys {
            if db.get(key).is_some_and(|e| e.is_expired(now)) {
                db.remove(key);
                continue;
            }
            if zrem_member(db, key, member)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&mut self, key: &str) -> Result<bool, StoreError> {
        self.check_key(key)?;
        Ok(self.read_entry(key, |value| value.is_some()))
    }
}
