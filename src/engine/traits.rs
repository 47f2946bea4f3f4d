//! Backend seam between the mapping engine and a key-value store

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

// =============================================================================
// KeyValueStore Trait
// =============================================================================

/// Pooled key-value backend
///
/// The engine acquires one connection per call and drops it on return, so an
/// implementation must release pool capacity when its connection is dropped.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Connection guard handed out by the pool
    type Conn: Connection;

    /// Unique identifier for this backend
    fn backend_id(&self) -> &str;

    /// Acquire a connection, waiting for pool capacity if needed
    async fn acquire(&self) -> Result<Self::Conn, StoreError>;

    /// Remove every key in every database
    async fn flush_all(&self) -> Result<(), StoreError>;
}

// =============================================================================
// Connection Trait
// =============================================================================

/// One caller's connection, usable by a single task at a time
#[async_trait]
pub trait Connection: Send {
    /// Switch the logical database used by later commands
    async fn select(&mut self, db: i64) -> Result<(), StoreError>;

    /// Apply all writes as one transaction
    ///
    /// The writes run in order with no other client interleaved. A write
    /// that fails (for example on a key of the wrong type) does not undo the
    /// others; the first such failure is returned after the batch has run.
    async fn apply(&mut self, ops: &[WriteOp]) -> Result<(), StoreError>;

    /// String value at `key`
    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// All fields of the hash at `key`; empty when missing
    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, Vec<u8>>, StoreError>;

    /// Members with `min <= score <= max`, ascending by score
    async fn zrange_by_score(
        &mut self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<String>, StoreError>;

    /// Remove `member` from every set in `index_keys` unless `record_key` exists
    ///
    /// The existence check and the removals happen as one step, so a record
    /// written concurrently keeps its index entries. Returns the number of
    /// sets the member was removed from.
    async fn zrem_if_absent(
        &mut self,
        record_key: &str,
        index_keys: &[String],
        member: &str,
    ) -> Result<usize, StoreError>;

    /// Whether `key` exists
    async fn exists(&mut self, key: &str) -> Result<bool, StoreError>;
}

/// Single write inside a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Set a string value, replacing any value and expiry
    Set {
        /// Target key
        key: String,
        /// Stored bytes
        value: Vec<u8>,
        /// Optional TTL
        ttl: Option<Duration>,
    },
    /// Set hash fields
    HSet {
        /// Target key
        key: String,
        /// Field/value pairs
        fields: Vec<(String, Vec<u8>)>,
    },
    /// Delete a key of any type
    Del {
        /// Target key
        key: String,
    },
    /// Add or re-score a sorted-set member
    ZAdd {
        /// Sorted-set key
        key: String,
        /// Member
        member: String,
        /// Score
        score: f64,
    },
    /// Remove a sorted-set member
    ZRem {
        /// Sorted-set key
        key: String,
        /// Member
        member: String,
    },
    /// Set a TTL on an existing key
    Expire {
        /// Target key
        key: String,
        /// TTL
        ttl: Duration,
    },
}

impl WriteOp {
    /// Key touched by this write
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Set { key, .. }
            | WriteOp::HSet { key, .. }
            | WriteOp::Del { key }
            | WriteOp::ZAdd { key, .. }
            | WriteOp::ZRem { key, .. }
            | WriteOp::Expire { key, .. } => key,
        }
    }
}

/// TTL in whole milliseconds, never rounding a positive TTL down to zero
pub fn ttl_millis(ttl: Duration) -> u64 {
    let ms = ttl.as_millis().min(u64::MAX as u128) as u64;
    if ms == 0 && !ttl.is_zero() {
        1
    } else {
        ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_rounds_up_sub_millisecond() {
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::ZERO), 0);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
    }

    #[test]
    fn test_write_op_key() {
        let op = WriteOp::ZAdd {
            key: "post:idx:id".to_string(),
            member: "1".to_string(),
            score: 1.0,
        };
        assert_eq!(op.key(), "post:idx:id");
    }
}
