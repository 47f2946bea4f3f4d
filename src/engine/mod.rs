//! Mapping engine: batch Put/Get/Delete of models over a key-value store
//!
//! A [`MappingEngine`] is bound to one model type, one backend and one
//! [`Config`]. For every instance it derives the primary key, encodes the
//! primary record in the model's storage mode, and maintains one sorted-set
//! index per declared score.
//!
//! # Write path
//!
//! ```text
//! put([m0, m1, ...])
//!   acquire connection (bounded by ctx)
//!   for each instance, in order:
//!     key   = KeyBuilder::primary_key(m.primary_key())    InvalidKey before any write
//!     rec   = Record::encode(m.store_type(), m)           Encoding before any write
//!     ops   = rec.write_ops(key, ttl)
//!           + ZADD per declared score
//!           + ZREM from prototype indices the instance no longer declares
//!     SELECT m.database_idx()
//!     MULTI ops EXEC                                      no interleaving
//!   stop at the first failure; earlier instances stay committed
//! ```
//!
//! `EXEC` isolates an instance's writes from other clients but does not roll
//! them back: if one write fails, the others in the same transaction have
//! still been applied. Everything that can be checked locally (key shape,
//! scores, database, encoding) is therefore checked before the transaction,
//! and primary keys can never name an index key.
//!
//! # Expiry and indices
//!
//! Backend TTLs remove primary records but not their index membership.
//! [`MappingEngine::find_by_score`] drops such dangling members when it
//! meets them, and [`MappingEngine::prune_index`] sweeps a whole index.
//! Both remove a member only if its record is still missing at removal time,
//! checked by the backend in the same step.

pub mod memory;
pub mod traits;

use crate::codec::Record;
use crate::config::Config;
use crate::context::Context;
use crate::error::{Error, Operation, Result, StoreError};
use crate::keys::{type_segment, KeyBuilder};
use crate::model::Model;
use crate::types::{Score, StoreType};

use std::collections::BTreeSet;
use std::marker::PhantomData;
use tracing::{debug, info, warn};

use traits::{Connection, KeyValueStore, WriteOp};

/// Everything needed to write one instance, computed before touching the backend
struct PutPlan {
    key: String,
    db: i64,
    ops: Vec<WriteOp>,
}

/// Object-to-key-value mapper for model type `M` over backend `S`
///
/// Holds no per-instance state; share it between tasks behind an `Arc`.
pub struct MappingEngine<M: Model, S: KeyValueStore> {
    store: S,
    config: Config,
    keys: KeyBuilder,
    /// Storage mode used when reading by key
    read_mode: StoreType,
    /// Database used when reading by key
    read_database: i64,
    /// Score names declared by the prototype
    score_names: Vec<String>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model, S: KeyValueStore> MappingEngine<M, S> {
    /// Bind an engine to `store`, `config` and the type of `prototype`
    ///
    /// The prototype supplies type-level metadata only: key delimiter,
    /// storage mode and database for reads, and the score names that
    /// key-based deletes clean up.
    pub fn new(store: S, config: Config, prototype: M) -> Result<Self> {
        config.validate()?;

        let keys = KeyBuilder::for_type::<M>(&config.key_prefix, prototype.key_delimiter())?;
        let read_database = prototype
            .database_idx()
            .unwrap_or(config.default_database);
        if read_database < 0 {
            return Err(Error::InvalidDatabase(read_database));
        }

        let score_names: Vec<String> = prototype.score_map().into_keys().collect();
        for name in &score_names {
            keys.index_key(name)?;
        }

        info!(
            "Mapping engine for {} on {} (mode {}, db {}, {} indices)",
            type_segment::<M>(),
            store.backend_id(),
            prototype.store_type(),
            read_database,
            score_names.len()
        );

        Ok(Self {
            store,
            read_mode: prototype.store_type(),
            read_database,
            score_names,
            keys,
            config,
            _model: PhantomData,
        })
    }

    /// Underlying backend
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Engine configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Key builder for this model type
    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    /// Composed primary key of `instance`
    pub fn primary_key_for(&self, instance: &M) -> Result<String> {
        self.keys.primary_key(&instance.primary_key())
    }

    /// Sorted-set key of the index named `score_name`
    pub fn index_key_for(&self, score_name: &str) -> Result<String> {
        self.keys.index_key(score_name)
    }

    /// Write `instances` in order, halting at the first failure
    ///
    /// Each instance's primary record, index entries and expiry are applied
    /// as one transaction. Index entries are replaced as a unit: the instance
    /// leaves every prototype index it no longer reports a score for.
    /// Instances before a failing one stay written.
    pub async fn put(&self, ctx: &Context, instances: &[M]) -> Result<()> {
        if instances.is_empty() {
            return Ok(());
        }

        let mut conn = self.acquire(ctx).await?;

        for (index, instance) in instances.iter().enumerate() {
            let plan = self.plan_put(index, instance)?;

            self.select(ctx, &mut conn, plan.db, Operation::Put, &plan.key, index)
                .await?;
            ctx.run(conn.apply(&plan.ops))
                .await?
                .map_err(|source| {
                    warn!("Put failed for {} (item {}): {}", plan.key, index, source);
                    store_error(Operation::Put, &plan.key, index, source)
                })?;

            debug!("Put {} in db {} ({} ops)", plan.key, plan.db, plan.ops.len());
        }

        debug!("Put batch of {} instances", instances.len());
        Ok(())
    }

    /// Read instances by primary key, in input order
    ///
    /// Missing keys yield `None` at their position instead of failing the batch.
    pub async fn get<K>(&self, ctx: &Context, primary_keys: &[K]) -> Result<Vec<Option<M>>>
    where
        K: AsRef<str> + Sync,
    {
        if primary_keys.is_empty() {
            return Ok(Vec::new());
        }

        let keys = primary_keys
            .iter()
            .map(|pk| self.keys.primary_key(pk.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.acquire(ctx).await?;
        self.select(ctx, &mut conn, self.read_database, Operation::Get, &keys[0], 0)
            .await?;

        let mut out = Vec::with_capacity(keys.len());
        for (index, key) in keys.iter().enumerate() {
            out.push(self.load(ctx, &mut conn, key, index).await?);
        }

        debug!(
            "Get batch of {} keys ({} found)",
            keys.len(),
            out.iter().filter(|m| m.is_some()).count()
        );
        Ok(out)
    }

    /// Remove `instances` and their membership in every score index
    pub async fn delete(&self, ctx: &Context, instances: &[M]) -> Result<()> {
        if instances.is_empty() {
            return Ok(());
        }

        let mut conn = self.acquire(ctx).await?;

        for (index, instance) in instances.iter().enumerate() {
            let pk = instance.primary_key();
            let key = self.keys.primary_key(&pk)?;
            let db = self.database_for(instance)?;

            // Prototype names cover indices the instance no longer reports
            let names: BTreeSet<String> = instance
                .score_map()
                .into_keys()
                .chain(self.score_names.iter().cloned())
                .collect();
            let ops = self.delete_ops(&key, &pk, names.iter())?;

            self.select(ctx, &mut conn, db, Operation::Delete, &key, index)
                .await?;
            ctx.run(conn.apply(&ops))
                .await?
                .map_err(|source| store_error(Operation::Delete, &key, index, source))?;

            debug!("Deleted {} from db {}", key, db);
        }

        debug!("Delete batch of {} instances", instances.len());
        Ok(())
    }

    /// Remove records by primary key, returning how many existed
    ///
    /// Index cleanup covers the score names declared by the prototype.
    pub async fn delete_keys<K>(&self, ctx: &Context, primary_keys: &[K]) -> Result<usize>
    where
        K: AsRef<str> + Sync,
    {
        if primary_keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.acquire(ctx).await?;
        let mut existed = 0;

        for (index, pk) in primary_keys.iter().enumerate() {
            let pk = pk.as_ref();
            let key = self.keys.primary_key(pk)?;
            let ops = self.delete_ops(&key, pk, self.score_names.iter())?;

            self.select(ctx, &mut conn, self.read_database, Operation::Delete, &key, index)
                .await?;
            let present = ctx
                .run(conn.exists(&key))
                .await?
                .map_err(|source| store_error(Operation::Delete, &key, index, source))?;
            ctx.run(conn.apply(&ops))
                .await?
                .map_err(|source| store_error(Operation::Delete, &key, index, source))?;

            if present {
                existed += 1;
            }
        }

        debug!("Deleted {} of {} keys", existed, primary_keys.len());
        Ok(existed)
    }

    /// Primary keys whose `score_name` score lies in `[min, max]`, ascending
    pub async fn range_by_score(
        &self,
        ctx: &Context,
        score_name: &str,
        min: impl Into<Score>,
        max: impl Into<Score>,
    ) -> Result<Vec<String>> {
        let index_key = self.keys.index_key(score_name)?;
        let mut conn = self.acquire(ctx).await?;
        self.select(ctx, &mut conn, self.read_database, Operation::Range, &index_key, 0)
            .await?;
        self.range(ctx, &mut conn, &index_key, min.into(), max.into())
            .await
    }

    /// Instances whose `score_name` score lies in `[min, max]`, ascending
    ///
    /// Index members whose primary record no longer exists (for example
    /// after expiry) are skipped and removed from every declared index.
    pub async fn find_by_score(
        &self,
        ctx: &Context,
        score_name: &str,
        min: impl Into<Score>,
        max: impl Into<Score>,
    ) -> Result<Vec<M>> {
        let index_key = self.keys.index_key(score_name)?;
        let mut conn = self.acquire(ctx).await?;
        self.select(ctx, &mut conn, self.read_database, Operation::Range, &index_key, 0)
            .await?;

        let members = self
            .range(ctx, &mut conn, &index_key, min.into(), max.into())
            .await?;

        let mut found = Vec::with_capacity(members.len());
        let mut dangling = Vec::new();
        for (index, pk) in members.into_iter().enumerate() {
            let key = self.keys.primary_key(&pk)?;
            match self.load(ctx, &mut conn, &key, index).await? {
                Some(model) => found.push(model),
                None => dangling.push(pk),
            }
        }

        if !dangling.is_empty() {
            let mut names: BTreeSet<&str> = self.score_names.iter().map(String::as_str).collect();
            names.insert(score_name);
            let index_keys = names
                .into_iter()
                .map(|name| self.keys.index_key(name))
                .collect::<Result<Vec<_>>>()?;

            let mut removed = 0;
            for (index, pk) in dangling.iter().enumerate() {
                if self
                    .remove_dangling(ctx, &mut conn, pk, &index_keys, index)
                    .await?
                    > 0
                {
                    removed += 1;
                }
            }
            warn!(
                "Removed {} of {} dangling members from {} indices",
                removed,
                dangling.len(),
                type_segment::<M>()
            );
        }

        Ok(found)
    }

    /// Remove members of `score_name` whose primary record is gone
    pub async fn prune_index(&self, ctx: &Context, score_name: &str) -> Result<usize> {
        let index_key = self.keys.index_key(score_name)?;
        let mut conn = self.acquire(ctx).await?;
        self.select(ctx, &mut conn, self.read_database, Operation::Prune, &index_key, 0)
            .await?;

        let members = self
            .range(
                ctx,
                &mut conn,
                &index_key,
                Score::Float(f64::NEG_INFINITY),
                Score::Float(f64::INFINITY),
            )
            .await?;

        let index_keys = [index_key];
        let mut removed = 0;
        for (index, pk) in members.iter().enumerate() {
            removed += self
                .remove_dangling(ctx, &mut conn, pk, &index_keys, index)
                .await?;
        }

        if removed > 0 {
            info!("Pruned {} dangling members from {}", removed, index_keys[0]);
        }
        Ok(removed)
    }

    async fn acquire(&self, ctx: &Context) -> Result<S::Conn> {
        ctx.run(self.store.acquire()).await?.map_err(|e| {
            warn!("Connection acquisition failed: {}", e);
            Error::Connection(e)
        })
    }

    async fn select(
        &self,
        ctx: &Context,
        conn: &mut S::Conn,
        db: i64,
        op: Operation,
        key: &str,
        index: usize,
    ) -> Result<()> {
        ctx.run(conn.select(db))
            .await?
            .map_err(|source| store_error(op, key, index, source))
    }

    fn database_for(&self, instance: &M) -> Result<i64> {
        let db = instance
            .database_idx()
            .unwrap_or(self.config.default_database);
        if db < 0 {
            return Err(Error::InvalidDatabase(db));
        }
        Ok(db)
    }

    /// Validate and encode one instance without touching the backend
    fn plan_put(&self, index: usize, instance: &M) -> Result<PutPlan> {
        let pk = instance.primary_key();
        let key = self.keys.primary_key(&pk)?;
        let db = self.database_for(instance)?;

        let scores = instance.score_map();
        let mut index_ops = Vec::with_capacity(scores.len().max(self.score_names.len()));
        for (name, score) in &scores {
            if !score.is_valid() {
                return Err(Error::InvalidScore {
                    name: name.clone(),
                    key,
                });
            }
            index_ops.push(WriteOp::ZAdd {
                key: self.keys.index_key(name)?,
                member: pk.clone(),
                score: score.as_f64(),
            });
        }
        for name in self.score_names.iter().filter(|n| !scores.contains_key(*n)) {
            index_ops.push(WriteOp::ZRem {
                key: self.keys.index_key(name)?,
                member: pk.clone(),
            });
        }

        let record = Record::encode(instance.store_type(), instance).map_err(|source| {
            warn!("Encoding failed for {} (item {}): {}", key, index, source);
            Error::Encoding {
                key: key.clone(),
                index,
                source,
            }
        })?;

        let ttl = instance.expire().resolve(self.config.default_ttl());
        let mut ops = record.write_ops(&key, ttl);
        ops.extend(index_ops);

        Ok(PutPlan { key, db, ops })
    }

    fn delete_ops<'a>(
        &self,
        key: &str,
        pk: &str,
        names: impl Iterator<Item = &'a String>,
    ) -> Result<Vec<WriteOp>> {
        let mut ops = vec![WriteOp::Del {
            key: key.to_string(),
        }];
        for name in names {
            ops.push(WriteOp::ZRem {
                key: self.keys.index_key(name)?,
                member: pk.to_string(),
            });
        }
        Ok(ops)
    }

    async fn load(
        &self,
        ctx: &Context,
        conn: &mut S::Conn,
        key: &str,
        index: usize,
    ) -> Result<Option<M>> {
        let record = ctx
            .run(Record::read(self.read_mode, conn, key))
            .await?
            .map_err(|source| store_error(Operation::Get, key, index, source))?;

        record
            .map(|r| r.decode::<M>())
            .transpose()
            .map_err(|source| Error::Encoding {
                key: key.to_string(),
                index,
                source,
            })
    }

    async fn range(
        &self,
        ctx: &Context,
        conn: &mut S::Conn,
        index_key: &str,
        min: Score,
        max: Score,
    ) -> Result<Vec<String>> {
        ctx.run(conn.zrange_by_score(index_key, min.as_f64(), max.as_f64()))
            .await?
            .map_err(|source| store_error(Operation::Range, index_key, 0, source))
    }

    /// Drop `pk` from `index_keys` if its record is missing at removal time
    async fn remove_dangling(
        &self,
        ctx: &Context,
        conn: &mut S::Conn,
        pk: &str,
        index_keys: &[String],
        index: usize,
    ) -> Result<usize> {
        let key = self.keys.primary_key(pk)?;
        ctx.run(conn.zrem_if_absent(&key, index_keys, pk))
            .await?
            .map_err(|source| store_error(Operation::Prune, &key, index, source))
    }
}

fn store_error(op: Operation, key: &str, index: usize, source: StoreError) -> Error {
    Error::Store {
        op,
        key: key.to_string(),
        index,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use crate::codec;
    use crate::error::CodecError;
    use crate::types::{Expiry, ScoreMap};
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Session {
        token: String,
        user: String,
        started: i64,
        #[serde(skip)]
        ttl: Option<Duration>,
        #[serde(skip)]
        db: Option<i64>,
    }

    impl Session {
        fn new(token: &str, started: i64) -> Self {
            Self {
                token: token.to_string(),
                user: format!("user-{}", token),
                started,
                ttl: None,
                db: None,
            }
        }
    }

    impl Model for Session {
        fn store_type(&self) -> StoreType {
            StoreType::Hash
        }

        fn primary_key(&self) -> String {
            self.token.clone()
        }

        fn score_map(&self) -> ScoreMap {
            let mut scores = ScoreMap::new();
            scores.insert("started".to_string(), self.started.into());
            scores
        }

        fn expire(&self) -> Expiry {
            self.ttl.map(Expiry::from).unwrap_or_default()
        }

        fn database_idx(&self) -> Option<i64> {
            self.db
        }

        fn to_fields(&self) -> std::result::Result<Vec<(String, Vec<u8>)>, CodecError> {
            codec::fields_from_serde(self)
        }

        fn from_fields(
            fields: HashMap<String, Vec<u8>>,
        ) -> std::result::Result<Self, CodecError> {
            codec::serde_from_fields(fields)
        }
    }

    /// Scalar model storing only its label
    #[derive(Debug, Clone, PartialEq)]
    struct Label {
        id: u32,
        text: String,
    }

    impl Model for Label {
        fn store_type(&self) -> StoreType {
            StoreType::String
        }

        fn primary_key(&self) -> String {
            self.id.to_string()
        }

        fn scalar(&self) -> std::result::Result<Vec<u8>, CodecError> {
            Ok(self.text.clone().into_bytes())
        }

        fn from_scalar(bytes: &[u8]) -> std::result::Result<Self, CodecError> {
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|e| CodecError::Deserialize(e.to_string()))?;
            Ok(Self { id: 0, text })
        }
    }

    fn engine(store: MemoryStore) -> MappingEngine<Session, MemoryStore> {
        MappingEngine::new(store, Config::create(), Session::new("proto", 0)).unwrap()
    }

    #[tokio::test]
    async fn test_hash_put_get() {
        let store = MemoryStore::new();
        let engine = engine(store.clone());
        let ctx = Context::background();

        engine
            .put(&ctx, &[Session::new("a", 10), Session::new("b", 20)])
            .await
            .unwrap();

        assert_eq!(
            store.keys(0),
            vec!["session:a", "session:b", "session:idx:started"]
        );

        let got = engine.get(&ctx, &["b", "zz", "a"]).await.unwrap();
        assert_eq!(got[0].as_ref().unwrap().user, "user-b");
        assert!(got[1].is_none());
        assert_eq!(got[2].as_ref().unwrap().started, 10);
    }

    #[tokio::test]
    async fn test_reput_without_ttl_clears_expiry() {
        let store = MemoryStore::new();
        let engine = engine(store.clone());
        let ctx = Context::background();

        let mut s = Session::new("a", 1);
        s.ttl = Some(Duration::from_secs(60));
        engine.put(&ctx, &[s.clone()]).await.unwrap();
        assert!(store.ttl(0, "session:a").is_some());

        s.ttl = None;
        engine.put(&ctx, &[s]).await.unwrap();
        assert_eq!(store.ttl(0, "session:a"), None);
    }

    #[tokio::test]
    async fn test_string_mode_roundtrip() {
        let store = MemoryStore::new();
        let engine =
            MappingEngine::new(store.clone(), Config::create(), Label { id: 0, text: String::new() })
                .unwrap();
        let ctx = Context::background();

        engine
            .put(
                &ctx,
                &[Label {
                    id: 5,
                    text: "hello".to_string(),
                }],
            )
            .await
            .unwrap();

        let mut conn = store.acquire().await.unwrap();
        assert_eq!(conn.get("label:5").await.unwrap(), Some(b"hello".to_vec()));

        let got = engine.get(&ctx, &["5"]).await.unwrap();
        assert_eq!(got[0].as_ref().unwrap().text, "hello");
    }

    #[tokio::test]
    async fn test_invalid_key_fails_before_write() {
        let store = MemoryStore::new();
        let engine = engine(store.clone());
        let ctx = Context::background();

        let err = engine
            .put(&ctx, &[Session::new("ok", 1), Session::new("", 2)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
        // First instance stays committed, nothing written for the second
        assert_eq!(store.keys(0), vec!["session:idx:started", "session:ok"]);
    }

    #[tokio::test]
    async fn test_non_finite_score_rejected() {
        #[derive(Clone)]
        struct Reading(f64);

        impl Model for Reading {
            fn store_type(&self) -> StoreType {
                StoreType::String
            }
            fn primary_key(&self) -> String {
                "r".to_string()
            }
            fn score_map(&self) -> ScoreMap {
                let mut scores = ScoreMap::new();
                scores.insert("value".to_string(), self.0.into());
                scores
            }
            fn scalar(&self) -> std::result::Result<Vec<u8>, CodecError> {
                Ok(self.0.to_string().into_bytes())
            }
        }

        let store = MemoryStore::new();
        let engine = MappingEngine::new(store.clone(), Config::create(), Reading(0.0)).unwrap();
        let err = engine
            .put(&Context::background(), &[Reading(f64::NAN)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidScore { ref name, .. } if name == "value"));
        assert!(store.keys(0).is_empty());
    }

    #[tokio::test]
    async fn test_database_selection() {
        let store = MemoryStore::new();
        let engine = MappingEngine::new(
            store.clone(),
            Config::create().with_default_database(2),
            Session::new("proto", 0),
        )
        .unwrap();
        let ctx = Context::background();

        let mut other = Session::new("elsewhere", 1);
        other.db = Some(5);
        engine
            .put(&ctx, &[Session::new("here", 1), other])
            .await
            .unwrap();

        assert!(store.keys(0).is_empty());
        assert!(store.keys(2).contains(&"session:here".to_string()));
        assert!(store.keys(5).contains(&"session:elsewhere".to_string()));

        let mut negative = Session::new("neg", 1);
        negative.db = Some(-1);
        assert!(matches!(
            engine.put(&ctx, &[negative]).await,
            Err(Error::InvalidDatabase(-1))
        ));
    }

    #[tokio::test]
    async fn test_delete_keys_reports_existing() {
        let store = MemoryStore::new();
        let engine = engine(store.clone());
        let ctx = Context::background();

        engine
            .put(&ctx, &[Session::new("a", 1), Session::new("b", 2)])
            .await
            .unwrap();
        let removed = engine.delete_keys(&ctx, &["a", "missing"]).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            engine
                .range_by_score(&ctx, "started", i64::MIN, i64::MAX)
                .await
                .unwrap(),
            vec!["b"]
        );
    }

    #[tokio::test]
    async fn test_prune_index_removes_expired_members() {
        let store = MemoryStore::new();
        let engine = engine(store.clone());
        let ctx = Context::background();

        let mut short = Session::new("short", 1);
        short.ttl = Some(Duration::from_millis(20));
        engine
            .put(&ctx, &[short, Session::new("long", 2)])
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(engine.prune_index(&ctx, "started").await.unwrap(), 1);
        assert_eq!(engine.prune_index(&ctx, "started").await.unwrap(), 0);
        assert_eq!(
            engine.range_by_score(&ctx, "started", 0, 10).await.unwrap(),
            vec!["long"]
        );
    }

    #[tokio::test]
    async fn test_empty_delimiter_rejected_at_construction() {
        struct Bad;
        impl Model for Bad {
            fn store_type(&self) -> StoreType {
                StoreType::Serialized
            }
            fn primary_key(&self) -> String {
                "x".to_string()
            }
            fn key_delimiter(&self) -> &str {
                ""
            }
        }

        let res = MappingEngine::new(MemoryStore::new(), Config::create(), Bad);
        assert!(matches!(res, Err(Error::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_empty_batches_do_not_acquire() {
        let store = MemoryStore::new();
        let engine = engine(store.clone());
        store.close();
        let ctx = Context::background();

        engine.put(&ctx, &[]).await.unwrap();
        assert!(engine.get::<&str>(&ctx, &[]).await.unwrap().is_empty());
        engine.delete(&ctx, &[]).await.unwrap();
        assert!(matches!(
            engine.put(&ctx, &[Session::new("a", 1)]).await,
            Err(Error::Connection(StoreError::Closed))
        ));
    }
}
