//! Shared fixtures for integration tests

#![allow(dead_code)]

use redistructs::codec;
use redistructs::{CodecError, Expiry, Model, ScoreMap, StoreType};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One day in microseconds
pub const DAY_US: i64 = 24 * 60 * 60 * 1_000_000;

/// Fixed reference instant (unix microseconds)
pub const T0: i64 = 1_700_000_000_000_000;

/// Blog post stored as a serialized blob with `id` and `recent` indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub user_id: u64,
    pub title: String,
    pub body: String,
    /// Unix microseconds; exact as an index score
    pub created_at: i64,
    #[serde(skip)]
    pub ttl: Option<Duration>,
}

impl Post {
    pub fn new(id: u64, user_id: u64, created_at: i64) -> Self {
        Self {
            id,
            user_id,
            title: format!("post {}", id),
            body: format!("This is a post {}", id),
            created_at,
            ttl: None,
        }
    }

    pub fn expiring(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

impl Model for Post {
    fn store_type(&self) -> StoreType {
        StoreType::Serialized
    }

    fn primary_key(&self) -> String {
        self.id.to_string()
    }

    fn key_delimiter(&self) -> &str {
        "/"
    }

    fn score_map(&self) -> ScoreMap {
        let mut scores = ScoreMap::new();
        scores.insert("id".to_string(), self.id.into());
        scores.insert("recent".to_string(), self.created_at.into());
        scores
    }

    fn expire(&self) -> Expiry {
        self.ttl.map(Expiry::from).unwrap_or(Expiry::Never)
    }

    fn database_idx(&self) -> Option<i64> {
        Some(0)
    }

    fn serialized(&self) -> Result<Vec<u8>, CodecError> {
        codec::to_json_bytes(self)
    }

    fn deserialized(bytes: &[u8]) -> Result<Self, CodecError> {
        codec::from_json_bytes(bytes)
    }
}

/// The four posts of the reference scenario
pub fn scenario_posts() -> Vec<Post> {
    vec![
        Post::new(1, 1, T0),
        Post::new(2, 2, T0 - DAY_US),
        Post::new(3, 1, T0 + DAY_US),
        Post::new(4, 1, T0 - DAY_US),
    ]
}

/// Prototype used to bind engines
pub fn prototype() -> Post {
    Post::new(0, 0, 0)
}

/// Install a test subscriber once; honours RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
