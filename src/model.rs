//! Capability contract implemented by every persisted type
//!
//! A model declares how it is stored ([`StoreType`]), how it is keyed, which
//! named scores index it, and how long it lives. Only the codec hooks for the
//! declared storage mode need real implementations; the others keep their
//! `Unsupported` defaults.
//!
//! # Example
//!
//! ```rust
//! use redistructs::codec;
//! use redistructs::error::CodecError;
//! use redistructs::model::Model;
//! use redistructs::types::{Expiry, ScoreMap, StoreType};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Post {
//!     id: u64,
//!     title: String,
//!     created_at: i64,
//! }
//!
//! impl Model for Post {
//!     fn store_type(&self) -> StoreType {
//!         StoreType::Serialized
//!     }
//!
//!     fn primary_key(&self) -> String {
//!         self.id.to_string()
//!     }
//!
//!     fn score_map(&self) -> ScoreMap {
//!         let mut scores = ScoreMap::new();
//!         scores.insert("id".to_string(), self.id.into());
//!         scores.insert("recent".to_string(), self.created_at.into());
//!         scores
//!     }
//!
//!     fn expire(&self) -> Expiry {
//!         Duration::from_secs(60).into()
//!     }
//!
//!     fn serialized(&self) -> Result<Vec<u8>, CodecError> {
//!         codec::to_json_bytes(self)
//!     }
//!
//!     fn deserialized(bytes: &[u8]) -> Result<Self, CodecError> {
//!         codec::from_json_bytes(bytes)
//!     }
//! }
//! ```

use crate::error::CodecError;
use crate::types::{Expiry, ScoreMap, StoreType};
use std::collections::HashMap;

/// Trait for types that can be mapped onto the key-value store
pub trait Model: Sized + Send + Sync + 'static {
    /// Representation of the primary record
    fn store_type(&self) -> StoreType;

    /// Identifier within the type's key namespace
    fn primary_key(&self) -> String;

    /// Separator between key segments
    fn key_delimiter(&self) -> &str {
        ":"
    }

    /// Named scores, one sorted-set index per name
    fn score_map(&self) -> ScoreMap {
        ScoreMap::new()
    }

    /// TTL applied to the primary record
    fn expire(&self) -> Expiry {
        Expiry::Default
    }

    /// Logical database; `None` uses the configured default
    fn database_idx(&self) -> Option<i64> {
        None
    }

    /// Blob for [`StoreType::Serialized`]
    fn serialized(&self) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Unsupported("serialized"))
    }

    /// Inverse of [`Model::serialized`]
    fn deserialized(_bytes: &[u8]) -> Result<Self, CodecError> {
        Err(CodecError::Unsupported("serialized"))
    }

    /// Field/value pairs for [`StoreType::Hash`]
    fn to_fields(&self) -> Result<Vec<(String, Vec<u8>)>, CodecError> {
        Err(CodecError::Unsupported("hash"))
    }

    /// Inverse of [`Model::to_fields`]
    fn from_fields(_fields: HashMap<String, Vec<u8>>) -> Result<Self, CodecError> {
        Err(CodecError::Unsupported("hash"))
    }

    /// Scalar value for [`StoreType::String`]
    fn scalar(&self) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Unsupported("string"))
    }

    /// Inverse of [`Model::scalar`]
    fn from_scalar(_bytes: &[u8]) -> Result<Self, CodecError> {
        Err(CodecError::Unsupported("string"))
    }
}
